use minishell::completion::{CommandCompletion, CompletionProvider};
use minishell::config::{EditorKind, ShellConfig};
use minishell::input::{ByteKeys, InputHandler, LineEditor, RustylineInput};
use minishell::{Interpreter, SearchPath, ShellContext, builtin, logging, terminal};
use std::process::ExitCode;
use std::sync::Arc;

/// Wire up resolver, built-ins, context, completion and the line editor.
fn build_shell(config: &ShellConfig) -> anyhow::Result<(Interpreter, Box<dyn InputHandler>)> {
    let resolver = Arc::new(SearchPath::from_env());
    let ctx = ShellContext::new(builtin::defaults(), resolver);

    let completion: Arc<dyn CompletionProvider> =
        Arc::new(CommandCompletion::new(&ctx, SearchPath::from_env()));
    let input: Box<dyn InputHandler> = match config.editor {
        EditorKind::Raw => Box::new(LineEditor::new(
            ByteKeys::new(std::io::stdin()),
            std::io::stdout(),
            terminal::for_stdin(),
            completion,
        )),
        EditorKind::Rustyline => Box::new(RustylineInput::new(completion)?),
    };

    let interpreter = Interpreter::new(ctx).with_histfile(config.histfile.clone());
    interpreter.load_history();
    Ok((interpreter, input))
}

fn main() -> ExitCode {
    let config = match ShellConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("minishell: {e:#}");
            return ExitCode::from(2);
        }
    };
    if let Err(e) = logging::init(config.log_level, config.log_file.as_deref()) {
        eprintln!("minishell: {e:#}");
    }

    if let Err(e) = terminal::ignore_interrupts() {
        log::warn!("cannot install SIGINT handler: {e}");
    }

    let (mut shell, mut input) = match build_shell(&config) {
        Ok(parts) => parts,
        Err(e) => {
            log::error!("startup failed: {e:?}");
            eprintln!("minishell: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    log::info!("starting with {:?} editor", config.editor);
    let status = shell.repl(input.as_mut(), &config.prompt);
    ExitCode::from((status & 0xff) as u8)
}
