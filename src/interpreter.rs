use crate::command::{EXIT_FAILURE, EXIT_NOT_FOUND, ExitCode};
use crate::context::ShellContext;
use crate::external;
use crate::input::InputHandler;
use crate::lexer::tokenize;
use crate::parser::{parse_redirection, split_pipeline};
use crate::pipeline::PipelineExecutor;
use crate::redirect;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

/// A minimal shell-like interpreter that routes command lines to built-in and
/// external commands.
///
/// A line is tokenized and split on `|`. Two or more segments go to the
/// [`PipelineExecutor`]; a single segment has its redirections applied and is
/// dispatched on its own.
///
/// Example
/// ```
/// use minishell::{Interpreter, OutputStream, ShellContext, InputStream, SearchPath};
/// use std::sync::Arc;
///
/// let (out, buf) = OutputStream::memory();
/// let (err, _) = OutputStream::memory();
/// let ctx = ShellContext::with_streams(
///     minishell::builtin::defaults(),
///     Arc::new(SearchPath::from_env()),
///     InputStream::from_bytes(Vec::new()),
///     out,
///     err,
/// );
/// let sh = Interpreter::new(ctx);
/// assert_eq!(sh.route("echo hello world"), 0);
/// assert_eq!(buf.lock().unwrap().as_slice(), b"hello world\n");
/// ```
pub struct Interpreter {
    ctx: ShellContext,
    histfile: Option<PathBuf>,
}

impl Interpreter {
    pub fn new(ctx: ShellContext) -> Self {
        Self {
            ctx,
            histfile: None,
        }
    }

    /// Load history from `path` at startup and write it back when the REPL ends.
    pub fn with_histfile(mut self, path: Option<PathBuf>) -> Self {
        self.histfile = path;
        self
    }

    pub fn context(&self) -> &ShellContext {
        &self.ctx
    }

    /// Run one command line and return its exit status.
    ///
    /// Never panics: a fault anywhere below is reported on stderr as status 1.
    pub fn route(&self, line: &str) -> ExitCode {
        panic::catch_unwind(AssertUnwindSafe(|| self.route_line(line))).unwrap_or_else(|_| {
            log::error!("panic while running {line:?}");
            let _ = writeln!(self.ctx.stderr(), "minishell: internal error");
            EXIT_FAILURE
        })
    }

    fn route_line(&self, line: &str) -> ExitCode {
        let tokens = tokenize(line);
        log::trace!("tokens: {tokens:?}");
        let segments = split_pipeline(&tokens);
        match segments.as_slice() {
            [] => 0,
            [single] => self.run_single(single),
            _ => PipelineExecutor::new(&self.ctx).execute(&segments),
        }
    }

    fn run_single(&self, tokens: &[String]) -> ExitCode {
        let info = parse_redirection(tokens);
        let (ctx, mut redirection) = match redirect::apply(&self.ctx, &info) {
            Ok(applied) => applied,
            Err(e) => {
                log::warn!("redirection failed: {e:#}");
                let _ = writeln!(self.ctx.stderr(), "{e:#}");
                return EXIT_FAILURE;
            }
        };
        let code = match info.command_parts.split_first() {
            Some((name, args)) => dispatch(name, args, &ctx),
            None => 0,
        };
        let _ = ctx.stdout().flush();
        let _ = ctx.stderr().flush();
        redirection.release();
        code
    }

    /// Read, route and record lines until `exit` or end of input.
    ///
    /// Returns the status the shell process should exit with: the code given
    /// to `exit`, or the status of the last line.
    pub fn repl(&mut self, input: &mut dyn InputHandler, prompt: &str) -> ExitCode {
        let mut status = 0;
        loop {
            let history = self.ctx.history().entries().to_vec();
            let line = match input.read_input(prompt, &history) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    log::error!("reading input: {e:?}");
                    let _ = writeln!(self.ctx.stderr(), "minishell: {e:#}");
                    status = EXIT_FAILURE;
                    break;
                }
            };
            if !line.trim().is_empty() {
                self.ctx.add_to_history(line.as_str());
            }
            status = self.route(&line);
            if let Some(code) = self.ctx.exit_requested() {
                status = code;
                break;
            }
        }
        self.save_history();
        status
    }

    /// Append the lines of the history file, if one is configured and exists.
    pub fn load_history(&self) {
        let Some(path) = self.histfile.as_deref().filter(|p| p.exists()) else {
            return;
        };
        match self.ctx.history().load_from_file(path) {
            Ok(n) => log::debug!("loaded {n} history entries from {}", path.display()),
            Err(e) => log::warn!("{e:#}"),
        }
    }

    fn save_history(&self) {
        let Some(path) = self.histfile.as_deref() else {
            return;
        };
        if let Err(e) = self.ctx.history().write_to_file(path) {
            log::warn!("{e:#}");
            let _ = writeln!(self.ctx.stderr(), "minishell: {e:#}");
        }
    }
}

fn dispatch(name: &str, args: &[String], ctx: &ShellContext) -> ExitCode {
    if let Some(cmd) = ctx.command(name) {
        log::debug!("built-in {name} {args:?}");
        return cmd.execute(args, ctx);
    }
    let Some(path) = ctx.resolver().resolve(name) else {
        log::debug!("{name}: not found");
        let _ = writeln!(ctx.stdout(), "{name}: command not found");
        return EXIT_NOT_FOUND;
    };
    external::run(name, &path, args, ctx).unwrap_or_else(|e| {
        log::warn!("{e:#}");
        let _ = writeln!(ctx.stderr(), "{e:#}");
        EXIT_FAILURE
    })
}
