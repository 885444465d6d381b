use crate::command::{Command, EXIT_FAILURE, EXIT_NOT_FOUND, EXIT_USAGE, ExitCode};
use crate::context::ShellContext;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command against the streams of `ctx`.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, ctx: &ShellContext) -> Result<ExitCode>;
}

/// Adapts a [`BuiltinCommand`] to the object-safe [`Command`] used by the registry.
///
/// Arguments are parsed on every invocation. Usage errors are printed and map to
/// exit code 2; errors returned by the command are printed as `name: error` on
/// stderr and map to exit code 1.
pub struct Builtin<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for Builtin<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand> Command for Builtin<T> {
    fn name(&self) -> &str {
        T::name()
    }

    fn execute(&self, args: &[String], ctx: &ShellContext) -> ExitCode {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let cmd = match T::from_args(&[T::name()], &args) {
            Ok(cmd) => cmd,
            Err(EarlyExit { output, status }) => {
                let (mut stream, code) = match status {
                    Ok(()) => (ctx.stdout(), 0),
                    Err(()) => (ctx.stderr(), EXIT_USAGE),
                };
                let _ = writeln!(stream, "{}", output.trim_end());
                return code;
            }
        };
        match cmd.execute(ctx) {
            Ok(code) => code,
            Err(e) => {
                log::debug!("{} failed: {e:?}", T::name());
                let _ = writeln!(ctx.stderr(), "{}: {e:#}", T::name());
                EXIT_FAILURE
            }
        }
    }
}

/// The built-ins every shell starts with.
pub fn defaults() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(Echo),
        Arc::new(Builtin::<Cd>::default()),
        Arc::new(Builtin::<Pwd>::default()),
        Arc::new(Builtin::<Type>::default()),
        Arc::new(Builtin::<Exit>::default()),
        Arc::new(Builtin::<History>::default()),
    ]
}

/// Write the arguments to standard output, separated by spaces.
///
/// Hand-parsed rather than through `argh`: echo prints every argument it does
/// not understand instead of rejecting it. A leading `-n` drops the newline.
pub struct Echo;

impl Command for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn execute(&self, args: &[String], ctx: &ShellContext) -> ExitCode {
        let (newline, words) = match args.split_first() {
            Some((flag, rest)) if flag == "-n" => (false, rest),
            _ => (true, args),
        };
        let mut out = ctx.stdout();
        let s = words.join(" ");
        let res = if newline {
            writeln!(out, "{}", s)
        } else {
            write!(out, "{}", s)
        };
        match res {
            Ok(()) => 0,
            Err(e) => {
                let _ = writeln!(ctx.stderr(), "echo: {e}");
                EXIT_FAILURE
            }
        }
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, ctx: &ShellContext) -> Result<ExitCode> {
        let cwd = env::current_dir().context("cannot read current directory")?;
        writeln!(ctx.stdout(), "{}", cwd.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the shell's working directory. Without a target, go to $HOME.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute, relative or starting with `~`. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl Cd {
    fn expand(target: &str) -> Result<PathBuf> {
        let home = || env::var_os("HOME").map(PathBuf::from).context("HOME not set");
        Ok(match target {
            "" | "~" => home()?,
            t if t.starts_with("~/") => home()?.join(&t[2..]),
            t => PathBuf::from(t),
        })
    }
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _ctx: &ShellContext) -> Result<ExitCode> {
        let shown = self.target.unwrap_or_default();
        let target = Self::expand(&shown)?;
        if !target.is_dir() {
            anyhow::bail!("{shown}: No such file or directory");
        }
        let canonical = fs::canonicalize(&target)
            .with_context(|| format!("{shown}: can't canonicalize {}", target.display()))?;
        env::set_current_dir(&canonical)
            .with_context(|| format!("{shown}: can't chdir to {}", canonical.display()))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Tell whether each name is a shell builtin or an executable on PATH.
pub struct Type {
    #[argh(positional, greedy)]
    /// command names to look up.
    pub names: Vec<String>,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn execute(self, ctx: &ShellContext) -> Result<ExitCode> {
        if self.names.is_empty() {
            writeln!(ctx.stderr(), "type: missing operand")?;
            return Ok(EXIT_USAGE);
        }
        let mut out = ctx.stdout();
        let mut code = 0;
        for name in &self.names {
            if ctx.is_builtin(name) {
                writeln!(out, "{name} is a shell builtin")?;
            } else if let Some(path) = ctx.resolver().resolve(name) {
                writeln!(out, "{name} is {}", path.display())?;
            } else {
                writeln!(out, "{name}: not found")?;
                code = EXIT_NOT_FOUND;
            }
        }
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Exit the shell with the given status (0 by default).
pub struct Exit {
    #[argh(positional)]
    /// exit status; must be an integer.
    pub code: Option<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, ctx: &ShellContext) -> Result<ExitCode> {
        let code = match &self.code {
            None => 0,
            Some(raw) => match raw.parse::<ExitCode>() {
                Ok(code) => code,
                Err(_) => {
                    writeln!(ctx.stderr(), "exit: {raw}: numeric argument required")?;
                    EXIT_USAGE
                }
            },
        };
        ctx.request_exit(code);
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Show the command history, or read/write it from/to a file.
pub struct History {
    #[argh(option, short = 'r')]
    /// append the lines of this file to the history.
    pub read: Option<PathBuf>,

    #[argh(option, short = 'w')]
    /// write the whole history to this file.
    pub write: Option<PathBuf>,

    #[argh(option, short = 'a')]
    /// append entries added since the last append to this file.
    pub append: Option<PathBuf>,

    #[argh(positional)]
    /// only show the last N entries.
    pub limit: Option<usize>,
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, ctx: &ShellContext) -> Result<ExitCode> {
        if let Some(path) = &self.read {
            if !path.exists() {
                anyhow::bail!("{}: No such file or directory", path.display());
            }
            ctx.history().load_from_file(path)?;
            return Ok(0);
        }
        if let Some(path) = &self.write {
            ctx.history().write_to_file(path)?;
            return Ok(0);
        }
        if let Some(path) = &self.append {
            ctx.history().append_to_file(path)?;
            return Ok(0);
        }

        let entries = ctx.history().entries().to_vec();
        let start = match self.limit {
            Some(n) if n > 0 => entries.len().saturating_sub(n),
            _ => 0,
        };
        let mut out = ctx.stdout();
        for (i, entry) in entries.iter().enumerate().skip(start) {
            writeln!(out, "{:>5}  {}", i + 1, entry)?;
        }
        Ok(0)
    }
}
