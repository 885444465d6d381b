use crate::command::{Command, ExitCode};
use crate::external::PathResolver;
use crate::history::History;
use crate::io_adapters::{InheritedStderr, InheritedStdin, InheritedStdout, InputStream, OutputStream};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Built-in commands indexed by their (case-sensitive) name.
pub type Registry = BTreeMap<String, Arc<dyn Command>>;

/// Everything a command needs to run: the registry, the path resolver, the
/// command history and the three standard streams.
///
/// Cloning is cheap and every clone shares the same registry, resolver, history
/// and exit request. Swapping streams with [`ShellContext::with_output`] or
/// [`ShellContext::with_io`] returns a new value and leaves `self` untouched.
#[derive(Clone)]
pub struct ShellContext {
    commands: Arc<Registry>,
    resolver: Arc<dyn PathResolver>,
    history: Arc<Mutex<History>>,
    exit: Arc<Mutex<Option<ExitCode>>>,
    stdin: InputStream,
    stdout: OutputStream,
    stderr: OutputStream,
}

impl ShellContext {
    /// Context bound to the process's own standard streams.
    pub fn new(
        commands: impl IntoIterator<Item = Arc<dyn Command>>,
        resolver: Arc<dyn PathResolver>,
    ) -> Self {
        Self::with_streams(
            commands,
            resolver,
            InputStream::new(InheritedStdin::new()),
            OutputStream::new(InheritedStdout::new()),
            OutputStream::new(InheritedStderr::new()),
        )
    }

    /// Context over caller-provided streams, used by tests and embedders.
    pub fn with_streams(
        commands: impl IntoIterator<Item = Arc<dyn Command>>,
        resolver: Arc<dyn PathResolver>,
        stdin: InputStream,
        stdout: OutputStream,
        stderr: OutputStream,
    ) -> Self {
        let mut registry = Registry::new();
        for cmd in commands {
            let name = cmd.name().to_owned();
            if registry.insert(name.clone(), cmd).is_some() {
                log::warn!("built-in {name} registered twice, keeping the last one");
            }
        }
        Self {
            commands: Arc::new(registry),
            resolver,
            history: Arc::new(Mutex::new(History::new())),
            exit: Arc::new(Mutex::new(None)),
            stdin,
            stdout,
            stderr,
        }
    }

    pub fn commands(&self) -> &Registry {
        &self.commands
    }

    /// Look up a built-in by name.
    pub fn command(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn resolver(&self) -> &dyn PathResolver {
        self.resolver.as_ref()
    }

    pub fn stdin(&self) -> InputStream {
        self.stdin.clone()
    }

    pub fn stdout(&self) -> OutputStream {
        self.stdout.clone()
    }

    pub fn stderr(&self) -> OutputStream {
        self.stderr.clone()
    }

    /// Same context with stdout and stderr replaced.
    pub fn with_output(&self, stdout: OutputStream, stderr: OutputStream) -> Self {
        Self {
            stdout,
            stderr,
            ..self.clone()
        }
    }

    /// Same context with all three streams replaced.
    pub fn with_io(&self, stdin: InputStream, stdout: OutputStream, stderr: OutputStream) -> Self {
        Self {
            stdin,
            ..self.with_output(stdout, stderr)
        }
    }

    pub fn history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_to_history(&self, line: impl Into<String>) {
        self.history().push(line);
    }

    /// Ask the REPL to stop after the current line with `code`.
    pub fn request_exit(&self, code: ExitCode) {
        *self.exit.lock().unwrap_or_else(PoisonError::into_inner) = Some(code);
    }

    pub fn exit_requested(&self) -> Option<ExitCode> {
        *self.exit.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::SearchPath;

    fn context() -> ShellContext {
        let (out, _) = OutputStream::memory();
        let (err, _) = OutputStream::memory();
        ShellContext::with_streams(
            crate::builtin::defaults(),
            Arc::new(SearchPath::from_env()),
            InputStream::from_bytes(Vec::new()),
            out,
            err,
        )
    }

    #[test]
    fn wrapping_keeps_the_original_untouched() {
        let ctx = context();
        let (out, _) = OutputStream::memory();
        let wrapped = ctx.with_output(out.clone(), ctx.stderr());

        assert!(wrapped.stdout().ptr_eq(&out));
        assert!(!ctx.stdout().ptr_eq(&out));
        assert!(wrapped.stderr().ptr_eq(&ctx.stderr()));
        assert!(wrapped.stdin().ptr_eq(&ctx.stdin()));
    }

    #[test]
    fn history_and_exit_are_shared_between_clones() {
        let ctx = context();
        let (out, _) = OutputStream::memory();
        let wrapped = ctx.with_output(out, ctx.stderr());

        wrapped.add_to_history("echo hi");
        wrapped.request_exit(3);

        assert_eq!(ctx.history().entries(), ["echo hi"]);
        assert_eq!(ctx.exit_requested(), Some(3));
    }

    #[test]
    fn registry_is_case_sensitive() {
        let ctx = context();
        assert!(ctx.is_builtin("echo"));
        assert!(!ctx.is_builtin("ECHO"));
    }
}
