use crate::context::ShellContext;
use std::io::{Read, Write};
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Generic internal failure.
pub const EXIT_FAILURE: ExitCode = 1;
/// A built-in was invoked with arguments it does not accept.
pub const EXIT_USAGE: ExitCode = 2;
/// Command name could not be resolved to a built-in or an executable.
pub const EXIT_NOT_FOUND: ExitCode = 127;

/// Abstraction over a readable input stream that a child process may also
/// read directly.
///
/// Implementors wrap standard input or an in-memory buffer. When [`Stdin::stdio`]
/// returns `None` the stream lives only inside the shell and its bytes have to be
/// copied into the child through a pipe.
pub trait Stdin: Read + Send {
    /// A handle suitable for `std::process::Command`, if the stream has one.
    fn stdio(&self) -> Option<Stdio>;
}

/// Abstraction over a writable output stream that a child process may also
/// write to directly.
///
/// Same contract as [`Stdin`]: `None` means the child's output has to be pumped
/// back into this writer by the shell.
pub trait Stdout: Write + Send {
    /// A handle suitable for `std::process::Command`, if the stream has one.
    fn stdio(&self) -> Option<Stdio>;

    /// Close the underlying handle. Later writes fail.
    fn close(&mut self) {}
}

/// Object-safe trait for anything the shell can execute by name.
///
/// Built-ins implement it through [`crate::builtin::Builtin`]; the router and
/// the pipeline executor only ever see this trait.
pub trait Command: Send + Sync {
    /// Name used to invoke the command, matched case-sensitively.
    fn name(&self) -> &str;

    /// Run with `args` (command name excluded) against the streams of `ctx`.
    ///
    /// Failures are reported on the context's streams and folded into the exit code;
    /// callers never inspect the cause.
    fn execute(&self, args: &[String], ctx: &ShellContext) -> ExitCode;
}
