//! Helpers shared by the unit tests of several modules.

use crate::builtin;
use crate::context::ShellContext;
use crate::external::SearchPath;
use crate::io_adapters::{InputStream, OutputStream, SharedBuffer};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// A context over in-memory streams plus handles to what was written.
pub struct Captured {
    pub ctx: ShellContext,
    stdout: SharedBuffer,
    stderr: SharedBuffer,
}

impl Captured {
    /// Default built-ins, process `PATH`, empty stdin.
    pub fn new() -> Self {
        Self::with_stdin(Vec::new())
    }

    pub fn with_stdin(input: impl Into<Vec<u8>>) -> Self {
        let (out, stdout) = OutputStream::memory();
        let (err, stderr) = OutputStream::memory();
        let ctx = ShellContext::with_streams(
            builtin::defaults(),
            Arc::new(SearchPath::from_env()),
            InputStream::from_bytes(input.into()),
            out,
            err,
        );
        Self {
            ctx,
            stdout,
            stderr,
        }
    }

    pub fn out(&self) -> String {
        String::from_utf8_lossy(&self.stdout.lock().unwrap()).into_owned()
    }

    pub fn err(&self) -> String {
        String::from_utf8_lossy(&self.stderr.lock().unwrap()).into_owned()
    }
}

/// Serializes tests that read or change the process working directory.
pub fn lock_current_dir() -> MutexGuard<'static, ()> {
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}
