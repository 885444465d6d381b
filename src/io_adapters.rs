use crate::command::{Stdin, Stdout};
use std::fs::File;
use std::io::{self, Cursor, Read, Result as IoResult, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Bytes collected by a [`MemWriter`], readable after the writer is gone.
pub type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Memory-backed reader for builtins.
///
/// Public so it can be constructed from other modules.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(buf),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

impl Stdin for MemReader {
    fn stdio(&self) -> Option<Stdio> {
        None
    }
}

/// Memory-backed writer for capturing output of builtins.
pub struct MemWriter {
    buf: SharedBuffer,
}

impl MemWriter {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Convenience: create writer and return (writer, handle).
    pub fn with_handle() -> (Self, SharedBuffer) {
        let mw = MemWriter::new();
        let handle = mw.buf.clone();
        (mw, handle)
    }
}

impl Default for MemWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        lock(&self.buf).extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl Stdout for MemWriter {
    fn stdio(&self) -> Option<Stdio> {
        None
    }
}

/// Take everything written into a [`SharedBuffer`] so far.
pub fn take_buffer(buf: &SharedBuffer) -> Vec<u8> {
    std::mem::take(&mut *lock(buf))
}

/// Process standard input, handed to children as-is.
pub struct InheritedStdin(io::Stdin);

impl InheritedStdin {
    pub fn new() -> Self {
        Self(io::stdin())
    }
}

impl Read for InheritedStdin {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.0.read(buf)
    }
}

impl Stdin for InheritedStdin {
    fn stdio(&self) -> Option<Stdio> {
        Some(Stdio::inherit())
    }
}

/// Process standard output, handed to children as-is.
pub struct InheritedStdout(io::Stdout);

impl InheritedStdout {
    pub fn new() -> Self {
        Self(io::stdout())
    }
}

impl Write for InheritedStdout {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.0.flush()
    }
}

impl Stdout for InheritedStdout {
    fn stdio(&self) -> Option<Stdio> {
        Some(Stdio::inherit())
    }
}

/// Process standard error, handed to children as-is.
pub struct InheritedStderr(io::Stderr);

impl InheritedStderr {
    pub fn new() -> Self {
        Self(io::stderr())
    }
}

impl Write for InheritedStderr {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.0.flush()
    }
}

impl Stdout for InheritedStderr {
    fn stdio(&self) -> Option<Stdio> {
        Some(Stdio::inherit())
    }
}

/// Unbuffered file sink used for redirections.
///
/// Every write goes straight to the OS, so two sinks on the same path never
/// hold back each other's bytes.
pub struct FileWriter {
    file: Option<File>,
}

impl FileWriter {
    pub fn new(file: File) -> Self {
        Self { file: Some(file) }
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        match self.file.as_mut() {
            Some(f) => f.write(buf),
            None => Err(io::Error::other("redirection target already closed")),
        }
    }

    fn flush(&mut self) -> IoResult<()> {
        match self.file.as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

impl Stdout for FileWriter {
    fn stdio(&self) -> Option<Stdio> {
        self.file
            .as_ref()
            .and_then(|f| f.try_clone().ok())
            .map(Stdio::from)
    }

    fn close(&mut self) {
        self.file.take();
    }
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared, cloneable handle to an input stream.
///
/// Clones refer to the same underlying reader; [`InputStream::ptr_eq`] tells
/// whether two handles are the same stream.
#[derive(Clone)]
pub struct InputStream(Arc<Mutex<Box<dyn Stdin>>>);

impl InputStream {
    pub fn new(inner: impl Stdin + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(inner))))
    }

    /// Stream over a fixed set of bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(MemReader::new(bytes))
    }

    pub fn stdio(&self) -> Option<Stdio> {
        lock(&self.0).stdio()
    }

    pub fn ptr_eq(&self, other: &InputStream) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        lock(&self.0).read(buf)
    }
}

/// Shared, cloneable handle to an output stream.
#[derive(Clone)]
pub struct OutputStream(Arc<Mutex<Box<dyn Stdout>>>);

impl OutputStream {
    pub fn new(inner: impl Stdout + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(inner))))
    }

    /// In-memory stream plus the handle to read what was written into it.
    pub fn memory() -> (Self, SharedBuffer) {
        let (writer, handle) = MemWriter::with_handle();
        (Self::new(writer), handle)
    }

    pub fn stdio(&self) -> Option<Stdio> {
        lock(&self.0).stdio()
    }

    pub fn close(&self) {
        lock(&self.0).close();
    }

    pub fn ptr_eq(&self, other: &OutputStream) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        lock(&self.0).write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> IoResult<()> {
        lock(&self.0).write_all(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        lock(&self.0).flush()
    }
}
