//! Binding `>`/`2>` style targets to output streams for one command.

use crate::context::ShellContext;
use crate::io_adapters::{FileWriter, OutputStream};
use crate::parser::RedirectionInfo;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;

/// Files opened for a redirection, closed by [`Redirection::release`] or on drop.
#[derive(Default)]
pub struct Redirection {
    opened: Vec<OutputStream>,
    released: bool,
}

impl Redirection {
    /// Close every opened target. Calling it again does nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for stream in self.opened.drain(..) {
            stream.close();
        }
    }
}

impl Drop for Redirection {
    fn drop(&mut self) {
        self.release();
    }
}

/// Derive a context whose stdout/stderr point to the targets in `info`.
///
/// Missing parent directories are created. Streams without a target are the
/// very same streams as in `ctx`.
pub fn apply(ctx: &ShellContext, info: &RedirectionInfo) -> Result<(ShellContext, Redirection)> {
    let mut guard = Redirection::default();

    let stdout = match &info.stdout_file {
        Some(path) => open_target(&mut guard, path, info.append_stdout)?,
        None => ctx.stdout(),
    };
    let stderr = match &info.stderr_file {
        Some(path) => open_target(&mut guard, path, info.append_stderr)?,
        None => ctx.stderr(),
    };

    Ok((ctx.with_output(stdout, stderr), guard))
}

fn open_target(guard: &mut Redirection, path: &Path, append: bool) -> Result<OutputStream> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("{}: cannot create directory", parent.display()))?;
    }
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .with_context(|| format!("{}: cannot open for writing", path.display()))?;
    log::debug!("redirect to {} (append: {append})", path.display());

    let stream = OutputStream::new(FileWriter::new(file));
    guard.opened.push(stream.clone());
    Ok(stream)
}
