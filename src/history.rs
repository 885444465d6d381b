//! Command history and its persistence to `HISTFILE`.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Append-only list of entered command lines.
#[derive(Debug, Default, Clone)]
pub struct History {
    entries: Vec<String>,
    /// Number of entries already written by [`History::append_to_file`].
    appended: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.entries.push(line.into());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read `path` and append every non-blank line.
    pub fn load_from_file(&mut self, path: &Path) -> Result<usize> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("{}: cannot read history", path.display()))?;
        let before = self.entries.len();
        self.entries.extend(
            text.lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_owned),
        );
        Ok(self.entries.len() - before)
    }

    /// Replace the contents of `path` with the whole history.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(entry);
            text.push('\n');
        }
        fs::write(path, text).with_context(|| format!("{}: cannot write history", path.display()))
    }

    /// Append entries added since the previous call to `path`.
    pub fn append_to_file(&mut self, path: &Path) -> Result<()> {
        let fresh = &self.entries[self.appended.min(self.entries.len())..];
        if !fresh.is_empty() {
            ensure_parent_dir(path)?;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("{}: cannot open history", path.display()))?;
            for entry in fresh {
                writeln!(file, "{entry}")?;
            }
        }
        self.appended = self.entries.len();
        Ok(())
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => fs::create_dir_all(dir)
            .with_context(|| format!("{}: cannot create directory", dir.display())),
        _ => Ok(()),
    }
}
