use anyhow::{Context, Result};
use log::LevelFilter;
use simplelog::{ConfigBuilder, WriteLogger};
use std::fs::OpenOptions;
use std::path::Path;

/// Install the global logger.
///
/// Records go to `file` (appended) or to stderr. Nothing is installed for
/// [`LevelFilter::Off`], so the shell's own output stays clean by default.
pub fn init(level: LevelFilter, file: Option<&Path>) -> Result<()> {
    if level == LevelFilter::Off {
        return Ok(());
    }
    let config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Error)
        .set_thread_level(LevelFilter::Debug)
        .build();
    let installed = match file {
        Some(path) => {
            let sink = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("{}: cannot open log file", path.display()))?;
            WriteLogger::init(level, config, sink)
        }
        None => WriteLogger::init(level, config, std::io::stderr()),
    };
    installed.context("logger already installed")?;
    log::debug!("logging at {level}");
    Ok(())
}
