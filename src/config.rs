//! Command-line flags and their environment fallbacks.

use anyhow::{Result, anyhow, bail};
use argh::FromArgs;
use log::LevelFilter;
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable naming the history file.
pub const HISTFILE_VAR: &str = "HISTFILE";
/// Environment variable holding the log level.
pub const LOG_LEVEL_VAR: &str = "MINISHELL_LOG";

/// Which line editor reads interactive input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorKind {
    /// The built-in raw-mode editor.
    Raw,
    Rustyline,
}

impl FromStr for EditorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(EditorKind::Raw),
            "rustyline" => Ok(EditorKind::Rustyline),
            other => Err(format!("unknown editor {other:?}, expected raw or rustyline")),
        }
    }
}

#[derive(FromArgs, Debug)]
/// A small interactive shell with pipelines, redirections and tab completion.
pub struct Cli {
    #[argh(option, default = "String::from(\"$ \")")]
    /// text shown before each input line.
    pub prompt: String,

    #[argh(option, default = "EditorKind::Raw")]
    /// line editor to use: raw or rustyline.
    pub editor: EditorKind,

    #[argh(option)]
    /// history file loaded at startup and written at exit; defaults to $HISTFILE.
    pub histfile: Option<PathBuf>,

    #[argh(option)]
    /// log verbosity (off, error, warn, info, debug, trace); defaults to $MINISHELL_LOG, then off.
    pub log_level: Option<String>,

    #[argh(option)]
    /// append log records to this file instead of stderr.
    pub log_file: Option<PathBuf>,
}

/// Settings the shell starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub prompt: String,
    pub editor: EditorKind,
    pub histfile: Option<PathBuf>,
    pub log_level: LevelFilter,
    pub log_file: Option<PathBuf>,
}

impl ShellConfig {
    /// Combine flags with the environment looked up through `env`.
    ///
    /// Flags win over environment variables. Empty variables count as unset.
    pub fn resolve(cli: Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |name: &str| env(name).filter(|v| !v.is_empty());

        let histfile = cli.histfile.or_else(|| env(HISTFILE_VAR).map(PathBuf::from));
        let log_level = match cli.log_level.or_else(|| env(LOG_LEVEL_VAR)) {
            Some(raw) => parse_level(&raw)?,
            None => LevelFilter::Off,
        };

        Ok(Self {
            prompt: cli.prompt,
            editor: cli.editor,
            histfile,
            log_level,
            log_file: cli.log_file,
        })
    }

    /// Parse the process arguments and environment.
    pub fn from_env() -> Result<Self> {
        let cli: Cli = argh::from_env();
        Self::resolve(cli, |name| std::env::var(name).ok())
    }
}

fn parse_level(raw: &str) -> Result<LevelFilter> {
    let level = raw.trim();
    if level.is_empty() {
        bail!("empty log level");
    }
    LevelFilter::from_str(level).map_err(|_| anyhow!("invalid log level {raw:?}"))
}
