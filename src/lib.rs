//! A small POSIX-like interactive shell.
//!
//! Command lines are tokenized with shell quoting rules, split into pipeline
//! segments, stripped of their `>`/`2>` style redirections and dispatched either
//! to built-in commands implemented in Rust or to external programs found on
//! `PATH`. Built-in and external stages can be mixed freely in one pipeline.
//!
//! The main entry point is [`Interpreter`], which routes single lines with
//! [`Interpreter::route`] and drives the read-eval-print loop with
//! [`Interpreter::repl`]. Interactive input comes from an
//! [`input::InputHandler`]: either the raw-mode [`input::LineEditor`] with
//! history navigation and tab completion, or [`input::RustylineInput`].

pub mod builtin;
pub mod command;
pub mod completion;
pub mod config;
pub mod context;
pub mod external;
pub mod history;
pub mod input;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod redirect;
pub mod terminal;
mod trie;

#[cfg(test)]
mod testutil;

pub use command::{Command, ExitCode};
pub use context::ShellContext;
pub use external::{PathResolver, SearchPath};
/// The command-line router and REPL driver.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
pub use io_adapters::{InputStream, OutputStream};
pub use lexer::tokenize;
pub use parser::{RedirectionInfo, parse_redirection, split_pipeline};
pub use trie::CompletionTrie;
