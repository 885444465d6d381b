//! Turns a token sequence into something executable: pipeline segments and
//! the redirections of a single command.

use crate::lexer::PIPE;
use std::path::PathBuf;

/// Which standard stream a redirection operator rebinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Operator tokens, matched exactly, with the stream they target and whether
/// they append.
const OPERATORS: [(&str, Stream, bool); 6] = [
    (">", Stream::Stdout, false),
    ("1>", Stream::Stdout, false),
    (">>", Stream::Stdout, true),
    ("1>>", Stream::Stdout, true),
    ("2>", Stream::Stderr, false),
    ("2>>", Stream::Stderr, true),
];

/// A command with its output redirections pulled out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectionInfo {
    /// The command name and its arguments, with no operator or target left in.
    pub command_parts: Vec<String>,
    pub stdout_file: Option<PathBuf>,
    pub stderr_file: Option<PathBuf>,
    /// Open `stdout_file` in append mode instead of truncating it.
    pub append_stdout: bool,
    /// Open `stderr_file` in append mode instead of truncating it.
    pub append_stderr: bool,
}

impl RedirectionInfo {
    /// True when neither stream is redirected.
    pub fn is_empty(&self) -> bool {
        self.stdout_file.is_none() && self.stderr_file.is_none()
    }
}

/// Extract `>`, `1>`, `2>`, `>>`, `1>>` and `2>>` from `tokens`.
///
/// Each operator takes the next token as its target, whatever it is. An operator
/// with nothing after it is dropped. When a stream is redirected more than once
/// the last operator wins, for the target as well as for the append flag.
pub fn parse_redirection(tokens: &[String]) -> RedirectionInfo {
    let mut info = RedirectionInfo::default();
    let mut iter = tokens.iter();

    while let Some(token) = iter.next() {
        let Some(&(_, stream, append)) = OPERATORS.iter().find(|(op, _, _)| op == token) else {
            info.command_parts.push(token.clone());
            continue;
        };
        let Some(target) = iter.next() else {
            break;
        };
        let target = Some(PathBuf::from(target));
        match stream {
            Stream::Stdout => {
                info.stdout_file = target;
                info.append_stdout = append;
            }
            Stream::Stderr => {
                info.stderr_file = target;
                info.append_stderr = append;
            }
        }
    }

    info
}

/// Split `tokens` on `|` into pipeline segments.
///
/// Leading, trailing or doubled pipes never produce an empty segment. Input
/// without any pipe comes back as a single segment.
pub fn split_pipeline(tokens: &[String]) -> Vec<Vec<String>> {
    tokens
        .split(|t| t == PIPE)
        .filter(|segment| !segment.is_empty())
        .map(<[String]>::to_vec)
        .collect()
}
