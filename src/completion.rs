//! Command-name completion shared by both line editors.

use crate::context::ShellContext;
use crate::external::SearchPath;
use crate::trie::CompletionTrie;
use rustyline::Helper;
use rustyline::completion::Completer;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use std::sync::{Arc, OnceLock};

/// Answers "which known command names start with this text?".
pub trait CompletionProvider: Send + Sync {
    /// Every candidate starting with `prefix`, sorted.
    fn completions(&self, prefix: &str) -> Vec<String>;
}

fn sorted_matches(trie: &CompletionTrie, prefix: &str) -> Vec<String> {
    let mut found: Vec<String> = trie.matches_with_prefix(prefix).into_iter().collect();
    found.sort();
    found
}

/// Built-in names plus every executable on the search path.
///
/// The search path is scanned on first use, not at construction.
pub struct CommandCompletion {
    builtins: Vec<String>,
    path: SearchPath,
    trie: OnceLock<CompletionTrie>,
}

impl CommandCompletion {
    pub fn new(ctx: &ShellContext, path: SearchPath) -> Self {
        Self {
            builtins: ctx.commands().keys().cloned().collect(),
            path,
            trie: OnceLock::new(),
        }
    }

    fn trie(&self) -> &CompletionTrie {
        self.trie.get_or_init(|| {
            let executables = self.path.executables();
            log::debug!(
                "completion index: {} built-ins, {} executables",
                self.builtins.len(),
                executables.len()
            );
            self.builtins
                .iter()
                .chain(executables.iter())
                .map(String::as_str)
                .collect()
        })
    }
}

impl CompletionProvider for CommandCompletion {
    fn completions(&self, prefix: &str) -> Vec<String> {
        sorted_matches(self.trie(), prefix)
    }
}

/// A fixed word list.
#[derive(Default)]
pub struct WordList(CompletionTrie);

impl<S: AsRef<str>> FromIterator<S> for WordList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl CompletionProvider for WordList {
    fn completions(&self, prefix: &str) -> Vec<String> {
        sorted_matches(&self.0, prefix)
    }
}

/// `rustyline` helper completing the word under the cursor.
pub struct ShellHelper {
    provider: Arc<dyn CompletionProvider>,
}

impl ShellHelper {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }
}

impl Completer for ShellHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let before = &line[..pos];
        let start = before
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map_or(0, |(i, c)| i + c.len_utf8());
        let mut found = self.provider.completions(&before[start..]);
        if let [only] = found.as_mut_slice() {
            only.push(' ');
        }
        Ok((start, found))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Highlighter for ShellHelper {}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Captured;
    use rustyline::history::DefaultHistory;

    #[test]
    fn word_list_is_sorted() {
        let words: WordList = ["exit", "echo", "export", "cd"].into_iter().collect();
        assert_eq!(words.completions("e"), ["echo", "exit", "export"]);
        assert!(words.completions("z").is_empty());
    }

    #[test]
    fn command_completion_includes_builtins_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("histogram_tool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let cap = Captured::new();
        let provider = CommandCompletion::new(&cap.ctx, SearchPath::new(dir.path().as_os_str()));
        assert_eq!(provider.completions("hist"), ["histogram_tool", "history"]);
        assert_eq!(provider.completions("ech"), ["echo"]);
    }

    #[test]
    fn helper_completes_last_word() {
        let words: WordList = ["echo", "exit", "export"].into_iter().collect();
        let helper = ShellHelper::new(Arc::new(words));
        let history = DefaultHistory::new();
        let ctx = rustyline::Context::new(&history);

        let (start, found) = helper.complete("ech", 3, &ctx).unwrap();
        assert_eq!((start, found), (0, vec!["echo ".to_string()]));

        let (start, found) = helper.complete("ls ex", 5, &ctx).unwrap();
        assert_eq!((start, found), (3, vec!["exit".to_string(), "export".to_string()]));
    }
}
