use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<char, TrieNode>,
    /// The full word ending at this node, if any.
    word: Option<String>,
}

/// Prefix tree over command names.
///
/// Lookups walk the prefix and then only the subtree below it, so their cost
/// depends on the prefix length and on how many words match, never on the total
/// number of words stored.
#[derive(Debug, Default)]
pub struct CompletionTrie {
    root: TrieNode,
    len: usize,
}

impl CompletionTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `word`. Inserting a word twice has no effect; empty words are ignored.
    pub fn insert(&mut self, word: &str) {
        if word.is_empty() {
            return;
        }
        let mut node = &mut self.root;
        for ch in word.chars() {
            node = node.children.entry(ch).or_default();
        }
        if node.word.is_none() {
            node.word = Some(word.to_owned());
            self.len += 1;
        }
    }

    /// All stored words starting with `prefix` (case-sensitive). An empty prefix
    /// matches everything.
    pub fn matches_with_prefix(&self, prefix: &str) -> HashSet<String> {
        let mut node = &self.root;
        for ch in prefix.chars() {
            match node.children.get(&ch) {
                Some(next) => node = next,
                None => return HashSet::new(),
            }
        }

        let mut found = HashSet::new();
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            if let Some(word) = &node.word {
                found.insert(word.clone());
            }
            stack.extend(node.children.values());
        }
        found
    }

    /// Number of distinct words stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.root = TrieNode::default();
        self.len = 0;
    }
}

impl<S: AsRef<str>> FromIterator<S> for CompletionTrie {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut trie = CompletionTrie::new();
        for word in iter {
            trie.insert(word.as_ref());
        }
        trie
    }
}
