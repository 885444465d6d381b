//! A module implementing lexical analysis (tokenization) of a command line.
//!
//! The lexer never fails: an unterminated quote simply stays open until the end
//! of the line and whatever it collected is still emitted as a word.

/// The pipe operator as it appears in the token stream.
pub const PIPE: &str = "|";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Normal,
    SingleQuote,
    DoubleQuote,
    /// An unquoted backslash was read; the next character is taken literally.
    Escape,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
    /// Set once the current word has content or an (possibly empty) quoted part.
    in_word: bool,
    out: Vec<String>,
}

impl LexingFSM {
    /// Creates a new instance of the lexical analysis Finite State Machine.
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Normal,
            buffer: String::new(),
            in_word: false,
            out: Vec::new(),
        }
    }

    /// Runs the machine over the whole input and returns the words.
    fn make_tokens(mut self) -> Vec<String> {
        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Normal => self.handle_normal(ch),
                LexingState::SingleQuote => self.handle_single_quote(ch),
                LexingState::DoubleQuote => self.handle_double_quote(ch),
                LexingState::Escape => {
                    self.push(ch);
                    self.state = LexingState::Normal;
                }
            }
        }

        // A dangling backslash has nothing to escape and is dropped.
        self.finish_word();
        self.out
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn push(&mut self, ch: char) {
        self.buffer.push(ch);
        self.in_word = true;
    }

    fn finish_word(&mut self) {
        if self.in_word {
            self.out.push(std::mem::take(&mut self.buffer));
            self.in_word = false;
        }
    }

    fn handle_normal(&mut self, ch: char) {
        match ch {
            c if c.is_whitespace() => self.finish_word(),
            '|' => {
                self.finish_word();
                self.out.push(PIPE.to_owned());
            }
            '\\' => self.state = LexingState::Escape,
            '\'' => {
                self.in_word = true;
                self.state = LexingState::SingleQuote;
            }
            '"' => {
                self.in_word = true;
                self.state = LexingState::DoubleQuote;
            }
            c => self.push(c),
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::Normal,
            c => self.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.state = LexingState::Normal,
            '\\' => match self.peek_char() {
                Some(next @ ('\\' | '"' | '$' | '`')) => {
                    self.read_char();
                    self.push(next);
                }
                _ => self.push('\\'),
            },
            c => self.push(c),
        }
    }
}

/// Split a command line into words, honoring quotes and backslash escapes.
///
/// Unquoted `|` is always returned as a standalone [`PIPE`] token. Redirection
/// operators are ordinary words here and are recognized by the parser.
pub fn tokenize(line: &str) -> Vec<String> {
    LexingFSM::new(line).make_tokens()
}
