//! Reading command lines: a raw-mode line editor with history and tab
//! completion, and a `rustyline`-based alternative.

use crate::completion::{CompletionProvider, ShellHelper};
use crate::terminal::{RawModeGuard, TerminalMode};
use anyhow::{Context, Result};
use rustyline::Editor;
use rustyline::config::{CompletionType, Config};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use std::io::{self, Read, Write};
use std::sync::Arc;

const BELL: &str = "\x07";
const ERASE: &str = "\x08 \x08";
const CLEAR_LINE: &str = "\r\x1b[K";

/// Produces command lines for the REPL.
pub trait InputHandler {
    /// Show `prompt` and read one line.
    ///
    /// `history` holds the earlier lines, oldest first. `Ok(None)` means end of
    /// input and stops the REPL.
    fn read_input(&mut self, prompt: &str, history: &[String]) -> Result<Option<String>>;
}

/// A decoded keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Up,
    Down,
    /// Ctrl-D.
    CtrlD,
    /// Ctrl-C.
    Interrupt,
    /// The input stream is exhausted.
    Eof,
    /// Anything the editor ignores.
    Other,
}

pub trait KeySource {
    fn read_key(&mut self) -> io::Result<Key>;
}

/// Decodes keys from a byte stream, typically the terminal in raw mode.
pub struct ByteKeys<R> {
    reader: R,
}

impl<R: Read> ByteKeys<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// `ESC [ A` and `ESC O A` style arrow sequences. Any other CSI sequence
    /// (Delete, Home, PageUp, ...) is consumed up to its final byte.
    fn escape(&mut self) -> io::Result<Key> {
        match self.next_byte()? {
            Some(b'O') => Ok(match self.next_byte()? {
                Some(b'A') => Key::Up,
                Some(b'B') => Key::Down,
                _ => Key::Other,
            }),
            Some(b'[') => self.csi(),
            _ => Ok(Key::Other),
        }
    }

    fn csi(&mut self) -> io::Result<Key> {
        let mut bare = true;
        loop {
            match self.next_byte()? {
                // parameter and intermediate bytes
                Some(0x20..=0x3f) => bare = false,
                Some(b'A') if bare => return Ok(Key::Up),
                Some(b'B') if bare => return Ok(Key::Down),
                // final byte, or a malformed sequence
                _ => return Ok(Key::Other),
            }
        }
    }

    fn utf8(&mut self, first: u8) -> io::Result<Key> {
        let width = match first.leading_ones() {
            0 => 1,
            2 => 2,
            3 => 3,
            4 => 4,
            _ => return Ok(Key::Other),
        };
        let mut bytes = vec![first];
        for _ in 1..width {
            match self.next_byte()? {
                Some(b) => bytes.push(b),
                None => return Ok(Key::Other),
            }
        }
        Ok(std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.chars().next())
            .map_or(Key::Other, Key::Char))
    }
}

impl<R: Read> KeySource for ByteKeys<R> {
    fn read_key(&mut self) -> io::Result<Key> {
        let Some(byte) = self.next_byte()? else {
            return Ok(Key::Eof);
        };
        match byte {
            b'\r' | b'\n' => Ok(Key::Enter),
            b'\t' => Ok(Key::Tab),
            0x7f | 0x08 => Ok(Key::Backspace),
            0x03 => Ok(Key::Interrupt),
            0x04 => Ok(Key::CtrlD),
            0x1b => self.escape(),
            b if b < 0x20 => Ok(Key::Other),
            b => self.utf8(b),
        }
    }
}

/// Per-line editing state.
#[derive(Debug, Default)]
pub struct InputState {
    pub buffer: String,
    /// Buffer contents at the previous Tab, while no other key was pressed since.
    pub last_tab_prefix: Option<String>,
    /// Whether that Tab found several matches without extending the buffer.
    pub last_tab_was_ambiguous: bool,
    /// Index into history; equal to its length at the live line.
    pub history_cursor: usize,
    /// The live line, stashed while browsing history.
    pub saved_current_input: Option<String>,
}

impl InputState {
    fn new(history_len: usize) -> Self {
        Self {
            history_cursor: history_len,
            ..Self::default()
        }
    }

    fn reset_tab(&mut self) {
        self.last_tab_prefix = None;
        self.last_tab_was_ambiguous = false;
    }
}

/// Keystroke-driven line editor.
///
/// Puts the terminal in raw mode for the duration of each
/// [`InputHandler::read_input`] call and echoes everything itself.
pub struct LineEditor<K, W> {
    keys: K,
    out: W,
    terminal: Box<dyn TerminalMode>,
    completion: Arc<dyn CompletionProvider>,
}

impl<K: KeySource, W: Write> LineEditor<K, W> {
    pub fn new(
        keys: K,
        out: W,
        terminal: Box<dyn TerminalMode>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            keys,
            out,
            terminal,
            completion,
        }
    }
}

impl<K: KeySource, W: Write> InputHandler for LineEditor<K, W> {
    fn read_input(&mut self, prompt: &str, history: &[String]) -> Result<Option<String>> {
        let _raw = RawModeGuard::enter(self.terminal.as_mut()).context("cannot enter raw mode")?;
        let mut edit = Edit {
            out: &mut self.out,
            prompt,
            history,
            completion: self.completion.as_ref(),
            state: InputState::new(history.len()),
        };
        write!(edit.out, "{prompt}")?;
        edit.out.flush()?;

        loop {
            let key = self.keys.read_key().context("reading key")?;
            if let Some(done) = edit.handle(key)? {
                return Ok(done);
            }
            edit.out.flush()?;
        }
    }
}

/// One `read_input` call in progress.
struct Edit<'a, W> {
    out: &'a mut W,
    prompt: &'a str,
    history: &'a [String],
    completion: &'a dyn CompletionProvider,
    state: InputState,
}

impl<W: Write> Edit<'_, W> {
    /// Apply `key`. `Some` ends the call with that result.
    fn handle(&mut self, key: Key) -> io::Result<Option<Option<String>>> {
        if key != Key::Tab {
            self.state.reset_tab();
        }
        match key {
            Key::Enter => return self.finish(),
            Key::Eof if self.state.buffer.is_empty() => return Ok(Some(None)),
            Key::Eof => return self.finish(),
            // Drop the line and start over, as rustyline does.
            Key::Interrupt => {
                writeln!(self.out, "^C")?;
                self.out.flush()?;
                return Ok(Some(Some(String::new())));
            }
            Key::CtrlD if self.state.buffer.is_empty() => {
                writeln!(self.out)?;
                self.out.flush()?;
                return Ok(Some(None));
            }
            Key::Char(c) => {
                self.state.buffer.push(c);
                write!(self.out, "{c}")?;
            }
            Key::Backspace => {
                if self.state.buffer.pop().is_some() {
                    self.out.write_all(ERASE.as_bytes())?;
                }
            }
            Key::Up => self.history_up()?,
            Key::Down => self.history_down()?,
            Key::Tab => self.complete()?,
            Key::CtrlD | Key::Other => {}
        }
        Ok(None)
    }

    fn finish(&mut self) -> io::Result<Option<Option<String>>> {
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(Some(Some(std::mem::take(&mut self.state.buffer))))
    }

    fn history_up(&mut self) -> io::Result<()> {
        if self.history.is_empty() {
            return Ok(());
        }
        let state = &mut self.state;
        if state.history_cursor >= self.history.len() {
            state.saved_current_input = Some(state.buffer.clone());
        }
        state.history_cursor = state.history_cursor.min(self.history.len()).saturating_sub(1);
        state.buffer = self.history[state.history_cursor].clone();
        self.redraw()
    }

    fn history_down(&mut self) -> io::Result<()> {
        let state = &mut self.state;
        if state.history_cursor >= self.history.len() {
            return Ok(());
        }
        state.history_cursor += 1;
        state.buffer = match self.history.get(state.history_cursor) {
            Some(entry) => entry.clone(),
            None => state.saved_current_input.take().unwrap_or_default(),
        };
        self.redraw()
    }

    fn redraw(&mut self) -> io::Result<()> {
        write!(self.out, "{CLEAR_LINE}{}{}", self.prompt, self.state.buffer)
    }

    fn bell(&mut self) -> io::Result<()> {
        self.out.write_all(BELL.as_bytes())
    }

    /// Replace the buffer with `text`, echoing only what was appended.
    fn extend_to(&mut self, text: String) -> io::Result<()> {
        match text.strip_prefix(self.state.buffer.as_str()) {
            Some(rest) => write!(self.out, "{rest}")?,
            None => write!(self.out, "{CLEAR_LINE}{}{text}", self.prompt)?,
        }
        self.state.buffer = text;
        Ok(())
    }

    fn complete(&mut self) -> io::Result<()> {
        let matches = self.completion.completions(&self.state.buffer);
        match matches.as_slice() {
            [] => {
                self.state.reset_tab();
                self.bell()
            }
            [only] => {
                self.state.reset_tab();
                self.extend_to(format!("{only} "))
            }
            _ => {
                let common = longest_common_prefix(&matches);
                if common.len() > self.state.buffer.len() {
                    // Every match starts with `common`, so it stays ambiguous: no space.
                    self.state.reset_tab();
                    return self.extend_to(common);
                }
                let repeated = self.state.last_tab_was_ambiguous
                    && self.state.last_tab_prefix.as_deref() == Some(self.state.buffer.as_str());
                if repeated {
                    self.state.reset_tab();
                    write!(
                        self.out,
                        "\n{}\n{}{}",
                        matches.join("  "),
                        self.prompt,
                        self.state.buffer
                    )
                } else {
                    self.state.last_tab_prefix = Some(self.state.buffer.clone());
                    self.state.last_tab_was_ambiguous = true;
                    self.bell()
                }
            }
        }
    }
}

/// Longest prefix shared by every word, compared char by char.
fn longest_common_prefix(words: &[String]) -> String {
    let Some((first, rest)) = words.split_first() else {
        return String::new();
    };
    let mut end = first.len();
    for word in rest {
        end = first
            .char_indices()
            .zip(word.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map_or(0, |((i, a), _)| i + a.len_utf8())
            .min(end);
    }
    first[..end].to_owned()
}

/// [`InputHandler`] on top of `rustyline`, for terminals where its richer
/// editing is preferred.
pub struct RustylineInput {
    editor: Editor<ShellHelper, DefaultHistory>,
    /// How many shell history entries were handed to the editor so far.
    fed: usize,
}

impl RustylineInput {
    pub fn new(completion: Arc<dyn CompletionProvider>) -> Result<Self> {
        let config = Config::builder()
            .completion_type(CompletionType::List)
            .auto_add_history(false)
            .build();
        let mut editor = Editor::with_config(config).context("cannot initialize rustyline")?;
        editor.set_helper(Some(ShellHelper::new(completion)));
        Ok(Self { editor, fed: 0 })
    }
}

impl InputHandler for RustylineInput {
    fn read_input(&mut self, prompt: &str, history: &[String]) -> Result<Option<String>> {
        if history.len() < self.fed {
            self.editor.clear_history()?;
            self.fed = 0;
        }
        for entry in &history[self.fed..] {
            self.editor.add_history_entry(entry.as_str())?;
        }
        self.fed = history.len();

        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            // Ctrl-C drops the current line, as in other shells.
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
