//! Switching the controlling terminal between cooked and raw input.

use std::io::{self, IsTerminal};

/// Toggles keystroke-at-a-time input without echo.
///
/// Both calls are idempotent: enabling twice or disabling while not enabled
/// does nothing.
pub trait TerminalMode {
    fn enable_raw_mode(&mut self) -> io::Result<()>;
    fn disable_raw_mode(&mut self) -> io::Result<()>;
}

/// For input that is not a terminal (pipes, files, tests).
#[derive(Debug, Default)]
pub struct NoopTerminal;

impl TerminalMode for NoopTerminal {
    fn enable_raw_mode(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn disable_raw_mode(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// termios-backed raw mode on a file descriptor, stdin by default.
#[cfg(unix)]
pub struct UnixTerminal {
    fd: libc::c_int,
    original: Option<libc::termios>,
}

#[cfg(unix)]
impl UnixTerminal {
    pub fn stdin() -> Self {
        Self {
            fd: libc::STDIN_FILENO,
            original: None,
        }
    }
}

#[cfg(unix)]
impl TerminalMode for UnixTerminal {
    fn enable_raw_mode(&mut self) -> io::Result<()> {
        if self.original.is_some() {
            return Ok(());
        }
        // SAFETY: termios is plain old data and tcgetattr fully initializes it
        // on success; the fd stays open for the life of the process.
        let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
        if unsafe { libc::tcgetattr(self.fd, &mut termios) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let original = termios;
        termios.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ISIG);
        termios.c_cc[libc::VMIN] = 1;
        termios.c_cc[libc::VTIME] = 0;
        if unsafe { libc::tcsetattr(self.fd, libc::TCSANOW, &termios) } != 0 {
            return Err(io::Error::last_os_error());
        }
        self.original = Some(original);
        Ok(())
    }

    fn disable_raw_mode(&mut self) -> io::Result<()> {
        let Some(original) = self.original.take() else {
            return Ok(());
        };
        if unsafe { libc::tcsetattr(self.fd, libc::TCSANOW, &original) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(unix)]
extern "C" fn on_interrupt(_signal: libc::c_int) {}

/// Keep Ctrl-C from killing the shell itself.
///
/// SIGINT gets an empty handler instead of `SIG_IGN`: caught signals go back to
/// their default action on exec, so spawned programs can still be interrupted.
#[cfg(unix)]
pub fn ignore_interrupts() -> io::Result<()> {
    // SAFETY: the handler does nothing, so it is async-signal-safe; sigaction
    // is plain old data filled in before use.
    unsafe {
        let mut action = std::mem::zeroed::<libc::sigaction>();
        action.sa_sigaction = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn ignore_interrupts() -> io::Result<()> {
    Ok(())
}

/// Whether stdin is an interactive terminal.
pub fn stdin_is_tty() -> bool {
    io::stdin().is_terminal()
}

/// The terminal implementation to use for the process's stdin.
#[cfg(unix)]
pub fn for_stdin() -> Box<dyn TerminalMode> {
    if stdin_is_tty() {
        Box::new(UnixTerminal::stdin())
    } else {
        Box::new(NoopTerminal)
    }
}

#[cfg(not(unix))]
pub fn for_stdin() -> Box<dyn TerminalMode> {
    Box::new(NoopTerminal)
}

/// Keeps raw mode on while alive and restores the terminal when dropped,
/// whichever way the scope is left.
pub struct RawModeGuard<'a, T: TerminalMode + ?Sized> {
    terminal: &'a mut T,
}

impl<'a, T: TerminalMode + ?Sized> RawModeGuard<'a, T> {
    pub fn enter(terminal: &'a mut T) -> io::Result<Self> {
        terminal.enable_raw_mode()?;
        Ok(Self { terminal })
    }
}

impl<T: TerminalMode + ?Sized> Drop for RawModeGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(e) = self.terminal.disable_raw_mode() {
            log::warn!("cannot restore terminal mode: {e}");
        }
    }
}
