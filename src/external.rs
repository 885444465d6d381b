use crate::command::ExitCode;
use crate::context::ShellContext;
use crate::io_adapters::OutputStream;
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

/// Maps a command name to the executable that would run for it.
pub trait PathResolver: Send + Sync {
    /// Full path of the executable for `name`, or `None` when nothing matches.
    fn resolve(&self, name: &str) -> Option<PathBuf>;
}

/// [`PathResolver`] searching the directories of a `PATH`-style list.
///
/// Without an explicit list the `PATH` environment variable is read on every
/// lookup, so changes made after startup are honored.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    paths: Option<OsString>,
}

impl SearchPath {
    /// Resolver over the process `PATH`.
    pub fn from_env() -> Self {
        Self { paths: None }
    }

    /// Resolver over a fixed search list, e.g. `"/usr/bin:/bin"`.
    pub fn new(paths: impl Into<OsString>) -> Self {
        Self {
            paths: Some(paths.into()),
        }
    }

    fn search_paths(&self) -> OsString {
        self.paths
            .clone()
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default()
    }

    /// Names of every executable reachable through the search list, without
    /// platform executable extensions.
    pub fn executables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for dir in std::env::split_paths(&self.search_paths()) {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                log::trace!("skipping unreadable PATH entry {}", dir.display());
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !is_executable(&path) {
                    continue;
                }
                let name = if cfg!(windows) {
                    path.file_stem()
                } else {
                    path.file_name()
                };
                if let Some(name) = name.and_then(OsStr::to_str) {
                    names.insert(name.to_owned());
                }
            }
        }
        names
    }
}

impl PathResolver for SearchPath {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let found = find_command_path(&self.search_paths(), Path::new(name)).map(Cow::into_owned);
        log::trace!("resolve {name} -> {found:?}");
        found
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is an executable file.
/// - Relative with multiple components (e.g., `bin/sh`) or `./`-prefixed: returns it
///   if it is an executable file.
/// - Single path component (no separators): search each directory in `search_paths`
///   (PATH) and return the first executable match.
/// - Empty path: returns `None`.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        // Empty path -> not found
        (None, _) => None,
        // Single component -> search in PATH
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        // Multiple components -> relative to the current dir
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        for candidate in candidates(cmd) {
            let path = dir.join(candidate);
            if is_executable(&path) {
                return Some(path);
            }
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if is_executable(path) { Some(path) } else { None }
}

/// File names to try for `cmd`: the name itself, plus every `PATHEXT`
/// extension on Windows when the name has none.
fn candidates(cmd: &OsStr) -> Vec<OsString> {
    let mut out = vec![cmd.to_owned()];
    if cfg!(windows) && Path::new(cmd).extension().is_none() {
        let pathext = std::env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".into());
        for ext in pathext.split(';').filter(|e| !e.is_empty()) {
            let mut name = cmd.to_owned();
            if !ext.starts_with('.') {
                name.push(".");
            }
            name.push(ext);
            out.push(name);
        }
    }
    out
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Build the process for `name` resolved to `path`, keeping `name` as argv[0].
pub(crate) fn command_for(name: &str, path: &Path, args: &[String]) -> std::process::Command {
    let mut cmd = std::process::Command::new(path);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.arg0(name);
    }
    #[cfg(not(unix))]
    let _ = name;
    cmd.args(args);
    cmd
}

/// Stdio for a child writing into `stream`, plus the stream itself when the
/// shell has to pump the child's output into it.
pub(crate) fn output_stdio(stream: &OutputStream) -> (Stdio, Option<OutputStream>) {
    match stream.stdio() {
        Some(stdio) => (stdio, None),
        None => (Stdio::piped(), Some(stream.clone())),
    }
}

/// Copy everything from `from` into `to` on a background thread.
pub(crate) fn pump(mut from: impl Read + Send + 'static, mut to: OutputStream) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(e) = io::copy(&mut from, &mut to) {
            log::debug!("output pump stopped: {e}");
        }
        let _ = to.flush();
    })
}

/// Write all of `from` into a child's stdin on a background thread, then close it.
pub(crate) fn feed(mut to: ChildStdin, mut from: impl Read + Send + 'static) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(e) = io::copy(&mut from, &mut to) {
            // The child may exit without reading everything.
            if e.kind() != io::ErrorKind::BrokenPipe {
                log::debug!("stdin feeder stopped: {e}");
            }
        }
    })
}

/// Exit code of a finished child, following the shell convention for signals.
pub(crate) fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(x) => x,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Kill `child` if it is still running and reap it.
pub(crate) fn terminate(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(_)) => {}
        _ => {
            if let Err(e) = child.kill() {
                log::debug!("kill {}: {e}", child.id());
            }
            let _ = child.wait();
        }
    }
}

/// Run the executable at `path` as `name` with the streams of `ctx` and wait
/// for it.
pub fn run(name: &str, path: &Path, args: &[String], ctx: &ShellContext) -> Result<ExitCode> {
    let _ = ctx.stdout().flush();
    let _ = ctx.stderr().flush();

    let stdin = ctx.stdin();
    let (in_io, feed_from) = match stdin.stdio() {
        Some(stdio) => (stdio, None),
        None => (Stdio::piped(), Some(stdin)),
    };
    let (out_io, out_pump) = output_stdio(&ctx.stdout());
    let (err_io, err_pump) = output_stdio(&ctx.stderr());

    let mut child = command_for(name, path, args)
        .stdin(in_io)
        .stdout(out_io)
        .stderr(err_io)
        .spawn()
        .with_context(|| format!("{name}: cannot execute {}", path.display()))?;
    log::debug!("spawned {name} as pid {}", child.id());

    let mut workers = Vec::new();
    if let Some(src) = feed_from {
        if let Some(pipe) = child.stdin.take() {
            workers.push(feed(pipe, src));
        }
    }
    if let Some(dst) = out_pump {
        if let Some(pipe) = child.stdout.take() {
            workers.push(pump(pipe, dst));
        }
    }
    if let Some(dst) = err_pump {
        if let Some(pipe) = child.stderr.take() {
            workers.push(pump(pipe, dst));
        }
    }

    let status = child.wait().with_context(|| format!("{name}: wait failed"));
    for worker in workers {
        let _ = worker.join();
    }
    Ok(exit_code(status?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::fs;
    use std::fs::File;

    #[cfg(unix)]
    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::write(path, "#!/bin/sh\nexit 0\n").expect("write script");
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/bin"), path).expect("Expected to find /bin/sh");
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    #[cfg(unix)]
    fn absolute_nonexisting() {
        let res = find_command_path(osstr("/bin"), Path::new("/bin/nonexisting"));
        assert!(res.is_none(), "Expected not to find /bin/nonexisting via absolute path");
    }

    #[test]
    #[cfg(unix)]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nonexistent:/bin"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found.as_ref(), Path::new("/bin/sh"));
    }

    #[test]
    #[cfg(unix)]
    fn single_component_not_found_in_path() {
        let res = find_command_path(osstr("/bin"), Path::new("nonexisting"));
        assert!(res.is_none(), "Expected not to find 'nonexisting' in PATH");
    }

    #[test]
    #[cfg(unix)]
    fn non_executable_files_are_skipped() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        File::create(first.path().join("tool")).expect("touch tool");
        make_executable(&second.path().join("tool"));

        let paths = std::env::join_paths([first.path(), second.path()]).unwrap();
        let resolver = SearchPath::new(paths);
        assert_eq!(resolver.resolve("tool"), Some(second.path().join("tool")));
        assert_eq!(resolver.resolve("missing"), None);
    }

    #[test]
    #[cfg(unix)]
    fn relative_path_with_separator_is_used_directly() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        let script = dir.path().join("bin").join("run");
        make_executable(&script);

        let found = find_command_path(osstr("/does/not/matter"), &script).expect("script");
        assert_eq!(found.as_ref(), script.as_path());
    }

    #[test]
    #[cfg(unix)]
    fn executables_lists_only_runnable_files() {
        let dir = tempfile::tempdir().unwrap();
        make_executable(&dir.path().join("alpha"));
        make_executable(&dir.path().join("beta"));
        File::create(dir.path().join("notes.txt")).unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let names = SearchPath::new(dir.path().as_os_str()).executables();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), ["alpha", "beta"]);
    }

    #[test]
    #[cfg(unix)]
    fn run_pumps_memory_streams() {
        let cap = crate::testutil::Captured::with_stdin("hi\n");
        let sh = SearchPath::from_env().resolve("sh").expect("sh on PATH");
        let args = ["-c".to_string(), "cat; echo err 1>&2; exit 4".to_string()];
        assert_eq!(run("sh", &sh, &args, &cap.ctx).unwrap(), 4);
        assert_eq!(cap.out(), "hi\n");
        assert_eq!(cap.err(), "err\n");
    }

    #[test]
    fn empty_path_is_none() {
        let res = find_command_path(OsStr::new("/bin"), Path::new(""));
        assert!(res.is_none(), "Empty path should not resolve to anything");
    }
}
