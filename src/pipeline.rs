//! Runs `a | b | c`: built-ins on worker threads, everything else as child
//! processes connected by OS pipes.

use crate::command::{EXIT_FAILURE, EXIT_NOT_FOUND, ExitCode};
use crate::context::ShellContext;
use crate::external::{command_for, exit_code, feed, output_stdio, pump, terminate};
use crate::io_adapters::{InputStream, MemReader, OutputStream, SharedBuffer, take_buffer};
use crate::parser::parse_redirection;
use crate::redirect::{self, Redirection};
use std::io::{Read, Write};
use std::process::{Child, ChildStdout, Stdio};
use std::thread::{self, JoinHandle};

/// Where the next stage takes its input from.
enum Upstream {
    /// The context's stdin. Only the first stage sees it.
    Terminal,
    /// Nothing to read: the previous stage wrote to a file, failed, or had no command.
    Empty,
    /// Live stdout of the previous child process.
    Pipe(ChildStdout),
    /// Output of the built-in running at the given stage index.
    Captured(usize, SharedBuffer),
}

enum Stage {
    Process(Child),
    Task(JoinHandle<ExitCode>),
    Done(ExitCode),
}

/// Bytes copied into a child's stdin by a feeder thread.
type Feed = Box<dyn Read + Send>;

/// A stage named something that is neither a built-in nor on `PATH`.
struct NotFound;

/// Executes one pipeline of two or more segments and reports the status of
/// the last one.
///
/// Built-in stages run on their own threads. A built-in that is not last writes
/// into memory, and its consumer only starts once it finished. External output
/// feeding a built-in is read to the end first. Two external stages in a row
/// share a live OS pipe.
pub struct PipelineExecutor<'a> {
    ctx: &'a ShellContext,
    stages: Vec<Stage>,
    workers: Vec<JoinHandle<()>>,
    redirections: Vec<Redirection>,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(ctx: &'a ShellContext) -> Self {
        Self {
            ctx,
            stages: Vec::new(),
            workers: Vec::new(),
            redirections: Vec::new(),
        }
    }

    /// Start every stage, wait for all of them and return the last status.
    ///
    /// A name that resolves to nothing stops the pipeline right there: earlier
    /// processes are killed, earlier threads joined, and 127 is returned.
    pub fn execute(mut self, segments: &[Vec<String>]) -> ExitCode {
        log::debug!("pipeline of {} stages", segments.len());
        let last = segments.len().saturating_sub(1);
        let mut upstream = Upstream::Terminal;
        for (index, segment) in segments.iter().enumerate() {
            match self.start(index, segment, upstream, index == last) {
                Ok(next) => upstream = next,
                Err(NotFound) => {
                    self.abort();
                    return EXIT_NOT_FOUND;
                }
            }
        }
        self.finish()
    }

    fn start(
        &mut self,
        index: usize,
        segment: &[String],
        upstream: Upstream,
        is_last: bool,
    ) -> Result<Upstream, NotFound> {
        let info = parse_redirection(segment);
        let ctx = match redirect::apply(self.ctx, &info) {
            Ok((ctx, redirection)) => {
                self.redirections.push(redirection);
                ctx
            }
            Err(e) => {
                log::warn!("stage {index}: {e:#}");
                let _ = writeln!(self.ctx.stderr(), "{e:#}");
                self.stages.push(Stage::Done(EXIT_FAILURE));
                return Ok(Upstream::Empty);
            }
        };
        let Some((name, args)) = info.command_parts.split_first() else {
            self.stages.push(Stage::Done(0));
            return Ok(Upstream::Empty);
        };
        let feeds_next = !is_last && info.stdout_file.is_none();

        if let Some(cmd) = ctx.command(name) {
            let stdin = match upstream {
                Upstream::Terminal => ctx.stdin(),
                other => InputStream::from_bytes(self.drain(other)),
            };
            let (stdout, captured) = if feeds_next {
                let (stream, buf) = OutputStream::memory();
                (stream, Some(buf))
            } else {
                (ctx.stdout(), None)
            };
            let stage_ctx = ctx.with_io(stdin, stdout, ctx.stderr());
            let args = args.to_vec();
            log::debug!("stage {index}: built-in {name}");
            let handle = thread::spawn(move || cmd.execute(&args, &stage_ctx));
            self.stages.push(Stage::Task(handle));
            return Ok(match captured {
                Some(buf) => Upstream::Captured(index, buf),
                None => Upstream::Empty,
            });
        }

        let Some(path) = ctx.resolver().resolve(name) else {
            log::debug!("stage {index}: {name} not found, aborting");
            let _ = writeln!(ctx.stderr(), "{name}: command not found");
            return Err(NotFound);
        };

        let (stdin, feed_from): (Stdio, Option<Feed>) = match upstream {
            Upstream::Terminal => {
                let input = ctx.stdin();
                match input.stdio() {
                    Some(stdio) => (stdio, None),
                    None => (Stdio::piped(), Some(Box::new(input) as Feed)),
                }
            }
            Upstream::Empty => (Stdio::null(), None),
            Upstream::Pipe(pipe) => (Stdio::from(pipe), None),
            captured @ Upstream::Captured(..) => {
                let bytes = self.drain(captured);
                (Stdio::piped(), Some(Box::new(MemReader::new(bytes)) as Feed))
            }
        };
        let (stdout, out_pump) = if feeds_next {
            (Stdio::piped(), None)
        } else {
            output_stdio(&ctx.stdout())
        };
        let (stderr, err_pump) = output_stdio(&ctx.stderr());

        let _ = ctx.stdout().flush();
        let _ = ctx.stderr().flush();
        let spawned = command_for(name, &path, args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                log::warn!("stage {index}: cannot spawn {}: {e}", path.display());
                let _ = writeln!(ctx.stderr(), "{name}: {e}");
                self.stages.push(Stage::Done(EXIT_FAILURE));
                return Ok(Upstream::Empty);
            }
        };
        log::debug!("stage {index}: spawned {name} as pid {}", child.id());

        if let Some(src) = feed_from {
            if let Some(pipe) = child.stdin.take() {
                self.workers.push(feed(pipe, src));
            }
        }
        if let Some(dst) = out_pump {
            if let Some(pipe) = child.stdout.take() {
                self.workers.push(pump(pipe, dst));
            }
        }
        if let Some(dst) = err_pump {
            if let Some(pipe) = child.stderr.take() {
                self.workers.push(pump(pipe, dst));
            }
        }
        let next = if feeds_next {
            child.stdout.take().map_or(Upstream::Empty, Upstream::Pipe)
        } else {
            Upstream::Empty
        };
        self.stages.push(Stage::Process(child));
        Ok(next)
    }

    /// Everything the previous stage produced, once it produced all of it.
    fn drain(&mut self, upstream: Upstream) -> Vec<u8> {
        match upstream {
            Upstream::Terminal | Upstream::Empty => Vec::new(),
            Upstream::Pipe(mut pipe) => {
                let mut buf = Vec::new();
                if let Err(e) = pipe.read_to_end(&mut buf) {
                    log::debug!("reading upstream pipe: {e}");
                }
                buf
            }
            Upstream::Captured(producer, buf) => {
                self.settle(producer);
                take_buffer(&buf)
            }
        }
    }

    /// Join the built-in at `index` if it is still running.
    fn settle(&mut self, index: usize) {
        if let Some(slot) = self.stages.get_mut(index) {
            *slot = match std::mem::replace(slot, Stage::Done(0)) {
                Stage::Task(handle) => Stage::Done(join(handle)),
                other => other,
            };
        }
    }

    fn abort(mut self) {
        for stage in self.stages.drain(..) {
            match stage {
                Stage::Process(mut child) => terminate(&mut child),
                Stage::Task(handle) => {
                    join(handle);
                }
                Stage::Done(_) => {}
            }
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }

    fn finish(mut self) -> ExitCode {
        let mut status = 0;
        for stage in self.stages.drain(..) {
            status = match stage {
                Stage::Process(mut child) => match child.wait() {
                    Ok(s) => exit_code(s),
                    Err(e) => {
                        log::warn!("wait for pid {}: {e}", child.id());
                        EXIT_FAILURE
                    }
                },
                Stage::Task(handle) => join(handle),
                Stage::Done(code) => code,
            };
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        for mut redirection in self.redirections.drain(..) {
            redirection.release();
        }
        log::debug!("pipeline finished with {status}");
        status
    }
}

fn join(handle: JoinHandle<ExitCode>) -> ExitCode {
    handle.join().unwrap_or_else(|_| {
        log::error!("built-in pipeline stage panicked");
        EXIT_FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::external::SearchPath;
    use crate::lexer::tokenize;
    use crate::parser::split_pipeline;
    use crate::testutil::Captured;
    use std::fs;
    use std::sync::Arc;

    fn run(cap: &Captured, line: &str) -> ExitCode {
        let segments = split_pipeline(&tokenize(line));
        PipelineExecutor::new(&cap.ctx).execute(&segments)
    }

    /// Copies stdin to stdout in upper case.
    struct Upper;

    impl Command for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn execute(&self, _args: &[String], ctx: &ShellContext) -> ExitCode {
            let mut input = String::new();
            if ctx.stdin().read_to_string(&mut input).is_err() {
                return EXIT_FAILURE;
            }
            match write!(ctx.stdout(), "{}", input.to_uppercase()) {
                Ok(()) => 0,
                Err(_) => EXIT_FAILURE,
            }
        }
    }

    /// Always panics.
    struct Boom;

    impl Command for Boom {
        fn name(&self) -> &str {
            "boom"
        }

        fn execute(&self, _args: &[String], _ctx: &ShellContext) -> ExitCode {
            panic!("boom");
        }
    }

    fn with_extra_builtins() -> (ShellContext, SharedBuffer) {
        let (out, buf) = OutputStream::memory();
        let (err, _) = OutputStream::memory();
        let mut commands = crate::builtin::defaults();
        commands.push(Arc::new(Upper));
        commands.push(Arc::new(Boom));
        let ctx = ShellContext::with_streams(
            commands,
            Arc::new(SearchPath::from_env()),
            InputStream::from_bytes(b"from stdin\n".to_vec()),
            out,
            err,
        );
        (ctx, buf)
    }

    #[test]
    fn builtin_to_builtin() {
        let (ctx, out) = with_extra_builtins();
        let segments = split_pipeline(&tokenize("echo hello | upper | upper"));
        assert_eq!(PipelineExecutor::new(&ctx).execute(&segments), 0);
        assert_eq!(take_buffer(&out), b"HELLO\n");
    }

    #[test]
    fn first_builtin_reads_context_stdin() {
        let (ctx, out) = with_extra_builtins();
        let segments = split_pipeline(&tokenize("upper | upper"));
        assert_eq!(PipelineExecutor::new(&ctx).execute(&segments), 0);
        assert_eq!(take_buffer(&out), b"FROM STDIN\n");
    }

    #[test]
    fn panicking_stage_reports_failure() {
        let (ctx, out) = with_extra_builtins();
        let segments = split_pipeline(&tokenize("echo x | boom"));
        assert_eq!(PipelineExecutor::new(&ctx).execute(&segments), EXIT_FAILURE);

        let segments = split_pipeline(&tokenize("boom | echo after"));
        assert_eq!(PipelineExecutor::new(&ctx).execute(&segments), 0);
        assert_eq!(take_buffer(&out), b"after\n");
    }

    #[test]
    fn unknown_stage_aborts_with_127() {
        let cap = Captured::new();
        let code = run(&cap, "echo a | no_such_command_for_pipeline_test | echo b");
        assert_eq!(code, EXIT_NOT_FOUND);
        assert_eq!(cap.err(), "no_such_command_for_pipeline_test: command not found\n");
        assert!(cap.out().is_empty());
    }

    #[test]
    fn redirected_stage_feeds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mid.txt");
        let (ctx, out) = with_extra_builtins();
        let line = format!("echo hi > {} | upper", file.display());
        let segments = split_pipeline(&tokenize(&line));
        assert_eq!(PipelineExecutor::new(&ctx).execute(&segments), 0);
        assert_eq!(fs::read_to_string(&file).unwrap(), "hi\n");
        assert!(take_buffer(&out).is_empty());
    }

    #[test]
    fn history_read_in_a_stage_reaches_shared_history() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hist");
        fs::write(&file, "ls\npwd\n").unwrap();
        let cap = Captured::new();
        cap.ctx.add_to_history("echo first");

        let line = format!("echo x | history -r {}", file.display());
        assert_eq!(run(&cap, &line), 0);
        assert_eq!(cap.ctx.history().entries(), ["echo first", "ls", "pwd"]);
    }

    #[test]
    fn bad_redirection_fails_only_its_stage() {
        let dir = tempfile::tempdir().unwrap();
        let cap = Captured::new();
        let line = format!("echo a | echo b > {}", dir.path().display());
        assert_eq!(run(&cap, &line), EXIT_FAILURE);
        assert!(!cap.err().is_empty());

        let line = format!("echo a > {} | echo b", dir.path().display());
        assert_eq!(run(&cap, &line), 0);
        assert_eq!(cap.out(), "b\n");
    }

    #[test]
    #[cfg(unix)]
    fn builtin_to_external() {
        let cap = Captured::new();
        assert_eq!(run(&cap, "echo abc | wc -c"), 0);
        assert_eq!(cap.out().trim(), "4");
    }

    #[test]
    #[cfg(unix)]
    fn external_to_builtin() {
        let (ctx, out) = with_extra_builtins();
        let segments = split_pipeline(&tokenize("printf 'one\\ntwo\\n' | upper"));
        assert_eq!(PipelineExecutor::new(&ctx).execute(&segments), 0);
        assert_eq!(take_buffer(&out), b"ONE\nTWO\n");
    }

    #[test]
    #[cfg(unix)]
    fn external_to_external_with_context_stdin() {
        let cap = Captured::with_stdin("b\na\nc\n");
        assert_eq!(run(&cap, "cat | sort | cat"), 0);
        assert_eq!(cap.out(), "a\nb\nc\n");
    }

    #[test]
    #[cfg(unix)]
    fn early_exiting_consumer_stops_producer() {
        let cap = Captured::new();
        assert_eq!(run(&cap, "yes | head -n 1"), 0);
        assert_eq!(cap.out(), "y\n");

        let cap = Captured::new();
        assert_eq!(run(&cap, "seq 1 100000 | head -n 2"), 0);
        assert_eq!(cap.out(), "1\n2\n");
    }

    #[test]
    #[cfg(unix)]
    fn external_chain_into_builtin() {
        let (ctx, out) = with_extra_builtins();
        let segments = split_pipeline(&tokenize("printf 'b\\na\\n' | sort | upper"));
        assert_eq!(PipelineExecutor::new(&ctx).execute(&segments), 0);
        assert_eq!(take_buffer(&out), b"A\nB\n");
    }

    #[test]
    #[cfg(unix)]
    fn status_is_from_last_stage() {
        let cap = Captured::new();
        assert_eq!(run(&cap, "sh -c 'exit 3' | sh -c 'exit 0'"), 0);
        assert_eq!(run(&cap, "echo x | sh -c 'exit 5'"), 5);
        assert_eq!(run(&cap, "false | true"), 0);
    }

    #[test]
    #[cfg(unix)]
    fn last_stage_redirection() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested").join("out.txt");
        let cap = Captured::new();
        let line = format!("echo piped | cat > {}", file.display());
        assert_eq!(run(&cap, &line), 0);
        assert_eq!(fs::read_to_string(&file).unwrap(), "piped\n");
        assert!(cap.out().is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn unknown_stage_kills_started_processes() {
        let cap = Captured::with_stdin("");
        let code = run(&cap, "sleep 30 | missing_command_after_sleep");
        assert_eq!(code, EXIT_NOT_FOUND);
        assert!(cap.err().contains("missing_command_after_sleep: command not found"));
    }
}
