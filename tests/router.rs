use minishell::io_adapters::SharedBuffer;
use minishell::{InputStream, Interpreter, OutputStream, SearchPath, ShellContext, builtin};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

struct Shell {
    sh: Interpreter,
    out: SharedBuffer,
    err: SharedBuffer,
    dir: TempDir,
}

impl Shell {
    fn new() -> Self {
        let (out_stream, out) = OutputStream::memory();
        let (err_stream, err) = OutputStream::memory();
        let ctx = ShellContext::with_streams(
            builtin::defaults(),
            Arc::new(SearchPath::from_env()),
            InputStream::from_bytes(Vec::new()),
            out_stream,
            err_stream,
        );
        Self {
            sh: Interpreter::new(ctx),
            out,
            err,
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    /// Absolute path of `name` inside the scratch directory, as a shell word.
    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).display().to_string()
    }

    fn route(&self, line: &str) -> i32 {
        self.sh.route(line)
    }

    fn out(&self) -> String {
        String::from_utf8_lossy(&self.out.lock().unwrap()).into_owned()
    }

    fn err(&self) -> String {
        String::from_utf8_lossy(&self.err.lock().unwrap()).into_owned()
    }
}

#[test]
fn echo_into_file() {
    let shell = Shell::new();
    let target = shell.path("out.txt");
    assert_eq!(shell.route(&format!("echo hello > {target}")), 0);
    assert_eq!(fs::read_to_string(&target).unwrap(), "hello\n");
    assert!(shell.out().is_empty());
    assert!(shell.err().is_empty());
}

#[test]
fn every_stdout_operator() {
    let shell = Shell::new();
    let target = shell.path("ops.txt");
    assert_eq!(shell.route(&format!("echo one 1> {target}")), 0);
    assert_eq!(shell.route(&format!("echo two >> {target}")), 0);
    assert_eq!(shell.route(&format!("echo three 1>> {target}")), 0);
    assert_eq!(fs::read_to_string(&target).unwrap(), "one\ntwo\nthree\n");

    assert_eq!(shell.route(&format!("echo reset > {target}")), 0);
    assert_eq!(fs::read_to_string(&target).unwrap(), "reset\n");
}

#[test]
fn nested_directories_are_created() {
    let shell = Shell::new();
    let target = shell.path("a/b/c/out.txt");
    assert_eq!(shell.route(&format!("echo deep > {target}")), 0);
    assert_eq!(fs::read_to_string(&target).unwrap(), "deep\n");
}

#[test]
fn quoted_target_with_spaces() {
    let shell = Shell::new();
    let target = shell.path("my file.txt");
    assert_eq!(shell.route(&format!("echo 'a  b' > \"{target}\"")), 0);
    assert_eq!(fs::read_to_string(&target).unwrap(), "a  b\n");
}

#[test]
fn builtin_error_to_file() {
    let shell = Shell::new();
    let target = shell.path("err.txt");
    let code = shell.route(&format!("cd /definitely/not/here 2> {target}"));
    assert_ne!(code, 0);
    assert!(fs::read_to_string(&target).unwrap().contains("/definitely/not/here"));
    assert!(shell.err().is_empty());
}

#[test]
fn unknown_command_reports_127_on_stdout() {
    let shell = Shell::new();
    assert_eq!(shell.route("no_such_program_for_router_test arg"), 127);
    assert_eq!(shell.out(), "no_such_program_for_router_test: command not found\n");

    let target = shell.path("nf.txt");
    assert_eq!(shell.route(&format!("no_such_program_for_router_test > {target}")), 127);
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "no_such_program_for_router_test: command not found\n"
    );
}

#[test]
fn unopenable_target_fails_without_running() {
    let shell = Shell::new();
    let dir = shell.dir.path().display().to_string();
    assert_eq!(shell.route(&format!("echo never > {dir}")), 1);
    assert!(shell.out().is_empty());
    assert!(!shell.err().is_empty());
}

#[test]
fn builtin_pipeline_keeps_last_output() {
    let shell = Shell::new();
    assert_eq!(shell.route("echo first | echo second"), 0);
    assert_eq!(shell.out(), "second\n");
}

#[test]
fn unknown_pipeline_stage_reports_on_stderr() {
    let shell = Shell::new();
    assert_eq!(shell.route("echo a | no_such_stage_cmd"), 127);
    assert_eq!(shell.err(), "no_such_stage_cmd: command not found\n");
    assert!(shell.out().is_empty());
}

#[cfg(unix)]
mod unix {
    use super::*;

    #[test]
    fn cat_missing_file_error_goes_to_file() {
        let shell = Shell::new();
        let target = shell.path("err.txt");
        let code = shell.route(&format!("cat missing_file_for_router_test 2> {target}"));
        assert_ne!(code, 0);
        assert!(fs::read_to_string(&target).unwrap().contains("missing_file_for_router_test"));
        assert!(shell.err().is_empty());
    }

    #[test]
    fn same_file_for_both_streams() {
        let shell = Shell::new();
        let target = shell.path("both.txt");
        let line = format!("sh -c 'echo out; echo err 1>&2' > {target} 2>> {target}");
        assert_eq!(shell.route(&line), 0);
        let text = fs::read_to_string(&target).unwrap();
        assert!(text.contains("err\n"), "{text:?}");
        assert!(shell.out().is_empty());
    }

    #[test]
    fn external_output_is_captured() {
        let shell = Shell::new();
        assert_eq!(shell.route("printf '%s-%s' a b"), 0);
        assert_eq!(shell.out(), "a-b");
    }

    #[test]
    fn external_exit_status_is_returned() {
        let shell = Shell::new();
        assert_eq!(shell.route("sh -c 'exit 7'"), 7);
        assert_eq!(shell.route("true"), 0);
    }

    #[test]
    fn builtin_into_external() {
        let shell = Shell::new();
        assert_eq!(shell.route("echo abc | wc -c"), 0);
        assert_eq!(shell.out().trim(), "4");
    }

    #[test]
    fn external_chain_with_redirected_tail() {
        let shell = Shell::new();
        let target = shell.path("sorted.txt");
        let line = format!("printf 'c\\nb\\na\\n' | sort | head -n 2 > {target}");
        assert_eq!(shell.route(&line), 0);
        assert_eq!(fs::read_to_string(&target).unwrap(), "a\nb\n");
        assert!(shell.out().is_empty());
    }

    #[test]
    fn pipeline_status_is_last_stage() {
        let shell = Shell::new();
        assert_eq!(shell.route("false | true"), 0);
        assert_eq!(shell.route("true | false"), 1);
        assert_eq!(shell.route("echo x | sh -c 'exit 9'"), 9);
    }

    #[test]
    fn stage_stderr_redirection() {
        let shell = Shell::new();
        let target = shell.path("stage_err.txt");
        let line = format!("ls missing_dir_for_stage_test 2> {target} | echo done");
        assert_eq!(shell.route(&line), 0);
        assert_eq!(shell.out(), "done\n");
        assert!(fs::read_to_string(&target).unwrap().contains("missing_dir_for_stage_test"));
        assert!(shell.err().is_empty());
    }

    #[test]
    fn type_reports_path_of_external() {
        let shell = Shell::new();
        assert_eq!(shell.route("type echo sh"), 0);
        let out = shell.out();
        assert!(out.starts_with("echo is a shell builtin\nsh is /"), "{out:?}");
    }
}
