mod common;

use common::jobsh_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_echo_then_exit() {
    jobsh_cmd()
        .write_stdin("echo hi\nexit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("hi"));
}

#[test]
fn test_end_of_input_ends_session() {
    jobsh_cmd().write_stdin("pwd\n").assert().success();
}

#[test]
fn test_pipeline_and_append() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("log.txt");
    let script = format!(
        "printf c\\nb\\na\\n | sort | head -n 2 >> {0}\necho done >> {0}\nexit\n",
        target.display()
    );

    jobsh_cmd()
        .write_stdin(script)
        .assert()
        .success()
        .stdout(predicate::str::contains("Output appended to"));

    assert_eq!(fs::read_to_string(&target).unwrap(), "a\nb\ndone\n");
}

#[test]
fn test_unknown_job_is_reported() {
    jobsh_cmd()
        .write_stdin("fg 4194999\nbg 4194999\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Job with PID 4194999 not found.").count(2));
}

#[test]
fn test_jobs_table_full() {
    jobsh_cmd()
        .args(["--max-jobs", "1"])
        .write_stdin("sleep 1 &\nsleep 1 &\njobs\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("[1] "))
        .stdout(predicate::str::contains("Maximum number of jobs reached."))
        .stdout(predicate::str::contains("Running       sleep 1"));
}

#[test]
fn test_too_many_arguments_ends_session() {
    jobsh_cmd()
        .args(["--max-args", "2"])
        .write_stdin("echo a b c\necho unreachable\n")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("unreachable").not())
        .stderr(predicate::str::contains("Too many arguments"));
}

#[test]
fn test_closed_pipe_is_silent() {
    jobsh_cmd()
        .write_stdin("yes | head -n 1\nexit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("y\n"))
        .stderr(predicate::str::is_empty());
}
