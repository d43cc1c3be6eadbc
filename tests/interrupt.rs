use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

#[test]
fn test_second_interrupt_exits_cleanly() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_jobsh"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    // Once the shell answers, its handler is in place.
    writeln!(stdin, "echo ready").unwrap();
    let mut line = String::new();
    while !line.contains("ready") {
        line.clear();
        assert_ne!(stdout.read_line(&mut line).unwrap(), 0, "shell ended early");
    }

    let pid = Pid::from_raw(child.id() as i32);
    kill(pid, Signal::SIGINT).unwrap();
    thread::sleep(Duration::from_millis(200));
    kill(pid, Signal::SIGINT).unwrap();

    let status = child.wait().unwrap();
    drop(stdin);
    let mut rest = String::new();
    stdout.read_to_string(&mut rest).unwrap();

    assert_eq!(status.code(), Some(0));
    assert!(rest.contains("Stopping current operation"), "{rest:?}");
    assert!(rest.contains("Exiting the shell"), "{rest:?}");
}

fn read_until(stdout: &mut impl BufRead, needle: &str) -> String {
    let mut line = String::new();
    while !line.contains(needle) {
        line.clear();
        assert_ne!(stdout.read_line(&mut line).unwrap(), 0, "shell ended before {needle:?}");
    }
    line
}

#[test]
fn test_interrupt_spares_background_jobs() {
    // Own process group, so the signal can be sent the way a terminal does.
    let mut child = Command::new(env!("CARGO_BIN_EXE_jobsh"))
        .process_group(0)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let group = Pid::from_raw(child.id() as i32);
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    writeln!(stdin, "sleep 30 &").unwrap();
    let launched = read_until(&mut stdout, "[1] ");
    let job: i32 = launched.split_whitespace().last().unwrap().parse().unwrap();

    writeln!(stdin, "sleep 5").unwrap();
    thread::sleep(Duration::from_millis(300));
    kill(Pid::from_raw(-group.as_raw()), Signal::SIGINT).unwrap();
    read_until(&mut stdout, "Stopping current operation");

    writeln!(stdin, "jobs").unwrap();
    let listed = read_until(&mut stdout, "sleep 30");

    let _ = kill(Pid::from_raw(job), Signal::SIGKILL);
    drop(stdin);
    let status = child.wait().unwrap();

    assert!(listed.contains("Running"), "{listed:?}");
    assert_eq!(status.code(), Some(0));
}
