//! Creation of one child process per command and the blocking wait on it.
//!
//! The launcher is the one place that calls `fork`. It serves three callers:
//! - [`Launcher::run_foreground`]: spawn and block until the child exits;
//! - [`Launcher::spawn_background`]: spawn with stderr on the null device, no wait;
//! - [`Launcher::spawn`]: spawn with pre-wired descriptors, used by the pipeline executor.

use crate::command::{ExecutableCommand, ExitCode};
use crate::config::ShellConfig;
use crate::env::Environment;
use crate::error::{Result, ShellError};
use crate::signal::InterruptFlag;
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{SigHandler, Signal, kill, signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, close, dup2, execvp, fork};
use std::ffi::CString;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::mem::ManuallyDrop;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Exit status of a child whose program could not be executed.
pub const EXEC_FAILURE: ExitCode = 127;
/// Status reported for a foreground wait cancelled by an interrupt.
pub const INTERRUPTED: ExitCode = 130;

/// Argument vector of an external program, ready for `execvp`.
///
/// Conversion to C strings happens in the parent so the child has nothing left to
/// allocate before replacing its image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    argv: Vec<CString>,
}

impl ExecSpec {
    /// # Errors
    /// Fails on an empty vector or when an argument contains a NUL byte.
    pub fn new<S: AsRef<str>>(argv: &[S]) -> Result<Self> {
        if argv.is_empty() {
            return Err(ShellError::Syntax("empty command".to_string()));
        }
        let argv = argv
            .iter()
            .map(|arg| CString::new(arg.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { argv })
    }

    pub fn name(&self) -> String {
        self.argv[0].to_string_lossy().into_owned()
    }

    fn exec(&self) -> Errno {
        match execvp(&self.argv[0], &self.argv) {
            Ok(never) => match never {},
            Err(errno) => errno,
        }
    }
}

/// What a child process runs once its descriptors are wired.
pub enum Program {
    /// A built-in executed inside the child, which exits with the built-in's status.
    Builtin {
        name: String,
        command: Box<dyn ExecutableCommand>,
    },
    /// An external program found through `PATH`.
    External(ExecSpec),
}

impl Program {
    /// Shortcut for an external program.
    pub fn external<S: AsRef<str>>(argv: &[S]) -> Result<Self> {
        Ok(Program::External(ExecSpec::new(argv)?))
    }

    pub fn name(&self) -> String {
        match self {
            Program::Builtin { name, .. } => name.clone(),
            Program::External(spec) => spec.name(),
        }
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Program::Builtin { name, .. } => f.debug_tuple("Builtin").field(name).finish(),
            Program::External(spec) => f.debug_tuple("External").field(spec).finish(),
        }
    }
}

/// Descriptors a child installs as its standard streams before running its program.
///
/// `None` inherits the shell's descriptor. Everything listed in `unused` is closed in
/// the child.
#[derive(Debug, Default, Clone)]
pub struct StageIo {
    pub stdin: Option<RawFd>,
    pub stdout: Option<RawFd>,
    pub stderr: Option<RawFd>,
    pub unused: Vec<RawFd>,
}

impl StageIo {
    fn wire(&self) -> nix::Result<()> {
        let plan = [
            (self.stdin, libc::STDIN_FILENO),
            (self.stdout, libc::STDOUT_FILENO),
            (self.stderr, libc::STDERR_FILENO),
        ];
        for (source, target) in plan {
            if let Some(fd) = source {
                if fd != target {
                    dup2(fd, target)?;
                }
            }
        }
        for (source, _) in plan {
            if let Some(fd) = source.filter(|fd| *fd > libc::STDERR_FILENO) {
                let _ = close(fd);
            }
        }
        for fd in &self.unused {
            let _ = close(*fd);
        }
        Ok(())
    }
}

/// How a blocking wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every child exited; carries the status of the last one.
    Exited(ExitCode),
    /// The interrupt flag was raised during the wait and the remaining children were
    /// sent SIGTERM.
    Interrupted,
}

impl WaitOutcome {
    /// Status to report to the caller.
    pub fn code(self) -> ExitCode {
        match self {
            WaitOutcome::Exited(code) => code,
            WaitOutcome::Interrupted => INTERRUPTED,
        }
    }
}

/// Spawns one process per call.
#[derive(Debug, Clone, Copy)]
pub struct Launcher {
    config: ShellConfig,
}

impl Launcher {
    pub fn new(config: ShellConfig) -> Self {
        Self { config }
    }

    /// Forks a child that wires `io` and runs `program`.
    ///
    /// # Errors
    /// [`ShellError::Fork`] when the process cannot be created. Failing to execute the
    /// program is not an error here: the child reports it and exits with
    /// [`EXEC_FAILURE`].
    pub fn spawn(&self, program: Program, io: &StageIo) -> Result<Pid> {
        self.fork_child(program, io, SigHandler::SigDfl)
    }

    fn fork_child(&self, program: Program, io: &StageIo, on_interrupt: SigHandler) -> Result<Pid> {
        // SAFETY: the child only resets signal dispositions and rewires descriptors,
        // then either replaces its image or runs a built-in and leaves through `_exit`.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                debug!(pid = %child, program = %program.name(), "spawned child");
                Ok(child)
            }
            Ok(ForkResult::Child) => run_child(program, io, on_interrupt, self.config),
            Err(errno) => Err(ShellError::Fork(errno)),
        }
    }

    /// Spawns `program` and blocks until it exits or the wait is interrupted.
    pub fn run_foreground(
        &self,
        program: Program,
        io: &StageIo,
        interrupt: &InterruptFlag,
    ) -> Result<WaitOutcome> {
        let pid = self.spawn(program, io)?;
        self.wait(&[pid], interrupt)
    }

    /// Blocks on already spawned children, see [`wait_all`].
    pub fn wait(&self, pids: &[Pid], interrupt: &InterruptFlag) -> Result<WaitOutcome> {
        wait_all(pids, interrupt, self.config.poll_interval)
    }

    /// Spawns `program` detached from the prompt loop.
    ///
    /// The child's stderr goes to the null device, so a program that cannot be found
    /// fails silently; the job listing later shows it as done. The child ignores
    /// SIGINT, so a Ctrl+C aimed at the foreground never reaches it.
    pub fn spawn_background(&self, program: Program) -> Result<Pid> {
        let devnull = OpenOptions::new().write(true).open("/dev/null")?;
        let io = StageIo {
            stderr: Some(devnull.as_raw_fd()),
            ..StageIo::default()
        };
        self.fork_child(program, &io, SigHandler::SigIgn)
    }
}

fn run_child(program: Program, io: &StageIo, on_interrupt: SigHandler, config: ShellConfig) -> ! {
    // Ignored dispositions survive exec. The runtime ignores SIGPIPE, and a child must
    // die on a closed pipe like any other process.
    // SAFETY: no handler function is installed, only the default or ignore action.
    let pipe = unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) };
    let interrupt = unsafe { signal(Signal::SIGINT, on_interrupt) };
    if let Err(errno) = pipe.and(interrupt) {
        report(&format!("jobsh: {}", errno.desc()));
        exit_child(1);
    }
    if let Err(errno) = io.wire() {
        report(&format!("jobsh: {}", errno.desc()));
        exit_child(1);
    }
    let code = match program {
        Program::External(spec) => {
            let errno = spec.exec();
            report(&format!("{}: {}", spec.name(), errno.desc()));
            EXEC_FAILURE
        }
        Program::Builtin { command, .. } => run_builtin(command, config),
    };
    exit_child(code)
}

/// Leaves a forked child without running exit handlers or flushing std buffers
/// inherited from the shell.
fn exit_child(code: ExitCode) -> ! {
    // SAFETY: _exit(2) only terminates the calling process.
    unsafe { libc::_exit(code) }
}

fn run_builtin(command: Box<dyn ExecutableCommand>, config: ShellConfig) -> ExitCode {
    // SAFETY: descriptors 0 and 1 stay open for the whole life of the child, and
    // ManuallyDrop keeps these handles from closing them.
    let stdin = ManuallyDrop::new(unsafe { File::from_raw_fd(libc::STDIN_FILENO) });
    let stdout = ManuallyDrop::new(unsafe { File::from_raw_fd(libc::STDOUT_FILENO) });

    let mut input = &*stdin;
    let mut output = BufWriter::new(&*stdout);
    let mut env = Environment::new(config);
    let code = match command.execute(&mut input, &mut output, &mut env) {
        Ok(code) => code,
        Err(err) => {
            let _ = writeln!(output, "{}", err);
            1
        }
    };
    match output.flush() {
        Ok(()) => code,
        Err(_) => 1,
    }
}

/// Writes a diagnostic straight to descriptor 2, bypassing the std stderr lock.
fn report(message: &str) {
    let _ = nix::unistd::write(libc::STDERR_FILENO, message.as_bytes());
    let _ = nix::unistd::write(libc::STDERR_FILENO, b"\n");
}

/// Exit code of a finished child, `None` while it is still alive or merely stopped.
pub fn exit_code(status: WaitStatus) -> Option<ExitCode> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}

/// Waits until every pid in `pids` has exited and returns the status of the last one.
///
/// Children are reaped in whatever order they finish, so a stage blocked on a full
/// pipe never holds up the others. After every poll the interrupt flag is checked:
/// once it is raised, the children still alive receive SIGTERM, are reaped, and the
/// wait ends with [`WaitOutcome::Interrupted`]. The flag is never cleared, so every
/// wait after the first interrupt reports failure instead of the real status.
///
/// # Errors
/// [`ShellError::Wait`] when `waitpid` fails, typically because a pid is not a child
/// of this process. The other pids are terminated and reaped first.
pub fn wait_all(pids: &[Pid], interrupt: &InterruptFlag, poll: Duration) -> Result<WaitOutcome> {
    let last = pids.last().copied();
    let mut last_status = 0;
    let mut pending = pids.to_vec();

    loop {
        let mut i = 0;
        while i < pending.len() {
            let pid = pending[i];
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(status) => match exit_code(status) {
                    Some(code) => {
                        debug!(%pid, code, "child exited");
                        if Some(pid) == last {
                            last_status = code;
                        }
                        pending.swap_remove(i);
                    }
                    None => i += 1,
                },
                Err(Errno::EINTR) => {}
                Err(source) => {
                    warn!(%pid, %source, "waitpid failed");
                    pending.swap_remove(i);
                    terminate(&pending);
                    return Err(ShellError::Wait { pid, source });
                }
            }
        }

        if interrupt.is_raised() {
            terminate(&pending);
            return Ok(WaitOutcome::Interrupted);
        }
        if pending.is_empty() {
            return Ok(WaitOutcome::Exited(last_status));
        }
        thread::sleep(poll);
    }
}

/// Sends SIGTERM to every pid, then reaps them all.
pub(crate) fn terminate(pids: &[Pid]) {
    for pid in pids {
        debug!(%pid, "terminating child");
        let _ = kill(*pid, Signal::SIGTERM);
    }
    for pid in pids {
        let _ = waitpid(*pid, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;

    fn launcher() -> Launcher {
        Launcher::new(ShellConfig::default())
    }

    #[test]
    fn test_foreground_propagates_exit_status() {
        let flag = InterruptFlag::new();
        let ok = launcher()
            .run_foreground(Program::external(&["true"]).unwrap(), &StageIo::default(), &flag)
            .unwrap();
        assert_eq!(ok, WaitOutcome::Exited(0));

        let failed = launcher()
            .run_foreground(
                Program::external(&["sh", "-c", "exit 3"]).unwrap(),
                &StageIo::default(),
                &flag,
            )
            .unwrap();
        assert_eq!(failed, WaitOutcome::Exited(3));
    }

    #[test]
    fn test_missing_program_fails_in_child() {
        let flag = InterruptFlag::new();
        let devnull = OpenOptions::new().write(true).open("/dev/null").unwrap();
        let io = StageIo {
            stderr: Some(devnull.as_raw_fd()),
            ..StageIo::default()
        };
        let outcome = launcher()
            .run_foreground(
                Program::external(&["definitely-not-a-program-4242"]).unwrap(),
                &io,
                &flag,
            )
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Exited(EXEC_FAILURE));
    }

    #[test]
    fn test_stdout_wiring_to_file() {
        let flag = InterruptFlag::new();
        let target = NamedTempFile::new().unwrap();
        let file = OpenOptions::new().append(true).open(target.path()).unwrap();
        let io = StageIo {
            stdout: Some(file.as_raw_fd()),
            ..StageIo::default()
        };
        launcher()
            .run_foreground(Program::external(&["printf", "wired"]).unwrap(), &io, &flag)
            .unwrap();
        drop(file);
        assert_eq!(fs::read_to_string(target.path()).unwrap(), "wired");
    }

    #[test]
    fn test_signaled_child_status() {
        let flag = InterruptFlag::new();
        let outcome = launcher()
            .run_foreground(
                Program::external(&["sh", "-c", "kill -TERM $$"]).unwrap(),
                &StageIo::default(),
                &flag,
            )
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Exited(128 + libc::SIGTERM));
    }

    #[test]
    fn test_interrupt_terminates_waited_child() {
        let flag = InterruptFlag::new();
        let pid = launcher()
            .spawn(Program::external(&["sleep", "30"]).unwrap(), &StageIo::default())
            .unwrap();

        let raiser = flag.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            raiser.raise();
        });
        let outcome = wait_all(&[pid], &flag, Duration::from_millis(5)).unwrap();
        handle.join().unwrap();

        assert_eq!(outcome, WaitOutcome::Interrupted);
        assert_eq!(outcome.code(), INTERRUPTED);
        // Already reaped by the wait.
        assert_eq!(waitpid(pid, Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
    }

    #[test]
    fn test_raised_flag_fails_later_waits() {
        let flag = InterruptFlag::new();
        flag.raise();
        let pid = launcher()
            .spawn(Program::external(&["sh", "-c", "exit 4"]).unwrap(), &StageIo::default())
            .unwrap();
        let outcome = wait_all(&[pid], &flag, Duration::from_millis(5)).unwrap();

        assert_eq!(outcome, WaitOutcome::Interrupted);
        assert_eq!(waitpid(pid, Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
    }

    #[test]
    fn test_wait_error_reaps_remaining_children() {
        let sleeper = launcher()
            .spawn(Program::external(&["sleep", "30"]).unwrap(), &StageIo::default())
            .unwrap();
        let foreign = Pid::from_raw(4194999);

        let err = wait_all(&[sleeper, foreign], &InterruptFlag::new(), Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, ShellError::Wait { pid, .. } if pid == foreign));
        assert_eq!(waitpid(sleeper, Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
    }

    #[test]
    fn test_background_child_ignores_interrupt() {
        let pid = launcher()
            .spawn_background(Program::external(&["sleep", "30"]).unwrap())
            .unwrap();
        // Let the child reset its dispositions and exec.
        thread::sleep(Duration::from_millis(100));
        kill(pid, Signal::SIGINT).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(waitpid(pid, Some(WaitPidFlag::WNOHANG)), Ok(WaitStatus::StillAlive));

        kill(pid, Signal::SIGKILL).unwrap();
        let _ = waitpid(pid, None);
    }

    #[test]
    fn test_child_dies_on_closed_pipe() {
        let (read, write) = nix::unistd::pipe().unwrap();
        close(read).unwrap();
        let devnull = OpenOptions::new().write(true).open("/dev/null").unwrap();
        let io = StageIo {
            stdout: Some(write),
            stderr: Some(devnull.as_raw_fd()),
            ..StageIo::default()
        };

        let outcome = launcher()
            .run_foreground(Program::external(&["yes"]).unwrap(), &io, &InterruptFlag::new())
            .unwrap();
        close(write).unwrap();
        // Killed by SIGPIPE rather than exiting on EPIPE.
        assert_eq!(outcome, WaitOutcome::Exited(128 + libc::SIGPIPE));
    }

    #[test]
    fn test_wait_on_foreign_pid_fails() {
        let err = wait_all(&[Pid::from_raw(4194999)], &InterruptFlag::new(), Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, ShellError::Wait { source: Errno::ECHILD, .. }));
    }

    #[test]
    fn test_exec_spec_rejects_nul() {
        let err = ExecSpec::new(&["echo", "a\0b"]).unwrap_err();
        assert!(matches!(err, ShellError::InvalidArgument(_)));
    }
}
