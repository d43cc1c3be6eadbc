use crate::command::ExitCode;
use crate::config::ShellConfig;
use crate::jobs::JobController;
use crate::signal::InterruptFlag;
use std::env as stdenv;
use std::path::PathBuf;

/// Session state owned by the control loop and handed to every command.
///
/// The environment contains:
/// - `current_dir`: the working directory, kept in sync with the process's own.
/// - `should_exit`: a flag the prompt loop checks to know when to terminate.
/// - `last_status`: exit code of the previous line.
/// - `jobs`: the background job table and the operations on it.
/// - `interrupt`: the interrupt flag consulted by foreground waits.
///
/// There is no other mutable state in the shell; all of it lives here.
#[derive(Debug)]
pub struct Environment {
    pub current_dir: PathBuf,
    pub should_exit: bool,
    pub last_status: ExitCode,
    pub jobs: JobController,
    pub interrupt: InterruptFlag,
    pub config: ShellConfig,
}

impl Environment {
    /// Capture the current process state into a fresh session.
    ///
    /// `current_dir` comes from `std::env::current_dir()`; the job table starts empty
    /// and the interrupt flag clear.
    pub fn new(config: ShellConfig) -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            current_dir,
            should_exit: false,
            last_status: 0,
            jobs: JobController::new(config),
            interrupt: InterruptFlag::new(),
            config,
        }
    }

    /// Get the value of a process environment variable.
    pub fn get_var(&self, key: &str) -> Option<String> {
        stdenv::var(key).ok()
    }
}
