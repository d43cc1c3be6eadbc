//! Background jobs: the bounded job table and the `jobs`/`fg`/`bg` operations on it.

use crate::command::ExitCode;
use crate::config::ShellConfig;
use crate::error::{Result, ShellError};
use crate::launcher::{Launcher, Program, WaitOutcome};
use crate::signal::InterruptFlag;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::fmt;
use std::io::Write;
use tracing::{info, warn};

/// State of a job as observed by a status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Done,
    Terminated,
}

impl JobState {
    /// Non-blocking look at `pid`. Reaps the child when it has finished.
    pub fn probe(pid: Pid) -> JobState {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(..)) => JobState::Done,
            Ok(WaitStatus::Signaled(..)) => JobState::Terminated,
            Ok(_) => JobState::Running,
            Err(errno) => {
                warn!(%pid, %errno, "job is no longer a child of this shell");
                JobState::Done
            }
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JobState::Running => "Running",
            JobState::Done => "Done",
            JobState::Terminated => "Terminated",
        };
        // Padding keeps the command column aligned in listings.
        f.pad(text)
    }
}

/// A process launched outside the foreground wait loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub pid: Pid,
    pub command: String,
}

impl Job {
    /// Creates a job, cutting `command` down to at most `max_len` bytes.
    pub fn new(pid: Pid, command: &str, max_len: usize) -> Self {
        Self {
            pid,
            command: truncate(command, max_len).to_string(),
        }
    }
}

fn truncate(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Fixed-capacity registry of background jobs.
///
/// Removing a job moves the last job into its slot, so the 1-based positions shown to
/// the user shift after every removal. Jobs are therefore addressed by pid; positions
/// are only computed for display.
#[derive(Debug, Clone)]
pub struct JobTable {
    jobs: Vec<Job>,
    capacity: usize,
}

impl JobTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `job` and returns its 1-based position.
    ///
    /// # Errors
    /// * [`ShellError::TableFull`] when the table holds `capacity` jobs already.
    /// * [`ShellError::DuplicateJob`] when the pid is tracked already.
    pub fn insert(&mut self, job: Job) -> Result<usize> {
        if self.jobs.len() >= self.capacity {
            return Err(ShellError::TableFull {
                capacity: self.capacity,
                pid: job.pid,
            });
        }
        if self.index_of(job.pid).is_some() {
            return Err(ShellError::DuplicateJob(job.pid));
        }
        self.jobs.push(job);
        Ok(self.jobs.len())
    }

    /// 0-based slot of `pid`.
    pub fn index_of(&self, pid: Pid) -> Option<usize> {
        self.jobs.iter().position(|job| job.pid == pid)
    }

    pub fn get(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    /// Removes the job in slot `index`, moving the last job into that slot.
    pub fn remove(&mut self, index: usize) -> Option<Job> {
        (index < self.jobs.len()).then(|| self.jobs.swap_remove(index))
    }
}

/// One line of a `jobs` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub position: usize,
    pub pid: Pid,
    pub command: String,
    pub state: JobState,
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]+   {:<14}{} (PID {})",
            self.position, self.state, self.command, self.pid
        )
    }
}

/// Owner of the job table and the only code that mutates it.
#[derive(Debug, Clone)]
pub struct JobController {
    table: JobTable,
    config: ShellConfig,
}

impl JobController {
    pub fn new(config: ShellConfig) -> Self {
        Self {
            table: JobTable::with_capacity(config.max_jobs),
            config,
        }
    }

    pub fn table(&self) -> &JobTable {
        &self.table
    }

    #[cfg(test)]
    pub(crate) fn table_mut(&mut self) -> &mut JobTable {
        &mut self.table
    }

    /// Starts `program` detached and tracks it as `command`.
    ///
    /// Prints `[<position>] <pid>` and returns the pid, which identifies the job from
    /// now on.
    ///
    /// # Errors
    /// [`ShellError::TableFull`] when there is no free slot. The process keeps running
    /// untracked.
    pub fn launch_background(
        &mut self,
        program: Program,
        command: &str,
        out: &mut dyn Write,
    ) -> Result<Pid> {
        let pid = Launcher::new(self.config).spawn_background(program)?;
        let position = self
            .table
            .insert(Job::new(pid, command, self.config.max_command_len))
            .inspect_err(|_| warn!(%pid, "job table full, process left untracked"))?;
        info!(%pid, position, command, "background job started");
        writeln!(out, "[{}] {}", position, pid)?;
        Ok(pid)
    }

    /// Blocks until job `pid` exits, then forgets it.
    ///
    /// # Errors
    /// * [`ShellError::JobNotFound`] for an untracked pid; the table is left as is.
    /// * [`ShellError::Wait`] when the wait itself fails; the job stays tracked.
    pub fn bring_to_foreground(
        &mut self,
        pid: Pid,
        interrupt: &InterruptFlag,
        out: &mut dyn Write,
    ) -> Result<ExitCode> {
        let index = self.table.index_of(pid).ok_or(ShellError::JobNotFound(pid))?;
        let outcome = Launcher::new(self.config).wait(&[pid], interrupt)?;

        let state = match outcome {
            WaitOutcome::Exited(code) if code > 128 => JobState::Terminated,
            WaitOutcome::Exited(_) => JobState::Done,
            WaitOutcome::Interrupted => JobState::Terminated,
        };
        if let Some(job) = self.table.remove(index) {
            info!(%pid, %state, "foreground job finished");
            writeln!(out, "[{}]+   {:<14}{}", index + 1, state, job.command)?;
        }
        Ok(outcome.code())
    }

    /// Stops tracking job `pid` and sends it SIGCONT.
    ///
    /// The job is removed before the signal is sent and is not put back if sending
    /// fails.
    ///
    /// # Errors
    /// * [`ShellError::JobNotFound`] for an untracked pid.
    /// * [`ShellError::Signal`] when the signal cannot be delivered.
    pub fn resume(&mut self, pid: Pid, out: &mut dyn Write) -> Result<()> {
        let index = self.table.index_of(pid).ok_or(ShellError::JobNotFound(pid))?;
        if let Some(job) = self.table.remove(index) {
            info!(%pid, "job resumed and untracked");
            writeln!(out, "[{}]+   {:<14}{}", index + 1, "Continued", job.command)?;
        }
        kill(pid, Signal::SIGCONT).map_err(|source| ShellError::Signal { pid, source })
    }

    /// Probes every job, prints one line per job and drops the finished ones.
    ///
    /// Each tracked pid is reported exactly once per sweep, and afterwards only the
    /// jobs found running remain.
    pub fn list_jobs(&mut self, out: &mut dyn Write) -> Result<Vec<JobReport>> {
        let mut reports = Vec::with_capacity(self.table.len());
        let mut index = 0;
        while let Some(job) = self.table.get(index) {
            let state = JobState::probe(job.pid);
            let report = JobReport {
                position: index + 1,
                pid: job.pid,
                command: job.command.clone(),
                state,
            };
            writeln!(out, "{}", report)?;
            reports.push(report);

            if state == JobState::Running {
                index += 1;
            } else {
                // The last job now sits at `index` and is probed next.
                self.table.remove(index);
            }
        }
        Ok(reports)
    }
}
