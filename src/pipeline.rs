use crate::error::{Result, ShellError};
use crate::launcher::{Launcher, Program, StageIo, WaitOutcome, terminate};
use crate::signal::InterruptFlag;
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::unistd::{Pid, pipe};
use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tracing::debug;

/// One stage of a pipeline.
#[derive(Debug)]
pub struct PipelineStage {
    pub program: Program,
    /// Replaces the stage's pipe output when set (a `>> file` on that stage).
    pub stdout: Option<File>,
}

impl PipelineStage {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            stdout: None,
        }
    }

    pub fn with_stdout(mut self, file: File) -> Self {
        self.stdout = Some(file);
        self
    }
}

/// Stages connected stdout-to-stdin by anonymous pipes.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
}

impl Pipeline {
    pub fn new(stages: Vec<PipelineStage>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Starts every stage, then waits for all of them.
    ///
    /// Stage `i` is completely wired before stage `i + 1` is forked, and the shell
    /// keeps no pipe end open once the last stage is running. The outcome carries the
    /// last stage's status.
    ///
    /// # Errors
    /// [`ShellError::Pipe`] and [`ShellError::Fork`] are fatal; the stages already
    /// running are terminated before the error is returned.
    pub fn run(self, launcher: &Launcher, interrupt: &InterruptFlag) -> Result<WaitOutcome> {
        if self.stages.is_empty() {
            return Ok(WaitOutcome::Exited(0));
        }

        let mut pids = Vec::with_capacity(self.stages.len());
        if let Err(err) = self.start(launcher, &mut pids) {
            terminate(&pids);
            return Err(err);
        }
        debug!(stages = pids.len(), "pipeline started");
        launcher.wait(&pids, interrupt)
    }

    fn start(self, launcher: &Launcher, pids: &mut Vec<Pid>) -> Result<()> {
        let count = self.stages.len();
        let mut upstream: Option<OwnedFd> = None;

        for (index, stage) in self.stages.into_iter().enumerate() {
            let (read, write) = if index + 1 < count {
                let (read, write) = cloexec_pipe()?;
                (Some(read), Some(write))
            } else {
                (None, None)
            };

            let mut unused: Vec<_> = read.iter().map(AsRawFd::as_raw_fd).collect();
            let stdout = match &stage.stdout {
                Some(file) => {
                    unused.extend(write.iter().map(AsRawFd::as_raw_fd));
                    Some(file.as_raw_fd())
                }
                None => write.as_ref().map(AsRawFd::as_raw_fd),
            };
            let io = StageIo {
                stdin: upstream.as_ref().map(AsRawFd::as_raw_fd),
                stdout,
                stderr: None,
                unused,
            };

            pids.push(launcher.spawn(stage.program, &io)?);

            // The child holds its own copies now.
            drop(write);
            upstream = read;
        }
        Ok(())
    }
}

fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let (read, write) = pipe().map_err(ShellError::Pipe)?;
    // SAFETY: both descriptors were just created by pipe(2) and nothing else owns them.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(read), OwnedFd::from_raw_fd(write)) };
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(ShellError::Pipe)?;
    }
    Ok((read, write))
}
