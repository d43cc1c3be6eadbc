use nix::errno::Errno;
use nix::unistd::Pid;
use thiserror::Error;

/// Everything that can go wrong while turning a line into processes.
///
/// Variants fall in two classes, see [`ShellError::is_fatal`]: resource exhaustion and
/// an over-long argument list end the session, all the others are reported and the
/// prompt loop carries on.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Too many arguments (limit is {max}).")]
    TooManyArguments { max: usize },

    #[error("Input line too long (limit is {max} bytes).")]
    LineTooLong { max: usize },

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("fork: {0}")]
    Fork(#[source] Errno),

    #[error("pipe: {0}")]
    Pipe(#[source] Errno),

    #[error("Maximum number of jobs reached.")]
    TableFull { capacity: usize, pid: Pid },

    #[error("Job with PID {0} is already tracked.")]
    DuplicateJob(Pid),

    #[error("Job with PID {0} not found.")]
    JobNotFound(Pid),

    #[error("kill: {source}")]
    Signal {
        pid: Pid,
        #[source]
        source: Errno,
    },

    #[error("waitpid: {source}")]
    Wait {
        pid: Pid,
        #[source]
        source: Errno,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] std::ffi::NulError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Whether the interpreter has to terminate after this error.
    ///
    /// A failed `fork` or `pipe` leaves a half-built pipeline behind, and an over-long
    /// argument list is treated the same way.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ShellError::TooManyArguments { .. } | ShellError::Fork(_) | ShellError::Pipe(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;
