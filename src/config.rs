use std::time::Duration;

/// Maximum number of background jobs tracked at once.
pub const DEFAULT_MAX_JOBS: usize = 10;
/// Maximum number of words accepted on a single input line.
pub const DEFAULT_MAX_ARGS: usize = 100;
/// Maximum length of an input line, in bytes.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024;
/// Maximum length of a job's display command, in bytes.
pub const DEFAULT_MAX_COMMAND_LEN: usize = 1024;
/// How often a foreground wait re-checks its children and the interrupt flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Limits and tunables of a shell session.
///
/// The configuration is fixed when the [`Interpreter`](crate::Interpreter) is created
/// and is copied into every component that needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellConfig {
    /// Capacity of the job table.
    pub max_jobs: usize,
    /// Word count above which a line is rejected as fatal.
    pub max_args: usize,
    /// Lines longer than this are rejected.
    pub max_line_len: usize,
    /// Display commands longer than this are truncated.
    pub max_command_len: usize,
    /// Polling period of blocking waits.
    pub poll_interval: Duration,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            max_jobs: DEFAULT_MAX_JOBS,
            max_args: DEFAULT_MAX_ARGS,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            max_command_len: DEFAULT_MAX_COMMAND_LEN,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ShellConfig {
    /// Same configuration with a different job table capacity.
    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs;
        self
    }

    /// Same configuration with a different argument limit.
    pub fn with_max_args(mut self, max_args: usize) -> Self {
        self.max_args = max_args;
        self
    }
}
