use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::interpreter::Factory;
use crate::launcher::{Launcher, Program, StageIo, WaitOutcome};
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use nix::unistd::Pid;
use std::env;
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        match T::execute(*self, stdin, stdout, env) {
            Ok(x) => Ok(x),
            Err(e) => {
                writeln!(stdout, "{}", e)?;
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.output)?;
        Ok(if self.is_error { 1 } else { 0 })
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => return Err(anyhow::anyhow!("cd: no target and HOME not set")),
            },
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        writeln!(stdout, "Changed directory to '{}'", canonical.display())?;
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored.
    _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Write the arguments to standard output, separated by spaces.
/// Single and double quotes are removed from every argument.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let words: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.chars().filter(|c| *c != '"' && *c != '\'').collect())
            .collect();
        let s = words.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

const HELP: &str = "\
Shell help:
  cd [directory]  - Change the current working directory.
  pwd             - Print the current working directory.
  echo [args...]  - Print the arguments, without quotes.
  ping <host>     - Probe a network host until interrupted with Ctrl+C.
  command &       - Run a command in the background.
  jobs            - List background jobs and their state.
  fg <pid>        - Wait for a background job to finish.
  bg <pid>        - Resume a background job and stop tracking it.
  cmd >> file     - Append the command's output to a file.
  a | b | c       - Connect commands with pipes.
  help            - Display this help message.
  exit            - Exit the shell.
Any other command is run as an external program.";

#[derive(FromArgs)]
/// Display the list of built-in commands.
pub struct Help {}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", HELP)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List background jobs. Finished jobs are reported once and forgotten.
pub struct Jobs {}

impl BuiltinCommand for Jobs {
    fn name() -> &'static str {
        "jobs"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        env.jobs.list_jobs(stdout)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Wait for a background job to finish.
pub struct Fg {
    #[argh(positional)]
    /// process id of the job.
    pub pid: i32,
}

impl BuiltinCommand for Fg {
    fn name() -> &'static str {
        "fg"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let pid = Pid::from_raw(self.pid);
        Ok(env.jobs.bring_to_foreground(pid, &env.interrupt, stdout)?)
    }
}

#[derive(FromArgs)]
/// Send SIGCONT to a background job and stop tracking it.
pub struct Bg {
    #[argh(positional)]
    /// process id of the job.
    pub pid: i32,
}

impl BuiltinCommand for Bg {
    fn name() -> &'static str {
        "bg"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        env.jobs.resume(Pid::from_raw(self.pid), stdout)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Test the reachability of a network host. Runs until interrupted unless a count is given.
pub struct Ping {
    #[argh(option, short = 'c')]
    /// stop after sending this many probes.
    pub count: Option<u32>,

    #[argh(positional)]
    /// host name or IP address.
    pub host: String,
}

impl Ping {
    fn argv(&self) -> Vec<String> {
        let mut argv = vec!["ping".to_string()];
        if let Some(count) = self.count {
            argv.push("-c".to_string());
            argv.push(count.to_string());
        }
        argv.push(self.host.clone());
        argv
    }
}

impl BuiltinCommand for Ping {
    fn name() -> &'static str {
        "ping"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let program = Program::external(&self.argv())?;
        let outcome = Launcher::new(env.config).run_foreground(
            program,
            &StageIo::default(),
            &env.interrupt,
        )?;
        if outcome == WaitOutcome::Interrupted {
            writeln!(stdout, "Failed to execute the ping command.")?;
        }
        Ok(outcome.code())
    }
}
