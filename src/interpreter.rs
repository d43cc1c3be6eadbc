use crate::command::{CommandFactory, ExitCode};
use crate::config::ShellConfig;
use crate::env::Environment;
use crate::error::{Result, ShellError};
use crate::launcher::{Launcher, Program, StageIo, WaitOutcome};
use crate::lexer;
use crate::parser::{self, Stage};
use crate::pipeline::{Pipeline, PipelineStage};
use crate::signal::{EXIT_MESSAGE, Interrupt, STOP_MESSAGE};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tracing::{debug, warn};

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate, see [`crate::builtin`].
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// The control loop of the shell.
///
/// The interpreter owns the [`Environment`] (job table, interrupt flag, working
/// directory) and a list of [`CommandFactory`] objects queried for built-ins. A word
/// no factory recognizes is run as an external program.
///
/// Example
/// ```
/// use jobsh::{Interpreter, ShellConfig};
/// let mut sh = Interpreter::new(ShellConfig::default());
/// let mut out = Vec::new();
/// let code = sh.run_line("echo hello world", &mut out).unwrap();
/// assert_eq!(code, 0);
/// assert_eq!(out, b"hello world\n");
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
}

impl Interpreter {
    /// Create an interpreter with the default set of built-ins:
    /// `cd`, `pwd`, `echo`, `exit`, `help`, `jobs`, `fg`, `bg`, `ping`.
    pub fn new(config: ShellConfig) -> Self {
        use crate::builtin::*;
        Self::with_commands(
            config,
            vec![
                Box::new(Factory::<Cd>::default()),
                Box::new(Factory::<Pwd>::default()),
                Box::new(Factory::<Echo>::default()),
                Box::new(Factory::<Exit>::default()),
                Box::new(Factory::<Help>::default()),
                Box::new(Factory::<Jobs>::default()),
                Box::new(Factory::<Fg>::default()),
                Box::new(Factory::<Bg>::default()),
                Box::new(Factory::<Ping>::default()),
            ],
        )
    }

    /// Create an interpreter with a custom set of command factories.
    pub fn with_commands(config: ShellConfig, commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(config),
            commands,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Looks `argv[0]` up among the built-ins, falling back to an external program.
    fn resolve(&self, argv: &[String]) -> Result<Program> {
        let Some((name, args)) = argv.split_first() else {
            return Err(ShellError::Syntax("empty command".to_string()));
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        for factory in &self.commands {
            if let Some(command) = factory.try_create(name, &args) {
                return Ok(Program::Builtin {
                    name: name.clone(),
                    command,
                });
            }
        }
        Program::external(argv)
    }

    /// Tokenizes, parses and runs one input line.
    ///
    /// Output of in-process built-ins and the shell's own messages go to `out`;
    /// child processes write to the inherited descriptors. Returns the status of the
    /// line, which is also stored as `last_status`.
    ///
    /// # Errors
    /// Everything that keeps the line from running. Use [`ShellError::is_fatal`] to
    /// tell whether the session can go on.
    pub fn run_line(&mut self, line: &str, out: &mut dyn Write) -> Result<ExitCode> {
        let words = lexer::tokenize(line, &self.env.config)?;
        let Some(command_line) = parser::parse(words)? else {
            return Ok(self.env.last_status);
        };
        debug!(?command_line, "parsed line");

        let code = if command_line.background {
            self.run_background(command_line.stages, out)?
        } else if command_line.stages.len() == 1 {
            let mut stages = command_line.stages;
            let stage = stages.remove(0);
            self.run_single(stage, out)?
        } else {
            self.run_pipeline(command_line.stages, out)?
        };
        self.env.last_status = code;
        Ok(code)
    }

    fn run_background(&mut self, stages: Vec<Stage>, out: &mut dyn Write) -> Result<ExitCode> {
        for stage in stages {
            let program = self.resolve(&stage.argv)?;
            self.env
                .jobs
                .launch_background(program, &stage.display(), out)?;
        }
        Ok(0)
    }

    fn run_single(&mut self, stage: Stage, out: &mut dyn Write) -> Result<ExitCode> {
        let file = stage.append_to.as_deref().map(open_append).transpose()?;
        let code = match self.resolve(&stage.argv)? {
            Program::Builtin { name, command } => {
                debug!(%name, "running built-in");
                let mut stdin = io::stdin();
                let result = match file.as_ref() {
                    Some(mut sink) => command.execute(&mut stdin, &mut sink, &mut self.env),
                    None => command.execute(&mut stdin, out, &mut self.env),
                };
                result.map_err(io::Error::other)?
            }
            program @ Program::External(_) => {
                let io = StageIo {
                    stdout: file.as_ref().map(AsRawFd::as_raw_fd),
                    ..StageIo::default()
                };
                let launcher = Launcher::new(self.env.config);
                let outcome = launcher.run_foreground(program, &io, &self.env.interrupt)?;
                if outcome == WaitOutcome::Interrupted {
                    warn!("foreground command interrupted");
                }
                outcome.code()
            }
        };
        if let Some(target) = &stage.append_to {
            writeln!(out, "Output appended to '{}'.", target.display())?;
        }
        out.flush()?;
        Ok(code)
    }

    fn run_pipeline(&mut self, stages: Vec<Stage>, out: &mut dyn Write) -> Result<ExitCode> {
        let mut targets = Vec::new();
        let mut pipeline = Vec::with_capacity(stages.len());
        for stage in &stages {
            let mut next = PipelineStage::new(self.resolve(&stage.argv)?);
            if let Some(target) = &stage.append_to {
                next = next.with_stdout(open_append(target)?);
                targets.push(target);
            }
            pipeline.push(next);
        }

        // Earlier messages must reach the terminal before the children write to it.
        out.flush()?;
        let launcher = Launcher::new(self.env.config);
        let outcome = Pipeline::new(pipeline).run(&launcher, &self.env.interrupt)?;
        for target in targets {
            writeln!(out, "Output appended to '{}'.", target.display())?;
        }
        Ok(outcome.code())
    }

    /// Runs the interactive prompt loop until `exit`, end of input or a second
    /// interrupt.
    ///
    /// # Errors
    /// A fatal [`ShellError`], or a failure of the line editor itself.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new()?;
        let mut stdout = io::stdout();

        while !self.env.should_exit {
            let prompt = format!("Shell/{} ", self.env.current_dir.display());
            match rl.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    match self.run_line(&line, &mut stdout) {
                        Ok(_) => {}
                        Err(err) if err.is_fatal() => return Err(err.into()),
                        Err(err) => {
                            debug!(%err, "line failed");
                            writeln!(stdout, "{}", err)?;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => match self.env.interrupt.raise() {
                    Interrupt::Stop => writeln!(stdout, "{}", STOP_MESSAGE)?,
                    Interrupt::Exit => {
                        writeln!(stdout, "{}", EXIT_MESSAGE)?;
                        break;
                    }
                },
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .append(true)
        .create(true)
        .mode(0o644)
        .open(path)?)
}
