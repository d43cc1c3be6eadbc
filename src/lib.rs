//! A small interactive shell with job control.
//!
//! The crate turns input lines into processes: single commands run in the foreground
//! or in the background (`cmd &`), `|` connects any number of stages with pipes, and
//! `>> file` appends a stage's output to a file. Background processes are tracked in
//! a bounded job table and driven with the `jobs`, `fg` and `bg` built-ins. The first
//! Ctrl+C cancels the foreground wait, the second one ends the session.
//!
//! The main entry point is [`Interpreter`], which owns all session state. The public
//! modules expose the building blocks it is made of: [`lexer`] and [`parser`] for
//! input, [`launcher`] and [`pipeline`] for processes, [`jobs`] for the job table and
//! [`signal`] for the interrupt flag.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
mod interpreter;
pub mod jobs;
pub mod launcher;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod signal;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;

pub use config::ShellConfig;
pub use error::ShellError;
