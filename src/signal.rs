//! Bridge between the OS interrupt signal and the blocking waits of the shell.

use nix::libc;
use signal_hook::SigId;
use signal_hook::consts::SIGINT;
use signal_hook::low_level;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) const STOP_MESSAGE: &str = "Ctrl+C pressed. Stopping current operation...";
pub(crate) const EXIT_MESSAGE: &str = "Ctrl+C pressed. Exiting the shell...";

/// What a single interrupt means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// First interrupt: cancel the foreground wait in progress.
    Stop,
    /// The flag was already raised: leave the shell.
    Exit,
}

/// Process-wide interrupt state.
///
/// Clones share the same flag. Once raised it stays raised for the rest of the
/// session, so a second interrupt always ends the shell.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Records one interrupt and tells what it means.
    pub fn raise(&self) -> Interrupt {
        if self.0.swap(true, Ordering::SeqCst) {
            Interrupt::Exit
        } else {
            Interrupt::Stop
        }
    }

    /// Routes SIGINT to this flag.
    ///
    /// The handler prints the stop message on the first signal and terminates the
    /// process with status 0 on the second one.
    pub fn install(&self) -> std::io::Result<SigId> {
        let flag = self.clone();
        // SAFETY: the handler only performs an atomic swap, write(2) and _exit(2),
        // all of which are async-signal-safe.
        unsafe { low_level::register(SIGINT, move || flag.on_signal()) }
    }

    fn on_signal(&self) {
        match self.raise() {
            Interrupt::Stop => write_line(STOP_MESSAGE),
            Interrupt::Exit => {
                write_line(EXIT_MESSAGE);
                low_level::exit(0);
            }
        }
    }
}

fn write_line(message: &str) {
    let _ = nix::unistd::write(libc::STDOUT_FILENO, message.as_bytes());
    let _ = nix::unistd::write(libc::STDOUT_FILENO, b"\n");
}
