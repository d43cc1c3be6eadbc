//! Helpers shared by the integration tests.

#![allow(dead_code)]

pub use assert_cmd::Command;

/// Command running the compiled `jobsh` binary.
pub fn jobsh_cmd() -> Command {
    Command::cargo_bin("jobsh").expect("Failed to find jobsh binary for testing")
}
