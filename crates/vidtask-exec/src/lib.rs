//! External command executor.
//!
//! This crate provides:
//! - One-shot command execution with captured stdout/stderr
//! - Kill-on-timeout with no leaked child processes
//! - Distinguished "executable not found" reporting

pub mod command;
pub mod error;

pub use command::{run_command, run_command_with_timeout};
pub use error::{ExecError, ExecResult};
