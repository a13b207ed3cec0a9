//! Background bridge between a live child process and the channel.
//!
//! The bridge runs on its own thread with a current-thread `tokio` runtime.
//! It spawns the process, forwards stdout/stderr chunks as events, applies
//! control messages to stdin and signals, and reports exactly one terminal
//! event.

mod command;
mod runner;

pub use command::*;
pub use runner::*;
