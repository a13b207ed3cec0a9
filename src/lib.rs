//! Blocking Child - drive an asynchronous child process from synchronous code.
//!
//! A [`BlockingChild`] starts a background bridge thread that owns the
//! process and its I/O on a private `tokio` runtime. The caller pulls events
//! with ordinary blocking calls and writes stdin whenever it likes.

pub mod bridge;
pub mod channel;
pub mod child;
pub mod config;
pub mod protocol;

pub use child::{BlockingChild, ChildError, ChildEvent, KillHandle, Output, Stdin};
pub use config::{BridgeConfig, Shell, SpawnOptions};
pub use protocol::{ExitStatus, KillSignal, ProtocolError, SpawnError};
