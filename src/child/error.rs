//! Errors raised to the caller of a blocking child.

use crate::protocol::{ProtocolError, SpawnError, UnknownSignal};

/// Errors returned by `BlockingChild`.
///
/// A non-zero exit code or death by signal is not an error; those arrive as
/// an ordinary `ChildEvent::Exit`.
#[derive(thiserror::Error, Debug)]
pub enum ChildError {
    /// The process never started.
    #[error("Failed to spawn process: {0}")]
    Spawn(#[from] SpawnError),

    /// The two sides disagreed about the protocol.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The background context failed for a reason unrelated to the process.
    #[error("Background fault: {0}")]
    Background(String),

    /// The requested signal is not known on this platform.
    #[error(transparent)]
    InvalidSignal(#[from] UnknownSignal),

    /// The handle was already closed.
    #[error("Process handle already closed")]
    Closed,
}
