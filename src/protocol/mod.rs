//! Messages exchanged between the controller and the bridge.
//!
//! ```text
//! Controller (foreground)              Bridge (background)
//!     |                                      |
//!     |-- ControlMessage::StdinChunk ------->| write to child stdin
//!     |-- ControlMessage::StdinClosed ------>| close child stdin
//!     |-- ControlMessage::Terminate -------->| signal the child
//!     |                                      |
//!     |<-- Event::Spawned -------------------|
//!     |<-- Event::Stdout / Event::Stderr ----| child output
//!     |<-- Event::Exit ----------------------| terminal
//! ```
//!
//! Each direction is FIFO. Nothing orders one direction against the other.

mod error;
mod signal;

use serde::{Deserialize, Serialize};

pub use error::*;
pub use signal::*;

/// How a child process ended.
///
/// A non-zero code or a signal is not an error, just an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Name of the terminating signal, e.g. `"SIGTERM"`.
    pub signal: Option<String>,
}

impl ExitStatus {
    /// Convert from the standard library's exit status.
    #[must_use]
    pub fn from_std(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            Self {
                code: status.code(),
                signal: status.signal().map(signal_name),
            }
        }

        #[cfg(not(unix))]
        {
            Self {
                code: status.code(),
                signal: None,
            }
        }
    }

    /// Returns `true` if the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Background to foreground message.
#[derive(Debug)]
pub enum Event {
    /// The process started. Consumed by the controller, never yielded.
    Spawned {
        /// OS process id.
        pid: Option<u32>,
    },
    /// A chunk read from the child's stdout.
    Stdout(Vec<u8>),
    /// A chunk read from the child's stderr.
    Stderr(Vec<u8>),
    /// The process ended.
    Exit(ExitStatus),
    /// The process never started.
    SpawnFailure(SpawnError),
    /// The bridge failed for a reason unrelated to the child.
    Fault(String),
    /// The bridge received traffic it cannot interpret.
    Protocol(ProtocolError),
}

impl Event {
    /// Whether this event ends the session. Nothing follows a terminal event.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Exit(_) | Self::SpawnFailure(_) | Self::Fault(_) | Self::Protocol(_)
        )
    }

    /// Short name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Spawned { .. } => "spawned",
            Self::Stdout(_) => "stdout",
            Self::Stderr(_) => "stderr",
            Self::Exit(_) => "exit",
            Self::SpawnFailure(_) => "spawn_failure",
            Self::Fault(_) => "fault",
            Self::Protocol(_) => "protocol",
        }
    }
}

/// Foreground to background message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Bytes to write to the child's stdin.
    StdinChunk(Vec<u8>),
    /// End of the child's stdin.
    StdinClosed,
    /// Deliver a signal; `None` means the platform default.
    Terminate(Option<KillSignal>),
}
