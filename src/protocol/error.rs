//! Errors that travel across the channel as terminal events.

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The executable was not found.
    #[error("Command not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// The spawn options could not be applied.
    #[error("Invalid spawn options: {0}")]
    InvalidOptions(String),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    #[must_use]
    pub fn from_io(command: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(command.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(command.to_string()),
            std::io::ErrorKind::InvalidInput => Self::InvalidOptions(err.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Malformed or out-of-sequence traffic between the two contexts.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The event channel closed before a terminal event arrived.
    #[error("Channel closed before the process reported an exit")]
    ChannelClosed,
    /// Stdin data arrived after stdin was closed.
    #[error("Stdin chunk received after stdin was closed")]
    StdinAfterClose,
    /// Stdin was closed twice.
    #[error("Stdin closed more than once")]
    DuplicateStdinClose,
}
