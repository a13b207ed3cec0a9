//! Signal names and numbers accepted by `kill` and `killSignal`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Signal names understood on platforms without POSIX signals.
#[cfg(not(unix))]
const PORTABLE_SIGNALS: &[&str] = &["SIGTERM", "SIGKILL", "SIGINT", "SIGQUIT", "SIGHUP"];

/// Error for a signal name or number the platform does not know.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown signal: {0}")]
pub struct UnknownSignal(pub String);

/// A signal to deliver to the child, by name or by number.
///
/// Names are case-insensitive and the `SIG` prefix is optional, so
/// `"SIGTERM"`, `"TERM"` and `"term"` all name the same signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KillSignal {
    /// Raw signal number.
    Number(i32),
    /// Signal name.
    Name(String),
}

impl Default for KillSignal {
    fn default() -> Self {
        Self::Name("SIGTERM".to_string())
    }
}

impl fmt::Display for KillSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<i32> for KillSignal {
    fn from(n: i32) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for KillSignal {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl KillSignal {
    /// Parse user input, treating all-digit strings as signal numbers.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        match trimmed.parse::<i32>() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Name(trimmed.to_string()),
        }
    }

    /// Canonical upper-case name with the `SIG` prefix.
    fn canonical_name(name: &str) -> String {
        let upper = name.trim().to_ascii_uppercase();
        if upper.starts_with("SIG") {
            upper
        } else {
            format!("SIG{upper}")
        }
    }

    /// Resolve to a POSIX signal.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSignal` if the name or number is not a valid signal.
    #[cfg(unix)]
    pub fn to_nix(&self) -> Result<nix::sys::signal::Signal, UnknownSignal> {
        use nix::sys::signal::Signal;

        match self {
            Self::Number(n) => Signal::try_from(*n).map_err(|_| UnknownSignal(n.to_string())),
            Self::Name(name) => Self::canonical_name(name)
                .parse::<Signal>()
                .map_err(|_| UnknownSignal(name.clone())),
        }
    }

    /// Check that this signal can be delivered on the current platform.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSignal` if the signal is not recognized.
    pub fn validate(&self) -> Result<(), UnknownSignal> {
        #[cfg(unix)]
        {
            self.to_nix().map(|_| ())
        }

        #[cfg(not(unix))]
        {
            match self {
                Self::Number(n) if *n > 0 => Ok(()),
                Self::Name(name) if PORTABLE_SIGNALS.contains(&Self::canonical_name(name).as_str()) => {
                    Ok(())
                }
                _ => Err(UnknownSignal(self.to_string())),
            }
        }
    }

    /// Signal number, when the platform can map it.
    #[must_use]
    pub fn number(&self) -> Option<i32> {
        #[cfg(unix)]
        {
            self.to_nix().ok().map(|sig| sig as i32)
        }

        #[cfg(not(unix))]
        {
            match self {
                Self::Number(n) => Some(*n),
                Self::Name(_) => None,
            }
        }
    }
}

/// Name for a raw signal number reported by the OS, e.g. `15` -> `"SIGTERM"`.
#[must_use]
pub fn signal_name(raw: i32) -> String {
    #[cfg(unix)]
    {
        nix::sys::signal::Signal::try_from(raw)
            .map_or_else(|_| raw.to_string(), |sig| sig.as_str().to_string())
    }

    #[cfg(not(unix))]
    {
        raw.to_string()
    }
}
