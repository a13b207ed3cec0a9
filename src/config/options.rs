//! Options for spawning a child process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::KillSignal;

/// Whether to run the command through a shell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ShellRepr", into = "ShellRepr")]
pub enum Shell {
    /// Execute the command directly.
    #[default]
    Disabled,
    /// Use the platform shell (`/bin/sh` or `cmd.exe`).
    Default,
    /// Use the shell at this path.
    Path(PathBuf),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ShellRepr {
    Flag(bool),
    Path(PathBuf),
}

impl From<ShellRepr> for Shell {
    fn from(repr: ShellRepr) -> Self {
        match repr {
            ShellRepr::Flag(false) => Self::Disabled,
            ShellRepr::Flag(true) => Self::Default,
            ShellRepr::Path(path) => Self::Path(path),
        }
    }
}

impl From<Shell> for ShellRepr {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Disabled => Self::Flag(false),
            Shell::Default => Self::Flag(true),
            Shell::Path(path) => Self::Path(path),
        }
    }
}

impl From<bool> for Shell {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Default
        } else {
            Self::Disabled
        }
    }
}

/// Spawn parameters handed to the bridge.
///
/// Unset fields inherit from the parent process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpawnOptions {
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Complete environment. Replaces the inherited one when set.
    pub env: Option<HashMap<String, String>>,
    /// Value passed as `argv[0]` (Unix only).
    pub argv0: Option<String>,
    /// User id to run as (Unix only).
    pub uid: Option<u32>,
    /// Group id to run as (Unix only).
    pub gid: Option<u32>,
    /// Shell to run the command through.
    pub shell: Shell,
    /// Pass arguments without quoting (Windows only).
    pub windows_verbatim_arguments: bool,
    /// Hide the console window (Windows only).
    pub windows_hide: bool,
    /// Signal the process once this much time has passed.
    #[serde(with = "duration_ms")]
    pub timeout: Option<Duration>,
    /// Signal used when `timeout` fires. Defaults to `SIGTERM`.
    pub kill_signal: Option<KillSignal>,
}

impl SpawnOptions {
    /// Create options that inherit everything from the parent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory.
    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Replace the environment with the given variables.
    #[must_use]
    pub fn env<K, V, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Set `argv[0]`.
    #[must_use]
    pub fn argv0(mut self, argv0: impl Into<String>) -> Self {
        self.argv0 = Some(argv0.into());
        self
    }

    /// Run as this user id.
    #[must_use]
    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    /// Run as this group id.
    #[must_use]
    pub fn gid(mut self, gid: u32) -> Self {
        self.gid = Some(gid);
        self
    }

    /// Run through a shell.
    #[must_use]
    pub fn shell(mut self, shell: impl Into<Shell>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Pass arguments verbatim on Windows.
    #[must_use]
    pub fn windows_verbatim_arguments(mut self, verbatim: bool) -> Self {
        self.windows_verbatim_arguments = verbatim;
        self
    }

    /// Hide the console window on Windows.
    #[must_use]
    pub fn windows_hide(mut self, hide: bool) -> Self {
        self.windows_hide = hide;
        self
    }

    /// Signal the process after `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Signal used when the timeout fires.
    #[must_use]
    pub fn kill_signal(mut self, signal: impl Into<KillSignal>) -> Self {
        self.kill_signal = Some(signal.into());
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis))
    }
}
