//! Translate `SpawnOptions` into an OS command.

use std::process::{Command, Stdio};

use crate::config::{Shell, SpawnOptions};
use crate::protocol::SpawnError;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Build the command line for `command` and `args` with all stdio piped.
///
/// In shell mode the command and its arguments are joined with spaces and
/// handed to the shell unquoted.
///
/// # Errors
///
/// Returns `SpawnError::InvalidOptions` if the command is empty.
pub fn build_command(
    command: &str,
    args: &[String],
    options: &SpawnOptions,
) -> Result<Command, SpawnError> {
    if command.is_empty() {
        return Err(SpawnError::InvalidOptions(
            "command must not be empty".to_string(),
        ));
    }

    let mut cmd = match &options.shell {
        Shell::Disabled => direct_command(command, args, options),
        Shell::Default => shell_command(None, &shell_line(command, args)),
        Shell::Path(path) => shell_command(Some(path.as_os_str()), &shell_line(command, args)),
    };

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(ref dir) = options.cwd {
        cmd.current_dir(dir);
    }

    if let Some(ref env) = options.env {
        cmd.env_clear().envs(env);
    }

    apply_platform_options(&mut cmd, options);

    Ok(cmd)
}

fn shell_line(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

fn direct_command(command: &str, args: &[String], options: &SpawnOptions) -> Command {
    let mut cmd = Command::new(command);

    #[cfg(windows)]
    if options.windows_verbatim_arguments {
        use std::os::windows::process::CommandExt;
        for arg in args {
            cmd.raw_arg(arg);
        }
        return cmd;
    }

    #[cfg(not(windows))]
    let _ = options;

    cmd.args(args);
    cmd
}

#[cfg(unix)]
fn shell_command(shell: Option<&std::ffi::OsStr>, line: &str) -> Command {
    let mut cmd = Command::new(shell.unwrap_or(std::ffi::OsStr::new("/bin/sh")));
    cmd.arg("-c").arg(line);
    cmd
}

#[cfg(windows)]
fn shell_command(shell: Option<&std::ffi::OsStr>, line: &str) -> Command {
    use std::os::windows::process::CommandExt;

    let comspec = std::env::var_os("ComSpec").unwrap_or_else(|| "cmd.exe".into());
    let mut cmd = Command::new(shell.unwrap_or(comspec.as_os_str()));
    cmd.raw_arg("/d /s /c").raw_arg(format!("\"{line}\""));
    cmd
}

#[cfg(unix)]
fn apply_platform_options(cmd: &mut Command, options: &SpawnOptions) {
    use std::os::unix::process::CommandExt;

    if let Some(ref argv0) = options.argv0 {
        cmd.arg0(argv0);
    }
    if let Some(uid) = options.uid {
        cmd.uid(uid);
    }
    if let Some(gid) = options.gid {
        cmd.gid(gid);
    }
}

#[cfg(windows)]
fn apply_platform_options(cmd: &mut Command, options: &SpawnOptions) {
    use std::os::windows::process::CommandExt;

    if options.windows_hide {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    if options.argv0.is_some() || options.uid.is_some() || options.gid.is_some() {
        tracing::warn!("argv0, uid and gid are not supported on this platform, ignoring");
    }
}

#[cfg(not(any(unix, windows)))]
fn apply_platform_options(_cmd: &mut Command, options: &SpawnOptions) {
    if options.argv0.is_some() || options.uid.is_some() || options.gid.is_some() {
        tracing::warn!("argv0, uid and gid are not supported on this platform, ignoring");
    }
}
