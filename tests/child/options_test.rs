//! Spawn options applied to real processes.

use blocking_child::{BlockingChild, BridgeConfig, Shell, SpawnOptions};

use super::collect;

#[test]
fn env_replaces_inherited_environment() {
    let options = SpawnOptions::new().env([("GREETING", "bonjour")]);
    let mut child = BlockingChild::spawn(
        "/bin/sh",
        ["-c", "printf '%s|%s' \"$GREETING\" \"${HOME:-unset}\""],
        options,
    )
    .unwrap();

    let collected = collect(&mut child);
    assert_eq!(collected.stdout, b"bonjour|unset");
}

#[test]
fn cwd_sets_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let expected = dir.path().canonicalize().unwrap();

    let options = SpawnOptions::new().cwd(dir.path());
    let mut child = BlockingChild::spawn("/bin/sh", ["-c", "pwd -P"], options).unwrap();

    let collected = collect(&mut child);
    let printed = String::from_utf8(collected.stdout).unwrap();
    assert_eq!(printed.trim_end(), expected.to_str().unwrap());
}

#[test]
fn missing_cwd_is_a_spawn_error() {
    let options = SpawnOptions::new().cwd("/nonexistent/working/dir");
    let mut child = BlockingChild::spawn("true", Vec::<String>::new(), options).unwrap();

    assert!(child.next_event().is_err());
    assert!(child.next_event().unwrap().is_none());
}

#[test]
fn shell_expands_command_line() {
    let options = SpawnOptions::new().shell(true);
    let mut child = BlockingChild::spawn("echo", ["$((1 + 2))"], options).unwrap();

    let collected = collect(&mut child);
    assert_eq!(collected.stdout, b"3\n");
}

#[test]
fn explicit_shell_path() {
    let options = SpawnOptions::new().shell(Shell::Path("/bin/sh".into()));
    let mut child = BlockingChild::spawn("echo hi && exit 4", Vec::<String>::new(), options)
        .unwrap();

    let collected = collect(&mut child);
    assert_eq!(collected.stdout, b"hi\n");
    assert_eq!(collected.status.unwrap().code, Some(4));
}

#[test]
fn argv0_is_visible_to_the_process() {
    let options = SpawnOptions::new().argv0("custom-name");
    let mut child = BlockingChild::spawn("/bin/sh", ["-c", "printf '%s' \"$0\""], options)
        .unwrap();

    let collected = collect(&mut child);
    assert_eq!(collected.stdout, b"custom-name");
}

#[test]
fn small_read_buffer_splits_chunks() {
    let config = BridgeConfig {
        read_buffer_size: 4,
        ..BridgeConfig::default()
    };
    let mut child = BlockingChild::spawn_with_config(
        "/bin/sh",
        ["-c", "printf abcdefghij"],
        SpawnOptions::default(),
        config,
    )
    .unwrap();

    let mut chunks = Vec::new();
    while let Some(event) = child.next_event().unwrap() {
        if let blocking_child::ChildEvent::Stdout(data) = event {
            assert!(data.len() <= 4);
            chunks.push(data);
        }
    }
    assert!(chunks.len() >= 3);
    assert_eq!(chunks.concat(), b"abcdefghij");
}
