//! Lifecycle scenarios: echo, spawn failure, exit, closed handles.

use std::io::Write;
use std::time::{Duration, Instant};

use blocking_child::{BlockingChild, ChildError, ChildEvent, SpawnError, SpawnOptions};

use super::{collect, sh};

#[test]
fn echo_roundtrip_then_exit_zero() {
    let mut child = BlockingChild::spawn("cat", Vec::<String>::new(), SpawnOptions::default())
        .unwrap();
    child.stdin().unwrap().write_all(b"hello\n").unwrap();

    let mut seen = Vec::new();
    while !String::from_utf8_lossy(&seen).contains("hello\n") {
        match child.next_event().unwrap() {
            Some(ChildEvent::Stdout(data)) => seen.extend(data),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    child.stdin().unwrap().close();
    let rest = collect(&mut child);
    assert_eq!(rest.status.unwrap().code, Some(0));
    assert!(child.is_closed());
}

#[test]
fn nonexistent_command_raises_spawn_error_once() {
    let mut child = BlockingChild::spawn(
        "/nonexistent/definitely-not-a-binary",
        Vec::<String>::new(),
        SpawnOptions::default(),
    )
    .unwrap();

    let err = child.next_event().unwrap_err();
    assert!(
        matches!(err, ChildError::Spawn(SpawnError::NotFound(_))),
        "got {err:?}"
    );
    assert!(child.is_closed());
    assert!(child.next_event().unwrap().is_none());
    assert!(child.next_event().unwrap().is_none());
}

#[test]
fn next_after_exit_returns_none_without_blocking() {
    let mut child = sh("exit 0");
    let collected = collect(&mut child);
    assert!(collected.status.unwrap().success());

    let start = Instant::now();
    for _ in 0..3 {
        assert!(child.next_event().unwrap().is_none());
    }
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn nonzero_exit_is_an_event_not_an_error() {
    let mut child = sh("echo oops 1>&2; exit 3");
    let collected = collect(&mut child);

    assert_eq!(collected.status.unwrap().code, Some(3));
    assert_eq!(collected.stderr, b"oops\n");
    assert!(collected.stdout.is_empty());
}

#[test]
fn no_output_is_lost_before_exit() {
    let mut child = sh("i=0; while [ $i -lt 500 ]; do echo line$i; i=$((i+1)); done");
    let collected = collect(&mut child);

    let text = String::from_utf8(collected.stdout).unwrap();
    assert_eq!(text.lines().count(), 500);
    assert_eq!(text.lines().last(), Some("line499"));
}

#[test]
fn grandchild_holding_pipes_does_not_delay_exit() {
    let start = Instant::now();
    let mut child = sh("sleep 5 & echo done");
    let collected = collect(&mut child);

    assert_eq!(collected.stdout, b"done\n");
    assert_eq!(collected.status.unwrap().code, Some(0));
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[test]
fn iterator_yields_events_then_ends() {
    let child = sh("printf a; printf b 1>&2");
    let events: Vec<_> = child.map(Result::unwrap).collect();

    assert!(matches!(events.last(), Some(ChildEvent::Exit(status)) if status.success()));
    assert!(events.contains(&ChildEvent::Stdout(b"a".to_vec())));
    assert!(events.contains(&ChildEvent::Stderr(b"b".to_vec())));
}

#[test]
fn wait_with_output_collects_both_streams() {
    let child = sh("printf out; printf err 1>&2; exit 7");
    let output = child.wait_with_output().unwrap();

    assert_eq!(output.stdout, b"out");
    assert_eq!(output.stderr, b"err");
    assert_eq!(output.status.code, Some(7));
}

#[test]
fn wait_closes_stdin() {
    let mut child = BlockingChild::spawn("cat", Vec::<String>::new(), SpawnOptions::default())
        .unwrap();
    let status = child.wait().unwrap();
    assert!(status.success());

    assert!(matches!(child.wait(), Err(ChildError::Closed)));
}

#[test]
fn pid_known_after_first_event() {
    let mut child = sh("echo hi");
    assert!(child.id().is_none());

    let first = child.next_event().unwrap();
    assert!(first.is_some());
    assert!(child.id().is_some());
}

#[test]
fn close_running_process_returns_promptly() {
    let mut child = BlockingChild::spawn("sleep", ["30"], SpawnOptions::default()).unwrap();

    let start = Instant::now();
    child.close();
    child.close();
    assert!(child.is_closed());
    assert!(child.next_event().unwrap().is_none());
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn dropping_running_handle_does_not_hang() {
    let start = Instant::now();
    let child = BlockingChild::spawn("sleep", ["30"], SpawnOptions::default()).unwrap();
    drop(child);
    assert!(start.elapsed() < Duration::from_secs(5));
}
