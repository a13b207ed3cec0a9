//! The bridge driven directly over a raw channel pair.

use blocking_child::bridge::Bridge;
use blocking_child::channel::{self, ForegroundEndpoint};
use blocking_child::protocol::{ControlMessage, Event, ProtocolError, SpawnError};
use blocking_child::{BridgeConfig, SpawnOptions};
use tokio_util::sync::CancellationToken;

fn start(command: &str, args: &[&str], queued: Vec<ControlMessage>) -> ForegroundEndpoint {
    let (fg, bg) = channel::pair();
    for msg in queued {
        fg.control().send(msg).unwrap();
    }
    Bridge::new(
        command,
        args.iter().map(|s| (*s).to_string()).collect(),
        SpawnOptions::default(),
        BridgeConfig::default(),
        bg,
        CancellationToken::new(),
    )
    .start()
    .unwrap();
    fg
}

/// Receive until a terminal event, returning it and everything before it.
fn until_terminal(fg: &mut ForegroundEndpoint) -> (Vec<Event>, Event) {
    let mut before = Vec::new();
    loop {
        let event = fg.recv_blocking().expect("channel closed before terminal event");
        if event.is_terminal() {
            return (before, event);
        }
        before.push(event);
    }
}

#[test]
fn spawned_is_sent_first() {
    let mut fg = start("/bin/sh", &["-c", "echo hi"], vec![]);
    let (before, terminal) = until_terminal(&mut fg);

    assert!(matches!(before.first(), Some(Event::Spawned { pid: Some(_) })));
    assert!(matches!(terminal, Event::Exit(ref s) if s.success()));
    assert!(fg.recv_blocking().is_none());
}

#[test]
fn spawn_failure_is_the_only_event() {
    let mut fg = start("/nonexistent/binary", &[], vec![]);
    let (before, terminal) = until_terminal(&mut fg);

    assert!(before.is_empty());
    assert!(matches!(terminal, Event::SpawnFailure(SpawnError::NotFound(_))));
    assert!(fg.recv_blocking().is_none());
}

#[test]
fn duplicate_stdin_close_is_a_protocol_error() {
    let mut fg = start(
        "sleep",
        &["30"],
        vec![ControlMessage::StdinClosed, ControlMessage::StdinClosed],
    );
    let (_, terminal) = until_terminal(&mut fg);

    assert!(matches!(
        terminal,
        Event::Protocol(ProtocolError::DuplicateStdinClose)
    ));
}

#[test]
fn stdin_after_close_is_a_protocol_error() {
    let mut fg = start(
        "sleep",
        &["30"],
        vec![
            ControlMessage::StdinClosed,
            ControlMessage::StdinChunk(b"late".to_vec()),
        ],
    );
    let (_, terminal) = until_terminal(&mut fg);

    assert!(matches!(
        terminal,
        Event::Protocol(ProtocolError::StdinAfterClose)
    ));
}

#[test]
fn stdin_chunks_are_written_in_order() {
    let mut fg = start(
        "cat",
        &[],
        vec![
            ControlMessage::StdinChunk(b"one ".to_vec()),
            ControlMessage::StdinChunk(b"two ".to_vec()),
            ControlMessage::StdinChunk(b"three".to_vec()),
            ControlMessage::StdinClosed,
        ],
    );
    let (before, terminal) = until_terminal(&mut fg);

    let stdout: Vec<u8> = before
        .into_iter()
        .filter_map(|event| match event {
            Event::Stdout(data) => Some(data),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(stdout, b"one two three");
    assert!(matches!(terminal, Event::Exit(ref s) if s.success()));
}

#[test]
fn closing_the_controller_side_stops_the_bridge() {
    let (mut fg, bg) = channel::pair();
    let handle = Bridge::new(
        "sleep",
        vec!["30".to_string()],
        SpawnOptions::default(),
        BridgeConfig::default(),
        bg,
        CancellationToken::new(),
    )
    .start()
    .unwrap();

    fg.close();
    handle.join().unwrap();
}

#[test]
fn cancellation_stops_the_bridge() {
    let (_fg, bg) = channel::pair();
    let cancel = CancellationToken::new();
    let handle = Bridge::new(
        "sleep",
        vec!["30".to_string()],
        SpawnOptions::default(),
        BridgeConfig::default(),
        bg,
        cancel.clone(),
    )
    .start()
    .unwrap();

    cancel.cancel();
    handle.join().unwrap();
}
