//! Stdin sink behavior against real processes.

use std::io::{ErrorKind, Write};

use blocking_child::{BlockingChild, SpawnOptions};

use super::collect;

fn cat() -> BlockingChild {
    BlockingChild::spawn("cat", Vec::<String>::new(), SpawnOptions::default()).unwrap()
}

#[test]
fn chunks_arrive_unmodified_in_write_order() {
    let mut child = cat();
    let mut expected = Vec::new();
    {
        let stdin = child.stdin().unwrap();
        for i in 0..200u32 {
            let chunk = format!("chunk-{i};").into_bytes();
            expected.extend_from_slice(&chunk);
            stdin.send(chunk).unwrap();
        }
        let binary: Vec<u8> = (0..=255u8).collect();
        expected.extend_from_slice(&binary);
        stdin.write_all(&binary).unwrap();
        stdin.close();
    }

    let collected = collect(&mut child);
    assert_eq!(collected.stdout, expected);
    assert!(collected.status.unwrap().success());
}

#[test]
fn write_after_close_is_rejected() {
    let mut child = cat();
    let stdin = child.stdin().unwrap();
    stdin.close();
    assert!(stdin.is_closed());

    let err = stdin.write(b"late").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BrokenPipe);

    let collected = collect(&mut child);
    assert!(collected.stdout.is_empty());
    assert!(collected.status.unwrap().success());
}

#[test]
fn write_after_exit_is_rejected() {
    let mut child = cat();
    let mut stdin = child.take_stdin().unwrap();
    stdin.send(&b"x"[..]).unwrap();
    stdin.close();

    let _ = collect(&mut child);
    assert!(stdin.send(&b"y"[..]).is_err());
}

#[test]
fn dropping_taken_stdin_closes_input() {
    let mut child = cat();
    let stdin = child.take_stdin().unwrap();
    assert!(child.take_stdin().is_none());
    drop(stdin);

    let collected = collect(&mut child);
    assert!(collected.status.unwrap().success());
}

#[test]
fn stdin_can_be_fed_from_another_thread() {
    let mut child = cat();
    let mut stdin = child.take_stdin().unwrap();

    let writer = std::thread::spawn(move || {
        for _ in 0..50 {
            stdin.write_all(b"0123456789").unwrap();
        }
        stdin.close();
    });

    let collected = collect(&mut child);
    writer.join().unwrap();
    assert_eq!(collected.stdout, b"0123456789".repeat(50));
}

#[test]
fn process_ignoring_stdin_is_not_a_fault() {
    let mut child = super::sh("exec 0<&-; echo ready");
    child.stdin().unwrap().write_all(b"ignored\n").unwrap();

    let collected = collect(&mut child);
    assert_eq!(collected.stdout, b"ready\n");
    assert!(collected.status.unwrap().success());
}
