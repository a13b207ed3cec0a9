//! End-to-end tests driving real processes.
#![cfg(unix)]

mod bridge_test;
mod options_test;
mod scenario_test;
mod stdin_test;

use blocking_child::{BlockingChild, ChildEvent, ExitStatus, SpawnOptions};

/// Run `script` with `/bin/sh -c`.
pub fn sh(script: &str) -> BlockingChild {
    BlockingChild::spawn("/bin/sh", ["-c", script], SpawnOptions::default()).unwrap()
}

/// Everything pulled from a child up to and including its exit.
#[derive(Debug, Default)]
pub struct Collected {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub chunks: usize,
    pub status: Option<ExitStatus>,
}

/// Pull events until the exit event.
pub fn collect(child: &mut BlockingChild) -> Collected {
    let mut collected = Collected::default();
    while let Some(event) = child.next_event().unwrap() {
        match event {
            ChildEvent::Stdout(data) => {
                collected.chunks += 1;
                collected.stdout.extend(data);
            }
            ChildEvent::Stderr(data) => {
                collected.chunks += 1;
                collected.stderr.extend(data);
            }
            ChildEvent::Exit(status) => {
                assert!(collected.status.is_none(), "second exit event");
                collected.status = Some(status);
            }
        }
    }
    collected
}

/// Verify the public types are exported from the crate root.
#[test]
fn test_public_types_exported() {
    use blocking_child::{
        BridgeConfig, ChildError, KillHandle, KillSignal, Output, ProtocolError, Shell,
        SpawnError, Stdin,
    };

    let _ = BridgeConfig::default();
    let _ = KillSignal::default();
    let _ = Shell::Default;
    let _: fn() -> ChildError = || ChildError::Closed;
    let _: fn() -> ProtocolError = || ProtocolError::ChannelClosed;
    let _: fn() -> SpawnError = || SpawnError::NotFound(String::new());
    let _: Option<(KillHandle, Output, Stdin)> = None;
}
