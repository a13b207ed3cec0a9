//! Foreground handle to a child process driven from a background bridge.

use std::any::Any;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio_util::sync::CancellationToken;

use crate::bridge::Bridge;
use crate::channel::{self, ControlSender, ForegroundEndpoint};
use crate::child::stdin::{Stdin, StdinShared};
use crate::child::ChildError;
use crate::config::{BridgeConfig, SpawnOptions};
use crate::protocol::{ControlMessage, Event, ExitStatus, KillSignal, ProtocolError};

/// An event yielded by `BlockingChild::next_event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildEvent {
    /// A chunk of standard output.
    Stdout(Vec<u8>),
    /// A chunk of standard error.
    Stderr(Vec<u8>),
    /// The process ended. Always the last event.
    Exit(ExitStatus),
}

/// Everything a process wrote, plus how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// How the process ended.
    pub status: ExitStatus,
    /// All stdout chunks, concatenated.
    pub stdout: Vec<u8>,
    /// All stderr chunks, concatenated.
    pub stderr: Vec<u8>,
}

/// Sends termination requests from any thread.
///
/// Obtained from `BlockingChild::kill_handle` so a thread other than the one
/// blocked in `next_event` can enforce a deadline.
#[derive(Debug, Clone)]
pub struct KillHandle {
    control: ControlSender,
}

impl KillHandle {
    /// Ask the process to terminate with the platform default signal.
    pub fn kill(&self) {
        send_terminate(&self.control, None);
    }

    /// Ask the process to terminate with `signal`.
    ///
    /// # Errors
    ///
    /// Returns `ChildError::InvalidSignal` if the signal is unknown.
    pub fn kill_with(&self, signal: impl Into<KillSignal>) -> Result<(), ChildError> {
        let signal = signal.into();
        signal.validate()?;
        send_terminate(&self.control, Some(signal));
        Ok(())
    }
}

fn send_terminate(control: &ControlSender, signal: Option<KillSignal>) {
    if control.send(ControlMessage::Terminate(signal)).is_err() {
        tracing::debug!("Process handle closed, ignoring kill");
    }
}

/// A child process observed through blocking calls.
///
/// Construction starts a background bridge and returns at once; the process
/// itself is spawned by the bridge. Events are pulled with `next_event` (or
/// by iterating), which suspends the calling thread until the bridge has
/// something to report. After the terminal event the handle is closed and
/// every further pull returns `Ok(None)` without blocking.
///
/// ```no_run
/// use std::io::Write;
///
/// use blocking_child::{BlockingChild, ChildEvent, SpawnOptions};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut child = BlockingChild::spawn("cat", Vec::<String>::new(), SpawnOptions::default())?;
/// if let Some(stdin) = child.stdin() {
///     stdin.write_all(b"hello\n")?;
///     stdin.close();
/// }
/// for event in &mut child {
///     match event? {
///         ChildEvent::Stdout(data) => print!("{}", String::from_utf8_lossy(&data)),
///         ChildEvent::Stderr(data) => eprint!("{}", String::from_utf8_lossy(&data)),
///         ChildEvent::Exit(status) => println!("exited with {:?}", status.code),
///     }
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Panics
///
/// `next_event` and the methods built on it block the thread, so they panic
/// if called from inside an asynchronous runtime.
#[derive(Debug)]
pub struct BlockingChild {
    endpoint: ForegroundEndpoint,
    stdin: Option<Stdin>,
    stdin_shared: Arc<StdinShared>,
    cancel: CancellationToken,
    bridge: Option<JoinHandle<()>>,
    pid: Option<u32>,
    closed: bool,
}

impl BlockingChild {
    /// Start `command` with `args` using the default bridge configuration.
    ///
    /// Spawn failures are not reported here; they surface as
    /// `ChildError::Spawn` from the first `next_event` call.
    ///
    /// # Errors
    ///
    /// Returns `ChildError::Background` if the bridge thread cannot be
    /// created.
    pub fn spawn<I, S>(command: &str, args: I, options: SpawnOptions) -> Result<Self, ChildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::spawn_with_config(command, args, options, BridgeConfig::default())
    }

    /// Start `command` with an explicit bridge configuration.
    ///
    /// # Errors
    ///
    /// Returns `ChildError::Background` if the bridge thread cannot be
    /// created.
    pub fn spawn_with_config<I, S>(
        command: &str,
        args: I,
        options: SpawnOptions,
        config: BridgeConfig,
    ) -> Result<Self, ChildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let (endpoint, background) = channel::pair();
        let cancel = CancellationToken::new();

        tracing::debug!(command, args = ?args, "Starting bridge");
        let bridge = Bridge::new(command, args, options, config, background, cancel.clone())
            .start()
            .map_err(|e| ChildError::Background(format!("Failed to start bridge thread: {e}")))?;

        Ok(Self::from_parts(endpoint, cancel, Some(bridge)))
    }

    fn from_parts(
        endpoint: ForegroundEndpoint,
        cancel: CancellationToken,
        bridge: Option<JoinHandle<()>>,
    ) -> Self {
        let stdin_shared = StdinShared::new(endpoint.control().clone());
        Self {
            stdin: Some(Stdin::new(Arc::clone(&stdin_shared))),
            stdin_shared,
            endpoint,
            cancel,
            bridge,
            pid: None,
            closed: false,
        }
    }

    /// Block until the next event.
    ///
    /// Returns `Ok(None)` once the handle is closed. The exit event closes
    /// the handle before it is returned; spawn failures and faults close it
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `ChildError::Spawn` if the process never started,
    /// `ChildError::Background` if the bridge failed, and
    /// `ChildError::Protocol` if the channel broke down.
    pub fn next_event(&mut self) -> Result<Option<ChildEvent>, ChildError> {
        if self.closed {
            return Ok(None);
        }

        loop {
            let Some(event) = self.endpoint.recv_blocking() else {
                return Err(match self.shutdown() {
                    Some(panic) => ChildError::Background(format!("Bridge thread panicked: {panic}")),
                    None => ProtocolError::ChannelClosed.into(),
                });
            };

            match event {
                Event::Spawned { pid } => self.pid = pid,
                Event::Stdout(data) => return Ok(Some(ChildEvent::Stdout(data))),
                Event::Stderr(data) => return Ok(Some(ChildEvent::Stderr(data))),
                Event::Exit(status) => {
                    self.shutdown();
                    return Ok(Some(ChildEvent::Exit(status)));
                }
                Event::SpawnFailure(err) => {
                    self.shutdown();
                    return Err(err.into());
                }
                Event::Fault(message) => {
                    tracing::warn!(error = %message, "Background fault");
                    self.shutdown();
                    return Err(ChildError::Background(message));
                }
                Event::Protocol(err) => {
                    self.shutdown();
                    return Err(err.into());
                }
            }
        }
    }

    /// Borrow the stdin sink, unless it was taken.
    pub fn stdin(&mut self) -> Option<&mut Stdin> {
        self.stdin.as_mut()
    }

    /// Take ownership of the stdin sink, e.g. to feed it from another thread.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdin(&mut self) -> Option<Stdin> {
        self.stdin.take()
    }

    /// Ask the process to terminate with the platform default signal.
    ///
    /// Fire-and-forget: watch for `ChildEvent::Exit` to learn that the
    /// process is gone. Does nothing once the handle is closed.
    pub fn kill(&self) {
        if self.closed {
            return;
        }
        send_terminate(self.endpoint.control(), None);
    }

    /// Ask the process to terminate with `signal`.
    ///
    /// # Errors
    ///
    /// Returns `ChildError::InvalidSignal` if the signal is unknown.
    pub fn kill_with(&self, signal: impl Into<KillSignal>) -> Result<(), ChildError> {
        let signal = signal.into();
        signal.validate()?;
        if !self.closed {
            send_terminate(self.endpoint.control(), Some(signal));
        }
        Ok(())
    }

    /// A handle that can request termination from another thread.
    #[must_use]
    pub fn kill_handle(&self) -> KillHandle {
        KillHandle {
            control: self.endpoint.control().clone(),
        }
    }

    /// OS process id, known once the first event has been pulled.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the handle has shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close stdin and pull events until the process exits.
    ///
    /// Output is discarded.
    ///
    /// # Errors
    ///
    /// Returns `ChildError::Closed` if the handle was already closed, or any
    /// error `next_event` reports.
    pub fn wait(&mut self) -> Result<ExitStatus, ChildError> {
        self.stdin_shared.close();
        while let Some(event) = self.next_event()? {
            if let ChildEvent::Exit(status) = event {
                return Ok(status);
            }
        }
        Err(ChildError::Closed)
    }

    /// Close stdin and collect all output until the process exits.
    ///
    /// # Errors
    ///
    /// Returns `ChildError::Closed` if the handle was already closed, or any
    /// error `next_event` reports.
    pub fn wait_with_output(mut self) -> Result<Output, ChildError> {
        self.stdin_shared.close();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        while let Some(event) = self.next_event()? {
            match event {
                ChildEvent::Stdout(data) => stdout.extend_from_slice(&data),
                ChildEvent::Stderr(data) => stderr.extend_from_slice(&data),
                ChildEvent::Exit(status) => {
                    return Ok(Output {
                        status,
                        stdout,
                        stderr,
                    })
                }
            }
        }
        Err(ChildError::Closed)
    }

    /// Shut the handle down without waiting for the process.
    ///
    /// The bridge stops and the process is killed if it is still running.
    /// Idempotent.
    pub fn close(&mut self) {
        self.shutdown();
    }

    /// Release everything. Returns the bridge's panic message, if it
    /// panicked.
    fn shutdown(&mut self) -> Option<String> {
        if self.closed {
            return None;
        }
        self.closed = true;

        self.stdin_shared.close();
        self.endpoint.close();
        self.cancel.cancel();

        let handle = self.bridge.take()?;
        match handle.join() {
            Ok(()) => {
                tracing::debug!(pid = ?self.pid, "Process handle closed");
                None
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(panic = %message, "Bridge thread panicked");
                Some(message)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Iterator for BlockingChild {
    type Item = Result<ChildEvent, ChildError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

impl Drop for BlockingChild {
    fn drop(&mut self) {
        self.shutdown();
    }
}
