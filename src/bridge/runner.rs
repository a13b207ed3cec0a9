//! Background side of a blocking child: owns the process and its I/O.

use std::io;
use std::thread::JoinHandle;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bridge::build_command;
use crate::channel::BackgroundEndpoint;
use crate::config::{BridgeConfig, SpawnOptions};
use crate::protocol::{ControlMessage, Event, ExitStatus, KillSignal, ProtocolError, SpawnError};

/// Name of the thread that runs the bridge.
pub const BRIDGE_THREAD_NAME: &str = "blocking-child-bridge";

/// Drives one child process and reports on it over a `BackgroundEndpoint`.
#[derive(Debug)]
pub struct Bridge {
    command: String,
    args: Vec<String>,
    options: SpawnOptions,
    config: BridgeConfig,
    endpoint: BackgroundEndpoint,
    cancel: CancellationToken,
}

impl Bridge {
    /// Create a bridge. Nothing is spawned until it runs.
    #[must_use]
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        options: SpawnOptions,
        config: BridgeConfig,
        endpoint: BackgroundEndpoint,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            options,
            config,
            endpoint,
            cancel,
        }
    }

    /// Run the bridge on a dedicated thread with its own runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be created.
    pub fn start(self) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(BRIDGE_THREAD_NAME.to_string())
            .spawn(move || self.run_blocking())
    }

    fn run_blocking(mut self) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build bridge runtime");
                let _ = self
                    .endpoint
                    .send(Event::Fault(format!("Failed to build bridge runtime: {e}")));
                self.endpoint.close();
                return;
            }
        };

        runtime.block_on(self.run());
        // Don't let a stuck blocking task hold up the controller's join.
        runtime.shutdown_background();
    }

    /// Spawn the process and forward its events until it exits.
    ///
    /// Exactly one terminal event is sent unless the controller goes away
    /// first.
    pub async fn run(mut self) {
        let terminal = match self.spawn() {
            Ok(child) => self.supervise(child).await,
            Err(e) => {
                tracing::debug!(command = %self.command, error = %e, "Failed to spawn process");
                Some(Event::SpawnFailure(e))
            }
        };

        if let Some(event) = terminal {
            tracing::debug!(kind = event.kind(), "Sending terminal event");
            if self.endpoint.send(event).is_err() {
                tracing::debug!("Controller closed before the terminal event");
            }
        }
        self.endpoint.close();
    }

    fn spawn(&self) -> Result<Child, SpawnError> {
        let mut cmd = tokio::process::Command::from(build_command(
            &self.command,
            &self.args,
            &self.options,
        )?);
        cmd.kill_on_drop(true);
        cmd.spawn().map_err(|e| SpawnError::from_io(&self.command, e))
    }

    /// Event loop for a running child. Returns the terminal event, or `None`
    /// if the controller is gone and nobody is listening.
    async fn supervise(&mut self, mut child: Child) -> Option<Event> {
        let pid = child.id();
        tracing::debug!(command = %self.command, pid = ?pid, "Process spawned");
        if self.endpoint.send(Event::Spawned { pid }).is_err() {
            return None;
        }

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut stdin = StdinPipe::new(child.stdin.take());

        let mut out_buf = vec![0u8; self.config.read_buffer_size()];
        let mut err_buf = vec![0u8; self.config.read_buffer_size()];

        let timeout_at = self.options.timeout.map(|t| Instant::now() + t);
        let mut timeout_fired = false;

        let mut status: Option<ExitStatus> = None;
        let mut drain_until: Option<Instant> = None;

        while status.is_none() || stdout.is_some() || stderr.is_some() {
            let step = tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Bridge cancelled");
                    Step::Finish(None)
                }

                msg = self.endpoint.recv() => handle_control(&mut child, &mut stdin, msg),

                read = read_chunk(stdout.as_mut(), &mut out_buf), if stdout.is_some() => {
                    self.forward_read(read, &out_buf, &mut stdout, Event::Stdout, "stdout")
                }

                read = read_chunk(stderr.as_mut(), &mut err_buf), if stderr.is_some() => {
                    self.forward_read(read, &err_buf, &mut stderr, Event::Stderr, "stderr")
                }

                result = child.wait(), if status.is_none() => match result {
                    Ok(exit) => {
                        let exit = ExitStatus::from_std(exit);
                        tracing::debug!(code = ?exit.code, signal = ?exit.signal, "Process exited");
                        status = Some(exit);
                        drain_until = Some(Instant::now() + self.config.exit_drain_timeout());
                        Step::Continue
                    }
                    Err(e) => Step::Finish(Some(Event::Fault(format!("Failed to wait for process: {e}")))),
                },

                () = sleep_until(timeout_at), if !timeout_fired && status.is_none() => {
                    timeout_fired = true;
                    let signal = self.options.kill_signal.clone().unwrap_or_default();
                    tracing::debug!(%signal, "Timeout elapsed, signalling process");
                    terminate(&mut child, Some(&signal));
                    Step::Continue
                }

                () = sleep_until(drain_until), if drain_until.is_some() => {
                    tracing::debug!("Output still open after exit, not waiting further");
                    break;
                }
            };

            if let Step::Finish(event) = step {
                return event;
            }
        }

        status.map(Event::Exit)
    }

    /// Forward one read from a stdout/stderr pipe. EOF drops the stream.
    fn forward_read<R>(
        &self,
        read: io::Result<usize>,
        buf: &[u8],
        stream: &mut Option<R>,
        wrap: fn(Vec<u8>) -> Event,
        name: &str,
    ) -> Step {
        match read {
            Ok(0) => {
                tracing::trace!(stream = name, "Output stream closed");
                *stream = None;
                Step::Continue
            }
            Ok(n) => {
                if self.endpoint.send(wrap(buf[..n].to_vec())).is_err() {
                    Step::Finish(None)
                } else {
                    Step::Continue
                }
            }
            Err(e) => Step::Finish(Some(Event::Fault(format!("Failed to read {name}: {e}")))),
        }
    }
}

/// What the event loop does after handling one branch.
#[derive(Debug)]
enum Step {
    Continue,
    /// Stop, reporting the terminal event if anyone is listening.
    Finish(Option<Event>),
}

/// The bridge's side of the child's stdin.
#[derive(Debug)]
struct StdinPipe {
    writer: Option<mpsc::UnboundedSender<Vec<u8>>>,
    closed: bool,
}

impl StdinPipe {
    fn new(stdin: Option<ChildStdin>) -> Self {
        Self {
            writer: spawn_stdin_writer(stdin),
            closed: false,
        }
    }

    fn write(&self, data: Vec<u8>) -> Result<(), ProtocolError> {
        if self.closed {
            return Err(ProtocolError::StdinAfterClose);
        }
        tracing::trace!(len = data.len(), "Queueing stdin chunk");
        if let Some(tx) = &self.writer {
            let _ = tx.send(data);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), ProtocolError> {
        if self.closed {
            return Err(ProtocolError::DuplicateStdinClose);
        }
        self.closed = true;
        self.writer = None;
        Ok(())
    }
}

fn handle_control(child: &mut Child, stdin: &mut StdinPipe, msg: Option<ControlMessage>) -> Step {
    let result = match msg {
        None => {
            tracing::debug!("Control channel closed, stopping bridge");
            return Step::Finish(None);
        }
        Some(ControlMessage::StdinChunk(data)) => stdin.write(data),
        Some(ControlMessage::StdinClosed) => stdin.close(),
        Some(ControlMessage::Terminate(signal)) => {
            terminate(child, signal.as_ref());
            Ok(())
        }
    };

    match result {
        Ok(()) => Step::Continue,
        Err(err) => Step::Finish(Some(protocol_fault(child, err))),
    }
}

/// Read from an optional stream. A missing stream never completes.
async fn read_chunk<R>(reader: Option<&mut R>, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Sleep until an optional deadline. No deadline never completes.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Feed stdin from a queue on its own task so a slow reader cannot stall
/// output forwarding. Dropping the returned sender closes the pipe once the
/// queue is written.
fn spawn_stdin_writer(stdin: Option<ChildStdin>) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
    let mut stdin = stdin?;
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if let Err(e) = stdin.write_all(&chunk).await {
                if e.kind() == io::ErrorKind::BrokenPipe {
                    tracing::debug!("Process closed its stdin, discarding further input");
                } else {
                    tracing::warn!(error = %e, "Failed to write to process stdin");
                }
                return;
            }
        }
        let _ = stdin.shutdown().await;
        tracing::debug!("Process stdin closed");
    });

    Some(tx)
}

fn protocol_fault(child: &mut Child, err: ProtocolError) -> Event {
    tracing::error!(error = %err, "Protocol violation, killing process");
    let _ = child.start_kill();
    Event::Protocol(err)
}

/// Deliver `signal` (default `SIGTERM`) to the child if it is still running.
#[cfg(unix)]
fn terminate(child: &mut Child, signal: Option<&KillSignal>) {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        tracing::debug!("Process already reaped, ignoring terminate");
        return;
    };

    let signal = match signal.map_or(Ok(Signal::SIGTERM), KillSignal::to_nix) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring terminate request");
            return;
        }
    };

    let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
    match kill(nix_pid, signal) {
        Ok(()) => tracing::debug!(pid, signal = ?signal, "Signal sent"),
        Err(Errno::ESRCH) => tracing::debug!(pid, "Process already gone"),
        Err(e) => tracing::warn!(pid, error = %e, "Failed to signal process"),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, signal: Option<&KillSignal>) {
    tracing::debug!(signal = ?signal, "Terminating process");
    if let Err(e) = child.start_kill() {
        tracing::warn!(error = %e, "Failed to terminate process");
    }
}
