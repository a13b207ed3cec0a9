//! Byte sink feeding the child's standard input.

use std::borrow::Cow;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use crate::channel::{transfer, ControlSender};
use crate::protocol::ControlMessage;

/// State shared between a `Stdin` and its controller.
///
/// The lock is held across the closed check and the send, so a chunk can
/// never be enqueued after `StdinClosed`.
#[derive(Debug)]
pub(crate) struct StdinShared {
    control: ControlSender,
    closed: Mutex<bool>,
}

impl StdinShared {
    pub(crate) fn new(control: ControlSender) -> Arc<Self> {
        Arc::new(Self {
            control,
            closed: Mutex::new(false),
        })
    }

    fn send(&self, data: Vec<u8>) -> io::Result<()> {
        let closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin is closed"));
        }
        self.control
            .send(ControlMessage::StdinChunk(data))
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))
    }

    /// Send `StdinClosed` the first time only.
    pub(crate) fn close(&self) {
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return;
        }
        *closed = true;
        if self.control.send(ControlMessage::StdinClosed).is_err() {
            tracing::trace!("Channel already closed, stdin close not delivered");
        } else {
            tracing::debug!("Stdin closed");
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write end of the child's standard input.
///
/// Writes are queued for the background bridge and return immediately.
/// Dropping the sink closes it.
#[derive(Debug)]
pub struct Stdin {
    shared: Arc<StdinShared>,
}

impl Stdin {
    pub(crate) fn new(shared: Arc<StdinShared>) -> Self {
        Self { shared }
    }

    /// Queue a buffer for the child. Owned buffers are moved, borrowed
    /// ones are copied.
    ///
    /// # Errors
    ///
    /// Returns `BrokenPipe` if stdin was closed or the process handle has
    /// shut down.
    pub fn send<'a>(&mut self, data: impl Into<Cow<'a, [u8]>>) -> io::Result<()> {
        self.shared.send(transfer(data))
    }

    /// Signal end of input. Idempotent.
    pub fn close(&mut self) {
        self.shared.close();
    }

    /// Whether end of input has been signalled.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl io::Write for Stdin {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.shared.send(transfer(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for Stdin {
    fn drop(&mut self) {
        self.shared.close();
    }
}
