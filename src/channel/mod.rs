//! Ordered channel between the foreground caller and the background bridge.
//!
//! Each direction is an unbounded `tokio` mpsc queue. The foreground side
//! suspends its thread with `blocking_recv`; the background side awaits
//! `recv` on its runtime. Sends never block in either direction.

use std::borrow::Cow;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::protocol::{ControlMessage, Event};

/// The other endpoint is gone or this endpoint was closed.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Channel closed")]
pub struct ChannelClosed;

/// Turn a buffer into an owned chunk for sending.
///
/// Owned buffers are moved without copying. Borrowed buffers cannot be
/// handed over, so they are copied.
#[must_use]
pub fn transfer<'a>(data: impl Into<Cow<'a, [u8]>>) -> Vec<u8> {
    match data.into() {
        Cow::Owned(buf) => buf,
        Cow::Borrowed(slice) => {
            tracing::trace!(len = slice.len(), "Copying borrowed buffer for transfer");
            slice.to_vec()
        }
    }
}

/// Create a connected pair of endpoints.
#[must_use]
pub fn pair() -> (ForegroundEndpoint, BackgroundEndpoint) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let foreground = ForegroundEndpoint {
        events: event_rx,
        control: ControlSender {
            inner: Arc::new(Mutex::new(Some(control_tx))),
        },
        closed: false,
    };
    let background = BackgroundEndpoint {
        events: Some(event_tx),
        control: control_rx,
    };

    (foreground, background)
}

/// Shared send half for control messages.
///
/// Clones share one underlying sender, so closing any clone closes all of
/// them.
#[derive(Debug, Clone)]
pub struct ControlSender {
    inner: Arc<Mutex<Option<mpsc::UnboundedSender<ControlMessage>>>>,
}

impl ControlSender {
    /// Enqueue a control message without waiting for it to be consumed.
    ///
    /// # Errors
    ///
    /// Returns `ChannelClosed` if either side has closed the channel.
    pub fn send(&self, msg: ControlMessage) -> Result<(), ChannelClosed> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.send(msg).map_err(|_| ChannelClosed),
            None => Err(ChannelClosed),
        }
    }

    /// Close the send half for every clone. Idempotent.
    pub fn close(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Whether sends will fail.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(true, mpsc::UnboundedSender::is_closed)
    }
}

/// Endpoint owned by the controller.
#[derive(Debug)]
pub struct ForegroundEndpoint {
    events: mpsc::UnboundedReceiver<Event>,
    control: ControlSender,
    closed: bool,
}

impl ForegroundEndpoint {
    /// Block the current thread until the next event arrives.
    ///
    /// Returns `None` once the endpoint is closed or the background side has
    /// dropped its sender and the queue is empty.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context, as
    /// `tokio`'s `blocking_recv` does.
    pub fn recv_blocking(&mut self) -> Option<Event> {
        if self.closed {
            return None;
        }
        self.events.blocking_recv()
    }

    /// Send half for control messages.
    #[must_use]
    pub fn control(&self) -> &ControlSender {
        &self.control
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close both directions. Idempotent and irreversible.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.control.close();
        self.events.close();
        tracing::debug!("Foreground endpoint closed");
    }
}

/// Endpoint owned by the bridge.
#[derive(Debug)]
pub struct BackgroundEndpoint {
    events: Option<mpsc::UnboundedSender<Event>>,
    control: mpsc::UnboundedReceiver<ControlMessage>,
}

impl BackgroundEndpoint {
    /// Send an event to the controller.
    ///
    /// # Errors
    ///
    /// Returns `ChannelClosed` if the controller has gone away or this
    /// endpoint was closed.
    pub fn send(&self, event: Event) -> Result<(), ChannelClosed> {
        let tx = self.events.as_ref().ok_or(ChannelClosed)?;
        tracing::trace!(kind = event.kind(), "Sending event");
        tx.send(event).map_err(|_| ChannelClosed)
    }

    /// Wait for the next control message.
    ///
    /// Returns `None` once the controller has closed its side.
    pub async fn recv(&mut self) -> Option<ControlMessage> {
        self.control.recv().await
    }

    /// Close both directions. Idempotent and irreversible.
    pub fn close(&mut self) {
        if self.events.take().is_some() {
            self.control.close();
            tracing::debug!("Background endpoint closed");
        }
    }
}
