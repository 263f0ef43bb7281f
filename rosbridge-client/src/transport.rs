//! Transport capability.
//!
//! A transport is a message-oriented duplex channel: it sends discrete text
//! frames and reports `open`/`close`/`error`/`message` to a handler. Framing,
//! sockets and TLS all live behind this seam.

use rosbridge_protocol::Frame;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("no async runtime available to drive the transport")]
    NoRuntime,

    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
}

/// Lifecycle state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            ReadyState::Connecting => 0,
            ReadyState::Open => 1,
            ReadyState::Closing => 2,
            ReadyState::Closed => 3,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Details of a transport close.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close code, when the peer sent one.
    pub code: Option<u16>,
    /// Close reason, possibly empty.
    pub reason: String,
}

impl CloseEvent {
    pub fn new(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// An open (or opening) transport.
pub trait Transport: Send + Sync {
    /// Queues one text frame.
    fn send(&self, text: String) -> Result<(), TransportError>;

    /// Starts closing. The handler sees `on_close` once the close completes.
    fn close(&self);

    fn ready_state(&self) -> ReadyState;
}

/// Callback slots a transport reports its lifecycle to.
///
/// A transport must not invoke the handler from inside
/// [`TransportFactory::create`].
pub trait TransportHandler: Send + Sync {
    fn on_open(&self);
    fn on_close(&self, event: CloseEvent);
    fn on_error(&self, error: String);
    fn on_message(&self, frame: Frame);
}

/// Creates transports of one kind.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        url: &str,
        handler: Arc<dyn TransportHandler>,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}

impl fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("ready_state", &self.ready_state())
            .finish()
    }
}
