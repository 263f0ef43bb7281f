//! In-memory transport for unit tests.
//!
//! [`MockBridge`] is a transport factory whose transports record every sent
//! frame into one shared log (across reconnects) and let the test drive the
//! lifecycle callbacks by hand. An optional responder plays the bridge side:
//! it sees each sent message and returns frames to deliver back.

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::transport::{
    CloseEvent, ReadyState, Transport, TransportError, TransportFactory, TransportHandler,
};
use parking_lot::Mutex;
use rosbridge_protocol::Frame;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) const MOCK: &str = "mock";
pub(crate) const URL: &str = "ws://mock:9090";

type Responder = dyn Fn(&Value) -> Vec<Frame> + Send + Sync;

#[derive(Clone, Default)]
pub(crate) struct MockBridge {
    shared: Arc<MockShared>,
}

#[derive(Default)]
struct MockShared {
    sent: Mutex<Vec<String>>,
    handler: Mutex<Option<Arc<dyn TransportHandler>>>,
    current: Mutex<Option<Arc<MockTransport>>>,
    last_url: Mutex<Option<String>>,
    created: AtomicUsize,
    refuse: AtomicBool,
    responder: Mutex<Option<Arc<Responder>>>,
}

struct MockTransport {
    state: AtomicU8,
    shared: Arc<MockShared>,
}

impl Transport for MockTransport {
    fn send(&self, text: String) -> Result<(), TransportError> {
        if self.ready_state() != ReadyState::Open || self.shared.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let value: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        self.shared.sent.lock().push(text);

        let responder = self.shared.responder.lock().clone();
        if let Some(responder) = responder {
            for frame in responder(&value) {
                self.shared.deliver(frame);
            }
        }
        Ok(())
    }

    fn close(&self) {
        if self.ready_state() == ReadyState::Closed {
            return;
        }
        self.state.store(ReadyState::Closed.to_u8(), Ordering::SeqCst);
        let handler = self.shared.handler.lock().clone();
        if let Some(handler) = handler {
            handler.on_close(CloseEvent::new(Some(1000), "client close"));
        }
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

impl TransportFactory for MockBridge {
    fn create(
        &self,
        url: &str,
        handler: Arc<dyn TransportHandler>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        self.shared.created.fetch_add(1, Ordering::SeqCst);
        *self.shared.last_url.lock() = Some(url.to_string());
        *self.shared.handler.lock() = Some(handler);

        let transport = Arc::new(MockTransport {
            state: AtomicU8::new(ReadyState::Connecting.to_u8()),
            shared: self.shared.clone(),
        });
        *self.shared.current.lock() = Some(transport.clone());
        Ok(transport)
    }
}

impl MockShared {
    fn handler(&self) -> Arc<dyn TransportHandler> {
        self.handler
            .lock()
            .clone()
            .expect("no transport has been created")
    }

    fn deliver(&self, frame: Frame) {
        self.handler().on_message(frame);
    }

    fn set_state(&self, state: ReadyState) {
        if let Some(transport) = self.current.lock().as_ref() {
            transport.state.store(state.to_u8(), Ordering::SeqCst);
        }
    }
}

impl MockBridge {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A connection using this bridge, connected but not yet open.
    pub(crate) fn connection(&self) -> Connection {
        self.connection_with(ConnectionConfig::new())
    }

    pub(crate) fn connection_with(&self, config: ConnectionConfig) -> Connection {
        let conn = Connection::builder(config.with_transport(MOCK))
            .transport_factory(MOCK, Arc::new(self.clone()))
            .build()
            .expect("build mock connection");
        conn.connect(URL).expect("connect mock transport");
        conn
    }

    /// Callbacks of the most recently created transport.
    pub(crate) fn handler(&self) -> Arc<dyn TransportHandler> {
        self.shared.handler()
    }

    /// Completes the handshake of the current transport.
    pub(crate) fn open(&self) {
        self.shared.set_state(ReadyState::Open);
        self.shared.handler().on_open();
    }

    /// The server drops the connection.
    pub(crate) fn drop_connection(&self) {
        self.shared.set_state(ReadyState::Closed);
        self.shared
            .handler()
            .on_close(CloseEvent::new(Some(1006), "abnormal closure"));
    }

    /// Reports a close event without touching the transport state.
    pub(crate) fn fire_close(&self) {
        self.shared
            .handler()
            .on_close(CloseEvent::new(Some(1006), "abnormal closure"));
    }

    pub(crate) fn error(&self, message: &str) {
        self.shared.handler().on_error(message.to_string());
    }

    pub(crate) fn receive(&self, message: Value) {
        self.shared.deliver(Frame::Text(message.to_string()));
    }

    pub(crate) fn receive_frame(&self, frame: Frame) {
        self.shared.deliver(frame);
    }

    /// Makes the transport reject every send.
    pub(crate) fn refuse_sends(&self) {
        self.shared.refuse.store(true, Ordering::SeqCst);
    }

    /// Installs a fake bridge answering each sent message.
    pub(crate) fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&Value) -> Vec<Frame> + Send + Sync + 'static,
    {
        *self.shared.responder.lock() = Some(Arc::new(responder));
    }

    /// Every message sent so far, parsed.
    pub(crate) fn sent(&self) -> Vec<Value> {
        self.shared
            .sent
            .lock()
            .iter()
            .map(|text| serde_json::from_str(text).expect("sent frame is JSON"))
            .collect()
    }

    /// Sent messages with the given op.
    pub(crate) fn sent_ops(&self, op: &str) -> Vec<Value> {
        self.sent().into_iter().filter(|m| m["op"] == op).collect()
    }

    pub(crate) fn clear_sent(&self) {
        self.shared.sent.lock().clear();
    }

    pub(crate) fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    pub(crate) fn last_url(&self) -> Option<String> {
        self.shared.last_url.lock().clone()
    }
}
