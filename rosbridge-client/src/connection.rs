//! Connection management.
//!
//! A [`Connection`] composes two collaborators: the [`Transport`] it owns
//! exclusively (recreated on every `connect`) and the [`ChannelMultiplexer`]
//! every topic and service on this connection registers with. Multiplexer
//! registrations survive reconnects.

use crate::config::{ConnectionConfig, WEBSOCKET_TRANSPORT};
use crate::error::ClientError;
use crate::mux::{ChannelMultiplexer, ListenerId};
use crate::transport::{
    CloseEvent, ReadyState, Transport, TransportFactory, TransportHandler,
};
use crate::websocket::WebSocketFactory;
use parking_lot::Mutex;
use rosbridge_protocol::message::*;
use rosbridge_protocol::{Decoder, Encoder, Frame, FrameDecoder};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Emitted when the transport opens.
pub const CONNECTION: &str = "connection";
/// Emitted when the transport closes.
pub const CLOSE: &str = "close";
/// Emitted on transport errors and unresolved type definitions.
pub const ERROR: &str = "error";
/// Emitted for status messages without an operation id.
pub const STATUS: &str = "status";

/// Channel carrying status messages for one operation id.
pub fn status_channel(id: &str) -> String {
    format!("status: {}", id)
}

/// Payload delivered on a multiplexer channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The transport opened.
    Connection,
    /// The transport closed.
    Close(CloseEvent),
    /// A transport error or a local protocol complaint.
    Error(String),
    /// A message on a topic (the `msg` body).
    Publish(Value),
    /// A reply to one of this client's service calls.
    ServiceResponse(ServiceResponse),
    /// A request to a service this client advertises.
    CallService(CallService),
    /// A status report.
    Status(Status),
    /// A topic dropped its wire subscription.
    Unsubscribe,
    /// A topic withdrew its advertisement.
    Unadvertise,
}

/// A connection to a rosbridge server.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    config: ConnectionConfig,
    factories: HashMap<String, Arc<dyn TransportFactory>>,
    decoder: Decoder,
    /// Current transport, replaced on reconnect.
    transport: Mutex<Option<Arc<dyn Transport>>>,
    /// Is the transport open?
    connected: AtomicBool,
    /// Source of every operation id.
    id_counter: AtomicU64,
    /// Bumped for every transport created; events from older ones are stale.
    generation: AtomicU64,
    mux: ChannelMultiplexer<Event>,
}

/// Builds a [`Connection`] with injected capabilities.
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    decoder: Decoder,
    factories: HashMap<String, Arc<dyn TransportFactory>>,
}

impl ConnectionBuilder {
    pub fn new(config: ConnectionConfig) -> Self {
        let mut factories: HashMap<String, Arc<dyn TransportFactory>> = HashMap::new();
        factories.insert(
            WEBSOCKET_TRANSPORT.to_string(),
            Arc::new(WebSocketFactory::new(config.binary_mode)),
        );
        Self {
            config,
            decoder: Decoder::new(),
            factories,
        }
    }

    /// Replaces the built-in decode pipeline with `decoder`.
    pub fn decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.decoder = Decoder::with_custom(decoder);
        self
    }

    /// Registers a transport kind under `name`.
    pub fn transport_factory(
        mut self,
        name: impl Into<String>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        self.factories.insert(name.into(), factory);
        self
    }

    /// Builds the connection, connecting right away when a URL is configured.
    pub fn build(self) -> Result<Connection, ClientError> {
        let conn = Connection {
            inner: Arc::new(ConnectionInner {
                config: self.config,
                factories: self.factories,
                decoder: self.decoder,
                transport: Mutex::new(None),
                connected: AtomicBool::new(false),
                id_counter: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                mux: ChannelMultiplexer::new(),
            }),
        };

        if let Some(url) = conn.inner.config.url.clone() {
            conn.connect(&url)?;
        }
        Ok(conn)
    }
}

impl Connection {
    /// Creates a connection with the default transports and decoder.
    pub fn new(config: ConnectionConfig) -> Result<Self, ClientError> {
        ConnectionBuilder::new(config).build()
    }

    pub fn builder(config: ConnectionConfig) -> ConnectionBuilder {
        ConnectionBuilder::new(config)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Connects to `url`.
    ///
    /// A no-op while the current transport is not closed. Fails before any
    /// I/O when the configured transport kind is not registered.
    pub fn connect(&self, url: &str) -> Result<(), ClientError> {
        let kind = &self.inner.config.transport;
        let factory = self
            .inner
            .factories
            .get(kind)
            .ok_or_else(|| ClientError::UnknownTransport(kind.clone()))?;

        let mut slot = self.inner.transport.lock();
        if let Some(transport) = slot.as_ref() {
            if transport.ready_state() != ReadyState::Closed {
                tracing::debug!("connect({}) ignored: transport already active", url);
                return Ok(());
            }
        }

        tracing::debug!("Connecting to {} via {}", url, kind);
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handler: Arc<dyn TransportHandler> = Arc::new(SocketAdapter {
            inner: Arc::downgrade(&self.inner),
            generation,
        });
        *slot = Some(factory.create(url, handler)?);
        Ok(())
    }

    /// Closes the transport, if there is one.
    pub fn close(&self) {
        let transport = self.inner.transport.lock().clone();
        if let Some(transport) = transport {
            tracing::debug!("Closing connection");
            transport.close();
        }
    }

    /// Returns whether the transport is open.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Allocates the next value of the connection-wide id counter.
    pub fn next_id(&self) -> u64 {
        self.inner.id_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Allocates an operation id of the form `<kind>:<name>:<counter>`.
    pub fn operation_id(&self, kind: &str, name: &str) -> String {
        format!("{}:{}:{}", kind, name, self.next_id())
    }

    /// Sends a message, deferring it until the transport opens if necessary.
    pub fn send(&self, message: &Message) -> Result<(), ClientError> {
        let text = Encoder::encode(message)?;
        self.send_encoded(text);
        Ok(())
    }

    /// Sends pre-encoded JSON text.
    ///
    /// While disconnected, each call registers its own one-shot `connection`
    /// listener, so deferred frames go out in call order.
    pub fn send_encoded(&self, text: String) {
        if self.is_connected() {
            self.inner.transmit(text);
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let deferred = text.clone();
        let waiter = self.inner.mux.once(CONNECTION, move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.transmit(deferred.clone());
            }
        });

        // The transport may have opened between the check and the
        // registration; if the waiter has not fired yet, send it ourselves.
        if self.is_connected() && self.inner.mux.off(CONNECTION, waiter) {
            self.inner.transmit(text);
        }
    }

    /// Registers a listener on a multiplexer channel.
    pub fn on<F>(&self, channel: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.mux.on(channel, callback)
    }

    /// Registers a one-shot listener on a multiplexer channel.
    pub fn once<F>(&self, channel: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.mux.once(channel, callback)
    }

    /// Removes a listener.
    pub fn off(&self, channel: &str, id: ListenerId) -> bool {
        self.inner.mux.off(channel, id)
    }

    /// Emits an event on a multiplexer channel.
    pub fn emit(&self, channel: &str, event: &Event) -> usize {
        self.inner.mux.emit(channel, event)
    }

    /// Number of listeners on a multiplexer channel.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.inner.mux.listener_count(channel)
    }

    /// Sends an authorization request.
    #[allow(clippy::too_many_arguments)]
    pub fn authenticate(
        &self,
        mac: &str,
        client: &str,
        dest: &str,
        rand: &str,
        t: f64,
        level: &str,
        end: f64,
    ) -> Result<(), ClientError> {
        self.send(&Message::Auth(Auth {
            mac: mac.to_string(),
            client: client.to_string(),
            dest: dest.to_string(),
            rand: rand.to_string(),
            t,
            level: level.to_string(),
            end,
        }))
    }

    /// Sets the status verbosity, optionally for one operation id only.
    pub fn set_status_level(&self, level: StatusLevel, id: Option<&str>) -> Result<(), ClientError> {
        self.send(&Message::SetLevel(SetLevel {
            level,
            id: id.map(str::to_string),
        }))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.inner.config.transport)
            .field("connected", &self.is_connected())
            .field("decoder", &self.inner.decoder)
            .finish()
    }
}

impl ConnectionInner {
    fn transmit(&self, text: String) {
        let transport = self.transport.lock().clone();
        let Some(transport) = transport else {
            tracing::warn!("Dropping outbound frame: no transport");
            return;
        };
        if let Err(e) = transport.send(text) {
            tracing::warn!("Failed to send frame: {}", e);
            self.mux.emit(ERROR, &Event::Error(e.to_string()));
        }
    }

    /// Routes a decoded message to its multiplexer channel.
    fn dispatch(&self, message: Message) {
        match message {
            Message::Publish(publish) => {
                self.mux.emit(&publish.topic, &Event::Publish(publish.msg));
            }
            Message::ServiceResponse(response) => match response.id.clone() {
                Some(id) => {
                    self.mux.emit(&id, &Event::ServiceResponse(response));
                }
                None => {
                    tracing::debug!("Dropping service_response without id for {}", response.service);
                }
            },
            Message::CallService(call) => {
                let channel = call.service.clone();
                self.mux.emit(&channel, &Event::CallService(call));
            }
            Message::Status(status) => {
                let channel = match &status.id {
                    Some(id) => status_channel(id),
                    None => STATUS.to_string(),
                };
                self.mux.emit(&channel, &Event::Status(status));
            }
            other @ (Message::Auth(_)
            | Message::SetLevel(_)
            | Message::Subscribe(_)
            | Message::Unsubscribe(_)
            | Message::Advertise(_)
            | Message::Unadvertise(_)
            | Message::AdvertiseService(_)
            | Message::UnadvertiseService(_)
            | Message::Unknown) => {
                tracing::debug!("Ignoring inbound {} message", other.op());
            }
        }
    }
}

/// Transport callbacks, bound to the connection without keeping it alive.
struct SocketAdapter {
    inner: Weak<ConnectionInner>,
    generation: u64,
}

impl SocketAdapter {
    /// The connection, unless it is gone or has moved on to a newer transport.
    fn current(&self) -> Option<Arc<ConnectionInner>> {
        self.inner
            .upgrade()
            .filter(|inner| inner.generation.load(Ordering::SeqCst) == self.generation)
    }
}

impl TransportHandler for SocketAdapter {
    fn on_open(&self) {
        if let Some(inner) = self.current() {
            tracing::debug!("Transport open");
            inner.connected.store(true, Ordering::SeqCst);
            inner.mux.emit(CONNECTION, &Event::Connection);
        }
    }

    fn on_close(&self, event: CloseEvent) {
        if let Some(inner) = self.current() {
            tracing::debug!("Transport closed: {:?}", event);
            inner.connected.store(false, Ordering::SeqCst);
            inner.mux.emit(CLOSE, &Event::Close(event));
        }
    }

    fn on_error(&self, error: String) {
        if let Some(inner) = self.current() {
            tracing::debug!("Transport error: {}", error);
            inner.mux.emit(ERROR, &Event::Error(error));
        }
    }

    fn on_message(&self, frame: Frame) {
        let Some(inner) = self.current() else {
            return;
        };
        match inner.decoder.decode(&frame) {
            Ok(message) => inner.dispatch(message),
            Err(e) => {
                tracing::error!(
                    "Dropping malformed {} frame ({} bytes): {}",
                    frame.kind(),
                    frame.len(),
                    e
                );
            }
        }
    }
}
