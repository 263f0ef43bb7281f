//! # rosbridge-client
//!
//! Client library for rosbridge.
//!
//! This crate provides:
//! - A connection owning one pluggable transport (WebSocket built in)
//! - A named-channel multiplexer routing inbound messages to listeners
//! - Topics with shared subscriptions, on-demand advertising and resubscribe
//!   after reconnect
//! - Service calls correlated by operation id, and service advertising
//! - Parameter access and rosapi introspection helpers

pub mod config;
pub mod connection;
pub mod error;
pub mod mux;
pub mod param;
pub mod rosapi;
pub mod service;
pub mod topic;
pub mod transport;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{BinaryMode, ConfigError, ConnectionConfig, TopicDefaults};
pub use connection::{Connection, ConnectionBuilder, Event};
pub use error::ClientError;
pub use mux::{ChannelMultiplexer, ListenerId};
pub use param::Param;
pub use rosapi::{NodeDetails, TopicsAndRawTypes, TopicsAndTypes, TypeDef, TypeDetails};
pub use service::{PendingCall, Service, ServiceHandler};
pub use topic::{Topic, TopicOptions};
pub use transport::{
    CloseEvent, ReadyState, Transport, TransportError, TransportFactory, TransportHandler,
};
pub use websocket::WebSocketFactory;
