//! # rosbridge-protocol
//!
//! Wire protocol implementation for the rosbridge v2 protocol.
//!
//! This crate provides:
//! - The canonical [`Message`] sum type, tagged by the `op` field
//! - The inbound [`Frame`] model (text, raw binary buffer, binary document)
//! - A decode pipeline covering JSON, BSON, CBOR typed arrays and PNG-packed JSON
//! - Outbound JSON text encoding

pub mod cbor;
pub mod codec;
pub mod compression;
pub mod error;
pub mod frame;
pub mod message;

pub use cbor::TypedArray;
pub use codec::{Decoder, Encoder, FrameDecoder};
pub use error::ProtocolError;
pub use frame::Frame;
pub use message::{
    Advertise, AdvertiseService, Auth, CallService, Compression, Message, Publish,
    ServiceResponse, SetLevel, Status, StatusLevel, Subscribe, Unadvertise, UnadvertiseService,
    Unsubscribe,
};

/// Default rosbridge WebSocket port.
pub const DEFAULT_PORT: u16 = 9090;

/// Default rosbridge URL.
pub const DEFAULT_URL: &str = "ws://localhost:9090";
