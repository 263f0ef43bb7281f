//! Canonical message types for the rosbridge protocol.
//!
//! Every frame, whatever its wire encoding, decodes to one [`Message`]. The
//! variant is selected by the `op` field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical in-memory representation of one protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Message {
    // Session
    Auth(Auth),
    SetLevel(SetLevel),
    Status(Status),

    // Topics
    Subscribe(Subscribe),
    Unsubscribe(Unsubscribe),
    Advertise(Advertise),
    Unadvertise(Unadvertise),
    Publish(Publish),

    // Services
    CallService(CallService),
    ServiceResponse(ServiceResponse),
    AdvertiseService(AdvertiseService),
    UnadvertiseService(UnadvertiseService),

    /// Any `op` this client does not know. Dispatch ignores it.
    #[serde(other)]
    Unknown,
}

impl Message {
    /// Returns the wire `op` name.
    pub fn op(&self) -> &'static str {
        match self {
            Message::Auth(_) => "auth",
            Message::SetLevel(_) => "set_level",
            Message::Status(_) => "status",
            Message::Subscribe(_) => "subscribe",
            Message::Unsubscribe(_) => "unsubscribe",
            Message::Advertise(_) => "advertise",
            Message::Unadvertise(_) => "unadvertise",
            Message::Publish(_) => "publish",
            Message::CallService(_) => "call_service",
            Message::ServiceResponse(_) => "service_response",
            Message::AdvertiseService(_) => "advertise_service",
            Message::UnadvertiseService(_) => "unadvertise_service",
            Message::Unknown => "unknown",
        }
    }

    /// Returns the operation id carried by the message, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Message::SetLevel(m) => m.id.as_deref(),
            Message::Status(m) => m.id.as_deref(),
            Message::Subscribe(m) => Some(&m.id),
            Message::Unsubscribe(m) => Some(&m.id),
            Message::Advertise(m) => Some(&m.id),
            Message::Unadvertise(m) => Some(&m.id),
            Message::Publish(m) => m.id.as_deref(),
            Message::CallService(m) => m.id.as_deref(),
            Message::ServiceResponse(m) => m.id.as_deref(),
            Message::Auth(_)
            | Message::AdvertiseService(_)
            | Message::UnadvertiseService(_)
            | Message::Unknown => None,
        }
    }
}

/// Topic compression requested from the bridge when subscribing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Compression {
    #[default]
    None,
    Png,
    Cbor,
    CborRaw,
}

/// Status report verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    None,
    #[default]
    Error,
    Warning,
    Info,
}

// ============================================================================
// Session messages
// ============================================================================

/// One-way authentication handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auth {
    /// MAC (hash) string given by the trusted source.
    pub mac: String,
    /// IP of the client.
    pub client: String,
    /// IP of the destination.
    pub dest: String,
    /// Random string given by the trusted source.
    pub rand: String,
    /// Time of the authorization request.
    pub t: f64,
    /// User level as given by the client.
    pub level: String,
    /// End time of the client's session.
    pub end: f64,
}

/// Adjusts status verbosity, optionally for a single operation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetLevel {
    pub level: StatusLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Status report from the bridge.
///
/// `msg` is usually a string but is kept as any JSON value. Fields beyond
/// `id`, `level` and `msg` are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Topic messages
// ============================================================================

/// Requests a wire subscription to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscribe {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub topic: String,
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub throttle_rate: u64,
    #[serde(default)]
    pub queue_length: u64,
}

/// Ends a wire subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unsubscribe {
    pub id: String,
    pub topic: String,
}

/// Announces this client as a publisher on a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advertise {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub topic: String,
    #[serde(default)]
    pub latch: bool,
    #[serde(default)]
    pub queue_size: u64,
}

/// Withdraws a topic advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unadvertise {
    pub id: String,
    pub topic: String,
}

/// A message on a topic. Inbound publishes from the bridge carry no id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publish {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub topic: String,
    #[serde(default)]
    pub msg: Value,
    #[serde(default)]
    pub latch: bool,
}

// ============================================================================
// Service messages
// ============================================================================

/// A service request, outbound from a caller or inbound to an advertiser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub service: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default)]
    pub args: Value,
}

/// Reply to a [`CallService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub service: String,
    #[serde(default)]
    pub values: Value,
    /// `Some(false)` marks a failed call. Older bridges omit the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<bool>,
}

impl ServiceResponse {
    /// Returns whether the remote reported failure.
    pub fn is_failure(&self) -> bool {
        self.result == Some(false)
    }
}

/// Announces this client as the server for a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertiseService {
    #[serde(rename = "type")]
    pub service_type: String,
    pub service: String,
}

/// Withdraws a service advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnadvertiseService {
    pub service: String,
}
