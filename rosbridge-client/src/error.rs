//! Client error types.

use crate::config::ConfigError;
use crate::transport::TransportError;
use serde_json::Value;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] rosbridge_protocol::ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("unknown transport: {0}")]
    UnknownTransport(String),

    #[error("missing required option: {0}")]
    MissingField(&'static str),

    #[error("service {0} is advertised by this client and cannot be called through it")]
    ServiceAdvertised(String),

    #[error("service call failed: {0}")]
    ServiceFailed(Value),

    #[error("connection closed before a reply arrived")]
    ConnectionClosed,

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Returns whether this error is a configuration problem detected before
    /// any I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ClientError::UnknownTransport(_)
                | ClientError::MissingField(_)
                | ClientError::Config(_)
        )
    }

    /// Returns the remote error payload of a failed service call.
    pub fn remote_values(&self) -> Option<&Value> {
        match self {
            ClientError::ServiceFailed(values) => Some(values),
            _ => None,
        }
    }
}
