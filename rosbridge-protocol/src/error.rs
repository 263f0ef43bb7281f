//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding or encoding protocol frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BSON error: {0}")]
    Bson(#[from] bson::de::Error),

    #[error("CBOR error: {0}")]
    Cbor(String),

    #[error("PNG error: {0}")]
    Png(#[from] png::DecodingError),

    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("typed array tag {tag}: payload of {len} bytes is not a multiple of {width}")]
    MisalignedTypedArray { tag: u64, len: usize, width: usize },

    #[error("unsupported typed array tag: {0}")]
    UnsupportedTag(u64),
}
