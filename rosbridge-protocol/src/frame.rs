//! Inbound transport frames.
//!
//! A transport delivers discrete frames; the frame kind alone decides which
//! decode stage applies:
//!
//! | Kind     | Payload                        | Stage           |
//! |----------|--------------------------------|-----------------|
//! | `Text`   | UTF-8 JSON                     | JSON            |
//! | `Blob`   | length-prefixed binary document | BSON           |
//! | `Buffer` | raw binary buffer              | CBOR (tagged)   |

use bytes::Bytes;

/// One inbound frame as delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text frame carrying a JSON document.
    Text(String),
    /// Raw binary buffer, decoded as CBOR with typed-array tags.
    Buffer(Bytes),
    /// Binary large object, decoded as a BSON document.
    Blob(Bytes),
}

impl Frame {
    /// Creates a text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text(text.into())
    }

    /// Creates a raw binary buffer frame.
    pub fn buffer(data: impl Into<Bytes>) -> Self {
        Frame::Buffer(data.into())
    }

    /// Creates a binary large object frame.
    pub fn blob(data: impl Into<Bytes>) -> Self {
        Frame::Blob(data.into())
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Buffer(data) | Frame::Blob(data) => data.len(),
        }
    }

    /// Returns whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether this is a binary frame.
    pub fn is_binary(&self) -> bool {
        !matches!(self, Frame::Text(_))
    }

    /// Short name of the frame kind, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Buffer(_) => "buffer",
            Frame::Blob(_) => "blob",
        }
    }
}
