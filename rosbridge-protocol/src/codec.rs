//! Encoder and decoder for rosbridge frames and messages.

use crate::cbor;
use crate::compression;
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::message::Message;
use bson::Bson;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Encodes outbound messages. The protocol is asymmetric: outbound is always
/// JSON text.
pub struct Encoder;

impl Encoder {
    /// Encodes a message as JSON text.
    pub fn encode(message: &Message) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(message)?)
    }

    /// Encodes any JSON-serializable value as JSON text.
    pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(value)?)
    }
}

/// A decode strategy that replaces the built-in pipeline entirely.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Result<Message, ProtocolError>;
}

impl<F> FrameDecoder for F
where
    F: Fn(&Frame) -> Result<Message, ProtocolError> + Send + Sync,
{
    fn decode(&self, frame: &Frame) -> Result<Message, ProtocolError> {
        self(frame)
    }
}

/// Decodes inbound frames into canonical messages.
///
/// Stages, in order of precedence:
/// 1. an injected [`FrameDecoder`], if any, handles the frame alone;
/// 2. [`Frame::Blob`] is decoded as a BSON document;
/// 3. [`Frame::Buffer`] is decoded as CBOR with typed-array tags;
/// 4. [`Frame::Text`] is parsed as JSON.
///
/// Objects from stages 2 and 4 then pass through the PNG inflate stage.
#[derive(Clone, Default)]
pub struct Decoder {
    custom: Option<Arc<dyn FrameDecoder>>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder that delegates every frame to `custom`.
    pub fn with_custom(custom: Arc<dyn FrameDecoder>) -> Self {
        Self {
            custom: Some(custom),
        }
    }

    /// Returns whether a custom strategy is installed.
    pub fn is_custom(&self) -> bool {
        self.custom.is_some()
    }

    /// Decodes one frame into a canonical message.
    pub fn decode(&self, frame: &Frame) -> Result<Message, ProtocolError> {
        if let Some(custom) = &self.custom {
            return custom.decode(frame);
        }
        let value = self.decode_value(frame)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Decodes one frame into the canonical JSON object, before typing.
    pub fn decode_value(&self, frame: &Frame) -> Result<Value, ProtocolError> {
        match frame {
            Frame::Blob(data) => compression::inflate(decode_bson(data)?),
            Frame::Buffer(data) => cbor::decode(data),
            Frame::Text(text) => compression::inflate(serde_json::from_str(text)?),
        }
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// Decodes a length-prefixed BSON document into the canonical JSON object.
///
/// Binary fields become u8 arrays, as untagged CBOR byte strings do. Other
/// BSON-only types use relaxed extended JSON.
pub fn decode_bson(data: &[u8]) -> Result<Value, ProtocolError> {
    let document = bson::Document::from_reader(data)?;
    Ok(bson_to_json(Bson::Document(document)))
}

fn bson_to_json(item: Bson) -> Value {
    match item {
        Bson::Document(document) => Value::Object(
            document
                .into_iter()
                .map(|(k, v)| (k, bson_to_json(v)))
                .collect::<Map<_, _>>(),
        ),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Binary(binary) => cbor::TypedArray::U8(binary.bytes).to_json(),
        other => other.into_relaxed_extjson(),
    }
}
