//! PNG-packed JSON.
//!
//! With `png` compression the bridge serializes a message to JSON, packs the
//! bytes into the pixels of a PNG image and sends
//! `{"op": "png", "data": "<base64 png>"}`. The image's samples, read in scan
//! order, are the JSON text; the last row is padded out with filler bytes.

use crate::error::ProtocolError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use std::io::Cursor;

/// The `op` value marking a PNG-packed message.
pub const PNG_OP: &str = "png";

/// Returns whether a decoded object is a PNG-packed message.
pub fn is_png_packed(value: &Value) -> bool {
    value.get("op").and_then(Value::as_str) == Some(PNG_OP)
}

/// Replaces a PNG-packed message with the message it carries.
///
/// Objects whose `op` is not `png` are returned unchanged.
pub fn inflate(value: Value) -> Result<Value, ProtocolError> {
    if !is_png_packed(&value) {
        return Ok(value);
    }
    let data = value
        .get("data")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingField("data"))?;
    decompress_png(data)
}

/// Decodes a base64 PNG whose pixel bytes are a UTF-8 JSON document.
pub fn decompress_png(data: &str) -> Result<Value, ProtocolError> {
    let png_bytes = STANDARD.decode(data.trim())?;
    let pixels = read_samples(&png_bytes)?;
    let json = trim_padding(&pixels);
    tracing::trace!(
        "Inflated PNG payload: {} base64 chars -> {} JSON bytes",
        data.len(),
        json.len()
    );
    let text = std::str::from_utf8(json).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok(serde_json::from_str(text)?)
}

/// Reads every sample byte of the first frame, in scan order.
fn read_samples(png_bytes: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut decoder = png::Decoder::new(Cursor::new(png_bytes));
    // Palette and sub-byte images expand to plain 8-bit samples.
    decoder.set_transformations(png::Transformations::EXPAND);
    let mut reader = decoder.read_info()?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    buf.truncate(info.buffer_size());
    Ok(buf)
}

fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| !matches!(b, b' ' | b'\n' | b'\r' | b'\t' | 0))
        .map_or(0, |i| i + 1);
    &bytes[..end]
}
