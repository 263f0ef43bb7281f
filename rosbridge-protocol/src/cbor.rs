//! CBOR decoding with typed-array tags.
//!
//! The bridge's `cbor` and `cbor-raw` compression modes send raw binary
//! frames. Numeric arrays travel as a byte string wrapped in a typed-array
//! tag (RFC 8746, little-endian variants only):
//!
//! | Tag | Element |
//! |-----|---------|
//! | 64  | u8      |
//! | 68  | u8 (clamped) |
//! | 69  | u16     |
//! | 70  | u32     |
//! | 71  | u64     |
//! | 72  | i8      |
//! | 77  | i16     |
//! | 78  | i32     |
//! | 79  | i64     |
//! | 85  | f32     |
//! | 86  | f64     |
//!
//! Tags outside this table pass their inner value through unchanged.

use crate::error::ProtocolError;
use ciborium::value::Value as CborValue;
use serde_json::{Map, Number, Value};

pub const TAG_U8: u64 = 64;
pub const TAG_U8_CLAMPED: u64 = 68;
pub const TAG_U16_LE: u64 = 69;
pub const TAG_U32_LE: u64 = 70;
pub const TAG_U64_LE: u64 = 71;
pub const TAG_I8: u64 = 72;
pub const TAG_I16_LE: u64 = 77;
pub const TAG_I32_LE: u64 = 78;
pub const TAG_I64_LE: u64 = 79;
pub const TAG_F32_LE: u64 = 85;
pub const TAG_F64_LE: u64 = 86;

/// A numeric array reconstructed from a typed-array tag.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    U8(Vec<u8>),
    U8Clamped(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! chunks_le {
    ($bytes:expr, $ty:ty) => {
        $bytes
            .chunks_exact(std::mem::size_of::<$ty>())
            .map(|c| {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(c);
                <$ty>::from_le_bytes(buf)
            })
            .collect()
    };
}

impl TypedArray {
    /// Returns the tag this array travels under.
    pub fn tag(&self) -> u64 {
        match self {
            TypedArray::U8(_) => TAG_U8,
            TypedArray::U8Clamped(_) => TAG_U8_CLAMPED,
            TypedArray::U16(_) => TAG_U16_LE,
            TypedArray::U32(_) => TAG_U32_LE,
            TypedArray::U64(_) => TAG_U64_LE,
            TypedArray::I8(_) => TAG_I8,
            TypedArray::I16(_) => TAG_I16_LE,
            TypedArray::I32(_) => TAG_I32_LE,
            TypedArray::I64(_) => TAG_I64_LE,
            TypedArray::F32(_) => TAG_F32_LE,
            TypedArray::F64(_) => TAG_F64_LE,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            TypedArray::U8(v) | TypedArray::U8Clamped(v) => v.len(),
            TypedArray::U16(v) => v.len(),
            TypedArray::U32(v) => v.len(),
            TypedArray::U64(v) => v.len(),
            TypedArray::I8(v) => v.len(),
            TypedArray::I16(v) => v.len(),
            TypedArray::I32(v) => v.len(),
            TypedArray::I64(v) => v.len(),
            TypedArray::F32(v) => v.len(),
            TypedArray::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reconstructs an array from a tag and its little-endian payload.
    ///
    /// Returns `Ok(None)` when the tag is not a typed-array tag.
    pub fn from_tagged(tag: u64, bytes: &[u8]) -> Result<Option<Self>, ProtocolError> {
        let width = match element_width(tag) {
            Some(width) => width,
            None => return Ok(None),
        };
        if bytes.len() % width != 0 {
            return Err(ProtocolError::MisalignedTypedArray {
                tag,
                len: bytes.len(),
                width,
            });
        }

        let array = match tag {
            TAG_U8 => TypedArray::U8(bytes.to_vec()),
            TAG_U8_CLAMPED => TypedArray::U8Clamped(bytes.to_vec()),
            TAG_U16_LE => TypedArray::U16(chunks_le!(bytes, u16)),
            TAG_U32_LE => TypedArray::U32(chunks_le!(bytes, u32)),
            TAG_U64_LE => TypedArray::U64(chunks_le!(bytes, u64)),
            TAG_I8 => TypedArray::I8(bytes.iter().map(|&b| b as i8).collect()),
            TAG_I16_LE => TypedArray::I16(chunks_le!(bytes, i16)),
            TAG_I32_LE => TypedArray::I32(chunks_le!(bytes, i32)),
            TAG_I64_LE => TypedArray::I64(chunks_le!(bytes, i64)),
            TAG_F32_LE => TypedArray::F32(chunks_le!(bytes, f32)),
            TAG_F64_LE => TypedArray::F64(chunks_le!(bytes, f64)),
            other => return Err(ProtocolError::UnsupportedTag(other)),
        };
        Ok(Some(array))
    }

    /// Serializes the elements as a little-endian byte payload.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        fn flat<T, const N: usize>(v: &[T], f: impl Fn(&T) -> [u8; N]) -> Vec<u8> {
            v.iter().flat_map(f).collect()
        }
        match self {
            TypedArray::U8(v) | TypedArray::U8Clamped(v) => v.clone(),
            TypedArray::U16(v) => flat(v, |x| x.to_le_bytes()),
            TypedArray::U32(v) => flat(v, |x| x.to_le_bytes()),
            TypedArray::U64(v) => flat(v, |x| x.to_le_bytes()),
            TypedArray::I8(v) => v.iter().map(|&x| x as u8).collect(),
            TypedArray::I16(v) => flat(v, |x| x.to_le_bytes()),
            TypedArray::I32(v) => flat(v, |x| x.to_le_bytes()),
            TypedArray::I64(v) => flat(v, |x| x.to_le_bytes()),
            TypedArray::F32(v) => flat(v, |x| x.to_le_bytes()),
            TypedArray::F64(v) => flat(v, |x| x.to_le_bytes()),
        }
    }

    /// Converts to a JSON number array. Non-finite floats become `null`.
    pub fn to_json(&self) -> Value {
        fn floats<T: Copy + Into<f64>>(v: &[T]) -> Value {
            Value::Array(
                v.iter()
                    .map(|&x| Number::from_f64(x.into()).map_or(Value::Null, Value::Number))
                    .collect(),
            )
        }
        fn ints<T: Copy + Into<Number>>(v: &[T]) -> Value {
            Value::Array(v.iter().map(|&x| Value::Number(x.into())).collect())
        }
        match self {
            TypedArray::U8(v) | TypedArray::U8Clamped(v) => ints(v),
            TypedArray::U16(v) => ints(v),
            TypedArray::U32(v) => ints(v),
            TypedArray::U64(v) => ints(v),
            TypedArray::I8(v) => ints(v),
            TypedArray::I16(v) => ints(v),
            TypedArray::I32(v) => ints(v),
            TypedArray::I64(v) => ints(v),
            TypedArray::F32(v) => floats(v),
            TypedArray::F64(v) => floats(v),
        }
    }
}

fn element_width(tag: u64) -> Option<usize> {
    match tag {
        TAG_U8 | TAG_U8_CLAMPED | TAG_I8 => Some(1),
        TAG_U16_LE | TAG_I16_LE => Some(2),
        TAG_U32_LE | TAG_I32_LE | TAG_F32_LE => Some(4),
        TAG_U64_LE | TAG_I64_LE | TAG_F64_LE => Some(8),
        _ => None,
    }
}

/// Decodes one CBOR item into the canonical JSON object model.
pub fn decode(bytes: &[u8]) -> Result<Value, ProtocolError> {
    let item: CborValue =
        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Cbor(e.to_string()))?;
    to_json(item)
}

/// Encodes a typed array as a single tagged CBOR item.
pub fn encode_typed_array(array: &TypedArray) -> Result<Vec<u8>, ProtocolError> {
    let item = CborValue::Tag(array.tag(), Box::new(CborValue::Bytes(array.to_le_bytes())));
    let mut out = Vec::new();
    ciborium::ser::into_writer(&item, &mut out).map_err(|e| ProtocolError::Cbor(e.to_string()))?;
    Ok(out)
}

/// Decodes a single tagged CBOR item back into a typed array.
pub fn decode_typed_array(bytes: &[u8]) -> Result<TypedArray, ProtocolError> {
    let item: CborValue =
        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Cbor(e.to_string()))?;
    match item {
        CborValue::Tag(tag, inner) => match *inner {
            CborValue::Bytes(payload) => {
                TypedArray::from_tagged(tag, &payload)?.ok_or(ProtocolError::UnsupportedTag(tag))
            }
            _ => Err(ProtocolError::Cbor(format!(
                "tag {} does not wrap a byte string",
                tag
            ))),
        },
        _ => Err(ProtocolError::Cbor("expected a tagged item".to_string())),
    }
}

fn to_json(item: CborValue) -> Result<Value, ProtocolError> {
    let value = match item {
        CborValue::Null => Value::Null,
        CborValue::Bool(b) => Value::Bool(b),
        CborValue::Integer(i) => integer_to_json(i128::from(i)),
        CborValue::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        CborValue::Text(s) => Value::String(s),
        // Untagged byte strings surface as u8 arrays.
        CborValue::Bytes(b) => TypedArray::U8(b).to_json(),
        CborValue::Array(items) => {
            Value::Array(items.into_iter().map(to_json).collect::<Result<_, _>>()?)
        }
        CborValue::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (k, v) in entries {
                map.insert(map_key(k)?, to_json(v)?);
            }
            Value::Object(map)
        }
        CborValue::Tag(tag, inner) => match *inner {
            CborValue::Bytes(payload) => match TypedArray::from_tagged(tag, &payload)? {
                Some(array) => array.to_json(),
                None => TypedArray::U8(payload).to_json(),
            },
            other => to_json(other)?,
        },
        other => return Err(ProtocolError::Cbor(format!("unsupported item: {:?}", other))),
    };
    Ok(value)
}

fn integer_to_json(i: i128) -> Value {
    if let Ok(v) = i64::try_from(i) {
        Value::Number(v.into())
    } else if let Ok(v) = u64::try_from(i) {
        Value::Number(v.into())
    } else {
        Number::from_f64(i as f64).map_or(Value::Null, Value::Number)
    }
}

fn map_key(key: CborValue) -> Result<String, ProtocolError> {
    match key {
        CborValue::Text(s) => Ok(s),
        CborValue::Integer(i) => Ok(i128::from(i).to_string()),
        CborValue::Bool(b) => Ok(b.to_string()),
        other => Err(ProtocolError::Cbor(format!("unsupported map key: {:?}", other))),
    }
}
