//! Tagged value codecs.
//!
//! Every payload stored in a vault begins with a one-byte format tag so that
//! multiple encodings can coexist in one table and old rows stay readable
//! after the preferred codec changes. Two encodings are defined:
//!
//! - **Packed** (`TAG_PACKED`): a compact structured binary form covering the
//!   full [`Value`] domain — primitives, byte strings, sequences, mappings.
//! - **JSON** (`TAG_JSON`): a general-purpose object-graph form via
//!   `serde_json`, readable with any JSON tooling. Values JSON cannot carry
//!   (binary payloads, non-text map keys, non-finite floats) fall back to the
//!   packed form at encode time.
//!
//! Decoding always dispatches on the tag, never on the store's preference.
//! An unrecognized tag is a [`VaultError::Format`] error.

use crate::error::VaultError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// Leading tag byte for the packed binary encoding.
pub const TAG_PACKED: u8 = 0x01;
/// Leading tag byte for the JSON encoding.
pub const TAG_JSON: u8 = 0x02;

/// Nesting bound for encode and decode. Beyond this neither codec will
/// represent the value and the caller gets a Format error.
const MAX_DEPTH: usize = 128;

// Wire type bytes inside a packed payload.
const P_NULL: u8 = 0x00;
const P_FALSE: u8 = 0x01;
const P_TRUE: u8 = 0x02;
const P_INT: u8 = 0x03;
const P_FLOAT: u8 = 0x04;
const P_TEXT: u8 = 0x05;
const P_BYTES: u8 = 0x06;
const P_LIST: u8 = 0x07;
const P_MAP: u8 = 0x08;

/// The value model stored in a vault.
///
/// Keys and values are both `Value`s; keys are compared by their canonical
/// packed encoding, so two keys are the same entry exactly when they encode
/// to the same bytes. Tuple and array inputs normalize to [`Value::List`]
/// through the `From` impls — a tuple put in does not come back as a tuple,
/// and a tuple key collides with the equivalent list key. That normalization
/// is deliberate and documented, not an accident to be fixed.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Ordered key/value pairs. Both codecs preserve insertion order; the
    /// JSON codec additionally requires text keys.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Builds a `Bytes` value from anything convertible to a byte vector.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(bytes.into())
    }

    /// Builds a `Map` from an iterator of convertible pairs, preserving order.
    pub fn map<K, V, I>(pairs: I) -> Value
    where
        K: Into<Value>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Converts any `Serialize` type into a `Value` through its JSON shape.
    ///
    /// This is the bridge for custom types: structs become maps, enums take
    /// their serde representation. Types that serialize to something JSON
    /// cannot express (for example maps with non-string keys) are rejected
    /// with a Format error.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Value, VaultError> {
        let json = serde_json::to_value(value).map_err(|e| VaultError::Format(e.to_string()))?;
        Ok(from_json(json))
    }

    /// Converts this value back into a `Deserialize` type through JSON.
    pub fn into_deserialize<T: DeserializeOwned>(self) -> Result<T, VaultError> {
        let json = to_json(&self)
            .ok_or_else(|| VaultError::Format("value has no JSON representation".to_string()))?;
        serde_json::from_value(json).map_err(|e| VaultError::Format(e.to_string()))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(pairs) => Some(pairs),
            _ => None,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Value {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Int(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Value {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Float(x)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Value {
        Value::Float(x.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Text(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Value {
        Value::Bytes(b.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Value {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Value {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(items: [T; N]) -> Value {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

// Tuples normalize to List; see the type-level docs for the key-collision
// consequence of that.
impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Value {
    fn from((a, b): (A, B)) -> Value {
        Value::List(vec![a.into(), b.into()])
    }
}

impl<A: Into<Value>, B: Into<Value>, C: Into<Value>> From<(A, B, C)> for Value {
    fn from((a, b, c): (A, B, C)) -> Value {
        Value::List(vec![a.into(), b.into(), c.into()])
    }
}

impl<A: Into<Value>, B: Into<Value>, C: Into<Value>, D: Into<Value>> From<(A, B, C, D)> for Value {
    fn from((a, b, c, d): (A, B, C, D)) -> Value {
        Value::List(vec![a.into(), b.into(), c.into(), d.into()])
    }
}

/// Per-vault codec preference for newly written values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    /// Compact structured binary; handles every `Value`. The default.
    #[default]
    Packed,
    /// JSON object-graph payloads, readable by external tooling. Values
    /// without a JSON representation fall back to the packed form.
    Json,
}

impl Codec {
    /// Encodes a value under this codec's preferred tag.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, VaultError> {
        match self {
            Codec::Packed => encode_packed(value),
            Codec::Json => match to_json(value) {
                Some(json) => {
                    let body =
                        serde_json::to_vec(&json).map_err(|e| VaultError::Format(e.to_string()))?;
                    let mut out = Vec::with_capacity(1 + body.len());
                    out.push(TAG_JSON);
                    out.extend_from_slice(&body);
                    Ok(out)
                }
                None => encode_packed(value),
            },
        }
    }
}

/// Canonical key encoding. Always packed, independent of the vault's value
/// codec, so a key resolves to the same row however the vault was opened.
pub fn encode_key(key: &Value) -> Result<Vec<u8>, VaultError> {
    encode_packed(key)
}

/// Decodes a tagged payload, dispatching on its leading tag byte.
pub fn decode(bytes: &[u8]) -> Result<Value, VaultError> {
    match bytes.split_first() {
        Some((&TAG_PACKED, body)) => decode_packed(body),
        Some((&TAG_JSON, body)) => {
            let json: JsonValue =
                serde_json::from_slice(body).map_err(|e| VaultError::Format(e.to_string()))?;
            Ok(from_json(json))
        }
        Some((&tag, _)) => Err(VaultError::Format(format!(
            "unknown payload tag 0x{tag:02x}"
        ))),
        None => Err(VaultError::Format("empty payload".to_string())),
    }
}

fn encode_packed(value: &Value) -> Result<Vec<u8>, VaultError> {
    let mut out = vec![TAG_PACKED];
    pack_into(value, &mut out, 0)?;
    Ok(out)
}

fn pack_into(value: &Value, out: &mut Vec<u8>, depth: usize) -> Result<(), VaultError> {
    if depth > MAX_DEPTH {
        return Err(VaultError::Format(format!(
            "value nesting exceeds {MAX_DEPTH} levels"
        )));
    }
    match value {
        Value::Null => out.push(P_NULL),
        Value::Bool(false) => out.push(P_FALSE),
        Value::Bool(true) => out.push(P_TRUE),
        Value::Int(n) => {
            out.push(P_INT);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Value::Float(x) => {
            out.push(P_FLOAT);
            out.extend_from_slice(&x.to_bits().to_be_bytes());
        }
        Value::Text(s) => {
            out.push(P_TEXT);
            pack_len(s.len(), out)?;
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            out.push(P_BYTES);
            pack_len(b.len(), out)?;
            out.extend_from_slice(b);
        }
        Value::List(items) => {
            out.push(P_LIST);
            pack_len(items.len(), out)?;
            for item in items {
                pack_into(item, out, depth + 1)?;
            }
        }
        Value::Map(pairs) => {
            out.push(P_MAP);
            pack_len(pairs.len(), out)?;
            for (k, v) in pairs {
                pack_into(k, out, depth + 1)?;
                pack_into(v, out, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn pack_len(len: usize, out: &mut Vec<u8>) -> Result<(), VaultError> {
    let n = u32::try_from(len)
        .map_err(|_| VaultError::Format("length overflows the wire format".to_string()))?;
    out.extend_from_slice(&n.to_be_bytes());
    Ok(())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, VaultError> {
        let b = self
            .buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| VaultError::Format("truncated packed payload".to_string()))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], VaultError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| VaultError::Format("truncated packed payload".to_string()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn len32(&mut self) -> Result<usize, VaultError> {
        let raw = self.take(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(raw);
        Ok(u32::from_be_bytes(buf) as usize)
    }
}

fn decode_packed(body: &[u8]) -> Result<Value, VaultError> {
    let mut reader = Reader { buf: body, pos: 0 };
    let value = unpack(&mut reader, 0)?;
    if reader.pos != reader.buf.len() {
        return Err(VaultError::Format(
            "trailing bytes after packed value".to_string(),
        ));
    }
    Ok(value)
}

fn unpack(reader: &mut Reader<'_>, depth: usize) -> Result<Value, VaultError> {
    if depth > MAX_DEPTH {
        return Err(VaultError::Format(format!(
            "value nesting exceeds {MAX_DEPTH} levels"
        )));
    }
    match reader.byte()? {
        P_NULL => Ok(Value::Null),
        P_FALSE => Ok(Value::Bool(false)),
        P_TRUE => Ok(Value::Bool(true)),
        P_INT => {
            let raw = reader.take(8)?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(raw);
            Ok(Value::Int(i64::from_be_bytes(buf)))
        }
        P_FLOAT => {
            let raw = reader.take(8)?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(raw);
            Ok(Value::Float(f64::from_bits(u64::from_be_bytes(buf))))
        }
        P_TEXT => {
            let len = reader.len32()?;
            let raw = reader.take(len)?;
            let text = std::str::from_utf8(raw)
                .map_err(|e| VaultError::Format(format!("invalid UTF-8 in text value: {e}")))?;
            Ok(Value::Text(text.to_string()))
        }
        P_BYTES => {
            let len = reader.len32()?;
            Ok(Value::Bytes(reader.take(len)?.to_vec()))
        }
        P_LIST => {
            let count = reader.len32()?;
            let mut items = Vec::new();
            for _ in 0..count {
                items.push(unpack(reader, depth + 1)?);
            }
            Ok(Value::List(items))
        }
        P_MAP => {
            let count = reader.len32()?;
            let mut pairs = Vec::new();
            for _ in 0..count {
                let k = unpack(reader, depth + 1)?;
                let v = unpack(reader, depth + 1)?;
                pairs.push((k, v));
            }
            Ok(Value::Map(pairs))
        }
        other => Err(VaultError::Format(format!(
            "unknown packed type byte 0x{other:02x}"
        ))),
    }
}

/// Maps a `Value` onto a JSON value, or `None` when JSON cannot carry it
/// (bytes, non-text map keys, non-finite floats).
fn to_json(value: &Value) -> Option<JsonValue> {
    match value {
        Value::Null => Some(JsonValue::Null),
        Value::Bool(b) => Some(JsonValue::Bool(*b)),
        Value::Int(n) => Some(JsonValue::from(*n)),
        Value::Float(x) => serde_json::Number::from_f64(*x).map(JsonValue::Number),
        Value::Text(s) => Some(JsonValue::String(s.clone())),
        Value::Bytes(_) => None,
        Value::List(items) => items
            .iter()
            .map(to_json)
            .collect::<Option<Vec<_>>>()
            .map(JsonValue::Array),
        Value::Map(pairs) => {
            let mut obj = serde_json::Map::with_capacity(pairs.len());
            for (k, v) in pairs {
                let Value::Text(key) = k else {
                    return None;
                };
                obj.insert(key.clone(), to_json(v)?);
            }
            Some(JsonValue::Object(obj))
        }
    }
}

fn from_json(json: JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::Text(s),
        JsonValue::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        JsonValue::Object(obj) => Value::Map(
            obj.into_iter()
                .map(|(k, v)| (Value::Text(k), from_json(v)))
                .collect(),
        ),
    }
}
