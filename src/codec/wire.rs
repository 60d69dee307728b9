//! Byte layout of column values
//!
//! Follows the CQL native protocol (v4) value encodings: fixed-width
//! big-endian numbers, timestamps as milliseconds since the epoch, UUIDs as
//! their 16 raw bytes, and collections as an `i32` element count followed
//! by `i32`-length-prefixed elements. Null is the absence of bytes and never
//! appears inside a collection.

use chrono::DateTime;
use indexmap::{IndexMap, IndexSet};
use uuid::Uuid;

use crate::model::{is_whole_millis, TypeTag, Value};

/// Encode a value for a column of type `tag`; `None` means null
pub fn encode(value: &Value, tag: &TypeTag) -> Result<Option<Vec<u8>>, String> {
    if value.is_null() {
        return Ok(None);
    }
    let mut out = Vec::new();
    encode_into(value, tag, &mut out)?;
    Ok(Some(out))
}

fn encode_into(value: &Value, tag: &TypeTag, out: &mut Vec<u8>) -> Result<(), String> {
    match (value, tag) {
        (Value::Text(s), TypeTag::Text) => out.extend_from_slice(s.as_bytes()),
        (Value::TinyInt(i), TypeTag::TinyInt) => out.extend_from_slice(&i.to_be_bytes()),
        (Value::SmallInt(i), TypeTag::SmallInt) => out.extend_from_slice(&i.to_be_bytes()),
        (Value::Int(i), TypeTag::Int) => out.extend_from_slice(&i.to_be_bytes()),
        (Value::BigInt(i), TypeTag::BigInt) => out.extend_from_slice(&i.to_be_bytes()),
        (Value::Float(f), TypeTag::Float) => out.extend_from_slice(&f.to_be_bytes()),
        (Value::Double(f), TypeTag::Double) => out.extend_from_slice(&f.to_be_bytes()),
        (Value::Boolean(b), TypeTag::Boolean) => out.push(u8::from(*b)),
        (Value::Timestamp(ts), TypeTag::Timestamp) => {
            if !is_whole_millis(ts) {
                return Err(format!("timestamp {} has sub-millisecond precision", ts.to_rfc3339()));
            }
            out.extend_from_slice(&ts.timestamp_millis().to_be_bytes())
        }
        (Value::Uuid(u), TypeTag::Uuid) => out.extend_from_slice(u.as_bytes()),
        (Value::Blob(b), TypeTag::Blob) => out.extend_from_slice(b),
        (Value::List(items), TypeTag::List(element)) => {
            write_len(items.len(), out)?;
            for item in items {
                encode_element(item, element, out)?;
            }
        }
        (Value::Set(items), TypeTag::Set(element)) => {
            write_len(items.len(), out)?;
            for item in items {
                encode_element(item, element, out)?;
            }
        }
        (Value::Map(entries), TypeTag::Map(key, val)) => {
            write_len(entries.len(), out)?;
            for (k, v) in entries {
                encode_element(k, key, out)?;
                encode_element(v, val, out)?;
            }
        }
        (Value::Null, _) => return Err("null is not allowed inside a collection".into()),
        (other, tag) => {
            return Err(format!("cannot encode a {} value as {}", other.kind(), tag));
        }
    }
    Ok(())
}

fn encode_element(value: &Value, tag: &TypeTag, out: &mut Vec<u8>) -> Result<(), String> {
    let mut element = Vec::new();
    encode_into(value, tag, &mut element)?;
    write_len(element.len(), out)?;
    out.extend_from_slice(&element);
    Ok(())
}

fn write_len(len: usize, out: &mut Vec<u8>) -> Result<(), String> {
    let len = i32::try_from(len).map_err(|_| format!("length {} exceeds i32", len))?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

/// Decode the bytes of a non-null column of type `tag`
pub fn decode(bytes: &[u8], tag: &TypeTag) -> Result<Value, String> {
    let value = match tag {
        TypeTag::Text => Value::Text(
            String::from_utf8(bytes.to_vec()).map_err(|e| format!("invalid utf-8: {}", e))?,
        ),
        TypeTag::TinyInt => Value::TinyInt(i8::from_be_bytes(fixed(bytes)?)),
        TypeTag::SmallInt => Value::SmallInt(i16::from_be_bytes(fixed(bytes)?)),
        TypeTag::Int => Value::Int(i32::from_be_bytes(fixed(bytes)?)),
        TypeTag::BigInt => Value::BigInt(i64::from_be_bytes(fixed(bytes)?)),
        TypeTag::Float => Value::Float(f32::from_be_bytes(fixed(bytes)?)),
        TypeTag::Double => Value::Double(f64::from_be_bytes(fixed(bytes)?)),
        TypeTag::Boolean => {
            let [b] = fixed::<1>(bytes)?;
            Value::Boolean(b != 0)
        }
        TypeTag::Timestamp => {
            let millis = i64::from_be_bytes(fixed(bytes)?);
            let ts = DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| format!("timestamp {} out of range", millis))?;
            Value::Timestamp(ts)
        }
        TypeTag::Uuid => Value::Uuid(Uuid::from_bytes(fixed(bytes)?)),
        TypeTag::Blob => Value::Blob(bytes.to_vec()),
        TypeTag::List(element) => {
            let mut cursor = Cursor::new(bytes);
            let count = cursor.read_len()?;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(decode(cursor.read_element()?, element)?);
            }
            cursor.finish()?;
            Value::List(items)
        }
        TypeTag::Set(element) => {
            let mut cursor = Cursor::new(bytes);
            let count = cursor.read_len()?;
            let mut items = IndexSet::with_capacity(count.min(1024));
            for _ in 0..count {
                items.insert(decode(cursor.read_element()?, element)?);
            }
            cursor.finish()?;
            Value::Set(items)
        }
        TypeTag::Map(key, val) => {
            let mut cursor = Cursor::new(bytes);
            let count = cursor.read_len()?;
            let mut entries = IndexMap::with_capacity(count.min(1024));
            for _ in 0..count {
                let k = decode(cursor.read_element()?, key)?;
                let v = decode(cursor.read_element()?, val)?;
                entries.insert(k, v);
            }
            cursor.finish()?;
            Value::Map(entries)
        }
    };
    Ok(value)
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], String> {
    bytes
        .try_into()
        .map_err(|_| format!("expected {} bytes, found {}", N, bytes.len()))
}

/// Forward-only reader over a collection payload
struct Cursor<'a> {
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn read_len(&mut self) -> Result<usize, String> {
        if self.bytes.len() < 4 {
            return Err("truncated collection length".into());
        }
        let (head, rest) = self.bytes.split_at(4);
        self.bytes = rest;
        let len = i32::from_be_bytes(fixed(head)?);
        usize::try_from(len).map_err(|_| format!("negative length {}", len))
    }

    fn read_element(&mut self) -> Result<&'a [u8], String> {
        let len = self.read_len()?;
        if self.bytes.len() < len {
            return Err(format!(
                "truncated collection element: need {} bytes, have {}",
                len,
                self.bytes.len()
            ));
        }
        let (element, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Ok(element)
    }

    fn finish(self) -> Result<(), String> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(format!("{} trailing bytes after collection", self.bytes.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_int_layout_is_big_endian() {
        let bytes = encode(&Value::Int(470), &TypeTag::Int).unwrap().unwrap();
        assert_eq!(bytes, vec![0, 0, 1, 214]);
    }

    #[test]
    fn test_list_layout() {
        let bytes = encode(&Value::list(["ab"]), &TypeTag::list(TypeTag::Text))
            .unwrap()
            .unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 1, 0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn test_empty_collection_is_not_null() {
        let tag = TypeTag::map(TypeTag::Uuid, TypeTag::Int);
        let bytes = encode(&Value::Map(IndexMap::new()), &tag).unwrap();
        assert_eq!(bytes, Some(vec![0, 0, 0, 0]));
        assert_eq!(decode(&[0, 0, 0, 0], &tag).unwrap(), Value::Map(IndexMap::new()));
    }

    #[test]
    fn test_timestamp_keeps_whole_milliseconds() {
        let millis = Utc.timestamp_millis_opt(1_380_802_049_275).unwrap();
        let bytes = encode(&Value::Timestamp(millis), &TypeTag::Timestamp)
            .unwrap()
            .unwrap();
        assert_eq!(decode(&bytes, &TypeTag::Timestamp).unwrap(), Value::Timestamp(millis));

        let precise = Utc.timestamp_nanos(1_380_802_049_275_000_001);
        let err = encode(&Value::Timestamp(precise), &TypeTag::Timestamp).unwrap_err();
        assert!(err.contains("sub-millisecond"));
        let nested = Value::List(vec![Value::Timestamp(precise)]);
        assert!(encode(&nested, &TypeTag::list(TypeTag::Timestamp)).is_err());
    }

    #[test]
    fn test_null_encodes_to_none() {
        assert_eq!(encode(&Value::Null, &TypeTag::Text).unwrap(), None);
    }

    #[test]
    fn test_mismatch_and_truncation_errors() {
        assert!(encode(&Value::Int(1), &TypeTag::BigInt).is_err());
        assert!(decode(&[0, 1], &TypeTag::Int).is_err());
        assert!(decode(&[0, 0, 0, 2, 0, 0, 0, 1, 7], &TypeTag::list(TypeTag::TinyInt)).is_err());
        assert!(decode(&[0xff, 0xff, 0xff, 0xff], &TypeTag::list(TypeTag::Int)).is_err());
    }
}
