//! Semantic cell values

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHasher;
use uuid::Uuid;

use super::types::TypeTag;

/// A decoded column value
///
/// The variants mirror [`TypeTag`] one to one. Sets and maps keep insertion
/// order, so a decoded collection iterates in the order the store sent it.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Blob(Vec<u8>),
    List(Vec<Value>),
    Set(IndexSet<Value>),
    Map(IndexMap<Value, Value>),
}

/// Float identity used for both equality and hashing; all NaNs collapse
fn f32_key(f: f32) -> u32 {
    if f.is_nan() {
        f32::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

fn f64_key(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::TinyInt(a), Value::TinyInt(b)) => a == b,
            (Value::SmallInt(a), Value::SmallInt(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => f32_key(*a) == f32_key(*b),
            (Value::Double(a), Value::Double(b)) => f64_key(*a) == f64_key(*b),
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Text(s) => s.hash(state),
            Value::TinyInt(i) => i.hash(state),
            Value::SmallInt(i) => i.hash(state),
            Value::Int(i) => i.hash(state),
            Value::BigInt(i) => i.hash(state),
            Value::Float(f) => f32_key(*f).hash(state),
            Value::Double(f) => f64_key(*f).hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Timestamp(ts) => ts.hash(state),
            Value::Uuid(u) => u.hash(state),
            Value::Blob(b) => b.hash(state),
            Value::List(items) => items.hash(state),
            // Set and map equality ignore order, so their hash must too
            Value::Set(items) => {
                items.len().hash(state);
                unordered_hash(items.iter()).hash(state);
            }
            Value::Map(entries) => {
                entries.len().hash(state);
                unordered_hash(entries.iter()).hash(state);
            }
        }
    }
}

/// Whether a timestamp carries no precision below one millisecond
pub fn is_whole_millis(ts: &DateTime<Utc>) -> bool {
    ts.timestamp_subsec_nanos() % 1_000_000 == 0
}

fn unordered_hash<T: Hash>(items: impl Iterator<Item = T>) -> u64 {
    items
        .map(|item| {
            let mut hasher = FxHasher::default();
            item.hash(&mut hasher);
            hasher.finish()
        })
        .fold(0u64, u64::wrapping_add)
}

impl Value {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Build a list value
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a set value; duplicates keep their first position
    pub fn set<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Set(items.into_iter().map(Into::into).collect())
    }

    /// Build a map value
    pub fn map<K: Into<Value>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Whether this value may be stored in a column of the given type
    ///
    /// Null conforms to every type at the top level, but collections may
    /// not contain null elements, keys or values.
    pub fn conforms_to(&self, tag: &TypeTag) -> bool {
        match self {
            Value::Null => true,
            _ => self.conforms_strict(tag),
        }
    }

    fn conforms_strict(&self, tag: &TypeTag) -> bool {
        match (self, tag) {
            (Value::Text(_), TypeTag::Text)
            | (Value::TinyInt(_), TypeTag::TinyInt)
            | (Value::SmallInt(_), TypeTag::SmallInt)
            | (Value::Int(_), TypeTag::Int)
            | (Value::BigInt(_), TypeTag::BigInt)
            | (Value::Float(_), TypeTag::Float)
            | (Value::Double(_), TypeTag::Double)
            | (Value::Boolean(_), TypeTag::Boolean)
            | (Value::Uuid(_), TypeTag::Uuid)
            | (Value::Blob(_), TypeTag::Blob) => true,
            // The store keeps whole milliseconds.
            (Value::Timestamp(ts), TypeTag::Timestamp) => is_whole_millis(ts),
            (Value::List(items), TypeTag::List(element)) => {
                items.iter().all(|v| v.conforms_strict(element))
            }
            (Value::Set(items), TypeTag::Set(element)) => {
                items.iter().all(|v| v.conforms_strict(element))
            }
            (Value::Map(entries), TypeTag::Map(key, value)) => entries
                .iter()
                .all(|(k, v)| k.conforms_strict(key) && v.conforms_strict(value)),
            _ => false,
        }
    }

    /// Short variant name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::TinyInt(_) => "tinyint",
            Value::SmallInt(_) => "smallint",
            Value::Int(_) => "int",
            Value::BigInt(_) => "bigint",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
            Value::Blob(_) => "blob",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Text(s) => write!(f, "{}", s),
            Value::TinyInt(i) => write!(f, "{}", i),
            Value::SmallInt(i) => write!(f, "{}", i),
            Value::Int(i) => write!(f, "{}", i),
            Value::BigInt(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Blob(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::List(items) => write_seq(f, "[", items.iter(), "]"),
            Value::Set(items) => write_seq(f, "{", items.iter(), "}"),
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_seq<'a>(
    f: &mut std::fmt::Formatter<'_>,
    open: &str,
    items: impl Iterator<Item = &'a Value>,
    close: &str,
) -> std::fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_str(close)
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i8> for Value {
    fn from(i: i8) -> Self {
        Value::TinyInt(i)
    }
}

impl From<i16> for Value {
    fn from(i: i16) -> Self {
        Value::SmallInt(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::BigInt(i)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Double(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Conversion from a decoded value into a record field
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, String>;
}

fn mismatch<T>(expected: &str, got: &Value) -> Result<T, String> {
    Err(format!("expected {}, found {}", expected, got.kind()))
}

macro_rules! scalar_from_value {
    ($($ty:ty => $variant:ident, $name:literal;)*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, String> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => mismatch($name, &other),
                    }
                }
            }
        )*
    };
}

scalar_from_value! {
    String => Text, "text";
    i8 => TinyInt, "tinyint";
    i16 => SmallInt, "smallint";
    i32 => Int, "int";
    i64 => BigInt, "bigint";
    f32 => Float, "float";
    f64 => Double, "double";
    bool => Boolean, "boolean";
    DateTime<Utc> => Timestamp, "timestamp";
    Uuid => Uuid, "uuid";
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => mismatch("list", &other),
        }
    }
}

impl<T: FromValue + Hash + Eq> FromValue for IndexSet<T> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Set(items) => items.into_iter().map(T::from_value).collect(),
            other => mismatch("set", &other),
        }
    }
}

impl<K: FromValue + Hash + Eq, V: FromValue> FromValue for IndexMap<K, V> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => mismatch("map", &other),
        }
    }
}
