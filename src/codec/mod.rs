//! Row codec: raw store columns <-> generic rows and typed records

mod wire;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Cell, FieldValues, KeyKind, Record, Row, TypeTag, Value};

pub use wire::{decode as decode_value, encode as encode_value};

/// One column as the store returns it: name, declared type name and bytes
///
/// `key_kind` is the column's role in the table's primary key, filled in
/// from the table schema; it defaults to regular.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,
    pub type_name: String,
    pub bytes: Option<Vec<u8>>,
    #[serde(default)]
    pub key_kind: KeyKind,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, bytes: Option<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            bytes,
            key_kind: KeyKind::Regular,
        }
    }

    pub fn with_key_kind(mut self, key_kind: KeyKind) -> Self {
        self.key_kind = key_kind;
        self
    }

    /// Parse the declared type, failing with the column name attached
    pub fn type_tag(&self) -> Result<TypeTag> {
        self.type_name
            .parse()
            .map_err(|reason: String| Error::decode(&self.name, &self.type_name, reason))
    }
}

/// A row as the store returns it, in column order
pub type RawRow = Vec<RawColumn>;

/// One column ready to be bound into a mutation statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedColumn {
    pub name: String,
    pub type_tag: TypeTag,
    pub key_kind: KeyKind,
    pub bytes: Option<Vec<u8>>,
}

impl EncodedColumn {
    pub fn to_raw(&self) -> RawColumn {
        RawColumn::new(self.name.clone(), self.type_tag.to_string(), self.bytes.clone())
            .with_key_kind(self.key_kind)
    }
}

/// An encoded row awaiting a flush
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedRow {
    pub columns: Vec<EncodedColumn>,
}

impl EncodedRow {
    pub fn new(columns: Vec<EncodedColumn>) -> Self {
        Self { columns }
    }

    /// Columns that are part of the primary key
    pub fn key_columns(&self) -> impl Iterator<Item = &EncodedColumn> {
        self.columns.iter().filter(|c| c.key_kind.is_key())
    }

    /// Columns outside the primary key
    pub fn regular_columns(&self) -> impl Iterator<Item = &EncodedColumn> {
        self.columns.iter().filter(|c| !c.key_kind.is_key())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A row representation the reader can produce and the writer can consume
pub trait RowShape: Sized + Send {
    /// Decode a raw store row
    fn decode(raw: &[RawColumn]) -> Result<Self>;

    /// Encode into columns for a mutation statement
    fn encode(&self) -> Result<EncodedRow>;
}

impl RowShape for Row {
    fn decode(raw: &[RawColumn]) -> Result<Self> {
        decode_row(raw)
    }

    fn encode(&self) -> Result<EncodedRow> {
        encode_row(self)
    }
}

impl<R: Record> RowShape for R {
    fn decode(raw: &[RawColumn]) -> Result<Self> {
        decode_record(raw)
    }

    fn encode(&self) -> Result<EncodedRow> {
        encode_record(self)
    }
}

fn decode_column(column: &RawColumn, tag: &TypeTag) -> Result<Value> {
    match &column.bytes {
        None => Ok(Value::Null),
        Some(bytes) => wire::decode(bytes, tag)
            .map_err(|reason| Error::decode(&column.name, &column.type_name, reason)),
    }
}

/// Decode a raw row into a generic row, keeping the store's column order
/// and each column's key kind
pub fn decode_row(raw: &[RawColumn]) -> Result<Row> {
    let mut row = Row::with_capacity(raw.len());
    for column in raw {
        let tag = column.type_tag()?;
        let value = decode_column(column, &tag)?;
        row.push(Cell::with_key_kind(column.name.clone(), tag, value, column.key_kind)?)?;
    }
    Ok(row)
}

/// Decode a raw row into a typed record through its binding table
///
/// Columns without a binding are ignored; bound columns missing from the
/// row read as null.
pub fn decode_record<R: Record>(raw: &[RawColumn]) -> Result<R> {
    let table = R::bindings();
    let mut fields = FieldValues::new(table);
    for column in raw {
        let Some(position) = table.column_position(&column.name) else {
            continue;
        };
        let binding = &table.bindings()[position];
        let tag = column.type_tag()?;
        if tag != binding.type_tag {
            return Err(Error::decode(
                &column.name,
                &column.type_name,
                format!("column is bound as {}", binding.type_tag),
            ));
        }
        fields.put(position, decode_column(column, &tag)?);
    }
    R::from_fields(&mut fields)
}

/// Encode one cell without touching the rest of its row
pub fn encode_cell(cell: &Cell) -> Result<EncodedColumn> {
    let bytes = wire::encode(cell.value(), cell.type_tag())
        .map_err(|reason| Error::encode(cell.name(), cell.type_tag(), reason))?;
    Ok(EncodedColumn {
        name: cell.name().to_string(),
        type_tag: cell.type_tag().clone(),
        key_kind: cell.key_kind(),
        bytes,
    })
}

/// Encode every cell of a generic row
pub fn encode_row(row: &Row) -> Result<EncodedRow> {
    row.iter()
        .map(encode_cell)
        .collect::<Result<Vec<_>>>()
        .map(EncodedRow::new)
}

/// Encode a typed record in binding order
pub fn encode_record<R: Record>(record: &R) -> Result<EncodedRow> {
    let table = R::bindings();
    let values = record.to_values();
    if values.len() != table.len() {
        return Err(Error::Configuration(format!(
            "record produced {} values for {} bindings",
            values.len(),
            table.len()
        )));
    }

    table
        .bindings()
        .iter()
        .zip(values)
        .map(|(binding, value)| {
            let bytes = wire::encode(&value, &binding.type_tag)
                .map_err(|reason| Error::encode(&binding.column, &binding.type_tag, reason))?;
            Ok(EncodedColumn {
                name: binding.column.clone(),
                type_tag: binding.type_tag.clone(),
                key_kind: binding.key_kind,
                bytes,
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(EncodedRow::new)
}
