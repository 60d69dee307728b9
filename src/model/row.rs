//! Cell and generic Row structures

use indexmap::IndexMap;

use crate::error::{Error, Result};

use super::types::{KeyKind, TypeTag};
use super::value::Value;

/// One named, typed column value
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    name: String,
    type_tag: TypeTag,
    value: Value,
    key_kind: KeyKind,
}

impl Cell {
    /// Create a regular cell, rejecting values that do not match the type
    pub fn new(name: impl Into<String>, type_tag: TypeTag, value: impl Into<Value>) -> Result<Self> {
        Self::with_key_kind(name, type_tag, value, KeyKind::Regular)
    }

    /// Create a partition key cell
    pub fn partition_key(
        name: impl Into<String>,
        type_tag: TypeTag,
        value: impl Into<Value>,
    ) -> Result<Self> {
        Self::with_key_kind(name, type_tag, value, KeyKind::PartitionKey)
    }

    /// Create a clustering key cell
    pub fn clustering_key(
        name: impl Into<String>,
        type_tag: TypeTag,
        value: impl Into<Value>,
    ) -> Result<Self> {
        Self::with_key_kind(name, type_tag, value, KeyKind::ClusteringKey)
    }

    pub fn with_key_kind(
        name: impl Into<String>,
        type_tag: TypeTag,
        value: impl Into<Value>,
        key_kind: KeyKind,
    ) -> Result<Self> {
        let name = name.into();
        let value = value.into();
        check_value(&name, &type_tag, &value)?;
        Ok(Self {
            name,
            type_tag,
            value,
            key_kind,
        })
    }

    /// Copy of this cell holding a different value
    pub fn with_value(&self, value: impl Into<Value>) -> Result<Self> {
        let value = value.into();
        check_value(&self.name, &self.type_tag, &value)?;
        Ok(Self {
            name: self.name.clone(),
            type_tag: self.type_tag.clone(),
            value,
            key_kind: self.key_kind,
        })
    }

    /// Replace the value in place
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        check_value(&self.name, &self.type_tag, &value)?;
        self.value = value;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn key_kind(&self) -> KeyKind {
        self.key_kind
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

fn check_value(name: &str, tag: &TypeTag, value: &Value) -> Result<()> {
    if value.conforms_to(tag) {
        Ok(())
    } else {
        Err(Error::encode(
            name,
            tag,
            format!("value of kind {} does not match the declared type", value.kind()),
        ))
    }
}

/// A generic row: cells in store column order, addressable by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: IndexMap<String, Cell>,
}

impl Row {
    /// Create a new empty row
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: IndexMap::with_capacity(capacity),
        }
    }

    /// Build a row from cells, rejecting duplicate names
    pub fn from_cells(cells: impl IntoIterator<Item = Cell>) -> Result<Self> {
        let mut row = Row::new();
        for cell in cells {
            row.push(cell)?;
        }
        Ok(row)
    }

    /// Append a cell at the end of the row
    pub fn push(&mut self, cell: Cell) -> Result<()> {
        if self.cells.contains_key(cell.name()) {
            return Err(Error::decode(
                cell.name(),
                cell.type_tag(),
                "duplicate column name in row",
            ));
        }
        self.cells.insert(cell.name.clone(), cell);
        Ok(())
    }

    /// Get a cell by column name
    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.cells.get(name)
    }

    /// Get a cell value by column name
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.cells.get(name).map(Cell::value)
    }

    /// Get a cell by column position
    pub fn cell_at(&self, index: usize) -> Option<&Cell> {
        self.cells.get_index(index).map(|(_, cell)| cell)
    }

    /// Get column position by name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.cells.get_index_of(name)
    }

    /// Replace one cell's value, keeping its type and position
    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        match self.cells.get_mut(name) {
            Some(cell) => cell.set_value(value),
            None => Err(Error::decode(name, "unknown", "no such column in row")),
        }
    }

    /// Iterate cells in column order
    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Column names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    /// Cells marked as partition or clustering keys
    pub fn key_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values().filter(|c| c.key_kind().is_key())
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl IntoIterator for Row {
    type Item = Cell;
    type IntoIter = indexmap::map::IntoValues<String, Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_values()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn sample_row() -> Row {
        Row::from_cells([
            Cell::partition_key("id", TypeTag::Int, 470).unwrap(),
            Cell::new("first_name", TypeTag::Text, "Amalda").unwrap(),
            Cell::new("emails", TypeTag::set(TypeTag::Text), Value::set(["a@x.io"])).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_cell_rejects_mismatched_value() {
        let err = Cell::new("id", TypeTag::Int, "470").unwrap_err();
        assert!(matches!(err, Error::Encode { ref column, .. } if column == "id"));
        assert!(Cell::new("id", TypeTag::Int, Value::Null).is_ok());
    }

    #[test]
    fn test_cell_rejects_sub_millisecond_timestamp() {
        let precise = Utc.timestamp_nanos(1_380_802_049_275_123_456);
        let err = Cell::new("created", TypeTag::Timestamp, precise).unwrap_err();
        assert!(matches!(err, Error::Encode { ref column, .. } if column == "created"));

        let millis = Utc.timestamp_millis_opt(1_380_802_049_275).unwrap();
        let cell = Cell::new("created", TypeTag::Timestamp, millis).unwrap();
        assert_eq!(cell.value(), &Value::Timestamp(millis));
    }

    #[test]
    fn test_row_keeps_column_order() {
        let row = sample_row();
        let names: Vec<_> = row.names().collect();
        assert_eq!(names, vec!["id", "first_name", "emails"]);
        assert_eq!(row.position("emails"), Some(2));
        assert_eq!(row.cell_at(1).map(Cell::name), Some("first_name"));
    }

    #[test]
    fn test_row_rejects_duplicate_names() {
        let mut row = sample_row();
        let dup = Cell::new("id", TypeTag::Int, 1).unwrap();
        assert!(row.push(dup).is_err());
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn test_set_value_checks_type() {
        let mut row = sample_row();
        row.set_value("first_name", "Amalda_out").unwrap();
        assert_eq!(row.value("first_name"), Some(&Value::from("Amalda_out")));
        assert!(row.set_value("first_name", 3).is_err());
        assert!(row.set_value("missing", 3).is_err());
    }

    #[test]
    fn test_key_cells() {
        let row = sample_row();
        let keys: Vec<_> = row.key_cells().map(Cell::name).collect();
        assert_eq!(keys, vec!["id"]);
    }
}
