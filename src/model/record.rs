//! Static field-to-column bindings for typed records

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

use super::types::{KeyKind, TypeTag};
use super::value::{FromValue, Value};

/// One field of a record bound to one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub field: &'static str,
    pub column: String,
    pub type_tag: TypeTag,
    pub key_kind: KeyKind,
}

/// Ordered bindings of a record kind, built once and shared read-only
#[derive(Debug, Clone)]
pub struct BindingTable {
    bindings: Vec<Binding>,
    by_column: FxHashMap<String, usize>,
    by_field: FxHashMap<&'static str, usize>,
}

impl BindingTable {
    pub fn builder() -> BindingTableBuilder {
        BindingTableBuilder::new()
    }

    /// Bindings in declaration order
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Position of the binding for a column name
    pub fn column_position(&self, column: &str) -> Option<usize> {
        self.by_column.get(column).copied()
    }

    /// Position of the binding for a field name
    pub fn field_position(&self, field: &str) -> Option<usize> {
        self.by_field.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Builder for a [`BindingTable`]
#[derive(Debug, Default)]
pub struct BindingTableBuilder {
    bindings: Vec<Binding>,
}

impl BindingTableBuilder {
    /// Create a new binding builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a field to the column of the same name
    pub fn field(self, field: &'static str, type_tag: TypeTag) -> Self {
        self.bind(field, field, type_tag, KeyKind::Regular)
    }

    /// Bind a field to a differently named column
    pub fn field_as(self, field: &'static str, column: impl Into<String>, type_tag: TypeTag) -> Self {
        self.bind(field, column, type_tag, KeyKind::Regular)
    }

    /// Bind a partition key field
    pub fn partition_key(self, field: &'static str, type_tag: TypeTag) -> Self {
        self.bind(field, field, type_tag, KeyKind::PartitionKey)
    }

    /// Bind a clustering key field
    pub fn clustering_key(self, field: &'static str, type_tag: TypeTag) -> Self {
        self.bind(field, field, type_tag, KeyKind::ClusteringKey)
    }

    pub fn bind(
        mut self,
        field: &'static str,
        column: impl Into<String>,
        type_tag: TypeTag,
        key_kind: KeyKind,
    ) -> Self {
        self.bindings.push(Binding {
            field,
            column: column.into(),
            type_tag,
            key_kind,
        });
        self
    }

    /// Finish the table; fields and columns must be unique
    pub fn build(self) -> Result<BindingTable> {
        if self.bindings.is_empty() {
            return Err(Error::Configuration("binding table has no fields".into()));
        }

        let mut by_column = FxHashMap::default();
        let mut by_field = FxHashMap::default();
        for (i, binding) in self.bindings.iter().enumerate() {
            if by_column.insert(binding.column.clone(), i).is_some() {
                return Err(Error::Configuration(format!(
                    "column '{}' is bound twice",
                    binding.column
                )));
            }
            if by_field.insert(binding.field, i).is_some() {
                return Err(Error::Configuration(format!(
                    "field '{}' is bound twice",
                    binding.field
                )));
            }
        }

        Ok(BindingTable {
            bindings: self.bindings,
            by_column,
            by_field,
        })
    }
}

/// A statically typed row
///
/// Implementors return the same `&'static BindingTable` for every call,
/// usually from a `OnceLock`, so binding lookup never happens per row.
pub trait Record: Sized + Send {
    /// Field-to-column bindings for this record kind
    fn bindings() -> &'static BindingTable;

    /// Build a record from decoded field values
    fn from_fields(fields: &mut FieldValues) -> Result<Self>;

    /// Field values in binding order
    fn to_values(&self) -> Vec<Value>;
}

/// Decoded values of one row, indexed by binding position
#[derive(Debug)]
pub struct FieldValues {
    table: &'static BindingTable,
    values: Vec<Option<Value>>,
}

impl FieldValues {
    /// Empty value slots for every binding in the table
    pub fn new(table: &'static BindingTable) -> Self {
        Self {
            table,
            values: vec![None; table.len()],
        }
    }

    /// Store the value for the binding at `position`
    pub fn put(&mut self, position: usize, value: Value) {
        if let Some(slot) = self.values.get_mut(position) {
            *slot = Some(value);
        }
    }

    /// Take a field value; a column absent from the row reads as null
    pub fn take<T: FromValue>(&mut self, field: &str) -> Result<T> {
        let position = self.table.field_position(field).ok_or_else(|| {
            Error::Configuration(format!("field '{}' has no binding", field))
        })?;
        let binding = &self.table.bindings()[position];
        let value = self.values[position].take().unwrap_or(Value::Null);
        T::from_value(value).map_err(|reason| Error::decode(&binding.column, &binding.type_tag, reason))
    }
}
