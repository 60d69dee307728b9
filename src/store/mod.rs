//! Store session interface and statement shapes
//!
//! The wire client is not part of this crate. Anything that can answer the
//! [`Session`] calls (a native-protocol driver, a proxy, or the bundled
//! [`MemoryStore`]) can back the reader and writer.

mod memory;
mod statement;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::RawRow;
use crate::config::ConsistencyLevel;
use crate::error::StoreError;
use crate::model::{KeyKind, TypeTag};
use crate::ring::RingEntry;

pub use memory::{MemoryStore, StoreStats};
pub use statement::{quote_ident, Resume, SelectQuery, Statement};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Connection to the store, shared read-only by all workers
pub trait Session: Send + Sync {
    /// Token ranges of the keyspace and the replicas owning each
    fn describe_ring(&self, keyspace: &str) -> StoreResult<Vec<RingEntry>>;

    /// Column definitions of a table, `None` when it does not exist
    fn describe_table(&self, keyspace: &str, table: &str) -> StoreResult<Option<TableSchema>>;

    /// Run one bounded page query
    ///
    /// Rows come back in token order, then clustering order within a
    /// partition, starting strictly after `query.resume` and stopping at
    /// `query.limit`.
    fn select(&self, query: &SelectQuery, timeout: Duration) -> StoreResult<Vec<RawRow>>;

    /// Run a single schema statement
    fn execute(&self, statement: &Statement, timeout: Duration) -> StoreResult<()>;

    /// Apply mutation statements as one network operation
    fn execute_batch(
        &self,
        statements: &[Statement],
        consistency: ConsistencyLevel,
        timeout: Duration,
    ) -> StoreResult<()>;
}

/// Column definition within a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub type_tag: TypeTag,
    pub key_kind: KeyKind,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, type_tag: TypeTag, key_kind: KeyKind) -> Self {
        Self {
            name: name.into(),
            type_tag,
            key_kind,
        }
    }
}

/// Table layout as reported by the store or inferred for creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub keyspace: String,
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(keyspace: impl Into<String>, table: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            columns,
        }
    }

    /// Get a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Partition key column names in declaration order
    pub fn partition_key(&self) -> Vec<&str> {
        self.names_of(KeyKind::PartitionKey)
    }

    /// Clustering column names in declaration order
    pub fn clustering_key(&self) -> Vec<&str> {
        self.names_of(KeyKind::ClusteringKey)
    }

    /// Partition key followed by clustering columns
    pub fn primary_key(&self) -> Vec<&str> {
        let mut key = self.partition_key();
        key.extend(self.clustering_key());
        key
    }

    fn names_of(&self, kind: KeyKind) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.key_kind == kind)
            .map(|c| c.name.as_str())
            .collect()
    }
}
