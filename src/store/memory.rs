//! In-process store backing tests and dry runs

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::hash::Hasher;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHasher};
use tracing::debug;

use crate::codec::{RawColumn, RawRow};
use crate::config::ConsistencyLevel;
use crate::error::StoreError;
use crate::model::KeyKind;
use crate::ring::{RingEntry, Token, TokenRange, RING_SPAN};

use super::{Resume, SelectQuery, Session, Statement, StoreResult, TableSchema};

/// Call counters exposed for assertions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub selects: usize,
    pub batches: usize,
    pub mutations: usize,
    pub tables_created: usize,
}

type KeyBytes = Vec<Option<Vec<u8>>>;

/// Rows sort by token first, then by the primary key bytes
type RowKey = (Token, KeyBytes);

struct MemTable {
    schema: TableSchema,
    rows: BTreeMap<RowKey, FxHashMap<String, Option<Vec<u8>>>>,
}

impl MemTable {
    fn row_key(&self, values: &FxHashMap<&str, &Option<Vec<u8>>>) -> StoreResult<RowKey> {
        let mut partition = Vec::new();
        let mut key = Vec::new();
        for name in self.schema.primary_key() {
            let bytes = match values.get(name) {
                Some(Some(bytes)) => Some(bytes.clone()),
                _ => {
                    return Err(StoreError::Rejected(format!(
                        "missing value for primary key column '{}'",
                        name
                    )))
                }
            };
            if self.schema.column(name).map(|c| c.key_kind) == Some(KeyKind::PartitionKey) {
                partition.push(bytes.clone());
            }
            key.push(bytes);
        }
        Ok((token_for(&partition), key))
    }

    /// Token of the partition named by the partition key columns in `key`
    fn partition_token(&self, key: &[RawColumn]) -> StoreResult<Token> {
        let partition = self
            .schema
            .partition_key()
            .into_iter()
            .map(|name| match key.iter().find(|c| c.name == name) {
                Some(RawColumn { bytes: Some(bytes), .. }) => Ok(Some(bytes.clone())),
                _ => Err(StoreError::Rejected(format!(
                    "missing value for partition key column '{}'",
                    name
                ))),
            })
            .collect::<StoreResult<KeyBytes>>()?;
        Ok(token_for(&partition))
    }

    fn check_columns<'a>(&self, names: impl Iterator<Item = &'a str>) -> StoreResult<()> {
        for name in names {
            if self.schema.column(name).is_none() {
                return Err(StoreError::Rejected(format!(
                    "undefined column '{}' in {}.{}",
                    name, self.schema.keyspace, self.schema.table
                )));
            }
        }
        Ok(())
    }

    fn project(&self, stored: &FxHashMap<String, Option<Vec<u8>>>, columns: &Option<Vec<String>>) -> RawRow {
        let names: Vec<&str> = match columns {
            Some(cols) => cols.iter().map(String::as_str).collect(),
            None => self.schema.columns.iter().map(|c| c.name.as_str()).collect(),
        };
        names
            .into_iter()
            .filter_map(|name| self.schema.column(name))
            .map(|def| {
                RawColumn::new(
                    def.name.clone(),
                    def.type_tag.to_string(),
                    stored.get(&def.name).cloned().flatten(),
                )
                .with_key_kind(def.key_kind)
            })
            .collect()
    }
}

#[derive(Default)]
struct StoreState {
    tables: FxHashMap<(String, String), MemTable>,
    select_faults: VecDeque<StoreError>,
    batch_faults: VecDeque<StoreError>,
    stats: StoreStats,
}

impl StoreState {
    fn table(&self, keyspace: &str, table: &str) -> StoreResult<&MemTable> {
        self.tables
            .get(&(keyspace.to_string(), table.to_string()))
            .ok_or_else(|| missing(keyspace, table))
    }
}

fn missing(keyspace: &str, table: &str) -> StoreError {
    StoreError::SchemaMissing {
        keyspace: keyspace.to_string(),
        table: table.to_string(),
    }
}

/// Token of a partition key, never `Token::MIN`
pub fn token_for(partition_key: &[Option<Vec<u8>>]) -> Token {
    let mut hasher = FxHasher::default();
    for part in partition_key {
        match part {
            Some(bytes) => {
                hasher.write_u8(1);
                hasher.write(bytes);
            }
            None => hasher.write_u8(0),
        }
    }
    let token = hasher.finish() as i64;
    if token == i64::MIN {
        Token::MAX
    } else {
        Token(token)
    }
}

/// A [`Session`] holding tables in memory with scripted failures
///
/// Mutations are upserts keyed by primary key, matching the store's
/// last-write-wins semantics. A batch is validated in full before any of
/// its rows are applied.
pub struct MemoryStore {
    ring: Vec<RingEntry>,
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new(ring: Vec<RingEntry>) -> Self {
        Self {
            ring,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// One host owning the whole ring
    pub fn single_node(host: &str) -> Self {
        Self::new(vec![RingEntry::new(
            TokenRange::full_ring(),
            vec![host.to_string()],
        )])
    }

    /// `ranges` evenly spaced ranges assigned round-robin to `hosts`
    pub fn evenly_spaced(hosts: &[&str], ranges: usize) -> Self {
        let ranges = ranges.max(1);
        if ranges == 1 || hosts.is_empty() {
            return Self::single_node(hosts.first().copied().unwrap_or("127.0.0.1"));
        }
        let step = RING_SPAN / ranges as u128;
        let boundary = |i: usize| Token::MIN.offset(step * i as u128);
        let ring = (0..ranges)
            .map(|i| {
                let end = if i + 1 == ranges { Token::MIN } else { boundary(i + 1) };
                RingEntry::new(
                    TokenRange::new(boundary(i), end),
                    vec![hosts[i % hosts.len()].to_string()],
                )
            })
            .collect();
        Self::new(ring)
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a table, replacing nothing if it already exists
    pub fn create_table(&self, schema: TableSchema) -> bool {
        let mut state = self.state();
        let key = (schema.keyspace.clone(), schema.table.clone());
        if state.tables.contains_key(&key) {
            return false;
        }
        state.tables.insert(
            key,
            MemTable {
                schema,
                rows: BTreeMap::new(),
            },
        );
        state.stats.tables_created += 1;
        true
    }

    /// Upsert one raw row directly, bypassing batches and faults
    pub fn insert(&self, keyspace: &str, table: &str, row: &[RawColumn]) -> StoreResult<()> {
        let mut state = self.state();
        let mem = state
            .tables
            .get_mut(&(keyspace.to_string(), table.to_string()))
            .ok_or_else(|| missing(keyspace, table))?;
        mem.check_columns(row.iter().map(|c| c.name.as_str()))?;
        let values: FxHashMap<&str, &Option<Vec<u8>>> =
            row.iter().map(|c| (c.name.as_str(), &c.bytes)).collect();
        let key = mem.row_key(&values)?;
        let stored = mem.rows.entry(key).or_default();
        for column in row {
            stored.insert(column.name.clone(), column.bytes.clone());
        }
        Ok(())
    }

    pub fn row_count(&self, keyspace: &str, table: &str) -> usize {
        self.state()
            .table(keyspace, table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    /// All rows of a table in token order, every column included
    pub fn rows(&self, keyspace: &str, table: &str) -> Vec<RawRow> {
        let state = self.state();
        match state.table(keyspace, table) {
            Ok(mem) => mem.rows.values().map(|r| mem.project(r, &None)).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn schema(&self, keyspace: &str, table: &str) -> Option<TableSchema> {
        self.state().table(keyspace, table).ok().map(|t| t.schema.clone())
    }

    /// Fail the next selects with these errors, in order
    pub fn fail_selects(&self, errors: impl IntoIterator<Item = StoreError>) {
        self.state().select_faults.extend(errors);
    }

    /// Fail the next batches with these errors, in order
    pub fn fail_batches(&self, errors: impl IntoIterator<Item = StoreError>) {
        self.state().batch_faults.extend(errors);
    }

    pub fn stats(&self) -> StoreStats {
        self.state().stats
    }
}

impl Session for MemoryStore {
    fn describe_ring(&self, _keyspace: &str) -> StoreResult<Vec<RingEntry>> {
        Ok(self.ring.clone())
    }

    fn describe_table(&self, keyspace: &str, table: &str) -> StoreResult<Option<TableSchema>> {
        Ok(self.schema(keyspace, table))
    }

    fn select(&self, query: &SelectQuery, _timeout: Duration) -> StoreResult<Vec<RawRow>> {
        let mut state = self.state();
        state.stats.selects += 1;
        if let Some(fault) = state.select_faults.pop_front() {
            return Err(fault);
        }

        let mem = state.table(&query.keyspace, &query.table)?;
        if let Some(columns) = &query.columns {
            mem.check_columns(columns.iter().map(String::as_str))?;
        }
        let partition_len = mem.schema.partition_key().len();
        let rows: Vec<RawRow> = match &query.resume {
            Resume::Start => mem
                .rows
                .iter()
                .filter(|(key, _)| query.range.contains(key.0))
                .take(query.limit)
                .map(|(_, stored)| mem.project(stored, &query.columns))
                .collect(),
            Resume::WithinPartition(last) => {
                let values: FxHashMap<&str, &Option<Vec<u8>>> =
                    last.iter().map(|c| (c.name.as_str(), &c.bytes)).collect();
                let after = mem.row_key(&values)?;
                mem.rows
                    .range((Bound::Excluded(after.clone()), Bound::Unbounded))
                    .take_while(|(key, _)| {
                        key.0 == after.0 && key.1[..partition_len] == after.1[..partition_len]
                    })
                    .take(query.limit)
                    .map(|(_, stored)| mem.project(stored, &query.columns))
                    .collect()
            }
            Resume::AfterPartition(last) => {
                let after = mem.partition_token(last)?;
                mem.rows
                    .iter()
                    .filter(|(key, _)| query.range.contains(key.0) && key.0 > after)
                    .take(query.limit)
                    .map(|(_, stored)| mem.project(stored, &query.columns))
                    .collect()
            }
        };
        debug!(range = %query.range, rows = rows.len(), "memory select");
        Ok(rows)
    }

    fn execute(&self, statement: &Statement, timeout: Duration) -> StoreResult<()> {
        match statement {
            Statement::CreateTable(schema) => {
                self.create_table(schema.clone());
                Ok(())
            }
            _ => self.execute_batch(std::slice::from_ref(statement), ConsistencyLevel::One, timeout),
        }
    }

    fn execute_batch(
        &self,
        statements: &[Statement],
        _consistency: ConsistencyLevel,
        _timeout: Duration,
    ) -> StoreResult<()> {
        let mut state = self.state();
        state.stats.batches += 1;
        if let Some(fault) = state.batch_faults.pop_front() {
            return Err(fault);
        }

        let mut applied = Vec::with_capacity(statements.len());
        for statement in statements {
            let (keyspace, table, row) = match statement {
                Statement::Insert {
                    keyspace,
                    table,
                    row,
                }
                | Statement::Update {
                    keyspace,
                    table,
                    row,
                } => (keyspace, table, row),
                Statement::CreateTable(_) => {
                    return Err(StoreError::Rejected(
                        "schema statements cannot be batched".into(),
                    ))
                }
            };
            let mem = state.table(keyspace, table)?;
            mem.check_columns(row.columns.iter().map(|c| c.name.as_str()))?;
            let values: FxHashMap<&str, &Option<Vec<u8>>> = row
                .columns
                .iter()
                .map(|c| (c.name.as_str(), &c.bytes))
                .collect();
            let key = mem.row_key(&values)?;
            applied.push(((keyspace.clone(), table.clone()), key, row));
        }

        let count = applied.len();
        for (table_key, key, row) in applied {
            if let Some(mem) = state.tables.get_mut(&table_key) {
                let stored = mem.rows.entry(key).or_default();
                for column in &row.columns {
                    stored.insert(column.name.clone(), column.bytes.clone());
                }
            }
        }
        state.stats.mutations += count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{EncodedColumn, EncodedRow};
    use crate::model::TypeTag;
    use crate::store::ColumnDef;

    fn schema() -> TableSchema {
        TableSchema::new(
            "ks",
            "t",
            vec![
                ColumnDef::new("id", TypeTag::Int, KeyKind::PartitionKey),
                ColumnDef::new("name", TypeTag::Text, KeyKind::Regular),
            ],
        )
    }

    fn int(v: i32) -> Option<Vec<u8>> {
        Some(v.to_be_bytes().to_vec())
    }

    fn insert(id: i32, name: Option<&str>) -> Statement {
        Statement::Insert {
            keyspace: "ks".into(),
            table: "t".into(),
            row: EncodedRow::new(vec![
                EncodedColumn {
                    name: "id".into(),
                    type_tag: TypeTag::Int,
                    key_kind: KeyKind::PartitionKey,
                    bytes: int(id),
                },
                EncodedColumn {
                    name: "name".into(),
                    type_tag: TypeTag::Text,
                    key_kind: KeyKind::Regular,
                    bytes: name.map(|n| n.as_bytes().to_vec()),
                },
            ]),
        }
    }

    #[test]
    fn test_batch_is_upsert() {
        let store = MemoryStore::single_node("a");
        store.create_table(schema());
        let timeout = Duration::from_secs(1);
        store
            .execute_batch(&[insert(1, Some("x")), insert(2, None)], ConsistencyLevel::One, timeout)
            .unwrap();
        store
            .execute_batch(&[insert(1, Some("y"))], ConsistencyLevel::One, timeout)
            .unwrap();

        assert_eq!(store.row_count("ks", "t"), 2);
        let names: Vec<_> = store
            .rows("ks", "t")
            .into_iter()
            .map(|r| r[1].bytes.clone())
            .collect();
        assert!(names.contains(&Some(b"y".to_vec())));
        assert_eq!(store.stats().batches, 2);
        assert_eq!(store.stats().mutations, 3);
    }

    #[test]
    fn test_missing_table_and_faults() {
        let store = MemoryStore::single_node("a");
        let timeout = Duration::from_secs(1);
        let err = store
            .execute_batch(&[insert(1, None)], ConsistencyLevel::One, timeout)
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaMissing { .. }));

        store.create_table(schema());
        store.fail_batches([StoreError::Transient("reset".into())]);
        assert!(store
            .execute_batch(&[insert(1, None)], ConsistencyLevel::One, timeout)
            .unwrap_err()
            .is_transient());
        assert_eq!(store.row_count("ks", "t"), 0);
    }

    fn visits() -> MemoryStore {
        let store = MemoryStore::single_node("a");
        store.create_table(TableSchema::new(
            "ks",
            "visits",
            vec![
                ColumnDef::new("id", TypeTag::Int, KeyKind::PartitionKey),
                ColumnDef::new("seq", TypeTag::Int, KeyKind::ClusteringKey),
            ],
        ));
        for id in 0..3 {
            for seq in 0..4 {
                store
                    .insert(
                        "ks",
                        "visits",
                        &[RawColumn::new("id", "int", int(id)), RawColumn::new("seq", "int", int(seq))],
                    )
                    .unwrap();
            }
        }
        store
    }

    fn query(resume: Resume, limit: usize) -> SelectQuery {
        SelectQuery {
            keyspace: "ks".into(),
            table: "visits".into(),
            columns: None,
            partition_key: vec!["id".into()],
            key_columns: vec!["id".into(), "seq".into()],
            range: TokenRange::full_ring(),
            resume,
            limit,
            consistency: ConsistencyLevel::One,
        }
    }

    #[test]
    fn test_select_resumes_within_and_after_partition() {
        let store = visits();
        let timeout = Duration::from_secs(1);
        let first = store.select(&query(Resume::Start, 2), timeout).unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|r| r[0].key_kind == KeyKind::PartitionKey));
        assert_eq!(first[1][1].key_kind, KeyKind::ClusteringKey);

        let rest = store
            .select(&query(Resume::WithinPartition(first[1].clone()), 10), timeout)
            .unwrap();
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().all(|r| r[0].bytes == first[0][0].bytes));
        assert_eq!(rest[0][1].bytes, int(2));

        let later = store
            .select(&query(Resume::AfterPartition(vec![first[0][0].clone()]), 10), timeout)
            .unwrap();
        assert_eq!(later.len(), 8);
        assert!(later.iter().all(|r| r[0].bytes != first[0][0].bytes));
    }

    #[test]
    fn test_token_never_min() {
        assert_ne!(token_for(&[int(1)]), Token::MIN);
        assert_eq!(token_for(&[int(7)]), token_for(&[int(7)]));
    }

    #[test]
    fn test_evenly_spaced_ring_tiles() {
        let store = MemoryStore::evenly_spaced(&["a", "b"], 4);
        let ring = store.describe_ring("ks").unwrap();
        assert_eq!(ring.len(), 4);
        let total: u128 = ring.iter().map(|e| e.range.span()).sum();
        assert_eq!(total, RING_SPAN);
        assert_eq!(ring[1].endpoints, vec!["b".to_string()]);
    }
}
