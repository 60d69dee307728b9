//! Batched writes of one partition's rows with create-on-write

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::{EncodedRow, RowShape};
use crate::config::{Config, WriteMode};
use crate::error::{Error, Result, StoreError};
use crate::model::KeyKind;
use crate::retry::{with_retry, Exhausted};
use crate::store::{ColumnDef, Session, Statement, TableSchema};

/// Lifecycle of a [`BatchWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// No rows buffered
    Empty,
    /// Rows buffered, below the batch size
    Filling,
    /// A flush failed; the batch is retained and appends are refused
    Failed,
}

/// What a writer accomplished for its partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub partition: usize,
    pub rows_written: usize,
    pub batches: usize,
    pub table_created: bool,
}

/// Accumulates encoded rows and flushes them as one batch per `batch_size`
pub struct BatchWriter<'a, S: Session + ?Sized> {
    session: &'a S,
    config: &'a Config,
    partition: usize,
    pending: Vec<EncodedRow>,
    state: WriterState,
    summary: WriteSummary,
}

impl<'a, S: Session + ?Sized> BatchWriter<'a, S> {
    pub fn new(session: &'a S, config: &'a Config, partition: usize) -> Self {
        Self {
            session,
            config,
            partition,
            pending: Vec::with_capacity(config.batch_size),
            state: WriterState::Empty,
            summary: WriteSummary {
                partition,
                ..Default::default()
            },
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Rows buffered and not yet flushed
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Buffered rows, including a batch kept after a failed flush
    pub fn pending_rows(&self) -> &[EncodedRow] {
        &self.pending
    }

    pub fn summary(&self) -> WriteSummary {
        self.summary
    }

    /// Buffer one row; returns `true` when this append triggered a flush
    pub fn append<R: RowShape>(&mut self, row: &R) -> Result<bool> {
        if self.state == WriterState::Failed {
            return Err(Error::WriterFailed {
                partition: self.partition,
            });
        }
        let encoded = row.encode().map_err(|e| e.in_partition(self.partition))?;
        self.pending.push(encoded);
        self.state = WriterState::Filling;

        if self.pending.len() >= self.config.batch_size {
            self.flush()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Flush a partial batch; returns `true` when rows were sent
    pub fn drain(&mut self) -> Result<bool> {
        match self.state {
            WriterState::Failed => Err(Error::WriterFailed {
                partition: self.partition,
            }),
            _ if self.pending.is_empty() => Ok(false),
            _ => self.flush().map(|_| true),
        }
    }

    /// Drain and report what was written
    pub fn finish(mut self) -> Result<WriteSummary> {
        self.drain()?;
        debug!(
            partition = self.partition,
            rows = self.summary.rows_written,
            batches = self.summary.batches,
            "writer finished"
        );
        Ok(self.summary)
    }

    fn statements(&self) -> Vec<Statement> {
        self.pending
            .iter()
            .map(|row| {
                let keyspace = self.config.keyspace.clone();
                let table = self.config.table.clone();
                let row = row.clone();
                let has_regular = row.regular_columns().next().is_some();
                match self.config.write_mode {
                    WriteMode::Update if has_regular => Statement::Update {
                        keyspace,
                        table,
                        row,
                    },
                    _ => Statement::Insert {
                        keyspace,
                        table,
                        row,
                    },
                }
            })
            .collect()
    }

    fn send(&self, statements: &[Statement]) -> std::result::Result<(), Exhausted> {
        let timeout = self.config.flush_timeout();
        with_retry(&self.config.write_retry, "batch flush", self.partition, |_| {
            self.session
                .execute_batch(statements, self.config.consistency, timeout)
        })
    }

    fn flush(&mut self) -> Result<()> {
        let rows = self.pending.len();
        let statements = self.statements();

        let mut outcome = self.send(&statements);
        let schema_missing = matches!(
            outcome,
            Err(Exhausted {
                error: StoreError::SchemaMissing { .. },
                ..
            })
        );
        if schema_missing && self.config.create_table_on_write && !self.summary.table_created {
            if let Err(e) = self.create_table() {
                self.state = WriterState::Failed;
                return Err(e);
            }
            outcome = self.send(&statements);
        }

        match outcome {
            Ok(()) => {
                self.summary.rows_written += rows;
                self.summary.batches += 1;
                self.pending.clear();
                self.state = WriterState::Empty;
                debug!(partition = self.partition, rows, "flushed batch");
                Ok(())
            }
            Err(Exhausted {
                error: StoreError::SchemaMissing { keyspace, table },
                ..
            }) => {
                self.state = WriterState::Failed;
                Err(Error::SchemaMissing {
                    partition: self.partition,
                    keyspace,
                    table,
                })
            }
            Err(Exhausted { attempts, error }) => {
                self.state = WriterState::Failed;
                warn!(partition = self.partition, rows, attempts, error = %error, "flush failed");
                Err(Error::WriteFailure {
                    partition: self.partition,
                    rows,
                    attempts,
                    source: error,
                })
            }
        }
    }

    fn create_table(&mut self) -> Result<()> {
        let schema = infer_schema(&self.config.keyspace, &self.config.table, &self.pending)?;
        let statement = Statement::CreateTable(schema);
        let timeout = self.config.flush_timeout();
        with_retry(&self.config.write_retry, "create table", self.partition, |_| {
            self.session.execute(&statement, timeout)
        })
        .map_err(|e| Error::WriteFailure {
            partition: self.partition,
            rows: self.pending.len(),
            attempts: e.attempts,
            source: e.error,
        })?;

        self.summary.table_created = true;
        info!(
            partition = self.partition,
            keyspace = %self.config.keyspace,
            table = %self.config.table,
            "created destination table"
        );
        Ok(())
    }
}

/// Derive a table layout from the columns of a batch
///
/// Columns keep their first-seen order. Without any key column the first
/// column becomes the partition key.
pub fn infer_schema(keyspace: &str, table: &str, rows: &[EncodedRow]) -> Result<TableSchema> {
    let mut columns: Vec<ColumnDef> = Vec::new();
    for column in rows.iter().flat_map(|r| r.columns.iter()) {
        match columns.iter().find(|c| c.name == column.name) {
            Some(existing) if existing.type_tag != column.type_tag => {
                return Err(Error::Configuration(format!(
                    "column '{}' is written as both {} and {}",
                    column.name, existing.type_tag, column.type_tag
                )));
            }
            Some(_) => {}
            None => columns.push(ColumnDef::new(
                column.name.clone(),
                column.type_tag.clone(),
                column.key_kind,
            )),
        }
    }

    if columns.is_empty() {
        return Err(Error::Configuration(
            "cannot infer a table from an empty batch".into(),
        ));
    }
    if !columns.iter().any(|c| c.key_kind.is_key()) {
        columns[0].key_kind = KeyKind::PartitionKey;
    }
    if let Some(c) = columns
        .iter()
        .find(|c| c.key_kind.is_key() && c.type_tag.is_collection())
    {
        return Err(Error::Configuration(format!(
            "key column '{}' cannot be a collection ({})",
            c.name, c.type_tag
        )));
    }
    if !columns.iter().any(|c| c.key_kind == KeyKind::PartitionKey) {
        return Err(Error::Configuration(
            "clustering columns need at least one partition key column".into(),
        ));
    }
    Ok(TableSchema::new(keyspace, table, columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncodedColumn;
    use crate::config::RetryPolicy;
    use crate::model::{Cell, Row, TypeTag};
    use crate::store::MemoryStore;

    fn row(id: i32) -> Row {
        Row::from_cells([
            Cell::partition_key("id", TypeTag::Int, id).unwrap(),
            Cell::new("name", TypeTag::Text, format!("n{}", id)).unwrap(),
        ])
        .unwrap()
    }

    fn config() -> Config {
        Config::new("out", "users")
            .with_batch_size(3)
            .with_write_retry(RetryPolicy::immediate(2))
    }

    #[test]
    fn test_flush_on_batch_size() {
        let store = MemoryStore::single_node("a");
        let config = config().with_create_table_on_write(true);
        let mut writer = BatchWriter::new(&store, &config, 0);

        assert!(!writer.append(&row(1)).unwrap());
        assert!(!writer.append(&row(2)).unwrap());
        assert_eq!(writer.state(), WriterState::Filling);
        assert!(writer.append(&row(3)).unwrap());
        assert_eq!(writer.state(), WriterState::Empty);
        assert!(!writer.append(&row(4)).unwrap());
        assert_eq!(writer.pending(), 1);

        assert!(writer.drain().unwrap());
        let summary = writer.finish().unwrap();
        assert_eq!(summary.rows_written, 4);
        assert_eq!(summary.batches, 2);
        assert!(summary.table_created);
        assert_eq!(store.row_count("out", "users"), 4);
    }

    #[test]
    fn test_schema_missing_without_create() {
        let store = MemoryStore::single_node("a");
        let config = config();
        let mut writer = BatchWriter::new(&store, &config, 2);
        writer.append(&row(1)).unwrap();
        writer.append(&row(2)).unwrap();
        let err = writer.append(&row(3)).unwrap_err();
        assert!(matches!(err, Error::SchemaMissing { partition: 2, .. }));
        assert_eq!(err.partition(), Some(2));
        assert!(err.to_string().starts_with("partition 2: table"));
        assert_eq!(writer.state(), WriterState::Failed);
        assert_eq!(writer.pending(), 3);
        assert!(matches!(
            writer.append(&row(4)),
            Err(Error::WriterFailed { partition: 2 })
        ));
        assert_eq!(store.row_count("out", "users"), 0);
    }

    #[test]
    fn test_write_failure_keeps_batch() {
        let store = MemoryStore::single_node("a");
        store.fail_batches(vec![StoreError::Timeout(std::time::Duration::from_millis(5)); 2]);
        let config = config().with_create_table_on_write(true);
        let mut writer = BatchWriter::new(&store, &config, 5);
        writer.append(&row(1)).unwrap();
        match writer.drain() {
            Err(Error::WriteFailure {
                partition: 5,
                rows: 1,
                attempts: 2,
                ..
            }) => {}
            other => panic!("expected write failure, got {:?}", other),
        }
        assert_eq!(writer.pending_rows().len(), 1);
    }

    #[test]
    fn test_infer_schema_defaults_first_column_as_key() {
        let encoded = EncodedRow::new(vec![
            EncodedColumn {
                name: "url".into(),
                type_tag: TypeTag::Text,
                key_kind: KeyKind::Regular,
                bytes: None,
            },
            EncodedColumn {
                name: "hits".into(),
                type_tag: TypeTag::BigInt,
                key_kind: KeyKind::Regular,
                bytes: None,
            },
        ]);
        let schema = infer_schema("ks", "t", &[encoded]).unwrap();
        assert_eq!(schema.partition_key(), vec!["url"]);
        assert!(infer_schema("ks", "t", &[]).is_err());
    }
}
