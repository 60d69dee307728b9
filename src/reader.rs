//! Paged, forward-only reads over one partition's token range

use std::collections::VecDeque;
use std::marker::PhantomData;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::codec::{RawColumn, RawRow, RowShape};
use crate::config::{Config, DecodePolicy};
use crate::error::{Error, Result};
use crate::model::KeyKind;
use crate::retry::with_retry;
use crate::ring::{Partition, TokenRange};
use crate::store::{Resume, SelectQuery, Session};

/// Lazy cursor over the raw rows of one partition
///
/// Each page is a query bounded by the segment's token range and, after the
/// first page, by the key of the last row seen. With clustering columns a
/// full page continues inside the last row's partition; once that partition
/// runs short the scan moves on to the following tokens. A short page
/// outside a partition ends the segment. Wrapping ranges are read as two
/// segments.
pub struct PagingReader<'a, S: Session + ?Sized> {
    session: &'a S,
    config: &'a Config,
    partition: usize,
    template: SelectQuery,
    segments: VecDeque<TokenRange>,
    current: Option<TokenRange>,
    /// Columns added to the projection only to page by key
    hidden: Vec<String>,
    key_kinds: FxHashMap<String, KeyKind>,
    page: std::vec::IntoIter<RawRow>,
    segment_done: bool,
    finished: bool,
    pages_fetched: usize,
    rows_read: usize,
}

impl<'a, S: Session + ?Sized> PagingReader<'a, S> {
    /// Open a cursor on `partition`; no page is fetched until the first `next`
    pub fn open(session: &'a S, config: &'a Config, partition: &Partition) -> Result<Self> {
        let schema = with_retry(&config.read_retry, "describe table", partition.index, |_| {
            session.describe_table(&config.keyspace, &config.table)
        })
        .map_err(|e| Error::ReadFailure {
            partition: partition.index,
            attempts: e.attempts,
            source: e.error,
        })?
        .ok_or_else(|| Error::SchemaMissing {
            partition: partition.index,
            keyspace: config.keyspace.clone(),
            table: config.table.clone(),
        })?;

        let partition_key: Vec<String> =
            schema.partition_key().into_iter().map(String::from).collect();
        let key_columns: Vec<String> =
            schema.primary_key().into_iter().map(String::from).collect();
        if partition_key.is_empty() {
            return Err(Error::Configuration(format!(
                "table {}.{} reports no partition key",
                config.keyspace, config.table
            )));
        }

        let key_kinds: FxHashMap<String, KeyKind> = schema
            .columns
            .iter()
            .filter(|c| c.key_kind.is_key())
            .map(|c| (c.name.clone(), c.key_kind))
            .collect();

        let mut template = SelectQuery::new(config, partition_key, key_columns, partition.range);
        let mut hidden = Vec::new();
        if let Some(projection) = template.columns.as_mut() {
            for key in &template.key_columns {
                if !projection.contains(key) {
                    projection.push(key.clone());
                    hidden.push(key.clone());
                }
            }
        }

        debug!(
            partition = partition.index,
            range = %partition.range,
            page_size = config.page_size,
            "opening partition cursor"
        );
        Ok(Self {
            session,
            config,
            partition: partition.index,
            template,
            segments: partition.range.non_wrapping().into(),
            current: None,
            hidden,
            key_kinds,
            page: Vec::new().into_iter(),
            segment_done: true,
            finished: false,
            pages_fetched: 0,
            rows_read: 0,
        })
    }

    pub fn partition_index(&self) -> usize {
        self.partition
    }

    /// Number of page queries that returned rows or ended a segment
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    /// Query of the next page; the range is the current segment once reading starts
    pub fn query(&self) -> &SelectQuery {
        &self.template
    }

    fn fetch_page(&mut self, range: TokenRange) -> Result<()> {
        let mut query = self.template.clone();
        query.range = range;
        let session = self.session;
        let timeout = self.config.page_timeout();
        let rows = with_retry(&self.config.read_retry, "page fetch", self.partition, |_| {
            session.select(&query, timeout)
        })
        .map_err(|e| Error::ReadFailure {
            partition: self.partition,
            attempts: e.attempts,
            source: e.error,
        })?;

        self.pages_fetched += 1;
        let full = rows.len() >= self.config.page_size;
        let last_key = match rows.last() {
            Some(last) => Some(self.key_of(last)),
            None => match &self.template.resume {
                Resume::WithinPartition(key) => Some(key.clone()),
                _ => None,
            },
        };
        let within = matches!(self.template.resume, Resume::WithinPartition(_));
        self.segment_done = false;
        self.template.resume = match last_key {
            Some(key) if full && !self.template.clustering_columns().is_empty() => {
                Resume::WithinPartition(key)
            }
            Some(key) if full || within => Resume::AfterPartition(self.partition_key_of(&key)),
            _ => {
                self.segment_done = true;
                Resume::Start
            }
        };
        debug!(
            partition = self.partition,
            rows = rows.len(),
            page = self.pages_fetched,
            "fetched page"
        );
        self.page = rows.into_iter();
        Ok(())
    }

    fn key_of(&self, row: &[RawColumn]) -> Vec<RawColumn> {
        self.template
            .key_columns
            .iter()
            .filter_map(|name| row.iter().find(|c| &c.name == name).cloned())
            .collect()
    }

    fn partition_key_of(&self, key: &[RawColumn]) -> Vec<RawColumn> {
        key.iter()
            .filter(|c| self.template.partition_key.contains(&c.name))
            .cloned()
            .collect()
    }

    /// Drop paging-only columns and mark key columns with their key kind
    fn finish_row(&self, mut row: RawRow) -> RawRow {
        if !self.hidden.is_empty() {
            row.retain(|c| !self.hidden.contains(&c.name));
        }
        for column in &mut row {
            if let Some(kind) = self.key_kinds.get(&column.name) {
                column.key_kind = *kind;
            }
        }
        row
    }
}

impl<S: Session + ?Sized> Iterator for PagingReader<'_, S> {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(row) = self.page.next() {
                self.rows_read += 1;
                return Some(Ok(self.finish_row(row)));
            }
            if self.segment_done {
                match self.segments.pop_front() {
                    Some(range) => {
                        self.current = Some(range);
                        self.template.range = range;
                        self.template.resume = Resume::Start;
                    }
                    None => {
                        self.finished = true;
                        debug!(
                            partition = self.partition,
                            rows = self.rows_read,
                            pages = self.pages_fetched,
                            "partition read complete"
                        );
                        return None;
                    }
                }
            }
            let Some(range) = self.current else {
                self.finished = true;
                return None;
            };
            if let Err(e) = self.fetch_page(range) {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}

impl<S: Session + ?Sized> Drop for PagingReader<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                partition = self.partition,
                rows = self.rows_read,
                "cursor closed before end of partition"
            );
        }
    }
}

/// Decoded rows of one partition, honoring the configured decode policy
pub struct PartitionRows<'a, S: Session + ?Sized, R> {
    reader: PagingReader<'a, S>,
    policy: DecodePolicy,
    skipped: usize,
    failed: bool,
    _shape: PhantomData<fn() -> R>,
}

impl<'a, S: Session + ?Sized, R: RowShape> PartitionRows<'a, S, R> {
    pub fn new(reader: PagingReader<'a, S>, policy: DecodePolicy) -> Self {
        Self {
            reader,
            policy,
            skipped: 0,
            failed: false,
            _shape: PhantomData,
        }
    }

    /// Rows dropped under `DecodePolicy::SkipRow`
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn reader(&self) -> &PagingReader<'a, S> {
        &self.reader
    }
}

impl<S: Session + ?Sized, R: RowShape> Iterator for PartitionRows<'_, S, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let raw = match self.reader.next()? {
                Ok(raw) => raw,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            let partition = self.reader.partition_index();
            match R::decode(&raw).map_err(|e| e.in_partition(partition)) {
                Ok(row) => return Some(Ok(row)),
                Err(e) if self.policy == DecodePolicy::SkipRow => {
                    self.skipped += 1;
                    warn!(partition, error = %e, "skipping undecodable row");
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
