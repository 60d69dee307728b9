//! Worker-facing entry point: plan partitions, read them, write them

use rayon::prelude::*;
use tracing::{info, warn};

use crate::codec::RowShape;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::Row;
use crate::reader::{PagingReader, PartitionRows};
use crate::ring::{Partition, TokenRangeSplitter};
use crate::store::Session;
use crate::writer::{BatchWriter, WriteSummary};

/// A read or write job over one table, shared by reference among workers
pub struct Job<'a, S: Session + ?Sized> {
    session: &'a S,
    config: &'a Config,
}

impl<'a, S: Session + ?Sized> Job<'a, S> {
    /// Validate the configuration before any store call
    pub fn new(session: &'a S, config: &'a Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { session, config })
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    /// Split the keyspace's ring into work units
    pub fn list_partitions(&self) -> Result<Vec<Partition>> {
        let topology = self.session.describe_ring(&self.config.keyspace)?;
        let partitions = TokenRangeSplitter::new(self.config.split_target).split(&topology)?;
        info!(
            keyspace = %self.config.keyspace,
            table = %self.config.table,
            partitions = partitions.len(),
            "planned partitions"
        );
        Ok(partitions)
    }

    /// Raw cursor over one partition
    pub fn raw_reader(&self, partition: &Partition) -> Result<PagingReader<'a, S>> {
        PagingReader::open(self.session, self.config, partition)
    }

    /// Lazy decoded rows of one partition
    pub fn read_partition<R: RowShape>(
        &self,
        partition: &Partition,
    ) -> Result<PartitionRows<'a, S, R>> {
        let reader = self.raw_reader(partition)?;
        Ok(PartitionRows::new(reader, self.config.decode_policy))
    }

    /// Write rows attributed to one partition, draining at the end
    pub fn write_partition<R, I>(&self, partition: &Partition, rows: I) -> Result<WriteSummary>
    where
        R: RowShape,
        I: IntoIterator<Item = R>,
    {
        let mut writer = BatchWriter::new(self.session, self.config, partition.index);
        for row in rows {
            writer.append(&row)?;
        }
        let summary = writer.finish()?;
        info!(
            partition = partition.index,
            rows = summary.rows_written,
            batches = summary.batches,
            "partition written"
        );
        Ok(summary)
    }

    /// Consume every partition in parallel, one result per partition
    pub fn read_all<R, T, F>(&self, partitions: &[Partition], consume: F) -> Vec<Result<T>>
    where
        R: RowShape,
        T: Send,
        F: Fn(&Partition, PartitionRows<'a, S, R>) -> Result<T> + Sync + Send,
    {
        partitions
            .par_iter()
            .map(|partition| {
                let result = self
                    .read_partition(partition)
                    .and_then(|rows| consume(partition, rows));
                log_outcome(partition, "read", &result);
                result
            })
            .collect()
    }

    /// Write every partition in parallel, one result per partition
    pub fn write_all<R, I, F>(&self, partitions: &[Partition], rows_for: F) -> Vec<Result<WriteSummary>>
    where
        R: RowShape,
        I: IntoIterator<Item = R>,
        F: Fn(&Partition) -> I + Sync + Send,
    {
        partitions
            .par_iter()
            .map(|partition| {
                let result = self.write_partition(partition, rows_for(partition));
                log_outcome(partition, "write", &result);
                result
            })
            .collect()
    }

    /// Stream every partition of this job into `dest`, row by row
    ///
    /// Rows flushed before a failure stay written.
    pub fn copy_to<D: Session + ?Sized>(
        &self,
        dest: &Job<'_, D>,
        partitions: &[Partition],
    ) -> Vec<Result<WriteSummary>> {
        partitions
            .par_iter()
            .map(|partition| {
                let result = self.copy_partition(dest, partition);
                log_outcome(partition, "copy", &result);
                result
            })
            .collect()
    }

    fn copy_partition<D: Session + ?Sized>(
        &self,
        dest: &Job<'_, D>,
        partition: &Partition,
    ) -> Result<WriteSummary> {
        let rows = self.read_partition::<Row>(partition)?;
        let mut writer = BatchWriter::new(dest.session, dest.config, partition.index);
        for row in rows {
            writer.append(&row?)?;
        }
        writer.finish()
    }
}

fn log_outcome<T>(partition: &Partition, what: &str, result: &Result<T>) {
    if let Err(e) = result {
        warn!(partition = partition.index, error = %e, "partition {} failed", what);
    }
}

/// Split per-partition results into successes and the failures
pub fn partition_results<T>(results: Vec<Result<T>>) -> (Vec<T>, Vec<Error>) {
    let mut ok = Vec::new();
    let mut failed = Vec::new();
    for result in results {
        match result {
            Ok(value) => ok.push(value),
            Err(e) => failed.push(e),
        }
    }
    (ok, failed)
}
