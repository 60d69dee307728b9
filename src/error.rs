//! Error taxonomy shared by the splitter, reader, codec and writer

use std::time::Duration;

use thiserror::Error;

/// Failure reported by a store session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Network hiccup or unavailable replica; worth retrying
    #[error("transient store failure: {0}")]
    Transient(String),
    /// The request did not complete in time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The addressed table does not exist
    #[error("table {keyspace}.{table} does not exist")]
    SchemaMissing { keyspace: String, table: String },
    /// The store refused the request; retrying will not help
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Whether the retry policy applies to this failure
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Timeout(_))
    }
}

/// Errors surfaced to callers of this crate
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration or topology, raised before any I/O
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A page fetch kept failing after all retries
    #[error("partition {partition}: read failed after {attempts} attempt(s): {source}")]
    ReadFailure {
        partition: usize,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// A stored column could not be read as its declared type
    #[error("{}column '{column}' ({type_name}): {reason}", partition_prefix(.partition))]
    Decode {
        partition: Option<usize>,
        column: String,
        type_name: String,
        reason: String,
    },

    /// A value cannot be stored as its declared type
    #[error("{}cannot encode column '{column}' ({type_name}): {reason}", partition_prefix(.partition))]
    Encode {
        partition: Option<usize>,
        column: String,
        type_name: String,
        reason: String,
    },

    /// The table is absent; for writes, creation on write is disabled
    #[error("partition {partition}: table {keyspace}.{table} does not exist")]
    SchemaMissing {
        partition: usize,
        keyspace: String,
        table: String,
    },

    /// A batch flush kept failing after all retries
    #[error("partition {partition}: flush of {rows} row(s) failed after {attempts} attempt(s): {source}")]
    WriteFailure {
        partition: usize,
        rows: usize,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// The writer already failed and refuses further rows
    #[error("partition {partition}: writer is in a failed state")]
    WriterFailed { partition: usize },

    /// A store call failed outside the retried read/write paths
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a decode failure
    pub fn decode(
        column: impl Into<String>,
        type_name: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Error::Decode {
            column: column.into(),
            type_name: type_name.to_string(),
            reason: reason.into(),
            partition: None,
        }
    }

    /// Shorthand for an encode failure
    pub fn encode(
        column: impl Into<String>,
        type_name: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Error::Encode {
            column: column.into(),
            type_name: type_name.to_string(),
            reason: reason.into(),
            partition: None,
        }
    }

    /// Attach the partition a row-level failure happened in
    pub fn in_partition(mut self, index: usize) -> Self {
        if let Error::Decode { partition, .. } | Error::Encode { partition, .. } = &mut self {
            partition.get_or_insert(index);
        }
        self
    }

    /// Partition the failure is confined to, if any
    pub fn partition(&self) -> Option<usize> {
        match self {
            Error::ReadFailure { partition, .. }
            | Error::WriteFailure { partition, .. }
            | Error::SchemaMissing { partition, .. }
            | Error::WriterFailed { partition } => Some(*partition),
            Error::Decode { partition, .. } | Error::Encode { partition, .. } => *partition,
            _ => None,
        }
    }
}

fn partition_prefix(partition: &Option<usize>) -> String {
    match partition {
        Some(index) => format!("partition {}: ", index),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Transient("reset".into()).is_transient());
        assert!(StoreError::Timeout(Duration::from_millis(5)).is_transient());
        assert!(!StoreError::Rejected("syntax".into()).is_transient());
        assert!(!StoreError::SchemaMissing {
            keyspace: "ks".into(),
            table: "t".into()
        }
        .is_transient());
    }

    #[test]
    fn test_partition_context_in_message() {
        let err = Error::WriteFailure {
            partition: 7,
            rows: 3,
            attempts: 2,
            source: StoreError::Transient("reset".into()),
        };
        assert_eq!(err.partition(), Some(7));
        let message = err.to_string();
        assert!(message.contains("partition 7"));
        assert!(message.contains("3 row(s)"));
    }

    #[test]
    fn test_row_errors_pick_up_partition() {
        let err = Error::decode("n", "text", "invalid utf-8");
        assert_eq!(err.partition(), None);
        assert_eq!(err.to_string(), "column 'n' (text): invalid utf-8");

        let err = err.in_partition(3).in_partition(9);
        assert_eq!(err.partition(), Some(3));
        assert_eq!(err.to_string(), "partition 3: column 'n' (text): invalid utf-8");

        let err = Error::encode("ts", "timestamp", "sub-millisecond").in_partition(1);
        assert!(matches!(err, Error::Encode { partition: Some(1), .. }));
        assert!(err.to_string().starts_with("partition 1: cannot encode column 'ts'"));
    }
}
