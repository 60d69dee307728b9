//! Configuration handling for ringbridge

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Consistency level attached to every read and write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyLevel {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    #[default]
    LocalOne,
}

impl std::str::FromStr for ConsistencyLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ANY" => Ok(ConsistencyLevel::Any),
            "ONE" => Ok(ConsistencyLevel::One),
            "TWO" => Ok(ConsistencyLevel::Two),
            "THREE" => Ok(ConsistencyLevel::Three),
            "QUORUM" => Ok(ConsistencyLevel::Quorum),
            "ALL" => Ok(ConsistencyLevel::All),
            "LOCAL_QUORUM" => Ok(ConsistencyLevel::LocalQuorum),
            "EACH_QUORUM" => Ok(ConsistencyLevel::EachQuorum),
            "LOCAL_ONE" => Ok(ConsistencyLevel::LocalOne),
            _ => Err(format!("Unknown consistency level: {}", s)),
        }
    }
}

impl std::fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConsistencyLevel::Any => "ANY",
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
            ConsistencyLevel::LocalQuorum => "LOCAL_QUORUM",
            ConsistencyLevel::EachQuorum => "EACH_QUORUM",
            ConsistencyLevel::LocalOne => "LOCAL_ONE",
        };
        f.write_str(name)
    }
}

/// What a worker does with a row that fails to decode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Stop reading the partition and report the error
    #[default]
    AbortPartition,
    /// Log the error and continue with the next row
    SkipRow,
}

/// Statement shape used when writing rows back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// `INSERT INTO ... (cols) VALUES (...)`
    #[default]
    Insert,
    /// `UPDATE ... SET regular = ? WHERE key = ?`
    Update,
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay to wait after the given failed attempt (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 1u64 << attempt.min(16);
        let ms = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Job configuration, built once and shared by reference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Contact points of the cluster
    pub hosts: Vec<String>,
    /// Port of the topology (thrift) interface
    pub rpc_port: u16,
    /// Port of the native protocol interface
    pub cql_port: u16,
    /// Keyspace holding the table
    pub keyspace: String,
    /// Table read from or written to
    pub table: String,
    /// Consistency level for reads and writes
    pub consistency: ConsistencyLevel,
    /// Columns to project; `None` reads every column
    pub columns: Option<Vec<String>>,
    /// Rows fetched per page
    pub page_size: usize,
    /// Rows per flushed batch
    pub batch_size: usize,
    /// Number of partitions the splitter aims for
    pub split_target: usize,
    /// Create the destination table when it is missing
    pub create_table_on_write: bool,
    /// Statement shape for writes
    pub write_mode: WriteMode,
    /// Reaction to rows that fail to decode
    pub decode_policy: DecodePolicy,
    /// Timeout for one page fetch
    pub page_timeout_ms: u64,
    /// Timeout for one batch flush
    pub flush_timeout_ms: u64,
    /// Retry policy for page fetches
    pub read_retry: RetryPolicy,
    /// Retry policy for batch flushes
    pub write_retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1".to_string()],
            rpc_port: 9160,
            cql_port: 9042,
            keyspace: String::new(),
            table: String::new(),
            consistency: ConsistencyLevel::default(),
            columns: None,
            page_size: 1000,
            batch_size: 100,
            split_target: 16,
            create_table_on_write: false,
            write_mode: WriteMode::default(),
            decode_policy: DecodePolicy::default(),
            page_timeout_ms: 10_000,
            flush_timeout_ms: 10_000,
            read_retry: RetryPolicy::default(),
            write_retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Create a new Config addressing a table
    pub fn new(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            ..Default::default()
        }
    }

    /// Load a Config from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config: Config = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Set contact points
    pub fn with_hosts(mut self, hosts: Vec<String>) -> Self {
        self.hosts = hosts;
        self
    }

    /// Set the rpc and native protocol ports
    pub fn with_ports(mut self, rpc_port: u16, cql_port: u16) -> Self {
        self.rpc_port = rpc_port;
        self.cql_port = cql_port;
        self
    }

    /// Set consistency level
    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = consistency;
        self
    }

    /// Restrict reads to these columns
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Set page size for reads
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set batch size for writes
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the target partition count
    pub fn with_split_target(mut self, split_target: usize) -> Self {
        self.split_target = split_target;
        self
    }

    /// Enable or disable table creation on write
    pub fn with_create_table_on_write(mut self, create: bool) -> Self {
        self.create_table_on_write = create;
        self
    }

    /// Set write statement shape
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Set decode failure policy
    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    /// Set page fetch and flush timeouts
    pub fn with_timeouts(mut self, page: Duration, flush: Duration) -> Self {
        self.page_timeout_ms = page.as_millis() as u64;
        self.flush_timeout_ms = flush.as_millis() as u64;
        self
    }

    /// Set read retry policy
    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    /// Set write retry policy
    pub fn with_write_retry(mut self, policy: RetryPolicy) -> Self {
        self.write_retry = policy;
        self
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    /// Check the values that would otherwise fail deep inside a worker
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(Error::Configuration("host list is empty".into()));
        }
        if self.keyspace.is_empty() || self.table.is_empty() {
            return Err(Error::Configuration(
                "keyspace and table must be set".into(),
            ));
        }
        if self.page_size == 0 {
            return Err(Error::Configuration("page_size must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Configuration("batch_size must be positive".into()));
        }
        if self.split_target == 0 {
            return Err(Error::Configuration(
                "split_target must be positive".into(),
            ));
        }
        if self.read_retry.max_attempts == 0 || self.write_retry.max_attempts == 0 {
            return Err(Error::Configuration(
                "retry policies need at least one attempt".into(),
            ));
        }
        if matches!(&self.columns, Some(cols) if cols.is_empty()) {
            return Err(Error::Configuration(
                "column projection must name at least one column".into(),
            ));
        }
        Ok(())
    }
}
