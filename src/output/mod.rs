//! Output formatting for partition plans

mod json;
mod terminal;

use serde::Serialize;
use termcolor::WriteColor;

use crate::config::Config;
use crate::error::Result;
use crate::ring::{Partition, TokenRange, RING_SPAN};
use crate::store::SelectQuery;

pub use json::JsonOutput;
pub use terminal::TerminalOutput;

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Terminal,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "terminal" => Ok(OutputFormat::Terminal),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// One partition of a plan, with the queries that would read it
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub index: usize,
    pub range: TokenRange,
    /// Share of the ring covered, in percent
    pub ring_share: f64,
    pub replicas: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<String>,
}

/// A partition plan ready to print
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub target: usize,
    pub partitions: Vec<PlanEntry>,
}

impl PlanReport {
    pub fn new(target: usize, partitions: &[Partition]) -> Self {
        let partitions = partitions
            .iter()
            .map(|p| PlanEntry {
                index: p.index,
                range: p.range,
                ring_share: p.range.span() as f64 / RING_SPAN as f64 * 100.0,
                replicas: p.replicas.iter().cloned().collect(),
                queries: Vec::new(),
            })
            .collect();
        Self { target, partitions }
    }

    /// Attach the first-page query of every segment of every partition
    pub fn with_queries(mut self, config: &Config, key_columns: &[String]) -> Self {
        for entry in &mut self.partitions {
            entry.queries = entry
                .range
                .non_wrapping()
                .into_iter()
                .map(|segment| {
                    SelectQuery::new(config, key_columns.to_vec(), key_columns.to_vec(), segment)
                        .to_cql_with_bounds()
                })
                .collect();
        }
        self
    }

    pub fn has_queries(&self) -> bool {
        self.partitions.iter().any(|p| !p.queries.is_empty())
    }
}

/// Trait for output formatters
pub trait OutputFormatter {
    /// Render a plan to a writer
    fn render(&self, report: &PlanReport, writer: &mut dyn WriteColor) -> Result<()>;
}

/// Factory for creating output formatters
pub struct OutputFactory;

impl OutputFactory {
    pub fn create(format: OutputFormat) -> Box<dyn OutputFormatter> {
        match format {
            OutputFormat::Terminal => Box::new(TerminalOutput::new()),
            OutputFormat::Json => Box::new(JsonOutput::new()),
        }
    }
}
