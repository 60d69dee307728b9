//! ringbridge - plan and run token-range jobs against a wide-column store

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use ringbridge::job::partition_results;
use ringbridge::model::{Cell, Row, TypeTag};
use ringbridge::output::{OutputFactory, OutputFormat, OutputFormatter, PlanReport, TerminalOutput};
use ringbridge::ring::{RingEntry, TokenRangeSplitter};
use ringbridge::store::{MemoryStore, Session};
use ringbridge::{Config, Job};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOutputFormat {
    Terminal,
    Json,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(f: CliOutputFormat) -> Self {
        match f {
            CliOutputFormat::Terminal => OutputFormat::Terminal,
            CliOutputFormat::Json => OutputFormat::Json,
        }
    }
}

/// Split a store's token ring into parallel read/write partitions
#[derive(Parser, Debug)]
#[command(name = "ringbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the partition plan for a ring topology
    Split(SplitArgs),
    /// Print the first-page read query of every partition
    Queries(QueriesArgs),
    /// Write generated rows into an in-memory store and read them back
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
struct SplitArgs {
    /// JSON file with the ring: [{"start": .., "end": .., "endpoints": [..]}]
    #[arg(short, long)]
    topology: PathBuf,

    /// Number of partitions to aim for
    #[arg(long, default_value_t = 16)]
    target: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "terminal")]
    format: CliOutputFormat,

    /// Hide replica hosts in terminal output
    #[arg(long)]
    no_replicas: bool,
}

#[derive(Args, Debug)]
struct QueriesArgs {
    /// JSON file with the ring topology
    #[arg(short, long)]
    topology: PathBuf,

    /// JSON job configuration (keyspace, table, columns, page_size, ...)
    #[arg(short, long)]
    config: PathBuf,

    /// Partition key column(s) (comma-separated)
    #[arg(short, long, value_delimiter = ',', required = true)]
    key: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "terminal")]
    format: CliOutputFormat,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// JSON job configuration; the table is created on write
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of rows to write
    #[arg(long, default_value_t = 1000)]
    rows: usize,

    /// Hosts of the simulated cluster (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "127.0.0.1")]
    hosts: Vec<String>,

    /// Token ranges of the simulated ring
    #[arg(long, default_value_t = 8)]
    ranges: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let color = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    match cli.command {
        Command::Split(args) => split(args, color),
        Command::Queries(args) => queries(args, color),
        Command::Simulate(args) => simulate(args),
    }
}

fn load_topology(path: &Path) -> Result<Vec<RingEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read topology: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse topology: {}", path.display()))
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_json_file(path)
        .with_context(|| format!("Failed to load config: {}", path.display()))
}

fn split(args: SplitArgs, color: ColorChoice) -> Result<()> {
    let topology = load_topology(&args.topology)?;
    let partitions = TokenRangeSplitter::new(args.target)
        .split(&topology)
        .context("Failed to split topology")?;
    let report = PlanReport::new(args.target, &partitions);

    let format: OutputFormat = args.format.into();
    let formatter: Box<dyn OutputFormatter> = match format {
        OutputFormat::Terminal if args.no_replicas => Box::new(TerminalOutput::without_replicas()),
        other => OutputFactory::create(other),
    };
    let mut stdout = StandardStream::stdout(color);
    formatter.render(&report, &mut stdout)?;
    Ok(())
}

fn queries(args: QueriesArgs, color: ColorChoice) -> Result<()> {
    let topology = load_topology(&args.topology)?;
    let config = load_config(&args.config)?;

    let partitions = TokenRangeSplitter::new(config.split_target)
        .split(&topology)
        .context("Failed to split topology")?;
    let report = PlanReport::new(config.split_target, &partitions).with_queries(&config, &args.key);

    let mut stdout = StandardStream::stdout(color);
    OutputFactory::create(args.format.into()).render(&report, &mut stdout)?;
    Ok(())
}

fn generated_row(id: usize) -> Result<Row> {
    let row = Row::from_cells([
        Cell::partition_key("id", TypeTag::BigInt, id as i64)?,
        Cell::new("payload", TypeTag::Text, format!("row-{}", id))?,
    ])?;
    Ok(row)
}

fn simulate(args: SimulateArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::new("ringbridge", "simulated"),
    }
    .with_create_table_on_write(true);

    let hosts: Vec<&str> = args.hosts.iter().map(String::as_str).collect();
    let store = MemoryStore::evenly_spaced(&hosts, args.ranges);
    let job = Job::new(&store, &config).context("Invalid job configuration")?;
    let partitions = job.list_partitions()?;

    let rows = (0..args.rows)
        .map(generated_row)
        .collect::<Result<Vec<_>>>()?;
    let count = partitions.len();
    let written = job.write_all(&partitions, |p| {
        rows.iter()
            .enumerate()
            .filter(move |(i, _)| i % count == p.index)
            .map(|(_, row)| row.clone())
            .collect::<Vec<_>>()
    });
    let (summaries, failures) = partition_results(written);
    if let Some(first) = failures.into_iter().next() {
        return Err(first).context("Simulated write failed");
    }

    let read = job.read_all::<Row, _, _>(&partitions, |_, rows| {
        rows.collect::<ringbridge::Result<Vec<_>>>().map(|r| r.len())
    });
    let (counts, failures) = partition_results(read);
    if let Some(first) = failures.into_iter().next() {
        return Err(first).context("Simulated read failed");
    }

    let rows_written: usize = summaries.iter().map(|s| s.rows_written).sum();
    let batches: usize = summaries.iter().map(|s| s.batches).sum();
    let rows_read: usize = counts.iter().sum();
    let ring_ranges = store.describe_ring(&config.keyspace)?.len();

    println!(
        "partitions: {} (ring ranges: {})",
        partitions.len(),
        ring_ranges
    );
    println!("written: {} row(s) in {} batch(es)", rows_written, batches);
    println!("read back: {} row(s)", rows_read);
    if rows_read != rows_written {
        anyhow::bail!("read back {} rows but wrote {}", rows_read, rows_written);
    }
    Ok(())
}
