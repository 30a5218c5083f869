//! palkv CLI
//!
//! Builds stores from tab-separated text and inspects existing ones.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use palkv::{Config, Entry, IngestReport, StoreBuilder, StoreReader};
use tracing_subscriber::{fmt, EnvFilter};

/// palkv CLI
#[derive(Parser, Debug)]
#[command(name = "palkv")]
#[command(about = "Build and query immutable on-disk hash tables")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a store from `key<TAB>value` lines (a bare key deletes it)
    Build {
        /// Input text file
        input: PathBuf,

        /// Store file to publish
        output: PathBuf,

        /// Entries per index slot, in (0, 1]
        #[arg(long, default_value_t = palkv::config::DEFAULT_LOAD_FACTOR)]
        load_factor: f64,

        /// Let later values for a key replace earlier ones
        #[arg(long)]
        no_distinct: bool,

        /// Compact when live keys / values falls below this (0 disables)
        #[arg(long, default_value_t = palkv::config::DEFAULT_COMPACTION_THRESHOLD)]
        compaction_threshold: f64,

        /// Metadata string stored alongside the data
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Print store statistics
    Stats {
        store: PathBuf,
    },

    /// Look up one key
    Get {
        store: PathBuf,

        key: String,
    },

    /// Print live entries as `key<TAB>value`
    Scan {
        store: PathBuf,

        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,palkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    match run(args.command) {
        Ok(found) => {
            if found {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns `false` when a looked-up key is absent
fn run(command: Commands) -> palkv::Result<bool> {
    match command {
        Commands::Build {
            input,
            output,
            load_factor,
            no_distinct,
            compaction_threshold,
            metadata,
        } => {
            let config = Config::builder()
                .load_factor(load_factor)
                .no_distinct(no_distinct)
                .compaction_threshold(compaction_threshold)
                .metadata(metadata.unwrap_or_default())
                .build();

            tracing::info!("Building {} from {}", output.display(), input.display());

            let mut builder = StoreBuilder::new(&output, config)?;
            let report = ingest(&mut builder, BufReader::new(File::open(&input)?))?;
            let summary = builder.finish()?;

            println!("path:        {}", summary.path.display());
            println!("accepted:    {}", report.accepted);
            println!("rejected:    {}", report.rejected);
            println!("keys:        {}", summary.num_keys);
            println!("values:      {}", summary.num_values);
            println!("partitions:  {}", summary.num_partitions);
            println!("bytes:       {}", summary.file_size);
            println!("compacted:   {}", summary.compacted);
            Ok(true)
        }

        Commands::Stats { store } => {
            let reader = StoreReader::open(&store)?;
            let stats = reader.statistics();

            println!("path:        {}", reader.path().display());
            println!("created:     {}", stats.creation_timestamp);
            println!("keys:        {}", stats.num_keys);
            println!("values:      {}", stats.num_values);
            println!("partitions:  {}", stats.num_partitions);
            println!("max key:     {}", reader.max_key_size());
            println!("index bytes: {}", stats.index_size);
            println!("data bytes:  {}", stats.data_size);
            println!("metadata:    {}", String::from_utf8_lossy(reader.metadata()));
            Ok(true)
        }

        Commands::Get { store, key } => {
            let reader = StoreReader::open(&store)?;
            match reader.get(key.as_bytes())? {
                Some(value) => {
                    println!("{}", String::from_utf8_lossy(value));
                    Ok(true)
                }
                None => {
                    eprintln!("(not found)");
                    Ok(false)
                }
            }
        }

        Commands::Scan { store, limit } => {
            let reader = StoreReader::open(&store)?;
            let mut out = BufWriter::new(io::stdout().lock());
            for item in reader.iter().take(limit.unwrap_or(usize::MAX)) {
                let (key, value) = item?;
                writeln!(
                    out,
                    "{}\t{}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(value)
                )?;
            }
            out.flush()?;
            Ok(true)
        }
    }
}

/// Stream `input` into `builder` one line at a time.
///
/// Lines are raw bytes, so keys and values need not be UTF-8. A read error
/// stops the ingestion and is returned once the builder has seen every line
/// before it.
fn ingest<R: BufRead>(builder: &mut StoreBuilder, input: R) -> palkv::Result<IngestReport> {
    let mut read_error = None;
    let entries = input
        .split(b'\n')
        .map_while(|line| match line {
            Ok(line) => Some(line),
            Err(e) => {
                read_error = Some(e);
                None
            }
        })
        .filter_map(|line| parse_line(&line));

    let report = builder.extend(entries)?;
    match read_error {
        Some(e) => Err(e.into()),
        None => Ok(report),
    }
}

/// `key<TAB>value` puts, a bare `key` deletes, blank lines are skipped
fn parse_line(line: &[u8]) -> Option<Entry> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() {
        return None;
    }
    Some(match line.iter().position(|&b| b == b'\t') {
        Some(tab) => Entry::put(&line[..tab], &line[tab + 1..]),
        None => Entry::delete(line),
    })
}
