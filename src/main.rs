//! fxt-import: decode an FXT trace and print the ordered tracker calls.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::json;

use fxt_import::{ImportConfig, ImportSession, InMemorySink, SortingMode, SymbolTables};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Full,
    Windowed,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "fxt-import")]
#[command(about = "Import an FXT trace with embedded Perfetto blobs")]
#[command(version)]
struct Command {
    /// Trace file to import
    trace: PathBuf,
    /// JSON symbol file used to resolve hashed arguments
    #[arg(short, long)]
    symbols: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value = "full")]
    mode: Mode,
    /// Bound on windowed look-ahead in nanoseconds (0 = unbounded)
    #[arg(long, default_value = "0")]
    window_ns: u64,
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,
    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn main() -> Result<()> {
    let opts = Command::parse();
    init_logging(opts.verbose);

    let symbols = match &opts.symbols {
        Some(path) => SymbolTables::load(path)?,
        None => SymbolTables::new(),
    };
    let config = ImportConfig {
        sorting_mode: match opts.mode {
            Mode::Full => SortingMode::FullSort,
            Mode::Windowed => SortingMode::Windowed,
        },
        window_ns: opts.window_ns,
    };

    let data = fs::read(&opts.trace)
        .with_context(|| format!("Failed to read trace {}", opts.trace.display()))?;

    let mut session = ImportSession::new(config, symbols);
    let mut sink = InMemorySink::new();
    let imported = session.import_buffer(&data, &mut sink);
    let rows = sink.rows(session.pool());
    let stats = session.stats();

    match opts.format {
        Format::Text => {
            for row in &rows {
                let ts = row.ts.map_or_else(|| "-".to_string(), |ts| ts.to_string());
                println!("{:>16} {:<8} {:<28} {}", ts, row.kind, row.track, row.detail);
            }
            for (stat, value) in stats.non_zero() {
                println!("# {stat}: {value}");
            }
        }
        Format::Json => {
            let out = json!({ "rows": rows, "stats": stats });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    imported
        .map(|_| ())
        .with_context(|| format!("Failed to import {}", opts.trace.display()))
}
