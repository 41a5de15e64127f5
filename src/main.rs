mod actions;
mod config;
mod error;
mod hasher;
mod index;
mod logging;
mod output;
mod pipeline;
mod progress;
mod run;
mod scanner;
mod state;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::HumanBytes;

use crate::config::{DEFAULT_QUEUE_CAPACITY, DEFAULT_SMALL_FILE_THRESHOLD, PipelineConfig};
use crate::error::{Error, Result};
use crate::hasher::Blake3Hasher;
use crate::output::ReportKind;
use crate::progress::{ProgressObserver, SilentObserver, SpinnerObserver};
use crate::run::{DuplicateAction, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "hoard")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human, global = true)]
    format: OutputFormat,

    /// Number of hashing workers (default: CPU count, clamped to 8..=16)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Capacity of the path and result queues
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, global = true)]
    queue_capacity: usize,

    /// Files smaller than this many bytes are read into memory before hashing
    #[arg(long, default_value_t = DEFAULT_SMALL_FILE_THRESHOLD, global = true)]
    small_file_threshold: u64,

    /// Glob pattern to skip (repeatable), matched against names and relative paths
    #[arg(short, long, global = true)]
    exclude: Vec<String>,

    /// File with one exclude pattern per line
    #[arg(long, global = true)]
    exclude_file: Option<PathBuf>,

    /// Preview changes without modifying files or saving state
    #[arg(long, global = true)]
    dry_run: bool,

    /// Hide the progress spinner
    #[arg(long, global = true)]
    no_progress: bool,

    /// List duplicates and failures, and log at info level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy content that is not yet archived from SOURCE into DEST
    Backup {
        /// Directory to back up
        source: PathBuf,
        /// Archive root; relative paths under SOURCE are kept
        dest: PathBuf,
        /// State file recording archived content
        state: PathBuf,
    },
    /// Move duplicate files out of SOURCE into QUARANTINE
    Dedup {
        /// Directory to deduplicate
        source: PathBuf,
        /// Where duplicates are moved; relative paths under SOURCE are kept
        quarantine: PathBuf,
        /// Optional state file recording canonical paths
        state: Option<PathBuf>,
    },
    /// Delete duplicate files under SOURCE
    Prune {
        /// Directory to deduplicate
        source: PathBuf,
        /// Optional state file recording canonical paths
        state: Option<PathBuf>,
    },
    /// Write the size of every file under SOURCE to OUTPUT, one per line
    Sizes {
        /// Directory to measure
        source: PathBuf,
        /// File receiving the size listing
        output: PathBuf,
    },
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig {
            queue_capacity: self.queue_capacity,
            small_file_threshold: self.small_file_threshold,
            exclude: self.exclude.clone(),
            ..Default::default()
        };
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(path) = &self.exclude_file {
            config.exclude.extend(config::read_exclude_file(path)?);
        }
        config.validate()?;
        Ok(config)
    }

    fn observer(&self) -> Box<dyn ProgressObserver> {
        if self.no_progress {
            Box::new(SilentObserver)
        } else {
            Box::new(SpinnerObserver::new())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> Result<()> {
    let options = RunOptions {
        config: cli.pipeline_config()?,
        dry_run: cli.dry_run,
    };

    let (report, kind) = match &cli.command {
        Command::Backup {
            source,
            dest,
            state,
        } => {
            let observer = cli.observer();
            let report = run::backup(source, dest, state, &options, &Blake3Hasher, observer.as_ref())?;
            (report, ReportKind::Backup)
        }
        Command::Dedup {
            source,
            quarantine,
            state,
        } => {
            let observer = cli.observer();
            let action = DuplicateAction::Relocate(quarantine.clone());
            let report = run::dedup(
                source,
                &action,
                state.as_deref(),
                &options,
                &Blake3Hasher,
                observer.as_ref(),
            )?;
            (report, ReportKind::Dedup)
        }
        Command::Prune { source, state } => {
            let observer = cli.observer();
            let report = run::dedup(
                source,
                &DuplicateAction::Delete,
                state.as_deref(),
                &options,
                &Blake3Hasher,
                observer.as_ref(),
            )?;
            (report, ReportKind::Prune)
        }
        Command::Sizes { source, output } => {
            return write_sizes(source, output, &options.config, cli.format);
        }
    };

    match cli.format {
        OutputFormat::Human => report.print_human(kind, cli.verbose),
        OutputFormat::Json => report.print_json(),
    }
    Ok(())
}

/// Write one size per line and print the total
fn write_sizes(source: &Path, output: &Path, config: &PipelineConfig, format: OutputFormat) -> Result<()> {
    let sizes = scanner::file_sizes(source, config.exclude_set()?)?;

    let file = File::create(output).map_err(|e| Error::io(output, e))?;
    let mut writer = BufWriter::new(file);
    for size in &sizes {
        writeln!(writer, "{}", size).map_err(|e| Error::io(output, e))?;
    }
    writer.flush().map_err(|e| Error::io(output, e))?;

    let total: u64 = sizes.iter().sum();
    match format {
        OutputFormat::Human => {
            println!("Found {} files", sizes.len());
            println!("Source size: {}", HumanBytes(total));
        }
        OutputFormat::Json => {
            let summary = serde_json::json!({ "files": sizes.len(), "total_bytes": total });
            println!("{}", summary);
        }
    }
    Ok(())
}
