//! kinship - Groups related files into project folders.
//!
//! Usage:
//!   kinship analyze <ROOTS>...              Detect projects and preview the plan
//!   kinship organize <ROOTS>... --dest DIR  Move files into project folders
//!   kinship search <QUERY> <ROOTS>...       Rank files against a query
//!   kinship undo <LEDGER|RUN_ID>            Reverse an organize run
//!   kinship ledgers                         List stored undo ledgers
//!   kinship config                          Print the effective configuration

mod logging;
mod render;

use std::io::Write as _;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, eyre, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use kinship_analyze::{Analysis, Analyzer, DEFAULT_TOP};
use kinship_core::OrganizeConfig;
use kinship_ops::{list_ledgers, start_apply, start_undo, OperationUpdate, LEDGER_EXTENSION};
use kinship_scan::{Discovery, JwalkScanner};

use crate::render::{format_size, progress_line};

#[derive(Parser)]
#[command(
    name = "kinship",
    version,
    about = "Groups related files into project folders",
    long_about = "kinship finds files that belong together and moves them into \
                  project folders. Every organize run writes an undo ledger, so \
                  it can be reversed with `kinship undo`."
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding undo ledgers
    #[arg(long, global = true)]
    ledger_dir: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect projects and preview the move plan
    Analyze {
        /// Files or directories to organize
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Destination root for the preview (defaults to ./organized)
        #[arg(short, long)]
        dest: Option<PathBuf>,

        #[command(flatten)]
        tuning: Tuning,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Move files into project folders
    Organize {
        /// Files or directories to organize
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Destination root
        #[arg(short, long)]
        dest: PathBuf,

        /// Plan and report without touching the filesystem
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// One folder per file kind, without content analysis
        #[arg(long)]
        basic: bool,

        #[command(flatten)]
        tuning: Tuning,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Rank files by relevance to a free-text query
    Search {
        /// Words to look for in file names and contents
        query: String,

        /// Files or directories to search
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Number of results
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP)]
        top: usize,

        #[command(flatten)]
        tuning: Tuning,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Reverse an organize run
    Undo {
        /// Ledger path or run id
        ledger: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List stored undo ledgers
    Ledgers {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Overrides for the loaded configuration.
#[derive(clap::Args)]
struct Tuning {
    /// Similarity threshold (0.0 to 1.0)
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Maximum folder depth inside a project (1 to 3)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Worker threads for feature extraction (0 = automatic)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Disable the remote inference provider
    #[arg(long)]
    offline: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let ledger_dir = resolve_ledger_dir(cli.ledger_dir, &config);

    match cli.command {
        Command::Analyze {
            roots,
            dest,
            tuning,
            format,
        } => {
            let dest = dest.unwrap_or_else(|| PathBuf::from("organized"));
            let analysis = run_analysis(config, &roots, &dest, &tuning, false)?;
            print_analysis(&analysis, format)?;
        }
        Command::Organize {
            roots,
            dest,
            dry_run,
            basic,
            tuning,
            format,
        } => {
            let analysis = run_analysis(config, &roots, &dest, &tuning, basic)?;
            print_analysis(&analysis, format)?;
            if dry_run {
                eprintln!("Dry run: nothing was moved.");
            } else {
                run_apply(analysis, ledger_dir?, format)?;
            }
        }
        Command::Search {
            query,
            roots,
            top,
            tuning,
            format,
        } => {
            let (analyzer, discovery) = scan(config, &roots, &tuning)?;
            let hits = analyzer
                .search(&discovery.records, &query, top, &CancellationToken::new())
                .context("Search failed")?;
            match format {
                OutputFormat::Text => print!("{}", render::search_results(&query, &hits)),
                OutputFormat::Json => {
                    let value = serde_json::json!({ "query": query, "results": hits });
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
            }
        }
        Command::Undo { ledger, format } => {
            let path = resolve_ledger(&ledger, &ledger_dir?)?;
            run_undo(path, format)?;
        }
        Command::Ledgers { format } => {
            let ledgers = list_ledgers(&ledger_dir?).context("Failed to list ledgers")?;
            match format {
                OutputFormat::Text => print!("{}", render::ledger_table(&ledgers)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ledgers)?),
            }
        }
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<OrganizeConfig> {
    match path {
        Some(path) => OrganizeConfig::from_toml_file(path)
            .with_context(|| format!("Invalid configuration {}", path.display())),
        None => Ok(OrganizeConfig::default()),
    }
}

/// `--ledger-dir`, then the configured directory, then the user data dir.
fn resolve_ledger_dir(flag: Option<PathBuf>, config: &OrganizeConfig) -> Result<PathBuf> {
    if let Some(dir) = flag.or_else(|| config.ledger_dir.clone()) {
        return Ok(dir);
    }
    dirs::data_local_dir()
        .map(|dir| dir.join("kinship").join("ledgers"))
        .ok_or_else(|| eyre!("No local data directory; pass --ledger-dir"))
}

/// Accept a ledger path or a run id from the ledger directory.
fn resolve_ledger(arg: &str, ledger_dir: &Path) -> Result<PathBuf> {
    let path = PathBuf::from(arg);
    if path.exists() {
        return Ok(path);
    }
    let by_id = ledger_dir.join(format!("{arg}.{LEDGER_EXTENSION}"));
    if by_id.exists() || kinship_ops::consumed_path(&by_id).exists() {
        return Ok(by_id);
    }
    bail!("No ledger {arg} (looked in {})", ledger_dir.display())
}

/// Apply the overrides, then scan the roots. Runs outside any async runtime.
fn scan(
    mut config: OrganizeConfig,
    roots: &[PathBuf],
    tuning: &Tuning,
) -> Result<(Analyzer, Discovery)> {
    if let Some(threshold) = tuning.threshold {
        config.similarity_threshold = threshold;
    }
    if let Some(max_depth) = tuning.max_depth {
        config.max_depth = max_depth;
    }
    if let Some(jobs) = tuning.jobs {
        config.concurrency = jobs;
    }
    if tuning.offline {
        config.provider.enabled = false;
    }
    config.scan.roots = roots.to_vec();

    let analyzer = Analyzer::new(config).context("Invalid configuration")?;

    eprintln!("Scanning {} root(s)...", roots.len());
    let discovery = JwalkScanner::new()
        .scan(&analyzer.config().scan, &analyzer.config().extensions)
        .context("Scan failed")?;
    eprintln!(
        "Found {} files ({})",
        discovery.records.len(),
        format_size(discovery.total_size)
    );
    Ok((analyzer, discovery))
}

/// Scan the roots and plan their moves, by content or by kind alone.
fn run_analysis(
    config: OrganizeConfig,
    roots: &[PathBuf],
    dest: &Path,
    tuning: &Tuning,
    by_kind: bool,
) -> Result<Analysis> {
    let dest = std::path::absolute(dest).context("Invalid destination")?;
    let (analyzer, discovery) = scan(config, roots, tuning)?;

    let analysis = if by_kind {
        analyzer.analyze_by_kind(discovery.records, &dest)
    } else {
        analyzer.analyze(discovery.records, &dest, &CancellationToken::new())
    };
    let mut analysis = analysis.context("Analysis failed")?;
    analysis.report.add_scan_warnings(&discovery.warnings);
    Ok(analysis)
}

fn print_analysis(analysis: &Analysis, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            print!("{}", analysis.plan.preview());
            println!();
            print!("{}", analysis.report.render_text());
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "plan": analysis.plan,
                "report": analysis.report,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")
}

fn run_apply(analysis: Analysis, ledger_dir: PathBuf, format: OutputFormat) -> Result<()> {
    if analysis.plan.moves().next().is_none() {
        eprintln!("Nothing to move.");
        return Ok(());
    }
    info!(ledger_dir = %ledger_dir.display(), "applying plan");

    runtime()?.block_on(async move {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\r\x1b[2KInterrupted: finishing the current project...");
                on_interrupt.cancel();
            }
        });

        let mut rx = start_apply(analysis.plan, ledger_dir, cancel);
        while let Some(update) = rx.recv().await {
            match update {
                OperationUpdate::Progress(progress) => show_progress(&progress),
                OperationUpdate::Failed(failure) => {
                    eprintln!("\r\x1b[2K{}: {}", failure.path.display(), failure.reason);
                }
                OperationUpdate::Applied(report) => {
                    eprintln!();
                    match format {
                        OutputFormat::Text => print!("{}", render::apply_report(&report)),
                        OutputFormat::Json => {
                            println!("{}", serde_json::to_string_pretty(&report)?)
                        }
                    }
                    return Ok(());
                }
                OperationUpdate::Undone(_) => {}
                OperationUpdate::Aborted(e) => return Err(e).context("Apply stopped"),
            }
        }
        bail!("Apply ended without a report")
    })
}

fn run_undo(ledger: PathBuf, format: OutputFormat) -> Result<()> {
    runtime()?.block_on(async move {
        let mut rx = start_undo(ledger);
        while let Some(update) = rx.recv().await {
            match update {
                OperationUpdate::Progress(progress) => show_progress(&progress),
                OperationUpdate::Failed(failure) => {
                    eprintln!("\r\x1b[2K{}: {}", failure.path.display(), failure.reason);
                }
                OperationUpdate::Undone(report) => {
                    eprintln!();
                    match format {
                        OutputFormat::Text => print!("{}", render::undo_report(&report)),
                        OutputFormat::Json => {
                            println!("{}", serde_json::to_string_pretty(&report)?)
                        }
                    }
                    return Ok(());
                }
                OperationUpdate::Applied(_) => {}
                OperationUpdate::Aborted(e) => return Err(e).context("Undo failed"),
            }
        }
        bail!("Undo ended without a report")
    })
}

fn show_progress(progress: &kinship_ops::OperationProgress) {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "\r\x1b[2K{}", progress_line(progress));
    let _ = stderr.flush();
}
