//! peakline - ENCODE signal-track peak-calling and GIGGLE-indexing
//! pipeline orchestrator
//!
//! Fetches portal metadata, maintains the local manifest store, and
//! drives the download → peak_call → bed_convert → giggle_index DAG.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use clap::{Parser, Subcommand};

use peakline_core::shutdown_flag;

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "peakline")]
#[command(about = "Signal-track peak-calling and interval-index pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./peakline.toml or ~/.config/peakline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch metadata, update the store, and run the pipeline
    Run(cmd::run::RunArgs),
    /// Fetch the raw metadata TSV and exit
    Fetch(cmd::fetch::FetchArgs),
    /// Merge an existing metadata TSV into the manifest store
    BuildStore(cmd::store::BuildStoreArgs),
    /// Remove a stale store lock left by a crashed process
    Unlock,
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(peakline_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug  — progress lines show activity
    //   non-TTY: info unless --debug          — logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    peakline_core::init_logging(quiet, cli.debug, multi);

    let config = match load_config(cli.config.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e:#}");
            return ExitCode::from(2);
        }
    };

    let outcome = match cli.command {
        Command::Run(args) => {
            setup_signal_handler();
            cmd::run::run(args, &config, &progress)
        }
        Command::Fetch(args) => cmd::fetch::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::BuildStore(args) => {
            cmd::store::build_store(args, &config).map(|()| ExitCode::SUCCESS)
        }
        Command::Unlock => cmd::store::unlock(&config).map(|()| ExitCode::SUCCESS),
        Command::Config => {
            print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

fn load_config(path: Option<&std::path::PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
}

fn setup_signal_handler() {
    // First signal: set graceful shutdown flag
    // Second signal: force exit (default SIGINT behavior restored)
    // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGTERM, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })
        .expect("Failed to register SIGTERM handler");
        signal_hook::low_level::register(signal_hook::consts::SIGINT, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })
        .expect("Failed to register SIGINT handler");
    }
}

fn print_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec![
        "Store table",
        &config.store.table_path().display().to_string(),
    ]);
    table.add_row(vec![
        "Metadata TSV",
        &config.store.metadata_tsv_path().display().to_string(),
    ]);
    table.add_row(vec![
        "File list",
        &config.store.file_list_path().display().to_string(),
    ]);
    table.add_row(vec![
        "Selection TSV",
        &config
            .store
            .selection_tsv
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not set".to_string()),
    ]);
    table.add_row(vec!["Download client", &config.tools.download_client]);
    table.add_row(vec!["Peak caller", &config.tools.peak_caller]);
    table.add_row(vec!["Compressor", &config.tools.compressor]);
    table.add_row(vec!["Indexer", &config.tools.indexer]);
    table.add_row(vec![
        "Tracks dir",
        &config.dirs.tracks.display().to_string(),
    ]);
    table.add_row(vec!["Peaks dir", &config.dirs.peaks.display().to_string()]);
    table.add_row(vec!["Beds dir", &config.dirs.beds.display().to_string()]);
    table.add_row(vec!["Index dir", &config.dirs.index.display().to_string()]);
    table.add_row(vec![
        "Workers",
        &format!("{} (max: {})", config.workers.default, config.workers.max),
    ]);
    table.add_row(vec![
        "Chromosome",
        if config.pipeline.chromosome.is_empty() {
            "unrestricted"
        } else {
            config.pipeline.chromosome.as_str()
        },
    ]);
    table.add_row(vec![
        "Assembly filter",
        config.pipeline.assembly.as_deref().unwrap_or("any"),
    ]);
    table.add_row(vec![
        "Max retries",
        &config.pipeline.max_retries.to_string(),
    ]);

    eprintln!("\n{table}");
}
