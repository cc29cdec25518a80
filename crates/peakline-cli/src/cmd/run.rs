//! `peakline run` - fetch, merge, resolve, and execute the pipeline

use std::collections::BTreeSet;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use indicatif::ProgressBar;

use peakline_core::SharedProgress;
use peakline_engine::{
    Engine, RunReport, Task, TaskError, TaskGraph, TaskRunner, TaskStatus, resolve_samples,
};
use peakline_store::fetch::{fetch_metadata_tsv, metadata_url_from_file_list};
use peakline_store::{FileFormat, ManifestStore, SelectFilter, parse_metadata_tsv,
    parse_selection_tsv};
use peakline_stages::SubprocessRunner;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Skip the metadata fetch and merge; use the store as-is
    #[arg(long)]
    pub no_fetch: bool,

    /// Print the task plan without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Number of parallel workers
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,
}

pub fn run(args: RunArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    // 1. Refresh the store from the portal
    let mut store = ManifestStore::open(&config.store.table_path())?;
    if args.no_fetch {
        log::info!("Skipping fetch; store has {} record(s)", store.len());
    } else {
        let url = metadata_url_from_file_list(&config.store.file_list_path())?;
        log::info!("Fetching metadata from {url}");
        let tsv = fetch_metadata_tsv(&url)?;
        super::fetch::write_atomic(&config.store.metadata_tsv_path(), &tsv)?;
        let records = parse_metadata_tsv(&tsv)?;
        let merged = store.merge(records)?;
        log::info!("Store merge: {merged}");
    }

    // 2. Select processable records and resolve the sample set
    let filter = SelectFilter {
        format: Some(FileFormat::SignalTrack),
        assembly: config.pipeline.assembly.clone(),
        target: config.pipeline.target.clone(),
        cell_types: Vec::new(),
        ids: load_selection(config)?,
    };
    let records = store.select(&filter);
    let outcome = resolve_samples(&records);
    if outcome.excluded > 0 {
        log::warn!("{} record(s) excluded during resolution", outcome.excluded);
    }
    if outcome.samples.is_empty() {
        log::warn!("No processable samples; nothing to do");
    }

    // 3. Build the task graph
    let graph = TaskGraph::build(&outcome.samples, &config.dirs.layout())?;
    log::info!(
        "Planned {} task(s) for {} sample(s)",
        graph.len(),
        outcome.samples.len()
    );

    print_plan(&graph, progress);
    if args.dry_run {
        progress.println("(dry-run mode, no execution)");
        return Ok(ExitCode::SUCCESS);
    }

    // 4. Execute
    let workers = args
        .workers
        .unwrap_or(config.workers.default)
        .min(config.workers.max);
    let runner = SubprocessRunner::new(config.tool_config(), &outcome.samples);
    let runner = ProgressRunner::new(&runner, graph.len(), progress);
    let report = Engine::new(workers, config.pipeline.max_retries).run(&graph, &runner);
    runner.finish();

    print_summary(&report, progress);
    if report.interrupted {
        log::warn!("Run interrupted; unfinished tasks remain pending");
    }
    Ok(if report.exit_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load_selection(config: &Config) -> Result<Option<BTreeSet<String>>> {
    let Some(ref path) = config.store.selection_tsv else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading selection manifest {}", path.display()))?;
    let ids = parse_selection_tsv(&text);
    log::info!("Selection manifest restricts to {} id(s)", ids.len());
    Ok(Some(ids))
}

fn print_plan(graph: &TaskGraph, progress: &SharedProgress) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Stage").fg(Color::Cyan),
            Cell::new("Sample").fg(Color::Cyan),
            Cell::new("Output").fg(Color::Cyan),
        ]);
    for task in &graph.tasks {
        table.add_row(vec![
            task.stage.to_string(),
            task.sample_id.clone().unwrap_or_else(|| "(all)".to_string()),
            task.outputs
                .first()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ]);
    }
    progress.println(format!("{table}"));
}

fn print_summary(report: &RunReport, progress: &SharedProgress) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Task").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Detail").fg(Color::Cyan),
        ]);
    for task in &report.tasks {
        let status_cell = match task.status {
            TaskStatus::Succeeded => Cell::new("succeeded").fg(Color::Green),
            TaskStatus::Skipped => Cell::new("cached").fg(Color::Blue),
            TaskStatus::Failed => Cell::new("failed").fg(Color::Red),
            TaskStatus::SkippedUpstream => Cell::new("skipped (upstream)").fg(Color::Yellow),
            TaskStatus::Pending | TaskStatus::Running => Cell::new("pending").fg(Color::Grey),
        };
        table.add_row(vec![
            Cell::new(&task.label),
            status_cell,
            Cell::new(task.error.as_deref().unwrap_or("")),
        ]);
    }
    progress.println(format!("{table}"));
    progress.println(format!(
        "{} succeeded, {} cached, {} failed, {} skipped, {} pending ({:.1}s)",
        report.succeeded,
        report.skipped,
        report.failed,
        report.skipped_upstream,
        report.pending,
        report.elapsed.as_secs_f64()
    ));
}

/// Wraps the real runner to keep one progress line current.
struct ProgressRunner<'a> {
    inner: &'a SubprocessRunner,
    bar: ProgressBar,
    done: AtomicUsize,
    total: usize,
}

impl<'a> ProgressRunner<'a> {
    fn new(inner: &'a SubprocessRunner, total: usize, progress: &SharedProgress) -> Self {
        Self {
            inner,
            bar: progress.task_line("pipeline"),
            done: AtomicUsize::new(0),
            total,
        }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl TaskRunner for ProgressRunner<'_> {
    fn run(&self, task: &Task) -> Result<(), TaskError> {
        self.bar
            .set_message(format!("{} ({}/{})", task.label(), self.done.load(Ordering::Relaxed), self.total));
        let result = self.inner.run(task);
        self.done.fetch_add(1, Ordering::Relaxed);
        result
    }
}
