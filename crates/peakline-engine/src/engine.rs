//! Execution engine: bounded worker pool over the task DAG
//!
//! Single-threaded control loop dispatching ready tasks to scoped worker
//! threads, bounded by a counting semaphore. Freshness is decided at
//! dispatch time from artifact timestamps, so a re-invoked run skips
//! everything that already completed. Per-task failures poison only the
//! dependent subtree; independent chains keep going.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant, SystemTime};

use peakline_core::Semaphore;

use crate::error::TaskError;
use crate::graph::TaskGraph;
use crate::retry::retry_with_backoff;
use crate::task::{Stage, Task, TaskStatus};

/// Executes a single task's external work. Implemented by the stage
/// subprocess runner; tests supply closures.
pub trait TaskRunner {
    fn run(&self, task: &Task) -> Result<(), TaskError>;
}

impl<F> TaskRunner for F
where
    F: Fn(&Task) -> Result<(), TaskError>,
{
    fn run(&self, task: &Task) -> Result<(), TaskError> {
        self(task)
    }
}

/// Final state of one task, for reporting.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub label: String,
    pub stage: Stage,
    pub status: TaskStatus,
    pub error: Option<String>,
}

/// Aggregate outcome of an engine run.
#[derive(Debug)]
pub struct RunReport {
    pub tasks: Vec<TaskReport>,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub skipped_upstream: usize,
    pub pending: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunReport {
    /// True only when every task ended succeeded or cache-skipped.
    pub fn exit_success(&self) -> bool {
        self.failed == 0 && self.skipped_upstream == 0 && self.pending == 0 && !self.interrupted
    }
}

/// DAG scheduler with a bounded worker pool.
pub struct Engine {
    workers: usize,
    max_retries: u32,
    cancel: &'static AtomicBool,
}

impl Engine {
    pub fn new(workers: usize, max_retries: u32) -> Self {
        Self {
            workers: workers.max(1),
            max_retries,
            cancel: peakline_core::shutdown_flag(),
        }
    }

    /// Use a private cancellation flag instead of the process-wide one.
    pub fn with_cancel_flag(mut self, flag: &'static AtomicBool) -> Self {
        self.cancel = flag;
        self
    }

    /// Run the graph to completion (or interruption).
    ///
    /// Ties among eligible tasks break by submission order. Dependents of
    /// a failed task are marked without running; a fan-in task with
    /// `allow_partial_inputs` instead drops the failed producer's outputs
    /// and runs with what survived, as long as anything did.
    pub fn run<R: TaskRunner + Sync>(&self, graph: &TaskGraph, runner: &R) -> RunReport {
        let start = Instant::now();
        let n = graph.tasks.len();

        let mut status = vec![TaskStatus::Pending; n];
        let mut errors: Vec<Option<String>> = vec![None; n];
        let mut unmet: Vec<usize> = graph.deps.iter().map(Vec::len).collect();
        // Effective inputs; pruned for fan-in tasks when producers fail
        let mut inputs: Vec<Vec<PathBuf>> =
            graph.tasks.iter().map(|t| t.inputs.clone()).collect();

        let mut ready: VecDeque<usize> = (0..n).filter(|&i| unmet[i] == 0).collect();
        let semaphore = Semaphore::new(self.workers);
        let (tx, rx) = mpsc::channel::<(usize, Result<(), TaskError>)>();
        let mut in_flight = 0usize;
        let mut interrupted = false;

        std::thread::scope(|scope| {
            loop {
                // Dispatch until out of ready tasks or permits
                while !ready.is_empty() {
                    if self.cancel.load(Ordering::Relaxed) {
                        interrupted = true;
                        break;
                    }
                    let idx = *ready.front().expect("checked non-empty");

                    // Cache hit: outputs present and at least as new as
                    // every input — no permit consumed
                    if outputs_fresh(&graph.tasks[idx].outputs, &inputs[idx]) {
                        ready.pop_front();
                        status[idx] = TaskStatus::Skipped;
                        log::info!("{}: up to date, skipping", graph.tasks[idx].label());
                        on_satisfied(idx, graph, &status, &mut unmet, &mut ready);
                        continue;
                    }

                    let Some(permit) = semaphore.try_acquire() else {
                        break;
                    };
                    ready.pop_front();
                    status[idx] = TaskStatus::Running;
                    in_flight += 1;

                    let mut task = graph.tasks[idx].clone();
                    task.inputs = inputs[idx].clone();
                    let tx = tx.clone();
                    let max_retries = self.max_retries;
                    scope.spawn(move || {
                        let label = task.label();
                        log::debug!("{label}: starting");
                        let result =
                            retry_with_backoff(&label, max_retries, || runner.run(&task));
                        drop(permit);
                        let _ = tx.send((idx, result));
                    });
                }

                if in_flight == 0 {
                    // Nothing running: either done, blocked forever
                    // (impossible in an acyclic graph), or interrupted
                    break;
                }

                let (idx, result) = rx.recv().expect("worker channel closed");
                in_flight -= 1;

                match result {
                    Ok(()) => {
                        status[idx] = TaskStatus::Succeeded;
                        log::info!("{}: done", graph.tasks[idx].label());
                        on_satisfied(idx, graph, &status, &mut unmet, &mut ready);
                    }
                    Err(e) => {
                        log::error!("{}: {e}", graph.tasks[idx].label());
                        errors[idx] = Some(e.to_string());
                        status[idx] = TaskStatus::Failed;
                        on_failed(idx, graph, &mut status, &mut unmet, &mut inputs, &mut ready);
                    }
                }

                if self.cancel.load(Ordering::Relaxed) {
                    interrupted = true;
                }
            }
        });

        let mut report = RunReport {
            tasks: Vec::with_capacity(n),
            succeeded: 0,
            skipped: 0,
            failed: 0,
            skipped_upstream: 0,
            pending: 0,
            interrupted,
            elapsed: start.elapsed(),
        };
        for (idx, task) in graph.tasks.iter().enumerate() {
            match status[idx] {
                TaskStatus::Succeeded => report.succeeded += 1,
                TaskStatus::Skipped => report.skipped += 1,
                TaskStatus::Failed => report.failed += 1,
                TaskStatus::SkippedUpstream => report.skipped_upstream += 1,
                TaskStatus::Pending | TaskStatus::Running => report.pending += 1,
            }
            report.tasks.push(TaskReport {
                label: task.label(),
                stage: task.stage,
                status: status[idx],
                error: errors[idx].take(),
            });
        }
        report
    }
}

/// A task completed (succeeded or skipped): release its dependents.
fn on_satisfied(
    idx: usize,
    graph: &TaskGraph,
    status: &[TaskStatus],
    unmet: &mut [usize],
    ready: &mut VecDeque<usize>,
) {
    for &dep in &graph.dependents[idx] {
        unmet[dep] -= 1;
        if unmet[dep] == 0 && status[dep] == TaskStatus::Pending {
            ready.push_back(dep);
        }
    }
}

/// A task failed: poison its dependent subtree. Fan-in tasks drop the
/// failed producer's outputs instead, and only poison further when no
/// contributor survived.
fn on_failed(
    failed_idx: usize,
    graph: &TaskGraph,
    status: &mut [TaskStatus],
    unmet: &mut [usize],
    inputs: &mut [Vec<PathBuf>],
    ready: &mut VecDeque<usize>,
) {
    let mut stack = vec![failed_idx];
    while let Some(bad) = stack.pop() {
        for &dep in &graph.dependents[bad] {
            if graph.tasks[dep].allow_partial_inputs {
                let dropped: Vec<PathBuf> = graph.tasks[bad].outputs.clone();
                inputs[dep].retain(|p| !dropped.contains(p));
                unmet[dep] -= 1;
                if inputs[dep].is_empty() {
                    if status[dep] == TaskStatus::Pending {
                        status[dep] = TaskStatus::SkippedUpstream;
                        stack.push(dep);
                    }
                } else if unmet[dep] == 0 && status[dep] == TaskStatus::Pending {
                    log::warn!(
                        "{}: proceeding without {} failed contributor(s)",
                        graph.tasks[dep].label(),
                        graph.tasks[dep].inputs.len() - inputs[dep].len()
                    );
                    ready.push_back(dep);
                }
            } else if status[dep] == TaskStatus::Pending {
                status[dep] = TaskStatus::SkippedUpstream;
                stack.push(dep);
            }
        }
    }
}

/// Outputs all exist and the oldest is at least as new as the newest
/// input. Tasks with no inputs are fresh once their outputs exist.
fn outputs_fresh(outputs: &[PathBuf], inputs: &[PathBuf]) -> bool {
    if outputs.is_empty() {
        return false;
    }

    let mut oldest_output: Option<SystemTime> = None;
    for path in outputs {
        let Ok(mtime) = std::fs::metadata(path).and_then(|m| m.modified()) else {
            return false;
        };
        oldest_output = Some(match oldest_output {
            Some(t) if t < mtime => t,
            _ => mtime,
        });
    }

    let mut newest_input: Option<SystemTime> = None;
    for path in inputs {
        let Ok(mtime) = std::fs::metadata(path).and_then(|m| m.modified()) else {
            return false;
        };
        newest_input = Some(match newest_input {
            Some(t) if t > mtime => t,
            _ => mtime,
        });
    }

    match (oldest_output, newest_input) {
        (Some(_), None) => true,
        (Some(out), Some(inp)) => out >= inp,
        (None, _) => false,
    }
}
