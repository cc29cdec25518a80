//! peakline-engine: Orchestration core for the peak-calling pipeline
//!
//! Derives the sample set from the manifest store, builds the per-run
//! task DAG (download → peak_call → bed_convert, fanning into one index
//! task), and executes it with a bounded worker pool. The graph is
//! rebuilt from scratch every run; freshness comes from artifact
//! existence and timestamps, so a crashed run resumes for free.

pub mod engine;
pub mod error;
pub mod graph;
pub mod retry;
pub mod sample;
pub mod task;

pub use engine::{Engine, RunReport, TaskReport, TaskRunner};
pub use error::{GraphError, TaskError};
pub use graph::{PipelineLayout, TaskGraph};
pub use retry::{backoff_duration, retry_with_backoff};
pub use sample::{ResolveOutcome, Sample, resolve_samples};
pub use task::{Stage, Task, TaskStatus};
