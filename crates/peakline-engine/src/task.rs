//! Task model: stages, DAG nodes, execution status

use std::path::PathBuf;

/// Pipeline stage a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Download,
    PeakCall,
    BedConvert,
    GiggleIndex,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::PeakCall => "peak_call",
            Self::BedConvert => "bed_convert",
            Self::GiggleIndex => "giggle_index",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A node in the execution DAG.
///
/// Inputs and outputs are artifact paths; edges between tasks are derived
/// by matching inputs against producer outputs. Tasks are rebuilt every
/// run and never persisted.
#[derive(Debug, Clone)]
pub struct Task {
    pub stage: Stage,
    /// None for the aggregate index task.
    pub sample_id: Option<String>,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    /// Fan-in task that may proceed with a reduced input set when some
    /// producers failed (at least one must survive).
    pub allow_partial_inputs: bool,
}

impl Task {
    /// Human-readable label for logs and progress lines.
    pub fn label(&self) -> String {
        match &self.sample_id {
            Some(id) => format!("{} {id}", self.stage),
            None => self.stage.to_string(),
        }
    }
}

/// Execution status, owned exclusively by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Outputs already present and fresh — external tool not re-invoked.
    Skipped,
    /// Not run because a dependency failed.
    SkippedUpstream,
}

impl TaskStatus {
    /// Whether dependents may treat this task's outputs as available.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::SkippedUpstream => "skipped (upstream failed)",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_label() {
        let t = Task {
            stage: Stage::PeakCall,
            sample_id: Some("ENCFF001ABC".into()),
            inputs: vec![],
            outputs: vec![],
            allow_partial_inputs: false,
        };
        assert_eq!(t.label(), "peak_call ENCFF001ABC");

        let idx = Task {
            stage: Stage::GiggleIndex,
            sample_id: None,
            inputs: vec![],
            outputs: vec![],
            allow_partial_inputs: true,
        };
        assert_eq!(idx.label(), "giggle_index");
    }

    #[test]
    fn satisfies_dependents() {
        assert!(TaskStatus::Succeeded.satisfies_dependents());
        assert!(TaskStatus::Skipped.satisfies_dependents());
        assert!(!TaskStatus::Failed.satisfies_dependents());
        assert!(!TaskStatus::Pending.satisfies_dependents());
    }
}
