//! Error types for graph construction and task execution

use std::path::PathBuf;

/// Error from running a single task's external tool.
///
/// Retryable covers transient conditions (network hiccups during a
/// download); Fatal covers deterministic failures (nonzero exit from a
/// processing tool, output missing after a success exit).
#[derive(Debug)]
pub enum TaskError {
    Retryable(String),
    Fatal(String),
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retryable(msg) => write!(f, "transient: {msg}"),
            Self::Fatal(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TaskError {}

impl TaskError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Structural defect detected while building the task graph.
/// Aborts the run before anything executes.
#[derive(Debug)]
pub enum GraphError {
    /// Two tasks claim the same output artifact (sample id collision).
    DuplicateOutput { path: PathBuf },
    /// Dependency cycle — cannot happen with the linear per-sample
    /// chains this builder emits, but checked rather than assumed.
    Cycle,
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateOutput { path } => {
                write!(f, "duplicate output artifact: {}", path.display())
            }
            Self::Cycle => write!(f, "task graph contains a dependency cycle"),
        }
    }
}

impl std::error::Error for GraphError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(TaskError::Retryable("timeout".into()).is_retryable());
        assert!(!TaskError::Fatal("exit 1".into()).is_retryable());
    }

    #[test]
    fn display_includes_message() {
        let e = TaskError::Fatal("peak caller exited with 2".into());
        assert!(format!("{e}").contains("exited with 2"));

        let e = TaskError::Retryable("connection reset".into());
        assert!(format!("{e}").contains("transient"));
    }
}
