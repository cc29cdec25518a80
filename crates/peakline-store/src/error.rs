//! Store error type

use std::time::Duration;

/// Error from opening, locking, or merging into the manifest store.
#[derive(Debug)]
pub enum StoreError {
    /// Another writer holds the advisory lock.
    Locked { pid: u32, held_for: Duration },
    /// Filesystem failure — an interrupted merge leaves the previous
    /// table file untouched.
    Io(std::io::Error),
    /// The table file exists but cannot be parsed.
    Corrupt(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locked { pid, held_for } => write!(
                f,
                "store is locked by pid {pid} (held for {}s); \
                 retry later or run `peakline unlock`",
                held_for.as_secs()
            ),
            Self::Io(e) => write!(f, "store IO: {e}"),
            Self::Corrupt(msg) => write!(f, "store table corrupt: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
