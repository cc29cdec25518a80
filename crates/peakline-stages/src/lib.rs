//! peakline-stages: adapters and subprocess execution for the external
//! pipeline tools (download client, peak caller, compressor, indexer).
//!
//! Command construction is pure and unit-testable; the `SubprocessRunner`
//! owns process spawning, tmp-then-rename output commits, and exit-code
//! classification into retryable vs fatal.

pub mod adapter;
pub mod runner;

pub use adapter::{Invocation, ToolConfig};
pub use runner::SubprocessRunner;
