//! Peakline Core - Common infrastructure for the peak-calling pipeline
//!
//! Shared pieces used by the store, engine, and CLI crates: logging,
//! graceful shutdown, worker-pool limiting, and progress display.

pub mod logging;
pub mod progress;
pub mod semaphore;
pub mod shutdown;

// Re-exports for convenience
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress};
pub use semaphore::{Semaphore, SemaphoreGuard};
pub use shutdown::{is_shutdown_requested, request_shutdown, shutdown_flag};
