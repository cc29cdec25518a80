//! Cooperative shutdown flag, set from the signal handler

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide shutdown flag. The CLI's SIGINT/SIGTERM handler sets it;
/// the execution engine polls it before dispatching new tasks.
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}
