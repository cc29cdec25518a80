//! Advisory write lock for the manifest store
//!
//! A lock file next to the table file serializes writers; readers never
//! take it. A crashed writer leaves the file behind, so `force_unlock`
//! exists for recovery — it warns about the recorded holder instead of
//! silently clearing.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Held advisory lock; released (file removed) on drop.
pub struct StoreLock {
    path: PathBuf,
}

/// Lock file path for a given table file.
pub fn lock_path(table_path: &Path) -> PathBuf {
    let mut name = table_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    name.push_str(".lock");
    table_path.with_file_name(name)
}

impl StoreLock {
    /// Take the exclusive writer lock, failing if another writer holds it.
    pub fn acquire(table_path: &Path) -> Result<Self, StoreError> {
        let path = lock_path(table_path);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let info = LockInfo {
                    pid: std::process::id(),
                    acquired_at: Utc::now(),
                };
                let json = serde_json::to_string(&info)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                file.write_all(json.as_bytes())?;
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let (pid, held_for) = read_holder(&path);
                Err(StoreError::Locked { pid, held_for })
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("failed to remove lock file {}: {e}", self.path.display());
        }
    }
}

fn read_holder(path: &Path) -> (u32, Duration) {
    let info: Option<LockInfo> = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok());
    match info {
        Some(info) => {
            let age = (Utc::now() - info.acquired_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            (info.pid, age)
        }
        None => (0, Duration::ZERO),
    }
}

/// Whether the recorded holder process still exists.
///
/// Only answerable on Linux via /proc; elsewhere we assume it might be.
fn holder_may_be_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    #[cfg(target_os = "linux")]
    {
        Path::new(&format!("/proc/{pid}")).exists()
    }
    #[cfg(not(target_os = "linux"))]
    {
        true
    }
}

/// Remove a stale writer lock, warning about the recorded holder.
///
/// Returns `true` if a lock file was removed, `false` if none existed.
pub fn force_unlock(table_path: &Path) -> Result<bool, StoreError> {
    let path = lock_path(table_path);
    if !path.exists() {
        return Ok(false);
    }

    let (pid, held_for) = read_holder(&path);
    if holder_may_be_alive(pid) {
        log::warn!(
            "lock holder pid {pid} may still be running (lock held {}s); \
             unlocking anyway — a live writer could corrupt the store",
            held_for.as_secs()
        );
    } else {
        log::warn!(
            "clearing stale lock left by pid {pid} ({}s old)",
            held_for.as_secs()
        );
    }

    std::fs::remove_file(&path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("metadata.json");

        let lock = StoreLock::acquire(&table).unwrap();
        assert!(lock_path(&table).exists());
        drop(lock);
        assert!(!lock_path(&table).exists());
    }

    #[test]
    fn second_writer_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("metadata.json");

        let _held = StoreLock::acquire(&table).unwrap();
        match StoreLock::acquire(&table) {
            Err(StoreError::Locked { pid, .. }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected Locked, got {:?}", other.err()),
        }
    }

    #[test]
    fn force_unlock_removes_lock() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("metadata.json");

        let lock = StoreLock::acquire(&table).unwrap();
        std::mem::forget(lock); // simulate a crashed writer

        assert!(force_unlock(&table).unwrap());
        assert!(!lock_path(&table).exists());
        // Lock can be re-acquired now
        let _relock = StoreLock::acquire(&table).unwrap();
    }

    #[test]
    fn force_unlock_without_lock() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("metadata.json");
        assert!(!force_unlock(&table).unwrap());
    }

    #[test]
    fn unreadable_lock_reports_pid_zero() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("metadata.json");
        std::fs::write(lock_path(&table), b"garbage").unwrap();

        match StoreLock::acquire(&table) {
            Err(StoreError::Locked { pid, .. }) => assert_eq!(pid, 0),
            other => panic!("expected Locked, got {:?}", other.err()),
        }
    }
}
