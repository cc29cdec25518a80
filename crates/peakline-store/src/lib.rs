//! peakline-store: Persistent manifest store for the peak-calling pipeline
//!
//! Holds one record per remote file resource, keyed by accession, with
//! idempotent merge of freshly fetched metadata. A single JSON table file
//! backs the store; merges commit atomically via tmp-then-rename and are
//! serialized by an advisory lock file.

pub mod error;
pub mod fetch;
pub mod lock;
pub mod record;
pub mod selection;
pub mod store;

pub use error::StoreError;
pub use lock::{StoreLock, force_unlock};
pub use record::{FileFormat, ManifestRecord, parse_metadata_tsv};
pub use selection::parse_selection_tsv;
pub use store::{ManifestStore, MergeResult, SelectFilter};
