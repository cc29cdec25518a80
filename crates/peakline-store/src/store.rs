//! File-backed manifest table with idempotent merge
//!
//! A single JSON file holds the whole table keyed by `resource_id`.
//! Merges load-modify-write under the advisory lock; the write goes to a
//! `.tmp` sibling and is renamed into place, so a failed merge leaves the
//! previous table intact.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::lock::StoreLock;
use crate::record::{FileFormat, ManifestRecord};

/// Outcome of a merge batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeResult {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl std::fmt::Display for MergeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} unchanged",
            self.inserted, self.updated, self.unchanged
        )
    }
}

/// Record predicate for `select`. Empty filter matches everything.
#[derive(Debug, Default, Clone)]
pub struct SelectFilter {
    pub format: Option<FileFormat>,
    pub assembly: Option<String>,
    pub target: Option<String>,
    /// Non-empty = record's cell type must be one of these.
    pub cell_types: Vec<String>,
    /// Present = record id must be in the set (selection manifest).
    pub ids: Option<BTreeSet<String>>,
}

impl SelectFilter {
    pub fn matches(&self, record: &ManifestRecord) -> bool {
        if let Some(ref fmt) = self.format {
            if record.file_format != *fmt {
                return false;
            }
        }
        if let Some(ref assembly) = self.assembly {
            if !record.assembly.eq_ignore_ascii_case(assembly) {
                return false;
            }
        }
        if let Some(ref target) = self.target {
            match record.target {
                Some(ref t) if t.eq_ignore_ascii_case(target) => {}
                _ => return false,
            }
        }
        if !self.cell_types.is_empty()
            && !self
                .cell_types
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&record.cell_type))
        {
            return false;
        }
        if let Some(ref ids) = self.ids {
            if !ids.contains(&record.resource_id) {
                return false;
            }
        }
        true
    }
}

/// Append-only manifest table keyed by `resource_id`.
pub struct ManifestStore {
    path: PathBuf,
    records: BTreeMap<String, ManifestRecord>,
}

impl ManifestStore {
    /// Open the store at `path`, loading the table if it exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let records = match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).map_err(|e| {
                StoreError::Corrupt(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Merge a batch of records, set-union keyed by `resource_id`.
    ///
    /// On key collision the incoming record replaces the stored one only
    /// if any non-key field differs (the stored `created_at` survives an
    /// unchanged re-ingest). The whole batch commits atomically; repeating
    /// the same batch reports everything unchanged.
    pub fn merge(&mut self, rows: Vec<ManifestRecord>) -> Result<MergeResult, StoreError> {
        let _lock = StoreLock::acquire(&self.path)?;

        let mut result = MergeResult::default();
        let mut staged = self.records.clone();

        for row in rows {
            match staged.get(&row.resource_id) {
                None => {
                    staged.insert(row.resource_id.clone(), row);
                    result.inserted += 1;
                }
                Some(existing) if existing.content_eq(&row) => {
                    result.unchanged += 1;
                }
                Some(existing) => {
                    // Replace, no history; keep the original ingest time
                    let mut row = row;
                    row.created_at = existing.created_at;
                    staged.insert(row.resource_id.clone(), row);
                    result.updated += 1;
                }
            }
        }

        self.persist(&staged)?;
        self.records = staged;
        Ok(result)
    }

    /// Records matching the filter, ordered by `resource_id`.
    pub fn select(&self, filter: &SelectFilter) -> Vec<&ManifestRecord> {
        self.records
            .values()
            .filter(|r| filter.matches(r))
            .collect()
    }

    pub fn get(&self, resource_id: &str) -> Option<&ManifestRecord> {
        self.records.get(resource_id)
    }

    /// Write the table to `.tmp` and rename over the old file.
    fn persist(&self, records: &BTreeMap<String, ManifestRecord>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_metadata_tsv;

    fn sample_rows() -> Vec<ManifestRecord> {
        parse_metadata_tsv(
            "File accession\tFile format\tAssembly\tBiosample term name\tExperiment target\tFile download URL\n\
ENCFF001ABC\tbigWig\tGRCh38\tK562\tCTCF-human\thttps://example.org/a.bigWig\n\
ENCFF002DEF\tbigWig\tGRCh38\tHepG2\tPOLR2A-human\thttps://example.org/b.bigWig\n\
ENCFF003GHI\tbam\thg19\tK562\t\thttps://example.org/c.bam\n",
        )
        .unwrap()
    }

    #[test]
    fn merge_inserts_fresh_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::open(&dir.path().join("metadata.json")).unwrap();

        let result = store.merge(sample_rows()).unwrap();
        assert_eq!(result.inserted, 3);
        assert_eq!(result.updated, 0);
        assert_eq!(result.unchanged, 0);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn merge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::open(&dir.path().join("metadata.json")).unwrap();

        store.merge(sample_rows()).unwrap();
        let second = store.merge(sample_rows()).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 3);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn merge_replaces_changed_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::open(&dir.path().join("metadata.json")).unwrap();
        store.merge(sample_rows()).unwrap();

        let mut rows = sample_rows();
        rows[0].download_locator = "https://example.org/moved.bigWig".into();
        let result = store.merge(rows).unwrap();
        assert_eq!(result.updated, 1);
        assert_eq!(result.unchanged, 2);
        assert_eq!(
            store.get("ENCFF001ABC").unwrap().download_locator,
            "https://example.org/moved.bigWig"
        );
    }

    #[test]
    fn table_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");

        let mut store = ManifestStore::open(&path).unwrap();
        store.merge(sample_rows()).unwrap();
        drop(store);

        let reopened = ManifestStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 3);
        assert!(reopened.get("ENCFF002DEF").is_some());
    }

    #[test]
    fn open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::open(&dir.path().join("nope.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn open_corrupt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(&path, b"{ not json").unwrap();

        match ManifestStore::open(&path) {
            Err(StoreError::Corrupt(_)) => {}
            other => panic!("expected Corrupt, got {:?}", other.err()),
        }
    }

    #[test]
    fn merge_fails_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let mut store = ManifestStore::open(&path).unwrap();

        let _held = StoreLock::acquire(&path).unwrap();
        match store.merge(sample_rows()) {
            Err(StoreError::Locked { .. }) => {}
            other => panic!("expected Locked, got {:?}", other.err()),
        }
        // Nothing committed
        assert!(store.is_empty());
    }

    #[test]
    fn select_by_format_and_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::open(&dir.path().join("metadata.json")).unwrap();
        store.merge(sample_rows()).unwrap();

        let filter = SelectFilter {
            format: Some(FileFormat::SignalTrack),
            assembly: Some("GRCh38".into()),
            ..Default::default()
        };
        let hits = store.select(&filter);
        assert_eq!(hits.len(), 2);
        // Ordered by resource_id
        assert_eq!(hits[0].resource_id, "ENCFF001ABC");
        assert_eq!(hits[1].resource_id, "ENCFF002DEF");
    }

    #[test]
    fn select_by_cell_type_membership() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::open(&dir.path().join("metadata.json")).unwrap();
        store.merge(sample_rows()).unwrap();

        let filter = SelectFilter {
            cell_types: vec!["k562".into()],
            ..Default::default()
        };
        let hits = store.select(&filter);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|r| r.cell_type == "K562"));
    }

    #[test]
    fn select_by_id_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::open(&dir.path().join("metadata.json")).unwrap();
        store.merge(sample_rows()).unwrap();

        let filter = SelectFilter {
            ids: Some(BTreeSet::from(["ENCFF003GHI".to_string()])),
            ..Default::default()
        };
        let hits = store.select(&filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].resource_id, "ENCFF003GHI");
    }

    #[test]
    fn select_by_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::open(&dir.path().join("metadata.json")).unwrap();
        store.merge(sample_rows()).unwrap();

        let filter = SelectFilter {
            target: Some("ctcf-human".into()),
            ..Default::default()
        };
        let hits = store.select(&filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].resource_id, "ENCFF001ABC");
    }

    #[test]
    fn empty_filter_matches_all() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::open(&dir.path().join("metadata.json")).unwrap();
        store.merge(sample_rows()).unwrap();
        assert_eq!(store.select(&SelectFilter::default()).len(), 3);
    }
}
