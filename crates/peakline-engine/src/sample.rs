//! Sample resolution: manifest records → work items
//!
//! A sample is the pipeline-local unit of work, one per processable
//! record. Records that cannot yield a download URL are excluded with a
//! diagnostic rather than failing the run.

use std::collections::BTreeSet;

use peakline_store::{FileFormat, ManifestRecord};

/// One unit of work: a remote track to download and process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub sample_id: String,
    pub download_url: String,
    pub format: FileFormat,
}

/// Result of resolving the sample set.
#[derive(Debug)]
pub struct ResolveOutcome {
    /// Ordered by sample_id, deduplicated.
    pub samples: Vec<Sample>,
    /// Records excluded for a missing/underivable download URL.
    pub excluded: usize,
}

/// Derive the download URL for a record.
///
/// The direct locator wins; otherwise the portal's canonical per-file
/// path is derived from the accession, which needs a known extension for
/// the declared format.
fn download_url(record: &ManifestRecord) -> Option<String> {
    if !record.download_locator.trim().is_empty() {
        return Some(record.download_locator.trim().to_string());
    }
    let ext = record.file_format.extension()?;
    Some(format!(
        "https://www.encodeproject.org/files/{id}/@@download/{id}.{ext}",
        id = record.resource_id
    ))
}

/// Resolve the canonical sample set from selected records.
///
/// Selection (by id list, format, assembly, etc) happens upstream in the
/// store's `SelectFilter`; this only derives URLs. Ordering is by
/// `resource_id` for deterministic graph construction; duplicate ids
/// collapse to the first occurrence.
pub fn resolve_samples(records: &[&ManifestRecord]) -> ResolveOutcome {
    let mut samples: Vec<Sample> = Vec::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut excluded = 0usize;

    for record in records {
        if !seen.insert(&record.resource_id) {
            continue;
        }

        match download_url(record) {
            Some(url) => samples.push(Sample {
                sample_id: record.resource_id.clone(),
                download_url: url,
                format: record.file_format.clone(),
            }),
            None => {
                excluded += 1;
                log::warn!(
                    "{}: no download URL and none derivable for format '{}', excluding",
                    record.resource_id,
                    record.file_format
                );
            }
        }
    }

    samples.sort_by(|a, b| a.sample_id.cmp(&b.sample_id));
    ResolveOutcome { samples, excluded }
}
