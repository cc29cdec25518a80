//! Manifest records and ENCODE metadata TSV parsing
//!
//! The metadata export uses human-readable headers that have shifted over
//! time ("File accession" vs "Accession", etc), so each field resolves
//! through a list of known aliases, mirroring what the portal emits.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declared format of a remote file resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Genomic signal track (bigWig) — the pipeline's processable input.
    SignalTrack,
    /// Read alignment (bam).
    Alignment,
    /// Anything else; kept in the store but not processed.
    Other(String),
}

impl FileFormat {
    /// Map an ENCODE format label to the enum.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "bigwig" | "bw" => Self::SignalTrack,
            "bam" => Self::Alignment,
            other => Self::Other(other.to_string()),
        }
    }

    /// File extension used when deriving download URLs.
    pub fn extension(&self) -> Option<&str> {
        match self {
            Self::SignalTrack => Some("bigWig"),
            Self::Alignment => Some("bam"),
            Self::Other(_) => None,
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SignalTrack => write!(f, "bigWig"),
            Self::Alignment => write!(f, "bam"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// One row of the manifest store: a single remote file resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Stable external identifier (file accession) — unique store key.
    pub resource_id: String,
    pub file_format: FileFormat,
    pub assembly: String,
    pub cell_type: String,
    pub target: Option<String>,
    /// Direct download URL; may be empty, in which case the resolver
    /// derives one from the accession.
    pub download_locator: String,
    /// When this record was first merged into the store.
    pub created_at: DateTime<Utc>,
}

impl ManifestRecord {
    /// Content comparison for merge: every field except `created_at`.
    pub fn content_eq(&self, other: &Self) -> bool {
        self.resource_id == other.resource_id
            && self.file_format == other.file_format
            && self.assembly == other.assembly
            && self.cell_type == other.cell_type
            && self.target == other.target
            && self.download_locator == other.download_locator
    }
}

/// Known header aliases per field, in preference order.
const ACCESSION_ALIASES: &[&str] = &["File accession", "Accession", "accession", "accession_id"];
const LOCATOR_ALIASES: &[&str] = &["File download URL", "download_url", "href", "file href"];
const FORMAT_ALIASES: &[&str] = &["File format", "Format", "format"];
const ASSEMBLY_ALIASES: &[&str] = &["Assembly", "assembly", "genome assembly"];
const CELL_TYPE_ALIASES: &[&str] = &["Biosample term name", "Biosample summary", "cell_type"];
const TARGET_ALIASES: &[&str] = &["Experiment target", "Target label", "Target", "target"];

fn find_column(header: &[&str], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| header.iter().position(|h| h.eq_ignore_ascii_case(alias)))
}

/// Parse a raw metadata TSV (header row + data rows) into records.
///
/// Unrecognized columns are ignored. A header missing the accession or
/// format column is a hard error; a data row with an empty accession is
/// skipped with a warning.
pub fn parse_metadata_tsv(text: &str) -> Result<Vec<ManifestRecord>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let header_line = match lines.next() {
        Some(l) => l,
        None => bail!("metadata TSV is empty"),
    };
    let header: Vec<&str> = header_line.split('\t').map(str::trim).collect();

    let col_accession = find_column(&header, ACCESSION_ALIASES)
        .ok_or_else(|| missing_column("file accession", ACCESSION_ALIASES))?;
    let col_format = find_column(&header, FORMAT_ALIASES)
        .ok_or_else(|| missing_column("file format", FORMAT_ALIASES))?;
    let col_locator = find_column(&header, LOCATOR_ALIASES);
    let col_assembly = find_column(&header, ASSEMBLY_ALIASES);
    let col_cell_type = find_column(&header, CELL_TYPE_ALIASES);
    let col_target = find_column(&header, TARGET_ALIASES);

    let now = Utc::now();
    let mut records = Vec::new();

    for line in lines {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        let get = |col: Option<usize>| -> String {
            col.and_then(|i| fields.get(i)).unwrap_or(&"").to_string()
        };

        let resource_id = get(Some(col_accession));
        if resource_id.is_empty() {
            log::warn!("metadata row with empty accession skipped");
            continue;
        }

        let target = {
            let t = get(col_target);
            if t.is_empty() { None } else { Some(t) }
        };

        records.push(ManifestRecord {
            resource_id,
            file_format: FileFormat::from_label(&get(Some(col_format))),
            assembly: get(col_assembly),
            cell_type: get(col_cell_type),
            target,
            download_locator: get(col_locator),
            created_at: now,
        });
    }

    Ok(records)
}

fn missing_column(name: &str, aliases: &[&str]) -> anyhow::Error {
    anyhow::anyhow!(
        "required column not found: {name} (tried aliases: {})",
        aliases.join(", ")
    )
}
