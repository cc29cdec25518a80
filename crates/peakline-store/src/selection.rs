//! Selection manifest parsing
//!
//! The web UI writes a TSV of chosen accessions (one per line, first
//! column). When present, the resolver restricts the run to this subset.

use std::collections::BTreeSet;

/// Header labels the UI is known to emit; skipped if present.
const HEADER_LABELS: &[&str] = &["resource_id", "File accession", "accession"];

/// Parse a selection TSV into the set of chosen resource ids.
///
/// Comments (`#`) and blank lines are ignored; a leading header row is
/// detected by label and dropped.
pub fn parse_selection_tsv(text: &str) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    let mut header_candidate = true;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let first = line.split('\t').next().unwrap_or("").trim();
        if first.is_empty() {
            continue;
        }
        // Only the first data-bearing line can be a header.
        if header_candidate {
            header_candidate = false;
            if HEADER_LABELS.iter().any(|h| first.eq_ignore_ascii_case(h)) {
                continue;
            }
        }
        ids.insert(first.to_string());
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_list() {
        let ids = parse_selection_tsv("ENCFF001ABC\nENCFF002DEF\n");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("ENCFF001ABC"));
    }

    #[test]
    fn skips_header_comments_and_blanks() {
        let ids = parse_selection_tsv(
            "File accession\n# chosen via UI\n\nENCFF001ABC\textra col\nENCFF001ABC\n",
        );
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("ENCFF001ABC"));
    }

    #[test]
    fn header_after_comments_still_dropped() {
        let ids = parse_selection_tsv("# exported 2026-03-01\n\nFile accession\nENCFF001ABC\n");
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("ENCFF001ABC"));
    }

    #[test]
    fn header_labels_past_first_row_are_kept_as_ids() {
        // Once a real id has been seen, a later line matching a header
        // label is treated as data, not silently dropped.
        let ids = parse_selection_tsv("ENCFF001ABC\naccession\n");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("accession"));
    }

    #[test]
    fn empty_input_empty_set() {
        assert!(parse_selection_tsv("").is_empty());
        assert!(parse_selection_tsv("# nothing chosen\n").is_empty());
    }
}
