//! Remote metadata manifest fetch
//!
//! Single GET against the portal's /metadata/ endpoint returning TSV.
//! The request URL comes from `files.txt`: either a full metadata URL or
//! a one-line list of file/experiment accessions that we expand into a
//! query URL. Uses async reqwest internally on a shared runtime but
//! presents a sync interface to the CLI.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Whole-response timeout; metadata exports for large selections are slow.
const FETCH_TIMEOUT: Duration = Duration::from_secs(180);

const FETCH_ATTEMPTS: u32 = 3;

const METADATA_BASE: &str = "https://www.encodeproject.org/metadata/";

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client")
});

/// Shared tokio runtime for HTTP operations.
static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Fetch the raw metadata TSV from `url`.
///
/// Retries transient failures with exponential backoff; returns the body
/// verbatim (header row included) so it can be written to disk unchanged.
pub fn fetch_metadata_tsv(url: &str) -> Result<String> {
    SHARED_RUNTIME
        .handle()
        .block_on(async { fetch_async(url).await })
}

async fn fetch_async(url: &str) -> Result<String> {
    let mut last_err = None;
    for attempt in 0..FETCH_ATTEMPTS {
        if attempt > 0 {
            let delay = Duration::from_secs(2u64 << (attempt - 1));
            log::info!(
                "retrying metadata fetch (attempt {}/{FETCH_ATTEMPTS}) after {delay:?}",
                attempt + 1
            );
            tokio::time::sleep(delay).await;
        }

        match tokio::time::timeout(FETCH_TIMEOUT, async {
            let resp = SHARED_CLIENT
                .get(url)
                .header("Accept", "text/tsv")
                .send()
                .await
                .context("failed to reach metadata endpoint")?;
            let resp = resp
                .error_for_status()
                .context("metadata endpoint returned an error status")?;
            resp.text().await.context("failed to read metadata body")
        })
        .await
        {
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(e)) => {
                log::warn!("metadata fetch failed: {e:#}");
                last_err = Some(e);
            }
            Err(_) => {
                log::warn!("metadata fetch timed out ({}s)", FETCH_TIMEOUT.as_secs());
                last_err = Some(anyhow::anyhow!(
                    "metadata fetch timed out after {}s",
                    FETCH_TIMEOUT.as_secs()
                ));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("metadata fetch failed")))
}

/// Resolve the metadata URL from a `files.txt`.
///
/// Only the first non-empty, non-comment line is read. It is either a
/// full http(s) URL (used as-is) or a whitespace/comma/semicolon
/// separated list of ENCFF/ENCSR accessions expanded into a metadata
/// query URL.
pub fn metadata_url_from_file_list(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read file list: {}", path.display()))?;

    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .with_context(|| format!("{} has no usable lines", path.display()))?;

    let line = strip_quotes(line);
    if line.starts_with("http://") || line.starts_with("https://") {
        return Ok(line.to_string());
    }
    metadata_url_from_accessions(line)
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return s[1..s.len() - 1].trim();
        }
    }
    s
}

/// `ENCFF` + 3 digits + 3 uppercase alphanumerics.
fn is_accession(token: &str, prefix: &str) -> bool {
    let upper = token.to_ascii_uppercase();
    let Some(rest) = upper.strip_prefix(prefix) else {
        return false;
    };
    rest.len() == 6
        && rest[..3].chars().all(|c| c.is_ascii_digit())
        && rest[3..].chars().all(|c| c.is_ascii_alphanumeric())
}

/// Expand an accession list into a metadata query URL.
///
/// File accessions (ENCFF) win over experiment accessions (ENCSR) when
/// both appear, matching the portal's own precedence.
pub fn metadata_url_from_accessions(line: &str) -> Result<String> {
    let tokens: Vec<&str> = line
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|t| !t.is_empty())
        .collect();

    let files: Vec<String> = tokens
        .iter()
        .filter(|t| is_accession(t, "ENCFF"))
        .map(|t| t.to_ascii_uppercase())
        .collect();
    let experiments: Vec<String> = tokens
        .iter()
        .filter(|t| is_accession(t, "ENCSR"))
        .map(|t| t.to_ascii_uppercase())
        .collect();

    let (kind, accessions) = if !files.is_empty() {
        ("File", files)
    } else if !experiments.is_empty() {
        ("Experiment", experiments)
    } else {
        bail!("file list line is neither a URL nor a valid ENCFF/ENCSR accession list: {line}");
    };

    let mut url = format!("{METADATA_BASE}?type={kind}");
    for acc in &accessions {
        url.push_str("&accession=");
        url.push_str(acc);
    }
    url.push_str("&limit=all");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_line_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.txt");
        std::fs::write(
            &path,
            "# my selection\n\n\"https://www.encodeproject.org/metadata/?type=File\"\n",
        )
        .unwrap();

        let url = metadata_url_from_file_list(&path).unwrap();
        assert_eq!(url, "https://www.encodeproject.org/metadata/?type=File");
    }

    #[test]
    fn file_accessions_expand_to_query() {
        let url = metadata_url_from_accessions("ENCFF001ABC, encff002def").unwrap();
        assert!(url.starts_with(METADATA_BASE));
        assert!(url.contains("type=File"));
        assert!(url.contains("accession=ENCFF001ABC"));
        assert!(url.contains("accession=ENCFF002DEF"));
        assert!(url.ends_with("limit=all"));
    }

    #[test]
    fn experiment_accessions_when_no_files() {
        let url = metadata_url_from_accessions("ENCSR123XYZ").unwrap();
        assert!(url.contains("type=Experiment"));
        assert!(url.contains("accession=ENCSR123XYZ"));
    }

    #[test]
    fn files_win_over_experiments() {
        let url = metadata_url_from_accessions("ENCSR123XYZ ENCFF001ABC").unwrap();
        assert!(url.contains("type=File"));
        assert!(!url.contains("ENCSR123XYZ"));
    }

    #[test]
    fn garbage_line_is_error() {
        assert!(metadata_url_from_accessions("not-an-accession").is_err());
        assert!(metadata_url_from_accessions("ENCFFXXXXXX").is_err());
    }

    #[test]
    fn accession_shape() {
        assert!(is_accession("ENCFF001ABC", "ENCFF"));
        assert!(is_accession("encff001abc", "ENCFF"));
        assert!(!is_accession("ENCFF001AB", "ENCFF"));
        assert!(!is_accession("ENCFFABCDEF", "ENCFF"));
        assert!(!is_accession("ENCSR001ABC", "ENCFF"));
    }

    #[test]
    fn missing_file_list_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(metadata_url_from_file_list(&dir.path().join("files.txt")).is_err());
    }

    #[test]
    fn empty_file_list_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.txt");
        std::fs::write(&path, "# only comments\n\n").unwrap();
        let err = metadata_url_from_file_list(&path).unwrap_err();
        assert!(err.to_string().contains("no usable lines"));
    }
}
