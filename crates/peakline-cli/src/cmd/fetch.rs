//! `peakline fetch` - fetch the raw metadata TSV

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use peakline_store::fetch::{fetch_metadata_tsv, metadata_url_from_file_list};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Metadata URL (default: derived from the configured file list)
    #[arg(long)]
    pub url: Option<String>,

    /// Where to write the TSV (default: the configured metadata path)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: FetchArgs, config: &Config) -> Result<()> {
    let url = match args.url {
        Some(url) => url,
        None => metadata_url_from_file_list(&config.store.file_list_path())?,
    };
    log::info!("Fetching metadata from {url}");

    let tsv = fetch_metadata_tsv(&url)?;
    let output = args
        .output
        .unwrap_or_else(|| config.store.metadata_tsv_path());
    write_atomic(&output, &tsv)?;

    let rows = tsv.lines().count().saturating_sub(1);
    log::info!("Wrote {rows} metadata row(s) to {}", output.display());
    println!("{}: {rows} row(s)", output.display());
    Ok(())
}

/// Write via a sibling tmp file and rename, so a failed fetch never
/// truncates the previous TSV.
pub(crate) fn write_atomic(path: &PathBuf, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = path.with_extension("tsv.tmp");
    std::fs::write(&tmp, content).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("moving {} into place", path.display()))?;
    Ok(())
}
