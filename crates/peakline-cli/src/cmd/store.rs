//! `peakline build-store` / `peakline unlock` - manifest store maintenance

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use peakline_store::{ManifestStore, force_unlock, parse_metadata_tsv};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct BuildStoreArgs {
    /// Metadata TSV to merge (default: the configured metadata path)
    #[arg(long)]
    pub metadata: Option<PathBuf>,
}

pub fn build_store(args: BuildStoreArgs, config: &Config) -> Result<()> {
    let tsv_path = args
        .metadata
        .unwrap_or_else(|| config.store.metadata_tsv_path());
    let text = std::fs::read_to_string(&tsv_path)
        .with_context(|| format!("reading {}", tsv_path.display()))?;
    let records = parse_metadata_tsv(&text)
        .with_context(|| format!("parsing {}", tsv_path.display()))?;
    log::info!("Parsed {} record(s) from {}", records.len(), tsv_path.display());

    let table = config.store.table_path();
    let mut store = ManifestStore::open(&table)?;
    let result = store.merge(records)?;

    println!("{}: {result}", table.display());
    Ok(())
}

pub fn unlock(config: &Config) -> Result<()> {
    let table = config.store.table_path();
    if force_unlock(&table)? {
        println!("Removed lock for {}", table.display());
    } else {
        println!("No lock held for {}", table.display());
    }
    Ok(())
}
