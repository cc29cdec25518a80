//! Configuration loading from TOML files

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use peakline_engine::PipelineLayout;
use peakline_stages::ToolConfig;

/// Global configuration for peakline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub tools: ToolsConfig,
    pub dirs: DirsConfig,
    pub workers: WorkersConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base data directory; the store files live directly under it.
    pub dir: PathBuf,
    /// Manifest table file name.
    pub table: String,
    /// Raw fetched TSV file name.
    pub metadata_tsv: String,
    /// File list naming the metadata source (URL or accessions).
    pub file_list: String,
    /// Optional selection manifest restricting the sample set.
    pub selection_tsv: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
            table: "metadata.json".to_string(),
            metadata_tsv: "metadata.tsv".to_string(),
            file_list: "files.txt".to_string(),
            selection_tsv: None,
        }
    }
}

impl StoreConfig {
    pub fn table_path(&self) -> PathBuf {
        self.dir.join(&self.table)
    }

    pub fn metadata_tsv_path(&self) -> PathBuf {
        self.dir.join(&self.metadata_tsv)
    }

    pub fn file_list_path(&self) -> PathBuf {
        self.dir.join(&self.file_list)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub download_client: String,
    pub peak_caller: String,
    pub compressor: String,
    pub indexer: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            download_client: "curl".to_string(),
            peak_caller: "macs2".to_string(),
            compressor: "bgzip".to_string(),
            indexer: "giggle".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirsConfig {
    pub tracks: PathBuf,
    pub peaks: PathBuf,
    pub beds: PathBuf,
    pub index: PathBuf,
}

impl Default for DirsConfig {
    fn default() -> Self {
        Self {
            tracks: PathBuf::from("./data/tracks"),
            peaks: PathBuf::from("./data/peaks"),
            beds: PathBuf::from("./data/beds"),
            index: PathBuf::from("./data/index"),
        }
    }
}

impl DirsConfig {
    pub fn layout(&self) -> PipelineLayout {
        PipelineLayout {
            tracks_dir: self.tracks.clone(),
            peaks_dir: self.peaks.clone(),
            beds_dir: self.beds.clone(),
            index_dir: self.index.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub default: usize,
    pub max: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            default: cpus.min(8),
            max: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Restrict bed output to this chromosome; empty = unrestricted.
    pub chromosome: String,
    /// Genome assembly records must match (e.g. GRCh38).
    pub assembly: Option<String>,
    /// Experiment target filter.
    pub target: Option<String>,
    pub max_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chromosome: String::new(),
            assembly: None,
            target: None,
            max_retries: 3,
        }
    }
}

impl Config {
    /// Tool configuration for the stage adapters.
    pub fn tool_config(&self) -> ToolConfig {
        ToolConfig {
            download_client: self.tools.download_client.clone(),
            peak_caller: self.tools.peak_caller.clone(),
            compressor: self.tools.compressor.clone(),
            indexer: self.tools.indexer.clone(),
            chromosome: match self.pipeline.chromosome.trim() {
                "" => None,
                chrom => Some(chrom.to_string()),
            },
        }
    }

    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./peakline.toml (current directory)
    /// 2. ~/.config/peakline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("peakline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "peakline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
