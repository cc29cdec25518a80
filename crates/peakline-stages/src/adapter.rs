//! Command construction for the external pipeline tools
//!
//! Adapters are pure: a task plus the tool configuration maps to an
//! `Invocation`, and exit codes map to a `TaskError` classification.
//! All filesystem work (tmp paths, renames) is owned by the runner.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use peakline_engine::{Stage, TaskError};

/// Transient curl exit codes worth a retry: couldn't resolve host (6),
/// couldn't connect (7), operation timed out (28), SSL connect error
/// (35), server returned nothing (52), network recv failure (56).
const CURL_RETRYABLE: &[i32] = &[6, 7, 28, 35, 52, 56];

/// External tool binaries and the optional chromosome restriction.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub download_client: String,
    pub peak_caller: String,
    pub compressor: String,
    pub indexer: String,
    /// Restrict bed output to one chromosome; `None` keeps everything.
    pub chromosome: Option<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            download_client: "curl".into(),
            peak_caller: "macs2".into(),
            compressor: "bgzip".into(),
            indexer: "giggle".into(),
            chromosome: None,
        }
    }
}

/// A fully-constructed external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }

    /// Rendered command line for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// In-progress artifact path alongside the final one.
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".part");
    final_path.with_file_name(name)
}

pub fn download_invocation(url: &str, tmp_output: &Path, tools: &ToolConfig) -> Invocation {
    Invocation::new(
        &tools.download_client,
        vec![
            "-L".into(),
            "--fail".into(),
            "--silent".into(),
            "--show-error".into(),
            "-o".into(),
            tmp_output.display().to_string(),
            url.to_string(),
        ],
    )
}

/// Peak caller contract: `bdgpeakcall -i <signal track> -o <narrowPeak>`
/// (the macs2 form). Tools with a different surface go behind a wrapper
/// script named in the config.
pub fn peak_call_invocation(track: &Path, tmp_output: &Path, tools: &ToolConfig) -> Invocation {
    Invocation::new(
        &tools.peak_caller,
        vec![
            "bdgpeakcall".into(),
            "-i".into(),
            track.display().to_string(),
            "-o".into(),
            tmp_output.display().to_string(),
        ],
    )
}

/// bgzip compresses in place, appending `.gz` to its argument.
pub fn compress_invocation(bed: &Path, tools: &ToolConfig) -> Invocation {
    Invocation::new(
        &tools.compressor,
        vec!["-f".into(), bed.display().to_string()],
    )
}

pub fn giggle_index_invocation(
    bed_glob: &str,
    tmp_index: &Path,
    tools: &ToolConfig,
) -> Invocation {
    Invocation::new(
        &tools.indexer,
        vec![
            "index".into(),
            "-i".into(),
            bed_glob.to_string(),
            "-o".into(),
            tmp_index.display().to_string(),
            "-f".into(),
            "-s".into(),
        ],
    )
}

/// Glob covering the bed directory, derived from the first input path.
pub fn bed_glob(inputs: &[PathBuf]) -> Option<String> {
    let parent = inputs.first()?.parent()?;
    Some(format!("{}/*.bed.gz", parent.display()))
}

/// Copy `src` (narrowPeak) to `dest` (bed), keeping only records on the
/// configured chromosome. Comments and track/browser header lines are
/// dropped. Returns the number of records written.
pub fn filter_narrow_peak(
    src: &Path,
    dest: &Path,
    chromosome: Option<&str>,
) -> std::io::Result<usize> {
    let reader = BufReader::new(std::fs::File::open(src)?);
    let mut writer = std::io::BufWriter::new(std::fs::File::create(dest)?);
    let mut written = 0usize;
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim_end();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("track")
            || trimmed.starts_with("browser")
        {
            continue;
        }
        let chrom = trimmed.split('\t').next().unwrap_or("");
        if let Some(want) = chromosome {
            if chrom != want {
                continue;
            }
        }
        writer.write_all(trimmed.as_bytes())?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Map a nonzero exit code to a task error. Only the download client's
/// transient network codes are retryable.
pub fn classify_exit(stage: Stage, code: Option<i32>, stderr_tail: &str) -> TaskError {
    let detail = |what: String| {
        if stderr_tail.is_empty() {
            what
        } else {
            format!("{what}: {stderr_tail}")
        }
    };
    match code {
        Some(code) if stage == Stage::Download && CURL_RETRYABLE.contains(&code) => {
            TaskError::Retryable(detail(format!("download client exited with code {code}")))
        }
        Some(code) => TaskError::Fatal(detail(format!("{stage} tool exited with code {code}"))),
        None => TaskError::Fatal(detail(format!("{stage} tool terminated by signal"))),
    }
}
