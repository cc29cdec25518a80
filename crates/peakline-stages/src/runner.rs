//! Subprocess execution of planned invocations
//!
//! Every stage writes to an in-progress path first and renames into
//! place only after the tool exited cleanly and the output actually
//! exists, so interrupted runs never leave half-written artifacts where
//! the freshness check would trust them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use peakline_engine::{Sample, Stage, Task, TaskError, TaskRunner};

use crate::adapter::{
    ToolConfig, bed_glob, classify_exit, compress_invocation, download_invocation,
    filter_narrow_peak, giggle_index_invocation, partial_path, peak_call_invocation, Invocation,
};

/// Runs each task by invoking the configured external tool.
pub struct SubprocessRunner {
    tools: ToolConfig,
    /// sample_id -> download URL, from the resolver.
    urls: BTreeMap<String, String>,
}

impl SubprocessRunner {
    pub fn new(tools: ToolConfig, samples: &[Sample]) -> Self {
        let urls = samples
            .iter()
            .map(|s| (s.sample_id.clone(), s.download_url.clone()))
            .collect();
        Self { tools, urls }
    }

    fn run_download(&self, task: &Task) -> Result<(), TaskError> {
        let output = single_output(task)?;
        let sample_id = task
            .sample_id
            .as_deref()
            .ok_or_else(|| TaskError::Fatal("download task without a sample id".into()))?;
        let url = self
            .urls
            .get(sample_id)
            .ok_or_else(|| TaskError::Fatal(format!("no download url for {sample_id}")))?;

        let tmp = partial_path(output);
        ensure_parent(output)?;
        run_command(
            &download_invocation(url, &tmp, &self.tools),
            Stage::Download,
        )?;
        commit(&tmp, output)
    }

    fn run_peak_call(&self, task: &Task) -> Result<(), TaskError> {
        let input = single_input(task)?;
        let output = single_output(task)?;
        let tmp = partial_path(output);
        ensure_parent(output)?;
        run_command(
            &peak_call_invocation(input, &tmp, &self.tools),
            Stage::PeakCall,
        )?;
        commit(&tmp, output)
    }

    fn run_bed_convert(&self, task: &Task) -> Result<(), TaskError> {
        let input = single_input(task)?;
        let output = single_output(task)?;
        ensure_parent(output)?;

        // Chromosome trim happens in-process; the external tool only
        // compresses. bgzip appends .gz to its argument, so the trimmed
        // bed carries the .part marker before the .bed extension.
        let trimmed = output.with_file_name(format!(
            "{}.part.bed",
            stem_without_bed_gz(output)
        ));
        let kept = filter_narrow_peak(input, &trimmed, self.tools.chromosome.as_deref())
            .map_err(|e| TaskError::Fatal(format!("filtering {}: {e}", input.display())))?;
        log::debug!(
            "bed_convert {}: kept {kept} record(s)",
            task.sample_id.as_deref().unwrap_or("?")
        );

        let result = run_command(&compress_invocation(&trimmed, &self.tools), Stage::BedConvert);
        if result.is_err() {
            let _ = std::fs::remove_file(&trimmed);
        }
        result?;

        let compressed = trimmed.with_file_name(format!(
            "{}.gz",
            trimmed.file_name().unwrap_or_default().to_string_lossy()
        ));
        commit(&compressed, output)
    }

    fn run_giggle_index(&self, task: &Task) -> Result<(), TaskError> {
        let output = single_output(task)?;
        let glob = bed_glob(&task.inputs)
            .ok_or_else(|| TaskError::Fatal("index task has no bed inputs".into()))?;

        // The indexer globs the whole bed directory, so beds left behind
        // by earlier runs get indexed too; surface that before it happens
        if let Some(dir) = task.inputs.first().and_then(|p| p.parent()) {
            let extras = stray_beds(dir, &task.inputs);
            if !extras.is_empty() {
                log::warn!(
                    "{} bed file(s) in {} are not part of this run but will be indexed: {}",
                    extras.len(),
                    dir.display(),
                    extras
                        .iter()
                        .filter_map(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }

        let tmp = partial_path(output);
        if tmp.exists() {
            std::fs::remove_dir_all(&tmp)
                .map_err(|e| TaskError::Fatal(format!("clearing {}: {e}", tmp.display())))?;
        }
        run_command(
            &giggle_index_invocation(&glob, &tmp, &self.tools),
            Stage::GiggleIndex,
        )?;

        // Replace any previous index wholesale
        if output.exists() {
            std::fs::remove_dir_all(output)
                .map_err(|e| TaskError::Fatal(format!("clearing {}: {e}", output.display())))?;
        }
        commit(&tmp, output)
    }
}

impl TaskRunner for SubprocessRunner {
    fn run(&self, task: &Task) -> Result<(), TaskError> {
        match task.stage {
            Stage::Download => self.run_download(task),
            Stage::PeakCall => self.run_peak_call(task),
            Stage::BedConvert => self.run_bed_convert(task),
            Stage::GiggleIndex => self.run_giggle_index(task),
        }
    }
}

fn single_input(task: &Task) -> Result<&Path, TaskError> {
    task.inputs
        .first()
        .map(PathBuf::as_path)
        .ok_or_else(|| TaskError::Fatal(format!("{} has no input", task.label())))
}

fn single_output(task: &Task) -> Result<&Path, TaskError> {
    task.outputs
        .first()
        .map(PathBuf::as_path)
        .ok_or_else(|| TaskError::Fatal(format!("{} has no output", task.label())))
}

fn ensure_parent(path: &Path) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| TaskError::Fatal(format!("creating {}: {e}", parent.display())))?;
    }
    Ok(())
}

/// `ENCFF001ABC.bed.gz` -> `ENCFF001ABC`
fn stem_without_bed_gz(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(".bed.gz").unwrap_or(&name).to_string()
}

/// Compressed beds in `dir` that are not inputs of the current index
/// task (left behind by earlier selections or failed cleanups).
fn stray_beds(dir: &Path, inputs: &[PathBuf]) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut extras: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().ends_with(".bed.gz"))
                .unwrap_or(false)
                && !inputs.contains(p)
        })
        .collect();
    extras.sort();
    extras
}

/// Spawn, wait, classify. Stderr is captured and its tail attached to
/// the error for diagnostics.
pub(crate) fn run_command(invocation: &Invocation, stage: Stage) -> Result<(), TaskError> {
    log::debug!("exec: {}", invocation.display());
    let output = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| TaskError::Fatal(format!("spawning {}: {e}", invocation.program)))?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(classify_exit(stage, output.status.code(), stderr_tail(&stderr)))
}

/// Tail of stderr, capped so one runaway tool can't flood the report.
fn stderr_tail(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    if trimmed.len() <= 400 {
        return trimmed;
    }
    let cut = trimmed.len() - 400;
    let start = (cut..trimmed.len())
        .find(|&i| trimmed.is_char_boundary(i))
        .unwrap_or(cut);
    &trimmed[start..]
}

/// Verify the tool actually produced its output, then rename into place.
fn commit(tmp: &Path, final_path: &Path) -> Result<(), TaskError> {
    if !tmp.exists() {
        return Err(TaskError::Fatal(format!(
            "tool exited cleanly but produced no output at {}",
            tmp.display()
        )));
    }
    std::fs::rename(tmp, final_path).map_err(|e| {
        TaskError::Fatal(format!(
            "moving {} into place: {e}",
            final_path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Invocation;

    fn inv(program: &str, args: &[&str]) -> Invocation {
        Invocation {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn successful_command_is_ok() {
        assert!(run_command(&inv("true", &[]), Stage::PeakCall).is_ok());
    }

    #[test]
    fn failing_command_is_fatal_for_non_download_stages() {
        let err = run_command(&inv("false", &[]), Stage::PeakCall).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn missing_binary_is_fatal() {
        let err = run_command(&inv("peakline-no-such-tool", &[]), Stage::Download).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("spawning"));
    }

    #[test]
    fn stderr_reaches_the_error_message() {
        let err = run_command(
            &inv("sh", &["-c", "echo boom >&2; exit 1"]),
            Stage::BedConvert,
        )
        .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn commit_rejects_missing_tmp_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = commit(&dir.path().join("absent.part"), &dir.path().join("final")).unwrap_err();
        assert!(err.to_string().contains("produced no output"));
    }

    #[test]
    fn commit_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("a.part");
        let final_path = dir.path().join("a");
        std::fs::write(&tmp, b"data").unwrap();

        commit(&tmp, &final_path).unwrap();
        assert!(final_path.exists());
        assert!(!tmp.exists());
    }

    #[test]
    fn stray_beds_flags_files_outside_the_input_set() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("ENCFF001ABC.bed.gz");
        let leftover = dir.path().join("ENCFF099OLD.bed.gz");
        std::fs::write(&current, b"x").unwrap();
        std::fs::write(&leftover, b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let extras = stray_beds(dir.path(), &[current.clone()]);
        assert_eq!(extras, vec![leftover]);

        // Nothing stray when the inputs cover the directory
        let both = [current, dir.path().join("ENCFF099OLD.bed.gz")];
        assert!(stray_beds(dir.path(), &both).is_empty());
    }

    #[test]
    fn bed_stem_strips_both_extensions() {
        assert_eq!(
            stem_without_bed_gz(Path::new("/x/ENCFF001ABC.bed.gz")),
            "ENCFF001ABC"
        );
    }
}
