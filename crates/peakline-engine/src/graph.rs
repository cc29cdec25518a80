//! Task graph construction
//!
//! Pure function of (samples, layout): per sample a linear
//! download → peak_call → bed_convert chain, then one aggregate
//! giggle_index task over every bed output. Same inputs always produce
//! an isomorphic graph, so it is rebuilt from scratch each run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::GraphError;
use crate::sample::Sample;
use crate::task::{Stage, Task};

/// Per-stage artifact directories; artifact paths are deterministic
/// functions of sample id and stage, so downstream stages locate
/// upstream outputs by recomputation alone.
#[derive(Debug, Clone)]
pub struct PipelineLayout {
    pub tracks_dir: PathBuf,
    pub peaks_dir: PathBuf,
    pub beds_dir: PathBuf,
    pub index_dir: PathBuf,
}

impl PipelineLayout {
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            tracks_dir: base.join("tracks"),
            peaks_dir: base.join("peaks"),
            beds_dir: base.join("beds"),
            index_dir: base.join("index"),
        }
    }

    pub fn track_path(&self, sample_id: &str) -> PathBuf {
        self.tracks_dir.join(format!("{sample_id}.bigWig"))
    }

    pub fn peaks_path(&self, sample_id: &str) -> PathBuf {
        self.peaks_dir.join(format!("{sample_id}.narrowPeak"))
    }

    pub fn bed_path(&self, sample_id: &str) -> PathBuf {
        self.beds_dir.join(format!("{sample_id}.bed.gz"))
    }
}

/// The per-run execution DAG.
#[derive(Debug)]
pub struct TaskGraph {
    pub tasks: Vec<Task>,
    /// For each task, indices of tasks it depends on.
    pub deps: Vec<Vec<usize>>,
    /// For each task, indices of tasks depending on it.
    pub dependents: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Build the DAG for the given sample set.
    ///
    /// Samples are taken in the order given (the resolver already sorts
    /// by id). With no samples the graph is empty — there is nothing to
    /// index.
    pub fn build(samples: &[Sample], layout: &PipelineLayout) -> Result<Self, GraphError> {
        let mut tasks: Vec<Task> = Vec::new();
        let mut bed_outputs: Vec<PathBuf> = Vec::new();

        for sample in samples {
            let track = layout.track_path(&sample.sample_id);
            let peaks = layout.peaks_path(&sample.sample_id);
            let bed = layout.bed_path(&sample.sample_id);

            tasks.push(Task {
                stage: Stage::Download,
                sample_id: Some(sample.sample_id.clone()),
                inputs: vec![],
                outputs: vec![track.clone()],
                allow_partial_inputs: false,
            });
            tasks.push(Task {
                stage: Stage::PeakCall,
                sample_id: Some(sample.sample_id.clone()),
                inputs: vec![track],
                outputs: vec![peaks.clone()],
                allow_partial_inputs: false,
            });
            tasks.push(Task {
                stage: Stage::BedConvert,
                sample_id: Some(sample.sample_id.clone()),
                inputs: vec![peaks],
                outputs: vec![bed.clone()],
                allow_partial_inputs: false,
            });
            bed_outputs.push(bed);
        }

        if !bed_outputs.is_empty() {
            tasks.push(Task {
                stage: Stage::GiggleIndex,
                sample_id: None,
                inputs: bed_outputs,
                outputs: vec![layout.index_dir.clone()],
                allow_partial_inputs: true,
            });
        }

        Self::from_tasks(tasks)
    }

    /// Wire dependency edges by matching inputs to producer outputs and
    /// validate the result. Exposed for tests that need custom shapes.
    pub fn from_tasks(tasks: Vec<Task>) -> Result<Self, GraphError> {
        // Each artifact has exactly one producer
        let mut producer: BTreeMap<&Path, usize> = BTreeMap::new();
        for (idx, task) in tasks.iter().enumerate() {
            for output in &task.outputs {
                if producer.insert(output.as_path(), idx).is_some() {
                    return Err(GraphError::DuplicateOutput {
                        path: output.clone(),
                    });
                }
            }
        }

        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
        for (idx, task) in tasks.iter().enumerate() {
            for input in &task.inputs {
                if let Some(&prod) = producer.get(input.as_path()) {
                    deps[idx].push(prod);
                    dependents[prod].push(idx);
                }
                // Inputs with no producer are pre-existing files; the
                // freshness check will see them on disk or the task fails.
            }
        }

        let graph = Self {
            tasks,
            deps,
            dependents,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Kahn's algorithm; leftover nodes mean a cycle.
    fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut unmet: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut queue: Vec<usize> = (0..self.tasks.len()).filter(|&i| unmet[i] == 0).collect();
        let mut visited = 0usize;

        while let Some(idx) = queue.pop() {
            visited += 1;
            for &dep in &self.dependents[idx] {
                unmet[dep] -= 1;
                if unmet[dep] == 0 {
                    queue.push(dep);
                }
            }
        }

        if visited == self.tasks.len() {
            Ok(())
        } else {
            Err(GraphError::Cycle)
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peakline_store::FileFormat;

    fn sample(id: &str) -> Sample {
        Sample {
            sample_id: id.to_string(),
            download_url: format!("https://x.org/{id}.bigWig"),
            format: FileFormat::SignalTrack,
        }
    }

    fn layout() -> PipelineLayout {
        PipelineLayout::rooted_at(Path::new("/data"))
    }

    #[test]
    fn per_sample_chain_plus_one_index() {
        let samples = [sample("ENCFF001ABC"), sample("ENCFF002DEF")];
        let graph = TaskGraph::build(&samples, &layout()).unwrap();

        // 3 tasks per sample + 1 aggregate index
        assert_eq!(graph.len(), 7);
        let index_tasks: Vec<&Task> = graph
            .tasks
            .iter()
            .filter(|t| t.stage == Stage::GiggleIndex)
            .collect();
        assert_eq!(index_tasks.len(), 1);
        assert_eq!(index_tasks[0].inputs.len(), 2);
        assert!(index_tasks[0].allow_partial_inputs);
    }

    #[test]
    fn chain_edges_are_wired() {
        let samples = [sample("ENCFF001ABC")];
        let graph = TaskGraph::build(&samples, &layout()).unwrap();

        // download(0) -> peak_call(1) -> bed_convert(2) -> index(3)
        assert!(graph.deps[0].is_empty());
        assert_eq!(graph.deps[1], vec![0]);
        assert_eq!(graph.deps[2], vec![1]);
        assert_eq!(graph.deps[3], vec![2]);
        assert_eq!(graph.dependents[0], vec![1]);
    }

    #[test]
    fn index_fans_in_from_every_bed() {
        let samples = [sample("ENCFF001ABC"), sample("ENCFF002DEF"), sample("ENCFF003GHI")];
        let graph = TaskGraph::build(&samples, &layout()).unwrap();

        let index_idx = graph.len() - 1;
        assert_eq!(graph.tasks[index_idx].stage, Stage::GiggleIndex);
        assert_eq!(graph.deps[index_idx].len(), 3);
    }

    #[test]
    fn duplicate_sample_id_rejected() {
        let samples = [sample("ENCFF001ABC"), sample("ENCFF001ABC")];
        match TaskGraph::build(&samples, &layout()) {
            Err(GraphError::DuplicateOutput { path }) => {
                assert!(path.to_string_lossy().contains("ENCFF001ABC"));
            }
            other => panic!("expected DuplicateOutput, got {other:?}"),
        }
    }

    #[test]
    fn empty_samples_empty_graph() {
        let graph = TaskGraph::build(&[], &layout()).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn rebuild_is_isomorphic() {
        let samples = [sample("ENCFF002DEF"), sample("ENCFF001ABC")];
        let a = TaskGraph::build(&samples, &layout()).unwrap();
        let b = TaskGraph::build(&samples, &layout()).unwrap();

        assert_eq!(a.len(), b.len());
        for (ta, tb) in a.tasks.iter().zip(&b.tasks) {
            assert_eq!(ta.stage, tb.stage);
            assert_eq!(ta.sample_id, tb.sample_id);
            assert_eq!(ta.outputs, tb.outputs);
        }
        assert_eq!(a.deps, b.deps);
    }

    #[test]
    fn cycle_detected() {
        let tasks = vec![
            Task {
                stage: Stage::Download,
                sample_id: Some("a".into()),
                inputs: vec![PathBuf::from("/x/b.out")],
                outputs: vec![PathBuf::from("/x/a.out")],
                allow_partial_inputs: false,
            },
            Task {
                stage: Stage::PeakCall,
                sample_id: Some("b".into()),
                inputs: vec![PathBuf::from("/x/a.out")],
                outputs: vec![PathBuf::from("/x/b.out")],
                allow_partial_inputs: false,
            },
        ];
        match TaskGraph::from_tasks(tasks) {
            Err(GraphError::Cycle) => {}
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn layout_paths_are_deterministic() {
        let l = layout();
        assert_eq!(
            l.track_path("ENCFF001ABC"),
            PathBuf::from("/data/tracks/ENCFF001ABC.bigWig")
        );
        assert_eq!(
            l.bed_path("ENCFF001ABC"),
            PathBuf::from("/data/beds/ENCFF001ABC.bed.gz")
        );
    }
}
