//! Pipeline dependency graph
//!
//! Builds the per-job task DAG, validates it (unknown predecessors,
//! duplicates, cycles), and answers the two questions the scheduler asks:
//! which tasks become runnable when one succeeds (AND-join over all
//! predecessors), and which tasks are transitively doomed when one fails
//! terminally.

use std::collections::{HashMap, HashSet, VecDeque};

use storyreel_core::{JobId, JobSpec, TaskId, TaskKind, TaskState};

use crate::store::TaskRecord;

/// Graph construction errors
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("cyclic dependency involving task {0}")]
    CyclicDependency(String),

    #[error("task {task} depends on unknown task {predecessor}")]
    UnknownPredecessor { task: String, predecessor: String },

    #[error("duplicate task {0}")]
    DuplicateTask(String),
}

/// A task to be created, with its place in the pipeline
#[derive(Debug, Clone)]
pub struct TaskSeed {
    pub id: TaskId,
    pub kind: TaskKind,
    pub scene: Option<u32>,
    pub predecessors: Vec<TaskId>,
}

#[derive(Debug, Default, Clone)]
struct GraphNode {
    predecessors: Vec<TaskId>,
    dependents: Vec<TaskId>,
}

/// Immutable dependency view of one job's tasks
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    nodes: HashMap<TaskId, GraphNode>,
    /// Topological order, used for deterministic traversal
    sorted: Vec<TaskId>,
}

impl PipelineGraph {
    /// Expand a job spec into the fixed pipeline shape.
    ///
    /// One analyze root, then per scene: script, voice and image in
    /// parallel, clip from image, scene assembly joining voice and clip.
    /// Final assembly joins every scene assembly.
    pub fn expand(job: JobId, spec: &JobSpec) -> Vec<TaskSeed> {
        let mut seeds = Vec::new();
        let analyze = TaskId::new(job, TaskKind::Analyze.as_str());
        seeds.push(TaskSeed {
            id: analyze.clone(),
            kind: TaskKind::Analyze,
            scene: None,
            predecessors: Vec::new(),
        });

        let mut scene_outputs = Vec::new();
        for scene in 1..=spec.scenes {
            let script = TaskId::new(job, TaskKind::ScriptScene.instance_name(Some(scene)));
            let voice = TaskId::new(job, TaskKind::SynthVoice.instance_name(Some(scene)));
            let image = TaskId::new(job, TaskKind::SynthImage.instance_name(Some(scene)));
            let clip = TaskId::new(job, TaskKind::SynthClip.instance_name(Some(scene)));
            let assemble = TaskId::new(job, TaskKind::AssembleScene.instance_name(Some(scene)));

            seeds.push(TaskSeed {
                id: script.clone(),
                kind: TaskKind::ScriptScene,
                scene: Some(scene),
                predecessors: vec![analyze.clone()],
            });
            seeds.push(TaskSeed {
                id: voice.clone(),
                kind: TaskKind::SynthVoice,
                scene: Some(scene),
                predecessors: vec![script.clone()],
            });
            seeds.push(TaskSeed {
                id: image.clone(),
                kind: TaskKind::SynthImage,
                scene: Some(scene),
                predecessors: vec![script.clone()],
            });
            seeds.push(TaskSeed {
                id: clip.clone(),
                kind: TaskKind::SynthClip,
                scene: Some(scene),
                predecessors: vec![image],
            });
            seeds.push(TaskSeed {
                id: assemble.clone(),
                kind: TaskKind::AssembleScene,
                scene: Some(scene),
                predecessors: vec![voice, clip],
            });
            scene_outputs.push(assemble);
        }

        seeds.push(TaskSeed {
            id: TaskId::new(job, TaskKind::AssembleFinal.as_str()),
            kind: TaskKind::AssembleFinal,
            scene: None,
            predecessors: scene_outputs,
        });

        seeds
    }

    /// Build and validate a graph from task seeds
    pub fn from_seeds(seeds: &[TaskSeed]) -> Result<Self, GraphError> {
        Self::build(seeds.iter().map(|s| (s.id.clone(), s.predecessors.clone())))
    }

    /// Rebuild a graph from persisted task records on startup
    pub fn from_records(records: &[TaskRecord]) -> Result<Self, GraphError> {
        Self::build(records.iter().map(|r| (r.id.clone(), r.predecessors.clone())))
    }

    fn build(entries: impl Iterator<Item = (TaskId, Vec<TaskId>)>) -> Result<Self, GraphError> {
        let mut nodes: HashMap<TaskId, GraphNode> = HashMap::new();
        let mut order = Vec::new();
        for (id, predecessors) in entries {
            if nodes.contains_key(&id) {
                return Err(GraphError::DuplicateTask(id.to_string()));
            }
            order.push(id.clone());
            nodes.insert(
                id,
                GraphNode {
                    predecessors,
                    dependents: Vec::new(),
                },
            );
        }

        // Validate edges and fill reverse adjacency
        for id in &order {
            let predecessors = nodes[id].predecessors.clone();
            for pred in &predecessors {
                if !nodes.contains_key(pred) {
                    return Err(GraphError::UnknownPredecessor {
                        task: id.to_string(),
                        predecessor: pred.to_string(),
                    });
                }
                if let Some(node) = nodes.get_mut(pred) {
                    node.dependents.push(id.clone());
                }
            }
        }

        let sorted = Self::topological_sort(&nodes, &order)?;
        Ok(Self { nodes, sorted })
    }

    /// Kahn's algorithm; any remainder means a cycle
    fn topological_sort(
        nodes: &HashMap<TaskId, GraphNode>,
        order: &[TaskId],
    ) -> Result<Vec<TaskId>, GraphError> {
        let mut in_degree: HashMap<&TaskId, usize> = nodes
            .iter()
            .map(|(id, node)| (id, node.predecessors.len()))
            .collect();

        let mut ready: VecDeque<&TaskId> = order
            .iter()
            .filter(|id| in_degree[*id] == 0)
            .collect();

        let mut sorted = Vec::with_capacity(nodes.len());
        while let Some(id) = ready.pop_front() {
            sorted.push(id.clone());
            for dependent in &nodes[id].dependents {
                let degree = in_degree
                    .get_mut(dependent)
                    .ok_or_else(|| GraphError::CyclicDependency(dependent.to_string()))?;
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if sorted.len() != nodes.len() {
            let stuck = order
                .iter()
                .find(|id| !sorted.contains(id))
                .map(|id| id.to_string())
                .unwrap_or_default();
            return Err(GraphError::CyclicDependency(stuck));
        }
        Ok(sorted)
    }

    /// Tasks with no predecessors, in topological order
    pub fn roots(&self) -> Vec<TaskId> {
        self.sorted
            .iter()
            .filter(|id| self.nodes[*id].predecessors.is_empty())
            .cloned()
            .collect()
    }

    /// Direct predecessors of a task
    pub fn predecessors(&self, task: &TaskId) -> &[TaskId] {
        self.nodes
            .get(task)
            .map(|n| n.predecessors.as_slice())
            .unwrap_or(&[])
    }

    /// Dependents of `succeeded` whose predecessors have now all succeeded.
    ///
    /// `state_of` reports the current state of any task in the graph.
    pub fn newly_runnable(
        &self,
        succeeded: &TaskId,
        state_of: impl Fn(&TaskId) -> TaskState,
    ) -> Vec<TaskId> {
        let Some(node) = self.nodes.get(succeeded) else {
            return Vec::new();
        };
        node.dependents
            .iter()
            .filter(|dep| {
                state_of(dep) == TaskState::Pending
                    && self.nodes[*dep]
                        .predecessors
                        .iter()
                        .all(|p| state_of(p) == TaskState::Succeeded)
            })
            .cloned()
            .collect()
    }

    /// All transitive dependents of `failed`, in topological order.
    ///
    /// These can never run once `failed` is terminal.
    pub fn cascade_targets(&self, failed: &TaskId) -> Vec<TaskId> {
        let mut doomed: HashSet<&TaskId> = HashSet::new();
        let mut frontier = VecDeque::new();
        frontier.push_back(failed);
        while let Some(id) = frontier.pop_front() {
            if let Some(node) = self.nodes.get(id) {
                for dep in &node.dependents {
                    if doomed.insert(dep) {
                        frontier.push_back(dep);
                    }
                }
            }
        }
        self.sorted
            .iter()
            .filter(|id| doomed.contains(id))
            .cloned()
            .collect()
    }

    /// Every task in topological order
    pub fn topological_order(&self) -> &[TaskId] {
        &self.sorted
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
