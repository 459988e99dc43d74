//! Registry of stage executors

use std::collections::HashMap;
use std::sync::Arc;

use storyreel_core::TaskKind;

use crate::simulated::SimulatedStage;
use crate::traits::StageExecutor;

/// Maps each stage kind to the executor that implements it.
///
/// Adding a stage means adding one `TaskKind` variant and one registration
/// here; there is no subclassing involved.
#[derive(Clone, Default)]
pub struct StageRegistry {
    executors: HashMap<TaskKind, Arc<dyn StageExecutor>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor for a stage kind, replacing any previous one
    pub fn register(&mut self, kind: TaskKind, executor: Arc<dyn StageExecutor>) {
        self.executors.insert(kind, executor);
    }

    /// Look up the executor for a stage kind
    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn StageExecutor>> {
        self.executors.get(&kind).cloned()
    }

    /// Whether every stage kind has a registered executor
    pub fn is_complete(&self) -> bool {
        TaskKind::all().iter().all(|k| self.executors.contains_key(k))
    }

    /// Build a registry backed entirely by the local simulation stage.
    ///
    /// Returns the shared simulation handle so tests can script failures.
    pub fn simulated() -> (Self, Arc<SimulatedStage>) {
        let stage = Arc::new(SimulatedStage::new());
        let mut registry = Self::new();
        for kind in TaskKind::all() {
            registry.register(kind, stage.clone());
        }
        (registry, stage)
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("kinds", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}
