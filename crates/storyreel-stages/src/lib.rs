//! Storyreel Stages - the stage-collaborator seam
//!
//! The scheduling engine treats every AI production call (text analysis,
//! voice/image/clip synthesis, composition) as an opaque asynchronous
//! operation behind the [`StageExecutor`] trait. One executor is registered
//! per stage kind; the engine resolves a leased task's kind through the
//! [`StageRegistry`] and never learns how the result was produced.

pub mod registry;
pub mod simulated;
pub mod traits;

pub use registry::StageRegistry;
pub use simulated::SimulatedStage;
pub use traits::{StageError, StageExecutor, StageOutput, StageRequest};
