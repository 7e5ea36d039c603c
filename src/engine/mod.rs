//! Core engine: the fetch → detect → score pipeline and its snapshot cache.

pub mod cache;
pub mod orchestrator;

pub use cache::SnapshotCache;
pub use orchestrator::{
    AnalysisConfig, AnalysisOptions, AnalysisOrchestrator, Operation, OperationOutput,
    OperationRequest,
};
