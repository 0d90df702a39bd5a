//! Extraction pipeline: run orchestration over the search strategy, the
//! link extractor and the rank store.

pub mod orchestrator;

pub use orchestrator::RunOrchestrator;
