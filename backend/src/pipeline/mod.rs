pub mod orchestrator;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{AnalysisOrchestrator, PipelineError};
pub use service::AnalysisService;
