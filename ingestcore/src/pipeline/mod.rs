//! Pipeline Orchestrator (§4.12): stage sequencing and batch execution.

mod orchestrator;
pub mod stages;

pub use orchestrator::{BatchSummary, FinalDecision, Orchestrator, PipelineResult, Stage, StageConfig, StageOutcome};
pub use stages::{extract_and_write_stages, PipelineContext};
