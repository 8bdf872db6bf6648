//! Article ingest pipeline core.
//!
//! - [`domain`] - persisted record types shared across the pipeline
//! - [`llm`] - LLM provider trait, error classification, circuit breaker, router
//! - [`job`] - job store, worker pool, scheduler, metrics rollup
//! - [`extraction`] - two-stage LLM extraction (Stage 1 triage, Stage 2 schema fill)
//! - [`merge`] - Stage 2 result selector/merger
//! - [`dedup`] - in-batch and cross-source duplicate detection
//! - [`approval`] - approval decision cascade
//! - [`incident_writer`] - idempotent incident/actor/event persistence
//! - [`pipeline`] - stage orchestration and batch execution
//! - [`config`] - configuration loading
//! - [`cli`] - command-line interface
//! - [`handler`] - wires the pipeline stages into a [`job::JobHandler`]

pub mod approval;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod extraction;
pub mod handler;
pub mod incident_writer;
pub mod job;
pub mod llm;
pub mod merge;
pub mod pipeline;

pub use config::Config;
pub use handler::PipelineHandler;
