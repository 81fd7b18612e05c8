//! Orchestration for Shipline.
//!
//! Provisions a validated descriptor graph into an assembled pipeline, runs
//! that pipeline stage by stage, and re-runs it when its watched image is
//! pushed.

pub mod orchestrator;
pub mod runner;
pub mod worker;

pub use orchestrator::{PipelineOrchestrator, ProvisioningMode};
pub use runner::{PipelineEvent, PipelineRunResult, PipelineRunner, RunTrigger, StageState};
pub use worker::{PushEvent, RedeployWorker, WorkerStats};
