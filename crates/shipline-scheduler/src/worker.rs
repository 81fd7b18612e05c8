//! Worker that re-runs a pipeline when its watched image tag is pushed.

use crate::runner::{PipelineRunner, RunTrigger};
use serde::{Deserialize, Serialize};
use shipline_core::AssembledPipeline;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// An image push reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Registry-side repository name.
    pub repository: String,
    pub tag: String,
    pub digest: String,
}

/// Counters for one worker lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub runs: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub ignored: u64,
}

/// Consumes push events and runs the pipeline for matching ones.
pub struct RedeployWorker {
    runner: PipelineRunner,
    pipeline: Arc<AssembledPipeline>,
}

impl RedeployWorker {
    pub fn new(runner: PipelineRunner, pipeline: Arc<AssembledPipeline>) -> Self {
        Self { runner, pipeline }
    }

    /// Whether `event` is a push of the tag this pipeline deploys.
    pub fn matches(&self, event: &PushEvent) -> bool {
        let Some(handle) = self.pipeline.pipeline_handle() else {
            return false;
        };
        let Some(repository) = self
            .pipeline
            .handle(&handle.repository)
            .and_then(|h| h.as_repository())
        else {
            return false;
        };
        repository.name == event.repository && handle.image_tag == event.tag
    }

    /// Run the worker loop until the event channel closes.
    pub async fn run(&self, mut events: mpsc::Receiver<PushEvent>) -> WorkerStats {
        info!(pipeline = %self.pipeline.pipeline_id, "Starting redeploy worker");
        let mut stats = WorkerStats::default();

        while let Some(event) = events.recv().await {
            if !self.matches(&event) {
                debug!(repository = %event.repository, tag = %event.tag, "Ignoring push");
                stats.ignored += 1;
                continue;
            }

            info!(repository = %event.repository, tag = %event.tag, digest = %event.digest, "Push received, redeploying");
            let trigger = RunTrigger::Push {
                tag: event.tag,
                digest: event.digest,
            };
            stats.runs += 1;
            match self.runner.run(&self.pipeline, trigger).await {
                Ok(result) if result.success => stats.succeeded += 1,
                Ok(result) => {
                    warn!(run_id = %result.run_id, "Redeploy run failed");
                    stats.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Redeploy run aborted");
                    stats.failed += 1;
                }
            }
        }

        info!(?stats, "Redeploy worker stopped");
        stats
    }
}
