//! Provision a deployment against the in-memory platform.

use super::load;
use anyhow::{Context, Result};
use shipline_core::platform::Collaborators;
use shipline_provisioner::{InMemoryPlatform, ProvisionerSet};
use shipline_scheduler::{
    PipelineEvent, PipelineOrchestrator, PipelineRunner, ProvisioningMode, PushEvent,
    RedeployWorker, RunTrigger, StageState,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub async fn apply(path: &Path, push: Option<String>) -> Result<()> {
    let file = load(path)?;
    let graph = file.graph()?;

    let platform = Arc::new(InMemoryPlatform::new());
    let mut collaborators = Collaborators::from_platform(platform.clone());
    if !file.settings.audit_push_events {
        collaborators = collaborators.without_audit();
    }
    let mode = if file.settings.concurrent_provisioning {
        ProvisioningMode::Concurrent
    } else {
        ProvisioningMode::Sequential
    };
    let provisioners =
        ProvisionerSet::standard_with_timeout(&collaborators, file.settings.deploy_timeout);

    info!(deployment = %file.name, ?mode, resources = graph.len(), "Applying deployment");
    println!("Applying deployment: {}", file.name);
    let pipeline = PipelineOrchestrator::new(provisioners)
        .with_mode(mode)
        .build(graph)
        .await
        .with_context(|| format!("Failed to apply deployment '{}'", file.name))?;

    println!("\n--- Provisioned resources ---");
    for id in &pipeline.provision_order {
        if let Some(handle) = pipeline.handle(id) {
            println!("{} ({})", id, handle.kind());
            println!("{}", serde_json::to_string_pretty(&handle.detail)?);
        }
    }
    println!("\nPipeline '{}' assembled:", pipeline.pipeline_id);
    for stage in &pipeline.stages {
        println!("  {}", stage.name);
    }

    let Some(tag) = push else {
        return Ok(());
    };

    let repository = pipeline
        .pipeline_handle()
        .and_then(|p| pipeline.handle(&p.repository))
        .and_then(|h| h.as_repository())
        .map(|r| r.name.clone())
        .context("Pipeline has no repository")?;
    let image = platform.push_image(&repository, &tag)?;
    let event = PushEvent {
        repository,
        tag,
        digest: image.digest,
    };
    info!(repository = %event.repository, tag = %event.tag, digest = %event.digest, "Image pushed");
    println!("\nPushed {}:{} ({})", event.repository, event.tag, event.digest);

    let runner = PipelineRunner::new(collaborators);
    let pipeline = Arc::new(pipeline);
    let worker = RedeployWorker::new(runner.clone(), pipeline.clone());
    if !worker.matches(&event) {
        info!(tag = %event.tag, "Push ignored by redeploy worker");
        println!("Push does not match the watched tag; nothing to deploy");
        return Ok(());
    }

    println!("\n--- Starting pipeline run ---\n");
    let trigger = RunTrigger::Push {
        tag: event.tag,
        digest: event.digest,
    };
    let (mut rx, result_handle) = runner.execute(&pipeline, trigger);

    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::StageStarted { stage } => {
                println!("▶ Stage '{}' started", stage);
            }
            PipelineEvent::ArtifactProduced { stage, channel } => {
                println!("  [{}] produced {} ({})", stage, channel.name, channel.id);
            }
            PipelineEvent::StageCompleted { stage, success } => {
                if success {
                    println!("✓ Stage '{}' completed successfully\n", stage);
                } else {
                    println!("✗ Stage '{}' failed\n", stage);
                }
            }
            PipelineEvent::PipelineCompleted { success } => {
                if success {
                    println!("--- Pipeline completed successfully ---");
                } else {
                    println!("--- Pipeline failed ---");
                }
            }
        }
    }

    let result = result_handle
        .await
        .context("Pipeline execution task failed")?;
    info!(run_id = %result.run_id, success = result.success, "Pipeline run finished");

    println!("\n--- Stage Summary ---");
    for (stage_name, state) in &result.stage_states {
        let status = match state {
            StageState::Succeeded => "✓ succeeded".to_string(),
            StageState::Failed { message } => format!("✗ failed: {}", message),
            StageState::Skipped { reason } => format!("⊘ skipped: {}", reason),
            StageState::Pending => "○ pending".to_string(),
            StageState::Running => "▶ running".to_string(),
        };
        println!("  {} - {}", stage_name, status);
    }

    if let Some(receipt) = &result.deployment {
        println!("\nDeployed {} ({})", receipt.image, receipt.deployment_id);
    }

    if result.success {
        println!("\n✓ Pipeline succeeded!");
        Ok(())
    } else {
        anyhow::bail!("Pipeline failed");
    }
}
