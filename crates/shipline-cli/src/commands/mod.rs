//! CLI command implementations.

pub mod apply;

use anyhow::{Context, Result};
use shipline_config::{DeploymentFile, load_deployment};
use shipline_core::{DependencyGraph, ResourceDescriptor, ResourceKind};
use shipline_scheduler::orchestrator::{BUILD_ARTIFACT, SOURCE_ARTIFACT};
use std::path::Path;

pub(crate) fn load(path: &Path) -> Result<DeploymentFile> {
    load_deployment(path)
        .with_context(|| format!("Failed to load deployment file: {}", path.display()))
}

pub fn validate(path: &Path) -> Result<()> {
    let file = load(path)?;
    let graph = file
        .validated_graph()
        .with_context(|| format!("Deployment '{}' is invalid", file.name))?;

    println!("Deployment '{}' is valid", file.name);
    println!("Provisioning order:");
    for (idx, descriptor) in graph.topological_order()?.iter().enumerate() {
        println!("  {}. {} ({})", idx + 1, descriptor.id, descriptor.kind);
    }
    Ok(())
}

pub fn plan(path: &Path) -> Result<()> {
    let file = load(path)?;
    let graph = file
        .validated_graph()
        .with_context(|| format!("Deployment '{}' is invalid", file.name))?;

    println!("Deployment: {}", file.name);
    println!(
        "Provisioning: {}",
        if file.settings.concurrent_provisioning {
            "concurrent"
        } else {
            "sequential"
        }
    );
    for (idx, wave) in graph.provisioning_waves()?.iter().enumerate() {
        let ids: Vec<String> = wave
            .iter()
            .map(|d| format!("{} ({})", d.id, d.kind))
            .collect();
        println!("  wave {}: {}", idx + 1, ids.join(", "));
    }

    let pipelines: Vec<&ResourceDescriptor> = graph
        .descriptors()
        .filter(|d| d.kind == ResourceKind::Pipeline)
        .collect();
    let [pipeline] = pipelines.as_slice() else {
        anyhow::bail!(
            "Expected exactly one pipeline resource, found {}",
            pipelines.len()
        );
    };

    let tag = pipeline.str_option("image-tag")?.unwrap_or("latest");
    let timeout_minutes = pipeline
        .int_option("deploy-timeout-minutes")?
        .unwrap_or((file.settings.deploy_timeout.as_secs() / 60) as i64);
    let repository = dependency_of_kind(&graph, pipeline, ResourceKind::Repository);
    let service = dependency_of_kind(&graph, pipeline, ResourceKind::Service);
    let build = dependency_of_kind(&graph, pipeline, ResourceKind::BuildProject)
        .unwrap_or_else(|| format!("{}-build (inline)", pipeline.id));

    println!("\nPipeline: {}", pipeline.id);
    println!(
        "  Source  image {}:{} -> {SOURCE_ARTIFACT}",
        repository.as_deref().unwrap_or("?"),
        tag
    );
    println!("  Build   {SOURCE_ARTIFACT} -> project {build} -> {BUILD_ARTIFACT}");
    println!(
        "  Deploy  {BUILD_ARTIFACT} -> service {} (timeout {timeout_minutes}m)",
        service.as_deref().unwrap_or("?"),
    );
    Ok(())
}

fn dependency_of_kind(
    graph: &DependencyGraph,
    descriptor: &ResourceDescriptor,
    kind: ResourceKind,
) -> Option<String> {
    descriptor
        .depends_on
        .iter()
        .filter_map(|id| graph.get(id))
        .find(|d| d.kind == kind)
        .map(|d| d.id.to_string())
}
