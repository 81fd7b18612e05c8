//! Pipeline runner - executes an assembled pipeline's stages in order.
//!
//! Every run opens its own artifact channels, so two runs of the same pipeline
//! never share a payload.

use shipline_core::artifact::{
    ArtifactChannel, ArtifactPayload, ArtifactSink, ArtifactSource, IMAGE_DEFINITIONS_FILE,
    ImageDefinitions, SourceSnapshot,
};
use shipline_core::platform::{Collaborators, DeploymentReceipt};
use shipline_core::stage::StageAction;
use shipline_core::{
    AssembledPipeline, DescriptorId, Error, InstanceId, ProvisionedHandle, Result,
    StageDefinition, StageName,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// What started a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTrigger {
    Manual,
    Push { tag: String, digest: String },
}

/// State of a stage during execution.
#[derive(Debug, Clone, PartialEq)]
pub enum StageState {
    Pending,
    Running,
    Succeeded,
    Failed { message: String },
    Skipped { reason: String },
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageState::Succeeded | StageState::Failed { .. } | StageState::Skipped { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageState::Succeeded)
    }
}

/// Event emitted during a run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageStarted { stage: StageName },
    ArtifactProduced { stage: StageName, channel: ArtifactChannel },
    StageCompleted { stage: StageName, success: bool },
    PipelineCompleted { success: bool },
}

/// A channel opened during a run and what was written to it.
#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub channel: ArtifactChannel,
    pub payload: Option<ArtifactPayload>,
}

/// Result of one run.
#[derive(Debug)]
pub struct PipelineRunResult {
    pub run_id: InstanceId,
    pub trigger: RunTrigger,
    pub success: bool,
    pub stage_states: Vec<(StageName, StageState)>,
    pub artifacts: Vec<ArtifactRecord>,
    pub deployment: Option<DeploymentReceipt>,
}

impl PipelineRunResult {
    pub fn state(&self, stage: StageName) -> Option<&StageState> {
        self.stage_states
            .iter()
            .find(|(name, _)| *name == stage)
            .map(|(_, state)| state)
    }

    pub fn artifact(&self, name: &str) -> Option<&ArtifactRecord> {
        self.artifacts.iter().find(|a| a.channel.name == name)
    }
}

/// Executes assembled pipelines against the platform collaborators.
#[derive(Clone)]
pub struct PipelineRunner {
    collaborators: Collaborators,
}

impl PipelineRunner {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    /// Execute a pipeline, returning a channel of events and a handle to get the final result.
    pub fn execute(
        &self,
        pipeline: &AssembledPipeline,
        trigger: RunTrigger,
    ) -> (
        mpsc::Receiver<PipelineEvent>,
        tokio::task::JoinHandle<PipelineRunResult>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let collaborators = self.collaborators.clone();
        let stages = pipeline.stages.clone();
        let handles = Arc::new(pipeline.handles.clone());

        let handle = tokio::spawn(async move {
            Self::execute_inner(collaborators, stages, handles, trigger, tx).await
        });

        (rx, handle)
    }

    /// Execute a pipeline and wait for it, discarding events.
    pub async fn run(
        &self,
        pipeline: &AssembledPipeline,
        trigger: RunTrigger,
    ) -> Result<PipelineRunResult> {
        let (rx, handle) = self.execute(pipeline, trigger);
        drop(rx);
        handle.await.map_err(|e| Error::RunAborted(e.to_string()))
    }

    async fn execute_inner(
        collaborators: Collaborators,
        stages: Vec<StageDefinition>,
        handles: Arc<BTreeMap<DescriptorId, ProvisionedHandle>>,
        trigger: RunTrigger,
        tx: mpsc::Sender<PipelineEvent>,
    ) -> PipelineRunResult {
        let run_id = InstanceId::new();
        info!(%run_id, ?trigger, "Starting pipeline run");

        let mut stage_states: Vec<(StageName, StageState)> = stages
            .iter()
            .map(|s| (s.name, StageState::Pending))
            .collect();
        let mut sources: HashMap<String, ArtifactSource> = HashMap::new();
        let mut opened: Vec<ArtifactSource> = Vec::new();
        let mut failed: Option<StageName> = None;
        let mut deployment = None;

        for (idx, stage) in stages.iter().enumerate() {
            if let Some(failed_stage) = failed {
                info!(stage = %stage.name, "Skipping stage after failure");
                stage_states[idx].1 = StageState::Skipped {
                    reason: format!("stage {failed_stage} failed"),
                };
                continue;
            }

            let _ = tx
                .send(PipelineEvent::StageStarted { stage: stage.name })
                .await;
            stage_states[idx].1 = StageState::Running;

            // The output channel is opened just before its producer runs.
            let sink = stage.output_artifact.as_ref().map(|spec| {
                let (sink, source) = ArtifactChannel::open(spec);
                sources.insert(spec.name.clone(), source.clone());
                opened.push(source);
                sink
            });
            let output_channel = sink.as_ref().map(|s| s.channel().clone());

            let input = match &stage.input_artifact {
                Some(spec) => sources
                    .get(&spec.name)
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| Error::ArtifactNotProduced {
                        name: spec.name.clone(),
                    }),
                None => Ok(None),
            };

            let result = match input {
                Ok(input) => {
                    Self::execute_stage(&collaborators, &handles, stage, input, sink).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(receipt) => {
                    info!(stage = %stage.name, "Stage completed successfully");
                    stage_states[idx].1 = StageState::Succeeded;
                    if receipt.is_some() {
                        deployment = receipt;
                    }
                    if let Some(channel) = output_channel {
                        let _ = tx
                            .send(PipelineEvent::ArtifactProduced {
                                stage: stage.name,
                                channel,
                            })
                            .await;
                    }
                    let _ = tx
                        .send(PipelineEvent::StageCompleted {
                            stage: stage.name,
                            success: true,
                        })
                        .await;
                }
                Err(e) => {
                    error!(stage = %stage.name, error = %e, "Stage failed");
                    stage_states[idx].1 = StageState::Failed {
                        message: e.to_string(),
                    };
                    failed = Some(stage.name);
                    let _ = tx
                        .send(PipelineEvent::StageCompleted {
                            stage: stage.name,
                            success: false,
                        })
                        .await;
                }
            }
        }

        let success = stage_states.iter().all(|(_, s)| s.is_success());
        let _ = tx.send(PipelineEvent::PipelineCompleted { success }).await;
        info!(%run_id, success, "Pipeline run finished");

        PipelineRunResult {
            run_id,
            trigger,
            success,
            stage_states,
            artifacts: opened
                .iter()
                .map(|source| ArtifactRecord {
                    channel: source.channel().clone(),
                    payload: source.peek(),
                })
                .collect(),
            deployment,
        }
    }

    async fn execute_stage(
        collaborators: &Collaborators,
        handles: &BTreeMap<DescriptorId, ProvisionedHandle>,
        stage: &StageDefinition,
        input: Option<ArtifactSource>,
        sink: Option<ArtifactSink>,
    ) -> Result<Option<DeploymentReceipt>> {
        let failed = |message: String| Error::StageFailed {
            stage: stage.name,
            message,
        };

        match &stage.action {
            StageAction::ImageSource { repository, tag } => {
                let repo = handles
                    .get(repository)
                    .and_then(|h| h.as_repository())
                    .ok_or_else(|| failed(format!("'{repository}' is not a repository")))?;
                let detail = collaborators
                    .registry
                    .describe_image(&repo.name, tag)
                    .await
                    .map_err(|e| failed(e.to_string()))?;

                info!(repository = %repo.name, %tag, digest = %detail.digest, "Source image resolved");
                let sink = sink.ok_or_else(|| failed("no output channel".to_string()))?;
                sink.write(ArtifactPayload::SourceSnapshot(SourceSnapshot {
                    repository_uri: repo.uri.clone(),
                    tag: tag.clone(),
                    digest: detail.digest,
                    pushed_at: detail.pushed_at,
                }))?;
                Ok(None)
            }
            StageAction::Build { project, .. } => {
                let mut input = input.ok_or_else(|| failed("no input channel".to_string()))?;
                let snapshot = match input.wait().await? {
                    ArtifactPayload::SourceSnapshot(snapshot) => snapshot,
                    other => {
                        return Err(failed(format!(
                            "expected a source snapshot, got {}",
                            other.kind()
                        )));
                    }
                };

                let output = collaborators
                    .builds
                    .start_build(project, &snapshot)
                    .await
                    .map_err(|e| failed(e.to_string()))?;
                let manifest = output.files.get(IMAGE_DEFINITIONS_FILE).ok_or_else(|| {
                    failed(format!("build did not produce {IMAGE_DEFINITIONS_FILE}"))
                })?;
                let definitions = ImageDefinitions::parse(manifest)
                    .map_err(|e| failed(format!("invalid {IMAGE_DEFINITIONS_FILE}: {e}")))?;

                info!(build_id = %output.build_id, project = %project.project_name, "Build finished");
                let sink = sink.ok_or_else(|| failed("no output channel".to_string()))?;
                sink.write(ArtifactPayload::BuildManifest(definitions))?;
                Ok(None)
            }
            StageAction::Deploy { service, timeout } => {
                let mut input = input.ok_or_else(|| failed("no input channel".to_string()))?;
                let definitions = match input.wait().await? {
                    ArtifactPayload::BuildManifest(definitions) => definitions,
                    other => {
                        return Err(failed(format!(
                            "expected a build manifest, got {}",
                            other.kind()
                        )));
                    }
                };

                let target = handles
                    .get(service)
                    .and_then(|h| h.as_service())
                    .ok_or_else(|| failed(format!("'{service}' is not a service")))?;
                let image = definitions
                    .image_for(&target.container_name)
                    .ok_or_else(|| {
                        failed(format!(
                            "no image for container '{}'",
                            target.container_name
                        ))
                    })?;

                let receipt = collaborators
                    .compute
                    .deploy_image(target, image, *timeout)
                    .await
                    .map_err(|e| failed(e.to_string()))?;
                info!(service = %target.service_name, image = %receipt.image, "Deployed");
                Ok(Some(receipt))
            }
        }
    }
}
