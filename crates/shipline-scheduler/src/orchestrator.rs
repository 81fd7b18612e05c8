//! Pipeline orchestrator - provisions the descriptor graph in dependency order
//! and wires the handles into the Source → Build → Deploy stages.

use futures::future::join_all;
use shipline_core::artifact::{ArtifactSpec, PayloadKind};
use shipline_core::stage::StageAction;
use shipline_core::{
    AssembledPipeline, DependencyGraph, DescriptorId, Error, ProvisionCause, ProvisionedHandle,
    ResolvedDependencies, ResourceDescriptor, ResourceKind, Result, StageDefinition, StageName,
};
use shipline_provisioner::ProvisionerSet;
use std::collections::BTreeMap;
use tracing::{error, info};

pub const SOURCE_ARTIFACT: &str = "sourceArtifact";
pub const BUILD_ARTIFACT: &str = "buildArtifact";

/// How independent descriptors are provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisioningMode {
    /// One at a time, in topological order.
    #[default]
    Sequential,
    /// Each wave of descriptors with satisfied dependencies at once.
    Concurrent,
}

/// Builds an [`AssembledPipeline`] from a descriptor graph.
pub struct PipelineOrchestrator {
    provisioners: ProvisionerSet,
    mode: ProvisioningMode,
}

impl PipelineOrchestrator {
    pub fn new(provisioners: ProvisionerSet) -> Self {
        Self {
            provisioners,
            mode: ProvisioningMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ProvisioningMode) -> Self {
        self.mode = mode;
        self
    }

    /// Validate, provision in order, then assemble the three stages.
    ///
    /// Graph errors are returned before any provisioner runs. The first
    /// provisioning failure stops the build; nothing already provisioned is
    /// rolled back.
    pub async fn build(&self, mut graph: DependencyGraph) -> Result<AssembledPipeline> {
        graph.validate()?;

        let (handles, order) = match self.mode {
            ProvisioningMode::Sequential => self.provision_sequential(&graph).await?,
            ProvisioningMode::Concurrent => self.provision_concurrent(&graph).await?,
        };
        info!(resources = handles.len(), "All resources provisioned");

        Self::assemble(handles, order)
    }

    async fn provision_sequential(
        &self,
        graph: &DependencyGraph,
    ) -> Result<(BTreeMap<DescriptorId, ProvisionedHandle>, Vec<DescriptorId>)> {
        let mut handles = BTreeMap::new();
        let mut order = Vec::with_capacity(graph.len());

        for descriptor in graph.topological_order()? {
            let handle = self.provision_one(descriptor, &handles).await?;
            order.push(descriptor.id.clone());
            handles.insert(descriptor.id.clone(), handle);
        }

        Ok((handles, order))
    }

    async fn provision_concurrent(
        &self,
        graph: &DependencyGraph,
    ) -> Result<(BTreeMap<DescriptorId, ProvisionedHandle>, Vec<DescriptorId>)> {
        let mut handles = BTreeMap::new();
        let mut order = Vec::with_capacity(graph.len());

        for wave in graph.provisioning_waves()? {
            let results = join_all(wave.iter().map(|d| self.provision_one(d, &handles))).await;

            let mut provisioned = Vec::with_capacity(results.len());
            for (descriptor, result) in wave.iter().zip(results) {
                provisioned.push((descriptor.id.clone(), result?));
            }
            for (id, handle) in provisioned {
                order.push(id.clone());
                handles.insert(id, handle);
            }
        }

        Ok((handles, order))
    }

    /// Provision one descriptor, handing it only its declared dependencies.
    async fn provision_one(
        &self,
        descriptor: &ResourceDescriptor,
        handles: &BTreeMap<DescriptorId, ProvisionedHandle>,
    ) -> Result<ProvisionedHandle> {
        let failed = |cause: ProvisionCause| Error::Provisioning {
            descriptor_id: descriptor.id.clone(),
            cause,
        };

        let provisioner = self
            .provisioners
            .get(descriptor.kind)
            .ok_or_else(|| failed(ProvisionCause::NoProvisioner(descriptor.kind)))?;

        let resolved: ResolvedDependencies = descriptor
            .depends_on
            .iter()
            .filter_map(|id| handles.get(id).cloned())
            .collect();

        info!(descriptor = %descriptor.id, kind = %descriptor.kind, dependencies = resolved.len(), "Provisioning");
        match provisioner.provision(descriptor, &resolved).await {
            Ok(handle) => Ok(handle),
            Err(cause) => {
                error!(descriptor = %descriptor.id, error = %cause, "Provisioning failed");
                Err(failed(cause))
            }
        }
    }

    /// Wire the fixed three-stage layout onto the provisioned pipeline resource.
    fn assemble(
        handles: BTreeMap<DescriptorId, ProvisionedHandle>,
        order: Vec<DescriptorId>,
    ) -> Result<AssembledPipeline> {
        let pipelines: Vec<&ProvisionedHandle> = handles
            .values()
            .filter(|h| h.kind() == ResourceKind::Pipeline)
            .collect();
        let pipeline_handle = match pipelines.as_slice() {
            [one] => *one,
            [] => return Err(Error::Assembly("no pipeline descriptor".to_string())),
            many => {
                let ids: Vec<&str> = many.iter().map(|h| h.descriptor_id.as_str()).collect();
                return Err(Error::Assembly(format!(
                    "expected one pipeline descriptor, found {ids:?}"
                )));
            }
        };
        let pipeline_id = pipeline_handle.descriptor_id.clone();
        let Some(pipeline) = pipeline_handle.as_pipeline().cloned() else {
            return Err(Error::Assembly(format!(
                "'{pipeline_id}' did not produce a pipeline handle"
            )));
        };

        let source_artifact =
            ArtifactSpec::new(SOURCE_ARTIFACT, StageName::Source, PayloadKind::SourceSnapshot);
        let build_artifact =
            ArtifactSpec::new(BUILD_ARTIFACT, StageName::Build, PayloadKind::BuildManifest);

        let stages = vec![
            StageDefinition::source(
                StageAction::ImageSource {
                    repository: pipeline.repository.clone(),
                    tag: pipeline.image_tag.clone(),
                },
                source_artifact.clone(),
            ),
            StageDefinition::build(
                StageAction::Build {
                    repository: pipeline.repository.clone(),
                    build_project: pipeline.build_project.clone(),
                    project: pipeline.project.clone(),
                },
                source_artifact,
                build_artifact.clone(),
            ),
            StageDefinition::deploy(
                StageAction::Deploy {
                    service: pipeline.service.clone(),
                    timeout: pipeline.deploy_timeout,
                },
                build_artifact,
            ),
        ];

        AssembledPipeline::new(pipeline_id, stages, handles, order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shipline_core::platform::Collaborators;
    use shipline_core::ResourceProvisioner;
    use shipline_provisioner::InMemoryPlatform;
    use std::sync::{Arc, Mutex};

    /// Wraps a provisioner and records the descriptors it is asked to provision.
    struct Recording {
        inner: Arc<dyn ResourceProvisioner>,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ResourceProvisioner for Recording {
        fn kind(&self) -> ResourceKind {
            self.inner.kind()
        }

        async fn provision(
            &self,
            descriptor: &ResourceDescriptor,
            resolved: &ResolvedDependencies,
        ) -> std::result::Result<ProvisionedHandle, ProvisionCause> {
            self.log.lock().unwrap().push(descriptor.id.to_string());
            self.inner.provision(descriptor, resolved).await
        }
    }

    fn recording_set(
        platform: &Arc<InMemoryPlatform>,
    ) -> (ProvisionerSet, Arc<Mutex<Vec<String>>>) {
        let standard = ProvisionerSet::standard(&Collaborators::from_platform(platform.clone()));
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = ProvisionerSet::new();
        for kind in [
            ResourceKind::Repository,
            ResourceKind::Service,
            ResourceKind::BuildProject,
            ResourceKind::Pipeline,
        ] {
            set = set.with(Arc::new(Recording {
                inner: standard.get(kind).unwrap(),
                log: log.clone(),
            }));
        }
        (set, log)
    }

    fn scenario_graph() -> DependencyGraph {
        DependencyGraph::from_descriptors([
            ResourceDescriptor::new("repo1", ResourceKind::Repository),
            ResourceDescriptor::new("svc1", ResourceKind::Service)
                .with_option("cluster-name", "demo")
                .depends_on("repo1"),
            ResourceDescriptor::new("pipe1", ResourceKind::Pipeline)
                .depends_on("repo1")
                .depends_on("svc1"),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_build_scenario() {
        let platform = Arc::new(InMemoryPlatform::new());
        let (set, log) = recording_set(&platform);

        let pipeline = PipelineOrchestrator::new(set)
            .build(scenario_graph())
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["repo1", "svc1", "pipe1"]);
        assert_eq!(pipeline.provision_order, vec!["repo1", "svc1", "pipe1"]);
        assert_eq!(pipeline.handles.len(), 3);

        let names: Vec<StageName> = pipeline.stages.iter().map(|s| s.name).collect();
        assert_eq!(names, vec![StageName::Source, StageName::Build, StageName::Deploy]);

        let build = pipeline.stage(StageName::Build).unwrap();
        assert!(build.action.references_descriptor("repo1"));
        let deploy = pipeline.stage(StageName::Deploy).unwrap();
        assert!(deploy.action.references_descriptor("svc1"));
        assert_eq!(pipeline.watched_repository(), Some("repo1"));
    }

    #[tokio::test]
    async fn test_single_letter_graph_provisions_r_s_p() {
        let platform = Arc::new(InMemoryPlatform::new());
        let (set, log) = recording_set(&platform);
        let graph = DependencyGraph::from_descriptors([
            ResourceDescriptor::new("P", ResourceKind::Pipeline)
                .depends_on("S")
                .depends_on("R"),
            ResourceDescriptor::new("S", ResourceKind::Service)
                .with_option("cluster-name", "demo")
                .depends_on("R"),
            ResourceDescriptor::new("R", ResourceKind::Repository),
        ])
        .unwrap();

        let pipeline = PipelineOrchestrator::new(set).build(graph).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["R", "S", "P"]);
        assert_eq!(pipeline.stages.len(), 3);
    }

    #[tokio::test]
    async fn test_stage_artifacts_are_wired() {
        let platform = Arc::new(InMemoryPlatform::new());
        let set = ProvisionerSet::standard(&Collaborators::from_platform(platform));
        let pipeline = PipelineOrchestrator::new(set)
            .build(scenario_graph())
            .await
            .unwrap();

        let source = pipeline.stage(StageName::Source).unwrap();
        let build = pipeline.stage(StageName::Build).unwrap();
        let deploy = pipeline.stage(StageName::Deploy).unwrap();

        assert!(source.input_artifact.is_none());
        assert_eq!(source.output_artifact.as_ref().unwrap().name, SOURCE_ARTIFACT);
        assert_eq!(build.input_artifact.as_ref().unwrap().name, SOURCE_ARTIFACT);
        assert_eq!(build.output_artifact.as_ref().unwrap().name, BUILD_ARTIFACT);
        assert_eq!(deploy.input_artifact.as_ref().unwrap().name, BUILD_ARTIFACT);
        assert!(deploy.output_artifact.is_none());
        assert!(matches!(
            &deploy.action,
            StageAction::Deploy { timeout, .. } if timeout.as_secs() == 3600
        ));
    }

    #[tokio::test]
    async fn test_provisioning_failure_halts() {
        let platform = Arc::new(InMemoryPlatform::new());
        platform.fail_operation("create_service", "capacity unavailable");
        let (set, log) = recording_set(&platform);

        let err = PipelineOrchestrator::new(set)
            .build(scenario_graph())
            .await
            .unwrap_err();

        match err {
            Error::Provisioning {
                descriptor_id,
                cause,
            } => {
                assert_eq!(descriptor_id, "svc1");
                assert!(matches!(cause, ProvisionCause::Platform(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*log.lock().unwrap(), vec!["repo1", "svc1"]);
        assert!(platform.projects().is_empty());
    }

    #[tokio::test]
    async fn test_graph_errors_precede_side_effects() {
        let platform = Arc::new(InMemoryPlatform::new());
        let (set, log) = recording_set(&platform);
        let graph = DependencyGraph::from_descriptors([
            ResourceDescriptor::new("repo1", ResourceKind::Repository),
            ResourceDescriptor::new("a", ResourceKind::Service).depends_on("b"),
            ResourceDescriptor::new("b", ResourceKind::Service).depends_on("a"),
        ])
        .unwrap();

        let err = PipelineOrchestrator::new(set).build(graph).await.unwrap_err();
        assert!(matches!(err, Error::CyclicDependency { .. }));
        assert!(log.lock().unwrap().is_empty());
        assert!(!platform.has_repository("repo1"));
    }

    #[tokio::test]
    async fn test_missing_provisioner_is_a_provisioning_error() {
        let err = PipelineOrchestrator::new(ProvisionerSet::new())
            .build(scenario_graph())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Provisioning { descriptor_id, cause: ProvisionCause::NoProvisioner(ResourceKind::Repository) }
                if descriptor_id == "repo1"
        ));
    }

    #[tokio::test]
    async fn test_graph_without_pipeline_cannot_assemble() {
        let platform = Arc::new(InMemoryPlatform::new());
        let set = ProvisionerSet::standard(&Collaborators::from_platform(platform));
        let graph = DependencyGraph::from_descriptors([ResourceDescriptor::new(
            "repo1",
            ResourceKind::Repository,
        )])
        .unwrap();

        let err = PipelineOrchestrator::new(set).build(graph).await.unwrap_err();
        assert!(matches!(err, Error::Assembly(_)));
    }

    #[tokio::test]
    async fn test_declared_build_project_is_used() {
        let platform = Arc::new(InMemoryPlatform::new());
        let set = ProvisionerSet::standard(&Collaborators::from_platform(platform.clone()));
        let mut graph = scenario_graph();
        graph
            .add_descriptor(
                ResourceDescriptor::new("build1", ResourceKind::BuildProject)
                    .depends_on("repo1")
                    .depends_on("svc1"),
            )
            .unwrap();
        // Re-declare the pipeline with the build project as a dependency.
        let mut descriptors: Vec<ResourceDescriptor> = graph.descriptors().cloned().collect();
        for d in descriptors.iter_mut().filter(|d| d.id == "pipe1") {
            d.depends_on.insert("build1".into());
        }
        let graph = DependencyGraph::from_descriptors(descriptors).unwrap();

        let pipeline = PipelineOrchestrator::new(set).build(graph).await.unwrap();
        let build = pipeline.stage(StageName::Build).unwrap();
        assert!(build.action.references_descriptor("build1"));
        assert_eq!(platform.projects(), vec!["build1".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_mode_provisions_waves() {
        let platform = Arc::new(InMemoryPlatform::new());
        let (set, log) = recording_set(&platform);
        let graph = DependencyGraph::from_descriptors([
            ResourceDescriptor::new("repo", ResourceKind::Repository),
            ResourceDescriptor::new("svc", ResourceKind::Service)
                .with_option("cluster-name", "demo")
                .depends_on("repo"),
            ResourceDescriptor::new("build", ResourceKind::BuildProject)
                .with_option("container-name", "svc-container")
                .depends_on("repo"),
            ResourceDescriptor::new("pipe", ResourceKind::Pipeline)
                .depends_on("repo")
                .depends_on("svc")
                .depends_on("build"),
        ])
        .unwrap();

        let pipeline = PipelineOrchestrator::new(set)
            .with_mode(ProvisioningMode::Concurrent)
            .build(graph)
            .await
            .unwrap();

        let log = log.lock().unwrap().clone();
        assert_eq!(log.first().map(String::as_str), Some("repo"));
        assert_eq!(log.last().map(String::as_str), Some("pipe"));
        assert_eq!(pipeline.provision_order, vec!["repo", "build", "svc", "pipe"]);
    }

    #[tokio::test]
    async fn test_concurrent_failure_stops_later_waves() {
        let platform = Arc::new(InMemoryPlatform::new());
        platform.fail_operation("create_service", "capacity unavailable");
        let (set, log) = recording_set(&platform);

        let err = PipelineOrchestrator::new(set)
            .with_mode(ProvisioningMode::Concurrent)
            .build(scenario_graph())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provisioning { descriptor_id, .. } if descriptor_id == "svc1"));
        assert!(!log.lock().unwrap().iter().any(|id| id == "pipe1"));
    }
}
