//! Release pipeline provisioner.

use async_trait::async_trait;
use shipline_core::handle::{HandleDetail, PipelineHandle};
use shipline_core::platform::{AuditTrail, BuildService, PushListener};
use shipline_core::{
    ProvisionCause, ProvisionedHandle, ResolvedDependencies, ResourceDescriptor, ResourceKind,
    ResourceProvisioner,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::build_project::{DEFAULT_IMAGE_TAG, ProjectRequest, create_project};
use crate::options::{int_in_range, str_or};

pub const DEFAULT_DEPLOY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Binds a repository and a service into a release pipeline.
///
/// Without a build project dependency the pipeline registers its own, named
/// `<pipeline-name>-build`, targeting the service's container. A declared
/// build project fixes the watched tag: `image-tag` may be omitted, but a
/// different value is rejected.
///
/// Options: `pipeline-name`, `image-tag`, `deploy-timeout-minutes`,
/// `audit-push-events`.
pub struct PipelineProvisioner {
    builds: Arc<dyn BuildService>,
    audit: Option<Arc<dyn AuditTrail>>,
    default_timeout: Duration,
}

impl PipelineProvisioner {
    pub fn new(builds: Arc<dyn BuildService>, audit: Option<Arc<dyn AuditTrail>>) -> Self {
        Self {
            builds,
            audit,
            default_timeout: DEFAULT_DEPLOY_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Fire-and-forget: a failed registration never fails the pipeline.
    async fn register_listener(&self, descriptor: &ResourceDescriptor, listener: PushListener) {
        let Some(audit) = &self.audit else {
            return;
        };
        match audit.register_push_listener(&listener).await {
            Ok(()) => {
                info!(descriptor = %descriptor.id, repository = %listener.repository_name, "Push listener registered")
            }
            Err(e) => {
                warn!(descriptor = %descriptor.id, error = %e, "Failed to register push listener")
            }
        }
    }
}

#[async_trait]
impl ResourceProvisioner for PipelineProvisioner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Pipeline
    }

    async fn provision(
        &self,
        descriptor: &ResourceDescriptor,
        resolved: &ResolvedDependencies,
    ) -> Result<ProvisionedHandle, ProvisionCause> {
        let service_handle = resolved.require(ResourceKind::Service)?;
        let repository_handle = resolved.require(ResourceKind::Repository)?;
        let (Some(service), Some(repository)) =
            (service_handle.as_service(), repository_handle.as_repository())
        else {
            return Err(ProvisionCause::MissingDependency(ResourceKind::Service));
        };

        let pipeline_name = str_or(descriptor, "pipeline-name", || descriptor.id.to_string())?;
        let explicit_tag = descriptor.str_option("image-tag")?.map(str::to_string);
        let default_minutes = (self.default_timeout.as_secs() / 60).max(1) as i64;
        let timeout_minutes =
            int_in_range(descriptor, "deploy-timeout-minutes", default_minutes, 1..=24 * 60)?;

        let declared = resolved.optional(ResourceKind::BuildProject)?;
        let (build_project, project) = match declared.and_then(|h| h.as_build_project().map(|p| (h, p))) {
            Some((handle, project)) => {
                // Source watches the pipeline tag, so the build must template the same one.
                if let Some(tag) = explicit_tag.as_deref().filter(|t| *t != project.image_tag) {
                    return Err(ProvisionCause::InvalidOption {
                        key: "image-tag".to_string(),
                        message: format!(
                            "pipeline watches '{tag}' but build project '{}' builds '{}'",
                            handle.descriptor_id, project.image_tag
                        ),
                    });
                }
                (Some(handle.descriptor_id.clone()), project.clone())
            }
            None => {
                let project = create_project(
                    self.builds.as_ref(),
                    ProjectRequest {
                        project_name: format!("{pipeline_name}-build"),
                        repository,
                        image_tag: explicit_tag
                            .unwrap_or_else(|| DEFAULT_IMAGE_TAG.to_string()),
                        container_name: service.container_name.clone(),
                        commands: None,
                    },
                )
                .await?;
                (None, project)
            }
        };
        let image_tag = project.image_tag.clone();

        if descriptor.bool_option("audit-push-events")?.unwrap_or(true) {
            let listener = PushListener {
                description: format!("Logs push events for the repository {}", repository.name),
                repository_name: repository.name.clone(),
                repository_uri: repository.uri.clone(),
            };
            self.register_listener(descriptor, listener).await;
        }

        info!(
            descriptor = %descriptor.id,
            pipeline = %pipeline_name,
            repository = %repository_handle.descriptor_id,
            service = %service_handle.descriptor_id,
            "Pipeline ready"
        );

        Ok(ProvisionedHandle::new(
            descriptor.id.clone(),
            HandleDetail::Pipeline(PipelineHandle {
                pipeline_name,
                repository: repository_handle.descriptor_id.clone(),
                service: service_handle.descriptor_id.clone(),
                build_project,
                project,
                image_tag,
                deploy_timeout: Duration::from_secs(timeout_minutes as u64 * 60),
            }),
        ))
    }
}
