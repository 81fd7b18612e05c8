//! Build project provisioner.

use async_trait::async_trait;
use shipline_core::handle::{BuildProjectHandle, HandleDetail, RepositoryHandle};
use shipline_core::platform::BuildService;
use shipline_core::{
    ProvisionCause, ProvisionedHandle, ResolvedDependencies, ResourceDescriptor, ResourceKind,
    ResourceProvisioner,
};
use std::sync::Arc;
use tracing::info;

use crate::buildspec::{self, BuildTemplateContext};
use crate::options::str_or;

pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Registers a build project whose manifest is templated from the repository.
///
/// Options:
/// - `project-name` (descriptor id)
/// - `image-tag` (`latest`)
/// - `container-name` (taken from a service dependency when there is one)
/// - `commands` (replaces the default manifest-writing commands)
pub struct BuildProjectProvisioner {
    builds: Arc<dyn BuildService>,
}

impl BuildProjectProvisioner {
    pub fn new(builds: Arc<dyn BuildService>) -> Self {
        Self { builds }
    }
}

/// What a build project needs, however it was declared.
pub(crate) struct ProjectRequest<'a> {
    pub project_name: String,
    pub repository: &'a RepositoryHandle,
    pub image_tag: String,
    pub container_name: String,
    pub commands: Option<Vec<String>>,
}

/// Render the build spec and register the project with the build collaborator.
pub(crate) async fn create_project(
    builds: &dyn BuildService,
    request: ProjectRequest<'_>,
) -> Result<BuildProjectHandle, ProvisionCause> {
    let ctx = BuildTemplateContext::new(
        request.repository,
        request.image_tag.clone(),
        request.container_name.clone(),
    );
    let spec = buildspec::render(&ctx, request.commands.as_deref());
    let platform_id = builds.create_project(&request.project_name, &spec).await?;

    Ok(BuildProjectHandle {
        platform_id,
        project_name: request.project_name,
        container_name: request.container_name,
        image_tag: request.image_tag,
        spec,
    })
}

#[async_trait]
impl ResourceProvisioner for BuildProjectProvisioner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::BuildProject
    }

    async fn provision(
        &self,
        descriptor: &ResourceDescriptor,
        resolved: &ResolvedDependencies,
    ) -> Result<ProvisionedHandle, ProvisionCause> {
        let repository = resolved
            .require(ResourceKind::Repository)?
            .as_repository()
            .ok_or(ProvisionCause::MissingDependency(ResourceKind::Repository))?;

        let service_container = resolved
            .optional(ResourceKind::Service)?
            .and_then(|h| h.as_service())
            .map(|s| s.container_name.clone());
        let container_name = match descriptor.str_option("container-name")? {
            Some(name) => name.to_string(),
            None => service_container
                .ok_or_else(|| ProvisionCause::MissingOption("container-name".to_string()))?,
        };

        let project = create_project(
            self.builds.as_ref(),
            ProjectRequest {
                project_name: str_or(descriptor, "project-name", || descriptor.id.to_string())?,
                repository,
                image_tag: str_or(descriptor, "image-tag", || DEFAULT_IMAGE_TAG.to_string())?,
                container_name,
                commands: descriptor.list_option("commands")?,
            },
        )
        .await?;
        info!(
            descriptor = %descriptor.id,
            project = %project.project_name,
            commands = project.spec.commands.len(),
            "Build project ready"
        );

        Ok(ProvisionedHandle::new(
            descriptor.id.clone(),
            HandleDetail::BuildProject(project),
        ))
    }
}
