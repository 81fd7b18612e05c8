//! Image repository provisioner.

use async_trait::async_trait;
use shipline_core::handle::{HandleDetail, RepositoryHandle};
use shipline_core::platform::ImageRegistry;
use shipline_core::{
    ProvisionCause, ProvisionedHandle, ResolvedDependencies, ResourceDescriptor, ResourceKind,
    ResourceProvisioner,
};
use std::sync::Arc;
use tracing::info;

/// Creates a named repository and reads back its canonical location.
///
/// Options: `repository-name` (defaults to the descriptor id).
pub struct RepositoryProvisioner {
    registry: Arc<dyn ImageRegistry>,
}

impl RepositoryProvisioner {
    pub fn new(registry: Arc<dyn ImageRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ResourceProvisioner for RepositoryProvisioner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Repository
    }

    async fn provision(
        &self,
        descriptor: &ResourceDescriptor,
        _resolved: &ResolvedDependencies,
    ) -> Result<ProvisionedHandle, ProvisionCause> {
        let name = descriptor
            .str_option("repository-name")?
            .unwrap_or(descriptor.id.as_str())
            .to_string();
        if name.is_empty() {
            return Err(ProvisionCause::InvalidOption {
                key: "repository-name".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        self.registry.create_repository(&name).await?;
        let uri = self.registry.repository_uri(&name).await?;
        info!(descriptor = %descriptor.id, repository = %name, %uri, "Repository ready");

        Ok(ProvisionedHandle::new(
            descriptor.id.clone(),
            HandleDetail::Repository(RepositoryHandle { name, uri }),
        ))
    }
}
