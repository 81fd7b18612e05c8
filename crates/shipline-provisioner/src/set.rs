//! Registry of provisioners keyed by resource kind.

use shipline_core::platform::Collaborators;
use shipline_core::{ResourceKind, ResourceProvisioner};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::build_project::BuildProjectProvisioner;
use crate::pipeline::{DEFAULT_DEPLOY_TIMEOUT, PipelineProvisioner};
use crate::repository::RepositoryProvisioner;
use crate::service::ServiceProvisioner;

/// One provisioner per resource kind.
#[derive(Clone, Default)]
pub struct ProvisionerSet {
    provisioners: HashMap<ResourceKind, Arc<dyn ResourceProvisioner>>,
}

impl ProvisionerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four standard provisioners wired to `collaborators`.
    pub fn standard(collaborators: &Collaborators) -> Self {
        Self::standard_with_timeout(collaborators, DEFAULT_DEPLOY_TIMEOUT)
    }

    pub fn standard_with_timeout(collaborators: &Collaborators, deploy_timeout: Duration) -> Self {
        Self::new()
            .with(Arc::new(RepositoryProvisioner::new(
                collaborators.registry.clone(),
            )))
            .with(Arc::new(ServiceProvisioner::new(
                collaborators.compute.clone(),
            )))
            .with(Arc::new(BuildProjectProvisioner::new(
                collaborators.builds.clone(),
            )))
            .with(Arc::new(
                PipelineProvisioner::new(collaborators.builds.clone(), collaborators.audit.clone())
                    .with_default_timeout(deploy_timeout),
            ))
    }

    /// Register a provisioner, replacing any previous one for the same kind.
    pub fn with(mut self, provisioner: Arc<dyn ResourceProvisioner>) -> Self {
        self.provisioners.insert(provisioner.kind(), provisioner);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<Arc<dyn ResourceProvisioner>> {
        self.provisioners.get(&kind).cloned()
    }
}
