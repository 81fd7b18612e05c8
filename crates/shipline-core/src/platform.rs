//! External collaborator traits.
//!
//! Container scheduling, image storage, builds and audit logging belong to an
//! external platform. Provisioners and the pipeline runner talk to it only
//! through these traits.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::artifact::SourceSnapshot;
use crate::error::PlatformError;
use crate::handle::{BuildProjectHandle, BuildSpec, ServiceHandle};

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Desired state of a container service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub cluster: String,
    pub service_name: String,
    pub container_name: String,
    pub image: String,
    pub port: u16,
    pub memory_limit_mib: u32,
    pub cpu: u32,
    pub desired_count: u32,
    pub assign_public_ip: bool,
}

/// Outcome of rolling a service onto a new image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentReceipt {
    pub deployment_id: String,
    pub image: String,
    pub completed_at: DateTime<Utc>,
}

/// An image as the registry reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDetail {
    pub digest: String,
    pub pushed_at: DateTime<Utc>,
}

/// Files a finished build collected.
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub build_id: String,
    pub files: BTreeMap<String, Bytes>,
}

/// Listener registration for repository push events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushListener {
    pub description: String,
    pub repository_name: String,
    pub repository_uri: String,
}

#[async_trait]
pub trait ComputePlatform: Send + Sync {
    /// Create or update a service; returns the platform id.
    async fn create_service(&self, spec: &ServiceSpec) -> PlatformResult<String>;

    /// Roll the service onto `image`, giving up after `timeout`.
    async fn deploy_image(
        &self,
        service: &ServiceHandle,
        image: &str,
        timeout: Duration,
    ) -> PlatformResult<DeploymentReceipt>;
}

#[async_trait]
pub trait ImageRegistry: Send + Sync {
    async fn create_repository(&self, name: &str) -> PlatformResult<()>;

    /// Canonical location string of the repository.
    async fn repository_uri(&self, name: &str) -> PlatformResult<String>;

    async fn describe_image(&self, repository: &str, tag: &str) -> PlatformResult<ImageDetail>;
}

#[async_trait]
pub trait BuildService: Send + Sync {
    /// Register a build project; returns the platform id.
    async fn create_project(&self, name: &str, spec: &BuildSpec) -> PlatformResult<String>;

    /// Run the project's build against `source` and collect its artifact files.
    async fn start_build(
        &self,
        project: &BuildProjectHandle,
        source: &SourceSnapshot,
    ) -> PlatformResult<BuildOutput>;
}

#[async_trait]
pub trait AuditTrail: Send + Sync {
    async fn register_push_listener(&self, listener: &PushListener) -> PlatformResult<()>;
}

/// The set of collaborators shared by provisioners and the runner.
#[derive(Clone)]
pub struct Collaborators {
    pub compute: Arc<dyn ComputePlatform>,
    pub registry: Arc<dyn ImageRegistry>,
    pub builds: Arc<dyn BuildService>,
    pub audit: Option<Arc<dyn AuditTrail>>,
}

impl Collaborators {
    /// Use one platform object for every collaborator.
    pub fn from_platform<P>(platform: Arc<P>) -> Self
    where
        P: ComputePlatform + ImageRegistry + BuildService + AuditTrail + 'static,
    {
        Self {
            compute: platform.clone(),
            registry: platform.clone(),
            builds: platform.clone(),
            audit: Some(platform),
        }
    }

    pub fn without_audit(mut self) -> Self {
        self.audit = None;
        self
    }
}
