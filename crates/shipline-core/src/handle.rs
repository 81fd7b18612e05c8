//! Handles to provisioned resources.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::descriptor::ResourceKind;
use crate::id::{DescriptorId, InstanceId};

/// The live result of provisioning one descriptor.
///
/// The graph never looks inside a handle; dependent provisioners and the
/// orchestrator read the kind-specific detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedHandle {
    pub descriptor_id: DescriptorId,
    pub instance_id: InstanceId,
    pub detail: HandleDetail,
}

impl ProvisionedHandle {
    pub fn new(descriptor_id: DescriptorId, detail: HandleDetail) -> Self {
        Self {
            descriptor_id,
            instance_id: InstanceId::new(),
            detail,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match &self.detail {
            HandleDetail::Repository(_) => ResourceKind::Repository,
            HandleDetail::Service(_) => ResourceKind::Service,
            HandleDetail::BuildProject(_) => ResourceKind::BuildProject,
            HandleDetail::Pipeline(_) => ResourceKind::Pipeline,
        }
    }

    pub fn as_repository(&self) -> Option<&RepositoryHandle> {
        match &self.detail {
            HandleDetail::Repository(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&ServiceHandle> {
        match &self.detail {
            HandleDetail::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_build_project(&self) -> Option<&BuildProjectHandle> {
        match &self.detail {
            HandleDetail::BuildProject(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_pipeline(&self) -> Option<&PipelineHandle> {
        match &self.detail {
            HandleDetail::Pipeline(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HandleDetail {
    Repository(RepositoryHandle),
    Service(ServiceHandle),
    BuildProject(BuildProjectHandle),
    Pipeline(PipelineHandle),
}

/// An image repository in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryHandle {
    pub name: String,
    /// Canonical location, e.g. `123456789012.dkr.ecr.eu-west-1.amazonaws.com/web`.
    pub uri: String,
}

impl RepositoryHandle {
    pub fn uri_for_tag(&self, tag: &str) -> String {
        format!("{}:{}", self.uri, tag)
    }
}

/// A running container service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHandle {
    /// Platform-assigned identifier.
    pub platform_id: String,
    pub cluster: String,
    pub service_name: String,
    pub container_name: String,
    pub image: String,
    pub port: u16,
}

/// A build project able to produce the image-definition manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildProjectHandle {
    /// Platform-assigned identifier.
    pub platform_id: String,
    pub project_name: String,
    /// Container the manifest names.
    pub container_name: String,
    pub image_tag: String,
    pub spec: BuildSpec,
}

/// A release pipeline bound to one repository and one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineHandle {
    pub pipeline_name: String,
    pub repository: DescriptorId,
    pub service: DescriptorId,
    /// Set when the build project is a separate descriptor.
    pub build_project: Option<DescriptorId>,
    /// The build project used by the Build stage, declared or created inline.
    pub project: BuildProjectHandle,
    /// Tag the Source stage watches.
    pub image_tag: String,
    #[serde(with = "duration_secs")]
    pub deploy_timeout: Duration,
}

/// Build instructions submitted to the build collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub version: String,
    /// Shell commands, run in order.
    pub commands: Vec<String>,
    /// Files collected as the build's output artifact.
    pub artifact_files: Vec<String>,
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
