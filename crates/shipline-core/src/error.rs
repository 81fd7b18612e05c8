//! Error types for Shipline.

use thiserror::Error;

use crate::artifact::PayloadKind;
use crate::descriptor::ResourceKind;
use crate::id::DescriptorId;
use crate::stage::StageName;

#[derive(Debug, Error)]
pub enum Error {
    #[error("duplicate descriptor id: {id}")]
    DuplicateId { id: DescriptorId },

    #[error("descriptor '{descriptor}' depends on unknown descriptor '{dependency}'")]
    UnknownDependency {
        descriptor: DescriptorId,
        dependency: DescriptorId,
    },

    #[error("cyclic dependency: {}", render_path(.path))]
    CyclicDependency { path: Vec<DescriptorId> },

    #[error("dependency graph has not been validated")]
    GraphNotValidated,

    #[error("failed to provision '{descriptor_id}': {cause}")]
    Provisioning {
        descriptor_id: DescriptorId,
        #[source]
        cause: ProvisionCause,
    },

    #[error("pipeline assembly failed: {0}")]
    Assembly(String),

    #[error("stage {stage} failed: {message}")]
    StageFailed { stage: StageName, message: String },

    #[error("artifact '{name}' was not produced")]
    ArtifactNotProduced { name: String },

    #[error("artifact '{name}' carries {expected} payloads, got {actual}")]
    ArtifactKindMismatch {
        name: String,
        expected: PayloadKind,
        actual: PayloadKind,
    },

    #[error("pipeline run aborted: {0}")]
    RunAborted(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a single descriptor could not be provisioned.
#[derive(Debug, Error)]
pub enum ProvisionCause {
    #[error("missing required {0} dependency")]
    MissingDependency(ResourceKind),

    #[error("ambiguous {kind} dependency: {candidates:?}")]
    AmbiguousDependency {
        kind: ResourceKind,
        candidates: Vec<DescriptorId>,
    },

    #[error("missing required option '{0}'")]
    MissingOption(String),

    #[error("invalid value for option '{key}': {message}")]
    InvalidOption { key: String, message: String },

    #[error("no provisioner registered for {0} resources")]
    NoProvisioner(ResourceKind),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Failure reported by an external collaborator (compute, registry, build, audit).
#[derive(Debug, Clone, Error)]
#[error("{operation}: {message}")]
pub struct PlatformError {
    pub operation: String,
    pub message: String,
}

impl PlatformError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

fn render_path(path: &[DescriptorId]) -> String {
    path.iter()
        .map(DescriptorId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
