//! Core domain types and traits for Shipline.
//!
//! This crate contains:
//! - Descriptor and instance identifiers
//! - Resource descriptors and the dependency graph over them
//! - Provisioned handles and the provisioner trait
//! - Stage definitions and the assembled pipeline
//! - Artifact channels between stages
//! - Collaborator traits for the external platform

pub mod artifact;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod handle;
pub mod id;
pub mod pipeline;
pub mod platform;
pub mod provisioner;
pub mod stage;

pub use descriptor::{ConfigValue, ResourceDescriptor, ResourceKind};
pub use error::{Error, PlatformError, ProvisionCause, Result};
pub use graph::DependencyGraph;
pub use handle::ProvisionedHandle;
pub use id::{DescriptorId, InstanceId};
pub use pipeline::AssembledPipeline;
pub use provisioner::{ResolvedDependencies, ResourceProvisioner};
pub use stage::{StageDefinition, StageName};
