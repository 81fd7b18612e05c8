//! Resource provisioners for Shipline.
//!
//! Provides one provisioner per resource kind:
//! - Image repositories
//! - Container services
//! - Build projects
//! - Release pipelines
//!
//! and an in-memory platform backing all collaborators for dry runs.

pub mod build_project;
pub mod buildspec;
pub mod memory;
mod options;
pub mod pipeline;
pub mod repository;
pub mod service;
pub mod set;

pub use build_project::BuildProjectProvisioner;
pub use memory::InMemoryPlatform;
pub use pipeline::PipelineProvisioner;
pub use repository::RepositoryProvisioner;
pub use service::ServiceProvisioner;
pub use set::ProvisionerSet;
