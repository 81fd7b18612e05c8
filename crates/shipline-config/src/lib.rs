//! KDL configuration parsing for Shipline.
//!
//! This crate handles parsing of:
//! - Deployment files (resources, context, settings)
//! - Variable interpolation in option values

pub mod context;
pub mod deployment;
pub mod error;
mod nodes;
pub mod settings;
pub mod variables;

pub use context::DeploymentContext;
pub use deployment::{DeploymentFile, load_deployment, parse_deployment, parse_deployment_with_env};
pub use error::{ConfigError, ConfigResult};
pub use settings::OrchestratorSettings;
pub use variables::VariableScope;
