//! Deployment context - the explicit values a deployment is parameterized by.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use shipline_core::{ResourceDescriptor, ResourceKind};
use std::collections::BTreeMap;

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_MEMORY_LIMIT_MIB: u32 = 1024;
pub const DEFAULT_CPU: u32 = 256;

/// Descriptor ids used by [`DeploymentContext::standard_descriptors`].
pub const REPOSITORY_ID: &str = "repository";
pub const SERVICE_ID: &str = "service";
pub const BUILD_PROJECT_ID: &str = "build";
pub const PIPELINE_ID: &str = "pipeline";

/// Values available as `${context.<key>}` and used to build the standard descriptor set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentContext {
    pub cluster_name: Option<String>,
    pub service_name: Option<String>,
    pub repository_name: Option<String>,
    pub port: u16,
    pub memory_limit_mib: u32,
    pub cpu: u32,
    /// Image the service starts with before the first deployment.
    pub image: Option<String>,
    /// Any other keys declared in the `context` block.
    pub extra: BTreeMap<String, String>,
}

impl Default for DeploymentContext {
    fn default() -> Self {
        Self {
            cluster_name: None,
            service_name: None,
            repository_name: None,
            port: DEFAULT_PORT,
            memory_limit_mib: DEFAULT_MEMORY_LIMIT_MIB,
            cpu: DEFAULT_CPU,
            image: None,
            extra: BTreeMap::new(),
        }
    }
}

impl DeploymentContext {
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "cluster-name" => self.cluster_name.clone(),
            "service-name" => self.service_name.clone(),
            "repo-name" | "repository-name" => self.repository_name.clone(),
            "port" => Some(self.port.to_string()),
            "memory-limit-mib" => Some(self.memory_limit_mib.to_string()),
            "cpu" => Some(self.cpu.to_string()),
            "image" => self.image.clone(),
            other => self.extra.get(other).cloned(),
        }
    }

    pub fn set(&mut self, key: &str, value: String) -> ConfigResult<()> {
        match key {
            "cluster-name" => self.cluster_name = Some(value),
            "service-name" => self.service_name = Some(value),
            "repo-name" | "repository-name" => self.repository_name = Some(value),
            "port" => self.port = parse_number(key, &value)?,
            "memory-limit-mib" => self.memory_limit_mib = parse_number(key, &value)?,
            "cpu" => self.cpu = parse_number(key, &value)?,
            "image" => self.image = Some(value),
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
        Ok(())
    }

    /// The canonical repository → service → build project → pipeline set.
    pub fn standard_descriptors(&self) -> Vec<ResourceDescriptor> {
        let mut repository = ResourceDescriptor::new(REPOSITORY_ID, ResourceKind::Repository);
        if let Some(name) = &self.repository_name {
            repository = repository.with_option("repository-name", name.clone());
        }

        let mut service = ResourceDescriptor::new(SERVICE_ID, ResourceKind::Service)
            .with_option("port", i64::from(self.port))
            .with_option("memory-limit-mib", i64::from(self.memory_limit_mib))
            .with_option("cpu", i64::from(self.cpu))
            .depends_on(REPOSITORY_ID);
        for (key, value) in [
            ("cluster-name", &self.cluster_name),
            ("service-name", &self.service_name),
            ("image", &self.image),
        ] {
            if let Some(value) = value {
                service = service.with_option(key, value.clone());
            }
        }

        let build = ResourceDescriptor::new(BUILD_PROJECT_ID, ResourceKind::BuildProject)
            .depends_on(REPOSITORY_ID)
            .depends_on(SERVICE_ID);

        let pipeline = ResourceDescriptor::new(PIPELINE_ID, ResourceKind::Pipeline)
            .depends_on(REPOSITORY_ID)
            .depends_on(SERVICE_ID)
            .depends_on(BUILD_PROJECT_ID);

        vec![repository, service, build, pipeline]
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(format!("context {key}"), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipline_core::DependencyGraph;

    #[test]
    fn test_defaults() {
        let ctx = DeploymentContext::default();
        assert_eq!(ctx.port, 80);
        assert_eq!(ctx.memory_limit_mib, 1024);
        assert_eq!(ctx.cpu, 256);
        assert_eq!(ctx.get("port").as_deref(), Some("80"));
        assert_eq!(ctx.get("cluster-name"), None);
    }

    #[test]
    fn test_set_known_and_extra_keys() {
        let mut ctx = DeploymentContext::default();
        ctx.set("repo-name", "web-images".to_string()).unwrap();
        ctx.set("port", "8080".to_string()).unwrap();
        ctx.set("team", "payments".to_string()).unwrap();

        assert_eq!(ctx.repository_name.as_deref(), Some("web-images"));
        assert_eq!(ctx.get("repository-name").as_deref(), Some("web-images"));
        assert_eq!(ctx.port, 8080);
        assert_eq!(ctx.get("team").as_deref(), Some("payments"));
    }

    #[test]
    fn test_invalid_port() {
        let mut ctx = DeploymentContext::default();
        let err = ctx.set("port", "70000".to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_standard_descriptors_form_a_valid_graph() {
        let ctx = DeploymentContext {
            cluster_name: Some("demo".to_string()),
            ..Default::default()
        };
        let mut graph = DependencyGraph::from_descriptors(ctx.standard_descriptors()).unwrap();
        graph.validate().unwrap();

        let order: Vec<&str> = graph
            .topological_order()
            .unwrap()
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(order, vec!["repository", "service", "build", "pipeline"]);

        let service = graph.get(&SERVICE_ID.into()).unwrap();
        assert_eq!(service.str_option("cluster-name").unwrap(), Some("demo"));
        assert_eq!(service.int_option("port").unwrap(), Some(80));
    }
}
