//! In-memory platform implementing every collaborator.
//!
//! Used for local dry runs and tests. State lives behind a mutex; failures can
//! be injected per operation name (e.g. `create_service`).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};
use shipline_core::PlatformError;
use shipline_core::artifact::{IMAGE_DEFINITIONS_FILE, ImageDefinition, ImageDefinitions, SourceSnapshot};
use shipline_core::handle::{BuildProjectHandle, BuildSpec, ServiceHandle};
use shipline_core::platform::{
    AuditTrail, BuildOutput, BuildService, ComputePlatform, DeploymentReceipt, ImageDetail,
    ImageRegistry, PlatformResult, PushListener, ServiceSpec,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_REGISTRY_HOST: &str = "000000000000.dkr.ecr.local.amazonaws.com";

/// A deployment the platform performed.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRecord {
    pub service_name: String,
    pub image: String,
    pub timeout: Duration,
}

#[derive(Default)]
struct State {
    repositories: BTreeMap<String, BTreeMap<String, ImageDetail>>,
    services: Vec<ServiceSpec>,
    projects: BTreeMap<String, BuildSpec>,
    listeners: Vec<PushListener>,
    deployments: Vec<DeploymentRecord>,
    builds: u64,
    pushes: u64,
    failures: HashMap<String, String>,
}

pub struct InMemoryPlatform {
    registry_host: String,
    state: Mutex<State>,
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::with_registry_host(DEFAULT_REGISTRY_HOST)
    }

    pub fn with_registry_host(host: impl Into<String>) -> Self {
        Self {
            registry_host: host.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, operation: &str) -> PlatformResult<()> {
        match self.state().failures.get(operation) {
            Some(message) => Err(PlatformError::new(operation, message.clone())),
            None => Ok(()),
        }
    }

    /// Make every later call of `operation` fail with `message`.
    pub fn fail_operation(&self, operation: &str, message: &str) {
        self.state()
            .failures
            .insert(operation.to_string(), message.to_string());
    }

    pub fn clear_failure(&self, operation: &str) {
        self.state().failures.remove(operation);
    }

    pub fn repository_uri_for(&self, name: &str) -> String {
        format!("{}/{}", self.registry_host, name)
    }

    pub fn has_repository(&self, name: &str) -> bool {
        self.state().repositories.contains_key(name)
    }

    /// Push a new image under `tag`, returning its digest.
    pub fn push_image(&self, repository: &str, tag: &str) -> PlatformResult<ImageDetail> {
        let mut state = self.state();
        state.pushes += 1;
        let seq = state.pushes;
        let images = state.repositories.get_mut(repository).ok_or_else(|| {
            PlatformError::new("push_image", format!("repository '{repository}' does not exist"))
        })?;

        let hash = Sha256::digest(format!("{repository}:{tag}:{seq}").as_bytes());
        let detail = ImageDetail {
            digest: format!("sha256:{}", hex::encode(hash)),
            pushed_at: Utc::now(),
        };
        images.insert(tag.to_string(), detail.clone());
        debug!(repository, tag, digest = %detail.digest, "Image pushed");
        Ok(detail)
    }

    pub fn services(&self) -> Vec<ServiceSpec> {
        self.state().services.clone()
    }

    pub fn projects(&self) -> Vec<String> {
        self.state().projects.keys().cloned().collect()
    }

    pub fn listeners(&self) -> Vec<PushListener> {
        self.state().listeners.clone()
    }

    pub fn deployments(&self) -> Vec<DeploymentRecord> {
        self.state().deployments.clone()
    }

    pub fn build_count(&self) -> u64 {
        self.state().builds
    }
}

#[async_trait]
impl ImageRegistry for InMemoryPlatform {
    async fn create_repository(&self, name: &str) -> PlatformResult<()> {
        self.check("create_repository")?;
        self.state()
            .repositories
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn repository_uri(&self, name: &str) -> PlatformResult<String> {
        self.check("repository_uri")?;
        if !self.has_repository(name) {
            return Err(PlatformError::new(
                "repository_uri",
                format!("repository '{name}' does not exist"),
            ));
        }
        Ok(self.repository_uri_for(name))
    }

    async fn describe_image(&self, repository: &str, tag: &str) -> PlatformResult<ImageDetail> {
        self.check("describe_image")?;
        self.state()
            .repositories
            .get(repository)
            .and_then(|images| images.get(tag))
            .cloned()
            .ok_or_else(|| {
                PlatformError::new(
                    "describe_image",
                    format!("no image tagged '{tag}' in '{repository}'"),
                )
            })
    }
}

#[async_trait]
impl ComputePlatform for InMemoryPlatform {
    async fn create_service(&self, spec: &ServiceSpec) -> PlatformResult<String> {
        self.check("create_service")?;
        let mut state = self.state();
        state
            .services
            .retain(|s| !(s.cluster == spec.cluster && s.service_name == spec.service_name));
        state.services.push(spec.clone());
        Ok(format!("service/{}/{}", spec.cluster, spec.service_name))
    }

    async fn deploy_image(
        &self,
        service: &ServiceHandle,
        image: &str,
        timeout: Duration,
    ) -> PlatformResult<DeploymentReceipt> {
        self.check("deploy_image")?;
        let mut state = self.state();
        let Some(running) = state
            .services
            .iter_mut()
            .find(|s| s.cluster == service.cluster && s.service_name == service.service_name)
        else {
            return Err(PlatformError::new(
                "deploy_image",
                format!("service '{}' is not running", service.service_name),
            ));
        };
        running.image = image.to_string();

        state.deployments.push(DeploymentRecord {
            service_name: service.service_name.clone(),
            image: image.to_string(),
            timeout,
        });
        Ok(DeploymentReceipt {
            deployment_id: format!("deployment/{}/{}", service.service_name, state.deployments.len()),
            image: image.to_string(),
            completed_at: Utc::now(),
        })
    }
}

#[async_trait]
impl BuildService for InMemoryPlatform {
    async fn create_project(&self, name: &str, spec: &BuildSpec) -> PlatformResult<String> {
        self.check("create_project")?;
        self.state().projects.insert(name.to_string(), spec.clone());
        Ok(format!("project/{name}"))
    }

    /// Produces the manifest the default build commands would write.
    async fn start_build(
        &self,
        project: &BuildProjectHandle,
        source: &SourceSnapshot,
    ) -> PlatformResult<BuildOutput> {
        self.check("start_build")?;
        let mut state = self.state();
        if !state.projects.contains_key(&project.project_name) {
            return Err(PlatformError::new(
                "start_build",
                format!("project '{}' does not exist", project.project_name),
            ));
        }
        state.builds += 1;

        // The manifest names the image that was pushed, not the one the project was set up for.
        let manifest = ImageDefinitions(vec![ImageDefinition {
            name: project.container_name.clone(),
            image_uri: format!("{}:{}", source.repository_uri, source.tag),
        }]);
        let mut files = BTreeMap::new();
        for file in &project.spec.artifact_files {
            if file == IMAGE_DEFINITIONS_FILE {
                files.insert(file.clone(), Bytes::from(manifest.to_json()));
            }
        }
        Ok(BuildOutput {
            build_id: format!("{}:{}", project.project_name, state.builds),
            files,
        })
    }
}

#[async_trait]
impl AuditTrail for InMemoryPlatform {
    async fn register_push_listener(&self, listener: &PushListener) -> PlatformResult<()> {
        self.check("register_push_listener")?;
        self.state().listeners.push(listener.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_and_describe() {
        let platform = InMemoryPlatform::new();
        platform.create_repository("web").await.unwrap();
        assert!(platform.describe_image("web", "latest").await.is_err());

        let first = platform.push_image("web", "latest").unwrap();
        let second = platform.push_image("web", "latest").unwrap();
        assert_ne!(first.digest, second.digest);
        assert!(second.digest.starts_with("sha256:"));
        assert_eq!(
            platform.describe_image("web", "latest").await.unwrap(),
            second
        );
    }

    #[test]
    fn test_push_to_unknown_repository_fails() {
        let platform = InMemoryPlatform::new();
        assert!(platform.push_image("missing", "latest").is_err());
    }

    #[tokio::test]
    async fn test_build_manifest_names_pushed_tag() {
        let platform = InMemoryPlatform::new();
        let spec = BuildSpec {
            version: "0.2".to_string(),
            commands: Vec::new(),
            artifact_files: vec![IMAGE_DEFINITIONS_FILE.to_string()],
        };
        let platform_id = platform.create_project("build1", &spec).await.unwrap();
        let project = BuildProjectHandle {
            platform_id,
            project_name: "build1".to_string(),
            container_name: "web-container".to_string(),
            image_tag: "latest".to_string(),
            spec,
        };
        let source = SourceSnapshot {
            repository_uri: "registry.local/web".to_string(),
            tag: "stable".to_string(),
            digest: "sha256:abc".to_string(),
            pushed_at: Utc::now(),
        };

        let output = platform.start_build(&project, &source).await.unwrap();
        let manifest = ImageDefinitions::parse(&output.files[IMAGE_DEFINITIONS_FILE]).unwrap();
        assert_eq!(
            manifest.image_for("web-container"),
            Some("registry.local/web:stable")
        );
    }

    #[tokio::test]
    async fn test_injected_failure_until_cleared() {
        let platform = InMemoryPlatform::new();
        platform.fail_operation("create_repository", "throttled");
        let err = platform.create_repository("web").await.unwrap_err();
        assert_eq!(err.to_string(), "create_repository: throttled");

        platform.clear_failure("create_repository");
        assert!(platform.create_repository("web").await.is_ok());
    }
}
