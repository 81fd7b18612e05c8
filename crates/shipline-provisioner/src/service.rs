//! Container service provisioner.

use async_trait::async_trait;
use shipline_core::handle::{HandleDetail, ServiceHandle};
use shipline_core::platform::{ComputePlatform, ServiceSpec};
use shipline_core::{
    ProvisionCause, ProvisionedHandle, ResolvedDependencies, ResourceDescriptor, ResourceKind,
    ResourceProvisioner,
};
use std::sync::Arc;
use tracing::info;

use crate::options::{int_in_range, str_or};

pub const DEFAULT_PORT: i64 = 80;
pub const DEFAULT_MEMORY_LIMIT_MIB: i64 = 1024;
pub const DEFAULT_CPU: i64 = 256;

/// Creates the running service, binding its image source to the repository dependency.
///
/// Options:
/// - `cluster-name` (required)
/// - `service-name` (descriptor id)
/// - `container-name` (`<service-name>-container`)
/// - `image` (`<repository-uri>:latest`)
/// - `port` (80), `memory-limit-mib` (1024), `cpu` (256), `desired-count` (1)
/// - `assign-public-ip` (true)
pub struct ServiceProvisioner {
    compute: Arc<dyn ComputePlatform>,
}

impl ServiceProvisioner {
    pub fn new(compute: Arc<dyn ComputePlatform>) -> Self {
        Self { compute }
    }

    fn spec(
        descriptor: &ResourceDescriptor,
        resolved: &ResolvedDependencies,
    ) -> Result<ServiceSpec, ProvisionCause> {
        let repository = resolved
            .require(ResourceKind::Repository)?
            .as_repository()
            .ok_or(ProvisionCause::MissingDependency(ResourceKind::Repository))?;

        let cluster = descriptor.required_str_option("cluster-name")?.to_string();
        let service_name = str_or(descriptor, "service-name", || descriptor.id.to_string())?;
        let container_name =
            str_or(descriptor, "container-name", || format!("{service_name}-container"))?;
        let image = str_or(descriptor, "image", || repository.uri_for_tag("latest"))?;

        Ok(ServiceSpec {
            cluster,
            container_name,
            image,
            port: int_in_range(descriptor, "port", DEFAULT_PORT, 1..=65535)? as u16,
            memory_limit_mib: int_in_range(
                descriptor,
                "memory-limit-mib",
                DEFAULT_MEMORY_LIMIT_MIB,
                512..=122_880,
            )? as u32,
            cpu: int_in_range(descriptor, "cpu", DEFAULT_CPU, 256..=16_384)? as u32,
            desired_count: int_in_range(descriptor, "desired-count", 1, 0..=1000)? as u32,
            assign_public_ip: descriptor.bool_option("assign-public-ip")?.unwrap_or(true),
            service_name,
        })
    }
}

#[async_trait]
impl ResourceProvisioner for ServiceProvisioner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Service
    }

    async fn provision(
        &self,
        descriptor: &ResourceDescriptor,
        resolved: &ResolvedDependencies,
    ) -> Result<ProvisionedHandle, ProvisionCause> {
        let spec = Self::spec(descriptor, resolved)?;
        let platform_id = self.compute.create_service(&spec).await?;
        info!(
            descriptor = %descriptor.id,
            cluster = %spec.cluster,
            service = %spec.service_name,
            image = %spec.image,
            "Service ready"
        );

        Ok(ProvisionedHandle::new(
            descriptor.id.clone(),
            HandleDetail::Service(ServiceHandle {
                platform_id,
                cluster: spec.cluster,
                service_name: spec.service_name,
                container_name: spec.container_name,
                image: spec.image,
                port: spec.port,
            }),
        ))
    }
}
