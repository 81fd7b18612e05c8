//! Provisioner trait.
//!
//! A provisioner turns one descriptor plus the handles of its declared
//! dependencies into a live handle. It sees nothing else, so it cannot reach
//! a resource the graph has not ordered before it.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::descriptor::{ResourceDescriptor, ResourceKind};
use crate::error::ProvisionCause;
use crate::handle::ProvisionedHandle;
use crate::id::DescriptorId;

/// Handles of exactly the descriptors listed in a descriptor's `depends_on`.
#[derive(Debug, Clone, Default)]
pub struct ResolvedDependencies {
    handles: BTreeMap<DescriptorId, ProvisionedHandle>,
}

impl ResolvedDependencies {
    pub fn new(handles: BTreeMap<DescriptorId, ProvisionedHandle>) -> Self {
        Self { handles }
    }

    pub fn get(&self, id: &DescriptorId) -> Option<&ProvisionedHandle> {
        self.handles.get(id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ProvisionedHandle> {
        self.handles.values().filter(move |h| h.kind() == kind)
    }

    /// The single dependency of `kind`, if any. More than one is ambiguous.
    pub fn optional(&self, kind: ResourceKind) -> Result<Option<&ProvisionedHandle>, ProvisionCause> {
        let mut matches = self.of_kind(kind);
        let first = matches.next();
        if matches.next().is_some() {
            return Err(ProvisionCause::AmbiguousDependency {
                kind,
                candidates: self.of_kind(kind).map(|h| h.descriptor_id.clone()).collect(),
            });
        }
        Ok(first)
    }

    /// The single dependency of `kind`; missing or ambiguous is an error.
    pub fn require(&self, kind: ResourceKind) -> Result<&ProvisionedHandle, ProvisionCause> {
        self.optional(kind)?
            .ok_or(ProvisionCause::MissingDependency(kind))
    }
}

impl FromIterator<ProvisionedHandle> for ResolvedDependencies {
    fn from_iter<I: IntoIterator<Item = ProvisionedHandle>>(iter: I) -> Self {
        Self {
            handles: iter
                .into_iter()
                .map(|h| (h.descriptor_id.clone(), h))
                .collect(),
        }
    }
}

/// Constructs live resources of one kind.
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// The descriptor kind this provisioner handles.
    fn kind(&self) -> ResourceKind;

    /// Provision `descriptor` using only `resolved`.
    async fn provision(
        &self,
        descriptor: &ResourceDescriptor,
        resolved: &ResolvedDependencies,
    ) -> Result<ProvisionedHandle, ProvisionCause>;
}
