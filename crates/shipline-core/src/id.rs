//! Identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The user-chosen name of a resource descriptor (e.g. "repo1").
///
/// Ordering is lexicographic; the dependency graph relies on it to break ties
/// between independent descriptors.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(transparent)]
#[display("{_0}")]
pub struct DescriptorId(String);

impl DescriptorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DescriptorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DescriptorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for DescriptorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for DescriptorId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for DescriptorId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A unique identifier for runtime instances: handles, runs, artifact channels.
/// Uses UUIDv7 for time-ordered, sortable IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Create a new unique InstanceId using UUIDv7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for InstanceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::str::FromStr for InstanceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_ids_order_lexicographically() {
        let mut ids = vec![
            DescriptorId::from("svc"),
            DescriptorId::from("pipe"),
            DescriptorId::from("repo"),
        ];
        ids.sort();
        assert_eq!(ids, vec!["pipe", "repo", "svc"]);
    }

    #[test]
    fn test_instance_ids_are_unique() {
        assert_ne!(InstanceId::new(), InstanceId::new());
    }
}
