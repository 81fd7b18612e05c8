//! Resource descriptors: pure-data declarations of provisionable units.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::ProvisionCause;
use crate::id::DescriptorId;

/// What a descriptor provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Service,
    Repository,
    BuildProject,
    Pipeline,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Service => write!(f, "service"),
            ResourceKind::Repository => write!(f, "repository"),
            ResourceKind::BuildProject => write!(f, "build_project"),
            ResourceKind::Pipeline => write!(f, "pipeline"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service" => Ok(ResourceKind::Service),
            "repository" => Ok(ResourceKind::Repository),
            "build_project" | "build-project" => Ok(ResourceKind::BuildProject),
            "pipeline" => Ok(ResourceKind::Pipeline),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

/// A single configuration value attached to a descriptor option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    String(String),
    List(Vec<String>),
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::String(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::String(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Integer(v)
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(v: Vec<String>) -> Self {
        ConfigValue::List(v)
    }
}

/// A named, typed declaration of something to provision, plus the ids it depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: DescriptorId,
    pub kind: ResourceKind,
    #[serde(default)]
    pub config: BTreeMap<String, ConfigValue>,
    #[serde(default)]
    pub depends_on: BTreeSet<DescriptorId>,
}

impl ResourceDescriptor {
    pub fn new(id: impl Into<DescriptorId>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            config: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn depends_on(mut self, id: impl Into<DescriptorId>) -> Self {
        self.depends_on.insert(id.into());
        self
    }

    /// String option, or `None` if absent. Non-string values are an error.
    pub fn str_option(&self, key: &str) -> Result<Option<&str>, ProvisionCause> {
        match self.config.get(key) {
            None => Ok(None),
            Some(ConfigValue::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(invalid(key, "a string", other)),
        }
    }

    pub fn required_str_option(&self, key: &str) -> Result<&str, ProvisionCause> {
        self.str_option(key)?
            .ok_or_else(|| ProvisionCause::MissingOption(key.to_string()))
    }

    /// Integer option. Numeric strings are accepted since context values arrive as text.
    pub fn int_option(&self, key: &str) -> Result<Option<i64>, ProvisionCause> {
        match self.config.get(key) {
            None => Ok(None),
            Some(ConfigValue::Integer(n)) => Ok(Some(*n)),
            Some(ConfigValue::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| invalid(key, "an integer", &ConfigValue::String(s.clone()))),
            Some(other) => Err(invalid(key, "an integer", other)),
        }
    }

    pub fn bool_option(&self, key: &str) -> Result<Option<bool>, ProvisionCause> {
        match self.config.get(key) {
            None => Ok(None),
            Some(ConfigValue::Bool(b)) => Ok(Some(*b)),
            Some(ConfigValue::String(s)) if s == "true" => Ok(Some(true)),
            Some(ConfigValue::String(s)) if s == "false" => Ok(Some(false)),
            Some(other) => Err(invalid(key, "a boolean", other)),
        }
    }

    pub fn list_option(&self, key: &str) -> Result<Option<Vec<String>>, ProvisionCause> {
        match self.config.get(key) {
            None => Ok(None),
            Some(ConfigValue::List(items)) => Ok(Some(items.clone())),
            Some(ConfigValue::String(s)) => Ok(Some(vec![s.clone()])),
            Some(other) => Err(invalid(key, "a list of strings", other)),
        }
    }
}

fn invalid(key: &str, expected: &str, got: &ConfigValue) -> ProvisionCause {
    ProvisionCause::InvalidOption {
        key: key.to_string(),
        message: format!("expected {expected}, got {got:?}"),
    }
}
