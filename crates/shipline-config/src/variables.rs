//! Variable interpolation for deployment option values.
//!
//! Supports variables like:
//! - `${context.cluster-name}` - A deployment context value
//! - `${env.VAR_NAME}` - Environment variable
//!
//! An unresolved variable is an error.

use crate::context::DeploymentContext;
use crate::{ConfigError, ConfigResult};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

// Regex for matching ${namespace.key} variables; keys may contain hyphens
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)\.([a-zA-Z_][a-zA-Z0-9_-]*)\}").unwrap()
});

/// The values visible to `${...}` placeholders.
#[derive(Debug, Clone, Copy)]
pub struct VariableScope<'a> {
    context: &'a DeploymentContext,
    env: &'a HashMap<String, String>,
}

impl<'a> VariableScope<'a> {
    pub fn new(context: &'a DeploymentContext, env: &'a HashMap<String, String>) -> Self {
        Self { context, env }
    }

    /// Resolve `namespace.key` to its value.
    pub fn resolve(&self, namespace: &str, key: &str) -> Option<String> {
        match namespace {
            "context" => self.context.get(key),
            "env" => self.env.get(key).cloned(),
            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    pub fn interpolate(&self, input: &str) -> ConfigResult<String> {
        let mut output = String::with_capacity(input.len());
        let mut last = 0;

        for caps in VAR_REGEX.captures_iter(input) {
            let (Some(whole), Some(namespace), Some(key)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let value = self
                .resolve(namespace.as_str(), key.as_str())
                .ok_or_else(|| {
                    ConfigError::UnknownVariable(format!("{}.{}", namespace.as_str(), key.as_str()))
                })?;
            output.push_str(&input[last..whole.start()]);
            output.push_str(&value);
            last = whole.end();
        }

        output.push_str(&input[last..]);
        Ok(output)
    }

    /// Interpolate variables in a list of strings.
    pub fn interpolate_vec(&self, inputs: &[String]) -> ConfigResult<Vec<String>> {
        inputs.iter().map(|s| self.interpolate(s)).collect()
    }
}
