//! Orchestrator settings from the `settings` block.

use crate::nodes::get_first_arg;
use crate::{ConfigError, ConfigResult};
use kdl::KdlNode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_DEPLOY_TIMEOUT_MINUTES: u64 = 60;
const MAX_DEPLOY_TIMEOUT_MINUTES: i128 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Provision each wave of independent resources at once.
    pub concurrent_provisioning: bool,
    /// Default deploy stage timeout for pipelines that do not set one.
    pub deploy_timeout: Duration,
    /// Register push listeners with the audit trail.
    pub audit_push_events: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            concurrent_provisioning: false,
            deploy_timeout: Duration::from_secs(DEFAULT_DEPLOY_TIMEOUT_MINUTES * 60),
            audit_push_events: true,
        }
    }
}

impl OrchestratorSettings {
    pub(crate) fn from_node(node: &KdlNode) -> ConfigResult<Self> {
        let mut settings = Self::default();
        let Some(children) = node.children() else {
            return Ok(settings);
        };

        for child in children.nodes() {
            let key = child.name().value();
            let value = get_first_arg(child)
                .ok_or_else(|| ConfigError::MissingField(format!("value for setting '{key}'")))?;
            match key {
                "concurrent-provisioning" => {
                    settings.concurrent_provisioning = value
                        .as_bool()
                        .ok_or_else(|| ConfigError::invalid(key, "expected #true or #false"))?;
                }
                "audit-push-events" => {
                    settings.audit_push_events = value
                        .as_bool()
                        .ok_or_else(|| ConfigError::invalid(key, "expected #true or #false"))?;
                }
                "deploy-timeout-minutes" => {
                    let minutes = value
                        .as_integer()
                        .filter(|m| (1..=MAX_DEPLOY_TIMEOUT_MINUTES).contains(m))
                        .ok_or_else(|| {
                            ConfigError::invalid(
                                key,
                                format!("expected minutes in 1..={MAX_DEPLOY_TIMEOUT_MINUTES}"),
                            )
                        })?;
                    settings.deploy_timeout = Duration::from_secs(minutes as u64 * 60);
                }
                other => {
                    return Err(ConfigError::invalid(
                        "settings",
                        format!("unknown setting '{other}'"),
                    ));
                }
            }
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdl::KdlDocument;

    fn parse(kdl: &str) -> ConfigResult<OrchestratorSettings> {
        let doc: KdlDocument = kdl.parse()?;
        OrchestratorSettings::from_node(&doc.nodes()[0])
    }

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings = parse("settings").unwrap();
        assert_eq!(settings, OrchestratorSettings::default());
        assert_eq!(settings.deploy_timeout, Duration::from_secs(3600));
        assert!(settings.audit_push_events);
    }

    #[test]
    fn test_parse_settings() {
        let settings = parse(
            r#"
            settings {
                concurrent-provisioning #true
                deploy-timeout-minutes 15
                audit-push-events #false
            }
            "#,
        )
        .unwrap();
        assert!(settings.concurrent_provisioning);
        assert_eq!(settings.deploy_timeout, Duration::from_secs(900));
        assert!(!settings.audit_push_events);
    }

    #[test]
    fn test_timeout_out_of_range() {
        let err = parse("settings {\n deploy-timeout-minutes 0\n}").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "deploy-timeout-minutes"));
    }

    #[test]
    fn test_unknown_setting() {
        assert!(parse("settings {\n retries 3\n}").is_err());
    }
}
