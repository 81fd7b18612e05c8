//! Deployment file parsing.

use crate::context::DeploymentContext;
use crate::nodes::{
    get_args, get_first_arg, get_first_string_arg, get_string_list_prop, get_string_prop,
    scalar_text,
};
use crate::settings::OrchestratorSettings;
use crate::variables::VariableScope;
use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode, KdlValue};
use shipline_core::{ConfigValue, DependencyGraph, ResourceDescriptor, ResourceKind};
use std::collections::HashMap;
use std::path::Path;

const DEPENDS_ON: &str = "depends-on";

/// A parsed deployment file.
#[derive(Debug, Clone)]
pub struct DeploymentFile {
    pub name: String,
    pub context: DeploymentContext,
    pub settings: OrchestratorSettings,
    pub descriptors: Vec<ResourceDescriptor>,
}

impl DeploymentFile {
    /// The descriptors as an unvalidated graph.
    pub fn graph(&self) -> ConfigResult<DependencyGraph> {
        Ok(DependencyGraph::from_descriptors(
            self.descriptors.iter().cloned(),
        )?)
    }

    /// The descriptors as a graph that has passed validation.
    pub fn validated_graph(&self) -> ConfigResult<DependencyGraph> {
        let mut graph = self.graph()?;
        graph.validate()?;
        Ok(graph)
    }
}

/// Read and parse a deployment file, resolving `${env.*}` from the process environment.
pub fn load_deployment(path: &Path) -> ConfigResult<DeploymentFile> {
    let text = std::fs::read_to_string(path)?;
    parse_deployment(&text)
}

/// Parse a deployment from KDL text, resolving `${env.*}` from the process environment.
pub fn parse_deployment(kdl: &str) -> ConfigResult<DeploymentFile> {
    let env: HashMap<String, String> = std::env::vars().collect();
    parse_deployment_with_env(kdl, &env)
}

/// Parse a deployment from KDL text against an explicit environment.
///
/// A file without `resource` nodes gets the standard descriptor set derived
/// from its `context`.
pub fn parse_deployment_with_env(
    kdl: &str,
    env: &HashMap<String, String>,
) -> ConfigResult<DeploymentFile> {
    let doc: KdlDocument = kdl.parse()?;

    let mut name = None;
    let mut context = DeploymentContext::default();
    let mut settings = OrchestratorSettings::default();
    let mut resource_nodes = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "deployment" => {
                if name.is_some() {
                    return Err(ConfigError::Duplicate("deployment".to_string()));
                }
                name = Some(
                    get_first_string_arg(node)
                        .ok_or_else(|| ConfigError::MissingField("deployment name".to_string()))?,
                );
            }
            "context" => parse_context(node, &mut context)?,
            "settings" => settings = OrchestratorSettings::from_node(node)?,
            "resource" => resource_nodes.push(node),
            _ => {} // Ignore unknown nodes
        }
    }

    let name = name.ok_or_else(|| ConfigError::MissingField("deployment name".to_string()))?;

    // Resources are read last so `${context.*}` sees the whole context block.
    let scope = VariableScope::new(&context, env);
    // Duplicate ids surface from `graph()` as `DuplicateId`.
    let mut descriptors = resource_nodes
        .into_iter()
        .map(|node| parse_resource(node, &scope))
        .collect::<ConfigResult<Vec<_>>>()?;
    if descriptors.is_empty() {
        descriptors = context.standard_descriptors();
    }

    Ok(DeploymentFile {
        name,
        context,
        settings,
        descriptors,
    })
}

fn parse_context(node: &KdlNode, context: &mut DeploymentContext) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };
    for child in children.nodes() {
        let key = child.name().value();
        let value = get_first_arg(child)
            .and_then(scalar_text)
            .ok_or_else(|| ConfigError::MissingField(format!("value for context '{key}'")))?;
        context.set(key, value)?;
    }
    Ok(())
}

fn parse_resource(node: &KdlNode, scope: &VariableScope<'_>) -> ConfigResult<ResourceDescriptor> {
    let id = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("resource id".to_string()))?;
    let kind: ResourceKind = get_string_prop(node, "kind")
        .ok_or_else(|| ConfigError::MissingField(format!("kind for resource '{id}'")))?
        .parse()
        .map_err(|e: String| ConfigError::invalid(format!("kind of resource '{id}'"), e))?;

    let mut descriptor = ResourceDescriptor::new(id.as_str(), kind);
    for dependency in get_string_list_prop(node, DEPENDS_ON) {
        descriptor = descriptor.depends_on(dependency);
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value();
            if key == DEPENDS_ON {
                continue;
            }
            if descriptor.config.contains_key(key) {
                return Err(ConfigError::Duplicate(format!(
                    "option '{key}' on resource '{id}'"
                )));
            }
            let value = parse_option_value(&id, child, scope)?;
            descriptor.config.insert(key.to_string(), value);
        }
    }

    Ok(descriptor)
}

/// One argument is a scalar; several are a list of strings.
fn parse_option_value(
    id: &str,
    node: &KdlNode,
    scope: &VariableScope<'_>,
) -> ConfigResult<ConfigValue> {
    let key = node.name().value();
    let field = || format!("option '{key}' on resource '{id}'");

    match get_args(node).as_slice() {
        [] => Err(ConfigError::MissingField(format!("value for {}", field()))),
        [single] => scalar_option(single, scope).ok_or_else(|| {
            ConfigError::invalid(field(), "expected a string, integer or boolean")
        })?,
        many => {
            let items = many
                .iter()
                .map(|v| {
                    v.as_string()
                        .map(|s| s.to_string())
                        .ok_or_else(|| ConfigError::invalid(field(), "list items must be strings"))
                })
                .collect::<ConfigResult<Vec<String>>>()?;
            Ok(ConfigValue::List(scope.interpolate_vec(&items)?))
        }
    }
}

fn scalar_option(
    value: &KdlValue,
    scope: &VariableScope<'_>,
) -> Option<ConfigResult<ConfigValue>> {
    if let Some(s) = value.as_string() {
        return Some(scope.interpolate(s).map(ConfigValue::String));
    }
    if let Some(i) = value.as_integer() {
        return Some(
            i64::try_from(i)
                .map(ConfigValue::Integer)
                .map_err(|e| ConfigError::invalid("integer option", e.to_string())),
        );
    }
    value.as_bool().map(|b| Ok(ConfigValue::Bool(b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipline_core::Error;
    use std::time::Duration;

    const EXAMPLE: &str = r#"
        deployment "pipelined-fargate"

        context {
            cluster-name "demo-cluster"
            service-name "web"
            repo-name "web-images"
            port 8080
        }

        settings {
            concurrent-provisioning #true
            deploy-timeout-minutes 30
        }

        resource "repo" kind="repository" {
            repository-name "${context.repo-name}"
        }

        resource "svc" kind="service" depends-on="repo" {
            cluster-name "${context.cluster-name}"
            service-name "${context.service-name}-${env.STAGE}"
            port "${context.port}"
            assign-public-ip #false
        }

        resource "pipe" kind="pipeline" depends-on="repo" depends-on="svc"
    "#;

    fn env() -> HashMap<String, String> {
        HashMap::from([("STAGE".to_string(), "prod".to_string())])
    }

    #[test]
    fn test_parse_example_deployment() {
        let file = parse_deployment_with_env(EXAMPLE, &env()).unwrap();

        assert_eq!(file.name, "pipelined-fargate");
        assert_eq!(file.context.port, 8080);
        assert!(file.settings.concurrent_provisioning);
        assert_eq!(file.settings.deploy_timeout, Duration::from_secs(1800));
        assert!(file.settings.audit_push_events);
        assert_eq!(file.descriptors.len(), 3);

        let repo = &file.descriptors[0];
        assert_eq!(repo.kind, ResourceKind::Repository);
        assert_eq!(
            repo.str_option("repository-name").unwrap(),
            Some("web-images")
        );

        let svc = &file.descriptors[1];
        assert_eq!(svc.str_option("service-name").unwrap(), Some("web-prod"));
        assert_eq!(svc.int_option("port").unwrap(), Some(8080));
        assert_eq!(svc.bool_option("assign-public-ip").unwrap(), Some(false));
        assert!(svc.depends_on.contains(&"repo".into()));
    }

    #[test]
    fn test_repeated_depends_on() {
        let file = parse_deployment_with_env(EXAMPLE, &env()).unwrap();
        let pipe = &file.descriptors[2];
        let deps: Vec<&str> = pipe.depends_on.iter().map(|d| d.as_str()).collect();
        assert_eq!(deps, vec!["repo", "svc"]);
    }

    #[test]
    fn test_depends_on_block_syntax() {
        let kdl = r#"
            deployment "d"
            resource "repo" kind="repository"
            resource "pipe" kind="pipeline" {
                depends-on "repo" "svc"
                image-tag "stable"
            }
        "#;
        let file = parse_deployment_with_env(kdl, &HashMap::new()).unwrap();
        let pipe = &file.descriptors[1];
        assert_eq!(pipe.depends_on.len(), 2);
        assert!(!pipe.config.contains_key(DEPENDS_ON));
        assert_eq!(pipe.str_option("image-tag").unwrap(), Some("stable"));
    }

    #[test]
    fn test_list_option() {
        let kdl = r#"
            deployment "d"
            resource "build" kind="build-project" {
                commands "make" "make push"
            }
        "#;
        let file = parse_deployment_with_env(kdl, &HashMap::new()).unwrap();
        let build = &file.descriptors[0];
        assert_eq!(build.kind, ResourceKind::BuildProject);
        assert_eq!(
            build.list_option("commands").unwrap(),
            Some(vec!["make".to_string(), "make push".to_string()])
        );
    }

    #[test]
    fn test_unknown_variable() {
        let err = parse_deployment_with_env(EXAMPLE, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVariable(name) if name == "env.STAGE"));
    }

    #[test]
    fn test_missing_deployment_name() {
        let err = parse_deployment_with_env(r#"resource "repo" kind="repository""#, &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn test_duplicate_resource() {
        let kdl = r#"
            deployment "d"
            resource "repo" kind="repository"
            resource "repo" kind="repository"
        "#;
        let file = parse_deployment_with_env(kdl, &HashMap::new()).unwrap();
        assert_eq!(file.descriptors.len(), 2);
        let err = file.graph().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Graph(Error::DuplicateId { id }) if id == "repo"
        ));
    }

    #[test]
    fn test_unknown_kind() {
        let kdl = r#"
            deployment "d"
            resource "db" kind="database"
        "#;
        let err = parse_deployment_with_env(kdl, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_without_resources_uses_standard_set() {
        let kdl = r#"
            deployment "standard"
            context {
                cluster-name "demo"
            }
        "#;
        let file = parse_deployment_with_env(kdl, &HashMap::new()).unwrap();
        assert_eq!(file.descriptors, file.context.standard_descriptors());
        assert!(file.validated_graph().is_ok());
    }

    #[test]
    fn test_validated_graph_reports_cycles() {
        let kdl = r#"
            deployment "cyclic"
            resource "a" kind="service" depends-on="b"
            resource "b" kind="service" depends-on="a"
        "#;
        let file = parse_deployment_with_env(kdl, &HashMap::new()).unwrap();
        assert!(file.graph().is_ok());

        let err = file.validated_graph().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Graph(Error::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let kdl = r#"
            deployment "d"
            resource "svc" kind="service" depends-on="nonexistent"
        "#;
        let file = parse_deployment_with_env(kdl, &HashMap::new()).unwrap();
        assert!(matches!(
            file.validated_graph().unwrap_err(),
            ConfigError::Graph(Error::UnknownDependency { .. })
        ));
    }
}
