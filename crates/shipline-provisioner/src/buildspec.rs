//! Build specification templating.
//!
//! Build commands may reference:
//! - `${repository.uri}` - Canonical repository location
//! - `${repository.name}` - Repository name
//! - `${image.tag}` - Tag the pipeline deploys
//! - `${container.name}` - Container named in the manifest
//!
//! Unknown variables are left untouched.

use regex::Regex;
use shipline_core::artifact::IMAGE_DEFINITIONS_FILE;
use shipline_core::handle::{BuildSpec, RepositoryHandle};
use std::sync::LazyLock;

pub const BUILD_SPEC_VERSION: &str = "0.2";

static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*\.[a-zA-Z_][a-zA-Z0-9_]*)\}").unwrap()
});

/// Values available to build command templates.
#[derive(Debug, Clone)]
pub struct BuildTemplateContext {
    pub repository_uri: String,
    pub repository_name: String,
    pub image_tag: String,
    pub container_name: String,
}

impl BuildTemplateContext {
    pub fn new(
        repository: &RepositoryHandle,
        image_tag: impl Into<String>,
        container_name: impl Into<String>,
    ) -> Self {
        Self {
            repository_uri: repository.uri.clone(),
            repository_name: repository.name.clone(),
            image_tag: image_tag.into(),
            container_name: container_name.into(),
        }
    }

    pub fn resolve(&self, var_name: &str) -> Option<&str> {
        match var_name {
            "repository.uri" => Some(self.repository_uri.as_str()),
            "repository.name" => Some(self.repository_name.as_str()),
            "image.tag" => Some(self.image_tag.as_str()),
            "container.name" => Some(self.container_name.as_str()),
            _ => None,
        }
    }

    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }
}

/// Commands that write the image-definition manifest for the deployed container.
pub fn default_commands() -> Vec<String> {
    vec![
        "echo Creating imagedefinitions.json".to_string(),
        format!(
            r#"printf '[{{"name":"${{container.name}}","imageUri":"${{repository.uri}}:${{image.tag}}"}}]' > {IMAGE_DEFINITIONS_FILE}"#
        ),
        format!("cat {IMAGE_DEFINITIONS_FILE}"),
        "echo Build completed on `date`".to_string(),
    ]
}

/// Render a build spec whose only artifact is the image-definition manifest.
pub fn render(ctx: &BuildTemplateContext, commands: Option<&[String]>) -> BuildSpec {
    let defaults;
    let commands: &[String] = match commands {
        Some(c) => c,
        None => {
            defaults = default_commands();
            &defaults
        }
    };
    BuildSpec {
        version: BUILD_SPEC_VERSION.to_string(),
        commands: commands.iter().map(|c| ctx.interpolate(c)).collect(),
        artifact_files: vec![IMAGE_DEFINITIONS_FILE.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> BuildTemplateContext {
        BuildTemplateContext::new(
            &RepositoryHandle {
                name: "web".to_string(),
                uri: "123.dkr.ecr.eu-west-1.amazonaws.com/web".to_string(),
            },
            "latest",
            "web-container",
        )
    }

    #[test]
    fn test_default_commands_write_manifest() {
        let spec = render(&ctx(), None);
        assert_eq!(spec.version, "0.2");
        assert_eq!(spec.artifact_files, vec!["imagedefinitions.json"]);
        assert_eq!(
            spec.commands[1],
            r#"printf '[{"name":"web-container","imageUri":"123.dkr.ecr.eu-west-1.amazonaws.com/web:latest"}]' > imagedefinitions.json"#
        );
    }

    #[test]
    fn test_custom_commands_are_interpolated() {
        let commands = vec!["docker pull ${repository.uri}:${image.tag}".to_string()];
        let spec = render(&ctx(), Some(commands.as_slice()));
        assert_eq!(
            spec.commands,
            vec!["docker pull 123.dkr.ecr.eu-west-1.amazonaws.com/web:latest"]
        );
    }

    #[test]
    fn test_unknown_variables_preserved() {
        assert_eq!(ctx().interpolate("echo ${git.sha}"), "echo ${git.sha}");
    }
}
