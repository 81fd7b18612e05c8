//! Stage definitions of the release pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::artifact::ArtifactSpec;
use crate::handle::BuildProjectHandle;
use crate::id::DescriptorId;

/// The three stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageName {
    Source,
    Build,
    Deploy,
}

impl StageName {
    pub const ORDER: [StageName; 3] = [StageName::Source, StageName::Build, StageName::Deploy];
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageName::Source => write!(f, "Source"),
            StageName::Build => write!(f, "Build"),
            StageName::Deploy => write!(f, "Deploy"),
        }
    }
}

/// What a stage does, and which provisioned resources it acts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageAction {
    /// Read the image currently tagged `tag` in the repository.
    ImageSource {
        repository: DescriptorId,
        tag: String,
    },
    /// Run the build project to produce the image-definition manifest.
    Build {
        repository: DescriptorId,
        /// Descriptor of the build project, absent when the pipeline created it inline.
        build_project: Option<DescriptorId>,
        project: BuildProjectHandle,
    },
    /// Roll the service onto the image named by the manifest.
    Deploy {
        service: DescriptorId,
        #[serde(with = "crate::handle::duration_secs")]
        timeout: Duration,
    },
}

impl StageAction {
    /// Descriptors whose handles this action uses.
    pub fn references(&self) -> Vec<&DescriptorId> {
        match self {
            StageAction::ImageSource { repository, .. } => vec![repository],
            StageAction::Build {
                repository,
                build_project,
                ..
            } => std::iter::once(repository)
                .chain(build_project.as_ref())
                .collect(),
            StageAction::Deploy { service, .. } => vec![service],
        }
    }

    pub fn references_descriptor(&self, id: &str) -> bool {
        self.references().iter().any(|r| r.as_str() == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: StageName,
    pub action: StageAction,
    pub input_artifact: Option<ArtifactSpec>,
    pub output_artifact: Option<ArtifactSpec>,
}

impl StageDefinition {
    /// No input, one output.
    pub fn source(action: StageAction, output: ArtifactSpec) -> Self {
        Self {
            name: StageName::Source,
            action,
            input_artifact: None,
            output_artifact: Some(output),
        }
    }

    pub fn build(action: StageAction, input: ArtifactSpec, output: ArtifactSpec) -> Self {
        Self {
            name: StageName::Build,
            action,
            input_artifact: Some(input),
            output_artifact: Some(output),
        }
    }

    /// One input, no output.
    pub fn deploy(action: StageAction, input: ArtifactSpec) -> Self {
        Self {
            name: StageName::Deploy,
            action,
            input_artifact: Some(input),
            output_artifact: None,
        }
    }
}
