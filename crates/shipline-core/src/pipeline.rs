//! The assembled release pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::handle::{PipelineHandle, ProvisionedHandle};
use crate::id::DescriptorId;
use crate::stage::{StageDefinition, StageName};

/// Provisioned handles plus the fixed Source → Build → Deploy stages wired to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledPipeline {
    /// Descriptor id of the pipeline resource.
    pub pipeline_id: DescriptorId,
    pub stages: Vec<StageDefinition>,
    pub handles: BTreeMap<DescriptorId, ProvisionedHandle>,
    /// Order in which the handles were provisioned.
    pub provision_order: Vec<DescriptorId>,
}

impl AssembledPipeline {
    /// Check the stage layout before accepting it: exactly Source, Build, Deploy,
    /// each reading only an artifact an earlier stage produces, and every
    /// referenced descriptor present in `handles`.
    pub fn new(
        pipeline_id: DescriptorId,
        stages: Vec<StageDefinition>,
        handles: BTreeMap<DescriptorId, ProvisionedHandle>,
        provision_order: Vec<DescriptorId>,
    ) -> Result<Self> {
        let names: Vec<StageName> = stages.iter().map(|s| s.name).collect();
        if names != StageName::ORDER {
            return Err(Error::Assembly(format!(
                "expected stages Source, Build, Deploy; got {names:?}"
            )));
        }

        let mut produced: Vec<&str> = Vec::new();
        for stage in &stages {
            let shape_ok = match stage.name {
                StageName::Source => stage.input_artifact.is_none() && stage.output_artifact.is_some(),
                StageName::Build => stage.input_artifact.is_some() && stage.output_artifact.is_some(),
                StageName::Deploy => stage.input_artifact.is_some() && stage.output_artifact.is_none(),
            };
            if !shape_ok {
                return Err(Error::Assembly(format!(
                    "stage {} has the wrong artifact shape",
                    stage.name
                )));
            }
            if let Some(input) = &stage.input_artifact {
                if !produced.contains(&input.name.as_str()) {
                    return Err(Error::Assembly(format!(
                        "stage {} reads '{}' before it is produced",
                        stage.name, input.name
                    )));
                }
            }
            if let Some(output) = &stage.output_artifact {
                if output.produced_by != stage.name || produced.contains(&output.name.as_str()) {
                    return Err(Error::Assembly(format!(
                        "artifact '{}' must have exactly one producer",
                        output.name
                    )));
                }
                produced.push(output.name.as_str());
            }
            for reference in stage.action.references() {
                if !handles.contains_key(reference) {
                    return Err(Error::Assembly(format!(
                        "stage {} references unprovisioned '{}'",
                        stage.name, reference
                    )));
                }
            }
        }

        Ok(Self {
            pipeline_id,
            stages,
            handles,
            provision_order,
        })
    }

    pub fn stage(&self, name: StageName) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn handle(&self, id: &DescriptorId) -> Option<&ProvisionedHandle> {
        self.handles.get(id)
    }

    pub fn pipeline_handle(&self) -> Option<&PipelineHandle> {
        self.handles.get(&self.pipeline_id)?.as_pipeline()
    }

    /// Name of the repository the Source stage watches.
    pub fn watched_repository(&self) -> Option<&str> {
        let pipeline = self.pipeline_handle()?;
        self.handles
            .get(&pipeline.repository)?
            .as_repository()
            .map(|r| r.name.as_str())
    }
}
