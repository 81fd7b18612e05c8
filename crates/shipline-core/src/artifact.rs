//! Artifact channels: write-once handoff between pipeline stages.
//!
//! A channel is opened fresh for every pipeline run. Opening yields a sink,
//! owned by the producing stage and consumed by its single write, and a source
//! that consumers can wait on until the payload lands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::id::InstanceId;
use crate::stage::StageName;

/// Name of the manifest file the build produces.
pub const IMAGE_DEFINITIONS_FILE: &str = "imagedefinitions.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    SourceSnapshot,
    BuildManifest,
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadKind::SourceSnapshot => write!(f, "source_snapshot"),
            PayloadKind::BuildManifest => write!(f, "build_manifest"),
        }
    }
}

/// Declaration of an artifact in a stage definition. Instances are opened per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub name: String,
    pub produced_by: StageName,
    pub payload_kind: PayloadKind,
}

impl ArtifactSpec {
    pub fn new(name: impl Into<String>, produced_by: StageName, payload_kind: PayloadKind) -> Self {
        Self {
            name: name.into(),
            produced_by,
            payload_kind,
        }
    }
}

/// The image a push made available in the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub repository_uri: String,
    pub tag: String,
    pub digest: String,
    pub pushed_at: DateTime<Utc>,
}

/// One entry of `imagedefinitions.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDefinition {
    pub name: String,
    #[serde(rename = "imageUri")]
    pub image_uri: String,
}

/// The build stage's output: which image each container should run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageDefinitions(pub Vec<ImageDefinition>);

impl ImageDefinitions {
    pub fn parse(content: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(content)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    /// Image for the named container. Names must match exactly.
    pub fn image_for(&self, container: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|d| d.name == container)
            .map(|d| d.image_uri.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArtifactPayload {
    SourceSnapshot(SourceSnapshot),
    BuildManifest(ImageDefinitions),
}

impl ArtifactPayload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            ArtifactPayload::SourceSnapshot(_) => PayloadKind::SourceSnapshot,
            ArtifactPayload::BuildManifest(_) => PayloadKind::BuildManifest,
        }
    }
}

/// Identity of one channel instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactChannel {
    pub id: InstanceId,
    pub name: String,
    pub produced_by: StageName,
    pub payload_kind: PayloadKind,
}

impl ArtifactChannel {
    /// Open a fresh channel instance for `spec`.
    pub fn open(spec: &ArtifactSpec) -> (ArtifactSink, ArtifactSource) {
        let channel = ArtifactChannel {
            id: InstanceId::new(),
            name: spec.name.clone(),
            produced_by: spec.produced_by,
            payload_kind: spec.payload_kind,
        };
        let (tx, rx) = watch::channel(None);
        (
            ArtifactSink {
                channel: channel.clone(),
                tx,
            },
            ArtifactSource { channel, rx },
        )
    }
}

/// Write side of a channel. `write` consumes the sink, so a channel is written at most once.
#[derive(Debug)]
pub struct ArtifactSink {
    channel: ArtifactChannel,
    tx: watch::Sender<Option<ArtifactPayload>>,
}

impl ArtifactSink {
    pub fn channel(&self) -> &ArtifactChannel {
        &self.channel
    }

    pub fn write(self, payload: ArtifactPayload) -> Result<()> {
        if payload.kind() != self.channel.payload_kind {
            return Err(Error::ArtifactKindMismatch {
                name: self.channel.name.clone(),
                expected: self.channel.payload_kind,
                actual: payload.kind(),
            });
        }
        // send_replace stores the value even when every reader is gone.
        self.tx.send_replace(Some(payload));
        Ok(())
    }
}

/// Read side of a channel. Cloneable; never writes.
#[derive(Debug, Clone)]
pub struct ArtifactSource {
    channel: ArtifactChannel,
    rx: watch::Receiver<Option<ArtifactPayload>>,
}

impl ArtifactSource {
    pub fn channel(&self) -> &ArtifactChannel {
        &self.channel
    }

    /// The payload if it has been written.
    pub fn peek(&self) -> Option<ArtifactPayload> {
        self.rx.borrow().clone()
    }

    /// Wait until the producer writes. Fails if the sink is dropped unwritten.
    pub async fn wait(&mut self) -> Result<ArtifactPayload> {
        let payload = match self.rx.wait_for(|v| v.is_some()).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        payload.ok_or_else(|| self.not_produced())
    }

    fn not_produced(&self) -> Error {
        Error::ArtifactNotProduced {
            name: self.channel.name.clone(),
        }
    }
}
