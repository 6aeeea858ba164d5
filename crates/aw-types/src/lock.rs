//! Lock File domain types.
//!
//! `LockFile` models exactly the part of the emitted CI workflow that is
//! serialized as YAML; the header comment block (source path, engine id,
//! version marker) is metadata the emitter writes separately above the
//! YAML document, since CI platforms treat header comments as
//! documentation rather than schema.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::workflow::WorkflowId;

/// Metadata written as a leading comment block, never as YAML keys, so it
/// never collides with the target CI platform's schema.
#[derive(Debug, Clone)]
pub struct LockHeader {
    /// Relative, POSIX-style path to the source WS file.
    pub source_path: String,
    pub engine_id: String,
    /// Present only when the compile is reproducible from a warm cache;
    /// omitted (not a random value) when unavailable, so two warm-cache
    /// compiles still diff as identical after normalization.
    pub version_marker: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(
        rename = "if",
        skip_serializing_if = "Option::is_none"
    )]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub with: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,
}

impl Step {
    pub fn run(command: impl Into<String>) -> Self {
        Self {
            run: Some(command.into()),
            ..Default::default()
        }
    }

    pub fn uses(pinned_ref: impl Into<String>) -> Self {
        Self {
            uses: Some(pinned_ref.into()),
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_if(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
    #[serde(rename = "runs-on")]
    pub runs_on: String,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub permissions: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    pub steps: Vec<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,
}

/// The well-known job names the Lock-File Emitter always reasons about by
/// name.
pub const ACTIVATION_JOB: &str = "activation";
pub const AGENT_JOB: &str = "agent";

/// `on:` triggers, already expanded to their final event-specific form
/// (command-trigger expansion happened before this point).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnBlock(pub IndexMap<String, serde_yaml::Value>);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockFile {
    pub on: OnBlock,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub permissions: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<ConcurrencyBlock>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    pub jobs: IndexMap<String, Job>,

    /// Not serialized: carried alongside the document so the emitter can
    /// write the leading comment block and so golden-file tests can
    /// normalize volatile fields without re-deriving them.
    #[serde(skip)]
    pub header: LockHeaderShadow,
}

/// `LockHeader` does not implement `Default`/`Serialize` itself (it is
/// metadata, not document content) but `LockFile` needs a default-able
/// field to derive `Deserialize` for round-trip tests; this newtype
/// supplies that without the header ever reaching the YAML body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockHeaderShadow {
    pub workflow_id: Option<WorkflowId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyBlock {
    pub group: String,
    #[serde(rename = "cancel-in-progress", default)]
    pub cancel_in_progress: bool,
}

/// A resolved, pinned action reference paired with the human-readable
/// version comment the emitter appends after serialization.
/// Keyed by the bare `owner/repo@sha` string so the post-process pass can
/// find the exact line to annotate without re-parsing YAML.
#[derive(Debug, Clone)]
pub struct PinAnnotation {
    pub bare_reference: String,
    pub version_comment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_builders_set_expected_fields() {
        let s = Step::uses("actions/checkout@deadbeef").named("checkout");
        assert_eq!(s.name.as_deref(), Some("checkout"));
        assert_eq!(s.uses.as_deref(), Some("actions/checkout@deadbeef"));
    }

    #[test]
    fn job_default_has_no_needs() {
        let j = Job::default();
        assert!(j.needs.is_empty());
    }
}
