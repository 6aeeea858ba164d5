//! Run Artifact Set domain types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::workflow::Engine;

/// Conventional artifact file names, used by both the flattener and the
/// log metric extractor so the two never disagree about where to look.
pub mod conventional_names {
    pub const AGENT_INFO: &str = "aw_info.json";
    pub const SAFE_OUTPUT: &str = "safe_output.jsonl";
    pub const AGENT_PATCH: &str = "aw.patch";
    pub const GATEWAY_LOG: &str = "gateway.jsonl";
    pub const FIREWALL_LOG: &str = "access.log";
    pub const AGENT_STDIO: &str = "agent_stdio.log";
    pub const PROMPT: &str = "prompt.txt";
}

/// `aw_info.json` — engine identity for a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub engine_id: Engine,
    pub engine_name: String,
    pub model: String,
    pub workflow_name: String,
}

/// The set of files discovered for a single run after flattening, with
/// their resolved paths. `None` for an artifact means it was not present
/// — the audit engine treats this as a warning-bearing gap, not a fatal
/// error.
#[derive(Debug, Clone, Default)]
pub struct RunArtifactSet {
    pub agent_info: Option<PathBuf>,
    pub agent_stdio: Option<PathBuf>,
    pub safe_output: Option<PathBuf>,
    pub agent_patch: Option<PathBuf>,
    pub gateway_log: Option<PathBuf>,
    pub firewall_log: Option<PathBuf>,
    pub other_files: Vec<PathBuf>,
}

impl RunArtifactSet {
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.agent_info.is_none() {
            missing.push(conventional_names::AGENT_INFO);
        }
        if self.agent_stdio.is_none() {
            missing.push(conventional_names::AGENT_STDIO);
        }
        if self.safe_output.is_none() {
            missing.push(conventional_names::SAFE_OUTPUT);
        }
        if self.gateway_log.is_none() {
            missing.push(conventional_names::GATEWAY_LOG);
        }
        if self.firewall_log.is_none() {
            missing.push(conventional_names::FIREWALL_LOG);
        }
        missing
    }
}

/// CI job metadata, as read from the hosting platform's API — the
/// "external collaborator" side of the workflow state machine. This
/// system is read-only over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub run_id: String,
    pub workflow_name: String,
    pub status: JobStatus,
    pub conclusion: Option<JobConclusion>,
    pub branch: Option<String>,
    pub url: Option<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub failed_job_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobConclusion {
    Success,
    Failure,
    Cancelled,
    TimedOut,
    Neutral,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lists_every_absent_artifact() {
        let ras = RunArtifactSet::default();
        let missing = ras.missing();
        assert_eq!(missing.len(), 5);
    }

    #[test]
    fn missing_is_empty_when_all_present() {
        let ras = RunArtifactSet {
            agent_info: Some("a".into()),
            agent_stdio: Some("b".into()),
            safe_output: Some("c".into()),
            agent_patch: None,
            gateway_log: Some("d".into()),
            firewall_log: Some("e".into()),
            other_files: vec![],
        };
        assert!(ras.missing().is_empty());
    }
}
