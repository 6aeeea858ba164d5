//! Safe-Output domain types.

use serde::{Deserialize, Serialize};

/// The closed set of side-effect kinds the agent may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SafeOutputKind {
    CreateIssue,
    AddComment,
    CreatePullRequest,
    AddLabels,
    CreateCommitStatus,
    UpdateProject,
    UploadAssets,
}

impl SafeOutputKind {
    /// The downstream job name this kind maps to.
    pub fn job_name(&self) -> &'static str {
        match self {
            SafeOutputKind::CreateIssue => "create_issue",
            SafeOutputKind::AddComment => "add_comment",
            SafeOutputKind::CreatePullRequest => "create_pull_request",
            SafeOutputKind::AddLabels => "add_labels",
            SafeOutputKind::CreateCommitStatus => "create_commit_status",
            SafeOutputKind::UpdateProject => "update_project",
            SafeOutputKind::UploadAssets => "upload_assets",
        }
    }

    /// The permission resource a declared kind of this sort would
    /// otherwise require write access to on the main job — used by the
    /// validator to reject main-job write grants that conflict with a
    /// safe-output declaration.
    pub fn conflicting_permission_resource(&self) -> &'static str {
        match self {
            SafeOutputKind::CreateIssue | SafeOutputKind::AddComment => "issues",
            SafeOutputKind::CreatePullRequest => "pull-requests",
            SafeOutputKind::AddLabels => "issues",
            SafeOutputKind::CreateCommitStatus => "statuses",
            SafeOutputKind::UpdateProject => "repository-projects",
            SafeOutputKind::UploadAssets => "contents",
        }
    }

    pub const ALL: [SafeOutputKind; 7] = [
        SafeOutputKind::CreateIssue,
        SafeOutputKind::AddComment,
        SafeOutputKind::CreatePullRequest,
        SafeOutputKind::AddLabels,
        SafeOutputKind::CreateCommitStatus,
        SafeOutputKind::UpdateProject,
        SafeOutputKind::UploadAssets,
    ];
}

/// Per-kind configuration: limits, targeting, and required shape of the
/// materialized side effect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeOutputDeclaration {
    pub max: Option<u32>,
    pub target: Option<String>,
    #[serde(rename = "target-repo")]
    pub target_repo: Option<String>,
    #[serde(rename = "required-labels")]
    pub required_labels: Vec<String>,
    #[serde(rename = "required-title-prefix")]
    pub required_title_prefix: Option<String>,
    #[serde(rename = "required-category")]
    pub required_category: Option<String>,
    pub allowed: Vec<String>,
    #[serde(rename = "github-token")]
    pub github_token: Option<String>,
}

impl SafeOutputDeclaration {
    /// `max` defaults to 1 when unset; the validator still requires it be
    /// `>= 1` if explicitly provided as 0.
    pub fn effective_max(&self) -> u32 {
        self.max.unwrap_or(1)
    }
}

/// One entry the agent requested in `safe_output.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SafeOutputEnvelope {
    CreateIssue {
        title: String,
        body: String,
        #[serde(default)]
        labels: Vec<String>,
    },
    AddComment {
        body: String,
    },
    CreatePullRequest {
        title: String,
        body: String,
        branch: String,
    },
    AddLabels {
        labels: Vec<String>,
    },
    CreateCommitStatus {
        state: String,
        description: String,
    },
    UpdateProject {
        #[serde(default)]
        fields: std::collections::BTreeMap<String, String>,
    },
    UploadAssets {
        paths: Vec<String>,
    },
}

impl SafeOutputEnvelope {
    pub fn kind(&self) -> SafeOutputKind {
        match self {
            SafeOutputEnvelope::CreateIssue { .. } => SafeOutputKind::CreateIssue,
            SafeOutputEnvelope::AddComment { .. } => SafeOutputKind::AddComment,
            SafeOutputEnvelope::CreatePullRequest { .. } => SafeOutputKind::CreatePullRequest,
            SafeOutputEnvelope::AddLabels { .. } => SafeOutputKind::AddLabels,
            SafeOutputEnvelope::CreateCommitStatus { .. } => SafeOutputKind::CreateCommitStatus,
            SafeOutputEnvelope::UpdateProject { .. } => SafeOutputKind::UpdateProject,
            SafeOutputEnvelope::UploadAssets { .. } => SafeOutputKind::UploadAssets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_max_defaults_to_one() {
        let decl = SafeOutputDeclaration::default();
        assert_eq!(decl.effective_max(), 1);
    }

    #[test]
    fn job_names_are_snake_case() {
        assert_eq!(SafeOutputKind::CreateIssue.job_name(), "create_issue");
        assert_eq!(SafeOutputKind::UploadAssets.job_name(), "upload_assets");
    }
}
