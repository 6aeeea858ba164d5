//! Audit Report domain types.
//!
//! One structured shape backs both the JSON (machine/MCP) and the
//! human-readable text rendering — the rendering layer in `aw::audit`
//! formats this, it never recomputes it.

use serde::{Deserialize, Serialize};

use crate::artifact::{JobConclusion, JobStatus};
use crate::metrics::RunMetrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overview {
    pub run_id: String,
    pub workflow_name: String,
    pub status: JobStatus,
    pub conclusion: Option<JobConclusion>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub branch: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadedFile {
    pub name: String,
    pub size_bytes: u64,
    pub kind_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorOrWarning {
    pub severity: String,
    pub message: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactedDomainAnalysis {
    pub redacted_count: u64,
    pub sample_patterns: Vec<String>,
}

/// Optional sections only present when the run artifacts carried them
/// (e.g. an engine that emits structured findings).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtendedAnalysis {
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub failure_analysis: Option<String>,
    pub performance_metrics: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub overview: Overview,
    pub metrics: RunMetrics,
    pub downloaded_files: Vec<DownloadedFile>,
    pub missing_tools: Vec<String>,
    pub mcp_failures: Vec<String>,
    pub firewall_denied_domains: Vec<String>,
    pub redacted_domains: RedactedDomainAnalysis,
    pub errors_and_warnings: Vec<ErrorOrWarning>,
    pub extended: ExtendedAnalysis,
    /// `true` when one or more expected artifacts were missing and the
    /// report is therefore incomplete.
    pub partial: bool,
}
