//! Audit Report Builder: aggregates run metrics and CI job
//! metadata into one structured [`AuditReport`], which the `aw-cli`
//! `audit` subcommand renders as JSON or text.

mod render;

pub use render::render_text;

use aw_types::artifact::{JobMetadata, RunArtifactSet};
use aw_types::metrics::RunMetrics;
use aw_types::report::{
    AuditReport, DownloadedFile, ErrorOrWarning, ExtendedAnalysis, Overview, RedactedDomainAnalysis,
};

use crate::logs;

/// Assemble an [`AuditReport`] from a flattened run's artifacts and its CI
/// job metadata. `redacted_count` comes from the output-sanitizer pass
/// that ran during metric extraction; the builder itself never re-scans
/// artifact text.
pub fn build(
    artifacts: &RunArtifactSet,
    job: &JobMetadata,
    redacted_count: u64,
) -> AuditReport {
    let metrics: RunMetrics = logs::extract(artifacts);
    let missing = artifacts.missing();

    let overview = Overview {
        run_id: job.run_id.clone(),
        workflow_name: job.workflow_name.clone(),
        status: job.status,
        conclusion: job.conclusion,
        started_at: job.started_at,
        completed_at: job.completed_at,
        branch: job.branch.clone(),
        url: job.url.clone(),
    };

    let downloaded_files = collect_downloaded_files(artifacts);

    let mut errors_and_warnings = Vec::new();
    if metrics.error_count > 0 {
        errors_and_warnings.push(ErrorOrWarning {
            severity: "error".to_string(),
            message: format!("{} error(s) observed in agent stdio", metrics.error_count),
            source: "agent_stdio".to_string(),
        });
    }
    if metrics.warning_count > 0 {
        errors_and_warnings.push(ErrorOrWarning {
            severity: "warning".to_string(),
            message: format!("{} warning(s) observed in agent stdio", metrics.warning_count),
            source: "agent_stdio".to_string(),
        });
    }

    let firewall_denied_domains: Vec<String> = metrics
        .firewall
        .by_domain
        .iter()
        .filter(|(_, tally)| tally.denied > 0)
        .map(|(domain, _)| domain.clone())
        .collect();

    let missing_tools = metrics.missing_tools.clone();
    let mcp_failures = metrics.mcp_server_failures.clone();

    AuditReport {
        overview,
        metrics,
        downloaded_files,
        missing_tools,
        mcp_failures,
        firewall_denied_domains,
        redacted_domains: RedactedDomainAnalysis {
            redacted_count,
            sample_patterns: vec![],
        },
        errors_and_warnings,
        extended: ExtendedAnalysis::default(),
        partial: !missing.is_empty(),
    }
}

fn collect_downloaded_files(artifacts: &RunArtifactSet) -> Vec<DownloadedFile> {
    let named = [
        (&artifacts.agent_info, "agent identity"),
        (&artifacts.agent_stdio, "agent stdio log"),
        (&artifacts.safe_output, "safe-output envelope"),
        (&artifacts.agent_patch, "git patch"),
        (&artifacts.gateway_log, "tool-gateway event log"),
        (&artifacts.firewall_log, "firewall access log"),
    ];

    named
        .into_iter()
        .filter_map(|(path, description)| {
            let path = path.as_ref()?;
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            Some(DownloadedFile {
                name: path.file_name()?.to_string_lossy().to_string(),
                size_bytes: size,
                kind_description: description.to_string(),
            })
        })
        .collect()
}
