//! Library entry points behind the `aw` CLI's four commands. The binary
//! in `src/main.rs` is a thin `clap`-driven shell over these; embedders
//! that want the exact CLI surface programmatically depend on this crate
//! directly instead of shelling out.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use aw::compiler::{self, CompileOptions};
use aw::config::{self, ConfigOverrides};
use aw::pins::{ActionPinCache, HttpResolverAdapter};
use aw::{artifacts, audit, front_matter, imports, logs, packages, validate};
use aw_types::depgraph::DependencyGraph;
use aw_types::error::Diagnostic;
use aw_types::metrics::RunMetrics;
use aw_types::report::AuditReport;

const GITHUB_API_BASE: &str = "https://api.github.com";

/// Options an embedder can override for `compile`; anything left `None`
/// falls back to the 3-tier precedence in [`aw::config::load`].
#[derive(Debug, Clone, Default)]
pub struct CompileCliOptions {
    pub workspace_root: PathBuf,
    pub overrides: ConfigOverrides,
    pub pin_cache_path: Option<PathBuf>,
}

/// Compile every path in `paths` (already resolved from the CLI's
/// positional globs), sharing one Action Pin Cache and Dependency Graph
/// across the batch.
pub async fn compile(paths: &[PathBuf], options: &CompileCliOptions) -> Result<Vec<Diagnostic>> {
    let config = config::load(&options.workspace_root, &options.overrides);
    let compile_options = CompileOptions {
        config: &config,
        workspace_root: &options.workspace_root,
    };

    let adapter = HttpResolverAdapter::new(GITHUB_API_BASE).context("building resolver adapter")?;
    let pin_cache = Arc::new(ActionPinCache::new(adapter, options.pin_cache_path.clone()));
    let package_index = packages::PackageIndex::load_from_env(
        &options.workspace_root,
        home_dir().as_deref(),
    );
    let graph = Arc::new(Mutex::new(DependencyGraph::new()));

    let (outcome, diagnostics) =
        compiler::compile_batch(paths, &compile_options, &pin_cache, &package_index, &graph).await;

    tracing::info!(
        succeeded = outcome.succeeded_count(),
        failed = outcome.failed_count(),
        "compile batch finished"
    );

    Ok(diagnostics)
}

/// Check every source file matching `pattern` (a glob against
/// `workspace_root`) through Parse -> Resolve -> Validate, without
/// pinning actions or writing lock files — the cheap, read-only half of
/// the compilation state machine, for a fast pre-commit sanity check.
pub fn status(pattern: &str, workspace_root: &Path) -> Result<Vec<Diagnostic>> {
    let package_index = packages::PackageIndex::load_from_env(workspace_root, home_dir().as_deref());
    let mut diagnostics = Vec::new();

    for path in glob_sources(pattern, workspace_root)? {
        diagnostics.extend(status_one(&path, workspace_root, &package_index));
    }

    Ok(diagnostics)
}

fn status_one(path: &Path, workspace_root: &Path, package_index: &packages::PackageIndex) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            diagnostics.push(Diagnostic::error(
                aw_types::error::Location::file(path),
                "ParseError",
                format!("could not read source file: {e}"),
            ));
            return diagnostics;
        }
    };

    if let Err(error) = front_matter::parse(path, &text) {
        diagnostics.push(Diagnostic::from_error(&error, path));
        return diagnostics;
    }

    let mut resolver = imports::ImportResolver::new(workspace_root, package_index);
    let resolved = match resolver.resolve(path) {
        Ok(r) => r,
        Err(error) => {
            diagnostics.push(Diagnostic::from_error(&error, path));
            return diagnostics;
        }
    };

    diagnostics.extend(validate::validate(path, &resolved.merged));
    diagnostics
}

/// Build an [`AuditReport`] for `run_id`'s downloaded artifacts under
/// `output_dir`: flatten, collect, redact, extract metrics, assemble.
/// `output_dir/job_metadata.json` supplies the CI-side fields this system
/// never owns — no component mutates a Workflow Source, and job metadata
/// is read-only over the CI platform — so when absent, a minimal stub
/// with just `run_id` is used and the report notes it is partial.
pub fn audit(run_id: &str, output_dir: &Path) -> Result<AuditReport> {
    artifacts::flatten(output_dir).context("flattening run artifacts")?;
    let artifact_set = artifacts::collect(output_dir);

    let job = load_job_metadata(run_id, output_dir);
    let redacted_count = count_redactions(&artifact_set);

    Ok(audit::build(&artifact_set, &job, redacted_count))
}

/// Extract [`RunMetrics`] for the artifacts under `output_dir`, optionally
/// narrowed to entries whose tool/server name contains `query`
/// (case-insensitive substring, empty query means "everything").
pub fn logs(query: &str, output_dir: &Path) -> Result<RunMetrics> {
    artifacts::flatten(output_dir).context("flattening run artifacts")?;
    let artifact_set = artifacts::collect(output_dir);
    let mut metrics = logs::extract(&artifact_set);

    if !query.is_empty() {
        let needle = query.to_lowercase();
        metrics.by_tool.retain(|name, _| name.to_lowercase().contains(&needle));
        metrics.by_server.retain(|name, _| name.to_lowercase().contains(&needle));
    }

    Ok(metrics)
}

fn load_job_metadata(run_id: &str, output_dir: &Path) -> aw_types::artifact::JobMetadata {
    let path = output_dir.join("job_metadata.json");
    std::fs::read_to_string(&path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_else(|| aw_types::artifact::JobMetadata {
            run_id: run_id.to_string(),
            workflow_name: "unknown".to_string(),
            status: aw_types::artifact::JobStatus::Completed,
            conclusion: None,
            branch: None,
            url: None,
            started_at: None,
            completed_at: None,
            failed_job_count: 0,
        })
}

fn count_redactions(artifacts: &aw_types::artifact::RunArtifactSet) -> u64 {
    [&artifacts.agent_stdio, &artifacts.gateway_log, &artifacts.firewall_log]
        .into_iter()
        .flatten()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|text| aw::sanitizer::count_matches(&text))
        .sum()
}

fn glob_sources(pattern: &str, workspace_root: &Path) -> Result<Vec<PathBuf>> {
    let full_pattern = workspace_root.join(pattern);
    let mut paths = Vec::new();
    for entry in glob::glob(&full_pattern.to_string_lossy()).context("invalid glob pattern")? {
        if let Ok(path) = entry {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reports_validation_errors_without_writing_a_lock_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("bad.md"),
            "---\non:\n  issues:\npermissions:\n  contents: write\nsafe-outputs:\n  create-issue:\n---\nDo the thing.\n",
        )
        .unwrap();

        let diagnostics = status("bad.md", tmp.path()).unwrap();
        assert!(diagnostics.iter().any(|d| d.kind == "ValidationError"));
        assert!(!tmp.path().join(".github/workflows/bad.lock.yml").exists());
    }

    #[test]
    fn status_glob_matches_nothing_when_pattern_is_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let diagnostics = status("*.md", tmp.path()).unwrap();
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn audit_produces_a_partial_report_when_artifacts_are_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let report = audit("42", tmp.path()).unwrap();
        assert!(report.partial);
        assert_eq!(report.overview.run_id, "42");
    }

    #[test]
    fn logs_filters_by_query() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("gateway.jsonl"),
            r#"{"event":"tool_call","server_name":"github","tool_name":"get_repository","duration":10}
{"event":"tool_call","server_name":"slack","tool_name":"post_message","duration":5}
"#,
        )
        .unwrap();

        let metrics = logs("github", tmp.path()).unwrap();
        assert!(metrics.by_server.contains_key("github"));
        assert!(!metrics.by_server.contains_key("slack"));
    }
}
