//! Safe-Output Configurator: derives the downstream job, trigger
//! condition, environment, and token selection for each declared
//! safe-output kind, and (at runtime) enforces the envelope a run's agent
//! actually wrote against what was declared.
//!
//! Token precedence is per-kind declaration -> workflow-level
//! `github-token` -> the built-in default token expression. The
//! distillation's "global safe-outputs" tier collapses into the
//! workflow-level tier here, since [`WorkflowHead`] carries no separate
//! slot for it (see `DESIGN.md`).

use std::collections::BTreeMap;

use aw_types::error::{Diagnostic, Location};
use aw_types::safe_output::{SafeOutputDeclaration, SafeOutputEnvelope, SafeOutputKind};
use aw_types::workflow::WorkflowHead;

const DEFAULT_TOKEN_EXPRESSION: &str = "${{ secrets.GITHUB_TOKEN }}";

/// Everything the emitter needs to materialize one safe-output job.
#[derive(Debug, Clone)]
pub struct SafeOutputJobSpec {
    pub kind: SafeOutputKind,
    pub job_name: String,
    pub condition: String,
    pub env: BTreeMap<String, String>,
    pub token_expression: String,
}

/// Derive the deterministic, sorted list of safe-output jobs for a merged
/// head. Sorted by `job_name` so two identical sources always emit the same
/// job ordering.
pub fn configure(head: &WorkflowHead) -> Vec<SafeOutputJobSpec> {
    let mut specs: Vec<SafeOutputJobSpec> = head
        .safe_outputs
        .iter()
        .filter_map(|(key, decl)| {
            crate::schema::parse_safe_output_kind(key).map(|kind| build_spec(kind, key, decl, head))
        })
        .collect();
    specs.sort_by(|a, b| a.job_name.cmp(&b.job_name));
    specs
}

fn build_spec(
    kind: SafeOutputKind,
    key: &str,
    decl: &SafeOutputDeclaration,
    head: &WorkflowHead,
) -> SafeOutputJobSpec {
    let job_name = kind.job_name().to_string();
    let condition = format!(
        "needs.agent.result == 'success' && contains(needs.agent.outputs.output_types, '{key}')"
    );

    let token_expression = decl
        .github_token
        .clone()
        .or_else(|| head.github_token.clone())
        .unwrap_or_else(|| DEFAULT_TOKEN_EXPRESSION.to_string());

    let mut env = BTreeMap::new();
    env.insert("AW_SAFE_OUTPUT_KIND".to_string(), key.to_string());
    env.insert("AW_SAFE_OUTPUT_MAX".to_string(), decl.effective_max().to_string());
    if let Some(target) = &decl.target {
        env.insert("AW_SAFE_OUTPUT_TARGET".to_string(), target.clone());
    }
    if let Some(target_repo) = &decl.target_repo {
        env.insert("AW_SAFE_OUTPUT_TARGET_REPO".to_string(), target_repo.clone());
    }
    if !decl.required_labels.is_empty() {
        env.insert(
            "AW_SAFE_OUTPUT_REQUIRED_LABELS".to_string(),
            decl.required_labels.join(","),
        );
    }
    if let Some(prefix) = &decl.required_title_prefix {
        env.insert("AW_SAFE_OUTPUT_REQUIRED_TITLE_PREFIX".to_string(), prefix.clone());
    }
    if let Some(category) = &decl.required_category {
        env.insert("AW_SAFE_OUTPUT_REQUIRED_CATEGORY".to_string(), category.clone());
    }
    if !decl.allowed.is_empty() {
        env.insert("AW_SAFE_OUTPUT_ALLOWED".to_string(), decl.allowed.join(","));
    }

    SafeOutputJobSpec {
        kind,
        job_name,
        condition,
        env,
        token_expression,
    }
}

/// Parse `safe_output.jsonl` (one JSON envelope per line) tolerating
/// trailing blank lines the way the gateway log parser tolerates
/// malformed lines, applied here to the agent's own output stream.
pub fn parse_envelopes(jsonl: &str) -> Vec<SafeOutputEnvelope> {
    jsonl
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<SafeOutputEnvelope>(l).ok())
        .collect()
}

/// Enforce every declared constraint (max count, required labels/prefix/
/// category, allowed list) against the envelopes a run actually produced
/// for one kind. At most `decl.effective_max()` envelopes of this kind are
/// materialized, in the order the agent wrote them; any beyond that count
/// are dropped and reported as a `ValidationError` diagnostic rather than
/// failing the whole run — a single kind's overflow never touches outputs
/// of other kinds in the same run. Envelopes that fail a
/// label/prefix/category/allow-list constraint are
/// likewise dropped without aborting the job.
pub fn enforce(
    path: &std::path::Path,
    kind: SafeOutputKind,
    decl: &SafeOutputDeclaration,
    envelopes: &[SafeOutputEnvelope],
) -> (Vec<SafeOutputEnvelope>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let matching: Vec<&SafeOutputEnvelope> = envelopes.iter().filter(|e| e.kind() == kind).collect();
    let max = decl.effective_max() as usize;

    if matching.len() > max {
        diagnostics.push(Diagnostic::error(
            Location::file(path),
            "ValidationError",
            format!(
                "{} produced {} outputs, exceeding the declared max of {}; only the first {} were materialized",
                kind.job_name(),
                matching.len(),
                max,
                max
            ),
        ));
    }

    let mut accepted = Vec::new();
    for envelope in matching.into_iter().take(max) {
        if passes_constraints(envelope, decl) {
            accepted.push(envelope.clone());
        } else {
            diagnostics.push(Diagnostic::warning(
                Location::file(path),
                "ValidationError",
                format!(
                    "{} output dropped: it does not satisfy the declared label/prefix/category/allow-list constraints",
                    kind.job_name()
                ),
            ));
        }
    }
    (accepted, diagnostics)
}

fn passes_constraints(envelope: &SafeOutputEnvelope, decl: &SafeOutputDeclaration) -> bool {
    match envelope {
        SafeOutputEnvelope::CreateIssue { title, labels, .. } => {
            required_labels_present(labels, decl) && required_prefix_present(title, decl)
        }
        SafeOutputEnvelope::CreatePullRequest { title, .. } => required_prefix_present(title, decl),
        SafeOutputEnvelope::AddLabels { labels } => {
            decl.allowed.is_empty() || labels.iter().all(|l| decl.allowed.contains(l))
        }
        SafeOutputEnvelope::UpdateProject { fields } => {
            decl.required_category.as_ref().is_none_or(|category| {
                fields.get("category").map(String::as_str) == Some(category.as_str())
            })
        }
        _ => true,
    }
}

fn required_labels_present(labels: &[String], decl: &SafeOutputDeclaration) -> bool {
    decl.required_labels.iter().all(|needed| labels.contains(needed))
}

fn required_prefix_present(title: &str, decl: &SafeOutputDeclaration) -> bool {
    decl.required_title_prefix
        .as_ref()
        .is_none_or(|prefix| title.starts_with(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aw_types::workflow::{Engine, WorkflowHead};

    #[test]
    fn configure_is_sorted_and_deterministic() {
        let mut head = WorkflowHead::default();
        head.engine = Some(Engine::Claude);
        head.safe_outputs.insert("upload-assets".into(), SafeOutputDeclaration::default());
        head.safe_outputs.insert("add-comment".into(), SafeOutputDeclaration::default());

        let specs = configure(&head);
        let names: Vec<_> = specs.iter().map(|s| s.job_name.clone()).collect();
        assert_eq!(names, vec!["add_comment".to_string(), "upload_assets".to_string()]);
    }

    #[test]
    fn token_precedence_prefers_per_kind_over_workflow_level() {
        let mut head = WorkflowHead::default();
        head.github_token = Some("${{ secrets.WORKFLOW_TOKEN }}".to_string());
        let mut decl = SafeOutputDeclaration::default();
        decl.github_token = Some("${{ secrets.KIND_TOKEN }}".to_string());
        head.safe_outputs.insert("add-comment".into(), decl);

        let specs = configure(&head);
        assert_eq!(specs[0].token_expression, "${{ secrets.KIND_TOKEN }}");
    }

    #[test]
    fn token_falls_back_to_default_when_unset() {
        let head = WorkflowHead {
            safe_outputs: BTreeMap::from([("add-comment".to_string(), SafeOutputDeclaration::default())]),
            ..Default::default()
        };
        let specs = configure(&head);
        assert_eq!(specs[0].token_expression, DEFAULT_TOKEN_EXPRESSION);
    }

    #[test]
    fn enforce_materializes_only_the_max_and_flags_the_remainder() {
        let decl = SafeOutputDeclaration {
            max: Some(1),
            ..Default::default()
        };
        let envelopes = vec![
            SafeOutputEnvelope::AddComment { body: "a".into() },
            SafeOutputEnvelope::AddComment { body: "b".into() },
        ];
        let (accepted, diagnostics) = enforce(
            std::path::Path::new("x.md"),
            SafeOutputKind::AddComment,
            &decl,
            &envelopes,
        );
        assert_eq!(accepted.len(), 1);
        assert!(diagnostics.iter().any(|d| d.message.contains("exceeding the declared max")));
    }

    #[test]
    fn enforce_other_kinds_unaffected_by_one_kinds_overflow() {
        let decl = SafeOutputDeclaration {
            max: Some(1),
            ..Default::default()
        };
        let envelopes = vec![
            SafeOutputEnvelope::AddComment { body: "a".into() },
            SafeOutputEnvelope::AddComment { body: "b".into() },
            SafeOutputEnvelope::AddLabels {
                labels: vec!["triage".into()],
            },
        ];
        let other_decl = SafeOutputDeclaration::default();
        let (accepted, _) = enforce(
            std::path::Path::new("x.md"),
            SafeOutputKind::AddLabels,
            &other_decl,
            &envelopes,
        );
        assert_eq!(accepted.len(), 1);
    }

    #[test]
    fn enforce_drops_envelopes_missing_required_labels() {
        let decl = SafeOutputDeclaration {
            required_labels: vec!["triage".into()],
            ..Default::default()
        };
        let envelopes = vec![SafeOutputEnvelope::CreateIssue {
            title: "bug".into(),
            body: "oops".into(),
            labels: vec!["other".into()],
        }];
        let (accepted, diagnostics) = enforce(
            std::path::Path::new("x.md"),
            SafeOutputKind::CreateIssue,
            &decl,
            &envelopes,
        );
        assert!(accepted.is_empty());
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn parse_envelopes_skips_malformed_lines() {
        let jsonl = "{\"type\":\"add-comment\",\"body\":\"ok\"}\nnot json\n\n";
        let parsed = parse_envelopes(jsonl);
        assert_eq!(parsed.len(), 1);
    }
}
