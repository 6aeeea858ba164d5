//! Permission & Tool Validator: checks a merged front-matter head
//! against the closed vocabularies and cross-field invariants the
//! compiler enforces before a workflow is allowed to emit.

use std::collections::{BTreeMap, BTreeSet};

use aw_types::error::{AwError, Diagnostic, Location};
use aw_types::workflow::{MergedFrontMatter, PermissionLevel, WorkflowHead};

use crate::schema;

/// The effective permission set: every resource granted by the head,
/// folded with whatever each bound tool additionally requires.
#[derive(Debug, Clone, Default)]
pub struct EffectivePermissions(pub BTreeMap<String, PermissionLevel>);

impl EffectivePermissions {
    pub fn grants(&self, resource: &str) -> PermissionLevel {
        self.0.get(resource).copied().unwrap_or_default()
    }
}

/// Validate `merged` and return the accumulated diagnostics. The caller
/// decides what to do with them: in non-strict mode, warnings are
/// just surfaced; in strict mode the presence of any `Severity::Error`
/// diagnostic here must stop emission.
pub fn validate(path: &std::path::Path, merged: &MergedFrontMatter) -> Vec<Diagnostic> {
    let head = &merged.head;
    let mut diagnostics = Vec::new();
    let strict = head.strict;
    let loc = || Location::file(path);

    check_tool_permissions(head, strict, &loc, &mut diagnostics);
    check_write_vs_safe_output_conflicts(head, &loc, &mut diagnostics);
    check_wildcard_network(head, strict, &loc, &mut diagnostics);
    check_github_token_literal(head, &loc, &mut diagnostics);
    check_safe_output_invariants(head, &loc, &mut diagnostics);
    check_cache_memory(head, &loc, &mut diagnostics);

    diagnostics
}

fn effective_permissions(head: &WorkflowHead) -> EffectivePermissions {
    EffectivePermissions(head.permissions.0.clone())
}

fn check_tool_permissions(
    head: &WorkflowHead,
    strict: bool,
    loc: &impl Fn() -> Location,
    out: &mut Vec<Diagnostic>,
) {
    let effective = effective_permissions(head);
    for (name, binding) in &head.tools {
        for resource in binding.required_permissions() {
            if effective.grants(resource) == PermissionLevel::None {
                let message = format!(
                    "tool `{name}` requires `{resource}` permission, which is not granted; add `permissions.{resource}: read` or remove the tool"
                );
                if strict {
                    out.push(Diagnostic::error(loc(), "ValidationError", message));
                } else {
                    out.push(Diagnostic::warning(loc(), "ValidationError", message));
                }
            }
        }
    }
}

fn check_write_vs_safe_output_conflicts(
    head: &WorkflowHead,
    loc: &impl Fn() -> Location,
    out: &mut Vec<Diagnostic>,
) {
    for kind_key in head.safe_outputs.keys() {
        let Some(kind) = schema::parse_safe_output_kind(kind_key) else {
            continue;
        };
        let resource = kind.conflicting_permission_resource();
        if head.permissions.grants_write(resource) {
            out.push(Diagnostic::error(
                loc(),
                "ValidationError",
                format!(
                    "`permissions.{resource}: write` conflicts with the declared `{kind_key}` safe output; write access to `{resource}` must flow through the safe-output pipeline, not the main job"
                ),
            ));
        }
    }
}

fn check_wildcard_network(
    head: &WorkflowHead,
    strict: bool,
    loc: &impl Fn() -> Location,
    out: &mut Vec<Diagnostic>,
) {
    if strict && head.network.has_wildcard() {
        out.push(Diagnostic::error(
            loc(),
            "ValidationError",
            "`network.allowed` contains a wildcard `*`, which strict mode forbids".to_string(),
        ));
    }
}

fn check_github_token_literal(
    head: &WorkflowHead,
    loc: &impl Fn() -> Location,
    out: &mut Vec<Diagnostic>,
) {
    if let Some(token) = &head.github_token {
        if !looks_like_secret_expression(token) {
            out.push(Diagnostic::error(
                loc(),
                "ValidationError",
                "`github-token` must be a secret expression (e.g. `${{ secrets.X }}`), not a literal value".to_string(),
            ));
        }
    }

    for (key, decl) in &head.safe_outputs {
        if let Some(token) = &decl.github_token {
            if !looks_like_secret_expression(token) {
                out.push(Diagnostic::error(
                    loc(),
                    "ValidationError",
                    format!("safe-output `{key}` sets a literal `github-token`; use a secret expression"),
                ));
            }
        }
    }
}

fn looks_like_secret_expression(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.starts_with("${{") && trimmed.ends_with("}}") && trimmed.contains("secrets.")
}

fn check_safe_output_invariants(
    head: &WorkflowHead,
    loc: &impl Fn() -> Location,
    out: &mut Vec<Diagnostic>,
) {
    for (key, decl) in &head.safe_outputs {
        if schema::parse_safe_output_kind(key).is_none() {
            out.push(Diagnostic::error(
                loc(),
                "ValidationError",
                format!("`{key}` is not a recognized safe-output kind"),
            ));
            continue;
        }

        if let Some(max) = decl.max {
            if max < 1 {
                out.push(Diagnostic::error(
                    loc(),
                    "ValidationError",
                    format!("safe-output `{key}` has `max: {max}`, which must be at least 1"),
                ));
            }
        }

        if let Some(target_repo) = &decl.target_repo {
            if target_repo == "*" || !target_repo.contains('/') {
                out.push(Diagnostic::error(
                    loc(),
                    "ValidationError",
                    format!(
                        "safe-output `{key}` has `target-repo: {target_repo}`, which must be a concrete `owner/repo`, never `*`"
                    ),
                ));
            }
        }
    }
}

fn check_cache_memory(head: &WorkflowHead, loc: &impl Fn() -> Location, out: &mut Vec<Diagnostic>) {
    let mut seen = BTreeSet::new();
    for entry in &head.cache_memory {
        if !seen.insert(entry.id.clone()) {
            out.push(Diagnostic::error(
                loc(),
                "ValidationError",
                format!("duplicate `cache-memory` id `{}`", entry.id),
            ));
        }
        if !(1..=90).contains(&entry.retention_days) {
            out.push(Diagnostic::error(
                loc(),
                "ValidationError",
                format!(
                    "cache-memory `{}` has `retention_days: {}`, which must be between 1 and 90",
                    entry.id, entry.retention_days
                ),
            ));
        }
    }
}

/// Roll a set of diagnostics into a terminal `AwError` if any of them are
/// `Severity::Error` in strict mode, or if any are errors regardless of
/// strictness (non-strict mode downgrades tool-permission gaps to warnings
/// at the point they're produced, but invariant violations like duplicate
/// ids are always errors).
pub fn enforce(_path: &std::path::Path, diagnostics: &[Diagnostic]) -> Result<(), AwError> {
    if let Some(first) = diagnostics
        .iter()
        .find(|d| d.severity == aw_types::error::Severity::Error)
    {
        return Err(AwError::Validation {
            location: first.location.clone(),
            message: first.message.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aw_types::workflow::NetworkConfig;
    use std::path::PathBuf;

    fn path() -> PathBuf {
        PathBuf::from("triage.md")
    }

    #[test]
    fn strict_mode_rejects_wildcard_network() {
        let mut head = WorkflowHead::default();
        head.strict = true;
        head.network = NetworkConfig {
            allowed: vec!["*".into()],
        };
        let merged = MergedFrontMatter {
            head,
            contributors: vec![],
        };
        let diagnostics = validate(&path(), &merged);
        assert!(diagnostics.iter().any(|d| d.message.contains("wildcard")));
    }

    #[test]
    fn rejects_literal_github_token() {
        let mut head = WorkflowHead::default();
        head.github_token = Some("ghp_abc123".to_string());
        let merged = MergedFrontMatter {
            head,
            contributors: vec![],
        };
        let diagnostics = validate(&path(), &merged);
        assert!(diagnostics.iter().any(|d| d.message.contains("secret expression")));
    }

    #[test]
    fn accepts_secret_expression_token() {
        let mut head = WorkflowHead::default();
        head.github_token = Some("${{ secrets.AW_TOKEN }}".to_string());
        let merged = MergedFrontMatter {
            head,
            contributors: vec![],
        };
        let diagnostics = validate(&path(), &merged);
        assert!(!diagnostics.iter().any(|d| d.message.contains("secret expression")));
    }

    #[test]
    fn rejects_duplicate_cache_memory_ids() {
        use aw_types::workflow::CacheMemoryConfig;
        let mut head = WorkflowHead::default();
        head.cache_memory = vec![
            CacheMemoryConfig {
                id: "notes".into(),
                retention_days: 7,
            },
            CacheMemoryConfig {
                id: "notes".into(),
                retention_days: 14,
            },
        ];
        let merged = MergedFrontMatter {
            head,
            contributors: vec![],
        };
        let diagnostics = validate(&path(), &merged);
        assert!(diagnostics.iter().any(|d| d.message.contains("duplicate")));
    }

    #[test]
    fn rejects_out_of_range_retention() {
        use aw_types::workflow::CacheMemoryConfig;
        let mut head = WorkflowHead::default();
        head.cache_memory = vec![CacheMemoryConfig {
            id: "notes".into(),
            retention_days: 120,
        }];
        let merged = MergedFrontMatter {
            head,
            contributors: vec![],
        };
        let diagnostics = validate(&path(), &merged);
        assert!(diagnostics.iter().any(|d| d.message.contains("between 1 and 90")));
    }

    #[test]
    fn write_permission_conflicts_with_safe_output() {
        use aw_types::safe_output::SafeOutputDeclaration;
        let mut head = WorkflowHead::default();
        head.permissions.0.insert("issues".into(), PermissionLevel::Write);
        head.safe_outputs
            .insert("create-issue".into(), SafeOutputDeclaration::default());
        let merged = MergedFrontMatter {
            head,
            contributors: vec![],
        };
        let diagnostics = validate(&path(), &merged);
        assert!(diagnostics.iter().any(|d| d.message.contains("conflicts")));
    }
}
