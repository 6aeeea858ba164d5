//! Github-token resolution: the token used for resolver-adapter and
//! permission-check API calls follows a fixed precedence and is read from
//! exactly one environment variable — never logged, never embedded in an
//! emitted lock file (the validator rejects literal `github-token` values,
//! see [`crate::validate`]).

use aw_types::safe_output::SafeOutputDeclaration;
use aw_types::workflow::WorkflowHead;

pub const AW_GITHUB_TOKEN_VAR: &str = "AW_GITHUB_TOKEN";

/// Resolve the token expression for one safe-output kind, in precedence
/// order: the kind's own declaration, the workflow-level `github-token`,
/// then the built-in default expression. This mirrors
/// [`crate::safeoutputs::configure`]'s per-job token selection, exposed
/// standalone so the CLI's `status`/`audit` paths (which never build a
/// full safe-output job spec) can resolve the same precedence.
pub fn resolve_token_expression(head: &WorkflowHead, decl: Option<&SafeOutputDeclaration>) -> String {
    decl.and_then(|d| d.github_token.clone())
        .or_else(|| head.github_token.clone())
        .unwrap_or_else(|| "${{ secrets.GITHUB_TOKEN }}".to_string())
}

/// Read the actual credential used for outbound API calls (resolver
/// adapter, permission-level lookups) from the process environment. This
/// is distinct from `resolve_token_expression`, which produces the
/// *lock-file* token expression (a CI secret reference) rather than a
/// runtime credential value.
pub fn runtime_token() -> Option<String> {
    std::env::var(AW_GITHUB_TOKEN_VAR).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_kind_token_wins_over_workflow_level() {
        let mut head = WorkflowHead::default();
        head.github_token = Some("${{ secrets.WORKFLOW }}".to_string());
        let decl = SafeOutputDeclaration {
            github_token: Some("${{ secrets.KIND }}".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_token_expression(&head, Some(&decl)),
            "${{ secrets.KIND }}"
        );
    }

    #[test]
    fn falls_back_to_default_when_nothing_set() {
        let head = WorkflowHead::default();
        assert_eq!(
            resolve_token_expression(&head, None),
            "${{ secrets.GITHUB_TOKEN }}"
        );
    }

    #[test]
    fn runtime_token_ignores_empty_env_value() {
        temp_env::with_var(AW_GITHUB_TOKEN_VAR, Some(""), || {
            assert_eq!(runtime_token(), None);
        });
    }

    #[test]
    fn runtime_token_reads_set_value() {
        temp_env::with_var(AW_GITHUB_TOKEN_VAR, Some("abc123"), || {
            assert_eq!(runtime_token(), Some("abc123".to_string()));
        });
    }
}
