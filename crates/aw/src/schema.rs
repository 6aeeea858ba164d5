//! Closed-vocabulary lookups shared by the validator, the safe-output
//! configurator, and the lock-file emitter. Centralized here so adding a
//! new safe-output kind or engine is a one-file change instead of a grep
//! across the compiler.

use aw_types::safe_output::SafeOutputKind;
use aw_types::workflow::{Engine, Role, SandboxAgent};

/// Parse a front-matter safe-output key (`"create-issue"`, …) into its
/// closed-vocabulary kind. `serde` already enforces this at deserialization
/// time for typed fields, but safe-output keys are a `BTreeMap<String, _>`
/// so membership has to be checked by hand.
pub fn parse_safe_output_kind(key: &str) -> Option<SafeOutputKind> {
    SafeOutputKind::ALL.into_iter().find(|k| k.job_name().replace('_', "-") == key)
}

pub fn engine_names() -> &'static [&'static str] {
    &["copilot", "claude", "codex"]
}

pub fn role_names() -> &'static [&'static str] {
    &["admin", "maintainer", "write", "all"]
}

pub fn sandbox_agent_names() -> &'static [&'static str] {
    &["default", "strict", "none"]
}

pub fn parse_role(value: &str) -> Option<Role> {
    match value {
        "admin" => Some(Role::Admin),
        "maintainer" => Some(Role::Maintainer),
        "write" => Some(Role::Write),
        "all" => Some(Role::All),
        _ => None,
    }
}

pub fn parse_engine(value: &str) -> Option<Engine> {
    match value {
        "copilot" => Some(Engine::Copilot),
        "claude" => Some(Engine::Claude),
        "codex" => Some(Engine::Codex),
        _ => None,
    }
}

pub fn parse_sandbox_agent(value: &str) -> Option<SandboxAgent> {
    match value {
        "default" => Some(SandboxAgent::Default),
        "strict" => Some(SandboxAgent::Strict),
        "none" => Some(SandboxAgent::None),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_safe_output_job_name_back_to_its_kind() {
        for kind in SafeOutputKind::ALL {
            let key = kind.job_name().replace('_', "-");
            assert_eq!(parse_safe_output_kind(&key), Some(kind));
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(parse_safe_output_kind("delete-everything").is_none());
    }

    #[test]
    fn parses_known_roles() {
        assert_eq!(parse_role("maintainer"), Some(Role::Maintainer));
        assert!(parse_role("owner").is_none());
    }
}
