//! Action Pin domain types.

use serde::{Deserialize, Serialize};

/// A mutable reference to a third-party action as written in a workflow
/// body or tool binding: `owner/repo` at a requested tag/branch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionRef {
    pub repo: String,
    pub requested_version: String,
}

impl ActionRef {
    pub fn parse(spec: &str) -> Option<Self> {
        let (repo, version) = spec.split_once('@')?;
        if repo.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self {
            repo: repo.to_string(),
            requested_version: version.to_string(),
        })
    }
}

/// Where a pin resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinSource {
    /// Resolved live via the resolver adapter.
    Dynamic,
    /// Resolver adapter was unavailable; served from the built-in fallback
    /// table.
    Fallback,
    /// Served from the persisted cache.
    Cached,
}

/// A resolved `(repo, requested_version) -> (sha, resolved_version)` pin,
/// as persisted in the Action Pin Cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPin {
    pub reference: ActionRef,
    /// 40 lowercase hex characters.
    pub sha: String,
    /// The tag/branch the sha pointed to at resolution time. May differ
    /// from `reference.requested_version` — a mismatch.
    pub resolved_version: String,
    pub source: PinSource,
}

impl ActionPin {
    pub fn is_valid_sha(sha: &str) -> bool {
        sha.len() == 40 && sha.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
    }

    pub fn mismatched(&self) -> bool {
        self.resolved_version != self.reference.requested_version
    }

    /// Render as it appears in an emitted lock file:
    /// `owner/repo@<sha> # <version>`.
    pub fn to_pinned_reference(&self) -> String {
        format!(
            "{}@{} # {}",
            self.reference.repo, self.sha, self.resolved_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_owner_repo_at_version() {
        let r = ActionRef::parse("actions/checkout@v4").unwrap();
        assert_eq!(r.repo, "actions/checkout");
        assert_eq!(r.requested_version, "v4");
    }

    #[test]
    fn rejects_missing_at_sign() {
        assert!(ActionRef::parse("actions/checkout").is_none());
    }

    #[test]
    fn validates_sha_shape() {
        assert!(ActionPin::is_valid_sha(&"a".repeat(40)));
        assert!(!ActionPin::is_valid_sha(&"A".repeat(40)));
        assert!(!ActionPin::is_valid_sha("deadbeef"));
    }

    #[test]
    fn pinned_reference_matches_spec_regex_shape() {
        let pin = ActionPin {
            reference: ActionRef::parse("actions/checkout@v4").unwrap(),
            sha: "a".repeat(40),
            resolved_version: "v4.2.3".to_string(),
            source: PinSource::Dynamic,
        };
        let rendered = pin.to_pinned_reference();
        assert!(rendered.starts_with("actions/checkout@"));
        assert!(rendered.ends_with("# v4.2.3"));
    }
}
