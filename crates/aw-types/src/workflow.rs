//! Workflow Source (WS) domain types: the parsed front-matter head, its
//! recognized fields, and the merged front-matter that results from import
//! resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::safe_output::SafeOutputDeclaration;
use crate::tool::ToolBinding;

/// Stable identity for a compiled workflow, derived once from its
/// source path (POSIX-normalized, extension stripped, lowercased) so the
/// Dependency Graph, the lock-file header, and the audit engine's
/// "workflow name" field never disagree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    /// Derive an id from a path relative to the workflows directory.
    pub fn from_relative_path(path: &Path) -> Self {
        let posix = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/");
        let stripped = posix
            .strip_suffix(".md")
            .map(str::to_string)
            .unwrap_or(posix);
        WorkflowId(stripped.to_lowercase())
    }
}

/// The engines this system knows how to drive. Closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Copilot,
    Claude,
    Codex,
}

/// Repository-permission roles allowed to trigger a workflow. Closed
/// vocabulary, checked against the triggering actor's permission level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Maintainer,
    Write,
    All,
}

/// Sandbox posture for the agent job. Closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxAgent {
    #[default]
    Default,
    Strict,
    None,
}

/// CI event triggers a workflow can declare. Events not modeled explicitly
/// are preserved as opaque YAML under `other`, since the closed-schema
/// validator only rejects *unknown top-level head keys*, not
/// unknown values within a recognized mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Triggers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<EventFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_comment: Option<EventFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<EventFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_review_comment: Option<EventFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Vec<ScheduleEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_dispatch: Option<EventFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_run: Option<EventFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandTrigger>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub cron: String,
}

/// `on.command`: a slash-command trigger. `events` restricts which
/// comment-bearing events the command is recognized on; `["*"]` or an
/// empty list means all of them. An explicit subset still requires an
/// event-aware `if` (see `DESIGN.md`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTrigger {
    pub name: String,
    #[serde(default)]
    pub events: Vec<String>,
}

impl CommandTrigger {
    pub const ALL_COMMENT_EVENTS: [&'static str; 4] = [
        "issues",
        "issue_comment",
        "pull_request",
        "pull_request_review_comment",
    ];

    /// The concrete set of comment-bearing events this command trigger is
    /// scoped to, expanding `*`/empty to all four.
    pub fn resolved_events(&self) -> BTreeSet<&'static str> {
        if self.events.is_empty() || self.events.iter().any(|e| e == "*") {
            Self::ALL_COMMENT_EVENTS.into_iter().collect()
        } else {
            Self::ALL_COMMENT_EVENTS
                .into_iter()
                .filter(|known| self.events.iter().any(|e| e == known))
                .collect()
        }
    }
}

/// GitHub Actions-style permission scopes this system understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    #[default]
    None,
    Read,
    Write,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Permissions(pub BTreeMap<String, PermissionLevel>);

impl Permissions {
    pub fn get(&self, resource: &str) -> PermissionLevel {
        self.0.get(resource).copied().unwrap_or_default()
    }

    pub fn grants_write(&self, resource: &str) -> bool {
        self.get(resource) == PermissionLevel::Write
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub allowed: Vec<String>,
}

impl NetworkConfig {
    pub fn has_wildcard(&self) -> bool {
        self.allowed.iter().any(|d| d == "*")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMemoryConfig {
    pub id: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    7
}

/// The closed set of recognized top-level front-matter keys.
/// Unknown keys are a `ValidationError`, not silently preserved — this
/// keeps the surface area bounded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowHead {
    pub on: Triggers,
    pub permissions: Permissions,
    pub engine: Option<Engine>,
    pub network: NetworkConfig,
    pub tools: BTreeMap<String, ToolBinding>,
    #[serde(rename = "safe-outputs")]
    pub safe_outputs: BTreeMap<String, SafeOutputDeclaration>,
    pub imports: Vec<String>,
    pub strict: bool,
    pub roles: Vec<Role>,
    pub concurrency: Option<String>,
    pub env: BTreeMap<String, String>,
    #[serde(rename = "cache-memory")]
    pub cache_memory: Vec<CacheMemoryConfig>,
    #[serde(rename = "sandbox.agent")]
    pub sandbox_agent: SandboxAgent,
    #[serde(rename = "github-token")]
    pub github_token: Option<String>,
}

/// Front-matter keys that only the main (root) workflow file may set;
/// imports attempting to set any of these are a `ResolveError`.
pub const MAIN_ONLY_KEYS: &[&str] = &[
    "on",
    "permissions",
    "concurrency",
    "engine",
    "strict",
    "roles",
    "github-token",
];

/// The fixed point of merging a main WS head with its transitively
/// imported heads, per the precedence rules in `imports::merge_head`.
#[derive(Debug, Clone, Default)]
pub struct MergedFrontMatter {
    pub head: WorkflowHead,
    /// Source files that contributed to this merge, main file first.
    pub contributors: Vec<PathBuf>,
}
