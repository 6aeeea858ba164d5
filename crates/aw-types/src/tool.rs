//! Tool binding domain types.

use serde::{Deserialize, Serialize};

/// Built-in capabilities the agent job can be granted without an external
/// MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuiltinTool {
    Bash,
    Edit,
    Github,
    WebFetch,
    WebSearch,
    Playwright,
    CacheMemory,
}

impl BuiltinTool {
    /// Permission resources this built-in requires to be present in the
    /// effective permission set.
    pub fn required_permissions(&self) -> &'static [&'static str] {
        match self {
            BuiltinTool::Bash => &[],
            BuiltinTool::Edit => &["contents"],
            BuiltinTool::Github => &["issues", "pull-requests"],
            BuiltinTool::WebFetch | BuiltinTool::WebSearch => &[],
            BuiltinTool::Playwright => &[],
            BuiltinTool::CacheMemory => &["actions"],
        }
    }
}

/// Transport used to reach an external MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum McpTransport {
    Stdio { command: String, #[serde(default)] args: Vec<String> },
    Http { url: String },
    Container { image: String, #[serde(default)] port: Option<u16> },
}

/// A named entry under `tools`: either a built-in capability or an
/// external MCP server, each with its own allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolBinding {
    Builtin {
        #[serde(rename = "type")]
        kind: BuiltinTool,
        #[serde(default)]
        allowed_commands: Vec<String>,
        #[serde(default)]
        allowed_domains: Vec<String>,
    },
    Mcp {
        #[serde(flatten)]
        transport: McpTransport,
        #[serde(default)]
        allowed_tools: Vec<String>,
    },
}

impl ToolBinding {
    pub fn required_permissions(&self) -> &'static [&'static str] {
        match self {
            ToolBinding::Builtin { kind, .. } => kind.required_permissions(),
            ToolBinding::Mcp { .. } => &[],
        }
    }
}
