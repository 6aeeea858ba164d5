//! Per-run metrics domain types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutKind {
    Startup,
    Tool,
}

/// Aggregate call stats for one tool (by name) or one MCP server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallStats {
    pub call_count: u64,
    pub total_duration_ms: u64,
    pub max_duration_ms: u64,
    pub min_duration_ms: u64,
    pub max_input_size: u64,
    pub max_output_size: u64,
    pub error_count: u64,
    pub timeout_count: u64,
    pub startup_timeout_count: u64,
    pub tool_timeout_count: u64,
}

impl CallStats {
    pub fn record(&mut self, duration_ms: u64, input_size: u64, output_size: u64, is_error: bool) {
        if self.call_count == 0 {
            self.min_duration_ms = duration_ms;
        } else {
            self.min_duration_ms = self.min_duration_ms.min(duration_ms);
        }
        self.call_count += 1;
        self.total_duration_ms += duration_ms;
        self.max_duration_ms = self.max_duration_ms.max(duration_ms);
        self.max_input_size = self.max_input_size.max(input_size);
        self.max_output_size = self.max_output_size.max(output_size);
        if is_error {
            self.error_count += 1;
        }
    }

    pub fn record_timeout(&mut self, kind: TimeoutKind) {
        self.timeout_count += 1;
        match kind {
            TimeoutKind::Startup => self.startup_timeout_count += 1,
            TimeoutKind::Tool => self.tool_timeout_count += 1,
        }
    }

    pub fn avg_duration_ms(&self) -> f64 {
        if self.call_count == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.call_count as f64
        }
    }
}

/// Firewall allow/deny tallies per domain, from Squid access-log
/// classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainTally {
    pub allowed: u64,
    pub denied: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirewallMetrics {
    pub by_domain: BTreeMap<String, DomainTally>,
}

impl FirewallMetrics {
    pub fn total_allowed(&self) -> u64 {
        self.by_domain.values().map(|t| t.allowed).sum()
    }

    pub fn total_denied(&self) -> u64 {
        self.by_domain.values().map(|t| t.denied).sum()
    }
}

/// The full per-run metrics aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_usd: f64,
    pub turn_count: u32,
    pub error_count: u64,
    pub warning_count: u64,
    /// By MCP server name.
    pub by_server: BTreeMap<String, CallStats>,
    /// By tool name (aggregated across servers).
    pub by_tool: BTreeMap<String, CallStats>,
    pub missing_tools: Vec<String>,
    pub mcp_server_failures: Vec<String>,
    pub firewall: FirewallMetrics,
}

impl RunMetrics {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
