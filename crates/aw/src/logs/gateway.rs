//! Tool-gateway `gateway.jsonl` parser: one JSON object per line,
//! tolerating malformed lines by skipping and continuing rather than
//! failing the whole extraction.

use aw_types::metrics::{RunMetrics, TimeoutKind};
use serde::Deserialize;

/// Mirrors the gateway's wire shape: `timestamp`, `level`, `type`,
/// `event`, `server_name`, optional `tool_name`/`method`, numeric
/// `duration` (ms), `input_size`, `output_size`, `status`, optional
/// `error`, optional `timeout_type`.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    #[allow(dead_code)]
    timestamp: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    level: Option<String>,
    #[serde(alias = "type")]
    event: String,
    #[serde(default)]
    server_name: Option<String>,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    input_size: Option<u64>,
    #[serde(default)]
    output_size: Option<u64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timeout_type: Option<String>,
}

/// Parse `gateway.jsonl` and fold every recognized event into `metrics`.
/// Unrecognized event names and malformed lines are silently skipped.
pub fn extract(jsonl: &str, metrics: &mut RunMetrics) {
    for line in jsonl.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<RawEvent>(trimmed) else {
            continue;
        };
        apply(&event, metrics);
    }
}

fn apply(event: &RawEvent, metrics: &mut RunMetrics) {
    let is_error = event.status.as_deref() == Some("error");
    let duration = event.duration.unwrap_or(0);
    let input_size = event.input_size.unwrap_or(0);
    let output_size = event.output_size.unwrap_or(0);
    let tool_name = event.tool_name.as_deref().or(event.method.as_deref());

    match event.event.as_str() {
        "tool_call" => {
            if let Some(server) = &event.server_name {
                metrics
                    .by_server
                    .entry(server.clone())
                    .or_default()
                    .record(duration, input_size, output_size, is_error);
            }
            if let Some(tool) = tool_name {
                metrics
                    .by_tool
                    .entry(tool.to_string())
                    .or_default()
                    .record(duration, input_size, output_size, is_error);
            }
        }
        "rpc_call" => {
            if let Some(server) = &event.server_name {
                metrics
                    .by_server
                    .entry(server.clone())
                    .or_default()
                    .record(duration, input_size, output_size, is_error);
            }
        }
        "timeout" => {
            let kind = match event.timeout_type.as_deref() {
                Some("startup") => TimeoutKind::Startup,
                _ => TimeoutKind::Tool,
            };
            if let Some(server) = &event.server_name {
                metrics.by_server.entry(server.clone()).or_default().record_timeout(kind);
            }
            if let Some(tool) = tool_name {
                metrics.by_tool.entry(tool.to_string()).or_default().record_timeout(kind);
            }
        }
        "missing_tool" => {
            if let Some(tool) = tool_name {
                metrics.missing_tools.push(tool.to_string());
            }
        }
        "startup" if is_error => {
            let server = event.server_name.as_deref().unwrap_or("unknown");
            let reason = event.error.as_deref().unwrap_or("failed to start");
            metrics
                .mcp_server_failures
                .push(format!("{server}: {reason}"));
        }
        "startup" | "shutdown" => {
            // Lifecycle markers: no metric contribution of their own, but
            // recognized so they don't fall through as unknown.
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_golden_scenario_5() {
        let jsonl = r#"
{"event":"tool_call","server_name":"github","tool_name":"get_repository","duration":100}
{"event":"tool_call","server_name":"github","tool_name":"get_repository","duration":200}
{"event":"tool_call","server_name":"github","tool_name":"get_repository","duration":300,"status":"error"}
"#;
        let mut metrics = RunMetrics::default();
        extract(jsonl, &mut metrics);

        let server = &metrics.by_server["github"];
        assert_eq!(server.call_count, 3);
        assert_eq!(server.error_count, 1);

        let tool = &metrics.by_tool["get_repository"];
        assert_eq!(tool.call_count, 3);
        assert_eq!(tool.total_duration_ms, 600);
        assert_eq!(tool.avg_duration_ms(), 200.0);
        assert_eq!(tool.max_duration_ms, 300);
        assert_eq!(tool.min_duration_ms, 100);
        assert_eq!(tool.error_count, 1);
    }

    #[test]
    fn skips_malformed_lines() {
        let jsonl = "not json at all\n{\"event\":\"tool_call\",\"server_name\":\"x\",\"tool_name\":\"y\",\"duration\":10}\n\n";
        let mut metrics = RunMetrics::default();
        extract(jsonl, &mut metrics);
        assert_eq!(metrics.by_server["x"].call_count, 1);
    }

    #[test]
    fn classifies_startup_vs_tool_timeouts() {
        let jsonl = r#"
{"event":"timeout","server_name":"s","timeout_type":"startup"}
{"event":"timeout","server_name":"s","timeout_type":"tool"}
"#;
        let mut metrics = RunMetrics::default();
        extract(jsonl, &mut metrics);
        let stats = &metrics.by_server["s"];
        assert_eq!(stats.timeout_count, 2);
        assert_eq!(stats.startup_timeout_count, 1);
        assert_eq!(stats.tool_timeout_count, 1);
    }

    #[test]
    fn records_missing_tool_reports() {
        let jsonl = r#"{"event":"missing_tool","tool_name":"web-search"}"#;
        let mut metrics = RunMetrics::default();
        extract(jsonl, &mut metrics);
        assert_eq!(metrics.missing_tools, vec!["web-search".to_string()]);
    }

    #[test]
    fn records_mcp_server_startup_failures() {
        let jsonl = r#"{"event":"startup","server_name":"playwright","status":"error","error":"connection refused"}"#;
        let mut metrics = RunMetrics::default();
        extract(jsonl, &mut metrics);
        assert_eq!(metrics.mcp_server_failures.len(), 1);
        assert!(metrics.mcp_server_failures[0].contains("playwright"));
    }
}
