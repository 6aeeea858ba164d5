//! Log Metric Extractor: turns a flattened Run Artifact Set into
//! structured per-run metrics, routing agent stdio through an
//! engine-specific parser, `gateway.jsonl` through the tool-gateway event
//! parser, and the firewall log through the Squid access-log parser.

mod firewall;
mod gateway;
mod stdio;

use std::path::Path;

use aw_types::artifact::{AgentInfo, RunArtifactSet};
use aw_types::metrics::RunMetrics;

use crate::sanitizer;

/// Read every artifact named in `artifacts` (best-effort: a missing file
/// contributes nothing rather than aborting extraction) and fold them
/// into one [`RunMetrics`].
pub fn extract(artifacts: &RunArtifactSet) -> RunMetrics {
    let mut metrics = RunMetrics::default();

    let engine = artifacts
        .agent_info
        .as_deref()
        .and_then(read_agent_info)
        .map(|info| info.engine_id);

    if let Some(path) = &artifacts.agent_stdio {
        if let Ok(raw) = std::fs::read_to_string(path) {
            let sanitized = sanitizer::redact(&raw);
            let tally = stdio::parse(engine, &sanitized);
            metrics.input_tokens += tally.input_tokens;
            metrics.output_tokens += tally.output_tokens;
            metrics.turn_count += tally.turn_count;
            metrics.error_count += tally.error_count;
            metrics.warning_count += tally.warning_count;
        }
    }

    if let Some(path) = &artifacts.gateway_log {
        if let Ok(raw) = std::fs::read_to_string(path) {
            gateway::extract(&sanitizer::redact(&raw), &mut metrics);
        }
    }

    if let Some(path) = &artifacts.firewall_log {
        if let Ok(raw) = std::fs::read_to_string(path) {
            firewall::extract(&raw, &mut metrics.firewall);
        }
    }

    metrics
}

fn read_agent_info(path: &Path) -> Option<AgentInfo> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_tolerates_entirely_missing_artifacts() {
        let artifacts = RunArtifactSet::default();
        let metrics = extract(&artifacts);
        assert_eq!(metrics.total_tokens(), 0);
    }
}
