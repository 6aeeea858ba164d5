//! Engine-specific agent stdio parsers. `aw_info.json` names which
//! engine produced a run, and that selects the parser: each engine emits a
//! different stdio shape (structured JSON events for some, timestamped
//! debug lines with embedded JSON response bodies for others). A workflow
//! whose engine can't be identified falls back to a generic parser that
//! only detects `::error::`/`::warning::` markers.

use aw_types::workflow::Engine;
use serde::Deserialize;

#[derive(Debug, Default)]
pub struct StdioTally {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub turn_count: u32,
    pub error_count: u64,
    pub warning_count: u64,
}

pub fn parse(engine: Option<Engine>, stdio: &str) -> StdioTally {
    match engine {
        Some(Engine::Copilot) => parse_structured_events(stdio),
        Some(Engine::Claude) => parse_structured_events(stdio),
        Some(Engine::Codex) => parse_debug_lines(stdio),
        None => parse_generic(stdio),
    }
}

#[derive(Debug, Deserialize)]
struct StructuredEvent {
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// `copilot`/`claude` emit one JSON event object per line.
fn parse_structured_events(stdio: &str) -> StdioTally {
    let mut tally = StdioTally::default();
    for line in stdio.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<StructuredEvent>(trimmed) else {
            continue;
        };
        if let Some(usage) = &event.usage {
            tally.input_tokens += usage.input_tokens;
            tally.output_tokens += usage.output_tokens;
        }
        match event.r#type.as_str() {
            "turn" | "message" => tally.turn_count += 1,
            _ => {}
        }
        match event.level.as_deref() {
            Some("error") => tally.error_count += 1,
            Some("warning") => tally.warning_count += 1,
            _ => {}
        }
    }
    tally
}

/// `codex` emits `[timestamp] message {json body}` debug lines; the JSON
/// body, when present, is the last `{...}` substring on the line.
fn parse_debug_lines(stdio: &str) -> StdioTally {
    let mut tally = StdioTally::default();
    for line in stdio.lines() {
        if line.contains("turn complete") {
            tally.turn_count += 1;
        }
        if line.contains("ERROR") {
            tally.error_count += 1;
        }
        if line.contains("WARN") {
            tally.warning_count += 1;
        }

        if let Some(start) = line.find('{') {
            if let Some(end) = line.rfind('}') {
                if end > start {
                    if let Ok(usage) = serde_json::from_str::<Usage>(&line[start..=end]) {
                        tally.input_tokens += usage.input_tokens;
                        tally.output_tokens += usage.output_tokens;
                    }
                }
            }
        }
    }
    tally
}

/// Fallback when no engine is identified: only `::error::`/`::warning::`
/// markers are recognized.
fn parse_generic(stdio: &str) -> StdioTally {
    let mut tally = StdioTally::default();
    for line in stdio.lines() {
        if line.contains("::error::") {
            tally.error_count += 1;
        }
        if line.contains("::warning::") {
            tally.warning_count += 1;
        }
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_events_sum_token_usage() {
        let stdio = "{\"type\":\"turn\",\"usage\":{\"input_tokens\":10,\"output_tokens\":20}}\n{\"type\":\"turn\",\"usage\":{\"input_tokens\":5,\"output_tokens\":7}}\n";
        let tally = parse(Some(Engine::Claude), stdio);
        assert_eq!(tally.input_tokens, 15);
        assert_eq!(tally.output_tokens, 27);
        assert_eq!(tally.turn_count, 2);
    }

    #[test]
    fn debug_lines_detect_errors_and_turns() {
        let stdio = "[10:00] turn complete {\"input_tokens\":3,\"output_tokens\":4}\n[10:01] ERROR something broke\n";
        let tally = parse(Some(Engine::Codex), stdio);
        assert_eq!(tally.turn_count, 1);
        assert_eq!(tally.error_count, 1);
        assert_eq!(tally.input_tokens, 3);
        assert_eq!(tally.output_tokens, 4);
    }

    #[test]
    fn generic_fallback_only_detects_annotation_markers() {
        let stdio = "plain log line\n::error::boom\n::warning::careful\n";
        let tally = parse(None, stdio);
        assert_eq!(tally.error_count, 1);
        assert_eq!(tally.warning_count, 1);
        assert_eq!(tally.turn_count, 0);
    }
}
