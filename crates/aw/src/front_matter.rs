//! Front-Matter Parser: splits a Workflow Source file into its YAML
//! head and Markdown body, and validates the head against the closed
//! schema in [`aw_types::workflow::WorkflowHead`].

use std::path::Path;

use aw_types::error::{AwError, Location};
use aw_types::workflow::WorkflowHead;

/// The result of successfully splitting and parsing a WS file.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub head: WorkflowHead,
    /// The body, verbatim — the parser never interprets Markdown.
    pub body: String,
    /// Byte offset in the original file where the body begins, used to
    /// translate body-relative positions (e.g. from `@include`) back to
    /// file positions.
    pub body_offset: usize,
}

const FENCE: &str = "---";

/// Split `input` into a YAML head and a Markdown body, then deserialize the
/// head into [`WorkflowHead`], rejecting unknown top-level keys.
pub fn parse(path: &Path, input: &str) -> Result<ParsedSource, AwError> {
    let mut lines = input.split_inclusive('\n');

    let first = lines.next().unwrap_or("");
    if first.trim_end() != FENCE {
        return Err(AwError::Parse {
            location: Location::at(path, 1, 1),
            message: "expected a leading `---` front-matter fence".to_string(),
        });
    }

    let mut consumed = first.len();
    let mut head_lines = Vec::new();
    let mut closed = false;
    let mut line_no = 1u32;

    for line in lines {
        line_no += 1;
        if line.trim_end() == FENCE {
            consumed += line.len();
            closed = true;
            break;
        }
        head_lines.push(line);
        consumed += line.len();
    }

    if !closed {
        return Err(AwError::Parse {
            location: Location::at(path, line_no, 1),
            message: "front-matter is missing its closing `---` fence".to_string(),
        });
    }

    let head_text: String = head_lines.concat();
    let head = parse_head(path, &head_text)?;
    let body = input[consumed.min(input.len())..].to_string();

    Ok(ParsedSource {
        head,
        body,
        body_offset: consumed,
    })
}

fn parse_head(path: &Path, head_text: &str) -> Result<WorkflowHead, AwError> {
    let value: serde_yaml::Value = serde_yaml::from_str(head_text).map_err(|e| AwError::Parse {
        location: yaml_error_location(path, &e),
        message: format!("invalid YAML in front-matter: {e}"),
    })?;

    match &value {
        serde_yaml::Value::Mapping(_) | serde_yaml::Value::Null => {}
        _ => {
            return Err(AwError::Parse {
                location: Location::at(path, 2, 1),
                message: "front-matter head must be a YAML mapping".to_string(),
            });
        }
    }

    reject_unknown_keys(path, &value)?;

    serde_yaml::from_value(value).map_err(|e| AwError::Parse {
        location: Location::file(path),
        message: format!("front-matter does not match the recognized schema: {e}"),
    })
}

/// The closed set of top-level head keys. Reject, don't silently preserve
/// unrecognized ones — keeps the surface area bounded.
const RECOGNIZED_KEYS: &[&str] = &[
    "on",
    "permissions",
    "engine",
    "network",
    "tools",
    "safe-outputs",
    "imports",
    "strict",
    "roles",
    "concurrency",
    "env",
    "cache-memory",
    "sandbox.agent",
    "github-token",
];

fn reject_unknown_keys(path: &Path, value: &serde_yaml::Value) -> Result<(), AwError> {
    let serde_yaml::Value::Mapping(map) = value else {
        return Ok(());
    };
    for (key, _) in map {
        let Some(key_str) = key.as_str() else {
            return Err(AwError::Parse {
                location: Location::file(path),
                message: "front-matter keys must be strings".to_string(),
            });
        };
        if !RECOGNIZED_KEYS.contains(&key_str) {
            return Err(AwError::Parse {
                location: Location::file(path),
                message: format!("unknown front-matter key `{key_str}`"),
            });
        }
    }
    Ok(())
}

/// `serde_yaml` doesn't expose a stable line/column API across versions, so
/// this falls back to the head's start line when a more precise location
/// isn't derivable from the error's `Display` text.
fn yaml_error_location(path: &Path, err: &serde_yaml::Error) -> Location {
    let text = err.to_string();
    if let Some(idx) = text.find("line ") {
        let rest = &text[idx + 5..];
        if let Some(end) = rest.find(|c: char| !c.is_ascii_digit()) {
            if let Ok(line) = rest[..end].parse::<u32>() {
                return Location::at(path, line + 1, 1);
            }
        }
    }
    Location::at(path, 2, 1)
}
