//! Top-level compiler orchestrator: source Markdown -> Parser -> Resolver
//! -> Validator -> Emitter -> lock file on disk. Single-file
//! `compile_one` is the unit both `batch` and `watch` build on.

mod batch;
mod watch;

pub use batch::compile_batch;
pub use watch::watch;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use aw_types::depgraph::DependencyGraph;
use aw_types::error::{AwError, Diagnostic};
use aw_types::pin::ActionRef;
use aw_types::state::{CompileState, FileOutcome, Stage};
use aw_types::workflow::WorkflowId;

use crate::config::CompilerConfig;
use crate::emit::{self, EmitInput};
use crate::front_matter;
use crate::imports::ImportResolver;
use crate::packages::PackageIndex;
use crate::pins::{ActionPinCache, PinOptions, ResolverAdapter};
use crate::validate;

pub struct CompileOptions<'a> {
    pub config: &'a CompilerConfig,
    pub workspace_root: &'a Path,
}

/// Compile one Workflow Source file end to end, returning both the
/// terminal [`CompileState`] and every diagnostic collected along the way
/// (so a non-strict run can still surface warnings on success).
pub async fn compile_one<A: ResolverAdapter>(
    source_path: &Path,
    options: &CompileOptions<'_>,
    pin_cache: &Arc<ActionPinCache<A>>,
    package_index: &PackageIndex,
    graph: Option<&Mutex<DependencyGraph>>,
) -> (FileOutcome, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    let Ok(text) = std::fs::read_to_string(source_path) else {
        let error = AwError::Parse {
            location: aw_types::error::Location::file(source_path),
            message: "could not read source file".to_string(),
        };
        diagnostics.push(Diagnostic::from_error(&error, source_path));
        return (
            FileOutcome {
                path: source_path.to_path_buf(),
                state: CompileState::Failed {
                    stage: Stage::Parse,
                    error,
                },
            },
            diagnostics,
        );
    };

    if let Err(error) = front_matter::parse(source_path, &text) {
        diagnostics.push(Diagnostic::from_error(&error, source_path));
        return (
            FileOutcome {
                path: source_path.to_path_buf(),
                state: CompileState::Failed {
                    stage: Stage::Parse,
                    error,
                },
            },
            diagnostics,
        );
    }

    let mut resolver = ImportResolver::new(options.workspace_root, package_index);
    let resolved = match resolver.resolve(source_path) {
        Ok(r) => r,
        Err(error) => {
            diagnostics.push(Diagnostic::from_error(&error, source_path));
            return (
                FileOutcome {
                    path: source_path.to_path_buf(),
                    state: CompileState::Failed {
                        stage: Stage::Resolve,
                        error,
                    },
                },
                diagnostics,
            );
        }
    };
    for note in &resolved.notes {
        diagnostics.push(Diagnostic::info(
            aw_types::error::Location::file(source_path),
            "ResolveError",
            note.clone(),
        ));
    }

    let workflow_id = WorkflowId::from_relative_path(
        source_path.strip_prefix(options.workspace_root).unwrap_or(source_path),
    );

    if let Some(graph) = graph {
        graph
            .lock()
            .unwrap()
            .record(workflow_id.clone(), resolved.files.clone());
    }

    let validation_diagnostics = validate::validate(source_path, &resolved.merged);
    diagnostics.extend(validation_diagnostics.clone());
    if let Err(error) = validate::enforce(source_path, &validation_diagnostics) {
        return (
            FileOutcome {
                path: source_path.to_path_buf(),
                state: CompileState::Failed {
                    stage: Stage::Validate,
                    error,
                },
            },
            diagnostics,
        );
    }

    let pin_options = PinOptions {
        strict: resolved.merged.head.strict,
        allow_fallback: options.config.allow_fallback_pins,
    };

    let mut reference_texts = extract_action_references(&resolved.body_sections);
    if emit::requires_checkout(&resolved.merged.head, false)
        && !reference_texts.iter().any(|r| r.starts_with("actions/checkout@"))
    {
        reference_texts.push(emit::CHECKOUT_ACTION_REF.to_string());
    }

    let mut pins = Vec::new();
    for reference_text in reference_texts {
        let Some(reference) = ActionRef::parse(&reference_text) else {
            continue;
        };
        match pin_cache.resolve(&reference, &pin_options).await {
            Ok(result) => {
                if let Some(warning) = &result.mismatch_warning {
                    diagnostics.push(Diagnostic::warning(
                        aw_types::error::Location::file(source_path),
                        "PinError",
                        warning.clone(),
                    ));
                }
                pins.push(result.pin);
            }
            Err(e) => {
                let error = AwError::Pin {
                    reference: format!("{}@{}", reference.repo, reference.requested_version),
                    message: e.to_string(),
                };
                diagnostics.push(Diagnostic::from_error(&error, source_path));
                return (
                    FileOutcome {
                        path: source_path.to_path_buf(),
                        state: CompileState::Failed {
                            stage: Stage::Emit,
                            error,
                        },
                    },
                    diagnostics,
                );
            }
        }
    }

    let engine_id = resolved
        .merged
        .head
        .engine
        .map(|e| format!("{e:?}").to_lowercase())
        .unwrap_or_else(|| "claude".to_string());

    let emit_input = EmitInput {
        workflow_id,
        source_path,
        engine_id: &engine_id,
        merged: &resolved.merged,
        pins: &pins,
        custom_jobs: &[],
        custom_steps_include_checkout: false,
    };

    let (lock, annotations) = match emit::build(&emit_input) {
        Ok(v) => v,
        Err(error) => {
            diagnostics.push(Diagnostic::from_error(&error, source_path));
            return (
                FileOutcome {
                    path: source_path.to_path_buf(),
                    state: CompileState::Failed {
                        stage: Stage::Emit,
                        error,
                    },
                },
                diagnostics,
            );
        }
    };

    let lock_path = lock_file_path(&options.config.output_dir, source_path, options.workspace_root);
    if let Err(error) = emit::write(&lock_path, &lock, &annotations, source_path, emit_input.engine_id) {
        diagnostics.push(Diagnostic::from_error(&error, source_path));
        return (
            FileOutcome {
                path: source_path.to_path_buf(),
                state: CompileState::Failed {
                    stage: Stage::Emit,
                    error,
                },
            },
            diagnostics,
        );
    }

    (
        FileOutcome {
            path: source_path.to_path_buf(),
            state: CompileState::Emitted { lock_path },
        },
        diagnostics,
    )
}

fn lock_file_path(output_dir: &Path, source_path: &Path, workspace_root: &Path) -> PathBuf {
    let relative = source_path.strip_prefix(workspace_root).unwrap_or(source_path);
    let stem = relative.file_stem().and_then(|s| s.to_str()).unwrap_or("workflow");
    workspace_root.join(output_dir).join(format!("{stem}.lock.yml"))
}

/// Scan every imported and main body section for bare `owner/repo@ref`
/// action references the lock-file emitter will need pinned. A minimal
/// textual scan, not a Markdown AST walk: the body is prose plus fenced
/// snippets, and action references always appear as a distinctive
/// `owner/repo@ref` token.
fn extract_action_references(sections: &[crate::imports::BodySection]) -> Vec<String> {
    let mut found = Vec::new();
    for section in sections {
        for token in section.content.split_whitespace() {
            let trimmed = token.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '/' && c != '@' && c != '-' && c != '_' && c != '.');
            if trimmed.matches('/').count() == 1 && trimmed.contains('@') {
                found.push(trimmed.to_string());
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_action_reference_tokens_from_body() {
        let sections = vec![crate::imports::BodySection {
            source: PathBuf::from("a.md"),
            content: "Use `actions/checkout@v4` to check out the repo.".to_string(),
        }];
        let found = extract_action_references(&sections);
        assert_eq!(found, vec!["actions/checkout@v4".to_string()]);
    }

    #[test]
    fn checkout_reference_is_synthesized_when_imports_require_it() {
        let mut head = aw_types::workflow::WorkflowHead::default();
        head.imports = vec!["shared/triage.md".to_string()];
        let mut refs = extract_action_references(&[]);
        if emit::requires_checkout(&head, false)
            && !refs.iter().any(|r| r.starts_with("actions/checkout@"))
        {
            refs.push(emit::CHECKOUT_ACTION_REF.to_string());
        }
        assert_eq!(refs, vec![emit::CHECKOUT_ACTION_REF.to_string()]);
    }

    #[test]
    fn checkout_reference_is_not_duplicated_when_body_already_names_it() {
        let mut head = aw_types::workflow::WorkflowHead::default();
        head.imports = vec!["shared/triage.md".to_string()];
        let sections = vec![crate::imports::BodySection {
            source: PathBuf::from("a.md"),
            content: "Use `actions/checkout@v5` explicitly.".to_string(),
        }];
        let mut refs = extract_action_references(&sections);
        if emit::requires_checkout(&head, false)
            && !refs.iter().any(|r| r.starts_with("actions/checkout@"))
        {
            refs.push(emit::CHECKOUT_ACTION_REF.to_string());
        }
        assert_eq!(refs, vec!["actions/checkout@v5".to_string()]);
    }

    #[test]
    fn lock_path_uses_file_stem_under_output_dir() {
        let path = lock_file_path(
            Path::new(".github/workflows"),
            Path::new("/repo/workflows/triage.md"),
            Path::new("/repo"),
        );
        assert!(path.ends_with(".github/workflows/triage.lock.yml"));
    }
}
