//! Watch mode: a single reader loop that debounces
//! filesystem events into recompile batches, the dependency graph telling
//! it exactly which workflows a changed file affects.
//!
//! The loop owns the [`DependencyGraph`] outright — nothing outside the
//! loop mutates it — and never produces a false negative: a changed file
//! always recompiles at least every workflow it was last known to affect,
//! even if that set has since gone stale.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aw_types::depgraph::DependencyGraph;
use aw_types::error::Diagnostic;
use aw_types::workflow::WorkflowId;
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};

use super::{CompileOptions, compile_one};
use crate::packages::PackageIndex;
use crate::pins::{ActionPinCache, ResolverAdapter};

const DEBOUNCE: Duration = Duration::from_millis(300);

/// Watch `workspace_root` for `.md` changes under it, recompiling every
/// affected workflow on each debounced batch of events. Runs until the
/// debouncer's channel closes (the watcher is dropped) or `should_stop`
/// returns `true`; callers that want a bounded run pass a closure that
/// flips after one iteration, tests included.
pub async fn watch<A: ResolverAdapter + 'static>(
    workspace_root: &Path,
    options: &CompileOptions<'_>,
    pin_cache: &Arc<ActionPinCache<A>>,
    package_index: &PackageIndex,
    graph: &Arc<Mutex<DependencyGraph>>,
    mut on_batch: impl FnMut(&[PathBuf], &[Diagnostic]),
    mut should_stop: impl FnMut() -> bool,
) -> Result<(), notify::Error> {
    let (tx, rx) = channel();
    let mut debouncer = new_debouncer(DEBOUNCE, tx)?;
    debouncer
        .watcher()
        .watch(workspace_root, RecursiveMode::Recursive)?;

    // Maps a workflow's stable id back to the source path it was last
    // compiled from, so `affected_by` (which only knows ids) can still
    // drive a recompile by path. Populated as files are seen, never
    // pruned eagerly — a stale entry just means one extra recompile of a
    // path that no longer exists, which `compile_one` already handles as
    // a read failure.
    let mut known_paths: BTreeMap<WorkflowId, PathBuf> = BTreeMap::new();

    loop {
        if should_stop() {
            return Ok(());
        }
        let Ok(result) = rx.recv_timeout(Duration::from_millis(500)) else {
            continue;
        };
        let events = match result {
            Ok(events) => events,
            Err(errors) => {
                for error in errors {
                    tracing::warn!("watch: filesystem event error: {error}");
                }
                continue;
            }
        };

        let changed: Vec<PathBuf> = events
            .into_iter()
            .map(|e| e.path)
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
            .collect();
        if changed.is_empty() {
            continue;
        }

        let mut to_recompile: BTreeSet<PathBuf> = BTreeSet::new();
        {
            let mut g = graph.lock().unwrap();
            for path in &changed {
                let workflow_id = WorkflowId::from_relative_path(
                    path.strip_prefix(workspace_root).unwrap_or(path),
                );
                if !path.exists() {
                    g.remove(&workflow_id);
                    known_paths.remove(&workflow_id);
                    remove_lock_file(&options.config.output_dir, path, workspace_root);
                    continue;
                }
                for affected in g.affected_by(path) {
                    if let Some(affected_path) = known_paths.get(&affected) {
                        to_recompile.insert(affected_path.clone());
                    }
                }
                // A file with no known consumers yet (new main workflow,
                // or first-ever edit) still recompiles itself.
                to_recompile.insert(path.clone());
            }
        }

        let mut batch_diagnostics = Vec::new();
        let mut recompiled = Vec::new();
        for path in &to_recompile {
            let workflow_id = WorkflowId::from_relative_path(
                path.strip_prefix(workspace_root).unwrap_or(path),
            );
            known_paths.insert(workflow_id, path.clone());
            let (_, diagnostics) = compile_one(path, options, pin_cache, package_index, Some(graph)).await;
            batch_diagnostics.extend(diagnostics);
            recompiled.push(path.clone());
        }

        on_batch(&recompiled, &batch_diagnostics);
    }
}

fn remove_lock_file(output_dir: &Path, source_path: &Path, workspace_root: &Path) {
    let relative = source_path.strip_prefix(workspace_root).unwrap_or(source_path);
    let Some(stem) = relative.file_stem().and_then(|s| s.to_str()) else {
        return;
    };
    let lock_path = workspace_root.join(output_dir).join(format!("{stem}.lock.yml"));
    let _ = std::fs::remove_file(lock_path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounced_event_filters_to_markdown_only() {
        let events = [
            PathBuf::from("workflow.md"),
            PathBuf::from("notes.txt"),
        ];
        let markdown: Vec<&PathBuf> = events
            .iter()
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
            .collect();
        assert_eq!(markdown, vec![&PathBuf::from("workflow.md")]);
    }

    #[test]
    fn remove_lock_file_targets_the_stem_under_output_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let output_dir = Path::new(".github/workflows");
        std::fs::create_dir_all(tmp.path().join(output_dir)).unwrap();
        let lock_path = tmp.path().join(output_dir).join("triage.lock.yml");
        std::fs::write(&lock_path, "jobs: {}\n").unwrap();

        remove_lock_file(output_dir, &tmp.path().join("triage.md"), tmp.path());
        assert!(!lock_path.exists());
    }
}
