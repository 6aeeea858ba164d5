//! Dependency Graph and import-resolution state machine types.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::workflow::WorkflowId;

/// `pending -> visiting -> done`. Revisiting `visiting` closes a
/// cycle (logged, not an error); revisiting `done` reuses the cached
/// result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Pending,
    Visiting,
    Done,
}

/// Bipartite map from source files (main WS files and partials they
/// import) to the set of workflows whose emission consumes them. Built
/// incrementally as files are compiled; never produces false negatives.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// file -> workflows that transitively import it (or are it).
    consumers: BTreeMap<PathBuf, BTreeSet<WorkflowId>>,
    /// workflow -> files it transitively depends on, kept so a
    /// recompile/removal can subtract the old edge set before adding the
    /// new one.
    dependencies: BTreeMap<WorkflowId, BTreeSet<PathBuf>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `workflow` depends on exactly `files` (its main source
    /// plus every file transitively imported). Replaces any prior edge set
    /// recorded for this workflow — the graph is rebuilt per-workflow on
    /// every recompile, never merged.
    pub fn record(&mut self, workflow: WorkflowId, files: BTreeSet<PathBuf>) {
        if let Some(old_files) = self.dependencies.remove(&workflow) {
            for old_file in old_files {
                if let Some(consumers) = self.consumers.get_mut(&old_file) {
                    consumers.remove(&workflow);
                    if consumers.is_empty() {
                        self.consumers.remove(&old_file);
                    }
                }
            }
        }

        for file in &files {
            self.consumers
                .entry(file.clone())
                .or_default()
                .insert(workflow.clone());
        }
        self.dependencies.insert(workflow, files);
    }

    /// Remove a workflow from the graph entirely (its source file was
    /// deleted).
    pub fn remove(&mut self, workflow: &WorkflowId) {
        if let Some(old_files) = self.dependencies.remove(workflow) {
            for old_file in old_files {
                if let Some(consumers) = self.consumers.get_mut(&old_file) {
                    consumers.remove(workflow);
                    if consumers.is_empty() {
                        self.consumers.remove(&old_file);
                    }
                }
            }
        }
    }

    /// Every workflow that must be recompiled because `file` changed,
    /// including `file` itself if it is a main WS.
    pub fn affected_by(&self, file: &PathBuf) -> BTreeSet<WorkflowId> {
        self.consumers.get(file).cloned().unwrap_or_default()
    }

    pub fn dependencies_of(&self, workflow: &WorkflowId) -> BTreeSet<PathBuf> {
        self.dependencies.get(workflow).cloned().unwrap_or_default()
    }

    pub fn workflow_count(&self) -> usize {
        self.dependencies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wf(name: &str) -> WorkflowId {
        WorkflowId(name.to_string())
    }

    #[test]
    fn affected_by_includes_transitive_importers() {
        let mut g = DependencyGraph::new();
        let shared = PathBuf::from("shared/partial.md");
        let main = PathBuf::from("triage.md");

        g.record(
            wf("triage"),
            BTreeSet::from([main.clone(), shared.clone()]),
        );

        let affected = g.affected_by(&shared);
        assert_eq!(affected.len(), 1);
        assert!(affected.contains(&wf("triage")));
    }

    #[test]
    fn recompile_replaces_old_edges_not_merges() {
        let mut g = DependencyGraph::new();
        let a = PathBuf::from("a.md");
        let b = PathBuf::from("b.md");
        let main = PathBuf::from("main.md");

        g.record(wf("main"), BTreeSet::from([main.clone(), a.clone()]));
        g.record(wf("main"), BTreeSet::from([main.clone(), b.clone()]));

        assert!(g.affected_by(&a).is_empty());
        assert!(g.affected_by(&b).contains(&wf("main")));
    }

    #[test]
    fn removal_drops_all_edges() {
        let mut g = DependencyGraph::new();
        let main = PathBuf::from("main.md");
        g.record(wf("main"), BTreeSet::from([main.clone()]));
        g.remove(&wf("main"));
        assert!(g.affected_by(&main).is_empty());
        assert_eq!(g.workflow_count(), 0);
    }
}
