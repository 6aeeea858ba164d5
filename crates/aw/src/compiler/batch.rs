//! Parallel multi-file compilation: every file in a batch is
//! compiled independently and a failure in one never blocks its siblings.
//! The Action Pin Cache and Dependency Graph are shared across the batch
//! so concurrent compiles reuse the same in-memory pin entries instead of
//! racing separate HTTP lookups for the same action reference.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use aw_types::depgraph::DependencyGraph;
use aw_types::error::Diagnostic;
use aw_types::state::{BatchOutcome, FileOutcome};
use futures::stream::{self, StreamExt};

use super::{CompileOptions, compile_one};
use crate::packages::PackageIndex;
use crate::pins::{ActionPinCache, ResolverAdapter};

/// Compile every path in `sources` concurrently, bounded by
/// `options.config.max_concurrent`, sharing one pin cache and dependency
/// graph across the whole batch.
pub async fn compile_batch<A: ResolverAdapter + 'static>(
    sources: &[PathBuf],
    options: &CompileOptions<'_>,
    pin_cache: &Arc<ActionPinCache<A>>,
    package_index: &PackageIndex,
    graph: &Arc<Mutex<DependencyGraph>>,
) -> (BatchOutcome, Vec<Diagnostic>) {
    let max_concurrent = options.config.max_concurrent.max(1);

    let results: Vec<(FileOutcome, Vec<Diagnostic>)> = stream::iter(sources.iter())
        .map(|path: &PathBuf| compile_with_shared_state(path, options, pin_cache, package_index, graph))
        .buffer_unordered(max_concurrent)
        .collect()
        .await;

    let mut outcome = BatchOutcome::default();
    let mut all_diagnostics = Vec::new();
    for (file, diagnostics) in results {
        outcome.files.push(file);
        all_diagnostics.extend(diagnostics);
    }

    (outcome, all_diagnostics)
}

async fn compile_with_shared_state<A: ResolverAdapter>(
    path: &Path,
    options: &CompileOptions<'_>,
    pin_cache: &Arc<ActionPinCache<A>>,
    package_index: &PackageIndex,
    graph: &Arc<Mutex<DependencyGraph>>,
) -> (FileOutcome, Vec<Diagnostic>) {
    compile_one(path, options, pin_cache, package_index, Some(graph.as_ref())).await
}
