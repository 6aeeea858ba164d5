//! Per-file compilation state machine: `unread -> parsed ->
//! resolved -> validated -> emitted | failed(stage, reason)`.

use std::path::PathBuf;

use crate::error::AwError;

#[derive(Debug)]
pub enum CompileState {
    Unread,
    Parsed,
    Resolved,
    Validated,
    Emitted { lock_path: PathBuf },
    Failed { stage: Stage, error: AwError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Resolve,
    Validate,
    Emit,
}

impl CompileState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CompileState::Emitted { .. } | CompileState::Failed { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CompileState::Failed { .. })
    }
}

/// Outcome of compiling one file, independent of the others in a batch —
/// a failed file does not block its siblings.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub state: CompileState,
}

/// Outcome of compiling a whole batch: per-file results plus the worst
/// exit code across all of them.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub files: Vec<FileOutcome>,
}

impl BatchOutcome {
    pub fn succeeded_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.state, CompileState::Emitted { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.files.iter().filter(|f| f.state.is_failure()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Location;

    #[test]
    fn batch_counts_successes_and_failures_independently() {
        let mut batch = BatchOutcome::default();
        batch.files.push(FileOutcome {
            path: "a.md".into(),
            state: CompileState::Emitted {
                lock_path: "a.lock.yml".into(),
            },
        });
        batch.files.push(FileOutcome {
            path: "b.md".into(),
            state: CompileState::Failed {
                stage: Stage::Validate,
                error: AwError::Validation {
                    location: Location::file("b.md"),
                    message: "bad permission".into(),
                },
            },
        });

        assert_eq!(batch.succeeded_count(), 1);
        assert_eq!(batch.failed_count(), 1);
    }
}
