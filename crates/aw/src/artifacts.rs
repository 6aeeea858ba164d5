//! Artifact Flattener: given a directory of per-artifact
//! subdirectories, each holding exactly one convention-named file, moves
//! that file up to the parent and removes the emptied subdirectory.
//! Idempotent, and leaves any sibling directory with more than one file
//! untouched.

use std::path::Path;

use aw_types::artifact::{RunArtifactSet, conventional_names};
use aw_types::error::AwError;

#[derive(Debug, Clone, Default)]
pub struct FlattenReport {
    pub moved: Vec<String>,
    pub skipped_multi_file_dirs: Vec<String>,
}

pub fn flatten(root: &Path) -> Result<FlattenReport, AwError> {
    let mut report = FlattenReport::default();

    let entries = std::fs::read_dir(root).map_err(|e| AwError::Artifact {
        message: format!("failed to read artifact root {}: {e}", root.display()),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| AwError::Artifact {
            message: format!("failed to read directory entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let files: Vec<_> = std::fs::read_dir(&path)
            .map_err(|e| AwError::Artifact {
                message: format!("failed to read {}: {e}", path.display()),
            })?
            .filter_map(Result::ok)
            .filter(|e| e.path().is_file())
            .collect();

        if files.len() != 1 {
            report
                .skipped_multi_file_dirs
                .push(path.display().to_string());
            continue;
        }

        let file_path = files[0].path();
        let file_name = file_path.file_name().expect("file entry has a name");
        let dest = root.join(file_name);

        if dest.exists() {
            // Already flattened on a prior run; treat as done, not an
            // error, so the operation stays idempotent.
            continue;
        }

        std::fs::rename(&file_path, &dest).map_err(|e| AwError::Artifact {
            message: format!("failed to move {} to {}: {e}", file_path.display(), dest.display()),
        })?;
        std::fs::remove_dir(&path).map_err(|e| AwError::Artifact {
            message: format!("failed to remove emptied directory {}: {e}", path.display()),
        })?;

        report.moved.push(dest.display().to_string());
    }

    Ok(report)
}

/// Resolve every conventionally-named artifact directly under `root`
/// (already flattened) into a [`RunArtifactSet`], treating anything else
/// found there as an unnamed extra rather than an error.
pub fn collect(root: &Path) -> RunArtifactSet {
    let named = |name: &str| {
        let path = root.join(name);
        path.exists().then_some(path)
    };

    let mut other_files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(root) {
        let known = [
            conventional_names::AGENT_INFO,
            conventional_names::SAFE_OUTPUT,
            conventional_names::AGENT_PATCH,
            conventional_names::GATEWAY_LOG,
            conventional_names::FIREWALL_LOG,
            conventional_names::AGENT_STDIO,
            conventional_names::PROMPT,
        ];
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.file_name().and_then(|n| n.to_str()).is_some_and(|n| known.contains(&n)) {
                continue;
            }
            other_files.push(path);
        }
    }

    RunArtifactSet {
        agent_info: named(conventional_names::AGENT_INFO),
        agent_stdio: named(conventional_names::AGENT_STDIO),
        safe_output: named(conventional_names::SAFE_OUTPUT),
        agent_patch: named(conventional_names::AGENT_PATCH),
        gateway_log: named(conventional_names::GATEWAY_LOG),
        firewall_log: named(conventional_names::FIREWALL_LOG),
        other_files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_single_file_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("aw-info")).unwrap();
        std::fs::write(root.join("aw-info/aw_info.json"), "{}").unwrap();
        std::fs::create_dir_all(root.join("safe-output")).unwrap();
        std::fs::write(root.join("safe-output/safe_output.jsonl"), "").unwrap();

        let report = flatten(root).unwrap();
        assert_eq!(report.moved.len(), 2);
        assert!(root.join("aw_info.json").exists());
        assert!(root.join("safe_output.jsonl").exists());
        assert!(!root.join("aw-info").exists());
    }

    #[test]
    fn preserves_multi_file_siblings() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("logs")).unwrap();
        std::fs::write(root.join("logs/a.txt"), "a").unwrap();
        std::fs::write(root.join("logs/b.txt"), "b").unwrap();

        let report = flatten(root).unwrap();
        assert!(report.moved.is_empty());
        assert_eq!(report.skipped_multi_file_dirs.len(), 1);
        assert!(root.join("logs").exists());
    }

    #[test]
    fn flatten_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("prompt")).unwrap();
        std::fs::write(root.join("prompt/prompt.txt"), "hi").unwrap();

        flatten(root).unwrap();
        let second = flatten(root).unwrap();
        assert!(second.moved.is_empty());
        assert!(root.join("prompt.txt").exists());
    }

    #[test]
    fn collect_finds_conventional_names_and_leaves_the_rest_as_extras() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("aw_info.json"), "{}").unwrap();
        std::fs::write(root.join("agent_stdio.log"), "").unwrap();
        std::fs::write(root.join("debug_dump.txt"), "").unwrap();

        let artifacts = collect(root);
        assert!(artifacts.agent_info.is_some());
        assert!(artifacts.agent_stdio.is_some());
        assert!(artifacts.safe_output.is_none());
        assert_eq!(artifacts.other_files.len(), 1);
    }
}
