//! Installed-packages index: resolves qualified imports
//! (`owner/repo/path@ref`) against a local cache of previously-fetched
//! shared workflow packages, the way a lockfile-driven dependency manager
//! resolves a qualified crate path against its local registry checkout.
//!
//! The index is home-scoped (`~/.aw-compiler/packages`, overridable via
//! `AW_HOME_PACKAGES_DIR`) with an optional repo-scoped override
//! (`<workspace>/.aw-compiler/packages`, overridable via
//! `AW_REPO_PACKAGES_DIR`), the repo-scoped copy winning on conflict so a
//! repository can pin its own snapshot of a shared package without
//! touching the user's global cache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const AW_HOME_PACKAGES_DIR_VAR: &str = "AW_HOME_PACKAGES_DIR";
pub const AW_REPO_PACKAGES_DIR_VAR: &str = "AW_REPO_PACKAGES_DIR";

/// One installed package: the directory holding its files, plus the sha of
/// the commit it was fetched at, read from its `.metadata` sidecar.
#[derive(Debug, Clone)]
struct InstalledPackage {
    root: PathBuf,
    #[allow(dead_code)]
    sha: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    packages: BTreeMap<(String, String), InstalledPackage>,
}

impl PackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from the two conventional search roots. Missing
    /// directories are simply skipped, not an error — a workspace with no
    /// external imports has no package directories at all.
    pub fn load(workspace_root: &Path, home_dir: Option<&Path>) -> Self {
        let mut index = Self::new();
        if let Some(home) = home_dir {
            index.scan(&home.join(".aw-compiler").join("packages"));
        }
        index.scan(&workspace_root.join(".aw-compiler").join("packages"));
        index
    }

    /// Build an index the way the CLI/MCP shells do at process start:
    /// honoring `AW_HOME_PACKAGES_DIR`/`AW_REPO_PACKAGES_DIR` when set,
    /// falling back to the conventional home/workspace locations otherwise.
    pub fn load_from_env(workspace_root: &Path, home_dir: Option<&Path>) -> Self {
        let mut index = Self::new();
        let home_override = std::env::var(AW_HOME_PACKAGES_DIR_VAR).ok();
        match home_override {
            Some(dir) => index.scan(Path::new(&dir)),
            None => {
                if let Some(home) = home_dir {
                    index.scan(&home.join(".aw-compiler").join("packages"));
                }
            }
        }

        let repo_override = std::env::var(AW_REPO_PACKAGES_DIR_VAR).ok();
        match repo_override {
            Some(dir) => index.scan(Path::new(&dir)),
            None => index.scan(&workspace_root.join(".aw-compiler").join("packages")),
        }
        index
    }

    /// Scan `dir` for `owner/repo/<ref>/` package snapshots, each holding an
    /// optional `.metadata` file with the resolved sha on its first line.
    fn scan(&mut self, dir: &Path) {
        let Ok(owners) = std::fs::read_dir(dir) else {
            return;
        };
        for owner_entry in owners.flatten() {
            let owner_path = owner_entry.path();
            if !owner_path.is_dir() {
                continue;
            }
            let Some(owner) = owner_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(repos) = std::fs::read_dir(&owner_path) else {
                continue;
            };
            for repo_entry in repos.flatten() {
                let repo_path = repo_entry.path();
                if !repo_path.is_dir() {
                    continue;
                }
                let Some(repo) = repo_path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let sha = std::fs::read_to_string(repo_path.join(".metadata"))
                    .ok()
                    .and_then(|s| s.lines().next().map(str::to_string));
                self.packages.insert(
                    (owner.to_string(), repo.to_string()),
                    InstalledPackage {
                        root: repo_path,
                        sha,
                    },
                );
            }
        }
    }

    /// Resolve `repo` (an `owner/repo` pair) plus a sub-`path` to a file on
    /// disk, or `None` if the package isn't installed. `reference` is
    /// accepted for API symmetry with the resolver adapter but the index is
    /// keyed on owner/repo only — one snapshot per package at a time.
    pub fn resolve(&self, repo: &str, _reference: &str, path: &str) -> Option<PathBuf> {
        let (owner, name) = repo.split_once('/')?;
        let package = self.packages.get(&(owner.to_string(), name.to_string()))?;
        let candidate = package.root.join(path);
        candidate.exists().then_some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolves_installed_package_file() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg_dir = tmp.path().join(".aw-compiler/packages/acme/workflows");
        std::fs::create_dir_all(pkg_dir.join("shared")).unwrap();
        std::fs::write(pkg_dir.join("shared/triage.md"), "content").unwrap();
        let mut meta = std::fs::File::create(pkg_dir.join(".metadata")).unwrap();
        writeln!(meta, "{}", "a".repeat(40)).unwrap();

        let index = PackageIndex::load(tmp.path(), None);
        let resolved = index.resolve("acme/workflows", "main", "shared/triage.md");
        assert!(resolved.is_some());
    }

    #[test]
    fn missing_package_resolves_to_none() {
        let tmp = tempfile::tempdir().unwrap();
        let index = PackageIndex::load(tmp.path(), None);
        assert!(index.resolve("nope/nope", "main", "x.md").is_none());
    }
}
