//! Compiler configuration (ambient): environment variables and an
//! optional `.aw-compiler.toml` file, resolved with a fixed 3-tier
//! precedence — explicit CLI/API options win over the config file, which
//! wins over built-in defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub strict: bool,
    pub allow_fallback_pins: bool,
    pub output_dir: PathBuf,
    pub home_packages_dir: PathBuf,
    pub repo_packages_dir: PathBuf,
    pub max_concurrent: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            strict: false,
            allow_fallback_pins: true,
            output_dir: PathBuf::from(".github/workflows"),
            home_packages_dir: PathBuf::from("~/.aw-compiler/packages"),
            repo_packages_dir: PathBuf::from(".aw-compiler/packages"),
            max_concurrent: num_cpus::get().max(1),
        }
    }
}

/// The subset of [`CompilerConfig`] an `.aw-compiler.toml` file may
/// override; every field is optional so a file can set just one knob.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    strict: Option<bool>,
    allow_fallback_pins: Option<bool>,
    output_dir: Option<PathBuf>,
    home_packages_dir: Option<PathBuf>,
    repo_packages_dir: Option<PathBuf>,
    max_concurrent: Option<usize>,
}

/// Explicit overrides a caller supplies directly (CLI flags, an
/// embedder's API call) — the highest-precedence tier.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub strict: Option<bool>,
    pub allow_fallback_pins: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub max_concurrent: Option<usize>,
}

pub const CONFIG_FILE_NAME: &str = ".aw-compiler.toml";

/// Resolve the effective configuration for `workspace_root`: defaults,
/// overridden by the config file (if present), overridden by `overrides`.
pub fn load(workspace_root: &Path, overrides: &ConfigOverrides) -> CompilerConfig {
    let mut config = CompilerConfig::default();

    if let Some(file) = read_config_file(workspace_root) {
        if let Some(v) = file.strict {
            config.strict = v;
        }
        if let Some(v) = file.allow_fallback_pins {
            config.allow_fallback_pins = v;
        }
        if let Some(v) = file.output_dir {
            config.output_dir = v;
        }
        if let Some(v) = file.home_packages_dir {
            config.home_packages_dir = v;
        }
        if let Some(v) = file.repo_packages_dir {
            config.repo_packages_dir = v;
        }
        if let Some(v) = file.max_concurrent {
            config.max_concurrent = v;
        }
    }

    if let Some(v) = overrides.strict {
        config.strict = v;
    }
    if let Some(v) = overrides.allow_fallback_pins {
        config.allow_fallback_pins = v;
    }
    if let Some(v) = overrides.output_dir.clone() {
        config.output_dir = v;
    }
    if let Some(v) = overrides.max_concurrent {
        config.max_concurrent = v;
    }

    config
}

fn read_config_file(workspace_root: &Path) -> Option<ConfigFile> {
    let path = workspace_root.join(CONFIG_FILE_NAME);
    let text = std::fs::read_to_string(path).ok()?;
    toml::from_str(&text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_non_strict() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load(tmp.path(), &ConfigOverrides::default());
        assert!(!config.strict);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "strict = true\nmax_concurrent = 2\n").unwrap();
        let config = load(tmp.path(), &ConfigOverrides::default());
        assert!(config.strict);
        assert_eq!(config.max_concurrent, 2);
    }

    #[test]
    fn explicit_overrides_win_over_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "strict = true\n").unwrap();
        let overrides = ConfigOverrides {
            strict: Some(false),
            ..Default::default()
        };
        let config = load(tmp.path(), &overrides);
        assert!(!config.strict);
    }
}
