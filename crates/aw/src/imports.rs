//! Import Resolver: transitively loads imported Workflow Source
//! files and shared partials, detects cycles, and merges front-matter
//! according to the precedence rules documented on `merge_head`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use aw_types::depgraph::ImportState;
use aw_types::error::{AwError, Location};
use aw_types::workflow::{MergedFrontMatter, WorkflowHead, MAIN_ONLY_KEYS};

use crate::front_matter::{self, ParsedSource};
use crate::packages::PackageIndex;

/// A single imported body, in source order, so the emitter can concatenate
/// root body + imported bodies deterministically.
#[derive(Debug, Clone)]
pub struct BodySection {
    pub source: PathBuf,
    pub content: String,
}

/// The output of resolving one main WS: merged front-matter plus the
/// ordered body sections and the full file set (for the Dependency
/// Graph).
#[derive(Debug, Clone)]
pub struct ResolvedWorkflow {
    pub merged: MergedFrontMatter,
    pub body_sections: Vec<BodySection>,
    pub files: BTreeSet<PathBuf>,
    /// Non-fatal notes accumulated during resolution: skipped optional
    /// imports, cycles closed.
    pub notes: Vec<String>,
}

/// An import reference as written in a WS's `imports` list.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportSpec {
    /// Relative path, or `owner/repo/path` for a qualified external spec.
    path: String,
    qualified_repo: Option<String>,
    qualified_ref: Option<String>,
    section: Option<String>,
    optional: bool,
}

fn parse_import_spec(raw: &str) -> ImportSpec {
    let mut s = raw.trim();
    let optional = s.ends_with('?');
    if optional {
        s = &s[..s.len() - 1];
    }

    let (path_part, section) = match s.split_once('#') {
        Some((p, sec)) => (p, Some(sec.to_string())),
        None => (s, None),
    };

    // A qualified external spec looks like `owner/repo/path@ref`: it has
    // at least two `/` before the `@`, which a plain relative path
    // (`shared/triage.md`) does not combine with an `@ref` suffix.
    if let Some((repo_and_path, reference)) = path_part.rsplit_once('@') {
        let segments: Vec<&str> = repo_and_path.splitn(3, '/').collect();
        if segments.len() == 3 {
            let repo = format!("{}/{}", segments[0], segments[1]);
            return ImportSpec {
                path: segments[2].to_string(),
                qualified_repo: Some(repo),
                qualified_ref: Some(reference.to_string()),
                section,
                optional,
            };
        }
    }

    ImportSpec {
        path: path_part.to_string(),
        qualified_repo: None,
        qualified_ref: None,
        section,
        optional,
    }
}

pub struct ImportResolver<'a> {
    workspace_root: &'a Path,
    packages: &'a PackageIndex,
    states: BTreeMap<PathBuf, ImportState>,
    visited_heads: BTreeMap<PathBuf, WorkflowHead>,
}

impl<'a> ImportResolver<'a> {
    pub fn new(workspace_root: &'a Path, packages: &'a PackageIndex) -> Self {
        Self {
            workspace_root,
            packages,
            states: BTreeMap::new(),
            visited_heads: BTreeMap::new(),
        }
    }

    /// Resolve `main_path` (relative to the workspace root) into its merged
    /// front-matter and ordered body sections.
    pub fn resolve(&mut self, main_path: &Path) -> Result<ResolvedWorkflow, AwError> {
        let canonical_main = self.canonicalize(main_path);
        let mut files = BTreeSet::new();
        let mut notes = Vec::new();
        let mut body_sections = Vec::new();
        let mut merged_head = WorkflowHead::default();

        self.walk(
            &canonical_main,
            true,
            None,
            &mut files,
            &mut notes,
            &mut body_sections,
            &mut merged_head,
        )?;

        Ok(ResolvedWorkflow {
            merged: MergedFrontMatter {
                head: merged_head,
                contributors: files.iter().cloned().collect(),
            },
            body_sections,
            files,
            notes,
        })
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    /// `section` is the `#Section` selector the *importing* file's
    /// `imports:` entry named for `path`, if any; `None` for the main file
    /// and for imports written without a `#Section` suffix, in which case
    /// the whole body is spliced in.
    #[allow(clippy::too_many_arguments)]
    fn walk(
        &mut self,
        path: &Path,
        is_main: bool,
        section: Option<&str>,
        files: &mut BTreeSet<PathBuf>,
        notes: &mut Vec<String>,
        body_sections: &mut Vec<BodySection>,
        merged_head: &mut WorkflowHead,
    ) -> Result<(), AwError> {
        match self.states.get(path) {
            Some(ImportState::Visiting) => {
                notes.push(format!("import cycle detected at {}", path.display()));
                return Ok(());
            }
            Some(ImportState::Done) => {
                // Already merged on an earlier branch of the import DAG;
                // re-merging would double-count list unions, so skip.
                return Ok(());
            }
            _ => {}
        }

        self.states.insert(path.to_path_buf(), ImportState::Visiting);

        let parsed = self.read_and_parse(path)?;

        if !is_main {
            reject_main_only_overrides(path, &parsed.head)?;
        }

        merge_head(merged_head, &parsed.head, is_main);
        files.insert(path.to_path_buf());

        let parent_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        for raw in &parsed.head.imports {
            let spec = parse_import_spec(raw);
            let resolved_path = self.resolve_import_path(&spec, &parent_dir)?;

            let Some(resolved_path) = resolved_path else {
                notes.push(format!("optional import `{raw}` not found, skipped"));
                continue;
            };

            self.walk(
                &resolved_path,
                false,
                spec.section.as_deref(),
                files,
                notes,
                body_sections,
                merged_head,
            )?;
        }

        let raw_body = extract_body_content(&parsed, section, path)?;
        let spliced_body = splice_includes(&raw_body, path)?;
        body_sections.push(BodySection {
            source: path.to_path_buf(),
            content: spliced_body,
        });

        self.states.insert(path.to_path_buf(), ImportState::Done);
        self.visited_heads.insert(path.to_path_buf(), parsed.head);
        Ok(())
    }

    fn resolve_import_path(
        &self,
        spec: &ImportSpec,
        parent_dir: &Path,
    ) -> Result<Option<PathBuf>, AwError> {
        if let Some(repo) = &spec.qualified_repo {
            let reference = spec.qualified_ref.as_deref().unwrap_or("main");
            return match self.packages.resolve(repo, reference, &spec.path) {
                Some(p) => Ok(Some(p)),
                None if spec.optional => Ok(None),
                None => Err(AwError::Resolve {
                    location: Location::file(parent_dir),
                    message: format!(
                        "external import `{repo}/{}@{reference}` is not in the installed-packages index",
                        spec.path
                    ),
                }),
            };
        }

        let candidate = parent_dir.join(&spec.path);
        if candidate.exists() {
            Ok(Some(candidate))
        } else if spec.optional {
            Ok(None)
        } else {
            Err(AwError::Resolve {
                location: Location::file(parent_dir),
                message: format!("import `{}` was not found", spec.path.clone()),
            })
        }
    }

    fn read_and_parse(&self, path: &Path) -> Result<ParsedSource, AwError> {
        let text = std::fs::read_to_string(path).map_err(|e| AwError::Resolve {
            location: Location::file(path),
            message: format!("failed to read import: {e}"),
        })?;
        front_matter::parse(path, &text)
    }
}

fn reject_main_only_overrides(path: &Path, head: &WorkflowHead) -> Result<(), AwError> {
    let mut offenders: Vec<&'static str> = Vec::new();
    if !is_default_triggers(&head.on) {
        offenders.push("on");
    }
    if !head.permissions.0.is_empty() {
        offenders.push("permissions");
    }
    if head.concurrency.is_some() {
        offenders.push("concurrency");
    }
    if head.engine.is_some() {
        offenders.push("engine");
    }
    if head.strict {
        offenders.push("strict");
    }
    if !head.roles.is_empty() {
        offenders.push("roles");
    }
    if head.github_token.is_some() {
        offenders.push("github-token");
    }

    if let Some(key) = offenders.into_iter().find(|k| MAIN_ONLY_KEYS.contains(k)) {
        return Err(AwError::Resolve {
            location: Location::file(path),
            message: format!("imported file sets main-only key `{key}`"),
        });
    }
    Ok(())
}

fn is_default_triggers(t: &aw_types::workflow::Triggers) -> bool {
    t.issues.is_none()
        && t.issue_comment.is_none()
        && t.pull_request.is_none()
        && t.pull_request_review_comment.is_none()
        && t.schedule.is_none()
        && t.workflow_dispatch.is_none()
        && t.workflow_run.is_none()
        && t.command.is_none()
}

/// Merge `imported` into `accumulated`. Main-only fields are seeded from
/// the main file alone (see `reject_main_only_overrides`); tool/safe-output
/// maps are unioned by key (main wins on collision);
/// domain lists are set-unioned; everything else deep-merges with the
/// main file's scalars winning.
fn merge_head(accumulated: &mut WorkflowHead, imported: &WorkflowHead, is_main: bool) {
    if is_main {
        // The main file seeds every field, including main-only ones.
        accumulated.on = imported.on.clone();
        accumulated.permissions = imported.permissions.clone();
        accumulated.engine = imported.engine;
        accumulated.strict = imported.strict;
        accumulated.roles = imported.roles.clone();
        accumulated.concurrency = imported.concurrency.clone();
        accumulated.github_token = imported.github_token.clone();
        accumulated.sandbox_agent = imported.sandbox_agent;
    }

    for d in &imported.network.allowed {
        if !accumulated.network.allowed.contains(d) {
            accumulated.network.allowed.push(d.clone());
        }
    }

    for (key, value) in &imported.tools {
        accumulated.tools.entry(key.clone()).or_insert_with(|| value.clone());
    }

    for (key, value) in &imported.safe_outputs {
        accumulated
            .safe_outputs
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    for (key, value) in &imported.env {
        accumulated.env.entry(key.clone()).or_insert_with(|| value.clone());
    }

    for cm in &imported.cache_memory {
        if !accumulated.cache_memory.iter().any(|e| e.id == cm.id) {
            accumulated.cache_memory.push(cm.clone());
        }
    }
}

/// Extract a named `## Section` from a body, or the whole body when
/// `section` is `None`. `section` is the `#Section` selector on the
/// `imports:` entry that referenced `path`, if any.
fn extract_body_content(
    parsed: &ParsedSource,
    section: Option<&str>,
    path: &Path,
) -> Result<String, AwError> {
    match section {
        None => Ok(parsed.body.clone()),
        Some(name) => extract_section(&parsed.body, name).ok_or_else(|| AwError::Resolve {
            location: Location::file(path),
            message: format!("import references unknown section `{name}` in `{}`", path.display()),
        }),
    }
}

/// Scan `content` for `@include file#Section` directives (one per line)
/// and splice the named section of `file` (resolved relative to
/// `current_file`'s directory) in place of the directive line. `@include
/// file` with no `#Section` splices the referenced file's whole body.
/// Unknown sections are a hard error, matching `@import`'s strictness —
/// unlike the optional-`?` `imports:` list, `@include` has no escape hatch.
fn splice_includes(content: &str, current_file: &Path) -> Result<String, AwError> {
    let parent_dir = current_file.parent().unwrap_or(Path::new("."));
    let mut out = String::with_capacity(content.len());

    for line in content.lines() {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix("@include ") else {
            out.push_str(line);
            out.push('\n');
            continue;
        };

        let rest = rest.trim();
        let (path_part, section) = match rest.split_once('#') {
            Some((p, s)) => (p, Some(s.to_string())),
            None => (rest, None),
        };

        let target = parent_dir.join(path_part);
        let text = std::fs::read_to_string(&target).map_err(|e| AwError::Resolve {
            location: Location::file(current_file),
            message: format!("@include target `{path_part}` could not be read: {e}"),
        })?;
        let included = front_matter::parse(&target, &text)?;

        let spliced = match &section {
            Some(name) => extract_section(&included.body, name).ok_or_else(|| AwError::Resolve {
                location: Location::file(current_file),
                message: format!("@include references unknown section `{name}` in `{path_part}`"),
            })?,
            None => included.body.clone(),
        };

        out.push_str(spliced.trim_end());
        out.push('\n');
    }

    Ok(out)
}

/// Splice a named section (an ATX heading whose text matches `name`) out of
/// `body`, stopping at the next heading of the same or shallower level.
pub fn extract_section(body: &str, name: &str) -> Option<String> {
    let lines: Vec<&str> = body.lines().collect();
    let mut start = None;
    let mut level = 0usize;

    for (i, line) in lines.iter().enumerate() {
        if let Some((hlevel, title)) = heading(line) {
            if title.trim() == name.trim() {
                start = Some(i + 1);
                level = hlevel;
                break;
            }
        }
    }

    let start = start?;
    let mut end = lines.len();
    for (i, line) in lines.iter().enumerate().skip(start) {
        if let Some((hlevel, _)) = heading(line) {
            if hlevel <= level {
                end = i;
                break;
            }
        }
    }

    Some(lines[start..end].join("\n") + "\n")
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((hashes, rest.trim_start()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_relative_import() {
        let spec = parse_import_spec("shared/triage.md");
        assert_eq!(spec.path, "shared/triage.md");
        assert!(spec.qualified_repo.is_none());
        assert!(!spec.optional);
    }

    #[test]
    fn parses_optional_flag() {
        let spec = parse_import_spec("shared/triage.md?");
        assert!(spec.optional);
        assert_eq!(spec.path, "shared/triage.md");
    }

    #[test]
    fn parses_section_selector() {
        let spec = parse_import_spec("shared/triage.md#Instructions");
        assert_eq!(spec.path, "shared/triage.md");
        assert_eq!(spec.section.as_deref(), Some("Instructions"));
    }

    #[test]
    fn parses_qualified_external_spec() {
        let spec = parse_import_spec("acme/workflows/shared/triage.md@v1");
        assert_eq!(spec.qualified_repo.as_deref(), Some("acme/workflows"));
        assert_eq!(spec.path, "shared/triage.md");
        assert_eq!(spec.qualified_ref.as_deref(), Some("v1"));
    }

    #[test]
    fn extract_section_stops_at_same_level_heading() {
        let body = "# Title\n\n## A\ncontent a\n\n## B\ncontent b\n";
        let section = extract_section(body, "A").unwrap();
        assert_eq!(section.trim(), "content a");
    }

    #[test]
    fn extract_section_missing_returns_none() {
        assert!(extract_section("# Title\nbody\n", "Nope").is_none());
    }

    #[test]
    fn splice_includes_inlines_a_named_section() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("shared.md"),
            "---\n{}\n---\n# Shared\n\n## Instructions\nBe polite.\n\n## Other\nignored\n",
        )
        .unwrap();

        let content = "Before.\n@include shared.md#Instructions\nAfter.\n";
        let spliced = splice_includes(content, &tmp.path().join("main.md")).unwrap();
        assert!(spliced.contains("Before."));
        assert!(spliced.contains("Be polite."));
        assert!(!spliced.contains("ignored"));
        assert!(spliced.contains("After."));
    }

    #[test]
    fn splice_includes_whole_body_without_section_selector() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("shared.md"), "---\n{}\n---\nShared body text.\n").unwrap();

        let content = "@include shared.md\n";
        let spliced = splice_includes(content, &tmp.path().join("main.md")).unwrap();
        assert!(spliced.contains("Shared body text."));
    }

    #[test]
    fn imports_entry_section_selector_splices_only_that_section() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("shared.md"),
            "---\n{}\n---\n## Instructions\nBe polite.\n\n## Other\nignored\n",
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("main.md"),
            "---\nimports:\n  - shared.md#Instructions\n---\nMain body.\n",
        )
        .unwrap();

        let packages = PackageIndex::new();
        let mut resolver = ImportResolver::new(tmp.path(), &packages);
        let resolved = resolver.resolve(Path::new("main.md")).unwrap();

        let combined: String = resolved
            .body_sections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(combined.contains("Be polite."));
        assert!(!combined.contains("ignored"));
    }

    #[test]
    fn splice_includes_fails_on_unknown_section() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("shared.md"), "---\n{}\n---\n## A\ncontent\n").unwrap();

        let content = "@include shared.md#Missing\n";
        assert!(splice_includes(content, &tmp.path().join("main.md")).is_err());
    }
}
