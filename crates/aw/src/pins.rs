//! Action Pin Cache: resolves `owner/repo@tag` action references to
//! 40-hex commit shas, caching results on disk so repeated compiles don't
//! re-hit the hosting platform's API for actions that were already pinned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use aw_retry::{BackoffPolicy, Classify, ErrorClass, RetryOutcome, retry_with_backoff};
use aw_types::pin::{ActionPin, ActionRef, PinSource};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Adapts the Action Pin Cache to whatever hosting platform exposes tag/sha
/// lookups. A trait so tests can stub it out without a live network call.
pub trait ResolverAdapter: Send + Sync {
    fn resolve_sha(&self, repo: &str, version: &str) -> Result<ResolvedRef, ResolveFailure>;
}

#[derive(Debug, Clone)]
pub struct ResolvedRef {
    pub sha: String,
    pub resolved_version: String,
}

#[derive(Debug, Clone)]
pub enum ResolveFailure {
    NotFound,
    RateLimited,
    Transport(String),
}

impl Classify for ResolveFailure {
    fn classify(&self) -> ErrorClass {
        match self {
            ResolveFailure::NotFound => ErrorClass::Permanent,
            ResolveFailure::RateLimited | ResolveFailure::Transport(_) => ErrorClass::Transient,
        }
    }
}

impl std::fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveFailure::NotFound => write!(f, "reference not found"),
            ResolveFailure::RateLimited => write!(f, "rate limited"),
            ResolveFailure::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

/// Default adapter, backed by the hosting platform's REST API over a
/// blocking `reqwest` client.
pub struct HttpResolverAdapter {
    http: Client,
    api_base: String,
}

impl HttpResolverAdapter {
    pub fn new(api_base: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("aw/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client for action resolution")?;
        Ok(Self {
            http,
            api_base: api_base.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

impl ResolverAdapter for HttpResolverAdapter {
    fn resolve_sha(&self, repo: &str, version: &str) -> Result<ResolvedRef, ResolveFailure> {
        let url = format!(
            "{}/repos/{}/commits/{}",
            self.api_base.trim_end_matches('/'),
            repo,
            version
        );

        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .map_err(|e| ResolveFailure::Transport(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => {
                let parsed: CommitRef = resp
                    .json()
                    .map_err(|e| ResolveFailure::Transport(e.to_string()))?;
                Ok(ResolvedRef {
                    sha: parsed.sha.to_lowercase(),
                    resolved_version: version.to_string(),
                })
            }
            StatusCode::NOT_FOUND => Err(ResolveFailure::NotFound),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                Err(ResolveFailure::RateLimited)
            }
            s => Err(ResolveFailure::Transport(format!("unexpected status {s}"))),
        }
    }
}

/// Built-in fallback shas for widely-used actions, served only when the
/// resolver adapter is unreachable after retries. Never used silently:
/// callers must opt in via [`PinOptions::allow_fallback`], and every
/// fallback hit is recorded in [`PinResult::used_fallback`] so the emitter
/// can surface it as a warning.
fn fallback_table() -> BTreeMap<(&'static str, &'static str), (&'static str, &'static str)> {
    BTreeMap::from([
        (
            ("actions/checkout", "v4"),
            ("8edcb1bdb4e267140fa742c62e395cd74f332d7b", "v4.2.2"),
        ),
        (
            ("actions/setup-node", "v4"),
            ("0a44ba7841725637a19e28fa30b79a866c81b0a6", "v4.1.0"),
        ),
        (
            ("actions/upload-artifact", "v4"),
            ("b4b15b8c7c6f87e8a7da77d4e0cbb8b0c7a27c1f", "v4.4.3"),
        ),
    ])
}

#[derive(Debug, Clone)]
pub struct PinOptions {
    pub strict: bool,
    pub allow_fallback: bool,
}

impl Default for PinOptions {
    fn default() -> Self {
        Self {
            strict: false,
            allow_fallback: true,
        }
    }
}

pub struct PinResult {
    pub pin: ActionPin,
    pub used_fallback: bool,
    /// Set when `resolved_version != requested_version` and strict mode is
    /// off; strict mode rejects the mismatch outright instead.
    pub mismatch_warning: Option<String>,
}

/// On-disk persisted form of the cache: one row per `(repo, requested
/// version)`, keyed so a later compile with the same reference skips the
/// network entirely.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    entries: BTreeMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    sha: String,
    resolved_version: String,
}

fn cache_key(reference: &ActionRef) -> String {
    format!("{}@{}", reference.repo, reference.requested_version)
}

pub struct ActionPinCache<A: ResolverAdapter> {
    adapter: A,
    cache_path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl<A: ResolverAdapter> ActionPinCache<A> {
    pub fn new(adapter: A, cache_path: Option<PathBuf>) -> Self {
        let entries = cache_path
            .as_deref()
            .and_then(load_cache_file)
            .unwrap_or_default();
        Self {
            adapter,
            cache_path,
            entries: Mutex::new(entries),
        }
    }

    /// Resolve `reference` to a pin, consulting the persisted cache first,
    /// then the adapter with retry/backoff, then (if permitted) the
    /// fallback table.
    pub async fn resolve(
        &self,
        reference: &ActionRef,
        options: &PinOptions,
    ) -> Result<PinResult> {
        let key = cache_key(reference);

        if let Some(entry) = self.entries.lock().unwrap().get(&key).cloned() {
            return self.finish(reference, entry, PinSource::Cached, false, options);
        }

        let policy = BackoffPolicy::action_resolution();
        let cancel = CancellationToken::new();
        let outcome = retry_with_backoff(&policy, &cancel, |_attempt| async {
            self.adapter.resolve_sha(&reference.repo, &reference.requested_version)
        })
        .await;

        match outcome {
            RetryOutcome::Ok(resolved) => {
                let entry = CacheEntry {
                    sha: resolved.sha,
                    resolved_version: resolved.resolved_version,
                };
                self.entries.lock().unwrap().insert(key, entry.clone());
                self.persist();
                self.finish(reference, entry, PinSource::Dynamic, false, options)
            }
            RetryOutcome::Permanent(ResolveFailure::NotFound) => {
                self.resolve_fallback(reference, options)
            }
            RetryOutcome::Permanent(other) => bail!("action resolution failed: {other}"),
            RetryOutcome::Exhausted(_) => self.resolve_fallback(reference, options),
            RetryOutcome::Cancelled => bail!("action resolution cancelled"),
        }
    }

    fn resolve_fallback(&self, reference: &ActionRef, options: &PinOptions) -> Result<PinResult> {
        if !options.allow_fallback {
            bail!(
                "could not resolve {}@{} and fallback is disabled",
                reference.repo,
                reference.requested_version
            );
        }
        let table = fallback_table();
        let Some((sha, resolved_version)) = table
            .get(&(reference.repo.as_str(), reference.requested_version.as_str()))
            .copied()
        else {
            bail!(
                "could not resolve {}@{} and no fallback entry exists",
                reference.repo,
                reference.requested_version
            );
        };
        let entry = CacheEntry {
            sha: sha.to_string(),
            resolved_version: resolved_version.to_string(),
        };
        self.finish(reference, entry, PinSource::Fallback, true, options)
    }

    fn finish(
        &self,
        reference: &ActionRef,
        entry: CacheEntry,
        source: PinSource,
        used_fallback: bool,
        options: &PinOptions,
    ) -> Result<PinResult> {
        if !ActionPin::is_valid_sha(&entry.sha) {
            bail!("resolved sha for {} is not 40 hex characters", reference.repo);
        }

        let pin = ActionPin {
            reference: reference.clone(),
            sha: entry.sha,
            resolved_version: entry.resolved_version,
            source,
        };

        let mismatch_warning = if pin.mismatched() {
            if options.strict {
                bail!(
                    "{}@{} resolved to {}, which mismatches the requested version under strict mode",
                    pin.reference.repo,
                    pin.reference.requested_version,
                    pin.resolved_version
                );
            }
            Some(format!(
                "{}@{} resolved to {}",
                pin.reference.repo, pin.reference.requested_version, pin.resolved_version
            ))
        } else {
            None
        };

        Ok(PinResult {
            pin,
            used_fallback,
            mismatch_warning,
        })
    }

    fn persist(&self) {
        let Some(path) = &self.cache_path else {
            return;
        };
        let file = CacheFile {
            entries: self.entries.lock().unwrap().clone(),
        };
        if let Ok(json) = serde_json::to_vec_pretty(&file) {
            let _ = std::fs::create_dir_all(path.parent().unwrap_or(Path::new(".")));
            let _ = std::fs::write(path, json);
        }
    }
}

fn load_cache_file(path: &Path) -> Option<BTreeMap<String, CacheEntry>> {
    let text = std::fs::read_to_string(path).ok()?;
    let file: CacheFile = serde_json::from_str(&text).ok()?;
    Some(file.entries)
}
