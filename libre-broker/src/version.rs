//! Boot-time upstream version check.
//!
//! The latest commit of the upstream repository acts as a content version.
//! When it differs from the version recorded on the previous run, every
//! persisted value is wiped before the new version is stored.

use std::sync::Arc;

use async_trait::async_trait;
use libre_core::{StateError, StateStore, TransportError, UpstreamConfig, VersionSource};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::transport::HttpTransport;

const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
}

/// Latest commit SHA of a GitHub branch.
#[derive(Debug, Clone)]
pub struct GithubCommitSource {
    client: Client,
    url: String,
}

impl GithubCommitSource {
    pub fn new(transport: &HttpTransport, upstream: &UpstreamConfig) -> Self {
        Self {
            client: transport.client().clone(),
            url: Self::commit_url(&upstream.owner, &upstream.repo, &upstream.branch),
        }
    }

    pub fn commit_url(owner: &str, repo: &str, branch: &str) -> String {
        format!("{GITHUB_API}/repos/{owner}/{repo}/commits/{branch}")
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl VersionSource for GithubCommitSource {
    async fn latest_version(&self) -> Result<String, TransportError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|e| TransportError::RequestFailed {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::InvalidResponse {
                url: self.url.clone(),
                reason: format!("status {}", status.as_u16()),
            });
        }

        let commit: CommitResponse =
            response
                .json()
                .await
                .map_err(|e| TransportError::InvalidResponse {
                    url: self.url.clone(),
                    reason: e.to_string(),
                })?;
        Ok(commit.sha)
    }
}

/// Outcome of [`VersionGuard::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// Nothing was recorded yet; `version` is now stored.
    FirstSeen { version: String },
    /// Stored version matches upstream.
    Unchanged { version: String },
    /// Upstream moved on; persisted state was cleared.
    Updated { previous: String, version: String },
    /// Version could not be fetched or recorded. Nothing was cleared.
    Unavailable,
}

impl VersionCheck {
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::FirstSeen { version }
            | Self::Unchanged { version }
            | Self::Updated { version, .. } => Some(version),
            Self::Unavailable => None,
        }
    }

    pub fn cleared_state(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

pub struct VersionGuard {
    source: Arc<dyn VersionSource>,
    store: Arc<dyn StateStore>,
    key: String,
}

impl VersionGuard {
    pub fn new(
        source: Arc<dyn VersionSource>,
        store: Arc<dyn StateStore>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            source,
            store,
            key: key.into(),
        }
    }

    /// Compare upstream with the recorded version, wiping state on change.
    ///
    /// Never fails; problems are logged and reported as `Unavailable`.
    pub async fn check(&self) -> VersionCheck {
        let latest = match self.source.latest_version().await {
            Ok(latest) if !latest.is_empty() => latest,
            Ok(_) => {
                warn!("Upstream reported an empty version");
                return VersionCheck::Unavailable;
            }
            Err(e) => {
                warn!(error = %e, "Upstream version unavailable");
                return VersionCheck::Unavailable;
            }
        };

        match self.record(latest) {
            Ok(check) => check,
            Err(e) => {
                warn!(error = %e, "Could not record upstream version");
                VersionCheck::Unavailable
            }
        }
    }

    fn record(&self, latest: String) -> Result<VersionCheck, StateError> {
        let stored = self.store.get(&self.key)?.filter(|v| !v.is_empty());
        let check = match stored {
            None => {
                debug!(version = %latest, "Recording first upstream version");
                VersionCheck::FirstSeen { version: latest }
            }
            Some(previous) if previous == latest => VersionCheck::Unchanged { version: latest },
            Some(previous) => {
                info!(previous = %previous, version = %latest, "Upstream updated, clearing persisted state");
                self.store.clear()?;
                VersionCheck::Updated {
                    previous,
                    version: latest,
                }
            }
        };
        if let Some(version) = check.version() {
            self.store.set(&self.key, version)?;
        }
        Ok(check)
    }
}

impl std::fmt::Debug for VersionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionGuard")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;
    use libre_core::VERSION_KEY;
    use libre_test_utils::{FailingStateStore, StaticVersionSource};

    fn guard(source: &StaticVersionSource, store: &Arc<MemoryStateStore>) -> VersionGuard {
        VersionGuard::new(Arc::new(source.clone()), store.clone(), VERSION_KEY)
    }

    #[test]
    fn test_commit_url() {
        assert_eq!(
            GithubCommitSource::commit_url("JamesHickers", "Krynetfeatures", "main"),
            "https://api.github.com/repos/JamesHickers/Krynetfeatures/commits/main"
        );
    }

    #[test]
    fn test_commit_response_decodes_sha() {
        let body = r#"{ "sha": "6dcb09b5b57875f334f61aebed695e2e4193db5e", "commit": {} }"#;
        let commit: CommitResponse = serde_json::from_str(body).unwrap();
        assert_eq!(commit.sha, "6dcb09b5b57875f334f61aebed695e2e4193db5e");
    }

    #[tokio::test]
    async fn test_first_run_records_version() {
        let source = StaticVersionSource::new("aaa");
        let store = Arc::new(MemoryStateStore::new());
        store.set("player_prefs", "{}").unwrap();

        let check = guard(&source, &store).check().await;
        assert_eq!(check, VersionCheck::FirstSeen { version: "aaa".into() });
        assert_eq!(store.get(VERSION_KEY).unwrap().as_deref(), Some("aaa"));
        assert_eq!(store.get("player_prefs").unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_same_version_keeps_state() {
        let source = StaticVersionSource::new("aaa");
        let store = Arc::new(MemoryStateStore::new());
        store.set(VERSION_KEY, "aaa").unwrap();
        store.set("player_prefs", "{}").unwrap();

        let check = guard(&source, &store).check().await;
        assert_eq!(check, VersionCheck::Unchanged { version: "aaa".into() });
        assert!(!check.cleared_state());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_new_version_wipes_state() {
        let source = StaticVersionSource::new("bbb");
        let store = Arc::new(MemoryStateStore::new());
        store.set(VERSION_KEY, "aaa").unwrap();
        store.set("player_prefs", "{}").unwrap();

        let check = guard(&source, &store).check().await;
        assert_eq!(
            check,
            VersionCheck::Updated {
                previous: "aaa".into(),
                version: "bbb".into()
            }
        );
        assert!(check.cleared_state());
        assert_eq!(store.get("player_prefs").unwrap(), None);
        assert_eq!(store.get(VERSION_KEY).unwrap().as_deref(), Some("bbb"));
    }

    #[tokio::test]
    async fn test_source_failure_changes_nothing() {
        let source = StaticVersionSource::failing("offline");
        let store = Arc::new(MemoryStateStore::new());
        store.set(VERSION_KEY, "aaa").unwrap();

        let check = guard(&source, &store).check().await;
        assert_eq!(check, VersionCheck::Unavailable);
        assert_eq!(check.version(), None);
        assert_eq!(store.get(VERSION_KEY).unwrap().as_deref(), Some("aaa"));
    }

    #[tokio::test]
    async fn test_empty_version_is_unavailable() {
        let source = StaticVersionSource::new("");
        let store = Arc::new(MemoryStateStore::new());
        let check = guard(&source, &store).check().await;
        assert_eq!(check, VersionCheck::Unavailable);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_unavailable() {
        let guard = VersionGuard::new(
            Arc::new(StaticVersionSource::new("aaa")),
            Arc::new(FailingStateStore),
            VERSION_KEY,
        );
        assert_eq!(guard.check().await, VersionCheck::Unavailable);
    }
}
