//! LibreUltra Test Utilities
//!
//! Shared test infrastructure for the LibreUltra workspace:
//! - Scripted mocks for the I/O seams (`Transport`, `VersionSource`,
//!   `StateStore`)
//! - Proptest generators
//! - Fixtures mirroring real service payloads
//! - Assertions for error variants

// Re-export core types for convenience
pub use libre_core::{
    BrokerConfig, CacheKey, ConfigError, LibreConfig, LibreError, LibreResult, ManualClock,
    StateError, StateStore, Transport, TransportError, VersionSource,
};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// Scripted outcome for one URL.
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    /// 2xx with this JSON body.
    Json(Value),
    /// Non-2xx status.
    NotOk,
    /// Network-level failure.
    Fail(String),
}

#[derive(Debug)]
struct MockTransportInner {
    responses: Mutex<HashMap<String, MockResponse>>,
    fallback: Mutex<MockResponse>,
    calls: Mutex<Vec<String>>,
    gate_tx: watch::Sender<bool>,
    gate_rx: watch::Receiver<bool>,
}

/// Transport answering from a URL table and recording every call.
///
/// Clones share state, so a test can keep one handle while the broker owns
/// another. While [`hold`](Self::hold) is in effect, calls are recorded
/// immediately but do not complete until [`release`](Self::release).
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<MockTransportInner>,
}

impl MockTransport {
    /// Unknown URLs answer `NotOk`.
    pub fn new() -> Self {
        let (gate_tx, gate_rx) = watch::channel(true);
        Self {
            inner: Arc::new(MockTransportInner {
                responses: Mutex::new(HashMap::new()),
                fallback: Mutex::new(MockResponse::NotOk),
                calls: Mutex::new(Vec::new()),
                gate_tx,
                gate_rx,
            }),
        }
    }

    pub fn with_response(self, url: impl Into<String>, response: MockResponse) -> Self {
        self.set_response(url, response);
        self
    }

    pub fn with_json(self, url: impl Into<String>, body: Value) -> Self {
        self.with_response(url, MockResponse::Json(body))
    }

    pub fn set_response(&self, url: impl Into<String>, response: MockResponse) {
        lock(&self.inner.responses).insert(url.into(), response);
    }

    /// Outcome for URLs without an explicit response.
    pub fn set_fallback(&self, response: MockResponse) {
        *lock(&self.inner.fallback) = response;
    }

    /// Every URL requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.inner.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.inner.calls).len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        lock(&self.inner.calls).iter().filter(|c| *c == url).count()
    }

    /// Park subsequent calls until [`release`](Self::release).
    pub fn hold(&self) {
        self.inner.gate_tx.send_replace(false);
    }

    /// Let parked and future calls complete.
    pub fn release(&self) {
        self.inner.gate_tx.send_replace(true);
    }

    /// Yield to the runtime until at least `n` calls were recorded.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.call_count() < n {
            tokio::task::yield_now().await;
        }
    }

    fn response_for(&self, url: &str) -> MockResponse {
        match lock(&self.inner.responses).get(url) {
            Some(response) => response.clone(),
            None => lock(&self.inner.fallback).clone(),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_json(&self, url: &str) -> Result<Option<Value>, TransportError> {
        lock(&self.inner.calls).push(url.to_string());

        let mut gate = self.inner.gate_rx.clone();
        // A closed gate cannot happen while `self` holds the sender.
        let _ = gate.wait_for(|open| *open).await.map(|_| ());

        match self.response_for(url) {
            MockResponse::Json(body) => Ok(Some(body)),
            MockResponse::NotOk => Ok(None),
            MockResponse::Fail(reason) => Err(TransportError::RequestFailed {
                url: url.to_string(),
                reason,
            }),
        }
    }
}

// ============================================================================
// MOCK VERSION SOURCE AND STATE STORE
// ============================================================================

/// Version source returning a settable result.
#[derive(Debug, Clone)]
pub struct StaticVersionSource {
    result: Arc<Mutex<Result<String, TransportError>>>,
    calls: Arc<Mutex<usize>>,
}

impl StaticVersionSource {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            result: Arc::new(Mutex::new(Ok(version.into()))),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        let source = Self::new("");
        source.set_error(reason);
        source
    }

    pub fn set_version(&self, version: impl Into<String>) {
        *lock(&self.result) = Ok(version.into());
    }

    pub fn set_error(&self, reason: impl Into<String>) {
        *lock(&self.result) = Err(TransportError::RequestFailed {
            url: "mock://version".to_string(),
            reason: reason.into(),
        });
    }

    pub fn call_count(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl VersionSource for StaticVersionSource {
    async fn latest_version(&self) -> Result<String, TransportError> {
        *lock(&self.calls) += 1;
        lock(&self.result).clone()
    }
}

/// State store whose every operation fails.
#[derive(Debug, Clone, Default)]
pub struct FailingStateStore;

impl FailingStateStore {
    fn error() -> StateError {
        StateError::Io {
            path: "mock://state".to_string(),
            reason: "storage unavailable".to_string(),
        }
    }
}

impl StateStore for FailingStateStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StateError> {
        Err(Self::error())
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StateError> {
        Err(Self::error())
    }

    fn clear(&self) -> Result<(), StateError> {
        Err(Self::error())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for broker inputs.

    use super::*;
    use proptest::prelude::*;

    /// An 11-character video identifier.
    pub fn video_id_strategy() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_-]{11}"
    }

    pub fn cache_key_strategy() -> impl Strategy<Value = CacheKey> {
        (prop_oneof![Just("sb_"), Just("da_")], video_id_strategy())
            .prop_map(|(tag, id)| CacheKey::raw(format!("{tag}{id}")))
    }

    /// Any JSON value except `null`, nested up to three levels.
    pub fn json_value_strategy() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            (-1.0e6f64..1.0e6).prop_map(Value::from),
            "[ -~]{0,16}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                proptest::collection::hash_map("[a-zA-Z]{1,8}", inner, 0..6)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Canned values shaped like real service traffic.

    use super::*;
    use serde_json::json;

    pub const VIDEO_ID: &str = "dQw4w9WgXcQ";
    pub const SPONSOR_API: &str = "https://sponsor.test/";
    pub const DEARROW_API: &str = "https://dearrow.test/";
    pub const DEARROW_KEY: &str = "test-license";
    pub const THUMBNAIL_API: &str = "https://thumb.test/api/v1/getThumbnail";

    pub const SAMPLE_CONFIG_TOML: &str = r#"
state_path = "state/libre.json"

[sponsor_block]
api = "https://sponsor.test/"

[dearrow]
api = "https://dearrow.test/"
key = "test-license"
thumbnail_api = "https://thumb.test/api/v1/getThumbnail"

[broker]
rate_limit = 10
cooldown_ms = 1000

[upstream]
owner = "JamesHickers"
repo = "Krynetfeatures"
"#;

    pub fn sample_config() -> LibreConfig {
        match LibreConfig::from_toml_str(SAMPLE_CONFIG_TOML) {
            Ok(config) => config,
            Err(e) => panic!("sample config does not parse: {e}"),
        }
    }

    pub fn skip_segments_url(video_id: &str) -> String {
        format!("{SPONSOR_API}api/skipSegments?videoID={video_id}")
    }

    pub fn branding_url(video_id: &str) -> String {
        format!("{DEARROW_API}api/branding?videoID={video_id}&license={DEARROW_KEY}")
    }

    /// Two segments, deliberately out of start order.
    pub fn sample_segments_json() -> Value {
        json!([
            {
                "category": "selfpromo",
                "actionType": "skip",
                "segment": [212.0, 230.5],
                "UUID": "seg-2",
                "videoDuration": 600.0,
                "locked": 0,
                "votes": 4,
                "description": ""
            },
            {
                "category": "sponsor",
                "actionType": "skip",
                "segment": [30.5, 61.0],
                "UUID": "seg-1",
                "videoDuration": 600.0,
                "locked": 1,
                "votes": 12,
                "description": ""
            }
        ])
    }

    /// Branding with a usable title (format markers included) and thumbnail.
    pub fn sample_branding_json() -> Value {
        json!({
            "titles": [
                { "title": ">Never >Gonna Give You Up", "original": false, "votes": 3, "locked": false, "UUID": "t-1" },
                { "title": "Original Title", "original": true, "votes": 0, "locked": false, "UUID": "t-2" }
            ],
            "thumbnails": [
                { "timestamp": 42.5, "original": false, "votes": 1, "locked": false, "UUID": "th-1" }
            ],
            "randomTime": 0.31,
            "videoDuration": 212.0
        })
    }

    /// Broker config with a short cooldown and small budget.
    pub fn fast_broker_config() -> BrokerConfig {
        BrokerConfig::new()
            .with_rate_limit(5)
            .with_cooldown(std::time::Duration::ZERO)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for LibreUltra error variants.

    use super::*;

    #[track_caller]
    pub fn assert_invalid_value<T: std::fmt::Debug>(
        result: &Result<T, ConfigError>,
        expected_field: &str,
    ) {
        match result {
            Err(ConfigError::InvalidValue { field, .. }) if field == expected_field => {}
            other => panic!("Expected InvalidValue for {expected_field}, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
