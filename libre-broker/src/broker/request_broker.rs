//! Request broker: cache, cooldown, budget and coalescing composed behind a
//! single `fetch`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use libre_core::{
    BrokerConfig, CacheKey, Clock, ConfigError, SystemClock, Transport, CHANNEL_CAPACITY,
    CHANNEL_NAME,
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant as TokioInstant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::channel::{LocalTokenChannel, TokenChannel};
use super::cooldown::CooldownGuard;
use super::inflight::InFlightTable;
use super::limiter::TokenBucket;
use super::ttl_cache::{CacheStats, TtlCache};

/// Point-in-time view of a broker's state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrokerStats {
    pub cache: CacheStats,
    pub tokens_remaining: u32,
    pub in_flight: usize,
    pub cooldown_entries: usize,
}

/// Deduplicating, rate-limited, caching front for outbound JSON requests.
///
/// Cloning is cheap; clones share one instance. Every instance owns its
/// cache, cooldown table, in-flight table and token counter. Instances
/// built against the same [`TokenChannel`] share their budget on a
/// best-effort basis.
///
/// `fetch` never fails: transient denials, non-2xx responses and transport
/// errors all yield `None`.
#[derive(Debug, Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    config: BrokerConfig,
    transport: Arc<dyn Transport>,
    state: Mutex<BrokerState>,
    in_flight: InFlightTable,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct BrokerState {
    cache: TtlCache,
    cooldown: CooldownGuard,
    limiter: TokenBucket,
    /// Bumped by `shutdown`; calls dispatched before it do not cache.
    generation: u64,
}

impl fmt::Debug for BrokerInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerInner")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl Broker {
    /// Build a broker after validating `config`.
    pub fn new(
        config: BrokerConfig,
        transport: Arc<dyn Transport>,
        channel: Arc<dyn TokenChannel>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(config, transport, channel, clock))
    }

    /// Broker with default tuning, the system clock and a private channel.
    pub fn with_defaults(transport: Arc<dyn Transport>) -> Self {
        Self::from_parts(
            BrokerConfig::default(),
            transport,
            Arc::new(LocalTokenChannel::new(CHANNEL_NAME, CHANNEL_CAPACITY)),
            Arc::new(SystemClock),
        )
    }

    fn from_parts(
        config: BrokerConfig,
        transport: Arc<dyn Transport>,
        channel: Arc<dyn TokenChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = BrokerState {
            cache: TtlCache::new(config.ttl, config.max_cache, clock.clone()),
            cooldown: CooldownGuard::new(config.cooldown, clock.clone()),
            limiter: TokenBucket::new(config.rate_limit, config.rate_window, clock, channel),
            generation: 0,
        };
        Self {
            inner: Arc::new(BrokerInner {
                config,
                transport,
                state: Mutex::new(state),
                in_flight: InFlightTable::new(),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Fetch `url` as JSON under the logical `key`.
    ///
    /// Checks run in order and the first that applies decides:
    /// 1. fresh cache entry: returned, nothing else touched
    /// 2. key still cooling down: `None`
    /// 3. no token left in the window: `None`
    /// 4. call already in flight for the key: its result
    /// 5. otherwise the cooldown is recorded and a call is dispatched; a
    ///    non-null result is cached
    ///
    /// `None` from steps 2 and 3 means "try again later", not "no data".
    pub async fn fetch(&self, key: impl Into<CacheKey>, url: &str) -> Option<Value> {
        let key = key.into();
        let pending = {
            let mut state = self.inner.lock_state();

            if let Some(value) = state.cache.get(key.as_str()) {
                debug!(key = %key, "Cache hit");
                return Some(value);
            }

            if !state.cooldown.allowed(key.as_str()) {
                debug!(key = %key, "Request denied: key cooling down");
                return None;
            }

            if !state.limiter.try_consume() {
                debug!(key = %key, "Request denied: rate budget exhausted");
                return None;
            }

            match self.inner.in_flight.get(key.as_str()) {
                Some(pending) => {
                    debug!(key = %key, "Joining in-flight request");
                    pending
                }
                None => {
                    state.cooldown.record(key.clone());
                    debug!(key = %key, url = %url, "Dispatching request");
                    let call = request(
                        self.inner.clone(),
                        key.clone(),
                        url.to_string(),
                        state.generation,
                    );
                    self.inner.in_flight.dispatch(key, call)
                }
            }
        };
        pending.await
    }

    /// Drop expired cache entries and elapsed cooldowns.
    pub fn sweep(&self) {
        self.inner.sweep();
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` on the current
    /// tokio runtime. Calling it again while a sweeper runs does nothing.
    ///
    /// The sweeper holds only a weak reference and stops on its own once
    /// the last clone of the broker is dropped.
    pub fn spawn_sweeper(&self) {
        let mut slot = lock(&self.inner.sweeper);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let weak: Weak<BrokerInner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.sweep_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval_at(TokioInstant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(inner) => inner.sweep(),
                    None => break,
                }
            }
        }));
        debug!(interval_ms = period.as_millis() as u64, "Started cache sweeper");
    }

    /// Stop the sweeper and drop cached responses and cooldowns.
    ///
    /// Calls already in flight still complete and hand their result to
    /// waiting callers, but do not repopulate the cache. The broker stays
    /// usable.
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.inner.sweeper).take() {
            handle.abort();
        }
        let mut state = self.inner.lock_state();
        let dropped = state.cache.len();
        state.cache.clear();
        state.cooldown.clear();
        state.generation += 1;
        info!(dropped_entries = dropped, "Broker shut down");
    }

    pub fn is_sweeping(&self) -> bool {
        lock(&self.inner.sweeper)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn stats(&self) -> BrokerStats {
        let mut state = self.inner.lock_state();
        BrokerStats {
            cache: state.cache.stats(),
            tokens_remaining: state.limiter.remaining(),
            in_flight: self.inner.in_flight.len(),
            cooldown_entries: state.cooldown.len(),
        }
    }

    /// Fresh cached value for `key`, without touching anything else.
    pub fn cached(&self, key: &str) -> Option<Value> {
        self.inner.lock_state().cache.get(key)
    }
}

impl BrokerInner {
    fn lock_state(&self) -> MutexGuard<'_, BrokerState> {
        lock(&self.state)
    }

    fn sweep(&self) {
        let mut state = self.lock_state();
        let expired = state.cache.sweep();
        let cooled = state.cooldown.prune();
        if expired > 0 || cooled > 0 {
            debug!(
                expired,
                cooled,
                remaining = state.cache.len(),
                "Swept broker state"
            );
        }
    }
}

impl Drop for BrokerInner {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.sweeper).take() {
            handle.abort();
        }
    }
}

/// The network call behind one dispatch.
///
/// Stores a non-null result in the cache before the in-flight entry is
/// removed, so a caller arriving after settlement sees the cache. Results of
/// calls that outlived a `shutdown` are returned but not stored.
async fn request(
    inner: Arc<BrokerInner>,
    key: CacheKey,
    url: String,
    generation: u64,
) -> Option<Value> {
    match inner.transport.get_json(&url).await {
        Ok(Some(Value::Null)) => {
            debug!(key = %key, "Empty response, not cached");
            None
        }
        Ok(Some(value)) => {
            let mut state = inner.lock_state();
            if state.generation == generation {
                state.cache.put(key, value.clone());
            } else {
                debug!(key = %key, "Broker shut down during request, result not cached");
            }
            Some(value)
        }
        Ok(None) => {
            debug!(key = %key, url = %url, "Non-success response");
            None
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Request failed");
            None
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Critical sections never panic midway; a poisoned lock still holds
    // consistent state.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
