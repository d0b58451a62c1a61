//! Per-key minimum spacing between outbound requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use libre_core::{CacheKey, Clock};

/// Remembers when each key last issued an outbound request.
#[derive(Debug)]
pub struct CooldownGuard {
    last_request: HashMap<CacheKey, Instant>,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl CooldownGuard {
    pub fn new(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            last_request: HashMap::new(),
            cooldown,
            clock,
        }
    }

    /// True when `key` never requested, or its last request is at least one
    /// cooldown old.
    pub fn allowed(&self, key: &str) -> bool {
        match self.last_request.get(key) {
            Some(at) => self.clock.now().saturating_duration_since(*at) >= self.cooldown,
            None => true,
        }
    }

    /// Mark `key` as having requested now.
    pub fn record(&mut self, key: CacheKey) {
        self.last_request.insert(key, self.clock.now());
    }

    /// Drop entries whose cooldown has passed. They would be allowed anyway.
    pub fn prune(&mut self) -> usize {
        let now = self.clock.now();
        let cooldown = self.cooldown;
        let before = self.last_request.len();
        self.last_request
            .retain(|_, at| now.saturating_duration_since(*at) < cooldown);
        before - self.last_request.len()
    }

    pub fn clear(&mut self) {
        self.last_request.clear();
    }

    pub fn last_request(&self, key: &str) -> Option<Instant> {
        self.last_request.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.last_request.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_request.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libre_core::ManualClock;

    fn guard() -> (CooldownGuard, ManualClock) {
        let clock = ManualClock::new();
        (
            CooldownGuard::new(Duration::from_millis(4_000), Arc::new(clock.clone())),
            clock,
        )
    }

    #[test]
    fn test_unknown_key_is_allowed() {
        let (guard, _clock) = guard();
        assert!(guard.allowed("sb_x"));
    }

    #[test]
    fn test_cooldown_boundary() {
        let (mut guard, clock) = guard();
        guard.record(CacheKey::raw("sb_x"));

        clock.set_elapsed(Duration::from_millis(3_999));
        assert!(!guard.allowed("sb_x"));

        clock.set_elapsed(Duration::from_millis(4_000));
        assert!(guard.allowed("sb_x"));
    }

    #[test]
    fn test_keys_are_independent() {
        let (mut guard, _clock) = guard();
        guard.record(CacheKey::raw("sb_x"));
        assert!(!guard.allowed("sb_x"));
        assert!(guard.allowed("da_x"));
    }

    #[test]
    fn test_prune_removes_only_expired() {
        let (mut guard, clock) = guard();
        guard.record(CacheKey::raw("a"));
        clock.advance(Duration::from_secs(3));
        guard.record(CacheKey::raw("b"));
        clock.advance(Duration::from_secs(2));

        assert_eq!(guard.prune(), 1);
        assert_eq!(guard.len(), 1);
        assert!(guard.last_request("a").is_none());
        assert!(!guard.allowed("b"));
    }

    #[test]
    fn test_zero_cooldown_always_allows() {
        let clock = ManualClock::new();
        let mut guard = CooldownGuard::new(Duration::ZERO, Arc::new(clock));
        guard.record(CacheKey::raw("k"));
        assert!(guard.allowed("k"));
    }
}
