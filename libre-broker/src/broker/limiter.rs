//! Fixed-window token bucket with a best-effort shared budget.
//!
//! The budget resets to `rate_limit` at every window boundary, measured from
//! construction. Consumption notices from other brokers on the same
//! [`TokenChannel`] are applied lazily: they are drained whenever the bucket
//! is consulted, after the window check. Notices stamped before the current
//! window started belong to a budget that has already been reset and are
//! discarded. The shared budget is approximate. Notices carry no
//! acknowledgement and lagging receivers drop them, so a group of brokers
//! can overshoot the limit but a single isolated broker never does.

use std::sync::Arc;
use std::time::{Duration, Instant};

use libre_core::Clock;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::channel::{ChannelMessage, TokenChannel};

#[derive(Debug)]
pub struct TokenBucket {
    tokens: u32,
    rate_limit: u32,
    window: Duration,
    window_start: Instant,
    clock: Arc<dyn Clock>,
    channel: Arc<dyn TokenChannel>,
    inbox: Option<broadcast::Receiver<ChannelMessage>>,
    origin: Uuid,
}

impl TokenBucket {
    pub fn new(
        rate_limit: u32,
        window: Duration,
        clock: Arc<dyn Clock>,
        channel: Arc<dyn TokenChannel>,
    ) -> Self {
        let inbox = channel.subscribe();
        if inbox.is_none() {
            debug!(channel = %channel.name(), "Token channel unavailable, budget is local only");
        }
        Self {
            tokens: rate_limit,
            rate_limit,
            window,
            window_start: clock.now(),
            clock,
            channel,
            inbox,
            origin: Uuid::new_v4(),
        }
    }

    /// Spend one token if any remain, announcing the spend to peers.
    pub fn try_consume(&mut self) -> bool {
        self.refill();
        self.drain_notices();
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        self.channel
            .announce(ChannelMessage::consumed_at(self.origin, self.clock.now()));
        true
    }

    /// Apply a consumption made elsewhere. The budget never goes below zero.
    pub fn observe_remote(&mut self) {
        self.tokens = self.tokens.saturating_sub(1);
    }

    /// Tokens left in the current window after applying pending notices.
    pub fn remaining(&mut self) -> u32 {
        self.refill();
        self.drain_notices();
        self.tokens
    }

    /// Identifier stamped on this bucket's announcements.
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    fn refill(&mut self) {
        let elapsed = self.clock.now().saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return;
        }
        let windows = elapsed.as_nanos() / self.window.as_nanos();
        let advance = self.window.as_nanos() * windows;
        self.window_start += Duration::from_nanos(u64::try_from(advance).unwrap_or(u64::MAX));
        self.tokens = self.rate_limit;
    }

    fn drain_notices(&mut self) {
        let Some(mut inbox) = self.inbox.take() else {
            return;
        };
        loop {
            match inbox.try_recv() {
                Ok(message) => {
                    if message.origin() == self.origin {
                        continue;
                    }
                    match message.sent_at() {
                        Some(sent_at) if sent_at < self.window_start => {
                            trace!("Discarding token notice from an earlier window");
                        }
                        _ => self.observe_remote(),
                    }
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Dropped token notices from a lagging channel");
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => {
                    // Sender gone: no more notices will ever arrive.
                    return;
                }
            }
        }
        self.inbox = Some(inbox);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::channel::{ChannelRegistry, LocalTokenChannel, NullTokenChannel};
    use libre_core::ManualClock;

    const WINDOW: Duration = Duration::from_secs(60);

    fn bucket(rate: u32) -> (TokenBucket, ManualClock) {
        let clock = ManualClock::new();
        let bucket = TokenBucket::new(
            rate,
            WINDOW,
            Arc::new(clock.clone()),
            Arc::new(NullTokenChannel),
        );
        (bucket, clock)
    }

    #[test]
    fn test_consumes_up_to_limit() {
        let (mut bucket, _clock) = bucket(3);
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
        assert_eq!(bucket.remaining(), 0);
    }

    #[test]
    fn test_refills_at_window_boundary() {
        let (mut bucket, clock) = bucket(1);
        assert!(bucket.try_consume());
        clock.set_elapsed(Duration::from_millis(59_999));
        assert!(!bucket.try_consume());
        clock.set_elapsed(WINDOW);
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
    }

    #[test]
    fn test_windows_stay_aligned_after_idle_gap() {
        let (mut bucket, clock) = bucket(1);
        clock.set_elapsed(Duration::from_secs(150));
        assert!(bucket.try_consume());
        // Current window is [120s, 180s).
        clock.set_elapsed(Duration::from_secs(179));
        assert!(!bucket.try_consume());
        clock.set_elapsed(Duration::from_secs(180));
        assert!(bucket.try_consume());
    }

    #[test]
    fn test_remote_notices_decrement_budget() {
        let clock = ManualClock::new();
        let channel: Arc<dyn TokenChannel> = Arc::new(LocalTokenChannel::new("t", 16));
        let mut a = TokenBucket::new(3, WINDOW, Arc::new(clock.clone()), channel.clone());
        let mut b = TokenBucket::new(3, WINDOW, Arc::new(clock.clone()), channel);

        assert!(a.try_consume());
        assert!(a.try_consume());
        assert_eq!(b.remaining(), 1);
        // Own announcements are ignored.
        assert_eq!(a.remaining(), 1);

        assert!(b.try_consume());
        assert!(!b.try_consume());
        assert!(!a.try_consume());
    }

    #[test]
    fn test_remote_notices_clamp_at_zero() {
        let (mut bucket, _clock) = bucket(1);
        bucket.observe_remote();
        bucket.observe_remote();
        bucket.observe_remote();
        assert_eq!(bucket.remaining(), 0);
        assert!(!bucket.try_consume());
    }

    #[test]
    fn test_denial_does_not_announce() {
        let clock = ManualClock::new();
        let channel = Arc::new(LocalTokenChannel::new("t", 16));
        let mut observer = channel.subscribe().unwrap();
        let mut bucket = TokenBucket::new(1, WINDOW, Arc::new(clock), channel);

        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());

        assert_eq!(observer.try_recv().unwrap().origin(), bucket.origin());
        assert!(observer.try_recv().is_err());
    }

    #[test]
    fn test_idle_peer_gets_full_budget_next_window() {
        let clock = ManualClock::new();
        let channels = ChannelRegistry::new();
        let channel = channels.channel("libre_ultra", 256);
        let mut busy = TokenBucket::new(25, WINDOW, Arc::new(clock.clone()), channel.clone());
        let mut idle = TokenBucket::new(25, WINDOW, Arc::new(clock.clone()), channel);

        for _ in 0..25 {
            assert!(busy.try_consume());
        }
        // The idle bucket never looked at its inbox during window 0.
        clock.set_elapsed(Duration::from_secs(61));
        assert_eq!(busy.remaining(), 25);
        assert_eq!(idle.remaining(), 25);

        // Spends made in the new window still count.
        assert!(busy.try_consume());
        assert!(busy.try_consume());
        assert_eq!(idle.remaining(), 23);
    }

    #[test]
    fn test_unstamped_notices_count_against_current_window() {
        let clock = ManualClock::new();
        let channel: Arc<dyn TokenChannel> = Arc::new(LocalTokenChannel::new("t", 16));
        let mut bucket = TokenBucket::new(5, WINDOW, Arc::new(clock.clone()), channel.clone());
        channel.announce(ChannelMessage::consumed(Uuid::new_v4()));
        clock.set_elapsed(Duration::from_secs(61));
        assert_eq!(bucket.remaining(), 4);
    }

    #[test]
    fn test_lagged_inbox_keeps_working() {
        let clock = ManualClock::new();
        let channel: Arc<dyn TokenChannel> = Arc::new(LocalTokenChannel::new("t", 2));
        let mut local = TokenBucket::new(10, WINDOW, Arc::new(clock.clone()), channel.clone());
        for _ in 0..5 {
            channel.announce(ChannelMessage::consumed(Uuid::new_v4()));
        }
        // Three notices were overwritten; the two still buffered apply.
        assert_eq!(local.remaining(), 8);
        channel.announce(ChannelMessage::consumed(Uuid::new_v4()));
        assert_eq!(local.remaining(), 7);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::broker::channel::NullTokenChannel;
    use libre_core::ManualClock;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// An isolated bucket never grants more than `rate_limit` tokens in
        /// one window.
        #[test]
        fn prop_isolated_bucket_respects_limit(
            rate in 1u32..30,
            steps in proptest::collection::vec(0u64..5_000, 1..200),
        ) {
            let clock = ManualClock::new();
            let window = Duration::from_secs(60);
            let mut bucket = TokenBucket::new(
                rate,
                window,
                Arc::new(clock.clone()),
                Arc::new(NullTokenChannel),
            );

            let mut grants_per_window: std::collections::HashMap<u128, u32> = Default::default();
            for step in steps {
                clock.advance(Duration::from_millis(step));
                if bucket.try_consume() {
                    let idx = clock.elapsed().as_nanos() / window.as_nanos();
                    *grants_per_window.entry(idx).or_default() += 1;
                }
            }
            for grants in grants_per_window.values() {
                prop_assert!(*grants <= rate);
            }
        }
    }
}
