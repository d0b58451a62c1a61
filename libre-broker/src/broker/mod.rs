//! Request broker and the mechanisms it composes.
//!
//! Every outbound call to the community data services goes through one
//! [`Broker`], which layers four mechanisms in a fixed order:
//!
//! 1. [`TtlCache`]: fresh responses are served without touching anything else
//! 2. [`CooldownGuard`]: a key may dispatch at most once per cooldown
//! 3. [`TokenBucket`]: at most `rate_limit` dispatches per window, shared
//!    loosely with other brokers on the same [`TokenChannel`]
//! 4. [`InFlightTable`]: concurrent callers for one key share one call
//!
//! # Example
//!
//! ```ignore
//! let broker = Broker::with_defaults(Arc::new(HttpTransport::new(None)?));
//! broker.spawn_sweeper();
//! let segments = broker
//!     .fetch(CacheKey::sponsor_block(id), &url)
//!     .await;
//! ```

pub mod channel;
pub mod cooldown;
pub mod inflight;
pub mod limiter;
pub mod request_broker;
pub mod ttl_cache;

pub use channel::{ChannelMessage, ChannelRegistry, LocalTokenChannel, NullTokenChannel, TokenChannel};
pub use cooldown::CooldownGuard;
pub use inflight::{InFlightTable, PendingFetch};
pub use limiter::TokenBucket;
pub use request_broker::{Broker, BrokerStats};
pub use ttl_cache::{CacheEntry, CacheStats, TtlCache};
