//! LibreUltra Broker
//!
//! Outbound request handling for the SponsorBlock and DeArrow lookups:
//! - [`Broker`]: TTL cache, per-key cooldown, shared token budget and
//!   in-flight coalescing behind one `fetch`
//! - [`HttpTransport`]: reqwest client used for every outbound GET
//! - [`VideoServices`]: URL building and typed decoding per service
//! - [`VersionGuard`]: boot-time wipe of persisted state on upstream change
//! - [`cli`]: the `libre-fetch` front end

pub mod broker;
pub mod cli;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod transport;
pub mod version;

pub use broker::{
    Broker, BrokerStats, CacheStats, ChannelMessage, ChannelRegistry, LocalTokenChannel,
    NullTokenChannel, TokenChannel,
};
pub use services::VideoServices;
pub use state::{FileStateStore, MemoryStateStore};
pub use transport::HttpTransport;
pub use version::{GithubCommitSource, VersionCheck, VersionGuard};
