//! LibreUltra Core - Shared Types
//!
//! Plain data and small pure helpers used by every other crate: the error
//! taxonomy, configuration, the clock abstraction, cache keys and the typed
//! payloads returned by the SponsorBlock and DeArrow services.
//! It also defines the I/O seams (`Transport`, `VersionSource`,
//! `StateStore`); nothing in here performs I/O except config file loading.

pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod models;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BrokerConfig, BrokerSettings, DeArrowConfig, LibreConfig, SponsorBlockConfig,
    UpstreamConfig, CACHE_TTL, CHANNEL_CAPACITY, CHANNEL_NAME, DEFAULT_THUMBNAIL_API, MAX_CACHE,
    PER_VIDEO_COOLDOWN, RATE_LIMIT, RATE_WINDOW, SWEEP_INTERVAL, VERSION_KEY,
};
pub use error::{ConfigError, LibreError, LibreResult, StateError, TransportError};
pub use key::{CacheKey, Namespace};
pub use models::{
    extract_video_id, sort_segments, thumbnail_url, Branding, BrandingReplacement, BrandingThumbnail,
    BrandingTitle, SkipSegment,
};
pub use traits::{StateStore, Transport, VersionSource};
