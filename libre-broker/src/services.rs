//! SponsorBlock and DeArrow adapters on top of the [`Broker`].
//!
//! Raw lookups return whatever JSON the service produced. Typed lookups
//! decode it; a body that does not decode is logged and treated as absent,
//! the same as any other failure.

use std::fmt;

use libre_core::{
    sort_segments, Branding, BrandingReplacement, CacheKey, DeArrowConfig, LibreConfig,
    SkipSegment, SponsorBlockConfig,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::broker::Broker;

#[derive(Clone)]
pub struct VideoServices {
    broker: Broker,
    sponsor_api: String,
    dearrow_api: String,
    dearrow_key: String,
    thumbnail_api: String,
}

impl VideoServices {
    pub fn new(broker: Broker, sponsor_block: &SponsorBlockConfig, dearrow: &DeArrowConfig) -> Self {
        Self {
            broker,
            sponsor_api: sponsor_block.api.clone(),
            dearrow_api: dearrow.api.clone(),
            dearrow_key: dearrow.key.clone(),
            thumbnail_api: dearrow.thumbnail_api.clone(),
        }
    }

    pub fn from_config(broker: Broker, config: &LibreConfig) -> Self {
        Self::new(broker, &config.sponsor_block, &config.dearrow)
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn skip_segments_url(&self, video_id: &str) -> String {
        format!("{}api/skipSegments?videoID={}", self.sponsor_api, video_id)
    }

    /// The license key rides in the query string and is visible to anyone
    /// who can observe the request.
    pub fn branding_url(&self, video_id: &str) -> String {
        format!(
            "{}api/branding?videoID={}&license={}",
            self.dearrow_api, video_id, self.dearrow_key
        )
    }

    /// Raw skip segments for `video_id`.
    pub async fn sponsor(&self, video_id: &str) -> Option<Value> {
        let url = self.skip_segments_url(video_id);
        self.broker
            .fetch(CacheKey::sponsor_block(video_id), &url)
            .await
    }

    /// Raw branding for `video_id`.
    pub async fn branding(&self, video_id: &str) -> Option<Value> {
        let url = self.branding_url(video_id);
        self.broker.fetch(CacheKey::dearrow(video_id), &url).await
    }

    /// Skip segments ordered by start time.
    pub async fn skip_segments(&self, video_id: &str) -> Option<Vec<SkipSegment>> {
        let value = self.sponsor(video_id).await?;
        let mut segments: Vec<SkipSegment> = decode(video_id, value)?;
        sort_segments(&mut segments);
        Some(segments)
    }

    pub async fn branding_details(&self, video_id: &str) -> Option<Branding> {
        let value = self.branding(video_id).await?;
        decode(video_id, value)
    }

    /// Community title and thumbnail to show instead of the originals.
    pub async fn replacement(&self, video_id: &str) -> Option<BrandingReplacement> {
        self.branding_details(video_id)
            .await?
            .replacement(&self.thumbnail_api, video_id, &self.dearrow_key)
    }

    /// Warm the branding cache for `video_id` in the background.
    ///
    /// Runs after the current task yields, never reports back, and does
    /// nothing outside a tokio runtime.
    pub fn prefetch(&self, video_id: &str) {
        let Ok(handle) = Handle::try_current() else {
            debug!(video_id = %video_id, "No runtime, prefetch skipped");
            return;
        };
        let services = self.clone();
        let video_id = video_id.to_string();
        handle.spawn(async move {
            tokio::task::yield_now().await;
            let _ = services.branding(&video_id).await;
        });
    }
}

impl fmt::Debug for VideoServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoServices")
            .field("sponsor_api", &self.sponsor_api)
            .field("dearrow_api", &self.dearrow_api)
            .field("dearrow_key", &"[REDACTED]")
            .field("thumbnail_api", &self.thumbnail_api)
            .finish()
    }
}

fn decode<T: DeserializeOwned>(video_id: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(video_id = %video_id, error = %e, "Unexpected response shape");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::NullTokenChannel;
    use libre_core::{BrokerConfig, ManualClock};
    use libre_test_utils::fixtures::{
        branding_url, sample_branding_json, sample_config, sample_segments_json,
        skip_segments_url, VIDEO_ID,
    };
    use libre_test_utils::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn services(transport: &MockTransport) -> VideoServices {
        let broker = Broker::new(
            BrokerConfig::default(),
            Arc::new(transport.clone()),
            Arc::new(NullTokenChannel),
            Arc::new(ManualClock::new()),
        )
        .unwrap();
        VideoServices::from_config(broker, &sample_config())
    }

    #[test]
    fn test_urls_match_service_layout() {
        let services = services(&MockTransport::new());
        assert_eq!(services.skip_segments_url(VIDEO_ID), skip_segments_url(VIDEO_ID));
        assert_eq!(services.branding_url(VIDEO_ID), branding_url(VIDEO_ID));
    }

    #[test]
    fn test_debug_redacts_license() {
        let services = services(&MockTransport::new());
        let rendered = format!("{services:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("test-license"));
    }

    #[tokio::test]
    async fn test_keys_are_namespaced_per_service() {
        let transport = MockTransport::new()
            .with_json(skip_segments_url(VIDEO_ID), sample_segments_json())
            .with_json(branding_url(VIDEO_ID), sample_branding_json());
        let services = services(&transport);

        assert!(services.sponsor(VIDEO_ID).await.is_some());
        assert!(services.branding(VIDEO_ID).await.is_some());
        assert_eq!(transport.call_count(), 2);

        let broker = services.broker();
        assert!(broker.cached(&format!("sb_{VIDEO_ID}")).is_some());
        assert!(broker.cached(&format!("da_{VIDEO_ID}")).is_some());
    }

    #[tokio::test]
    async fn test_skip_segments_are_sorted() {
        let transport =
            MockTransport::new().with_json(skip_segments_url(VIDEO_ID), sample_segments_json());
        let segments = services(&transport).skip_segments(VIDEO_ID).await.unwrap();
        let starts: Vec<f64> = segments.iter().map(SkipSegment::start).collect();
        assert_eq!(starts, vec![30.5, 212.0]);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_absent() {
        let transport = MockTransport::new()
            .with_json(skip_segments_url(VIDEO_ID), json!({ "message": "not a list" }));
        assert_eq!(services(&transport).skip_segments(VIDEO_ID).await, None);
    }

    #[tokio::test]
    async fn test_replacement_from_branding() {
        let transport =
            MockTransport::new().with_json(branding_url(VIDEO_ID), sample_branding_json());
        let replacement = services(&transport).replacement(VIDEO_ID).await.unwrap();
        assert_eq!(replacement.title.as_deref(), Some("Never Gonna Give You Up"));
        assert_eq!(
            replacement.thumbnail_url.as_deref(),
            Some("https://thumb.test/api/v1/getThumbnail?videoID=dQw4w9WgXcQ&time=42.5&license=test-license")
        );
    }

    #[tokio::test]
    async fn test_prefetch_warms_cache() {
        let transport =
            MockTransport::new().with_json(branding_url(VIDEO_ID), sample_branding_json());
        let services = services(&transport);

        services.prefetch(VIDEO_ID);
        transport.wait_for_calls(1).await;
        while services.broker().stats().in_flight > 0 {
            tokio::task::yield_now().await;
        }

        assert!(services.branding(VIDEO_ID).await.is_some());
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_prefetch_outside_runtime_is_noop() {
        let transport = MockTransport::new();
        services(&transport).prefetch(VIDEO_ID);
        assert_eq!(transport.call_count(), 0);
    }
}
