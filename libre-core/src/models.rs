//! Typed payloads of the two community data services.
//!
//! The broker moves raw JSON; these types are what the service adapters
//! decode it into. Unknown fields are ignored so upstream additions do not
//! break decoding.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// DeArrow marks auto-formatted words with a leading `>`.
static FORMAT_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|\s)>(\S)").expect("format marker regex is valid")
});

static EMBED_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"youtube\.com/embed/([a-zA-Z0-9_-]{11})").expect("embed url regex is valid")
});

static BARE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("video id regex is valid"));

/// Video identifier from a bare 11-character id or a YouTube embed URL.
pub fn extract_video_id(input: &str) -> Option<&str> {
    let input = input.trim();
    if BARE_ID.is_match(input) {
        return Some(input);
    }
    EMBED_URL
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

// ============================================================================
// SPONSORBLOCK
// ============================================================================

/// One skippable segment returned by `api/skipSegments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipSegment {
    /// `[start, end]` in seconds.
    pub segment: [f64; 2],
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub action_type: String,
    #[serde(rename = "UUID", default)]
    pub uuid: String,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub video_duration: Option<f64>,
}

impl SkipSegment {
    pub fn start(&self) -> f64 {
        self.segment[0]
    }

    pub fn end(&self) -> f64 {
        self.segment[1]
    }
}

/// Order segments by start time.
pub fn sort_segments(segments: &mut [SkipSegment]) {
    segments.sort_by(|a, b| a.start().total_cmp(&b.start()));
}

// ============================================================================
// DEARROW
// ============================================================================

/// Response of `api/branding`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Branding {
    #[serde(default)]
    pub titles: Vec<BrandingTitle>,
    #[serde(default)]
    pub thumbnails: Vec<BrandingThumbnail>,
}

/// A community-submitted title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandingTitle {
    pub title: String,
    #[serde(default)]
    pub original: bool,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub locked: bool,
}

/// A community-submitted thumbnail, identified by a video timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandingThumbnail {
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub original: bool,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub locked: bool,
}

impl Branding {
    /// Top title if the community has not voted it down, with format
    /// markers removed.
    pub fn preferred_title(&self) -> Option<String> {
        let top = self.titles.first()?;
        if top.votes < 0 {
            return None;
        }
        Some(FORMAT_MARKER.replace_all(&top.title, "$1$2").into_owned())
    }

    /// Timestamp of the top thumbnail if it is usable and not the original.
    pub fn preferred_thumbnail_time(&self) -> Option<f64> {
        let top = self.thumbnails.first()?;
        if top.votes < 0 || top.original {
            return None;
        }
        top.timestamp
    }

    /// Title and thumbnail to show instead of the originals.
    ///
    /// `None` when neither replacement is usable.
    pub fn replacement(
        &self,
        thumbnail_api: &str,
        video_id: &str,
        license: &str,
    ) -> Option<BrandingReplacement> {
        let title = self.preferred_title();
        let thumbnail_url = self
            .preferred_thumbnail_time()
            .map(|time| thumbnail_url(thumbnail_api, video_id, time, license));
        if title.is_none() && thumbnail_url.is_none() {
            return None;
        }
        Some(BrandingReplacement {
            title,
            thumbnail_url,
        })
    }
}

/// Replacement branding for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandingReplacement {
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// URL of the rendered DeArrow thumbnail at `time` seconds.
pub fn thumbnail_url(thumbnail_api: &str, video_id: &str, time: f64, license: &str) -> String {
    format!("{thumbnail_api}?videoID={video_id}&time={time}&license={license}")
}
