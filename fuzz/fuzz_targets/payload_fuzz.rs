//! Fuzz test for service payload decoding
//!
//! Feeds arbitrary bytes through the SkipSegment and Branding decoders and
//! the helpers built on them, looking for panics.
//!
//! Run with: cargo +nightly fuzz run payload_fuzz -- -max_total_time=60

#![no_main]

use libre_core::{sort_segments, Branding, SkipSegment, DEFAULT_THUMBNAIL_API};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut segments) = serde_json::from_slice::<Vec<SkipSegment>>(data) {
        sort_segments(&mut segments);
        // Sorting must leave starts non-decreasing (NaN sorts last).
        for pair in segments.windows(2) {
            assert!(pair[0].start().total_cmp(&pair[1].start()).is_le());
        }
    }

    if let Ok(branding) = serde_json::from_slice::<Branding>(data) {
        if let Some(title) = branding.preferred_title() {
            // Marker stripping only ever removes characters.
            assert!(title.len() <= branding.titles[0].title.len());
        }
        if let Some(replacement) = branding.replacement(DEFAULT_THUMBNAIL_API, "dQw4w9WgXcQ", "k") {
            assert!(replacement.title.is_some() || replacement.thumbnail_url.is_some());
        }
    }
});
