//! Fuzz test for video id extraction
//!
//! Whatever the input, an extracted id is exactly 11 characters from the
//! YouTube id alphabet and occurs verbatim in the input.
//!
//! Run with: cargo +nightly fuzz run video_id_fuzz -- -max_total_time=60

#![no_main]

use libre_core::extract_video_id;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Some(id) = extract_video_id(input) {
            assert_eq!(id.len(), 11);
            assert!(id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-'));
            assert!(input.contains(id));
        }
    }
});
