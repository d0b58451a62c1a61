//! Cache keys for broker requests.
//!
//! A key is a namespace tag followed by the video identifier. Both tags are
//! three bytes long and end in `_`, so two keys built from different
//! (service, identifier) pairs can never collide.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Data service a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// SponsorBlock skip segments.
    SponsorBlock,
    /// DeArrow titles and thumbnails.
    DeArrow,
}

impl Namespace {
    /// Prefix used in the key string.
    pub fn tag(self) -> &'static str {
        match self {
            Self::SponsorBlock => "sb_",
            Self::DeArrow => "da_",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        [Self::SponsorBlock, Self::DeArrow]
            .into_iter()
            .find(|ns| key.starts_with(ns.tag()))
    }
}

/// Logical request key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for `video_id` in `namespace`.
    pub fn new(namespace: Namespace, video_id: &str) -> Self {
        let mut key = String::with_capacity(namespace.tag().len() + video_id.len());
        key.push_str(namespace.tag());
        key.push_str(video_id);
        Self(key)
    }

    /// Key for a SponsorBlock lookup.
    pub fn sponsor_block(video_id: &str) -> Self {
        Self::new(Namespace::SponsorBlock, video_id)
    }

    /// Key for a DeArrow lookup.
    pub fn dearrow(video_id: &str) -> Self {
        Self::new(Namespace::DeArrow, video_id)
    }

    /// Use an arbitrary string as a key.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace encoded in the key, if it carries a known tag.
    pub fn namespace(&self) -> Option<Namespace> {
        Namespace::from_key(&self.0)
    }

    /// Identifier part for namespaced keys.
    pub fn video_id(&self) -> Option<&str> {
        self.namespace().map(|ns| &self.0[ns.tag().len()..])
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self::raw(value)
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self::raw(value)
    }
}

impl From<&CacheKey> for CacheKey {
    fn from(value: &CacheKey) -> Self {
        value.clone()
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn namespace_strategy() -> impl Strategy<Value = Namespace> {
        prop_oneof![Just(Namespace::SponsorBlock), Just(Namespace::DeArrow)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Keys are unique per (service, identifier) pair.
        #[test]
        fn prop_keys_are_injective(
            ns1 in namespace_strategy(),
            ns2 in namespace_strategy(),
            id1 in "[a-zA-Z0-9_-]{0,16}",
            id2 in "[a-zA-Z0-9_-]{0,16}",
        ) {
            let key1 = CacheKey::new(ns1, &id1);
            let key2 = CacheKey::new(ns2, &id2);
            if ns1 == ns2 && id1 == id2 {
                prop_assert_eq!(key1, key2);
            } else {
                prop_assert_ne!(key1, key2);
            }
        }

        #[test]
        fn prop_video_id_is_recovered(
            ns in namespace_strategy(),
            id in "[a-zA-Z0-9_-]{11}",
        ) {
            let key = CacheKey::new(ns, &id);
            prop_assert_eq!(key.namespace(), Some(ns));
            prop_assert_eq!(key.video_id(), Some(id.as_str()));
        }
    }
}
