//! Feed source normalization, classification and endpoint derivation.

use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;

const BLOGGER_FEED_SUFFIX: &str = "/feeds/posts/default?alt=rss";
const BLOGGER_MARKERS: [&str; 3] = ["blogspot.", "feeds/posts", "blogger.com"];

/// A user-supplied blog URL, already trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedSource(String);

impl FeedSource {
    /// Returns `None` when the input is blank.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The Blogger RSS endpoint for this source: one trailing slash is
    /// dropped before the fixed feed path is appended.
    pub fn blogger_feed_url(&self) -> String {
        let base = self.0.strip_suffix('/').unwrap_or(&self.0);
        format!("{}{}", base, BLOGGER_FEED_SUFFIX)
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trims, drops blanks and removes exact duplicates, keeping the first
/// occurrence of each URL.
pub fn normalize_sources<S: AsRef<str>>(raw: &[S]) -> Vec<FeedSource> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|entry| FeedSource::parse(entry.as_ref()))
        .filter(|source| seen.insert(source.clone()))
        .collect()
}

/// Splits textarea content into one entry per line.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_string).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedType {
    Blogger,
    Unsupported,
}

/// How sources that carry no Blogger marker are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Unmatched URLs are reported as unsupported.
    #[default]
    Strict,
    /// Every URL is treated as a Blogger blog.
    Lenient,
}

pub fn detect_feed_type(source: &FeedSource, mode: DetectionMode) -> FeedType {
    let url = source.as_str();
    if BLOGGER_MARKERS.iter().any(|marker| url.contains(marker)) {
        return FeedType::Blogger;
    }
    match mode {
        DetectionMode::Strict => FeedType::Unsupported,
        DetectionMode::Lenient => FeedType::Blogger,
    }
}
