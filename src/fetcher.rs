use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// One post as returned by the conversion API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeedItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, rename = "pubDate")]
    pub published_at: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl FeedItem {
    /// Thumbnail URL, treating an empty string as absent.
    pub fn thumbnail_or<'a>(&'a self, placeholder: &'a str) -> &'a str {
        match self.thumbnail.as_deref() {
            Some(url) if !url.is_empty() => url,
            _ => placeholder,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConvertedFeed {
    #[serde(default)]
    items: Option<Vec<FeedItem>>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client for an rss2json-style endpoint that turns an RSS URL into JSON.
pub struct Fetcher {
    client: Client,
    endpoint: String,
}

impl Fetcher {
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = Client::builder().user_agent("FeedReader/1.0 (Blog Feed Reader)");
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint.into(),
        })
    }

    /// Fetches the items of `rss_url` through the conversion endpoint.
    ///
    /// The HTTP status is not inspected: whatever body comes back must be a
    /// JSON document, and a document without `items` yields an empty list.
    pub async fn fetch_items(&self, rss_url: &str) -> Result<Vec<FeedItem>, FetchError> {
        debug!("Requesting {} via {}", rss_url, self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("rss_url", rss_url)])
            .send()
            .await?;
        let bytes = response.bytes().await?;

        Self::decode_items(&bytes)
    }

    pub fn decode_items(body: &[u8]) -> Result<Vec<FeedItem>, FetchError> {
        let feed: ConvertedFeed = serde_json::from_slice(body)?;
        Ok(feed.items.unwrap_or_default())
    }
}
