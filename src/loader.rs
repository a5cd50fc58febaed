use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::fetcher::{FetchError, Fetcher};
use crate::render::{
    render_feed, render_notice, Notice, RenderOptions, EMPTY_INPUT_HTML, LOADING_HTML,
};
use crate::source::{detect_feed_type, normalize_sources, DetectionMode, FeedSource, FeedType};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to render feed: {0}")]
    Render(#[from] askama::Error),
}

/// The shared markup buffer shown in the page's feed box.
#[derive(Debug, Clone, Default)]
pub struct DisplaySurface {
    content: Arc<RwLock<String>>,
}

impl DisplaySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replace(&self, html: &str) {
        let mut content = self.content.write().await;
        content.clear();
        content.push_str(html);
    }

    pub async fn append(&self, html: &str) {
        self.content.write().await.push_str(html);
    }

    pub async fn snapshot(&self) -> String {
        self.content.read().await.clone()
    }
}

/// Decrements the in-flight counter when a load finishes, however it ends.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FeedLoader {
    fetcher: Fetcher,
    surface: DisplaySurface,
    detection: DetectionMode,
    max_items: usize,
    render: RenderOptions,
    in_flight: Arc<AtomicUsize>,
}

impl FeedLoader {
    pub fn new(fetcher: Fetcher, surface: DisplaySurface, config: &Config) -> Self {
        Self {
            fetcher,
            surface,
            detection: config.feed_detection,
            max_items: config.max_items,
            render: RenderOptions {
                placeholder_image: config.placeholder_image.clone(),
                date_format: config.date_format.clone(),
            },
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &Config, surface: DisplaySurface) -> anyhow::Result<Self> {
        let timeout = config.request_timeout_secs.map(Duration::from_secs);
        let fetcher = Fetcher::new(config.api_endpoint.clone(), timeout)?;
        Ok(Self::new(fetcher, surface, config))
    }

    pub fn surface(&self) -> &DisplaySurface {
        &self.surface
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Replaces the display surface with one block per distinct source.
    ///
    /// Sources are fetched one after another; each block is appended as soon
    /// as it is ready and a failing source never stops the ones after it.
    pub async fn load_feeds<S: AsRef<str>>(&self, raw_urls: &[S]) {
        let _in_flight = InFlight::enter(&self.in_flight);
        self.run(raw_urls).await;
    }

    /// Runs [`FeedLoader::load_feeds`] on a background task. The load counts
    /// as in flight before this returns, so a poll right after it sees
    /// `is_loading() == true`.
    pub fn spawn_load(self: &Arc<Self>, raw_urls: Vec<String>) -> JoinHandle<()> {
        let in_flight = InFlight::enter(&self.in_flight);
        let loader = self.clone();
        tokio::spawn(async move {
            let _in_flight = in_flight;
            loader.run(&raw_urls).await;
        })
    }

    async fn run<S: AsRef<str>>(&self, raw_urls: &[S]) {
        self.surface.replace(LOADING_HTML).await;

        let sources = normalize_sources(raw_urls);
        if sources.is_empty() {
            self.surface.replace(EMPTY_INPUT_HTML).await;
            return;
        }

        info!("Loading {} feeds", sources.len());
        self.surface.replace("").await;
        for source in &sources {
            let block = self.load_source(source).await;
            self.surface.append(&block).await;
        }
        info!("Feed load complete");
    }

    /// Produces the block for a single source. Never fails: errors are
    /// logged and turned into a notice.
    pub async fn load_source(&self, source: &FeedSource) -> String {
        match detect_feed_type(source, self.detection) {
            FeedType::Blogger => match self.load_blogger(source).await {
                Ok(html) => html,
                Err(e) => {
                    error!("Failed to load feed '{}': {}", source, e);
                    Self::notice(Notice::Failed, source)
                }
            },
            FeedType::Unsupported => {
                warn!("Unsupported feed type: {}", source);
                Self::notice(Notice::Unsupported, source)
            }
        }
    }

    async fn load_blogger(&self, source: &FeedSource) -> Result<String, LoadError> {
        let rss_url = source.blogger_feed_url();
        let items = self.fetcher.fetch_items(&rss_url).await?;

        if items.is_empty() {
            info!("No posts for '{}'", source);
            return Ok(render_notice(Notice::NoPosts, source)?);
        }

        let shown = &items[..items.len().min(self.max_items)];
        info!("Rendering {} of {} posts for '{}'", shown.len(), items.len(), source);
        Ok(render_feed(source, shown, &self.render)?)
    }

    fn notice(notice: Notice, source: &FeedSource) -> String {
        render_notice(notice, source).unwrap_or_else(|e| {
            error!("Failed to render notice for '{}': {}", source, e);
            String::new()
        })
    }
}
