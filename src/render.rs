//! Markup for feed blocks and notices.
//!
//! Everything here is a pure function of its inputs so blocks can be checked
//! without a server or a network.

use std::fmt::Write;

use askama::Template;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::fetcher::FeedItem;
use crate::source::FeedSource;

pub const LOADING_HTML: &str = "<p>Loading feeds...</p>";
pub const EMPTY_INPUT_HTML: &str = "<p>Please enter at least one valid URL.</p>";

const INVALID_DATE: &str = "Invalid Date";

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub placeholder_image: String,
    pub date_format: String,
}

/// Per-source outcomes that render as a one-line notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    NoPosts,
    Failed,
    Unsupported,
}

impl Notice {
    fn lead(self) -> &'static str {
        match self {
            Notice::NoPosts => "No posts found for",
            Notice::Failed => "Failed to load feed for",
            Notice::Unsupported => "Unsupported feed type for",
        }
    }
}

#[derive(Template)]
#[template(source = "<p>{{ lead }} <strong>{{ url|safe }}</strong>.</p>", ext = "html")]
struct NoticeTemplate<'a> {
    lead: &'a str,
    url: &'a str,
}

#[derive(Template)]
#[template(source = "<h3>Feed from {{ url|safe }}</h3>", ext = "html")]
struct HeadingTemplate<'a> {
    url: &'a str,
}

#[derive(Template)]
#[template(path = "feed_card.html")]
struct CardTemplate<'a> {
    thumbnail: &'a str,
    title: &'a str,
    link: &'a str,
    date: String,
}

pub fn render_notice(notice: Notice, source: &FeedSource) -> Result<String, askama::Error> {
    NoticeTemplate {
        lead: notice.lead(),
        url: source.as_str(),
    }
    .render()
}

pub fn render_card(item: &FeedItem, options: &RenderOptions) -> Result<String, askama::Error> {
    CardTemplate {
        thumbnail: item.thumbnail_or(&options.placeholder_image),
        // Untitled posts fall back to their link
        title: item
            .title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .or(item.link.as_deref())
            .unwrap_or_default(),
        link: item.link.as_deref().unwrap_or_default(),
        date: format_date(item.published_at.as_deref(), &options.date_format),
    }
    .render()
}

/// Heading followed by one card per item, in the given order.
pub fn render_feed(
    source: &FeedSource,
    items: &[FeedItem],
    options: &RenderOptions,
) -> Result<String, askama::Error> {
    let mut html = HeadingTemplate {
        url: source.as_str(),
    }
    .render()?;
    for item in items {
        html.push_str(&render_card(item, options)?);
    }
    Ok(html)
}

/// Formats a publication timestamp as a short date. Unparseable input
/// renders as `Invalid Date`.
pub fn format_date(raw: Option<&str>, format: &str) -> String {
    let Some(date) = raw.and_then(parse_date) else {
        return INVALID_DATE.to_string();
    };

    let mut out = String::new();
    if write!(out, "{}", date.format(format)).is_err() {
        // Bad format string in config
        return date.to_string();
    }
    out
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> RenderOptions {
        RenderOptions {
            placeholder_image: "https://via.placeholder.com/65".to_string(),
            date_format: "%-m/%-d/%Y".to_string(),
        }
    }

    fn source(url: &str) -> FeedSource {
        FeedSource::parse(url).unwrap()
    }

    fn item(title: &str) -> FeedItem {
        FeedItem {
            title: Some(title.to_string()),
            link: Some("https://x.blogspot.com/post.html".to_string()),
            published_at: Some("2024-01-15 10:30:00".to_string()),
            thumbnail: None,
        }
    }

    mod notice_tests {
        use super::*;

        #[test]
        fn test_no_posts_notice() {
            let html = render_notice(Notice::NoPosts, &source("https://x.blogspot.com/")).unwrap();
            assert_eq!(html, "<p>No posts found for <strong>https://x.blogspot.com/</strong>.</p>");
        }

        #[test]
        fn test_failed_notice() {
            let html = render_notice(Notice::Failed, &source("https://x.blogspot.com")).unwrap();
            assert_eq!(html, "<p>Failed to load feed for <strong>https://x.blogspot.com</strong>.</p>");
        }

        #[test]
        fn test_unsupported_notice() {
            let html = render_notice(Notice::Unsupported, &source("https://example.com")).unwrap();
            assert_eq!(html, "<p>Unsupported feed type for <strong>https://example.com</strong>.</p>");
        }

        #[test]
        fn test_source_url_is_not_escaped() {
            let html = render_notice(Notice::NoPosts, &source("https://x.blogspot.com/?a=1&b=2")).unwrap();
            assert!(html.contains("<strong>https://x.blogspot.com/?a=1&b=2</strong>"));
        }
    }

    mod card_tests {
        use super::*;

        #[test]
        fn test_card_contents() {
            let html = render_card(&item("First Post"), &options()).unwrap();
            assert!(html.contains(r#"<div class="feed-item">"#));
            assert!(html.contains(r#"<img src="https://via.placeholder.com/65" alt="Thumbnail" />"#));
            assert!(html.contains(r#"target="_blank" rel="noopener noreferrer">First Post</a>"#));
            assert!(html.contains("<small>1/15/2024</small>"));
        }

        #[test]
        fn test_card_uses_thumbnail_when_present() {
            let mut post = item("Pictured");
            post.thumbnail = Some("https://img.example.com/p.jpg".to_string());
            let html = render_card(&post, &options()).unwrap();
            assert!(html.contains("https://img.example.com/p.jpg"));
            assert!(!html.contains("via.placeholder.com"));
        }

        #[test]
        fn test_card_escapes_remote_title() {
            let html = render_card(&item("<script>alert(1)</script>"), &options()).unwrap();
            assert!(!html.contains("<script>"));
            assert!(html.contains("&lt;script&gt;"));
        }

        fn anchor_text(html: &str) -> &str {
            let start = html.find(r#"noreferrer">"#).unwrap() + r#"noreferrer">"#.len();
            let end = start + html[start..].find("</a>").unwrap();
            &html[start..end]
        }

        #[test]
        fn test_untitled_card_shows_link() {
            let mut post = item("");
            post.title = None;
            let html = render_card(&post, &options()).unwrap();
            let text = anchor_text(&html);
            assert!(text.contains("x.blogspot.com"));
            assert!(text.contains("post.html"));
        }

        #[test]
        fn test_blank_title_shows_link() {
            let html = render_card(&item("   "), &options()).unwrap();
            assert!(anchor_text(&html).contains("post.html"));
        }

        #[test]
        fn test_card_without_date() {
            let mut post = item("Undated");
            post.published_at = None;
            let html = render_card(&post, &options()).unwrap();
            assert!(html.contains("<small>Invalid Date</small>"));
        }
    }

    mod feed_tests {
        use super::*;

        #[test]
        fn test_heading_precedes_cards_in_order() {
            let items = vec![item("Alpha"), item("Beta"), item("Gamma")];
            let html = render_feed(&source("https://x.blogspot.com"), &items, &options()).unwrap();

            assert!(html.starts_with("<h3>Feed from https://x.blogspot.com</h3>"));
            let alpha = html.find("Alpha").unwrap();
            let beta = html.find("Beta").unwrap();
            let gamma = html.find("Gamma").unwrap();
            assert!(alpha < beta && beta < gamma);
            assert_eq!(html.matches(r#"class="feed-item""#).count(), 3);
        }
    }

    mod date_tests {
        use super::*;

        const FMT: &str = "%-m/%-d/%Y";

        #[test]
        fn test_converter_format() {
            assert_eq!(format_date(Some("2024-01-15 10:30:00"), FMT), "1/15/2024");
        }

        #[test]
        fn test_rfc2822() {
            assert_eq!(format_date(Some("Mon, 09 Dec 2024 12:00:00 GMT"), FMT), "12/9/2024");
        }

        #[test]
        fn test_rfc3339_keeps_its_offset() {
            assert_eq!(format_date(Some("2024-03-01T23:30:00-05:00"), FMT), "3/1/2024");
        }

        #[test]
        fn test_date_only() {
            assert_eq!(format_date(Some("2023-07-04"), FMT), "7/4/2023");
        }

        #[test]
        fn test_garbage_is_invalid_date() {
            assert_eq!(format_date(Some("yesterday"), FMT), "Invalid Date");
            assert_eq!(format_date(None, FMT), "Invalid Date");
        }

        #[test]
        fn test_custom_format() {
            assert_eq!(format_date(Some("2024-01-15 10:30:00"), "%Y-%m-%d"), "2024-01-15");
        }
    }
}
