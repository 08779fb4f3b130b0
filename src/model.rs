use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNTITLED: &str = "Untitled";

/// One normalized article, whatever feed format it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleRecord {
    pub title: String,
    pub link: String,
    /// `None` when the feed omitted the date or it could not be parsed.
    pub published: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

impl ArticleRecord {
    /// Builds a record, substituting the placeholders for absent fields.
    pub fn from_parts(
        title: Option<String>,
        link: Option<String>,
        published: Option<DateTime<Utc>>,
        description: Option<String>,
    ) -> Self {
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());
        let link = link.map(|l| l.trim().to_string()).unwrap_or_default();
        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Self {
            title,
            link,
            published,
            description,
        }
    }
}

/// An entry of the editable source list (`sources.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub favicon: Option<String>,
}

/// Where a feed lives and how it must be requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLocator {
    Local(PathBuf),
    Remote(String),
    /// A remote feed converted to JSON by the feed-to-JSON proxy.
    Proxied(String),
}

impl FeedLocator {
    /// Picks the locator for a configured location string.
    pub fn resolve(location: &str, via_proxy: bool) -> Self {
        let is_remote = location.starts_with("http://") || location.starts_with("https://");
        match (is_remote, via_proxy) {
            (true, true) => FeedLocator::Proxied(location.to_string()),
            (true, false) => FeedLocator::Remote(location.to_string()),
            (false, _) => FeedLocator::Local(PathBuf::from(location)),
        }
    }
}

impl fmt::Display for FeedLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedLocator::Local(path) => write!(f, "{}", path.display()),
            FeedLocator::Remote(url) => write!(f, "{}", url),
            FeedLocator::Proxied(url) => write!(f, "{} (via proxy)", url),
        }
    }
}

/// Raw fetched content, tagged by declared format.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedPayload {
    Xml(Vec<u8>),
    ProxyJson(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Ok,
    /// Well-formed document with zero items.
    Empty,
    /// The proxy could not deliver the upstream feed.
    Unavailable { reason: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub status: FeedStatus,
    /// Channel title, when the format carries one.
    pub title: Option<String>,
    /// Item count before truncation.
    pub total_items: usize,
    pub articles: Vec<ArticleRecord>,
}
