//! Editable list of feed sources and the admin checks applied before saving.

use tracing::{info, warn};
use url::Url;

use crate::error::{FetchError, ParseError, RegistryError, StoreError, ValidationError};
use crate::fetcher::Fetcher;
use crate::model::SourceDescriptor;
use crate::parser;
use crate::store::{Snapshot, SourceStore};

/// Canonical form of a feed URL.
///
/// `http` becomes `https`, query and fragment are removed, and a single
/// trailing slash is stripped from the path. The host is lowercased as part
/// of URL parsing.
pub fn normalize_url(raw: &str) -> Result<String, ValidationError> {
    let mut url =
        Url::parse(raw.trim()).map_err(|e| ValidationError::InvalidUrl(format!("{raw}: {e}")))?;

    match url.scheme() {
        "https" => {}
        "http" => url
            .set_scheme("https")
            .map_err(|_| ValidationError::InvalidUrl(raw.to_string()))?,
        other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
    }

    url.set_query(None);
    url.set_fragment(None);

    let path = url.path().to_string();
    if let Some(stripped) = path.strip_suffix('/') {
        url.set_path(stripped);
    }

    Ok(url.to_string())
}

/// What a valid feed told us about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSummary {
    pub title: Option<String>,
    pub entries: usize,
}

/// Accepts a document only if it parses and holds at least one item or entry.
pub fn summarize_feed(bytes: &[u8]) -> Result<FeedSummary, ValidationError> {
    let parsed = parser::parse_xml(bytes, 0).map_err(|e| match e {
        ParseError::NotAFeed => ValidationError::NoEntries,
        other => ValidationError::NotXml(other.to_string()),
    })?;

    if parsed.total_items == 0 {
        return Err(ValidationError::NoEntries);
    }

    Ok(FeedSummary {
        title: parsed.title.filter(|t| !t.is_empty()),
        entries: parsed.total_items,
    })
}

pub async fn validate_feed(fetcher: &Fetcher, url: &str) -> Result<FeedSummary, ValidationError> {
    let bytes = fetcher.fetch_bytes(url).await.map_err(|e| match e {
        FetchError::Status { status, .. } => ValidationError::HttpStatus(status),
        other => ValidationError::Unreachable(other.to_string()),
    })?;

    let summary = summarize_feed(&bytes)?;
    info!(
        "Validated {} ({} entries, title {:?})",
        url, summary.entries, summary.title
    );
    Ok(summary)
}

/// Form input of the admin flow.
#[derive(Debug, Clone, Default)]
pub struct SourceDraft {
    pub name: String,
    pub url: String,
    pub category: String,
}

/// Normalizes and validates a draft, filling a blank name from the feed title.
pub async fn prepare_source(
    fetcher: &Fetcher,
    draft: SourceDraft,
) -> Result<SourceDescriptor, ValidationError> {
    let url = normalize_url(&draft.url)?;
    let summary = match validate_feed(fetcher, &url).await {
        Ok(summary) => summary,
        Err(e) => {
            warn!("Rejected source {}: {}", url, e);
            return Err(e);
        }
    };

    let name = match draft.name.trim() {
        "" => summary.title.unwrap_or_else(|| url.clone()),
        given => given.to_string(),
    };

    Ok(SourceDescriptor {
        name,
        url,
        category: draft.category.trim().to_string(),
        favicon: None,
    })
}

/// In-memory source list plus the revision it was loaded at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
    revision: Option<String>,
}

impl SourceRegistry {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            sources: snapshot.sources,
            revision: snapshot.revision,
        }
    }

    pub async fn load(store: &dyn SourceStore) -> Result<Self, StoreError> {
        let snapshot = store.load().await?;
        info!("Loaded {} sources", snapshot.sources.len());
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn get(&self, index: usize) -> Option<&SourceDescriptor> {
        self.sources.get(index)
    }

    pub fn add(&mut self, source: SourceDescriptor) {
        self.sources.push(source);
    }

    pub fn edit(&mut self, index: usize, source: SourceDescriptor) -> Result<(), RegistryError> {
        let len = self.sources.len();
        let slot = self
            .sources
            .get_mut(index)
            .ok_or(RegistryError::IndexOutOfRange { index, len })?;
        *slot = source;
        Ok(())
    }

    pub fn delete(&mut self, index: usize) -> Result<SourceDescriptor, RegistryError> {
        if index >= self.sources.len() {
            return Err(RegistryError::IndexOutOfRange {
                index,
                len: self.sources.len(),
            });
        }
        Ok(self.sources.remove(index))
    }

    /// Writes the whole list back, tagged with the revision it was loaded at.
    ///
    /// On [`StoreError::Conflict`] nothing is retried: the caller has to
    /// reload, re-apply its change and persist again.
    pub async fn persist(&mut self, store: &dyn SourceStore) -> Result<(), StoreError> {
        let revision = store.save(&self.sources, self.revision.as_deref()).await?;
        self.revision = Some(revision);
        Ok(())
    }
}
