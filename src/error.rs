use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain a feed payload at all.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{location} answered with HTTP {status}")]
    Status { location: String, status: u16 },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{location} did not return valid JSON: {source}")]
    InvalidJson {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A payload arrived but is not a structurally valid feed.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML: {0}")]
    Xml(String),

    /// Well-formed XML whose root is not `rss`, `feed` or `RDF`.
    #[error("document is not a feed")]
    NotAFeed,

    #[error("malformed feed document: {0}")]
    Feed(#[from] feed_rs::parser::ParseFeedError),

    #[error("unexpected proxy response: {0}")]
    Proxy(#[source] serde_json::Error),
}

/// Reasons a candidate source is refused by the admin flow.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("HTTP error {0}")]
    HttpStatus(u16),

    #[error("feed is unreachable: {0}")]
    Unreachable(String),

    #[error("content is not valid XML: {0}")]
    NotXml(String),

    #[error("feed is reachable but contains no entries")]
    NoEntries,
}

/// Failures of the source list's backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("source list changed remotely since it was loaded (expected revision {expected:?})")]
    Conflict { expected: Option<String> },

    #[error("credential rejected by the content store")]
    Unauthorized,

    #[error("content store rate limit exceeded")]
    RateLimited,

    #[error("content store answered with HTTP {0}")]
    Status(u16),

    #[error("no credential found in environment variable {0}")]
    MissingToken(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("cannot decode source list: {0}")]
    Decode(String),

    #[error("cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize source list: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no source at index {index} (registry holds {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Per-source failure while loading a panel: either stage may fail.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}
