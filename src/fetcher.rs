use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::error::FetchError;
use crate::model::{FeedLocator, FeedPayload};

/// Retrieves raw feed payloads from disk, the network or the JSON proxy.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    proxy_url: String,
}

impl Fetcher {
    pub fn new(proxy_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Feedboard/1.0 (Feed Dashboard)")
            .build()?;

        Ok(Self::with_client(client, proxy_url))
    }

    pub fn with_client(client: Client, proxy_url: impl Into<String>) -> Self {
        Self {
            client,
            proxy_url: proxy_url.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn fetch(&self, locator: &FeedLocator) -> Result<FeedPayload, FetchError> {
        match locator {
            FeedLocator::Local(path) => {
                debug!("Reading local feed {}", path.display());
                let bytes = tokio::fs::read(path).await.map_err(|source| FetchError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(FeedPayload::Xml(bytes))
            }
            FeedLocator::Remote(url) => {
                let bytes = self.fetch_bytes(url).await?;
                Ok(FeedPayload::Xml(bytes))
            }
            FeedLocator::Proxied(url) => {
                let proxied = self.proxied_url(url);
                let bytes = self.fetch_bytes(&proxied).await?;
                let value = serde_json::from_slice(&bytes).map_err(|source| {
                    FetchError::InvalidJson {
                        location: url.clone(),
                        source,
                    }
                })?;
                Ok(FeedPayload::ProxyJson(value))
            }
        }
    }

    /// `<proxy_url>?rss_url=<feed url, percent-encoded>`
    pub fn proxied_url(&self, feed_url: &str) -> String {
        match Url::parse(&self.proxy_url) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("rss_url", feed_url);
                url.to_string()
            }
            Err(_) => format!(
                "{}?rss_url={}",
                self.proxy_url,
                url::form_urlencoded::byte_serialize(feed_url.as_bytes()).collect::<String>()
            ),
        }
    }

    /// GET a URL, treating any non-2xx answer as [`FetchError::Status`].
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        info!("Fetching feed: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                location: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
