//! Persistence of the source list as one whole JSON document.
//!
//! Every write names the revision it was based on; a store refuses the write
//! with [`StoreError::Conflict`] when the document has moved on since.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::RegistryConfig;
use crate::error::StoreError;
use crate::model::SourceDescriptor;

/// The source list together with its integrity token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub sources: Vec<SourceDescriptor>,
    /// `None` when the document does not exist yet.
    pub revision: Option<String>,
}

#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn load(&self) -> Result<Snapshot, StoreError>;

    /// Overwrites the document if it is still at `expected`, returning the new revision.
    async fn save(
        &self,
        sources: &[SourceDescriptor],
        expected: Option<&str>,
    ) -> Result<String, StoreError>;
}

fn encode_sources(sources: &[SourceDescriptor]) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec_pretty(sources)?)
}

fn decode_sources(bytes: &[u8]) -> Result<Vec<SourceDescriptor>, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Decode(e.to_string()))
}

/// Builds the store described by the `[registry]` section.
pub fn open_store(
    config: &RegistryConfig,
    client: Client,
) -> Result<Box<dyn SourceStore>, StoreError> {
    match config {
        RegistryConfig::File { path } => Ok(Box::new(FileStore::new(path.clone()))),
        RegistryConfig::Github {
            owner,
            repo,
            path,
            branch,
            api_base,
            token_env,
        } => {
            let token = std::env::var(token_env)
                .ok()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| StoreError::MissingToken(token_env.clone()))?;
            Ok(Box::new(GitHubStore {
                client,
                api_base: api_base.clone(),
                owner: owner.clone(),
                repo: repo.clone(),
                path: path.clone(),
                branch: branch.clone(),
                token,
            }))
        }
    }
}

/// Source list kept in a local JSON file; the revision is its SHA-256.
///
/// Saves through one store are serialized, and each write lands through a
/// temporary file and a rename, so a reader never sees a partial document.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_current(&self) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn replace_contents(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let staging = self.staging_path();
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: staging.clone(),
                source,
            })?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

pub fn content_revision(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[async_trait]
impl SourceStore for FileStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        match self.read_current().await? {
            Some(bytes) => Ok(Snapshot {
                sources: decode_sources(&bytes)?,
                revision: Some(content_revision(&bytes)),
            }),
            None => Ok(Snapshot::default()),
        }
    }

    async fn save(
        &self,
        sources: &[SourceDescriptor],
        expected: Option<&str>,
    ) -> Result<String, StoreError> {
        // Held across check and write so two saves from the same revision
        // cannot both succeed.
        let _guard = self.write_lock.lock().await;

        let current = self.read_current().await?.map(|b| content_revision(&b));
        if current.as_deref() != expected {
            warn!(
                "Refusing to overwrite {}: revision moved from {:?} to {:?}",
                self.path.display(),
                expected,
                current
            );
            return Err(StoreError::Conflict {
                expected: expected.map(str::to_string),
            });
        }

        let bytes = encode_sources(sources)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        self.replace_contents(&bytes).await?;

        info!("Saved {} sources to {}", sources.len(), self.path.display());
        Ok(content_revision(&bytes))
    }
}

/// Source list stored in a repository, written through the contents API.
pub struct GitHubStore {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    path: String,
    branch: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ContentsFile {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Serialize)]
struct ContentsUpdate<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct ContentsUpdateResponse {
    content: ContentsCommitted,
}

#[derive(Debug, Deserialize)]
struct ContentsCommitted {
    sha: String,
}

const COMMIT_MESSAGE: &str = "Update feed sources";

impl GitHubStore {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        path: impl Into<String>,
        branch: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            owner: owner.into(),
            repo: repo.into(),
            path: path.into(),
            branch: branch.into(),
            token: token.into(),
        }
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo,
            self.path.trim_start_matches('/')
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
    }
}

/// Maps a failed contents API answer onto the store error taxonomy.
pub fn classify_failure(
    status: StatusCode,
    headers: &HeaderMap,
    expected: Option<&str>,
) -> StoreError {
    let rate_limited = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);

    match status {
        StatusCode::UNAUTHORIZED => StoreError::Unauthorized,
        StatusCode::FORBIDDEN if rate_limited => StoreError::RateLimited,
        StatusCode::FORBIDDEN => StoreError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimited,
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Conflict {
            expected: expected.map(str::to_string),
        },
        other => StoreError::Status(other.as_u16()),
    }
}

#[async_trait]
impl SourceStore for GitHubStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        let response = self
            .authorized(self.client.get(self.contents_url()))
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            info!("{} does not exist yet, starting empty", self.path);
            return Ok(Snapshot::default());
        }
        if !status.is_success() {
            return Err(classify_failure(status, response.headers(), None));
        }

        let file: ContentsFile = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        if !file.encoding.is_empty() && file.encoding != "base64" {
            return Err(StoreError::Decode(format!(
                "unsupported content encoding '{}'",
                file.encoding
            )));
        }

        let compact: String = file.content.split_whitespace().collect();
        let bytes = STANDARD
            .decode(compact)
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(Snapshot {
            sources: decode_sources(&bytes)?,
            revision: Some(file.sha),
        })
    }

    async fn save(
        &self,
        sources: &[SourceDescriptor],
        expected: Option<&str>,
    ) -> Result<String, StoreError> {
        let body = ContentsUpdate {
            message: COMMIT_MESSAGE,
            content: STANDARD.encode(encode_sources(sources)?),
            sha: expected,
            branch: &self.branch,
        };

        let response = self
            .authorized(self.client.put(self.contents_url()))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error = classify_failure(status, response.headers(), expected);
            warn!("Saving sources to {} failed: {}", self.path, error);
            return Err(error);
        }

        let updated: ContentsUpdateResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        info!("Saved {} sources to {}", sources.len(), self.path);
        Ok(updated.content.sha)
    }
}
