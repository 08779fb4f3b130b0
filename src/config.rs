use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::model::FeedLocator;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Base URL of the feed-to-JSON proxy
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    /// Where the rendered dashboard is written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub panels: Vec<PanelConfig>,
    pub activity: Option<ActivityConfig>,
    pub registry: Option<RegistryConfig>,
    #[serde(default)]
    pub aggregate: AggregateConfig,
}

fn default_proxy_url() -> String {
    "https://api.rss2json.com/v1/api.json".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_limit() -> usize {
    5
}

/// One article list on the dashboard.
#[derive(Debug, Deserialize, Clone)]
pub struct PanelConfig {
    pub id: String,
    pub label: String,
    /// Local path or remote URL
    pub location: String,
    #[serde(default)]
    pub via_proxy: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub compact: bool,
}

impl PanelConfig {
    pub fn locator(&self) -> FeedLocator {
        FeedLocator::resolve(&self.location, self.via_proxy)
    }
}

/// Feed whose publication dates drive the activity chart.
#[derive(Debug, Deserialize, Clone)]
pub struct ActivityConfig {
    pub location: String,
    #[serde(default)]
    pub via_proxy: bool,
    /// Absent means every item of the feed is counted.
    pub limit: Option<usize>,
}

impl ActivityConfig {
    pub fn locator(&self) -> FeedLocator {
        FeedLocator::resolve(&self.location, self.via_proxy)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RegistryConfig {
    File {
        path: PathBuf,
    },
    Github {
        owner: String,
        repo: String,
        path: String,
        #[serde(default = "default_branch")]
        branch: String,
        #[serde(default = "default_api_base")]
        api_base: String,
        /// Environment variable holding the bearer credential
        #[serde(default = "default_token_env")]
        token_env: String,
    },
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

/// Output of the `aggregate` command: per-category and global RSS files.
#[derive(Debug, Deserialize, Clone)]
pub struct AggregateConfig {
    #[serde(default = "default_aggregate_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_channel_title")]
    pub channel_title: String,
    #[serde(default)]
    pub channel_link: String,
    #[serde(default = "default_channel_description")]
    pub channel_description: String,
}

fn default_aggregate_dir() -> PathBuf {
    PathBuf::from("public/xml")
}

fn default_channel_title() -> String {
    "Feedboard".to_string()
}

fn default_channel_description() -> String {
    "Automatically aggregated feed".to_string()
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            output_dir: default_aggregate_dir(),
            channel_title: default_channel_title(),
            channel_link: String::new(),
            channel_description: default_channel_description(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}
