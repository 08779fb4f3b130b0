//! Merges every registered source into per-category and global RSS files.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::AggregateConfig;
use crate::error::SourceError;
use crate::fetcher::Fetcher;
use crate::model::{ArticleRecord, FeedLocator, SourceDescriptor};
use crate::parser;

pub const GLOBAL_FILE: &str = "rss_final.xml";

/// Keeps the first occurrence of each link, in order.
pub fn dedupe_by_link(articles: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|a| seen.insert(a.link.clone()))
        .collect()
}

/// Concatenates every category, deduplicates by link and orders newest first.
///
/// Undated articles go last; ties keep their concatenation order.
pub fn merge_global(groups: &BTreeMap<String, Vec<ArticleRecord>>) -> Vec<ArticleRecord> {
    let all: Vec<ArticleRecord> = groups.values().flatten().cloned().collect();
    let mut unique = dedupe_by_link(all);
    unique.sort_by(|a, b| b.published.cmp(&a.published));
    unique
}

/// Buckets per-source articles by output file, in source order.
///
/// Categories that only differ in case or punctuation share a file, so they
/// share a bucket too.
pub fn group_by_file<I>(per_source: I) -> BTreeMap<String, Vec<ArticleRecord>>
where
    I: IntoIterator<Item = (String, Vec<ArticleRecord>)>,
{
    let mut groups: BTreeMap<String, Vec<ArticleRecord>> = BTreeMap::new();
    for (category, articles) in per_source {
        groups
            .entry(category_file_name(&category))
            .or_default()
            .extend(articles);
    }
    groups
}

/// File name used for one category's feed.
pub fn category_file_name(category: &str) -> String {
    let slug: String = category
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let slug = if slug.is_empty() {
        "uncategorized".to_string()
    } else {
        slug
    };
    format!("flux_{}.xml", slug)
}

/// Renders an RSS 2.0 document stamped with `built_at` as its build date.
pub fn render_rss(
    channel: &AggregateConfig,
    articles: &[ArticleRecord],
    built_at: DateTime<Utc>,
) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<rss version=\"2.0\">\n  <channel>\n");
    xml.push_str(&format!(
        "    <title>{}</title>\n    <link>{}</link>\n    <description>{}</description>\n",
        escape(channel.channel_title.as_str()),
        escape(channel.channel_link.as_str()),
        escape(channel.channel_description.as_str())
    ));
    xml.push_str(&format!(
        "    <lastBuildDate>{}</lastBuildDate>\n",
        built_at.to_rfc2822()
    ));

    for article in articles {
        xml.push_str("    <item>\n");
        xml.push_str(&format!(
            "      <title>{}</title>\n",
            escape(article.title.as_str())
        ));
        xml.push_str(&format!("      <link>{}</link>\n", escape(article.link.as_str())));
        xml.push_str(&format!("      <guid>{}</guid>\n", escape(article.link.as_str())));
        xml.push_str(&format!(
            "      <description>{}</description>\n",
            escape(article.description.as_deref().unwrap_or(""))
        ));
        if let Some(published) = article.published {
            xml.push_str(&format!(
                "      <pubDate>{}</pubDate>\n",
                published.to_rfc2822()
            ));
        }
        xml.push_str("    </item>\n");
    }

    xml.push_str("  </channel>\n</rss>\n");
    xml
}

pub async fn write_rss(
    path: &Path,
    channel: &AggregateConfig,
    articles: &[ArticleRecord],
) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, render_rss(channel, articles, Utc::now())).await
}

#[derive(Debug, Default)]
pub struct AggregateReport {
    pub written: Vec<PathBuf>,
    pub failed_sources: Vec<String>,
    pub total_articles: usize,
}

/// Fetches every source concurrently and writes the grouped feeds.
///
/// A failing source is logged and left out; the others are still written.
pub async fn aggregate_sources(
    fetcher: &Fetcher,
    sources: &[SourceDescriptor],
    config: &AggregateConfig,
) -> anyhow::Result<AggregateReport> {
    let mut tasks = JoinSet::new();
    for (index, source) in sources.iter().cloned().enumerate() {
        let fetcher = fetcher.clone();
        tasks.spawn(async move {
            let result = fetch_source(&fetcher, &source).await;
            (index, source, result)
        });
    }

    let mut report = AggregateReport::default();
    let by_source = collect_fetches(tasks, sources, &mut report).await;
    let groups = group_by_file(by_source.into_values());

    for (file_name, articles) in &groups {
        let path = config.output_dir.join(file_name);
        write_rss(&path, config, articles).await?;
        report.written.push(path);
    }

    let global = merge_global(&groups);
    report.total_articles = global.len();
    let path = config.output_dir.join(GLOBAL_FILE);
    write_rss(&path, config, &global).await?;
    report.written.push(path);

    info!(
        "Aggregated {} articles into {} files",
        report.total_articles,
        report.written.len()
    );
    Ok(report)
}

type FetchOutcome = (usize, SourceDescriptor, Result<Vec<ArticleRecord>, SourceError>);

/// Drains the fetch tasks into per-source results keyed by source index, so
/// the merge does not depend on completion order.
///
/// A task that panicked is reported as a failed source like any other.
async fn collect_fetches(
    mut tasks: JoinSet<FetchOutcome>,
    sources: &[SourceDescriptor],
    report: &mut AggregateReport,
) -> BTreeMap<usize, (String, Vec<ArticleRecord>)> {
    let mut finished = vec![false; sources.len()];
    let mut by_source = BTreeMap::new();

    while let Some(joined) = tasks.join_next().await {
        let (index, source, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Aggregate task aborted: {}", e);
                continue;
            }
        };
        if let Some(done) = finished.get_mut(index) {
            *done = true;
        }

        match result {
            Ok(articles) => {
                info!("Fetched {} articles from '{}'", articles.len(), source.name);
                by_source.insert(index, (source.category, articles));
            }
            Err(e) => {
                error!("Failed to aggregate source '{}': {}", source.name, e);
                report.failed_sources.push(source.name);
            }
        }
    }

    for (source, done) in sources.iter().zip(finished) {
        if !done {
            report.failed_sources.push(source.name.clone());
        }
    }
    by_source
}

async fn fetch_source(
    fetcher: &Fetcher,
    source: &SourceDescriptor,
) -> Result<Vec<ArticleRecord>, SourceError> {
    let payload = fetcher.fetch(&FeedLocator::Remote(source.url.clone())).await?;
    let parsed = parser::parse_payload(&payload, usize::MAX)?;
    Ok(parsed.articles)
}
