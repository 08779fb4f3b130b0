//! Loads every configured panel independently and hands results to a sink.

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::activity::ActivityHistogram;
use crate::config::{ActivityConfig, Config, PanelConfig};
use crate::error::SourceError;
use crate::fetcher::Fetcher;
use crate::model::{ArticleRecord, FeedLocator, FeedStatus, ParsedFeed};
use crate::parser;

#[derive(Debug, Clone, PartialEq)]
pub enum PanelState {
    Articles(Vec<ArticleRecord>),
    /// Feed is fine but has nothing to show.
    Empty,
    /// The proxy could not reach the upstream feed.
    Unavailable(Option<String>),
    /// Fetch or parse failure.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelOutcome {
    /// Index of the panel in the configuration.
    pub position: usize,
    pub id: String,
    pub label: String,
    pub compact: bool,
    pub state: PanelState,
}

/// Rendering surface the loader writes into.
///
/// Panels arrive in completion order, not configuration order.
pub trait DashboardSink {
    fn panel_loaded(&mut self, outcome: PanelOutcome);
    fn activity_ready(&mut self, histogram: ActivityHistogram);
}

/// Sink that only records what it receives.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub panels: Vec<PanelOutcome>,
    pub activity: Option<ActivityHistogram>,
}

impl DashboardSink for CollectingSink {
    fn panel_loaded(&mut self, outcome: PanelOutcome) {
        self.panels.push(outcome);
    }

    fn activity_ready(&mut self, histogram: ActivityHistogram) {
        self.activity = Some(histogram);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub empty: usize,
    pub unavailable: usize,
    pub failed: usize,
}

async fn load_records(
    fetcher: &Fetcher,
    locator: &FeedLocator,
    limit: usize,
) -> Result<ParsedFeed, SourceError> {
    let payload = fetcher.fetch(locator).await?;
    Ok(parser::parse_payload(&payload, limit)?)
}

fn panel_state(result: Result<ParsedFeed, SourceError>) -> PanelState {
    match result {
        Ok(parsed) => match parsed.status {
            FeedStatus::Ok => PanelState::Articles(parsed.articles),
            FeedStatus::Empty => PanelState::Empty,
            FeedStatus::Unavailable { reason } => PanelState::Unavailable(reason),
        },
        Err(e) => PanelState::Failed(e.to_string()),
    }
}

/// Fetches all panels concurrently; one failure never stops the others.
pub async fn load_panels(
    fetcher: &Fetcher,
    panels: &[PanelConfig],
    sink: &mut dyn DashboardSink,
) -> LoadSummary {
    let mut tasks = JoinSet::new();
    for (position, panel) in panels.iter().cloned().enumerate() {
        let fetcher = fetcher.clone();
        tasks.spawn(async move {
            let result = load_records(&fetcher, &panel.locator(), panel.limit).await;
            PanelOutcome {
                position,
                id: panel.id,
                label: panel.label,
                compact: panel.compact,
                state: panel_state(result),
            }
        });
    }

    let mut summary = LoadSummary::default();
    while let Some(joined) = tasks.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Panel task aborted: {}", e);
                summary.failed += 1;
                continue;
            }
        };

        match &outcome.state {
            PanelState::Articles(articles) => {
                info!("Panel '{}' loaded {} articles", outcome.id, articles.len());
                summary.loaded += 1;
            }
            PanelState::Empty => {
                info!("Panel '{}' has no articles", outcome.id);
                summary.empty += 1;
            }
            PanelState::Unavailable(reason) => {
                warn!("Panel '{}' source unavailable: {:?}", outcome.id, reason);
                summary.unavailable += 1;
            }
            PanelState::Failed(message) => {
                error!("Panel '{}' failed: {}", outcome.id, message);
                summary.failed += 1;
            }
        }
        sink.panel_loaded(outcome);
    }

    summary
}

/// Histogram of the activity feed's publication days.
pub async fn load_activity(
    fetcher: &Fetcher,
    config: &ActivityConfig,
) -> Result<ActivityHistogram, SourceError> {
    let parsed = load_records(fetcher, &config.locator(), config.limit.unwrap_or(usize::MAX)).await?;
    Ok(ActivityHistogram::from_timestamps(
        parsed.articles.iter().map(|a| a.published),
    ))
}

/// Loads panels and the activity chart side by side.
pub async fn build_dashboard(
    fetcher: &Fetcher,
    config: &Config,
    sink: &mut dyn DashboardSink,
) -> LoadSummary {
    let activity = async {
        match &config.activity {
            Some(activity) => Some(load_activity(fetcher, activity).await),
            None => None,
        }
    };
    let (summary, activity) = tokio::join!(load_panels(fetcher, &config.panels, sink), activity);

    match activity {
        Some(Ok(histogram)) => {
            info!("Activity chart covers {} days", histogram.days().len());
            sink.activity_ready(histogram);
        }
        Some(Err(e)) => error!("Activity feed failed: {}", e),
        None => {}
    }

    summary
}
