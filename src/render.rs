use std::path::{Path, PathBuf};

use askama::Template;

use crate::activity::ActivityHistogram;
use crate::dashboard::{DashboardSink, PanelOutcome, PanelState};
use crate::model::ArticleRecord;

pub struct ArticleView {
    pub title: String,
    pub link: String,
    pub date: String,
    pub description: Option<String>,
}

impl From<&ArticleRecord> for ArticleView {
    fn from(article: &ArticleRecord) -> Self {
        Self {
            title: article.title.clone(),
            link: article.link.clone(),
            date: article
                .published
                .map(|p| p.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            description: article.description.clone(),
        }
    }
}

pub struct PanelView {
    pub id: String,
    pub label: String,
    pub compact: bool,
    pub articles: Vec<ArticleView>,
    pub notice: Option<String>,
    pub notice_class: &'static str,
}

impl From<&PanelOutcome> for PanelView {
    fn from(outcome: &PanelOutcome) -> Self {
        let (articles, notice, notice_class) = match &outcome.state {
            PanelState::Articles(articles) => (articles.iter().map(ArticleView::from).collect(), None, ""),
            PanelState::Empty => (Vec::new(), Some("No articles".to_string()), "notice-empty"),
            PanelState::Unavailable(reason) => {
                let mut message = format!("Unable to load source: {}", outcome.label);
                if let Some(reason) = reason {
                    message.push_str(&format!(" ({})", reason));
                }
                (Vec::new(), Some(message), "notice-error")
            }
            PanelState::Failed(error) => (
                Vec::new(),
                Some(format!("Failed to load {}: {}", outcome.label, error)),
                "notice-error",
            ),
        };

        Self {
            id: outcome.id.clone(),
            label: outcome.label.clone(),
            compact: outcome.compact,
            articles,
            notice,
            notice_class,
        }
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub title: String,
    pub panels: Vec<PanelView>,
    pub activity_json: String,
}

/// Static HTML rendition of the dashboard.
pub struct HtmlDashboard {
    title: String,
    panels: Vec<Option<PanelOutcome>>,
    activity: ActivityHistogram,
}

impl HtmlDashboard {
    pub fn new(title: impl Into<String>, panel_count: usize) -> Self {
        Self {
            title: title.into(),
            panels: vec![None; panel_count],
            activity: ActivityHistogram::default(),
        }
    }

    pub fn activity(&self) -> &ActivityHistogram {
        &self.activity
    }

    pub fn activity_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.activity.chart_data())
    }

    /// Panels in configuration order, whatever order they finished in.
    pub fn render(&self) -> anyhow::Result<String> {
        let template = DashboardTemplate {
            title: self.title.clone(),
            panels: self.panels.iter().flatten().map(PanelView::from).collect(),
            activity_json: self.activity_json()?,
        };
        Ok(template.render()?)
    }

    /// Writes `index.html` and `activity.json` into `dir`.
    pub async fn write_to(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(dir).await?;

        let index = dir.join("index.html");
        tokio::fs::write(&index, self.render()?).await?;

        let activity = dir.join("activity.json");
        tokio::fs::write(&activity, self.activity_json()?).await?;

        Ok(vec![index, activity])
    }
}

impl DashboardSink for HtmlDashboard {
    fn panel_loaded(&mut self, outcome: PanelOutcome) {
        let position = outcome.position;
        if position >= self.panels.len() {
            self.panels.resize(position + 1, None);
        }
        self.panels[position] = Some(outcome);
    }

    fn activity_ready(&mut self, histogram: ActivityHistogram) {
        self.activity = histogram;
    }
}
