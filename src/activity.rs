//! Day-bucketed publication histogram for the activity chart.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%MZ", "%Y-%m-%dT%H:%M:%SZ"];

/// Parses the date shapes found in feeds and proxy responses.
///
/// Naive forms are taken as UTC. Returns `None` for anything unrecognized.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Feeds often carry a weekday that does not match the date.
    if let Some((_, rest)) = raw.split_once(", ") {
        if let Ok(dt) = DateTime::parse_from_rfc2822(rest) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub day: NaiveDate,
    pub count: usize,
}

impl DayCount {
    /// `YYYY-MM-DD`
    pub fn label(&self) -> String {
        self.day.format("%Y-%m-%d").to_string()
    }
}

/// Sparse, ascending day -> article count mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityHistogram {
    days: Vec<DayCount>,
}

/// Shape expected by the chart front-end.
#[derive(Debug, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub values: Vec<usize>,
}

impl ActivityHistogram {
    /// Buckets timestamps by UTC calendar day. `None` entries are dropped.
    pub fn from_timestamps<I>(timestamps: I) -> Self
    where
        I: IntoIterator<Item = Option<DateTime<Utc>>>,
    {
        let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for ts in timestamps.into_iter().flatten() {
            *counts.entry(ts.date_naive()).or_insert(0) += 1;
        }

        Self {
            days: counts
                .into_iter()
                .map(|(day, count)| DayCount { day, count })
                .collect(),
        }
    }

    /// Same as [`from_timestamps`](Self::from_timestamps) for raw date strings.
    pub fn from_raw<'a, I>(raw: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::from_timestamps(raw.into_iter().map(parse_timestamp))
    }

    pub fn days(&self) -> &[DayCount] {
        &self.days
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Sum of all counts, i.e. the number of dated articles.
    pub fn total(&self) -> usize {
        self.days.iter().map(|d| d.count).sum()
    }

    pub fn pairs(&self) -> Vec<(String, usize)> {
        self.days.iter().map(|d| (d.label(), d.count)).collect()
    }

    pub fn chart_data(&self) -> ChartData {
        ChartData {
            labels: self.days.iter().map(DayCount::label).collect(),
            values: self.days.iter().map(|d| d.count).collect(),
        }
    }
}

impl fmt::Display for ActivityHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for day in &self.days {
            writeln!(f, "{} {}", day.label(), day.count)?;
        }
        Ok(())
    }
}
