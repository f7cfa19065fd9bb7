//! Metrics events and daily aggregates
//!
//! Events are immutable once logged. `DailyStats` is the derived per-day counter
//! table, updated in the same write as the event that feeds it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A list of videos shown to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationEvent {
    pub event_id: Uuid,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub video_ids: Vec<String>,
}

/// A user opening a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub event_id: Uuid,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub video_id: String,
}

impl RecommendationEvent {
    pub fn new(user_id: &str, video_ids: &[String], timestamp: DateTime<Utc>) -> Result<Self> {
        require("user_id", user_id)?;
        for video_id in video_ids {
            require("video_ids", video_id)?;
        }

        Ok(Self {
            event_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            timestamp,
            video_ids: video_ids.to_vec(),
        })
    }

    /// Number of slots this event fills
    pub fn slots(&self) -> usize {
        self.video_ids.len()
    }
}

impl ClickEvent {
    pub fn new(user_id: &str, video_id: &str, timestamp: DateTime<Utc>) -> Result<Self> {
        require("user_id", user_id)?;
        require("video_id", video_id)?;

        Ok(Self {
            event_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            timestamp,
            video_id: video_id.to_string(),
        })
    }
}

/// Either kind of event, for replay and export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricsEvent {
    Recommendation(RecommendationEvent),
    Click(ClickEvent),
}

impl MetricsEvent {
    pub fn user_id(&self) -> &str {
        match self {
            MetricsEvent::Recommendation(e) => &e.user_id,
            MetricsEvent::Click(e) => &e.user_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MetricsEvent::Recommendation(e) => e.timestamp,
            MetricsEvent::Click(e) => e.timestamp,
        }
    }

    /// Re-check identifiers on events that did not come through the logging calls
    pub fn validate(&self) -> Result<()> {
        match self {
            MetricsEvent::Recommendation(e) => {
                require("user_id", &e.user_id)?;
                e.video_ids.iter().try_for_each(|v| require("video_ids", v))
            }
            MetricsEvent::Click(e) => {
                require("user_id", &e.user_id)?;
                require("video_id", &e.video_id)
            }
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::MissingField { field });
    }
    Ok(())
}

/// Counters for one UTC calendar day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    /// Recommendation slots issued
    pub recommendations: u64,
    pub clicks: u64,
    /// Users that received recommendations
    pub users: BTreeSet<String>,
}

impl DailyStats {
    pub(crate) fn record_recommendation(&mut self, event: &RecommendationEvent) {
        self.recommendations += event.slots() as u64;
        self.users.insert(event.user_id.clone());
    }

    pub(crate) fn record_click(&mut self) {
        self.clicks += 1;
    }

    pub fn unique_users(&self) -> usize {
        self.users.len()
    }

    pub fn ctr(&self) -> f64 {
        ratio(self.clicks, self.recommendations)
    }
}

/// `num / den`, 0 when nothing was issued
pub(crate) fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// UTC day an event is counted under
pub(crate) fn day_of(timestamp: DateTime<Utc>) -> NaiveDate {
    timestamp.date_naive()
}
