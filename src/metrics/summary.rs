//! Read models returned by the metrics store.
//!
//! All owned and serializable; nothing here borrows store state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::events::DailyStats;

/// Per-user CTR with its numerator and denominator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CtrBreakdown {
    /// Distinct recommended videos the user clicked
    pub clicked: u64,
    /// Recommendation slots issued to the user
    pub slots: u64,
    pub ctr: f64,
}

/// Aggregate view of the store over a window of days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Day the window is anchored on
    pub as_of: NaiveDate,
    pub overall: OverallMetrics,
    pub users: UserMetrics,
    /// Keyed by `YYYY-MM-DD`
    pub daily: BTreeMap<String, DayStats>,
    pub top_videos: Vec<VideoClicks>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallMetrics {
    pub ctr: f64,
    pub total_recommendations: u64,
    pub total_clicks: u64,
    /// Sum of each day's distinct users; a user active on two days counts twice
    pub unique_users: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetrics {
    /// Windowed CTR per user
    pub ctr: BTreeMap<String, f64>,
    /// All-time totals per user
    pub engagement: BTreeMap<String, UserEngagement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserEngagement {
    pub recommendations_received: u64,
    pub clicks: u64,
    pub engagement_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayStats {
    pub recommendations: u64,
    pub clicks: u64,
    pub unique_users: u64,
    pub ctr: f64,
}

impl From<&DailyStats> for DayStats {
    fn from(stats: &DailyStats) -> Self {
        Self {
            recommendations: stats.recommendations,
            clicks: stats.clicks,
            unique_users: stats.unique_users() as u64,
            ctr: stats.ctr(),
        }
    }
}

/// One entry of `history()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub stats: DayStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoClicks {
    pub video_id: String,
    pub clicks: u64,
}

/// Outcome of a compaction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionReport {
    pub recommendations_evicted: usize,
    pub clicks_evicted: usize,
    pub users_dropped: usize,
}

impl CompactionReport {
    pub fn is_empty(&self) -> bool {
        self.recommendations_evicted == 0 && self.clicks_evicted == 0
    }
}

/// Sizes of the store's raw logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub users: usize,
    pub recommendation_events: usize,
    pub click_events: usize,
    pub days: usize,
}
