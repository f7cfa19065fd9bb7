//! Metrics Store
//!
//! Append-only recommendation and click logs per user, plus the daily aggregate
//! table derived from them. Every append and its counter update happen under one
//! write lock, so concurrent logging never loses an increment.
//!
//! Two kinds of window are used, matching how the numbers are kept:
//! - per-user CTR reads raw events, so its window is a timestamp cutoff (`now - window`)
//! - overall CTR, `summary` and `top_videos` read per-day data, so a day is in the
//!   window when `today - day <= window`

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::events::{day_of, ratio, ClickEvent, DailyStats, MetricsEvent, RecommendationEvent};
use super::summary::{
    CompactionReport, CtrBreakdown, DayRecord, DayStats, MetricsSummary, OverallMetrics,
    StoreStats, UserEngagement, UserMetrics, VideoClicks,
};
use crate::error::Result;

/// Number of entries in `MetricsSummary::top_videos`
pub const TOP_VIDEOS: usize = 10;

#[derive(Debug, Default)]
struct State {
    recommendations: BTreeMap<String, Vec<RecommendationEvent>>,
    clicks: BTreeMap<String, Vec<ClickEvent>>,
    daily: BTreeMap<NaiveDate, DailyStats>,
}

impl State {
    fn apply_recommendation(&mut self, event: RecommendationEvent) {
        self.daily
            .entry(day_of(event.timestamp))
            .or_default()
            .record_recommendation(&event);
        self.recommendations
            .entry(event.user_id.clone())
            .or_default()
            .push(event);
    }

    fn apply_click(&mut self, event: ClickEvent) {
        self.daily
            .entry(day_of(event.timestamp))
            .or_default()
            .record_click();
        self.clicks.entry(event.user_id.clone()).or_default().push(event);
    }

    fn apply(&mut self, event: MetricsEvent) {
        match event {
            MetricsEvent::Recommendation(e) => self.apply_recommendation(e),
            MetricsEvent::Click(e) => self.apply_click(e),
        }
    }

    fn user_ids(&self) -> BTreeSet<&str> {
        self.recommendations
            .keys()
            .chain(self.clicks.keys())
            .map(String::as_str)
            .collect()
    }

    fn ctr_breakdown(&self, user_id: &str, cutoff: Option<DateTime<Utc>>) -> CtrBreakdown {
        let in_window = |ts: DateTime<Utc>| cutoff.map_or(true, |c| ts >= c);

        let mut slots = 0u64;
        let mut recommended: HashSet<&str> = HashSet::new();
        for event in self
            .recommendations
            .get(user_id)
            .into_iter()
            .flatten()
            .filter(|e| in_window(e.timestamp))
        {
            slots += event.slots() as u64;
            recommended.extend(event.video_ids.iter().map(String::as_str));
        }

        let clicked: HashSet<&str> = self
            .clicks
            .get(user_id)
            .into_iter()
            .flatten()
            .filter(|c| in_window(c.timestamp) && recommended.contains(c.video_id.as_str()))
            .map(|c| c.video_id.as_str())
            .collect();

        let clicked = clicked.len() as u64;
        CtrBreakdown {
            clicked,
            slots,
            ctr: ratio(clicked, slots),
        }
    }
}

/// Earliest timestamp inside `window`; `None` when unbounded or past the
/// representable range
fn window_start(now: DateTime<Utc>, window: Option<Duration>) -> Option<DateTime<Utc>> {
    window.and_then(|w| now.checked_sub_signed(w))
}

fn day_in_window(today: NaiveDate, day: NaiveDate, window: Option<Duration>) -> bool {
    window.map_or(true, |w| today.signed_duration_since(day) <= w)
}

/// Serializable copy of the whole store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub recommendations: Vec<RecommendationEvent>,
    pub clicks: Vec<ClickEvent>,
    /// Kept separately: compaction may have evicted the raw events behind a day
    pub daily: BTreeMap<NaiveDate, DailyStats>,
}

/// Recommendation/click metrics store
#[derive(Debug)]
pub struct MetricsStore {
    clock: Arc<dyn Clock>,
    state: RwLock<State>,
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: RwLock::new(State::default()),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ========================================================================
    // Logging
    // ========================================================================

    /// Record that `video_ids` were shown to `user_id`. An empty list is a valid
    /// (cold-start) response and is still recorded.
    pub fn log_recommendation(&self, user_id: &str, video_ids: &[String]) -> Result<Uuid> {
        let event = RecommendationEvent::new(user_id, video_ids, self.clock.now())?;
        let event_id = event.event_id;
        let slots = event.slots();

        self.state.write().apply_recommendation(event);

        ::metrics::counter!("vidrec_recommendation_slots_total").increment(slots as u64);
        debug!("Logged {} recommendation slots for user {}", slots, user_id);
        Ok(event_id)
    }

    /// Record a click. Whether the video was ever recommended is not checked.
    pub fn log_click(&self, user_id: &str, video_id: &str) -> Result<Uuid> {
        let event = ClickEvent::new(user_id, video_id, self.clock.now())?;
        let event_id = event.event_id;

        self.state.write().apply_click(event);

        ::metrics::counter!("vidrec_clicks_total").increment(1);
        debug!("Logged click on {} by user {}", video_id, user_id);
        Ok(event_id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Distinct clicked-and-recommended videos over recommendation slots, for
    /// events at or after `now - window` (all-time when `None`).
    pub fn user_ctr(&self, user_id: &str, window: Option<Duration>) -> f64 {
        self.user_ctr_breakdown(user_id, window).ctr
    }

    pub fn user_ctr_breakdown(&self, user_id: &str, window: Option<Duration>) -> CtrBreakdown {
        let cutoff = window_start(self.clock.now(), window);
        self.state.read().ctr_breakdown(user_id, cutoff)
    }

    /// Total clicks over total slots for the days in the window
    pub fn overall_ctr(&self, window: Option<Duration>) -> f64 {
        let today = self.clock.today();
        let state = self.state.read();

        let (clicks, slots) = state
            .daily
            .iter()
            .filter(|(day, _)| day_in_window(today, **day, window))
            .fold((0u64, 0u64), |(c, s), (_, stats)| {
                (c + stats.clicks, s + stats.recommendations)
            });

        ratio(clicks, slots)
    }

    pub fn summary(&self, window: Option<Duration>) -> MetricsSummary {
        let now = self.clock.now();
        let today = now.date_naive();
        let cutoff = window_start(now, window);
        let state = self.state.read();

        let mut overall = OverallMetrics::default();
        let mut daily = BTreeMap::new();
        for (day, stats) in state
            .daily
            .iter()
            .filter(|(day, _)| day_in_window(today, **day, window))
        {
            overall.total_recommendations += stats.recommendations;
            overall.total_clicks += stats.clicks;
            overall.unique_users += stats.unique_users() as u64;
            daily.insert(day.format("%Y-%m-%d").to_string(), DayStats::from(stats));
        }
        overall.ctr = ratio(overall.total_clicks, overall.total_recommendations);

        let mut users = UserMetrics::default();
        for (user_id, events) in &state.recommendations {
            users
                .ctr
                .insert(user_id.clone(), state.ctr_breakdown(user_id, cutoff).ctr);

            let received: u64 = events.iter().map(|e| e.slots() as u64).sum();
            let clicks = state.clicks.get(user_id).map_or(0, Vec::len) as u64;
            users.engagement.insert(
                user_id.clone(),
                UserEngagement {
                    recommendations_received: received,
                    clicks,
                    engagement_rate: ratio(clicks, received),
                },
            );
        }

        let mut video_clicks: HashMap<&str, u64> = HashMap::new();
        for click in state
            .clicks
            .values()
            .flatten()
            .filter(|c| day_in_window(today, day_of(c.timestamp), window))
        {
            *video_clicks.entry(click.video_id.as_str()).or_default() += 1;
        }
        let mut top_videos: Vec<VideoClicks> = video_clicks
            .into_iter()
            .map(|(video_id, clicks)| VideoClicks {
                video_id: video_id.to_string(),
                clicks,
            })
            .collect();
        top_videos.sort_by(|a, b| {
            b.clicks
                .cmp(&a.clicks)
                .then_with(|| a.video_id.cmp(&b.video_id))
        });
        top_videos.truncate(TOP_VIDEOS);

        MetricsSummary {
            as_of: today,
            overall,
            users,
            daily,
            top_videos,
        }
    }

    /// One record per day with at least one event, oldest first
    pub fn history(&self) -> Vec<DayRecord> {
        self.state
            .read()
            .daily
            .iter()
            .map(|(day, stats)| DayRecord {
                date: *day,
                stats: DayStats::from(stats),
            })
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.read();
        StoreStats {
            users: state.user_ids().len(),
            recommendation_events: state.recommendations.values().map(Vec::len).sum(),
            click_events: state.clicks.values().map(Vec::len).sum(),
            days: state.daily.len(),
        }
    }

    /// All retained raw events, oldest first
    pub fn events(&self) -> Vec<MetricsEvent> {
        let state = self.state.read();
        let mut events: Vec<MetricsEvent> = state
            .recommendations
            .values()
            .flatten()
            .cloned()
            .map(MetricsEvent::Recommendation)
            .chain(state.clicks.values().flatten().cloned().map(MetricsEvent::Click))
            .collect();
        events.sort_by_key(MetricsEvent::timestamp);
        events
    }

    // ========================================================================
    // Retention
    // ========================================================================

    /// Evict raw events older than `now - retain`. Daily aggregates are kept, so
    /// `history` and date-windowed totals are unaffected; per-user figures only see
    /// what is left. Users with no remaining events are dropped.
    pub fn compact(&self, retain: Duration) -> CompactionReport {
        // A retention reaching past the representable range keeps everything
        let Some(cutoff) = self.clock.now().checked_sub_signed(retain) else {
            return CompactionReport::default();
        };
        let mut state = self.state.write();
        let users_before = state.user_ids().len();

        let mut report = CompactionReport::default();
        state.recommendations.retain(|_, events| {
            let before = events.len();
            events.retain(|e| e.timestamp >= cutoff);
            report.recommendations_evicted += before - events.len();
            !events.is_empty()
        });
        state.clicks.retain(|_, events| {
            let before = events.len();
            events.retain(|e| e.timestamp >= cutoff);
            report.clicks_evicted += before - events.len();
            !events.is_empty()
        });
        report.users_dropped = users_before - state.user_ids().len();

        if !report.is_empty() {
            info!(
                "Compacted metrics: {} recommendation events, {} clicks evicted, {} users dropped",
                report.recommendations_evicted, report.clicks_evicted, report.users_dropped
            );
        }
        report
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.read();
        MetricsSnapshot {
            recommendations: state.recommendations.values().flatten().cloned().collect(),
            clicks: state.clicks.values().flatten().cloned().collect(),
            daily: state.daily.clone(),
        }
    }

    /// Restore a store from a snapshot, keeping its daily table as-is
    pub fn from_snapshot(snapshot: MetricsSnapshot, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut state = State::default();
        for event in snapshot.recommendations {
            MetricsEvent::Recommendation(event.clone()).validate()?;
            state
                .recommendations
                .entry(event.user_id.clone())
                .or_default()
                .push(event);
        }
        for event in snapshot.clicks {
            MetricsEvent::Click(event.clone()).validate()?;
            state.clicks.entry(event.user_id.clone()).or_default().push(event);
        }
        state.daily = snapshot.daily;

        Ok(Self {
            clock,
            state: RwLock::new(state),
        })
    }

    /// Rebuild logs and aggregates from raw events
    pub fn replay<I>(events: I, clock: Arc<dyn Clock>) -> Result<Self>
    where
        I: IntoIterator<Item = MetricsEvent>,
    {
        let mut state = State::default();
        for event in events {
            event.validate()?;
            state.apply(event);
        }

        Ok(Self {
            clock,
            state: RwLock::new(state),
        })
    }

    /// Write the snapshot as JSON, replacing `path` atomically
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(&self.snapshot())?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load_snapshot(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let raw = std::fs::read(path)?;
        let snapshot: MetricsSnapshot = serde_json::from_slice(&raw)?;
        Self::from_snapshot(snapshot, clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::metrics::clock::ManualClock;
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap(),
        ))
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_user_ctr_distinct_clicks_over_slots() {
        let store = MetricsStore::with_clock(clock());
        store.log_recommendation("bob", &ids(&["v1", "v2"])).unwrap();
        store.log_click("bob", "v1").unwrap();

        assert!((store.user_ctr("bob", None) - 0.5).abs() < 1e-12);

        // Repeat clicks on the same video and clicks on unrecommended videos don't count
        store.log_click("bob", "v1").unwrap();
        store.log_click("bob", "v9").unwrap();
        let breakdown = store.user_ctr_breakdown("bob", None);
        assert_eq!((breakdown.clicked, breakdown.slots), (1, 2));

        assert_eq!(store.user_ctr("nobody", None), 0.0);
    }

    #[test]
    fn test_user_ctr_window_uses_timestamps() {
        let clock = clock();
        let store = MetricsStore::with_clock(clock.clone());
        store.log_recommendation("bob", &ids(&["v1", "v2"])).unwrap();
        store.log_click("bob", "v1").unwrap();

        clock.advance(Duration::hours(3));
        store.log_recommendation("bob", &ids(&["v3", "v4"])).unwrap();

        let recent = store.user_ctr_breakdown("bob", Some(Duration::hours(1)));
        assert_eq!((recent.clicked, recent.slots), (0, 2));

        let all = store.user_ctr_breakdown("bob", None);
        assert_eq!((all.clicked, all.slots), (1, 4));
    }

    #[test]
    fn test_overall_ctr_window_uses_days() {
        let clock = clock();
        let store = MetricsStore::with_clock(clock.clone());
        store.log_recommendation("a", &ids(&["v1", "v2", "v3", "v4"])).unwrap();

        clock.advance(Duration::days(2));
        store.log_recommendation("a", &ids(&["v5", "v6"])).unwrap();
        store.log_click("a", "v5").unwrap();

        assert!((store.overall_ctr(Some(Duration::days(1))) - 0.5).abs() < 1e-12);
        assert!((store.overall_ctr(None) - 1.0 / 6.0).abs() < 1e-12);
        // Two days back is inside a 2-day window
        assert!((store.overall_ctr(Some(Duration::days(2))) - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_history_omits_idle_days() {
        let clock = clock();
        let store = MetricsStore::with_clock(clock.clone());
        store.log_recommendation("a", &ids(&["v1"])).unwrap();

        clock.advance(Duration::days(2));
        store.log_click("b", "v1").unwrap();

        let history = store.history();
        let days: Vec<String> = history.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(days, vec!["2024-05-10", "2024-05-12"]);

        // A click-only day still gets a record
        assert_eq!(history[1].stats.clicks, 1);
        assert_eq!(history[1].stats.recommendations, 0);
        assert_eq!(history[1].stats.ctr, 0.0);
    }

    #[test]
    fn test_summary_contents() {
        let clock = clock();
        let store = MetricsStore::with_clock(clock.clone());
        store.log_recommendation("alice", &ids(&["v1", "v2"])).unwrap();
        store.log_recommendation("bob", &ids(&["v1", "v3"])).unwrap();
        store.log_click("alice", "v1").unwrap();
        store.log_click("bob", "v1").unwrap();
        store.log_click("bob", "v3").unwrap();

        clock.advance(Duration::days(1));
        store.log_recommendation("alice", &ids(&["v4"])).unwrap();

        let summary = store.summary(None);
        assert_eq!(summary.as_of.to_string(), "2024-05-11");
        assert_eq!(summary.overall.total_recommendations, 5);
        assert_eq!(summary.overall.total_clicks, 3);
        // alice counted on both days
        assert_eq!(summary.overall.unique_users, 3);
        assert!((summary.overall.ctr - 0.6).abs() < 1e-12);

        assert!((summary.users.ctr["alice"] - 1.0 / 3.0).abs() < 1e-12);
        assert!((summary.users.ctr["bob"] - 1.0).abs() < 1e-12);
        let alice = &summary.users.engagement["alice"];
        assert_eq!(alice.recommendations_received, 3);
        assert_eq!(alice.clicks, 1);

        assert_eq!(summary.daily.len(), 2);
        assert_eq!(summary.daily["2024-05-10"].unique_users, 2);

        assert_eq!(summary.top_videos[0].video_id, "v1");
        assert_eq!(summary.top_videos[0].clicks, 2);
        assert_eq!(summary.top_videos[1].video_id, "v3");

        let today_only = store.summary(Some(Duration::hours(12)));
        assert_eq!(today_only.daily.len(), 1);
        assert_eq!(today_only.overall.total_recommendations, 1);
        assert!(today_only.top_videos.is_empty());
    }

    #[test]
    fn test_summary_is_repeatable() {
        let store = MetricsStore::with_clock(clock());
        store.log_recommendation("alice", &ids(&["v1", "v2"])).unwrap();
        store.log_click("alice", "v2").unwrap();

        let first = store.summary(Some(Duration::days(7)));
        let second = store.summary(Some(Duration::days(7)));
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_invalid_log_leaves_state_untouched() {
        let store = MetricsStore::with_clock(clock());
        store.log_recommendation("bob", &ids(&["v1"])).unwrap();
        let before = store.snapshot();

        let err = store.log_recommendation("", &ids(&["v2"])).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "user_id" }));
        assert!(store.log_click("bob", " ").is_err());

        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_compaction_keeps_daily_aggregates() {
        let clock = clock();
        let store = MetricsStore::with_clock(clock.clone());
        store.log_recommendation("old", &ids(&["v1", "v2"])).unwrap();
        store.log_click("old", "v1").unwrap();

        clock.advance(Duration::days(10));
        store.log_recommendation("new", &ids(&["v3"])).unwrap();

        let history_before = store.history();
        let report = store.compact(Duration::days(7));

        assert_eq!(report.recommendations_evicted, 1);
        assert_eq!(report.clicks_evicted, 1);
        assert_eq!(report.users_dropped, 1);
        assert_eq!(store.history(), history_before);
        assert_eq!(store.stats().users, 1);
        assert!(!store.summary(None).users.ctr.contains_key("old"));

        // Nothing left to evict
        assert!(store.compact(Duration::days(7)).is_empty());
    }

    #[test]
    fn test_snapshot_and_replay_restore_store() {
        let clock = clock();
        let store = MetricsStore::with_clock(clock.clone());
        store.log_recommendation("alice", &ids(&["v1", "v2"])).unwrap();
        clock.advance(Duration::days(1));
        store.log_click("alice", "v2").unwrap();

        let restored = MetricsStore::from_snapshot(store.snapshot(), clock.clone()).unwrap();
        assert_eq!(restored.summary(None), store.summary(None));

        let replayed = MetricsStore::replay(store.events(), clock.clone()).unwrap();
        assert_eq!(replayed.history(), store.history());
        assert_eq!(replayed.summary(None), store.summary(None));
    }

    #[test]
    fn test_snapshot_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let clock = clock();

        let store = MetricsStore::with_clock(clock.clone());
        store.log_recommendation("bob", &ids(&["v1", "v2"])).unwrap();
        store.log_click("bob", "v1").unwrap();
        store.save_snapshot(&path).unwrap();

        let loaded = MetricsStore::load_snapshot(&path, clock).unwrap();
        assert!((loaded.user_ctr("bob", None) - 0.5).abs() < 1e-12);
        assert_eq!(loaded.history(), store.history());
    }

    #[test]
    fn test_concurrent_clicks_are_not_lost() {
        let store = MetricsStore::with_clock(clock());

        std::thread::scope(|s| {
            for t in 0..8 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..100 {
                        store.log_click(&format!("user-{}", t), &format!("v{}", i)).unwrap();
                    }
                });
            }
        });

        let history = store.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].stats.clicks, 800);
        assert_eq!(store.stats().click_events, 800);
    }

    #[test]
    fn test_windows_past_calendar_range_cover_everything() {
        let clock = clock();
        let store = MetricsStore::with_clock(clock.clone());
        store.log_recommendation("bob", &ids(&["v1", "v2"])).unwrap();
        store.log_click("bob", "v1").unwrap();
        clock.advance(Duration::days(3));

        let huge = Duration::days(1_000_000_000);
        assert_eq!(
            store.user_ctr_breakdown("bob", Some(huge)),
            store.user_ctr_breakdown("bob", None)
        );
        assert!((store.user_ctr("bob", Some(huge)) - 0.5).abs() < 1e-12);

        let summary = store.summary(Some(huge));
        assert!((summary.users.ctr["bob"] - 0.5).abs() < 1e-12);
        assert_eq!(summary.overall, store.summary(None).overall);
    }

    #[test]
    fn test_compact_with_huge_retention_evicts_nothing() {
        let clock = clock();
        let store = MetricsStore::with_clock(clock.clone());
        store.log_recommendation("bob", &ids(&["v1"])).unwrap();
        clock.advance(Duration::days(30));

        let report = store.compact(Duration::days(1_000_000_000));
        assert!(report.is_empty());
        assert_eq!(report.users_dropped, 0);
        assert_eq!(store.stats().recommendation_events, 1);
    }
}
