//! Recommendation Service
//!
//! The explicitly owned entry point request handlers talk to. It holds the current
//! engine generation behind a read/write lock and the metrics store, and exposes a
//! `refresh` that swaps in a new generation only after it was fully built.

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::engine::{HybridWeights, RecommendationEngine, RecommendationReason};
use super::features::{self, DEFAULT_TIME_DECAY};
use super::provider::MatrixProvider;
use super::timing::PerformanceTimer;
use crate::error::{Error, Result};
use crate::metrics::{DayRecord, MetricsStore, MetricsSummary};

/// Tunables for a service instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceOptions {
    pub weights: HybridWeights,
    pub trending_decay: f64,
    /// Used when a caller does not ask for a specific count
    pub default_limit: usize,
    /// Upper bound on any requested count
    pub max_limit: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            weights: HybridWeights::default(),
            trending_decay: DEFAULT_TIME_DECAY,
            default_limit: 5,
            max_limit: 100,
        }
    }
}

/// A recommended video as handed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedVideo {
    pub video_id: String,
    pub score: f64,
    pub reason: RecommendationReason,
    /// `None` when the video has no feature row
    pub trending_score: Option<f64>,
}

/// Result of `recommend`: the list plus the id it was logged under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub user_id: String,
    pub event_id: Uuid,
    pub videos: Vec<RecommendedVideo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub users: usize,
    pub videos: usize,
    pub features: usize,
    pub loaded_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// One engine plus the trending scores computed alongside it
#[derive(Debug)]
struct Generation {
    engine: Arc<RecommendationEngine>,
    trending: HashMap<String, f64>,
    loaded_at: DateTime<Utc>,
}

pub struct RecommendationService {
    provider: Arc<dyn MatrixProvider>,
    options: ServiceOptions,
    current: RwLock<Option<Arc<Generation>>>,
    refresh_lock: Mutex<()>,
    metrics: MetricsStore,
}

impl RecommendationService {
    pub fn new(provider: Arc<dyn MatrixProvider>, options: ServiceOptions) -> Self {
        Self::with_metrics(provider, options, MetricsStore::new())
    }

    pub fn with_metrics(
        provider: Arc<dyn MatrixProvider>,
        options: ServiceOptions,
        metrics: MetricsStore,
    ) -> Self {
        Self {
            provider,
            options,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            metrics,
        }
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub fn metrics(&self) -> &MetricsStore {
        &self.metrics
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Reload matrices from the provider and rebuild the engine.
    ///
    /// Everything is computed before the write lock is taken; on any error the
    /// previous generation keeps serving.
    #[instrument(skip(self))]
    pub fn refresh(&self) -> Result<RefreshReport> {
        let _serial = self.refresh_lock.lock();
        let timer = PerformanceTimer::new("refresh");

        let result = self.build_generation();
        let generation = match result {
            Ok(generation) => generation,
            Err(e) => {
                metrics::counter!("vidrec_refresh_total", "outcome" => "error").increment(1);
                error!("Matrix refresh failed, keeping previous engine: {}", e);
                return Err(e);
            }
        };

        let interactions = generation.engine.interactions();
        let report = RefreshReport {
            users: interactions.n_users(),
            videos: interactions.n_videos(),
            features: generation.engine.features().len(),
            loaded_at: generation.loaded_at,
            duration_ms: timer.elapsed_ms(),
        };

        *self.current.write() = Some(Arc::new(generation));

        metrics::counter!("vidrec_refresh_total", "outcome" => "ok").increment(1);
        metrics::gauge!("vidrec_users").set(report.users as f64);
        metrics::gauge!("vidrec_videos").set(report.features as f64);
        info!(
            "✅ Engine refreshed: {} users, {} interacted videos, {} catalog videos in {}ms",
            report.users, report.videos, report.features, report.duration_ms
        );
        timer.log_if_slow(30_000);

        Ok(report)
    }

    fn build_generation(&self) -> Result<Generation> {
        let set = self.provider.load()?;
        let trending = self
            .provider
            .trending_scores(&set.features, self.options.trending_decay)?;
        let engine = RecommendationEngine::with_weights(
            set.interactions,
            set.features,
            self.options.weights,
        )?;

        Ok(Generation {
            engine: Arc::new(engine),
            trending,
            loaded_at: Utc::now(),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.current.read().as_ref().map(|g| g.loaded_at)
    }

    fn generation(&self) -> Result<Arc<Generation>> {
        self.current.read().clone().ok_or(Error::NotReady)
    }

    /// Current engine; held `Arc`s stay valid across refreshes
    pub fn engine(&self) -> Result<Arc<RecommendationEngine>> {
        Ok(self.generation()?.engine.clone())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Hybrid recommendations without logging
    pub fn hybrid_recommend(&self, user_id: &str, n: usize) -> Result<Vec<String>> {
        Ok(self.engine()?.hybrid_recommend(user_id, n))
    }

    /// Recommend, log the shown list, and attach trending scores.
    ///
    /// `limit` defaults to `default_limit` and is capped at `max_limit`.
    #[instrument(skip(self))]
    pub fn recommend(&self, user_id: &str, limit: Option<usize>) -> Result<Recommendations> {
        if user_id.trim().is_empty() {
            return Err(Error::MissingField { field: "user_id" });
        }
        let n = limit
            .unwrap_or(self.options.default_limit)
            .min(self.options.max_limit);

        let generation = self.generation()?;
        let scored = generation
            .engine
            .hybrid_scored(user_id, n, self.options.weights);

        let video_ids: Vec<String> = scored.iter().map(|s| s.video_id.clone()).collect();
        let event_id = self.metrics.log_recommendation(user_id, &video_ids)?;

        let videos = scored
            .into_iter()
            .map(|s| RecommendedVideo {
                trending_score: generation.trending.get(&s.video_id).copied(),
                video_id: s.video_id,
                score: s.score,
                reason: s.reason,
            })
            .collect();

        Ok(Recommendations {
            user_id: user_id.to_string(),
            event_id,
            videos,
        })
    }

    /// Top `n` videos by trending score as of the last refresh
    pub fn trending(&self, n: usize) -> Result<Vec<(String, f64)>> {
        let generation = self.generation()?;
        Ok(features::top_trending(&generation.trending, n.min(self.options.max_limit)))
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    pub fn log_recommendation(&self, user_id: &str, video_ids: &[String]) -> Result<Uuid> {
        self.metrics.log_recommendation(user_id, video_ids)
    }

    pub fn log_click(&self, user_id: &str, video_id: &str) -> Result<Uuid> {
        self.metrics.log_click(user_id, video_id)
    }

    pub fn summary(&self, window: Option<Duration>) -> MetricsSummary {
        self.metrics.summary(window)
    }

    pub fn history(&self) -> Vec<DayRecord> {
        self.metrics.history()
    }
}
