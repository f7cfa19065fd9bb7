//! Trending Scores
//!
//! Time-decayed engagement over the normalized count columns of the feature
//! matrix:
//!
//! `(views*1 + likes*2 + comments*3 + shares*4) * exp(-decay * age_days)`

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::matrix::VideoFeatureMatrix;
use crate::error::{Error, Result};

/// Default decay applied per day of video age
pub const DEFAULT_TIME_DECAY: f64 = 0.1;

/// Feature columns trending reads, with their weights
const TRENDING_COLUMNS: [(&str, f64); 4] = [
    ("view_count", 1.0),
    ("like_count", 2.0),
    ("comment_count", 3.0),
    ("share_count", 4.0),
];

const MS_PER_DAY: f64 = 1000.0 * 3600.0 * 24.0;

/// Trending score for every video in the matrix, as of `now`.
///
/// A video without `created_at` is treated as created at `now` (age 0).
pub fn trending_scores(
    features: &VideoFeatureMatrix,
    decay: f64,
    now: DateTime<Utc>,
) -> Result<HashMap<String, f64>> {
    let columns = TRENDING_COLUMNS
        .iter()
        .map(|(name, weight)| {
            features
                .column(name)
                .map(|idx| (idx, *weight))
                .ok_or_else(|| Error::shape(format!("feature column '{}' missing", name)))
        })
        .collect::<Result<Vec<_>>>()?;

    let scores = features
        .rows()
        .iter()
        .map(|row| {
            let engagement: f64 = columns
                .iter()
                .map(|(idx, weight)| row.features[*idx] * weight)
                .sum();
            let age_days = row
                .created_at
                .map(|created| (now - created).num_milliseconds() as f64 / MS_PER_DAY)
                .unwrap_or(0.0);
            (row.video_id.clone(), engagement * (-decay * age_days).exp())
        })
        .collect();

    Ok(scores)
}

/// Top `n` entries of a score map, highest first; ties broken by video id
pub fn top_trending(scores: &HashMap<String, f64>, n: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = scores.iter().map(|(k, v)| (k.clone(), *v)).collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.truncate(n);
    ranked
}
