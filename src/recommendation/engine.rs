//! Recommendation Engine
//!
//! Core scoring for personalized video recommendations.
//! Combines a collaborative signal (what similar users watched) with a content
//! signal (videos whose features resemble what the user already watched).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::matrix::{UserVideoMatrix, VideoFeatureMatrix};
use super::similarity::{compute_similarities, cosine_against_rows, Similarities};
use super::timing::PerformanceTimer;
use crate::error::Result;

/// A scored hybrid recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredVideo {
    pub video_id: String,
    pub score: f64,
    pub reason: RecommendationReason,
}

/// Which scorer(s) surfaced a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationReason {
    /// Watched by similar users
    Collaborative,
    /// Similar features to the user's history
    ContentBased,
    /// Surfaced by both scorers
    Both,
}

impl RecommendationReason {
    fn merge(self, other: RecommendationReason) -> RecommendationReason {
        if self == other {
            self
        } else {
            RecommendationReason::Both
        }
    }
}

/// Hybrid blend weights (can be tuned)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub collaborative: f64,
    pub content: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            collaborative: 0.7,
            content: 0.3,
        }
    }
}

/// Main recommendation engine.
///
/// Owns one generation of matrices together with the similarities computed from
/// them, so the two can never drift apart. A refresh builds a new engine.
#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    interactions: UserVideoMatrix,
    features: VideoFeatureMatrix,
    similarities: Similarities,
    /// Interaction column -> feature row, `None` when the video has no features
    column_to_feature: Vec<Option<usize>>,
    weights: HybridWeights,
}

impl RecommendationEngine {
    /// Build an engine, computing both similarity matrices
    pub fn new(interactions: UserVideoMatrix, features: VideoFeatureMatrix) -> Result<Self> {
        Self::with_weights(interactions, features, HybridWeights::default())
    }

    pub fn with_weights(
        interactions: UserVideoMatrix,
        features: VideoFeatureMatrix,
        weights: HybridWeights,
    ) -> Result<Self> {
        let similarities = compute_similarities(&interactions, &features)?;

        let column_to_feature: Vec<Option<usize>> = interactions
            .videos()
            .iter()
            .map(|video_id| features.position(video_id))
            .collect();

        let unmapped = column_to_feature.iter().filter(|c| c.is_none()).count();
        if unmapped > 0 {
            debug!(
                "{} interacted videos have no feature row and are ignored by content scoring",
                unmapped
            );
        }

        Ok(Self {
            interactions,
            features,
            similarities,
            column_to_feature,
            weights,
        })
    }

    pub fn interactions(&self) -> &UserVideoMatrix {
        &self.interactions
    }

    pub fn features(&self) -> &VideoFeatureMatrix {
        &self.features
    }

    pub fn similarities(&self) -> &Similarities {
        &self.similarities
    }

    pub fn weights(&self) -> HybridWeights {
        self.weights
    }

    /// Collaborative filtering recommendations.
    ///
    /// `score[v] = Σ sim(user, other) * weight(other, v)` over every other user;
    /// videos the user already interacted with never surface.
    pub fn collaborative_recommend(&self, user_id: &str, n: usize) -> Vec<String> {
        let Some(user_idx) = self.interactions.user_position(user_id) else {
            return Vec::new();
        };

        let user_similarities = self.similarities.users.row(user_idx);
        let mut scores = vec![0.0f64; self.interactions.n_videos()];

        for (other_idx, other_row) in self.interactions.rows().iter().enumerate() {
            if other_idx == user_idx {
                continue;
            }
            let sim = user_similarities[other_idx];
            for (score, weight) in scores.iter_mut().zip(other_row) {
                *score += sim * weight;
            }
        }

        // Filter out watched videos
        for (video_idx, _) in self.interactions.interacted(user_idx) {
            scores[video_idx] = f64::NEG_INFINITY;
        }

        top_n(&scores, n)
            .into_iter()
            .map(|idx| self.interactions.videos()[idx].clone())
            .collect()
    }

    /// Content-based recommendations.
    ///
    /// The user's profile is `Σ weight * features / count` over the videos they
    /// interacted with (divided by the number of videos, not the weight sum), then
    /// compared to every video by cosine similarity.
    pub fn content_recommend(&self, user_id: &str, n: usize) -> Vec<String> {
        let Some(user_idx) = self.interactions.user_position(user_id) else {
            return Vec::new();
        };

        let watched: Vec<(usize, f64)> = self
            .interactions
            .interacted(user_idx)
            .filter_map(|(col, weight)| self.column_to_feature[col].map(|row| (row, weight)))
            .collect();

        if watched.is_empty() {
            return Vec::new();
        }

        let mut profile = vec![0.0f64; self.features.feature_names().len()];
        for (row, weight) in &watched {
            for (p, f) in profile.iter_mut().zip(&self.features.row(*row).features) {
                *p += weight * f;
            }
        }
        let count = watched.len() as f64;
        profile.iter_mut().for_each(|p| *p /= count);

        let mut similarities = cosine_against_rows(
            &profile,
            self.features.rows().iter().map(|r| r.features.as_slice()),
        );

        // Filter out watched videos
        for (row, _) in &watched {
            similarities[*row] = f64::NEG_INFINITY;
        }

        top_n(&similarities, n)
            .into_iter()
            .map(|idx| self.features.row(idx).video_id.clone())
            .collect()
    }

    /// Hybrid recommendations with the engine's configured weights
    pub fn hybrid_recommend(&self, user_id: &str, n: usize) -> Vec<String> {
        self.hybrid_recommend_weighted(user_id, n, self.weights)
    }

    /// Hybrid recommendations with explicit weights
    pub fn hybrid_recommend_weighted(
        &self,
        user_id: &str,
        n: usize,
        weights: HybridWeights,
    ) -> Vec<String> {
        self.hybrid_scored(user_id, n, weights)
            .into_iter()
            .map(|scored| scored.video_id)
            .collect()
    }

    /// Merge both rankings: rank `i` in a list of up to `n` contributes
    /// `weight * (n - i)`. An empty result means a cold-start user.
    pub fn hybrid_scored(
        &self,
        user_id: &str,
        n: usize,
        weights: HybridWeights,
    ) -> Vec<ScoredVideo> {
        let _timer = PerformanceTimer::new("hybrid_recommend");

        let collaborative = self.collaborative_recommend(user_id, n);
        let content = self.content_recommend(user_id, n);

        // First-encountered order is the tie-break, so keep insertion order
        let mut merged: Vec<ScoredVideo> = Vec::with_capacity(collaborative.len() + content.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        let sources = [
            (collaborative, weights.collaborative, RecommendationReason::Collaborative),
            (content, weights.content, RecommendationReason::ContentBased),
        ];

        for (list, weight, reason) in sources {
            for (rank, video_id) in list.into_iter().enumerate() {
                let contribution = weight * (n - rank) as f64;
                match positions.get(&video_id) {
                    Some(&pos) => {
                        merged[pos].score += contribution;
                        merged[pos].reason = merged[pos].reason.merge(reason);
                    }
                    None => {
                        positions.insert(video_id.clone(), merged.len());
                        merged.push(ScoredVideo {
                            video_id,
                            score: contribution,
                            reason,
                        });
                    }
                }
            }
        }

        // Stable sort keeps first-encountered order among equal scores
        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(n);

        debug!(
            "Generated {} hybrid recommendations for user {}",
            merged.len(),
            user_id
        );

        merged
    }
}

/// Indices of the `n` highest scores, descending.
///
/// Excluded entries (-inf) never qualify; ties keep index order.
fn top_n(scores: &[f64], n: usize) -> Vec<usize> {
    let mut ranked: Vec<usize> = (0..scores.len())
        .filter(|&idx| scores[idx] != f64::NEG_INFINITY)
        .collect();
    ranked.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(n);
    ranked
}
