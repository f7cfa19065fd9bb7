//! Interaction and Feature Matrices
//!
//! The two inputs the engine is built from:
//! - `UserVideoMatrix`: users × videos, weight = sum of interaction weights
//! - `VideoFeatureMatrix`: videos × numeric features, plus each video's creation time
//!
//! Both validate their shape on construction (and on deserialization), so the
//! similarity and scoring code can index rows without re-checking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{Error, Result};

/// Interaction types that contribute to the user × video weight
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    View,
    Like,
    Rating,
}

/// Interaction weights
const VIEW_WEIGHT: f64 = 1.0;
const LIKE_WEIGHT: f64 = 3.0;
const RATING_WEIGHT: f64 = 5.0; // Explicit ratings are the strongest signal

impl InteractionType {
    pub fn weight(self) -> f64 {
        match self {
            InteractionType::View => VIEW_WEIGHT,
            InteractionType::Like => LIKE_WEIGHT,
            InteractionType::Rating => RATING_WEIGHT,
        }
    }
}

impl std::fmt::Display for InteractionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionType::View => write!(f, "view"),
            InteractionType::Like => write!(f, "like"),
            InteractionType::Rating => write!(f, "rating"),
        }
    }
}

impl std::str::FromStr for InteractionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "view" => Ok(InteractionType::View),
            "like" => Ok(InteractionType::Like),
            "rating" => Ok(InteractionType::Rating),
            other => Err(Error::shape(format!("unknown interaction type '{}'", other))),
        }
    }
}

/// A single raw interaction handed over by the data provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub user_id: String,
    pub video_id: String,
    pub interaction_type: InteractionType,
}

// ============================================================================
// User × Video matrix
// ============================================================================

/// Weighted user × video interaction matrix.
///
/// Stored dense: the similarity pass reads every row in full anyway. Absent
/// pairs are 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawUserVideoMatrix", into = "RawUserVideoMatrix")]
pub struct UserVideoMatrix {
    users: Vec<String>,
    videos: Vec<String>,
    user_index: HashMap<String, usize>,
    video_index: HashMap<String, usize>,
    rows: Vec<Vec<f64>>,
}

/// Wire form of `UserVideoMatrix`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUserVideoMatrix {
    pub users: Vec<String>,
    pub videos: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl TryFrom<RawUserVideoMatrix> for UserVideoMatrix {
    type Error = Error;

    fn try_from(raw: RawUserVideoMatrix) -> Result<Self> {
        UserVideoMatrix::from_rows(raw.users, raw.videos, raw.rows)
    }
}

impl From<UserVideoMatrix> for RawUserVideoMatrix {
    fn from(matrix: UserVideoMatrix) -> Self {
        Self {
            users: matrix.users,
            videos: matrix.videos,
            rows: matrix.rows,
        }
    }
}

impl UserVideoMatrix {
    /// Pivot raw interactions into a matrix.
    ///
    /// Rows are ordered by ascending user id and columns by ascending video id;
    /// repeated (user, video) pairs sum their weights.
    pub fn from_interactions<'a, I>(interactions: I) -> Self
    where
        I: IntoIterator<Item = &'a Interaction>,
    {
        let mut cells: BTreeMap<(&str, &str), f64> = BTreeMap::new();
        let mut users = BTreeSet::new();
        let mut videos = BTreeSet::new();

        for interaction in interactions {
            users.insert(interaction.user_id.as_str());
            videos.insert(interaction.video_id.as_str());
            *cells
                .entry((interaction.user_id.as_str(), interaction.video_id.as_str()))
                .or_insert(0.0) += interaction.interaction_type.weight();
        }

        let users: Vec<String> = users.into_iter().map(str::to_string).collect();
        let videos: Vec<String> = videos.into_iter().map(str::to_string).collect();
        let user_index = index_of(&users);
        let video_index = index_of(&videos);

        let mut rows = vec![vec![0.0; videos.len()]; users.len()];
        for ((user, video), weight) in cells {
            rows[user_index[user]][video_index[video]] = weight;
        }

        Self {
            users,
            videos,
            user_index,
            video_index,
            rows,
        }
    }

    /// Build a matrix from explicit rows, validating its shape
    pub fn from_rows(users: Vec<String>, videos: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let user_index = unique_index_of(&users, "user")?;
        let video_index = unique_index_of(&videos, "video")?;

        let matrix = Self {
            users,
            videos,
            user_index,
            video_index,
            rows,
        };
        matrix.validate()?;
        Ok(matrix)
    }

    /// Check row/column counts and that every weight is a finite, non-negative number
    pub fn validate(&self) -> Result<()> {
        if self.rows.len() != self.users.len() {
            return Err(Error::shape(format!(
                "interaction matrix has {} rows for {} users",
                self.rows.len(),
                self.users.len()
            )));
        }

        for (user, row) in self.users.iter().zip(&self.rows) {
            if row.len() != self.videos.len() {
                return Err(Error::shape(format!(
                    "interaction row for user '{}' has {} columns, expected {}",
                    user,
                    row.len(),
                    self.videos.len()
                )));
            }
            if let Some(bad) = row.iter().find(|w| !w.is_finite() || **w < 0.0) {
                return Err(Error::shape(format!(
                    "interaction row for user '{}' contains invalid weight {}",
                    user, bad
                )));
            }
        }

        Ok(())
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn videos(&self) -> &[String] {
        &self.videos
    }

    pub fn n_users(&self) -> usize {
        self.users.len()
    }

    pub fn n_videos(&self) -> usize {
        self.videos.len()
    }

    pub fn user_position(&self, user_id: &str) -> Option<usize> {
        self.user_index.get(user_id).copied()
    }

    pub fn video_position(&self, video_id: &str) -> Option<usize> {
        self.video_index.get(video_id).copied()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, user_position: usize) -> &[f64] {
        &self.rows[user_position]
    }

    /// Weight for a (user, video) pair; 0.0 when either is unknown
    pub fn weight(&self, user_id: &str, video_id: &str) -> f64 {
        match (self.user_position(user_id), self.video_position(video_id)) {
            (Some(u), Some(v)) => self.rows[u][v],
            _ => 0.0,
        }
    }

    /// Column positions and weights of every video the user has a positive weight for
    pub fn interacted(&self, user_position: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.rows[user_position]
            .iter()
            .enumerate()
            .filter(|(_, w)| **w > 0.0)
            .map(|(idx, w)| (idx, *w))
    }
}

// ============================================================================
// Video × Feature matrix
// ============================================================================

/// One video's row in the feature matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFeatureRow {
    pub video_id: String,
    /// Creation time; used for trending decay, never part of the feature vector
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub features: Vec<f64>,
}

/// Video × feature matrix with named columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawVideoFeatureMatrix", into = "RawVideoFeatureMatrix")]
pub struct VideoFeatureMatrix {
    feature_names: Vec<String>,
    rows: Vec<VideoFeatureRow>,
    index: HashMap<String, usize>,
}

/// Wire form of `VideoFeatureMatrix`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVideoFeatureMatrix {
    pub feature_names: Vec<String>,
    pub rows: Vec<VideoFeatureRow>,
}

impl TryFrom<RawVideoFeatureMatrix> for VideoFeatureMatrix {
    type Error = Error;

    fn try_from(raw: RawVideoFeatureMatrix) -> Result<Self> {
        VideoFeatureMatrix::new(raw.feature_names, raw.rows)
    }
}

impl From<VideoFeatureMatrix> for RawVideoFeatureMatrix {
    fn from(matrix: VideoFeatureMatrix) -> Self {
        Self {
            feature_names: matrix.feature_names,
            rows: matrix.rows,
        }
    }
}

impl VideoFeatureMatrix {
    pub fn new(feature_names: Vec<String>, rows: Vec<VideoFeatureRow>) -> Result<Self> {
        let ids: Vec<String> = rows.iter().map(|r| r.video_id.clone()).collect();
        let index = unique_index_of(&ids, "video")?;
        unique_index_of(&feature_names, "feature")?;

        let matrix = Self {
            feature_names,
            rows,
            index,
        };
        matrix.validate()?;
        Ok(matrix)
    }

    /// Check every row has one finite value per named feature
    pub fn validate(&self) -> Result<()> {
        if self.index.len() != self.rows.len() {
            return Err(Error::shape(format!(
                "feature matrix has {} rows for {} indexed videos",
                self.rows.len(),
                self.index.len()
            )));
        }

        for row in &self.rows {
            if row.features.len() != self.feature_names.len() {
                return Err(Error::shape(format!(
                    "feature row for video '{}' has {} values, expected {}",
                    row.video_id,
                    row.features.len(),
                    self.feature_names.len()
                )));
            }
            if let Some(bad) = row.features.iter().find(|v| !v.is_finite()) {
                return Err(Error::shape(format!(
                    "feature row for video '{}' contains non-numeric value {}",
                    row.video_id, bad
                )));
            }
        }

        Ok(())
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[VideoFeatureRow] {
        &self.rows
    }

    pub fn row(&self, position: usize) -> &VideoFeatureRow {
        &self.rows[position]
    }

    pub fn video_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(|r| r.video_id.as_str())
    }

    pub fn position(&self, video_id: &str) -> Option<usize> {
        self.index.get(video_id).copied()
    }

    pub fn features_of(&self, video_id: &str) -> Option<&[f64]> {
        self.position(video_id)
            .map(|idx| self.rows[idx].features.as_slice())
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn index_of(ids: &[String]) -> HashMap<String, usize> {
    ids.iter()
        .enumerate()
        .map(|(idx, id)| (id.clone(), idx))
        .collect()
}

fn unique_index_of(ids: &[String], kind: &str) -> Result<HashMap<String, usize>> {
    let index = index_of(ids);
    if index.len() != ids.len() {
        return Err(Error::shape(format!("duplicate {} ids in matrix index", kind)));
    }
    Ok(index)
}
