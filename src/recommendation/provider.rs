//! Matrix Providers
//!
//! The engine never fetches data itself. A `MatrixProvider` hands over a complete
//! pair of matrices or fails the whole load; there is no partial result.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use super::features;
use super::matrix::{Interaction, UserVideoMatrix, VideoFeatureMatrix};
use crate::error::{Error, Result};

/// One consistent generation of engine inputs
#[derive(Debug, Clone)]
pub struct MatrixSet {
    pub interactions: UserVideoMatrix,
    pub features: VideoFeatureMatrix,
}

/// Source of the interaction and feature matrices
pub trait MatrixProvider: Send + Sync {
    fn user_interaction_matrix(&self) -> Result<UserVideoMatrix>;

    fn video_features(&self) -> Result<VideoFeatureMatrix>;

    /// Trending scores as of now
    fn trending_scores(
        &self,
        features: &VideoFeatureMatrix,
        decay: f64,
    ) -> Result<HashMap<String, f64>> {
        features::trending_scores(features, decay, Utc::now())
    }

    /// Load both matrices. Implementations backed by a single source should
    /// override this so both come from the same read.
    fn load(&self) -> Result<MatrixSet> {
        Ok(MatrixSet {
            interactions: self.user_interaction_matrix()?,
            features: self.video_features()?,
        })
    }
}

// ============================================================================
// JSON snapshot file
// ============================================================================

/// On-disk snapshot: raw interactions plus the prepared feature matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub interactions: Vec<Interaction>,
    pub video_features: VideoFeatureMatrix,
}

/// Reads matrices from a JSON snapshot written by the data pipeline
#[derive(Debug, Clone)]
pub struct SnapshotProvider {
    path: PathBuf,
}

impl SnapshotProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn read(&self) -> Result<Snapshot> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::data_fetch_with_source(
                format!("failed to read snapshot {}", self.path.display()),
                e,
            )
        })?;

        let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|e| {
            Error::data_fetch_with_source(
                format!("invalid snapshot {}", self.path.display()),
                e,
            )
        })?;

        debug!(
            "Read snapshot: {} interactions, {} videos",
            snapshot.interactions.len(),
            snapshot.video_features.len()
        );

        Ok(snapshot)
    }
}

impl MatrixProvider for SnapshotProvider {
    fn user_interaction_matrix(&self) -> Result<UserVideoMatrix> {
        let snapshot = self.read()?;
        Ok(UserVideoMatrix::from_interactions(&snapshot.interactions))
    }

    fn video_features(&self) -> Result<VideoFeatureMatrix> {
        Ok(self.read()?.video_features)
    }

    fn load(&self) -> Result<MatrixSet> {
        let snapshot = self.read()?;
        Ok(MatrixSet {
            interactions: UserVideoMatrix::from_interactions(&snapshot.interactions),
            features: snapshot.video_features,
        })
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Serves fixed matrices; for embedding callers and tests
#[derive(Debug, Clone)]
pub struct StaticProvider {
    set: MatrixSet,
}

impl StaticProvider {
    pub fn new(interactions: UserVideoMatrix, features: VideoFeatureMatrix) -> Self {
        Self {
            set: MatrixSet {
                interactions,
                features,
            },
        }
    }
}

impl MatrixProvider for StaticProvider {
    fn user_interaction_matrix(&self) -> Result<UserVideoMatrix> {
        Ok(self.set.interactions.clone())
    }

    fn video_features(&self) -> Result<VideoFeatureMatrix> {
        Ok(self.set.features.clone())
    }

    fn load(&self) -> Result<MatrixSet> {
        Ok(self.set.clone())
    }
}
