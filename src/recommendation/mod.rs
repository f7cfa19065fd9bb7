//! Recommendation Module
//!
//! Personalized video recommendations from two precomputed matrices.
//!
//! ## Architecture
//!
//! 1. **Matrix** - User × video interaction weights and video × feature vectors
//! 2. **Similarity** - Pairwise cosine similarity over users and over videos
//! 3. **Engine** - Collaborative, content-based and hybrid scoring
//! 4. **Features** - Time-decayed trending scores
//! 5. **Provider** - Where the matrices come from
//! 6. **Service** - Owns the current engine plus the metrics store; refresh swaps engines
//! 7. **Updater** - Background refresh and compaction loops
//!
//! ## Algorithm Overview
//!
//! - Collaborative: `Σ sim(user, other) * weight(other, video)` over every other user
//! - Content: cosine between the user's averaged feature profile and each video
//! - Hybrid: rank `i` in a list of `n` scores `weight * (n - i)`
//!   (collaborative 70%, content 30% by default)
//! - Watched videos never come back from any of the three

pub mod engine;
pub mod features;
pub mod matrix;
pub mod provider;
pub mod service;
pub mod similarity;
pub mod timing;
pub mod updater;

// Re-export the types that are actually used externally
pub use engine::{HybridWeights, RecommendationEngine, RecommendationReason, ScoredVideo};
pub use matrix::{
    Interaction, InteractionType, UserVideoMatrix, VideoFeatureMatrix, VideoFeatureRow,
};
pub use provider::{MatrixProvider, MatrixSet, Snapshot, SnapshotProvider, StaticProvider};
pub use service::{
    Recommendations, RecommendationService, RecommendedVideo, RefreshReport, ServiceOptions,
};
pub use similarity::{compute_similarities, cosine_similarity, Similarities, SimilarityMatrix};
