//! Similarity Engine
//!
//! Dense pairwise cosine similarity over the rows of the interaction matrix
//! (user × user) and the feature matrix (video × video).

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::matrix::{UserVideoMatrix, VideoFeatureMatrix};
use super::timing::PerformanceTimer;
use crate::error::{Error, Result};

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero magnitude; the result is clamped to
/// [-1, 1] to absorb rounding.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    cosine_with_norms(a, norm(a), b, norm(b))
}

fn cosine_with_norms(a: &[f64], norm_a: f64, b: &[f64], norm_b: f64) -> f64 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Cosine similarity of `target` against every row, in row order
pub fn cosine_against_rows<'a, I>(target: &[f64], rows: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let target_norm = norm(target);
    rows.into_iter()
        .map(|row| cosine_with_norms(target, target_norm, row, norm(row)))
        .collect()
}

/// Square, symmetric similarity matrix stored row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatrix {
    ids: Vec<String>,
    values: Vec<f64>,
}

impl SimilarityMatrix {
    /// Compute pairwise cosine similarities of `rows`, labelled by `ids`.
    ///
    /// Needs one id per row and rows of a single width.
    pub fn from_rows(ids: Vec<String>, rows: &[&[f64]]) -> Result<Self> {
        let n = rows.len();
        if ids.len() != n {
            return Err(Error::shape(format!(
                "similarity matrix has {} ids but {} rows",
                ids.len(),
                n
            )));
        }
        if let Some(first) = rows.first() {
            if let Some(i) = rows.iter().position(|r| r.len() != first.len()) {
                return Err(Error::shape(format!(
                    "row {} has {} values, expected {}",
                    i,
                    rows[i].len(),
                    first.len()
                )));
            }
        }
        let norms: Vec<f64> = rows.iter().map(|r| norm(r)).collect();

        let values: Vec<f64> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                let norms = &norms;
                (0..n).map(move |j| {
                    if i == j {
                        // Self-similarity is exact for non-zero rows
                        if norms[i] == 0.0 {
                            0.0
                        } else {
                            1.0
                        }
                    } else {
                        cosine_with_norms(rows[i], norms[i], rows[j], norms[j])
                    }
                })
            })
            .collect();

        Ok(Self { ids, values })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.len() + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let n = self.len();
        &self.values[i * n..(i + 1) * n]
    }
}

/// User-user and video-video similarities computed from one pair of matrices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Similarities {
    pub users: SimilarityMatrix,
    pub videos: SimilarityMatrix,
}

/// Compute both similarity matrices.
///
/// Pure: the inputs are re-validated first and nothing is produced on a shape error.
pub fn compute_similarities(
    interactions: &UserVideoMatrix,
    features: &VideoFeatureMatrix,
) -> Result<Similarities> {
    let _timer = PerformanceTimer::new("compute_similarities");

    interactions.validate()?;
    features.validate()?;

    let user_rows: Vec<&[f64]> = interactions.rows().iter().map(Vec::as_slice).collect();
    let users = SimilarityMatrix::from_rows(interactions.users().to_vec(), &user_rows)?;

    let video_rows: Vec<&[f64]> = features
        .rows()
        .iter()
        .map(|r| r.features.as_slice())
        .collect();
    let video_ids: Vec<String> = features.video_ids().map(str::to_string).collect();
    let videos = SimilarityMatrix::from_rows(video_ids, &video_rows)?;

    debug!(
        "Computed similarities: {}x{} users, {}x{} videos",
        users.len(),
        users.len(),
        videos.len(),
        videos.len()
    );

    Ok(Similarities { users, videos })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::matrix::VideoFeatureRow;

    #[test]
    fn test_cosine_similarity() {
        let a = [1.0, 0.0, 2.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-12);

        // Orthogonal vectors
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-12);

        // Opposite vectors
        assert!((cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero_not_nan() {
        let zero = [0.0, 0.0, 0.0];
        let sim = cosine_similarity(&zero, &[1.0, 2.0, 3.0]);
        assert_eq!(sim, 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_similarity_matrix_symmetric_with_unit_diagonal() {
        let data = [vec![1.0, 0.0, 1.0], vec![0.0, 3.0, 1.0], vec![0.0, 0.0, 0.0]];
        let rows: Vec<&[f64]> = data.iter().map(Vec::as_slice).collect();
        let m =
            SimilarityMatrix::from_rows(vec!["a".into(), "b".into(), "c".into()], &rows).unwrap();

        assert_eq!(m.len(), 3);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(1, 1), 1.0);
        // Zero row has no direction, so even its self-similarity is 0
        assert_eq!(m.get(2, 2), 0.0);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(m.get(i, j), m.get(j, i));
                assert!((-1.0..=1.0).contains(&m.get(i, j)));
            }
        }
        assert_eq!(m.row(2), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_compute_similarities_orders_match_inputs() {
        let interactions = UserVideoMatrix::from_rows(
            vec!["u1".into(), "u2".into()],
            vec!["v1".into(), "v2".into()],
            vec![vec![1.0, 0.0], vec![1.0, 1.0]],
        )
        .unwrap();
        let features = VideoFeatureMatrix::new(
            vec!["f1".into(), "f2".into()],
            vec![
                VideoFeatureRow {
                    video_id: "v2".into(),
                    created_at: None,
                    features: vec![0.0, 1.0],
                },
                VideoFeatureRow {
                    video_id: "v1".into(),
                    created_at: None,
                    features: vec![1.0, 1.0],
                },
            ],
        )
        .unwrap();

        let sims = compute_similarities(&interactions, &features).unwrap();
        assert_eq!(sims.users.ids(), ["u1", "u2"]);
        assert_eq!(sims.videos.ids(), ["v2", "v1"]);
        let expected = 1.0 / 2.0_f64.sqrt();
        assert!((sims.users.get(0, 1) - expected).abs() < 1e-12);
        assert!((sims.videos.get(0, 1) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_against_rows_handles_zero_profile() {
        let data = [vec![1.0, 0.0], vec![0.0, 1.0]];
        let sims = cosine_against_rows(&[0.0, 0.0], data.iter().map(Vec::as_slice));
        assert_eq!(sims, vec![0.0, 0.0]);
    }

    #[test]
    fn test_shape_error_type() {
        let err =
            UserVideoMatrix::from_rows(vec!["u".into()], vec![], vec![vec![1.0]]).unwrap_err();
        assert!(matches!(err, Error::Shape { .. }));
    }

    #[test]
    fn test_similarity_matrix_rejects_mismatched_ids_and_ragged_rows() {
        let data = [vec![1.0, 0.0], vec![0.0, 1.0]];
        let rows: Vec<&[f64]> = data.iter().map(Vec::as_slice).collect();
        let err = SimilarityMatrix::from_rows(vec!["only".into()], &rows).unwrap_err();
        assert!(matches!(err, Error::Shape { .. }));

        let ragged = [vec![1.0, 0.0], vec![1.0]];
        let rows: Vec<&[f64]> = ragged.iter().map(Vec::as_slice).collect();
        let err = SimilarityMatrix::from_rows(vec!["a".into(), "b".into()], &rows).unwrap_err();
        assert!(matches!(err, Error::Shape { .. }));

        let empty = SimilarityMatrix::from_rows(Vec::new(), &[]).unwrap();
        assert!(empty.is_empty());
    }
}
