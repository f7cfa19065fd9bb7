//! Property tests for the scoring and metrics invariants.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::sync::Arc;

use vidrec::metrics::{ManualClock, MetricsStore};
use vidrec::{
    cosine_similarity, RecommendationEngine, SimilarityMatrix, UserVideoMatrix,
    VideoFeatureMatrix, VideoFeatureRow,
};

fn weight() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), Just(0.0), Just(1.0), Just(3.0), Just(4.0), Just(5.0)]
}

/// Random users × videos interaction rows plus a 3-feature catalog
fn engine_inputs() -> impl Strategy<Value = (Vec<Vec<f64>>, Vec<Vec<f64>>)> {
    (1usize..6, 1usize..8).prop_flat_map(|(users, videos)| {
        (
            prop::collection::vec(prop::collection::vec(weight(), videos), users),
            prop::collection::vec(prop::collection::vec(0.0f64..1.0, 3), videos),
        )
    })
}

fn build_engine(rows: Vec<Vec<f64>>, features: Vec<Vec<f64>>) -> RecommendationEngine {
    let users: Vec<String> = (0..rows.len()).map(|i| format!("u{}", i)).collect();
    let videos: Vec<String> = (0..features.len()).map(|i| format!("v{}", i)).collect();

    let catalog = VideoFeatureMatrix::new(
        vec!["f0".into(), "f1".into(), "f2".into()],
        videos
            .iter()
            .zip(features)
            .map(|(id, features)| VideoFeatureRow {
                video_id: id.clone(),
                created_at: None,
                features,
            })
            .collect(),
    )
    .unwrap();

    let matrix = UserVideoMatrix::from_rows(users, videos, rows).unwrap();
    RecommendationEngine::new(matrix, catalog).unwrap()
}

proptest! {
    #[test]
    fn hybrid_never_returns_watched_videos(
        (rows, features) in engine_inputs(),
        n in 0usize..10,
    ) {
        let engine = build_engine(rows, features);
        let matrix = engine.interactions().clone();

        for user in matrix.users() {
            let recs = engine.hybrid_recommend(user, n);
            prop_assert!(recs.len() <= n);
            for video in &recs {
                prop_assert_eq!(matrix.weight(user, video), 0.0);
            }
        }
    }

    #[test]
    fn unknown_users_get_nothing((rows, features) in engine_inputs(), n in 0usize..10) {
        let engine = build_engine(rows, features);
        prop_assert!(engine.collaborative_recommend("stranger", n).is_empty());
        prop_assert!(engine.content_recommend("stranger", n).is_empty());
        prop_assert!(engine.hybrid_recommend("stranger", n).is_empty());
    }

    #[test]
    fn cosine_self_similarity_is_one(v in prop::collection::vec(-100.0f64..100.0, 1..16)) {
        let sim = cosine_similarity(&v, &v);
        if v.iter().all(|x| *x == 0.0) {
            prop_assert_eq!(sim, 0.0);
        } else {
            prop_assert!((sim - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn cosine_with_zero_vector_is_zero(v in prop::collection::vec(-100.0f64..100.0, 1..16)) {
        let zero = vec![0.0; v.len()];
        let sim = cosine_similarity(&zero, &v);
        prop_assert!(!sim.is_nan());
        prop_assert_eq!(sim, 0.0);
    }

    #[test]
    fn similarity_matrix_is_bounded_and_symmetric((rows, _) in engine_inputs()) {
        let ids: Vec<String> = (0..rows.len()).map(|i| i.to_string()).collect();
        let slices: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
        let m = SimilarityMatrix::from_rows(ids, &slices).unwrap();

        for i in 0..m.len() {
            for j in 0..m.len() {
                prop_assert!((-1.0..=1.0).contains(&m.get(i, j)));
                prop_assert_eq!(m.get(i, j), m.get(j, i));
            }
        }
    }

    #[test]
    fn summary_is_idempotent(
        ops in prop::collection::vec((0usize..3, 0usize..4, 0i64..72, any::<bool>()), 0..40),
        window_days in prop::option::of(0i64..5),
    ) {
        let (store, _) = replay_ops(&ops);
        let window = window_days.map(Duration::days);

        let first = store.summary(window);
        let second = store.summary(window);
        prop_assert_eq!(first, second);
        prop_assert_eq!(store.history(), store.history());
    }

    #[test]
    fn ctr_counts_grow_with_window(
        ops in prop::collection::vec((0usize..3, 0usize..4, 0i64..72, any::<bool>()), 0..40),
        small_hours in 0i64..48,
        extra_hours in 0i64..48,
    ) {
        let (store, users) = replay_ops(&ops);
        let small = Duration::hours(small_hours);
        let large = Duration::hours(small_hours + extra_hours);

        for user in users {
            let a = store.user_ctr_breakdown(&user, Some(small));
            let b = store.user_ctr_breakdown(&user, Some(large));
            let all = store.user_ctr_breakdown(&user, None);

            prop_assert!(a.slots <= b.slots && b.slots <= all.slots);
            prop_assert!(a.clicked <= b.clicked && b.clicked <= all.clicked);
        }
    }
}

/// Apply `(user, video, hour offset, is_click)` operations in time order
fn replay_ops(ops: &[(usize, usize, i64, bool)]) -> (MetricsStore, Vec<String>) {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let store = MetricsStore::with_clock(clock.clone());

    let mut ops = ops.to_vec();
    ops.sort_by_key(|op| op.2);

    for (user, video, hour, is_click) in ops {
        clock.set(start + Duration::hours(hour));
        let user = format!("user{}", user);
        if is_click {
            store.log_click(&user, &format!("v{}", video)).unwrap();
        } else {
            let videos = vec![format!("v{}", video), format!("v{}", (video + 1) % 4)];
            store.log_recommendation(&user, &videos).unwrap();
        }
    }

    clock.set(start + Duration::hours(72));
    let users = (0..3).map(|u| format!("user{}", u)).collect();
    (store, users)
}
