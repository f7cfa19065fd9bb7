use crate::recommendation::service::RecommendationService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Periodically reload matrices and rebuild the engine until shutdown.
///
/// A failed refresh is logged and the previous engine keeps serving; the next tick
/// tries again.
pub async fn run_refresh_loop(
    service: Arc<RecommendationService>,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(every);

    // Skip first tick (runs immediately otherwise)
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                info!("🔄 Running scheduled matrix refresh...");

                // Similarity computation is CPU-bound; keep it off the async workers
                let svc = service.clone();
                match tokio::task::spawn_blocking(move || svc.refresh()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) if e.is_error_level() => {
                        error!("Matrix refresh failed, keeping previous engine: {:?}", e);
                    }
                    Ok(Err(e)) => warn!("Matrix refresh failed, will retry next interval: {}", e),
                    Err(e) => error!("Refresh task join error: {}", e),
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Matrix refresher shutting down");
                break;
            }
        }
    }
}

/// Periodically evict raw metrics events older than `retain`
pub async fn run_compaction_loop(
    service: Arc<RecommendationService>,
    retain: chrono::Duration,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = service.metrics().compact(retain);
                let stats = service.metrics().stats();
                metrics::gauge!("vidrec_metrics_events")
                    .set((stats.recommendation_events + stats.click_events) as f64);
                if report.is_empty() {
                    debug!("Metrics compaction: nothing older than {} days", retain.num_days());
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Metrics compactor shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::matrix::{UserVideoMatrix, VideoFeatureMatrix, VideoFeatureRow};
    use crate::recommendation::provider::StaticProvider;
    use crate::recommendation::service::ServiceOptions;

    fn service() -> Arc<RecommendationService> {
        let interactions = UserVideoMatrix::from_rows(
            vec!["u1".into()],
            vec!["v1".into()],
            vec![vec![1.0]],
        )
        .unwrap();
        let features = VideoFeatureMatrix::new(
            ["view_count", "like_count", "comment_count", "share_count"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            vec![VideoFeatureRow {
                video_id: "v1".into(),
                created_at: None,
                features: vec![1.0, 0.0, 0.0, 0.0],
            }],
        )
        .unwrap();
        Arc::new(RecommendationService::new(
            Arc::new(StaticProvider::new(interactions, features)),
            ServiceOptions::default(),
        ))
    }

    #[tokio::test]
    async fn test_refresh_loop_loads_engine_and_stops_on_shutdown() {
        let service = service();
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_refresh_loop(
            service.clone(),
            Duration::from_millis(20),
            rx,
        ));

        // Wait for the first scheduled refresh
        for _ in 0..250 {
            if service.is_ready() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(service.is_ready());

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_compaction_loop_stops_on_shutdown() {
        let service = service();
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_compaction_loop(
            service,
            chrono::Duration::days(30),
            Duration::from_secs(3600),
            rx,
        ));

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
