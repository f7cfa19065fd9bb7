//! Vidrec Engine
//!
//! Long-running recommendation service: hybrid video recommendations plus
//! click-through metrics.
//!
//! # Architecture
//!
//! - **Matrix Refresher**: Reloads the data snapshot and rebuilds similarities on an interval
//! - **Metrics Compactor**: Evicts old raw events when a retention period is configured
//! - **Prometheus Exporter**: Optional, behind the `prometheus` feature
//!
//! # Graceful Shutdown
//!
//! The engine handles SIGTERM and SIGINT signals, ensuring:
//! - Background loops stop at their next select point
//! - The metrics store is written to its snapshot file (when configured)

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vidrec::config::{Config, LogFormat};
use vidrec::metrics::{MetricsStore, SystemClock};
use vidrec::recommendation::{updater, RecommendationService, SnapshotProvider};
use vidrec::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::from_env()?);

    // Initialize tracing with structured logging
    init_tracing(config.logging.format);

    info!("═══════════════════════════════════════════════════════════════");
    info!("  🚀 Vidrec Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════════════════════");
    info!("  Components:");
    info!("    • Hybrid Recommendation Engine (collaborative + content)");
    info!("    • Click-through Metrics Store");
    info!("═══════════════════════════════════════════════════════════════");

    config.log_summary();
    info!("✅ Configuration loaded and validated");

    #[cfg(feature = "prometheus")]
    {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.prometheus_port))
            .install()
            .map_err(|e| vidrec::Error::config(format!("prometheus exporter: {}", e)))?;
        info!(
            "✅ Prometheus exporter listening on port {}",
            config.metrics.prometheus_port
        );
    }

    let metrics_store = restore_metrics(&config)?;

    let provider = Arc::new(SnapshotProvider::new(config.data.snapshot_path.clone()));
    let service = Arc::new(RecommendationService::with_metrics(
        provider,
        config.service_options(),
        metrics_store,
    ));

    // Initial load; the process is useless without an engine, so fail fast
    info!("📦 Loading matrices and computing similarities...");
    let svc = service.clone();
    tokio::task::spawn_blocking(move || svc.refresh())
        .await
        .map_err(anyhow::Error::from)??;

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut handles = Vec::new();

    info!("🔄 Starting matrix refresher...");
    handles.push(tokio::spawn(updater::run_refresh_loop(
        service.clone(),
        config.data.refresh_interval,
        shutdown_tx.subscribe(),
    )));

    match config.metrics.retention {
        Some(retain) => {
            info!("📊 Starting metrics compactor...");
            handles.push(tokio::spawn(updater::run_compaction_loop(
                service.clone(),
                retain,
                config.metrics.compaction_interval,
                shutdown_tx.subscribe(),
            )));
        }
        None => warn!("⚠️ METRICS_RETENTION_DAYS not set; raw metrics events are kept forever"),
    }

    info!("═══════════════════════════════════════════════════════════════");
    info!("  ✅ All services started successfully");
    info!("═══════════════════════════════════════════════════════════════");

    // Wait for shutdown signal or service failure
    tokio::select! {
        _ = shutdown_signal() => {
            info!("📴 Shutdown signal received");
        }
        _ = wait_for_any_failure(&mut handles) => {
            warn!("⚠️ A service failed, initiating shutdown");
        }
    }

    // Graceful shutdown
    info!("🛑 Initiating graceful shutdown...");
    let _ = shutdown_tx.send(());

    let shutdown_timeout = Duration::from_secs(30);
    if tokio::time::timeout(shutdown_timeout, shutdown_services(handles))
        .await
        .is_err()
    {
        warn!("⚠️ Shutdown timeout exceeded, forcing exit");
    }

    if let Some(path) = &config.metrics.snapshot_path {
        match service.metrics().save_snapshot(path) {
            Ok(()) => info!("💾 Metrics snapshot written to {}", path.display()),
            Err(e) => error!("Failed to write metrics snapshot: {:?}", e),
        }
    }

    info!(
        "📈 Overall CTR this session: {:.4}",
        service.metrics().overall_ctr(None)
    );
    info!("👋 Vidrec Engine stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default log levels
        EnvFilter::new("vidrec_engine=debug,vidrec=debug,info")
    });

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(std::env::var("NO_COLOR").is_err()),
            )
            .init(),
    }
}

/// Restore the metrics store from its snapshot, or start empty
fn restore_metrics(config: &Config) -> Result<MetricsStore> {
    match &config.metrics.snapshot_path {
        Some(path) if path.exists() => {
            let store = MetricsStore::load_snapshot(path, Arc::new(SystemClock))?;
            let stats = store.stats();
            info!(
                "✅ Metrics restored from {}: {} users, {} days",
                path.display(),
                stats.users,
                stats.days
            );
            Ok(store)
        }
        _ => Ok(MetricsStore::new()),
    }
}

/// Wait for any task to fail
async fn wait_for_any_failure(handles: &mut [tokio::task::JoinHandle<()>]) {
    loop {
        for handle in handles.iter_mut() {
            if handle.is_finished() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wait for all services to complete shutdown
async fn shutdown_services(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
