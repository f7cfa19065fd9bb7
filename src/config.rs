//! Configuration management for the Vidrec engine
//!
//! Strongly-typed configuration loaded from environment variables (and `.env`),
//! with defaults and a validation pass before anything starts.
//!
//! # Example
//! ```no_run
//! use vidrec::Config;
//! let config = Config::from_env().expect("failed to load config");
//! println!("Snapshot: {}", config.data.snapshot_path.display());
//! ```

use crate::error::{Error, Result};
use crate::recommendation::{HybridWeights, ServiceOptions};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Upper bound on `METRICS_RETENTION_DAYS` (roughly a century)
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the matrices come from
    pub data: DataConfig,
    /// Recommendation engine configuration
    pub recommendation: RecommendationConfig,
    /// Click-through metrics store configuration
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// Matrix source configuration
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// JSON snapshot with interactions and video features
    pub snapshot_path: PathBuf,
    /// How often to reload matrices and recompute similarities
    pub refresh_interval: Duration,
}

/// Recommendation engine configuration
#[derive(Debug, Clone)]
pub struct RecommendationConfig {
    /// Results returned when the caller does not ask for a count
    pub default_limit: usize,
    /// Maximum results per request
    pub max_limit: usize,
    /// Weight of the collaborative ranking in the hybrid blend
    pub collab_weight: f64,
    /// Weight of the content ranking in the hybrid blend
    pub content_weight: f64,
    /// Trending decay per day of video age
    pub trending_decay: f64,
}

/// Metrics store configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Raw events older than this are evicted; `None` keeps everything
    pub retention: Option<chrono::Duration>,
    /// How often compaction runs when retention is set
    pub compaction_interval: Duration,
    /// Persist the store here on shutdown and restore it on start
    pub snapshot_path: Option<PathBuf>,
    /// Port for the Prometheus exporter (`prometheus` feature)
    pub prometheus_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Try to load .env file (ignore if not found)
        dotenvy::dotenv().ok();

        let config = Self {
            data: DataConfig::from_env()?,
            recommendation: RecommendationConfig::from_env()?,
            metrics: MetricsConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.data.snapshot_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig {
                key: "DATA_SNAPSHOT_PATH",
                message: "snapshot path cannot be empty".into(),
            });
        }

        if self.data.refresh_interval.is_zero() {
            return Err(Error::InvalidConfig {
                key: "MATRIX_REFRESH_SECS",
                message: "refresh interval must be > 0".into(),
            });
        }

        let rec = &self.recommendation;
        for (key, weight) in [
            ("REC_COLLAB_WEIGHT", rec.collab_weight),
            ("REC_CONTENT_WEIGHT", rec.content_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::InvalidConfig {
                    key,
                    message: format!("weight must be a non-negative number, got {}", weight)
                        .into(),
                });
            }
        }
        if rec.collab_weight == 0.0 && rec.content_weight == 0.0 {
            return Err(Error::InvalidConfig {
                key: "REC_COLLAB_WEIGHT",
                message: "collaborative and content weights cannot both be 0".into(),
            });
        }

        if !rec.trending_decay.is_finite() || rec.trending_decay < 0.0 {
            return Err(Error::InvalidConfig {
                key: "REC_TRENDING_DECAY",
                message: format!("decay must be a non-negative number, got {}", rec.trending_decay)
                    .into(),
            });
        }

        if rec.default_limit == 0 || rec.default_limit > rec.max_limit {
            return Err(Error::InvalidConfig {
                key: "REC_DEFAULT_LIMIT",
                message: "default limit must be between 1 and REC_MAX_LIMIT".into(),
            });
        }

        if let Some(retention) = self.metrics.retention {
            if retention <= chrono::Duration::zero()
                || retention > chrono::Duration::days(MAX_RETENTION_DAYS)
            {
                return Err(Error::InvalidConfig {
                    key: "METRICS_RETENTION_DAYS",
                    message: format!(
                        "retention must be between 1 and {} days",
                        MAX_RETENTION_DAYS
                    )
                    .into(),
                });
            }
        }

        if self.metrics.compaction_interval.is_zero() {
            return Err(Error::InvalidConfig {
                key: "METRICS_COMPACTION_SECS",
                message: "compaction interval must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Log configuration summary; call once logging is initialized
    pub fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  Data:");
        info!("    Snapshot: {}", self.data.snapshot_path.display());
        info!("    Refresh Interval: {:?}", self.data.refresh_interval);
        info!("  Recommendation:");
        info!(
            "    Weights: collaborative {} / content {}",
            self.recommendation.collab_weight, self.recommendation.content_weight
        );
        info!(
            "    Limit: {} (max {})",
            self.recommendation.default_limit, self.recommendation.max_limit
        );
        info!("    Trending Decay: {}", self.recommendation.trending_decay);
        info!("  Metrics:");
        match self.metrics.retention {
            Some(retention) => info!("    Retention: {} days", retention.num_days()),
            None => info!("    Retention: unbounded"),
        }
        if let Some(path) = &self.metrics.snapshot_path {
            info!("    Snapshot: {}", path.display());
        }
    }

    /// Engine options derived from the recommendation section
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            weights: HybridWeights {
                collaborative: self.recommendation.collab_weight,
                content: self.recommendation.content_weight,
            },
            trending_decay: self.recommendation.trending_decay,
            default_limit: self.recommendation.default_limit,
            max_limit: self.recommendation.max_limit,
        }
    }
}

impl DataConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            snapshot_path: PathBuf::from(get_env("DATA_SNAPSHOT_PATH")?),
            refresh_interval: Duration::from_secs(get_env_parsed_or("MATRIX_REFRESH_SECS", 3600)?),
        })
    }
}

impl RecommendationConfig {
    fn from_env() -> Result<Self> {
        let defaults = ServiceOptions::default();

        Ok(Self {
            default_limit: get_env_parsed_or("REC_DEFAULT_LIMIT", defaults.default_limit)?,
            max_limit: get_env_parsed_or("REC_MAX_LIMIT", defaults.max_limit)?,
            collab_weight: get_env_parsed_or("REC_COLLAB_WEIGHT", defaults.weights.collaborative)?,
            content_weight: get_env_parsed_or("REC_CONTENT_WEIGHT", defaults.weights.content)?,
            trending_decay: get_env_parsed_or("REC_TRENDING_DECAY", defaults.trending_decay)?,
        })
    }
}

impl MetricsConfig {
    fn from_env() -> Result<Self> {
        let retention = match get_env_or("METRICS_RETENTION_DAYS", "").as_str() {
            "" => None,
            _ => Some(retention_days(get_env_parsed("METRICS_RETENTION_DAYS")?)?),
        };

        let snapshot_path = {
            let s = get_env_or("METRICS_SNAPSHOT_PATH", "");
            if s.is_empty() {
                None
            } else {
                Some(PathBuf::from(s))
            }
        };

        Ok(Self {
            retention,
            compaction_interval: Duration::from_secs(get_env_parsed_or(
                "METRICS_COMPACTION_SECS",
                3600,
            )?),
            snapshot_path,
            prometheus_port: get_env_parsed_or("METRICS_PROMETHEUS_PORT", 9000)?,
        })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let format = match get_env_or("LOG_FORMAT", "pretty").to_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => {
                return Err(Error::InvalidConfig {
                    key: "LOG_FORMAT",
                    message: format!("expected 'pretty' or 'json', got '{}'", other).into(),
                })
            }
        };

        Ok(Self { format })
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Get required environment variable
fn get_env(key: &'static str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::MissingEnvVar { var: key })
}

/// Get environment variable with default
fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get and parse environment variable
/// Range-check a day count before building a `chrono::Duration`, which panics
/// past its own bounds
fn retention_days(days: i64) -> Result<chrono::Duration> {
    if !(1..=MAX_RETENTION_DAYS).contains(&days) {
        return Err(Error::InvalidConfig {
            key: "METRICS_RETENTION_DAYS",
            message: format!(
                "retention must be between 1 and {} days, got {}",
                MAX_RETENTION_DAYS, days
            )
            .into(),
        });
    }
    Ok(chrono::Duration::days(days))
}

fn get_env_parsed<T: std::str::FromStr>(key: &'static str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let value = get_env(key)?;
    parse_value(key, &value)
}

/// Parse an optional environment variable; malformed values are an error, not
/// silently replaced by the default
fn get_env_parsed_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => parse_value(key, &value),
        _ => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| Error::InvalidConfig {
        key,
        message: format!("Invalid value '{}': {}", value, e).into(),
    })
}
