//! Click-through Metrics
//!
//! Records which videos were recommended to whom and which ones were clicked, and
//! answers CTR and engagement questions over time windows.
//!
//! ## Layout
//!
//! - **events**: immutable recommendation/click events and the per-day counters
//! - **store**: the `MetricsStore` owning the logs, with CTR, summary, history,
//!   compaction and snapshot/replay
//! - **summary**: owned read models returned to callers
//! - **clock**: injectable time source

pub mod clock;
pub mod events;
pub mod store;
pub mod summary;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{ClickEvent, DailyStats, MetricsEvent, RecommendationEvent};
pub use store::{MetricsSnapshot, MetricsStore};
pub use summary::{CompactionReport, CtrBreakdown, DayRecord, MetricsSummary};
