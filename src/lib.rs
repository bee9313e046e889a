//! # Space Usage - WiFi occupancy estimation
//!
//! Estimates how many distinct people were present in each monitored space
//! over a time window, from raw WiFi device detections, and reports the
//! estimate downstream.
//!
//! ## Pipeline
//!
//! - **Collection**: list the spaces once, then fetch the recordings of each
//!   space concurrently, announcing each space as it settles
//! - **Deduplication**: collapse repeated detections of one device
//! - **Estimation**: count distinct devices seen during the window
//! - **Reporting**: persist one summary per space in the background
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use chrono::{TimeZone, Utc};
//! use space_usage::clients::memory::{MemoryRecordingsClient, MemoryReportingClient, MemorySpaceCatalog};
//! use space_usage::{
//!     MemoryExceptionLogger, Recording, RecordingsByTimeframeCollector, SpaceUsageCalculator,
//!     UsageRequest,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let start = Utc.with_ymd_and_hms(2018, 9, 8, 13, 0, 0).unwrap();
//! let end = Utc.with_ymd_and_hms(2018, 9, 8, 13, 15, 0).unwrap();
//!
//! let catalog = Arc::new(MemorySpaceCatalog::with_ids(&["1A", "2A"]));
//! let recordings = Arc::new(MemoryRecordingsClient::with_default(vec![
//!     Recording::new("a4:5e:60:e8:11:01", start),
//!     Recording::new("a4:5e:60:e8:11:02", start),
//! ]));
//! let reporter = Arc::new(MemoryReportingClient::new());
//!
//! let collector = Arc::new(RecordingsByTimeframeCollector::new(
//!     catalog,
//!     recordings,
//!     Arc::new(MemoryExceptionLogger::default()),
//! ));
//! let calculator = SpaceUsageCalculator::new(collector, reporter.clone());
//!
//! calculator
//!     .calculate_space_usage(UsageRequest::new(start, end, Duration::from_secs(900)))
//!     .await
//!     .unwrap();
//! calculator.wait_for_reports().await;
//!
//! assert_eq!(reporter.saved().len(), 2);
//! assert!(reporter.saved().iter().all(|s| s.number_of_people_recorded == 2));
//! # });
//! ```
//!
//! ## Modules
//!
//! - [`model`]: Spaces, recordings, usage periods and summaries
//! - [`signal`]: Collector signals and the subscription bus
//! - [`collector`]: Per-space recordings fan-out
//! - [`dedupe`]: Duplicate detection removal
//! - [`estimator`]: People count over a window
//! - [`calculator`]: Per-invocation orchestration
//! - [`reporting`]: Supervised background reporting
//! - [`clients`]: Upstream collaborator traits and in-memory implementations
//! - [`exception`]: Sinks for recoverable conditions

// Modules
pub mod calculator;
pub mod clients;
pub mod collector;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod estimator;
pub mod exception;
pub mod model;
pub mod reporting;
pub mod signal;

// Re-exports for convenient access
pub use calculator::SpaceUsageCalculator;
pub use clients::{RecordingsClient, SpaceCatalogClient, SpaceUsageReportingClient};
pub use collector::{PendingBatch, RecordingsByTimeframeCollector};
pub use config::CollectorConfig;
pub use dedupe::RecordingsDeduplicator;
pub use error::{
    BoxError, CalculationError, CollectorError, RecoverableCondition, ReportingError,
    UpstreamError, UsageError,
};
pub use estimator::{OccupancyBreakdown, OccupancyEstimator};
pub use exception::{ExceptionLogger, LogExceptionLogger, MemoryExceptionLogger};
pub use model::{
    Recording, RecordingsQuery, Space, SpaceId, SpaceUsageSummary, Timeframe, UsagePeriod,
    UsageRequest,
};
pub use reporting::{ReportingStats, ReportingSupervisor};
pub use signal::{
    BatchId, BatchReport, CollectorSignal, SignalBus, SignalFilter, SignalKind, SpaceRecordings,
    Subscription,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dedupe_then_estimate() {
        use chrono::{TimeZone, Utc};
        use std::time::Duration;

        let start = Utc.with_ymd_and_hms(2018, 9, 8, 13, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2018, 9, 8, 13, 15, 0).unwrap();
        let recordings = vec![
            Recording::new("a", start),
            Recording::new("b", start),
            Recording::new("a", end),
        ];

        let deduped = RecordingsDeduplicator::new().dedupe(recordings);
        let estimator = OccupancyEstimator::new(start, end, Duration::from_secs(900)).unwrap();
        assert_eq!(estimator.estimate(&deduped), 2);
    }
}
