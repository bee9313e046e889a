// Space Usage - WiFi occupancy estimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Space usage orchestration
//!
//! [`SpaceUsageCalculator`] turns one collection batch into one summary per
//! space. Each invocation registers its own handler, scoped to its batch,
//! and removes it when the batch reports `all-retrieved`. Repeated or
//! overlapping invocations therefore never see each other's signals and
//! never leave handlers behind.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::clients::SpaceUsageReportingClient;
use crate::collector::RecordingsByTimeframeCollector;
use crate::dedupe::RecordingsDeduplicator;
use crate::error::{CalculationError, ReportingError};
use crate::estimator::OccupancyEstimator;
use crate::model::{SpaceUsageSummary, UsagePeriod, UsageRequest};
use crate::reporting::{ReportingStats, ReportingSupervisor};
use crate::signal::{BatchReport, CollectorSignal, SignalFilter, SignalKind, SpaceRecordings, Subscription};

/// Orchestrates collection, estimation and reporting
pub struct SpaceUsageCalculator {
    collector: Arc<RecordingsByTimeframeCollector>,
    reporter: Arc<dyn SpaceUsageReportingClient>,
    deduplicator: RecordingsDeduplicator,
    supervisor: Arc<ReportingSupervisor>,
}

impl SpaceUsageCalculator {
    pub fn new(
        collector: Arc<RecordingsByTimeframeCollector>,
        reporter: Arc<dyn SpaceUsageReportingClient>,
    ) -> Self {
        Self {
            collector,
            reporter,
            deduplicator: RecordingsDeduplicator::new(),
            supervisor: Arc::new(ReportingSupervisor::new()),
        }
    }

    pub fn collector(&self) -> &RecordingsByTimeframeCollector {
        &self.collector
    }

    /// Compute and report the usage of every space for one window
    ///
    /// Returns once every space of the batch has been processed. Summaries
    /// are reported in the background; use [`Self::wait_for_reports`] to
    /// wait for them.
    ///
    /// # Errors
    ///
    /// Returns [`CalculationError::InvalidRequest`] before any I/O if the
    /// window is empty or inverted or the snapshot length is zero, and
    /// [`CalculationError::Collection`] if the batch hit a fatal upstream
    /// failure. Summaries of spaces processed before the failure are still
    /// reported.
    pub async fn calculate_space_usage(
        &self,
        request: UsageRequest,
    ) -> Result<BatchReport, CalculationError> {
        request.validate()?;

        let batch = self.collector.open_batch(request.timeframe());
        let id = batch.id();
        let signals = self.collector.signals();

        let handler = SpaceHandler {
            snapshot_length: request.snapshot_length,
            deduplicator: self.deduplicator,
            reporter: Arc::clone(&self.reporter),
            supervisor: Arc::clone(&self.supervisor),
        };
        let scoped: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(Some(
            signals.subscribe(
                SignalFilter::batch(id).kind(SignalKind::RecordingsReady),
                move |signal| {
                    if let CollectorSignal::RecordingsReady(ready) = signal {
                        handler.handle(ready);
                    }
                },
            ),
        )));

        let release = Arc::clone(&scoped);
        let cleanup = signals.subscribe_once(
            SignalFilter::batch(id).kind(SignalKind::AllRetrieved),
            move |_| {
                if let Some(subscription) = release.lock().take() {
                    subscription.unsubscribe();
                }
            },
        );

        log::debug!("{}: calculating space usage", id);
        let result = batch.run().await;

        drop(cleanup);
        // all-retrieved normally released it already
        if let Some(subscription) = scoped.lock().take() {
            subscription.unsubscribe();
        }

        Ok(result?)
    }

    /// Wait until every summary submitted so far has been reported
    pub async fn wait_for_reports(&self) {
        self.supervisor.wait_idle().await;
    }

    /// Receiver of reporting failures; only the first caller gets it
    pub fn reporting_failures(&self) -> Option<mpsc::UnboundedReceiver<ReportingError>> {
        self.supervisor.failures()
    }

    pub fn reporting_stats(&self) -> &ReportingStats {
        self.supervisor.stats()
    }
}

/// State bound to one invocation
struct SpaceHandler {
    snapshot_length: Duration,
    deduplicator: RecordingsDeduplicator,
    reporter: Arc<dyn SpaceUsageReportingClient>,
    supervisor: Arc<ReportingSupervisor>,
}

impl SpaceHandler {
    fn handle(&self, ready: &SpaceRecordings) {
        let period = match UsagePeriod::new(
            ready.space_id.clone(),
            ready.start_time,
            ready.end_time,
            self.snapshot_length,
        ) {
            Ok(period) => period,
            Err(err) => {
                log::error!("space {}: invalid usage period: {}", ready.space_id, err);
                return;
            }
        };

        let estimator = OccupancyEstimator::for_period(&period);
        let in_window = estimator.within_window(&ready.recordings);
        let breakdown = estimator.breakdown(&in_window);
        let people = estimator.estimate(&self.deduplicator.dedupe(in_window));
        log::debug!(
            "{}: space {} had {} people, {} visits, peak {} ({} recordings)",
            ready.batch,
            ready.space_id,
            people,
            breakdown.visits,
            breakdown.peak(),
            ready.recordings.len()
        );

        let summary = SpaceUsageSummary::for_period(&period, people);
        self.supervisor.submit(Arc::clone(&self.reporter), summary);
    }
}
