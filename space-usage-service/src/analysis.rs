// Space Usage Service - Scheduled analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Scheduled analysis loop.
//!
//! Each run analyses the window that just closed, waits for its summaries
//! to be reported, then updates the Prometheus metrics and the status
//! served on `/status`.

use crate::config::ScheduleConfig;
use crate::metrics::{
    record_batch, record_failed_run, record_reporting_failure, record_run_finished,
    record_run_started, record_summary,
};
use crate::schedule::{closed_window, last_closed_window, next_run_after};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use space_usage::{
    BatchReport, CalculationError, ReportingError, SpaceUsageCalculator, SpaceUsageReportingClient,
    SpaceUsageSummary, Timeframe, UpstreamError, UsageRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

/// Reporting client decorator feeding the reporting metrics.
pub struct MeteredReporter {
    inner: Arc<dyn SpaceUsageReportingClient>,
}

impl MeteredReporter {
    pub fn new(inner: Arc<dyn SpaceUsageReportingClient>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl SpaceUsageReportingClient for MeteredReporter {
    async fn save_space_usage(&self, summary: &SpaceUsageSummary) -> Result<(), UpstreamError> {
        let result = self.inner.save_space_usage(summary).await;
        match &result {
            Ok(()) => record_summary(summary),
            Err(_) => record_reporting_failure(),
        }
        result
    }
}

/// Outcome of the last finished run.
#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub spaces: usize,
    pub delivered: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run state shared with the HTTP handlers.
#[derive(Debug, Default)]
pub struct AnalysisStatus {
    last_run: RwLock<Option<LastRun>>,
    last_reporting_failure: RwLock<Option<String>>,
}

impl AnalysisStatus {
    pub async fn last_run(&self) -> Option<LastRun> {
        self.last_run.read().await.clone()
    }

    pub async fn last_reporting_failure(&self) -> Option<String> {
        self.last_reporting_failure.read().await.clone()
    }

    async fn set_last_run(&self, run: LastRun) {
        *self.last_run.write().await = Some(run);
    }

    async fn set_reporting_failure(&self, failure: &ReportingError) {
        *self.last_reporting_failure.write().await =
            Some(format!("space {}: {}", failure.space_id(), failure));
    }
}

/// Drives the calculator on the configured schedule.
pub struct Analyzer {
    calculator: SpaceUsageCalculator,
    schedule: ScheduleConfig,
    snapshot_length: Duration,
    status: Arc<AnalysisStatus>,
}

impl Analyzer {
    pub fn new(calculator: SpaceUsageCalculator, schedule: ScheduleConfig, snapshot_length: Duration) -> Self {
        Self {
            calculator,
            schedule,
            snapshot_length,
            status: Arc::new(AnalysisStatus::default()),
        }
    }

    pub fn status(&self) -> Arc<AnalysisStatus> {
        Arc::clone(&self.status)
    }

    /// Forward reporting failures into the status until the calculator is dropped.
    pub fn watch_reporting_failures(&self) -> Option<tokio::task::JoinHandle<()>> {
        let mut failures: mpsc::UnboundedReceiver<ReportingError> =
            self.calculator.reporting_failures()?;
        let status = Arc::clone(&self.status);
        Some(tokio::spawn(async move {
            while let Some(failure) = failures.recv().await {
                status.set_reporting_failure(&failure).await;
            }
        }))
    }

    /// Analyse one window and wait for its summaries to be reported.
    pub async fn run_window(&self, window: Timeframe) -> Result<BatchReport, CalculationError> {
        record_run_started();
        info!(
            "Analysing space usage from {} to {}",
            window.start_time, window.end_time
        );

        let request = UsageRequest::new(window.start_time, window.end_time, self.snapshot_length);
        let result = self.calculator.calculate_space_usage(request).await;
        self.calculator.wait_for_reports().await;

        let finished_at = Utc::now();
        let mut last_run = LastRun {
            window_start: window.start_time,
            window_end: window.end_time,
            finished_at,
            spaces: 0,
            delivered: 0,
            skipped: 0,
            error: None,
        };
        match &result {
            Ok(report) => {
                record_batch(report);
                last_run.spaces = report.spaces;
                last_run.delivered = report.delivered;
                last_run.skipped = report.skipped.len();
                info!(
                    "Analysis finished: {} spaces, {} analysed, {} skipped",
                    report.spaces,
                    report.delivered,
                    report.skipped.len()
                );
            }
            Err(e) => {
                record_failed_run();
                last_run.error = Some(e.to_string());
                error!("Analysis failed: {}", e);
            }
        }
        record_run_finished(finished_at.timestamp());
        self.status.set_last_run(last_run).await;

        result
    }

    /// Analyse the most recent closed window.
    pub async fn run_last_window(&self) -> Result<BatchReport, CalculationError> {
        let now = Utc::now();
        let window = last_closed_window(&self.schedule, now).unwrap_or_else(|| {
            warn!("Schedule has no boundary in the last hour, analysing the trailing period");
            closed_window(now, self.schedule.usage_analysis_period_ms)
        });
        self.run_window(window).await
    }

    /// Run on every scheduled boundary until the task is dropped.
    pub async fn run(&self) {
        loop {
            let now = Utc::now();
            let Some(next) = next_run_after(&self.schedule, now) else {
                error!("Schedule never fires, stopping analysis loop");
                return;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            let window = closed_window(next, self.schedule.usage_analysis_period_ms);
            // failures are already logged and counted
            let _ = self.run_window(window).await;
        }
    }
}
