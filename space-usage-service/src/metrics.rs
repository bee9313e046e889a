// Space Usage Service - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for space usage analysis.
//!
//! This module defines all Prometheus metrics exposed by the service
//! and provides functions to update them after each analysis run.

use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_gauge_vec, register_int_counter, Encoder, Gauge, GaugeVec, IntCounter,
    TextEncoder,
};
use space_usage::{BatchReport, SpaceUsageSummary};

lazy_static! {
    // ============================================================
    // Analysis Runs
    // ============================================================

    /// Analysis runs started.
    pub static ref RUNS_TOTAL: IntCounter = register_int_counter!(
        "space_usage_runs_total",
        "Space usage analysis runs started"
    ).unwrap();

    /// Analysis runs that ended with an upstream failure.
    pub static ref FAILED_RUNS_TOTAL: IntCounter = register_int_counter!(
        "space_usage_failed_runs_total",
        "Space usage analysis runs that failed"
    ).unwrap();

    /// Unix time of the last finished run, in seconds.
    pub static ref LAST_RUN_TIMESTAMP: Gauge = register_gauge!(
        "space_usage_last_run_timestamp_seconds",
        "Unix time of the last finished analysis run"
    ).unwrap();

    // ============================================================
    // Spaces
    // ============================================================

    /// Spaces whose recordings were analysed.
    pub static ref SPACES_ANALYSED_TOTAL: IntCounter = register_int_counter!(
        "space_usage_spaces_analysed_total",
        "Spaces whose recordings were analysed"
    ).unwrap();

    /// Spaces skipped because no recordings were found.
    pub static ref SPACES_SKIPPED_TOTAL: IntCounter = register_int_counter!(
        "space_usage_spaces_skipped_total",
        "Spaces skipped because no recordings were found"
    ).unwrap();

    /// People recorded in the last reported window (labeled by space ID).
    pub static ref PEOPLE_RECORDED: GaugeVec = register_gauge_vec!(
        "space_usage_people_recorded",
        "People recorded in the last reported window",
        &["space"]
    ).unwrap();

    // ============================================================
    // Reporting
    // ============================================================

    /// Summaries accepted by the space usage API.
    pub static ref SUMMARIES_REPORTED_TOTAL: IntCounter = register_int_counter!(
        "space_usage_summaries_reported_total",
        "Summaries accepted by the space usage API"
    ).unwrap();

    /// Summaries that failed to persist.
    pub static ref REPORTING_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "space_usage_reporting_failures_total",
        "Summaries that failed to persist"
    ).unwrap();
}

/// Record the start of a run.
pub fn record_run_started() {
    RUNS_TOTAL.inc();
}

/// Record the outcome of a run's collection batch.
pub fn record_batch(report: &BatchReport) {
    SPACES_ANALYSED_TOTAL.inc_by(report.delivered as u64);
    SPACES_SKIPPED_TOTAL.inc_by(report.skipped.len() as u64);
}

/// Record a run that ended with an upstream failure.
pub fn record_failed_run() {
    FAILED_RUNS_TOTAL.inc();
}

/// Record the end of a run.
pub fn record_run_finished(unix_seconds: i64) {
    LAST_RUN_TIMESTAMP.set(unix_seconds as f64);
}

/// Record a summary accepted downstream.
pub fn record_summary(summary: &SpaceUsageSummary) {
    SUMMARIES_REPORTED_TOTAL.inc();
    PEOPLE_RECORDED
        .with_label_values(&[summary.space_id.as_str()])
        .set(summary.number_of_people_recorded as f64);
}

/// Increment reporting failure counter.
pub fn record_reporting_failure() {
    REPORTING_FAILURES_TOTAL.inc();
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use space_usage::{BatchId, SpaceId};

    #[test]
    fn test_record_batch() {
        let before = SPACES_SKIPPED_TOTAL.get();
        let report = BatchReport {
            spaces: 3,
            delivered: 2,
            skipped: vec![SpaceId::from("3C")],
            ..BatchReport::empty(BatchId::new(1))
        };
        record_batch(&report);
        assert!(SPACES_SKIPPED_TOTAL.get() >= before + 1);
    }

    #[test]
    fn test_encode_metrics() {
        let start = Utc.with_ymd_and_hms(2018, 9, 8, 13, 0, 0).unwrap();
        record_run_started();
        record_summary(&SpaceUsageSummary {
            space_id: SpaceId::from("1A"),
            usage_period_start_time: start,
            usage_period_end_time: start + chrono::Duration::minutes(15),
            number_of_people_recorded: 4,
        });
        record_run_finished(start.timestamp());

        let output = encode_metrics();
        assert!(output.contains("space_usage_runs_total"));
        assert!(output.contains("space_usage_people_recorded{space=\"1A\"} 4"));
        assert!(output.contains("space_usage_last_run_timestamp_seconds"));
    }
}
