// Space Usage - WiFi occupancy estimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! In-memory collaborators
//!
//! Scriptable stand-ins for the remote services. Each one journals the
//! calls it receives and can be told to fail, per space where it makes sense.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{RecordingsClient, SpaceCatalogClient, SpaceUsageReportingClient};
use crate::error::{UpstreamError, NOT_FOUND_STATUS};
use crate::model::{Recording, RecordingsQuery, Space, SpaceId, SpaceUsageSummary};

/// Failure a memory collaborator answers with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Structured error response
    Status { status: u16, message: String },
    /// Failure without a response
    Transport(String),
}

impl ScriptedFailure {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(NOT_FOUND_STATUS, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    fn to_error(&self) -> UpstreamError {
        match self {
            Self::Status { status, message } => UpstreamError::response(*status, message.clone()),
            Self::Transport(message) => UpstreamError::transport(std::io::Error::new(
                std::io::ErrorKind::Other,
                message.clone(),
            )),
        }
    }
}

/// Fixed space catalog
#[derive(Debug, Default)]
pub struct MemorySpaceCatalog {
    spaces: Mutex<Vec<Space>>,
    failure: Mutex<Option<ScriptedFailure>>,
    calls: AtomicUsize,
}

impl MemorySpaceCatalog {
    pub fn new(spaces: Vec<Space>) -> Self {
        Self {
            spaces: Mutex::new(spaces),
            ..Default::default()
        }
    }

    /// Catalog listing the given space ids in order
    pub fn with_ids(ids: &[&str]) -> Self {
        Self::new(ids.iter().map(|id| Space::new(*id)).collect())
    }

    /// Replace the listed spaces
    pub fn set_spaces(&self, spaces: Vec<Space>) {
        *self.spaces.lock() = spaces;
    }

    /// Answer every following call with a failure
    pub fn fail_with(&self, failure: ScriptedFailure) {
        *self.failure.lock() = Some(failure);
    }

    pub fn clear_failure(&self) {
        *self.failure.lock() = None;
    }

    /// Number of `get_spaces` calls received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpaceCatalogClient for MemorySpaceCatalog {
    async fn get_spaces(&self) -> Result<Vec<Space>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failure.lock().as_ref() {
            return Err(failure.to_error());
        }
        Ok(self.spaces.lock().clone())
    }
}

/// Recordings per space, with optional per-space failures and latency
#[derive(Debug, Default)]
pub struct MemoryRecordingsClient {
    default_recordings: Mutex<Vec<Recording>>,
    per_space: Mutex<HashMap<SpaceId, Vec<Recording>>>,
    failures: Mutex<HashMap<SpaceId, ScriptedFailure>>,
    default_failure: Mutex<Option<ScriptedFailure>>,
    delays: Mutex<HashMap<SpaceId, Duration>>,
    journal: Mutex<Vec<RecordingsQuery>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryRecordingsClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every space without specific recordings with `recordings`
    pub fn with_default(recordings: Vec<Recording>) -> Self {
        Self {
            default_recordings: Mutex::new(recordings),
            ..Default::default()
        }
    }

    /// Recordings returned for one space
    pub fn set_recordings(&self, space_id: impl Into<SpaceId>, recordings: Vec<Recording>) {
        self.per_space.lock().insert(space_id.into(), recordings);
    }

    /// Fail requests for one space
    pub fn fail_space(&self, space_id: impl Into<SpaceId>, failure: ScriptedFailure) {
        self.failures.lock().insert(space_id.into(), failure);
    }

    /// Fail requests for every space without a specific failure
    pub fn fail_all(&self, failure: ScriptedFailure) {
        *self.default_failure.lock() = Some(failure);
    }

    /// Delay the answer for one space
    pub fn delay_space(&self, space_id: impl Into<SpaceId>, delay: Duration) {
        self.delays.lock().insert(space_id.into(), delay);
    }

    /// Queries received, in call order
    pub fn queries(&self) -> Vec<RecordingsQuery> {
        self.journal.lock().clone()
    }

    /// Highest number of concurrent requests observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordingsClient for MemoryRecordingsClient {
    async fn get_recordings(&self, query: &RecordingsQuery) -> Result<Vec<Recording>, UpstreamError> {
        self.journal.lock().push(query.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = self.delays.lock().get(&query.space_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failure = self
            .failures
            .lock()
            .get(&query.space_id)
            .cloned()
            .or_else(|| self.default_failure.lock().clone());
        if let Some(failure) = failure {
            return Err(failure.to_error());
        }

        let recordings = self
            .per_space
            .lock()
            .get(&query.space_id)
            .cloned()
            .unwrap_or_else(|| self.default_recordings.lock().clone());
        Ok(recordings)
    }
}

/// Reporting sink keeping every summary it accepts
#[derive(Debug, Default)]
pub struct MemoryReportingClient {
    saved: Mutex<Vec<SpaceUsageSummary>>,
    failures: Mutex<HashMap<SpaceId, ScriptedFailure>>,
    attempts: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryReportingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every summary after `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Default::default()
        }
    }

    /// Reject summaries of one space
    pub fn fail_space(&self, space_id: impl Into<SpaceId>, failure: ScriptedFailure) {
        self.failures.lock().insert(space_id.into(), failure);
    }

    /// Accepted summaries, in arrival order
    pub fn saved(&self) -> Vec<SpaceUsageSummary> {
        self.saved.lock().clone()
    }

    /// Accepted summaries of one space
    pub fn saved_for(&self, space_id: &SpaceId) -> Vec<SpaceUsageSummary> {
        self.saved
            .lock()
            .iter()
            .filter(|summary| &summary.space_id == space_id)
            .cloned()
            .collect()
    }

    /// Number of `save_space_usage` calls, accepted or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpaceUsageReportingClient for MemoryReportingClient {
    async fn save_space_usage(&self, summary: &SpaceUsageSummary) -> Result<(), UpstreamError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }

        if let Some(failure) = self.failures.lock().get(&summary.space_id) {
            return Err(failure.to_error());
        }
        self.saved.lock().push(summary.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn query(space: &str) -> RecordingsQuery {
        let start = Utc.with_ymd_and_hms(2018, 9, 8, 13, 0, 0).unwrap();
        RecordingsQuery {
            space_id: SpaceId::from(space),
            start_time: start,
            end_time: start + chrono::Duration::minutes(15),
        }
    }

    #[tokio::test]
    async fn test_catalog_lists_spaces_and_counts_calls() {
        let catalog = MemorySpaceCatalog::with_ids(&["1A", "2A"]);
        let spaces = catalog.get_spaces().await.unwrap();
        assert_eq!(spaces, vec![Space::new("1A"), Space::new("2A")]);
        assert_eq!(catalog.calls(), 1);
    }

    #[tokio::test]
    async fn test_catalog_scripted_failure() {
        let catalog = MemorySpaceCatalog::with_ids(&["1A"]);
        catalog.fail_with(ScriptedFailure::status(403, "Unauthorized"));
        let err = catalog.get_spaces().await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.to_string(), "Unauthorized");

        catalog.clear_failure();
        assert!(catalog.get_spaces().await.is_ok());
    }

    #[tokio::test]
    async fn test_recordings_per_space_and_default() {
        let t = Utc.with_ymd_and_hms(2018, 9, 8, 13, 1, 0).unwrap();
        let client = MemoryRecordingsClient::with_default(vec![Recording::new("aa", t)]);
        client.set_recordings("2A", vec![Recording::new("bb", t), Recording::new("cc", t)]);

        assert_eq!(client.get_recordings(&query("1A")).await.unwrap().len(), 1);
        assert_eq!(client.get_recordings(&query("2A")).await.unwrap().len(), 2);
        assert_eq!(client.queries(), vec![query("1A"), query("2A")]);
    }

    #[tokio::test]
    async fn test_recordings_failure_for_one_space() {
        let client = MemoryRecordingsClient::new();
        client.fail_space("1A", ScriptedFailure::not_found("No recordings found"));

        assert!(client.get_recordings(&query("1A")).await.unwrap_err().is_not_found());
        assert!(client.get_recordings(&query("2A")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_has_no_status() {
        let client = MemoryRecordingsClient::new();
        client.fail_all(ScriptedFailure::transport("some error"));
        let err = client.get_recordings(&query("1A")).await.unwrap_err();
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "some error");
    }

    #[tokio::test]
    async fn test_reporting_client_rejects_one_space() {
        let client = MemoryReportingClient::new();
        client.fail_space("2A", ScriptedFailure::status(500, "Internal error"));

        let start = Utc.with_ymd_and_hms(2018, 9, 8, 13, 0, 0).unwrap();
        let summary = |space: &str| SpaceUsageSummary {
            space_id: SpaceId::from(space),
            usage_period_start_time: start,
            usage_period_end_time: start + chrono::Duration::minutes(15),
            number_of_people_recorded: 3,
        };

        assert!(client.save_space_usage(&summary("1A")).await.is_ok());
        assert!(client.save_space_usage(&summary("2A")).await.is_err());
        assert_eq!(client.attempts(), 2);
        assert_eq!(client.saved(), vec![summary("1A")]);
        assert!(client.saved_for(&SpaceId::from("2A")).is_empty());
    }
}
