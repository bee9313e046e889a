// Space Usage - WiFi occupancy estimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Recordings deduplication
//!
//! A device seen several times in one space and window must count once.
//! [`RecordingsDeduplicator::dedupe`] keeps the first detection of every
//! device, in input order, and drops the rest.

use std::collections::HashSet;

use crate::model::Recording;

/// Collapses repeated detections of the same device
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordingsDeduplicator;

impl RecordingsDeduplicator {
    pub fn new() -> Self {
        Self
    }

    /// Keep the first detection of each device
    ///
    /// Surviving entries keep their relative order, so applying this twice
    /// gives the same list as applying it once.
    pub fn dedupe(&self, recordings: Vec<Recording>) -> Vec<Recording> {
        let mut seen: HashSet<String> = HashSet::with_capacity(recordings.len());
        recordings
            .into_iter()
            .filter(|recording| seen.insert(recording.device_id.clone()))
            .collect()
    }

    /// Number of distinct devices without building the deduped list
    pub fn distinct_devices(&self, recordings: &[Recording]) -> usize {
        recordings
            .iter()
            .map(|recording| recording.device_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}
