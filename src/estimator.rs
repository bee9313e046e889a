// Space Usage - WiFi occupancy estimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Occupancy estimation
//!
//! Turns the (deduped) detections of one space into a people count for a
//! usage period. The count is the number of distinct devices detected at
//! least once inside the window, bounds included.
//!
//! The snapshot length partitions the window into consecutive slices:
//!
//! ```text
//!  start                                                 end
//!    |----- slice 0 -----|----- slice 1 -----|-- slice 2 --|
//!        snapshot_length     snapshot_length     remainder
//! ```
//!
//! [`OccupancyEstimator::breakdown`] reports the distinct devices of every
//! occupied slice and the number of visits, where two consecutive
//! detections of the same device further apart than the snapshot length
//! count as a re-entry. The people count never depends on slicing.
//!
//! Restrict detections to the window with
//! [`OccupancyEstimator::within_window`] before deduping: a device first
//! seen before the window and again inside it must still count.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::UsageError;
use crate::model::{Recording, UsagePeriod};

/// Detail of an estimation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OccupancyBreakdown {
    /// Distinct devices detected in the window
    pub people: u64,
    /// Presence visits, re-entries counted separately
    pub visits: u64,
    /// Distinct devices per occupied slice, keyed by slice index
    pub slices: BTreeMap<usize, usize>,
}

impl OccupancyBreakdown {
    /// Highest per-slice device count
    pub fn peak(&self) -> usize {
        self.slices.values().copied().max().unwrap_or(0)
    }

    /// Device count of slice `index`; zero for empty slices
    pub fn slice(&self, index: usize) -> usize {
        self.slices.get(&index).copied().unwrap_or(0)
    }
}

/// People counter for one usage period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyEstimator {
    usage_period_start_time: DateTime<Utc>,
    usage_period_end_time: DateTime<Utc>,
    snapshot_length: Duration,
}

impl OccupancyEstimator {
    /// Create an estimator
    ///
    /// # Errors
    ///
    /// Returns an error if the window is empty or inverted, or if the
    /// snapshot length is zero.
    pub fn new(
        usage_period_start_time: DateTime<Utc>,
        usage_period_end_time: DateTime<Utc>,
        snapshot_length: Duration,
    ) -> Result<Self, UsageError> {
        if usage_period_start_time >= usage_period_end_time {
            return Err(UsageError::InvalidWindow {
                start_ms: usage_period_start_time.timestamp_millis(),
                end_ms: usage_period_end_time.timestamp_millis(),
            });
        }
        if snapshot_length.is_zero() {
            return Err(UsageError::ZeroSnapshotLength);
        }
        Ok(Self {
            usage_period_start_time,
            usage_period_end_time,
            snapshot_length,
        })
    }

    /// Estimator for an already validated usage period
    pub fn for_period(period: &UsagePeriod) -> Self {
        Self {
            usage_period_start_time: period.start_time(),
            usage_period_end_time: period.end_time(),
            snapshot_length: period.snapshot_length(),
        }
    }

    /// Detections inside the window, bounds included, in input order
    pub fn within_window(&self, recordings: &[Recording]) -> Vec<Recording> {
        recordings
            .iter()
            .filter(|recording| self.in_window(recording.detected_at))
            .cloned()
            .collect()
    }

    /// Number of distinct people detected during the window
    pub fn estimate(&self, recordings: &[Recording]) -> u64 {
        recordings
            .iter()
            .filter(|recording| self.in_window(recording.detected_at))
            .map(|recording| recording.device_id.as_str())
            .collect::<HashSet<_>>()
            .len() as u64
    }

    /// Number of slices the window is divided into
    pub fn slice_count(&self) -> usize {
        let window = self.window_ms();
        let snapshot = self.snapshot_ms();
        let full = window / snapshot;
        let count = if window % snapshot == 0 { full } else { full + 1 };
        usize::try_from(count).unwrap_or(usize::MAX)
    }

    /// Per-slice and per-visit detail of an estimation
    pub fn breakdown(&self, recordings: &[Recording]) -> OccupancyBreakdown {
        let mut per_slice: BTreeMap<usize, HashSet<&str>> = BTreeMap::new();
        let mut per_device: HashMap<&str, Vec<DateTime<Utc>>> = HashMap::new();

        for recording in recordings {
            if !self.in_window(recording.detected_at) {
                continue;
            }
            let device = recording.device_id.as_str();
            per_slice
                .entry(self.slice_of(recording.detected_at))
                .or_default()
                .insert(device);
            per_device.entry(device).or_default().push(recording.detected_at);
        }

        let snapshot = self.snapshot_ms();
        let visits = per_device
            .values_mut()
            .map(|times| {
                times.sort_unstable();
                let reentries = times
                    .windows(2)
                    .filter(|pair| (pair[1] - pair[0]).num_milliseconds() > snapshot)
                    .count();
                1 + reentries as u64
            })
            .sum();

        OccupancyBreakdown {
            people: per_device.len() as u64,
            visits,
            slices: per_slice
                .into_iter()
                .map(|(index, devices)| (index, devices.len()))
                .collect(),
        }
    }

    fn in_window(&self, at: DateTime<Utc>) -> bool {
        at >= self.usage_period_start_time && at <= self.usage_period_end_time
    }

    fn slice_of(&self, at: DateTime<Utc>) -> usize {
        let offset = (at - self.usage_period_start_time).num_milliseconds();
        let index = usize::try_from(offset / self.snapshot_ms()).unwrap_or(0);
        // The end bound belongs to the last slice
        index.min(self.slice_count().saturating_sub(1))
    }

    fn window_ms(&self) -> i64 {
        (self.usage_period_end_time - self.usage_period_start_time).num_milliseconds()
    }

    fn snapshot_ms(&self) -> i64 {
        i64::try_from(self.snapshot_length.as_millis())
            .unwrap_or(i64::MAX)
            .max(1)
    }
}
