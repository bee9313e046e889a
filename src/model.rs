// Space Usage - WiFi occupancy estimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Data model
//!
//! Spaces, raw WiFi detections, usage periods and the summaries forwarded
//! downstream. Timestamps are `DateTime<Utc>` in memory and epoch
//! milliseconds on the wire.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::UsageError;

/// Stable identifier of a monitored space
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceId(String);

impl SpaceId {
    /// Create a space identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpaceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SpaceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A monitored physical area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    #[serde(rename = "_id", alias = "id")]
    pub id: SpaceId,
}

impl Space {
    pub fn new(id: impl Into<SpaceId>) -> Self {
        Self { id: id.into() }
    }
}

/// One WiFi presence detection
///
/// Only the device identifier and the detection time are interpreted; every
/// other field the recordings API sends is kept in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    /// Identifier of the detected device (usually a hashed MAC address)
    #[serde(alias = "macAddress", alias = "device")]
    pub device_id: String,

    /// When the device was seen
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub detected_at: DateTime<Utc>,

    /// Pass-through fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Recording {
    /// Create a detection with no extra fields
    pub fn new(device_id: impl Into<String>, detected_at: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            detected_at,
            extra: Map::new(),
        }
    }

    /// Attach a pass-through field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Requested retrieval window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeframe {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Timeframe {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time,
        }
    }
}

/// Parameters of one per-space recordings request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingsQuery {
    pub space_id: SpaceId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_time: DateTime<Utc>,
}

impl RecordingsQuery {
    /// Query for one space over a timeframe
    pub fn for_space(space_id: SpaceId, timeframe: Timeframe) -> Self {
        Self {
            space_id,
            start_time: timeframe.start_time,
            end_time: timeframe.end_time,
        }
    }
}

fn check_window(
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    snapshot_length: Duration,
) -> Result<(), UsageError> {
    if start_time >= end_time {
        return Err(UsageError::InvalidWindow {
            start_ms: start_time.timestamp_millis(),
            end_ms: end_time.timestamp_millis(),
        });
    }
    if snapshot_length.is_zero() {
        return Err(UsageError::ZeroSnapshotLength);
    }
    Ok(())
}

/// Parameters of one `calculate_space_usage` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Expected re-detection interval of a device that stays in the space
    pub snapshot_length: Duration,
}

impl UsageRequest {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>, snapshot_length: Duration) -> Self {
        Self {
            start_time,
            end_time,
            snapshot_length,
        }
    }

    /// Check `start < end` and `snapshot_length > 0`
    pub fn validate(&self) -> Result<(), UsageError> {
        check_window(self.start_time, self.end_time, self.snapshot_length)
    }

    pub fn timeframe(&self) -> Timeframe {
        Timeframe::new(self.start_time, self.end_time)
    }
}

/// Window over which occupancy is estimated for one space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsagePeriod {
    space_id: SpaceId,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    snapshot_length: Duration,
}

impl UsagePeriod {
    /// Create a usage period
    ///
    /// # Errors
    ///
    /// Returns an error if `start_time >= end_time` or if `snapshot_length`
    /// is zero.
    pub fn new(
        space_id: SpaceId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        snapshot_length: Duration,
    ) -> Result<Self, UsageError> {
        check_window(start_time, end_time, snapshot_length)?;
        Ok(Self {
            space_id,
            start_time,
            end_time,
            snapshot_length,
        })
    }

    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn snapshot_length(&self) -> Duration {
        self.snapshot_length
    }
}

/// People count for one space and one window, as sent downstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceUsageSummary {
    pub space_id: SpaceId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub usage_period_start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub usage_period_end_time: DateTime<Utc>,
    pub number_of_people_recorded: u64,
}

impl SpaceUsageSummary {
    /// Summary of a usage period
    pub fn for_period(period: &UsagePeriod, number_of_people_recorded: u64) -> Self {
        Self {
            space_id: period.space_id.clone(),
            usage_period_start_time: period.start_time,
            usage_period_end_time: period.end_time,
            number_of_people_recorded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 12, 10, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_space_accepts_mongo_style_id() {
        let space: Space = serde_json::from_str(r#"{"_id": "1A"}"#).unwrap();
        assert_eq!(space.id.as_str(), "1A");

        let space: Space = serde_json::from_str(r#"{"id": "2A"}"#).unwrap();
        assert_eq!(space.id, SpaceId::from("2A"));
    }

    #[test]
    fn test_recording_keeps_unknown_fields() {
        let json = r#"{"macAddress":"aa:bb","timestamp":976406400000,"rssi":-61,"apId":"ap-3"}"#;
        let recording: Recording = serde_json::from_str(json).unwrap();

        assert_eq!(recording.device_id, "aa:bb");
        assert_eq!(recording.detected_at, t0());
        assert_eq!(recording.extra.get("rssi"), Some(&Value::from(-61)));
        assert_eq!(recording.extra.get("apId"), Some(&Value::from("ap-3")));

        let out = serde_json::to_value(&recording).unwrap();
        assert_eq!(out["deviceId"], "aa:bb");
        assert_eq!(out["timestamp"], 976406400000i64);
        assert_eq!(out["rssi"], -61);
    }

    #[test]
    fn test_usage_period_rejects_inverted_window() {
        let err = UsagePeriod::new(
            SpaceId::from("1A"),
            t0() + chrono::Duration::minutes(15),
            t0(),
            Duration::from_secs(900),
        )
        .unwrap_err();
        assert!(matches!(err, UsageError::InvalidWindow { .. }));

        let err = UsagePeriod::new(SpaceId::from("1A"), t0(), t0(), Duration::from_secs(900)).unwrap_err();
        assert!(matches!(err, UsageError::InvalidWindow { .. }));
    }

    #[test]
    fn test_usage_period_rejects_zero_snapshot() {
        let err = UsagePeriod::new(
            SpaceId::from("1A"),
            t0(),
            t0() + chrono::Duration::minutes(15),
            Duration::ZERO,
        )
        .unwrap_err();
        assert_eq!(err, UsageError::ZeroSnapshotLength);
    }

    #[test]
    fn test_summary_wire_format() {
        let period = UsagePeriod::new(
            SpaceId::from("1A"),
            t0(),
            t0() + chrono::Duration::minutes(15),
            Duration::from_secs(900),
        )
        .unwrap();
        let summary = SpaceUsageSummary::for_period(&period, 2);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "spaceId": "1A",
                "usagePeriodStartTime": 976406400000i64,
                "usagePeriodEndTime": 976407300000i64,
                "numberOfPeopleRecorded": 2,
            })
        );
    }

    #[test]
    fn test_recordings_query_wire_format() {
        let timeframe = Timeframe::new(t0(), t0() + chrono::Duration::minutes(15));
        let query = RecordingsQuery::for_space(SpaceId::from("2A"), timeframe);
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["spaceId"], "2A");
        assert_eq!(json["startTime"], 976406400000i64);
        assert_eq!(json["endTime"], 976407300000i64);
    }
}
