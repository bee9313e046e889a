// Space Usage Service - Analysis schedule
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Run boundaries and analysed windows.

use chrono::{DateTime, TimeZone, Utc};
use space_usage::Timeframe;

use crate::config::ScheduleConfig;

/// First scheduled instant strictly after `now`.
///
/// Returns `None` when the schedule has no minute or no second.
pub fn next_run_after(schedule: &ScheduleConfig, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut minutes = schedule.minutes_of_hour.clone();
    let mut seconds = schedule.seconds_of_minute.clone();
    minutes.sort_unstable();
    seconds.sort_unstable();

    let now_secs = now.timestamp();
    let hour_start = now_secs - now_secs.rem_euclid(3600);

    for hour in 0..2i64 {
        for minute in &minutes {
            for second in &seconds {
                let candidate = hour_start + hour * 3600 + i64::from(*minute) * 60 + i64::from(*second);
                let candidate = Utc.timestamp_opt(candidate, 0).single()?;
                if candidate > now {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

/// Window of `period_ms` that closes at `boundary`.
pub fn closed_window(boundary: DateTime<Utc>, period_ms: u64) -> Timeframe {
    let period = chrono::Duration::milliseconds(i64::try_from(period_ms).unwrap_or(i64::MAX));
    let start = boundary
        .checked_sub_signed(period)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    Timeframe::new(start, boundary)
}

/// Latest window of `period_ms` closed at or before `now`, aligned on the schedule.
pub fn last_closed_window(schedule: &ScheduleConfig, now: DateTime<Utc>) -> Option<Timeframe> {
    let period_ms = schedule.usage_analysis_period_ms;
    let lookback = now - chrono::Duration::hours(1) - chrono::Duration::seconds(1);

    let mut boundary = next_run_after(schedule, lookback)?;
    while let Some(next) = next_run_after(schedule, boundary) {
        if next > now {
            break;
        }
        boundary = next;
    }
    if boundary > now {
        return None;
    }
    Some(closed_window(boundary, period_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 9, 8, h, m, s).unwrap()
    }

    #[test]
    fn test_next_quarter_hour() {
        let schedule = ScheduleConfig::default();
        assert_eq!(next_run_after(&schedule, at(13, 7, 12)), Some(at(13, 15, 0)));
        assert_eq!(next_run_after(&schedule, at(13, 15, 0)), Some(at(13, 30, 0)));
        assert_eq!(next_run_after(&schedule, at(13, 52, 0)), Some(at(14, 0, 0)));
    }

    #[test]
    fn test_next_run_wraps_day() {
        let schedule = ScheduleConfig::default();
        let next = next_run_after(&schedule, at(23, 59, 59)).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2018, 9, 9, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_every_second() {
        let schedule = ScheduleConfig::every_second();
        assert_eq!(next_run_after(&schedule, at(13, 7, 12)), Some(at(13, 7, 13)));
    }

    #[test]
    fn test_unsorted_schedule() {
        let schedule = ScheduleConfig {
            minutes_of_hour: vec![45, 0, 30, 15],
            ..ScheduleConfig::default()
        };
        assert_eq!(next_run_after(&schedule, at(13, 20, 0)), Some(at(13, 30, 0)));
    }

    #[test]
    fn test_empty_schedule() {
        let schedule = ScheduleConfig {
            minutes_of_hour: Vec::new(),
            ..ScheduleConfig::default()
        };
        assert_eq!(next_run_after(&schedule, at(13, 20, 0)), None);
    }

    #[test]
    fn test_closed_window() {
        let window = closed_window(at(13, 15, 0), 900_000);
        assert_eq!(window.start_time, at(13, 0, 0));
        assert_eq!(window.end_time, at(13, 15, 0));
    }

    #[test]
    fn test_closed_window_with_oversized_period() {
        let window = closed_window(at(13, 15, 0), u64::MAX);
        assert_eq!(window.start_time, DateTime::<Utc>::MIN_UTC);
        assert_eq!(window.end_time, at(13, 15, 0));
    }

    #[test]
    fn test_last_closed_window() {
        let schedule = ScheduleConfig::default();
        let window = last_closed_window(&schedule, at(13, 22, 5)).unwrap();
        assert_eq!(window.start_time, at(13, 0, 0));
        assert_eq!(window.end_time, at(13, 15, 0));

        let on_boundary = last_closed_window(&schedule, at(13, 30, 0)).unwrap();
        assert_eq!(on_boundary.end_time, at(13, 30, 0));
    }
}
