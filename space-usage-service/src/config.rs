// Space Usage Service - Environment configuration
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Service configuration per deployment environment.
//!
//! Every environment analyses fifteen-minute windows. Development runs
//! against local services on every second; the other environments run on
//! the quarter hour and read upstream base URLs from the environment.
//! A JSON file can override any field.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upstream base URL variable for the space usage API.
pub const SPACE_USAGE_API_ENV: &str = "SPACE_USAGE_API_BASE_URL";

/// Upstream base URL variable for the recording API.
pub const RECORDING_API_ENV: &str = "RECORDING_API_BASE_URL";

/// Analysis window length in milliseconds.
pub const DEFAULT_ANALYSIS_PERIOD_MS: u64 = 900_000;

/// Longest accepted analysis window, one week in milliseconds.
pub const MAX_ANALYSIS_PERIOD_MS: u64 = 7 * 24 * 3_600_000;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment titled {0} was not found")]
    UnknownEnvironment(String),

    #[error("Missing {0} for this environment")]
    MissingBaseUrl(&'static str),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid snapshot length: {0}")]
    InvalidSnapshotLength(String),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Test,
    Qa,
    Production,
}

impl Environment {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "development" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "qa" => Ok(Self::Qa),
            "production" => Ok(Self::Production),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Qa => "qa",
            Self::Production => "production",
        }
    }
}

/// When analyses run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Length of the analysed window, in milliseconds.
    pub usage_analysis_period_ms: u64,
    /// Minutes of the hour at which a run may start.
    pub minutes_of_hour: Vec<u32>,
    /// Seconds of the minute at which a run may start.
    pub seconds_of_minute: Vec<u32>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            usage_analysis_period_ms: DEFAULT_ANALYSIS_PERIOD_MS,
            minutes_of_hour: vec![0, 15, 30, 45],
            seconds_of_minute: vec![0],
        }
    }
}

impl ScheduleConfig {
    /// Run on every second of every minute.
    pub fn every_second() -> Self {
        Self {
            usage_analysis_period_ms: DEFAULT_ANALYSIS_PERIOD_MS,
            minutes_of_hour: (0..60).collect(),
            seconds_of_minute: (0..60).collect(),
        }
    }

    pub fn analysis_period(&self) -> Duration {
        Duration::from_millis(self.usage_analysis_period_ms)
    }

    /// Check that the schedule can fire at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.usage_analysis_period_ms == 0 {
            return Err(ConfigError::InvalidSchedule(
                "analysis period must be positive".to_string(),
            ));
        }
        if self.usage_analysis_period_ms > MAX_ANALYSIS_PERIOD_MS {
            return Err(ConfigError::InvalidSchedule(format!(
                "analysis period {} ms exceeds {} ms",
                self.usage_analysis_period_ms, MAX_ANALYSIS_PERIOD_MS
            )));
        }
        if self.minutes_of_hour.is_empty() || self.seconds_of_minute.is_empty() {
            return Err(ConfigError::InvalidSchedule(
                "at least one minute and one second are required".to_string(),
            ));
        }
        if let Some(m) = self.minutes_of_hour.iter().find(|m| **m > 59) {
            return Err(ConfigError::InvalidSchedule(format!("minute {} out of range", m)));
        }
        if let Some(s) = self.seconds_of_minute.iter().find(|s| **s > 59) {
            return Err(ConfigError::InvalidSchedule(format!("second {} out of range", s)));
        }
        Ok(())
    }
}

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub environment: Environment,
    /// Port of the metrics and health server.
    pub port: u16,
    pub schedule: ScheduleConfig,
    /// Snapshot length in milliseconds; defaults to the analysis period.
    #[serde(default)]
    pub snapshot_length_ms: Option<u64>,
    pub space_usage_api_base_url: String,
    pub recording_api_base_url: String,
    /// Bound on concurrent recordings requests.
    #[serde(default)]
    pub max_in_flight: Option<usize>,
    /// Upstream request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl ServiceConfig {
    /// Built-in configuration for an environment name.
    pub fn for_environment(name: &str) -> Result<Self, ConfigError> {
        Self::for_environment_with(name, |key| std::env::var(key).ok())
    }

    /// Built-in configuration, reading variables through `lookup`.
    pub fn for_environment_with<F>(name: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = Environment::parse(name)?;
        let (schedule, space_usage, recording) = match environment {
            Environment::Development => (
                ScheduleConfig::every_second(),
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
            ),
            Environment::Test | Environment::Qa | Environment::Production => (
                ScheduleConfig::default(),
                lookup(SPACE_USAGE_API_ENV).ok_or(ConfigError::MissingBaseUrl(SPACE_USAGE_API_ENV))?,
                lookup(RECORDING_API_ENV).ok_or(ConfigError::MissingBaseUrl(RECORDING_API_ENV))?,
            ),
        };

        Ok(Self {
            environment,
            port: 3002,
            schedule,
            snapshot_length_ms: None,
            space_usage_api_base_url: space_usage,
            recording_api_base_url: recording,
            max_in_flight: None,
            request_timeout_ms: default_request_timeout_ms(),
        })
    }

    /// Load a complete configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every scheduled run can be analysed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.schedule.validate()?;
        match self.snapshot_length_ms {
            Some(0) => Err(ConfigError::InvalidSnapshotLength(
                "snapshot length must be positive".to_string(),
            )),
            Some(ms) if ms > self.schedule.usage_analysis_period_ms => {
                Err(ConfigError::InvalidSnapshotLength(format!(
                    "snapshot length {} ms exceeds the analysis period",
                    ms
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn snapshot_length(&self) -> Duration {
        self.snapshot_length_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.schedule.analysis_period())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
