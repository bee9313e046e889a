// Space Usage - WiFi occupancy estimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for the space usage pipeline
//!
//! Upstream failures are classified once, at the collaborator boundary, into
//! [`UpstreamError`]. Everything above that boundary matches on variants
//! instead of inspecting error shapes.

use std::fmt;

use thiserror::Error;

use crate::model::SpaceId;

/// Boxed error used for failures that carry no upstream response
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// HTTP status used by upstream services to report an empty scope
pub const NOT_FOUND_STATUS: u16 = 404;

/// Failure reported by an upstream collaborator
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The upstream service answered with an error status
    #[error("{}", response_message(.status, .message))]
    Response {
        /// HTTP status code
        status: u16,
        /// Message from the error body, empty when the body had none
        message: String,
    },

    /// No structured response (connection refused, DNS, decode...)
    #[error("{0}")]
    Transport(#[source] BoxError),
}

fn response_message(status: &u16, message: &str) -> String {
    if message.is_empty() {
        format!("upstream returned status {}", status)
    } else {
        message.to_string()
    }
}

impl UpstreamError {
    /// Build a structured upstream response error
    pub fn response(status: u16, message: impl Into<String>) -> Self {
        Self::Response {
            status,
            message: message.into(),
        }
    }

    /// Build a not-found response error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::response(NOT_FOUND_STATUS, message)
    }

    /// Wrap an unstructured transport failure
    pub fn transport(error: impl Into<BoxError>) -> Self {
        Self::Transport(error.into())
    }

    /// Whether the upstream reported that the requested scope is empty
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Response { status, .. } if *status == NOT_FOUND_STATUS)
    }

    /// HTTP status, if the upstream answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Response { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }

    /// Message supplied by the upstream body, if any
    pub fn upstream_message(&self) -> Option<&str> {
        match self {
            Self::Response { message, .. } if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}

/// Invalid usage period or request parameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// Window does not satisfy `start < end`
    #[error("Invalid window: start {start_ms}ms is not before end {end_ms}ms")]
    InvalidWindow { start_ms: i64, end_ms: i64 },

    /// Snapshot length must be positive
    #[error("Snapshot length must be greater than zero")]
    ZeroSnapshotLength,
}

/// Fatal failure of a collection batch
#[derive(Error, Debug)]
pub enum CollectorError {
    /// The space catalog could not be listed
    #[error("{0}")]
    Catalog(UpstreamError),

    /// Recordings for one space could not be retrieved
    #[error("{source}")]
    Recordings {
        space_id: SpaceId,
        source: UpstreamError,
    },
}

impl CollectorError {
    /// The upstream failure behind this error
    pub fn upstream(&self) -> &UpstreamError {
        match self {
            Self::Catalog(source) | Self::Recordings { source, .. } => source,
        }
    }
}

/// Failure persisting a summary downstream
#[derive(Error, Debug)]
pub enum ReportingError {
    /// The reporting service rejected the summary
    #[error("{}", response_message(.status, .message))]
    Rejected {
        space_id: SpaceId,
        status: u16,
        message: String,
    },

    /// The summary never reached the reporting service
    #[error("{source}")]
    Transport { space_id: SpaceId, source: BoxError },
}

impl ReportingError {
    /// Classify an upstream failure for the given space
    pub fn from_upstream(space_id: SpaceId, error: UpstreamError) -> Self {
        match error {
            UpstreamError::Response { status, message } => Self::Rejected {
                space_id,
                status,
                message,
            },
            UpstreamError::Transport(source) => Self::Transport { space_id, source },
        }
    }

    /// Space whose summary failed to persist
    pub fn space_id(&self) -> &SpaceId {
        match self {
            Self::Rejected { space_id, .. } | Self::Transport { space_id, .. } => space_id,
        }
    }
}

/// Failure of a `calculate_space_usage` invocation
#[derive(Error, Debug)]
pub enum CalculationError {
    /// Request parameters rejected before any I/O
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] UsageError),

    /// The collection batch failed
    #[error(transparent)]
    Collection(#[from] CollectorError),
}

/// Recoverable empty-scope condition, logged instead of raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverableCondition {
    /// The catalog reported no spaces
    NoSpaces { upstream_message: Option<String> },

    /// The recordings API reported nothing for one space
    NoRecordings {
        space_id: SpaceId,
        upstream_message: Option<String>,
    },
}

impl RecoverableCondition {
    /// Space concerned by the condition, if scoped to one
    pub fn space_id(&self) -> Option<&SpaceId> {
        match self {
            Self::NoSpaces { .. } => None,
            Self::NoRecordings { space_id, .. } => Some(space_id),
        }
    }
}

impl fmt::Display for RecoverableCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpaces { .. } => write!(f, "No spaces found"),
            Self::NoRecordings {
                upstream_message: Some(message),
                ..
            } => write!(f, "{}", message),
            Self::NoRecordings { space_id, .. } => {
                write!(f, "No recordings found for space {}", space_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_error_displays_upstream_message() {
        let err = UpstreamError::response(403, "Unauthorized");
        assert_eq!(err.to_string(), "Unauthorized");
        assert_eq!(err.status(), Some(403));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_response_error_without_message() {
        let err = UpstreamError::response(502, "");
        assert_eq!(err.to_string(), "upstream returned status 502");
        assert_eq!(err.upstream_message(), None);
    }

    #[test]
    fn test_transport_error_is_unchanged() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let err = UpstreamError::transport(io);
        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_collector_error_surfaces_upstream_message() {
        let err = CollectorError::Recordings {
            space_id: SpaceId::from("1A"),
            source: UpstreamError::response(422, "Incorrect parameters passed"),
        };
        assert_eq!(err.to_string(), "Incorrect parameters passed");
        assert_eq!(err.upstream().status(), Some(422));
    }

    #[test]
    fn test_reporting_error_classification() {
        let rejected =
            ReportingError::from_upstream(SpaceId::from("1A"), UpstreamError::response(400, "Bad input"));
        assert!(matches!(rejected, ReportingError::Rejected { status: 400, .. }));
        assert_eq!(rejected.to_string(), "Bad input");

        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let transport = ReportingError::from_upstream(SpaceId::from("2A"), UpstreamError::transport(io));
        assert_eq!(transport.space_id().as_str(), "2A");
        assert_eq!(transport.to_string(), "timed out");
    }

    #[test]
    fn test_recoverable_condition_display() {
        let none = RecoverableCondition::NoSpaces {
            upstream_message: Some("Not Found".to_string()),
        };
        assert_eq!(none.to_string(), "No spaces found");

        let with_message = RecoverableCondition::NoRecordings {
            space_id: SpaceId::from("1A"),
            upstream_message: Some("No recordings found".to_string()),
        };
        assert_eq!(with_message.to_string(), "No recordings found");

        let bare = RecoverableCondition::NoRecordings {
            space_id: SpaceId::from("2A"),
            upstream_message: None,
        };
        assert_eq!(bare.to_string(), "No recordings found for space 2A");
    }

    #[test]
    fn test_error_conversion() {
        let err: CalculationError = UsageError::ZeroSnapshotLength.into();
        assert!(matches!(err, CalculationError::InvalidRequest(_)));
    }
}
