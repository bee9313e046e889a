// Space Usage - WiFi occupancy estimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for the collection pipeline

/// Collector configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Maximum concurrent per-space recordings requests (default: unbounded)
    pub max_in_flight: Option<usize>,
}

impl CollectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound concurrent recordings requests; zero is treated as one
    pub fn with_max_in_flight(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: Some(max_in_flight.max(1)),
        }
    }

    /// Effective concurrency for a batch of `spaces` requests
    pub fn concurrency_for(&self, spaces: usize) -> usize {
        self.max_in_flight.unwrap_or(spaces).clamp(1, spaces.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded() {
        let config = CollectorConfig::default();
        assert_eq!(config.max_in_flight, None);
        assert_eq!(config.concurrency_for(40), 40);
        assert_eq!(config.concurrency_for(0), 1);
    }

    #[test]
    fn test_bounded_concurrency() {
        let config = CollectorConfig::with_max_in_flight(4);
        assert_eq!(config.concurrency_for(40), 4);
        assert_eq!(config.concurrency_for(2), 2);
        assert_eq!(CollectorConfig::with_max_in_flight(0).max_in_flight, Some(1));
    }
}
