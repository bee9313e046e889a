// Space Usage - WiFi occupancy estimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Upstream collaborator traits
//!
//! The pipeline talks to three remote services: the space catalog, the
//! recordings API and the space usage reporting API. Transport, access
//! tokens and retries live in the implementations; the pipeline only sees
//! these traits and [`UpstreamError`].
//!
//! In-memory implementations for tests and local runs are in [`memory`].

pub mod memory;

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::model::{Recording, RecordingsQuery, Space, SpaceUsageSummary};

/// Lists monitored spaces
#[async_trait]
pub trait SpaceCatalogClient: Send + Sync {
    /// All monitored spaces, in catalog order
    ///
    /// A not-found response means the catalog is empty.
    async fn get_spaces(&self) -> Result<Vec<Space>, UpstreamError>;
}

/// Lists raw detections for one space and window
#[async_trait]
pub trait RecordingsClient: Send + Sync {
    /// Detections matching the query
    ///
    /// A not-found response means no detections for that space.
    async fn get_recordings(&self, query: &RecordingsQuery) -> Result<Vec<Recording>, UpstreamError>;
}

/// Persists computed summaries
#[async_trait]
pub trait SpaceUsageReportingClient: Send + Sync {
    async fn save_space_usage(&self, summary: &SpaceUsageSummary) -> Result<(), UpstreamError>;
}
