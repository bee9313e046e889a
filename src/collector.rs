// Space Usage - WiFi occupancy estimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-space recordings collection
//!
//! [`RecordingsByTimeframeCollector`] lists the monitored spaces once, then
//! requests the recordings of every space for the requested window. Results
//! are not returned in a list: each space is announced on the signal bus as
//! its request settles, because the number of spaces is only known once the
//! catalog has answered.
//!
//! # Failure policy
//!
//! | Upstream answer                  | Effect                                   |
//! |----------------------------------|------------------------------------------|
//! | catalog not found                | logged, batch completes with no space    |
//! | catalog other failure            | batch fails                              |
//! | recordings not found for a space | logged, space skipped, siblings continue |
//! | recordings other failure         | batch fails once all requests settled    |
//!
//! Whatever the outcome, a batch emits exactly one `all-retrieved` signal,
//! after every dispatched request has settled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::clients::{RecordingsClient, SpaceCatalogClient};
use crate::config::CollectorConfig;
use crate::error::{CollectorError, RecoverableCondition};
use crate::exception::ExceptionLogger;
use crate::model::{RecordingsQuery, Space, Timeframe};
use crate::signal::{BatchId, BatchReport, CollectorSignal, SignalBus, SpaceRecordings};

/// Fan-out engine retrieving recordings for every monitored space
pub struct RecordingsByTimeframeCollector {
    catalog: Arc<dyn SpaceCatalogClient>,
    recordings: Arc<dyn RecordingsClient>,
    logger: Arc<dyn ExceptionLogger>,
    signals: SignalBus,
    config: CollectorConfig,
    next_batch: AtomicU64,
}

impl RecordingsByTimeframeCollector {
    /// Create a collector with default configuration
    pub fn new(
        catalog: Arc<dyn SpaceCatalogClient>,
        recordings: Arc<dyn RecordingsClient>,
        logger: Arc<dyn ExceptionLogger>,
    ) -> Self {
        Self::with_config(catalog, recordings, logger, CollectorConfig::default())
    }

    /// Create a collector with custom configuration
    pub fn with_config(
        catalog: Arc<dyn SpaceCatalogClient>,
        recordings: Arc<dyn RecordingsClient>,
        logger: Arc<dyn ExceptionLogger>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            catalog,
            recordings,
            logger,
            signals: SignalBus::new(),
            config,
            next_batch: AtomicU64::new(1),
        }
    }

    /// Bus on which batches announce their progress
    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Reserve a batch id for `timeframe` without doing any I/O
    ///
    /// Lets a consumer subscribe to the batch before it starts.
    pub fn open_batch(&self, timeframe: Timeframe) -> PendingBatch<'_> {
        let id = BatchId::new(self.next_batch.fetch_add(1, Ordering::Relaxed));
        PendingBatch {
            collector: self,
            id,
            timeframe,
        }
    }

    /// Retrieve the recordings of every space for `timeframe`
    ///
    /// # Errors
    ///
    /// Returns the first fatal upstream failure of the catalog or of any
    /// per-space request. Not-found answers are logged, not returned.
    pub async fn get_all_recordings_by_timeframe(
        &self,
        timeframe: Timeframe,
    ) -> Result<BatchReport, CollectorError> {
        self.open_batch(timeframe).run().await
    }

    async fn list_spaces(&self, batch: BatchId) -> Result<Vec<Space>, CollectorError> {
        match self.catalog.get_spaces().await {
            Ok(spaces) => Ok(spaces),
            Err(err) if err.is_not_found() => {
                log::debug!("{}: space catalog reported no spaces", batch);
                self.logger.log(&RecoverableCondition::NoSpaces {
                    upstream_message: err.upstream_message().map(str::to_owned),
                });
                Ok(Vec::new())
            }
            Err(err) => {
                log::error!("{}: space catalog request failed: {}", batch, err);
                Err(CollectorError::Catalog(err))
            }
        }
    }

    fn finish(&self, report: BatchReport) {
        log::info!(
            "{}: all recordings retrieved ({} spaces, {} delivered, {} skipped{})",
            report.batch,
            report.spaces,
            report.delivered,
            report.skipped.len(),
            if report.failed { ", failed" } else { "" }
        );
        self.signals.emit(&CollectorSignal::AllRetrieved(report));
    }
}

/// A batch whose id is reserved but whose requests are not yet dispatched
#[must_use = "a pending batch does nothing until run"]
pub struct PendingBatch<'a> {
    collector: &'a RecordingsByTimeframeCollector,
    id: BatchId,
    timeframe: Timeframe,
}

impl<'a> PendingBatch<'a> {
    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Dispatch the batch and wait until every request settled
    pub async fn run(self) -> Result<BatchReport, CollectorError> {
        let PendingBatch {
            collector,
            id,
            timeframe,
        } = self;

        log::debug!(
            "{}: collecting recordings from {} to {}",
            id,
            timeframe.start_time,
            timeframe.end_time
        );

        let spaces = match collector.list_spaces(id).await {
            Ok(spaces) => spaces,
            Err(err) => {
                collector.finish(BatchReport {
                    failed: true,
                    ..BatchReport::empty(id)
                });
                return Err(err);
            }
        };

        let mut report = BatchReport {
            spaces: spaces.len(),
            ..BatchReport::empty(id)
        };
        let concurrency = collector.config.concurrency_for(spaces.len());
        let client = &collector.recordings;

        // Requests start in catalog order; they settle in any order.
        let mut settled = stream::iter(spaces)
            .map(move |space| {
                let query = RecordingsQuery::for_space(space.id, timeframe);
                async move {
                    let result = client.get_recordings(&query).await;
                    (query, result)
                }
            })
            .buffer_unordered(concurrency);

        let mut first_failure = None;
        while let Some((query, result)) = settled.next().await {
            match result {
                Ok(recordings) => {
                    log::debug!(
                        "{}: {} recordings for space {}",
                        id,
                        recordings.len(),
                        query.space_id
                    );
                    report.delivered += 1;
                    collector
                        .signals
                        .emit(&CollectorSignal::RecordingsReady(SpaceRecordings {
                            batch: id,
                            space_id: query.space_id,
                            start_time: query.start_time,
                            end_time: query.end_time,
                            recordings,
                        }));
                }
                Err(err) if err.is_not_found() => {
                    collector.logger.log(&RecoverableCondition::NoRecordings {
                        space_id: query.space_id.clone(),
                        upstream_message: err.upstream_message().map(str::to_owned),
                    });
                    report.skipped.push(query.space_id);
                }
                Err(err) => {
                    log::error!(
                        "{}: recordings request for space {} failed: {}",
                        id,
                        query.space_id,
                        err
                    );
                    report.failed = true;
                    if first_failure.is_none() {
                        first_failure = Some(CollectorError::Recordings {
                            space_id: query.space_id,
                            source: err,
                        });
                    }
                }
            }
        }

        collector.finish(report.clone());
        match first_failure {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }
}
