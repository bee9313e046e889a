// Space Usage - WiFi occupancy estimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Supervised summary reporting
//!
//! Summaries are persisted in the background so a slow reporting service
//! never holds up collection. Every submission becomes a task owned by the
//! [`ReportingSupervisor`]; failures are logged, counted and forwarded on a
//! channel instead of being dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinSet;

use crate::clients::SpaceUsageReportingClient;
use crate::error::ReportingError;
use crate::model::SpaceUsageSummary;

/// Owner of in-flight reporting tasks
#[derive(Debug)]
pub struct ReportingSupervisor {
    tasks: Mutex<JoinSet<()>>,
    shared: Arc<Shared>,
    failures_taken: AtomicBool,
}

/// State shared with the reporting tasks
#[derive(Debug, Default)]
struct Shared {
    stats: ReportingStats,
    outstanding: AtomicUsize,
    idle: Notify,
    // None until a listener takes the receiver
    failures_tx: Mutex<Option<mpsc::UnboundedSender<ReportingError>>>,
}

impl Shared {
    fn forward(&self, err: ReportingError) {
        let mut failures = self.failures_tx.lock();
        if let Some(tx) = failures.as_ref() {
            if tx.send(err).is_err() {
                // listener dropped its receiver
                *failures = None;
            }
        }
    }
}

/// Marks one task as outstanding until dropped, even when aborted
struct InFlight(Arc<Shared>);

impl InFlight {
    fn start(shared: &Arc<Shared>) -> Self {
        shared.outstanding.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(shared))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Reporting counters
#[derive(Debug, Default)]
pub struct ReportingStats {
    reported: AtomicU64,
    failed: AtomicU64,
}

impl ReportingStats {
    /// Summaries accepted by the reporting service
    pub fn reported(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }

    /// Summaries that failed to persist
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl Default for ReportingSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportingSupervisor {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
            shared: Arc::new(Shared::default()),
            failures_taken: AtomicBool::new(false),
        }
    }

    /// Persist `summary` in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, reporter: Arc<dyn SpaceUsageReportingClient>, summary: SpaceUsageSummary) {
        let in_flight = InFlight::start(&self.shared);

        let mut tasks = self.tasks.lock();
        reap(&mut tasks);

        tasks.spawn(async move {
            let shared = Arc::clone(&in_flight.0);
            match reporter.save_space_usage(&summary).await {
                Ok(()) => {
                    shared.stats.reported.fetch_add(1, Ordering::Relaxed);
                    log::debug!(
                        "space {}: reported {} people",
                        summary.space_id,
                        summary.number_of_people_recorded
                    );
                }
                Err(err) => {
                    shared.stats.failed.fetch_add(1, Ordering::Relaxed);
                    let err = ReportingError::from_upstream(summary.space_id, err);
                    log::warn!("space {}: reporting failed: {}", err.space_id(), err);
                    shared.forward(err);
                }
            }
            drop(in_flight);
        });
    }

    /// Number of reporting tasks still running
    pub fn pending(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Wait until every submitted task has finished
    ///
    /// Tasks submitted while waiting are awaited too. Any number of callers
    /// may wait at once, and dropping a waiter leaves the tasks running.
    pub async fn wait_idle(&self) {
        loop {
            // registered before the check so a wakeup in between is not lost
            let idle = self.shared.idle.notified();
            if self.pending() == 0 {
                break;
            }
            idle.await;
        }
        reap(&mut self.tasks.lock());
    }

    /// Receiver of reporting failures; only the first caller gets it
    ///
    /// Failures raised before the receiver is taken are logged and counted
    /// but not queued.
    pub fn failures(&self) -> Option<mpsc::UnboundedReceiver<ReportingError>> {
        if self.failures_taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.failures_tx.lock() = Some(tx);
        Some(rx)
    }

    pub fn stats(&self) -> &ReportingStats {
        &self.shared.stats
    }
}

fn reap(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.try_join_next() {
        if let Err(err) = joined {
            log::error!("reporting task aborted: {}", err);
        }
    }
}
