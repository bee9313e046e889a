// Space Usage - WiFi occupancy estimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Collector signals and the bus that delivers them
//!
//! The collector announces progress through two signals:
//! - `recordings-ready`: recordings of one space are available
//! - `all-retrieved`: every per-space request of a batch has settled
//!
//! Every signal is tagged with the [`BatchId`] of the
//! `get_all_recordings_by_timeframe` call that produced it, so consumers can
//! scope a handler to one invocation with a [`SignalFilter`].
//!
//! Subscribing returns an owned [`Subscription`]. The handler stays registered
//! until the handle is unsubscribed or dropped, whichever comes first; a
//! one-shot handler is removed by the emission that delivers it.
//!
//! ```rust
//! use space_usage::signal::{BatchId, BatchReport, CollectorSignal, SignalBus, SignalFilter};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let bus = SignalBus::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&seen);
//! let subscription = bus.subscribe(SignalFilter::batch(BatchId::new(1)), move |_| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! bus.emit(&CollectorSignal::AllRetrieved(BatchReport::empty(BatchId::new(1))));
//! bus.emit(&CollectorSignal::AllRetrieved(BatchReport::empty(BatchId::new(2))));
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//!
//! subscription.unsubscribe();
//! assert_eq!(bus.subscriber_count(), 0);
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::model::{Recording, SpaceId};

/// Identifier of one collection batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(u64);

impl BatchId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

/// Recordings retrieved for one space
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceRecordings {
    pub batch: BatchId,
    pub space_id: SpaceId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub recordings: Vec<Recording>,
}

/// Outcome of a batch once every request settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub batch: BatchId,
    /// Spaces listed by the catalog
    pub spaces: usize,
    /// Spaces for which `recordings-ready` was emitted
    pub delivered: usize,
    /// Spaces skipped because the recordings API found nothing
    pub skipped: Vec<SpaceId>,
    /// Whether the batch ended with a fatal upstream failure
    pub failed: bool,
}

impl BatchReport {
    /// Report of a batch that touched no space
    pub fn empty(batch: BatchId) -> Self {
        Self {
            batch,
            spaces: 0,
            delivered: 0,
            skipped: Vec::new(),
            failed: false,
        }
    }
}

/// Kind of collector signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    RecordingsReady,
    AllRetrieved,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::RecordingsReady => "recordings-ready",
            SignalKind::AllRetrieved => "all-retrieved",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal emitted by the recordings collector
#[derive(Debug, Clone, PartialEq)]
pub enum CollectorSignal {
    RecordingsReady(SpaceRecordings),
    AllRetrieved(BatchReport),
}

impl CollectorSignal {
    pub fn batch(&self) -> BatchId {
        match self {
            CollectorSignal::RecordingsReady(ready) => ready.batch,
            CollectorSignal::AllRetrieved(report) => report.batch,
        }
    }

    pub fn kind(&self) -> SignalKind {
        match self {
            CollectorSignal::RecordingsReady(_) => SignalKind::RecordingsReady,
            CollectorSignal::AllRetrieved(_) => SignalKind::AllRetrieved,
        }
    }
}

/// Selects which signals reach a handler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalFilter {
    /// Only signals of this batch
    pub batch: Option<BatchId>,
    /// Only signals of this kind
    pub kind: Option<SignalKind>,
}

impl SignalFilter {
    /// Match every signal
    pub fn any() -> Self {
        Self::default()
    }

    /// Match every signal of one batch
    pub fn batch(batch: BatchId) -> Self {
        Self {
            batch: Some(batch),
            kind: None,
        }
    }

    /// Restrict to one signal kind
    pub fn kind(mut self, kind: SignalKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, signal: &CollectorSignal) -> bool {
        if let Some(batch) = self.batch {
            if signal.batch() != batch {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if signal.kind() != kind {
                return false;
            }
        }
        true
    }
}

type Handler = Arc<dyn Fn(&CollectorSignal) + Send + Sync>;

struct Entry {
    id: u64,
    filter: SignalFilter,
    once: bool,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

impl Registry {
    fn insert(&mut self, filter: SignalFilter, once: bool, handler: Handler) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(Entry {
            id,
            filter,
            once,
            handler,
        });
        id
    }

    fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }
}

/// Callback registry shared by a collector and its consumers
#[derive(Clone, Default)]
pub struct SignalBus {
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every matching signal
    pub fn subscribe<F>(&self, filter: SignalFilter, handler: F) -> Subscription
    where
        F: Fn(&CollectorSignal) + Send + Sync + 'static,
    {
        self.register(filter, false, Arc::new(handler))
    }

    /// Register a handler for the first matching signal only
    pub fn subscribe_once<F>(&self, filter: SignalFilter, handler: F) -> Subscription
    where
        F: Fn(&CollectorSignal) + Send + Sync + 'static,
    {
        self.register(filter, true, Arc::new(handler))
    }

    fn register(&self, filter: SignalFilter, once: bool, handler: Handler) -> Subscription {
        let id = self.registry.lock().insert(filter, once, handler);
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
            active: true,
        }
    }

    /// Deliver a signal to every matching handler
    ///
    /// Handlers run after the registry lock is released, so a handler may
    /// subscribe or unsubscribe. Returns the number of handlers invoked.
    pub fn emit(&self, signal: &CollectorSignal) -> usize {
        let handlers: Vec<Handler> = {
            let mut registry = self.registry.lock();
            let mut matched = Vec::new();
            registry.entries.retain(|entry| {
                if !entry.filter.matches(signal) {
                    return true;
                }
                matched.push(Arc::clone(&entry.handler));
                !entry.once
            });
            matched
        };

        for handler in &handlers {
            handler(signal);
        }
        handlers.len()
    }

    /// Number of live handlers
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().entries.len()
    }
}

/// Owned registration of a handler on a [`SignalBus`]
///
/// Removed from the bus by [`Subscription::unsubscribe`] or on drop.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
    active: bool,
}

impl Subscription {
    /// Whether the handler is still registered
    pub fn is_active(&self) -> bool {
        self.active
            && self
                .registry
                .upgrade()
                .map(|registry| registry.lock().contains(self.id))
                .unwrap_or(false)
    }

    /// Remove the handler; returns false if it was already gone
    pub fn unsubscribe(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        match self.registry.upgrade() {
            Some(registry) => registry.lock().remove(self.id),
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ready(batch: u64, space: &str) -> CollectorSignal {
        CollectorSignal::RecordingsReady(SpaceRecordings {
            batch: BatchId::new(batch),
            space_id: SpaceId::from(space),
            start_time: Utc.timestamp_millis_opt(0).unwrap(),
            end_time: Utc.timestamp_millis_opt(900_000).unwrap(),
            recordings: Vec::new(),
        })
    }

    fn done(batch: u64) -> CollectorSignal {
        CollectorSignal::AllRetrieved(BatchReport::empty(BatchId::new(batch)))
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&CollectorSignal) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move |_: &CollectorSignal| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_signal_kind_names() {
        assert_eq!(SignalKind::RecordingsReady.as_str(), "recordings-ready");
        assert_eq!(SignalKind::AllRetrieved.to_string(), "all-retrieved");
        assert_eq!(ready(1, "1A").kind(), SignalKind::RecordingsReady);
        assert_eq!(done(3).batch(), BatchId::new(3));
    }

    #[test]
    fn test_filter_by_batch_and_kind() {
        let bus = SignalBus::new();
        let (count, handler) = counter();
        let _sub = bus.subscribe(
            SignalFilter::batch(BatchId::new(1)).kind(SignalKind::RecordingsReady),
            handler,
        );

        bus.emit(&ready(1, "1A"));
        bus.emit(&ready(2, "1A"));
        bus.emit(&done(1));
        bus.emit(&ready(1, "2A"));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_once_handler_fires_once() {
        let bus = SignalBus::new();
        let (count, handler) = counter();
        let sub = bus.subscribe_once(SignalFilter::any().kind(SignalKind::AllRetrieved), handler);

        assert_eq!(bus.emit(&ready(1, "1A")), 0);
        assert_eq!(bus.emit(&done(1)), 1);
        assert_eq!(bus.emit(&done(2)), 0);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!sub.is_active());
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = SignalBus::new();
        let (count, handler) = counter();
        {
            let _sub = bus.subscribe(SignalFilter::any(), handler);
            assert_eq!(bus.subscriber_count(), 1);
            bus.emit(&done(1));
        }
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(&done(2));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_is_exactly_once() {
        let bus = SignalBus::new();
        let (_count, handler) = counter();
        let sub = bus.subscribe(SignalFilter::any(), handler);
        assert!(sub.is_active());
        assert!(sub.unsubscribe());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_handler_can_unsubscribe_another() {
        let bus = SignalBus::new();
        let (count, handler) = counter();
        let target = bus.subscribe(SignalFilter::any().kind(SignalKind::RecordingsReady), handler);

        let slot = Arc::new(Mutex::new(Some(target)));
        let cleanup_slot = Arc::clone(&slot);
        let _cleanup = bus.subscribe_once(SignalFilter::any().kind(SignalKind::AllRetrieved), move |_| {
            if let Some(sub) = cleanup_slot.lock().take() {
                sub.unsubscribe();
            }
        });

        bus.emit(&ready(1, "1A"));
        bus.emit(&done(1));
        bus.emit(&ready(1, "2A"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(slot.lock().is_none());
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let (_count, handler) = counter();
        let sub = {
            let bus = SignalBus::new();
            bus.subscribe(SignalFilter::any(), handler)
        };
        assert!(!sub.is_active());
        assert!(!sub.unsubscribe());
    }
}
