// Space Usage - WiFi occupancy estimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sinks for recoverable conditions
//!
//! Empty-scope answers from upstream (no spaces, no recordings for a space)
//! are not errors for the batch. They are handed to an [`ExceptionLogger`]
//! and processing continues.

use parking_lot::Mutex;

use crate::error::RecoverableCondition;

/// Sink for recoverable conditions
pub trait ExceptionLogger: Send + Sync {
    /// Record a condition; must not panic
    fn log(&self, condition: &RecoverableCondition);
}

/// Forwards conditions to the `log` facade at `warn` level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogExceptionLogger;

impl ExceptionLogger for LogExceptionLogger {
    fn log(&self, condition: &RecoverableCondition) {
        match condition.space_id() {
            Some(space_id) => log::warn!("space {}: {}", space_id, condition),
            None => log::warn!("{}", condition),
        }
    }
}

/// Keeps conditions in memory, oldest first
#[derive(Debug)]
pub struct MemoryExceptionLogger {
    conditions: Mutex<Vec<RecoverableCondition>>,
    max_conditions: usize,
}

impl Default for MemoryExceptionLogger {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl MemoryExceptionLogger {
    /// Create a logger keeping at most `max_conditions` entries
    pub fn new(max_conditions: usize) -> Self {
        Self {
            conditions: Mutex::new(Vec::with_capacity(max_conditions.min(1000))),
            max_conditions,
        }
    }

    /// All stored conditions
    pub fn conditions(&self) -> Vec<RecoverableCondition> {
        self.conditions.lock().clone()
    }

    /// Rendered messages of all stored conditions
    pub fn messages(&self) -> Vec<String> {
        self.conditions
            .lock()
            .iter()
            .map(|condition| condition.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.conditions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.lock().is_empty()
    }

    pub fn clear(&self) {
        self.conditions.lock().clear();
    }
}

impl ExceptionLogger for MemoryExceptionLogger {
    fn log(&self, condition: &RecoverableCondition) {
        let mut conditions = self.conditions.lock();
        if self.max_conditions == 0 {
            return;
        }
        if conditions.len() >= self.max_conditions {
            conditions.remove(0);
        }
        conditions.push(condition.clone());
    }
}
