// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Live statistics of a run.
//!
//! The orchestrator is the only writer. Anybody holding the tracker can poll
//! it while a run is in flight, e.g., a UI thread drawing a status line. Each
//! counter is atomic on its own, but a snapshot is not one consistent view
//! across all counters. Progress callbacks are the sync points for that.
//!
//! Counters record events, not final per-path outcomes. A file written by
//! both mirror and archive counts as copied twice. An archive that fails after
//! its files were added keeps them counted as copied, and only the
//! [`OperationResult`](crate::report::OperationResult) reports them failed.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

/// Accumulate counts of copied, skipped, and failed paths.
#[derive(Debug)]
pub struct StatisticsTracker {
    copied: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
    started: Mutex<Instant>,
}

impl Default for StatisticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsTracker {
    /// Construct new tracker with its clock started.
    pub fn new() -> Self {
        Self {
            copied: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            started: Mutex::new(Instant::now()),
        }
    }

    /// Record a copied path of given size.
    pub fn record_copied(&self, bytes: u64) {
        self.copied.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter, and restart the clock.
    pub fn reset(&self) {
        self.copied.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
        if let Ok(mut started) = self.started.lock() {
            *started = Instant::now();
        }
    }

    /// Take a snapshot of current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self
            .started
            .lock()
            .map(|started| started.elapsed())
            .unwrap_or_default();

        StatsSnapshot {
            copied: self.copied.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Point in time copy of statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub copied: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}
