// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Progress reporting and cooperative cancellation.
//!
//! Progress is reported synchronously from whatever thread runs the
//! orchestrator. Marshaling it onto a UI event loop is the caller's job.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Receive progress updates from a running orchestrator.
pub trait ProgressSink {
    /// Called with a 0-100 percentage, and a label of the current item.
    fn on_progress(&mut self, percent_complete: u8, current_item_label: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(u8, &str),
{
    fn on_progress(&mut self, percent_complete: u8, current_item_label: &str) {
        self(percent_complete, current_item_label)
    }
}

/// Progress sink that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _: u8, _: &str) {}
}

/// Shared cancellation request.
///
/// Clones share the same flag. Orchestrators check it between files, never
/// in the middle of one.
#[derive(Debug, Default, Clone)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Construct new unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Turn finished/total counts into a percentage.
pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }

    ((done.min(total) * 100) / total) as u8
}
