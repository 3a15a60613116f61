//! Sliding window log.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::limiter::Algorithm;
use super::rules::{RateLimitConfig, Strategy};

/// Sliding window state for one client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlidingWindowState {
    /// Admission times in arrival order
    pub request_timestamps: VecDeque<u64>,
}

/// Sliding window engine.
///
/// Keeps the timestamp of every admitted request within the last
/// `window_ms`. A timestamp leaves the window exactly `window_ms` after it
/// was recorded, so a client that waits one full window is admitted again
/// and the reset ETA reaches zero at the same instant. Expired timestamps are purged before every read, so the log
/// never holds more than `max_requests` entries.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    config: RateLimitConfig,
}

impl SlidingWindow {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config }
    }
}

impl Algorithm for SlidingWindow {
    type State = SlidingWindowState;

    const NAME: &'static str = "sliding_window";
    const NAMESPACE: &'static str = Strategy::SlidingWindow.namespace();

    fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn initial_state(&self, _now: u64) -> SlidingWindowState {
        SlidingWindowState::default()
    }

    fn refresh(&self, state: &mut SlidingWindowState, now: u64) {
        let window_ms = self.config.window_ms();
        // Arrival order is not guaranteed to be time order if the clock
        // stepped back, so check every entry.
        state
            .request_timestamps
            .retain(|&timestamp| timestamp.saturating_add(window_ms) > now);
    }

    fn try_acquire(&self, state: &mut SlidingWindowState, now: u64) -> bool {
        self.refresh(state, now);
        if (state.request_timestamps.len() as u64) < self.config.max_requests() {
            state.request_timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    fn remaining(&self, state: &SlidingWindowState) -> u64 {
        self.config
            .max_requests()
            .saturating_sub(state.request_timestamps.len() as u64)
    }

    fn reset_after(&self, state: &SlidingWindowState, now: u64) -> u64 {
        match state.request_timestamps.iter().min() {
            Some(&oldest) => oldest
                .saturating_add(self.config.window_ms())
                .saturating_sub(now),
            None => 0,
        }
    }
}
