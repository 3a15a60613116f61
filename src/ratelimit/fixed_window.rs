//! Rolling fixed window counter.

use serde::{Deserialize, Serialize};

use super::limiter::Algorithm;
use super::rules::{RateLimitConfig, Strategy};

/// Fixed window state for one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedWindowState {
    /// Admissions in the current window
    pub count: u64,
    /// When the current window opened
    pub window_start_millis: u64,
}

/// Fixed window engine.
///
/// Windows are rolling, not aligned to the clock: a new window opens at the
/// first request arriving after the previous one has run for `window_ms`,
/// so clients never share a synchronized boundary to burst against.
#[derive(Debug, Clone)]
pub struct FixedWindow {
    config: RateLimitConfig,
}

impl FixedWindow {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config }
    }
}

impl Algorithm for FixedWindow {
    type State = FixedWindowState;

    const NAME: &'static str = "fixed_window";
    const NAMESPACE: &'static str = Strategy::FixedWindow.namespace();

    fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn initial_state(&self, now: u64) -> FixedWindowState {
        FixedWindowState {
            count: 0,
            window_start_millis: now,
        }
    }

    fn refresh(&self, state: &mut FixedWindowState, now: u64) {
        let elapsed = now.checked_sub(state.window_start_millis).unwrap_or(0);
        if elapsed >= self.config.window_ms() {
            state.count = 0;
            state.window_start_millis = now;
        }
    }

    fn try_acquire(&self, state: &mut FixedWindowState, now: u64) -> bool {
        self.refresh(state, now);
        if state.count < self.config.max_requests() {
            state.count += 1;
            true
        } else {
            false
        }
    }

    fn remaining(&self, state: &FixedWindowState) -> u64 {
        self.config.max_requests().saturating_sub(state.count)
    }

    fn reset_after(&self, state: &FixedWindowState, now: u64) -> u64 {
        if state.count < self.config.max_requests() {
            return 0;
        }
        state
            .window_start_millis
            .saturating_add(self.config.window_ms())
            .saturating_sub(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(max: u64, window_ms: u64) -> FixedWindow {
        FixedWindow::new(RateLimitConfig::new(max, window_ms, Strategy::FixedWindow).unwrap())
    }

    #[test]
    fn test_counts_within_window() {
        let engine = window(3, 1_000);
        let mut state = engine.initial_state(0);

        assert!(engine.try_acquire(&mut state, 0));
        assert!(engine.try_acquire(&mut state, 400));
        assert!(engine.try_acquire(&mut state, 800));
        assert!(!engine.try_acquire(&mut state, 999));
        assert_eq!(engine.remaining(&state), 0);
        assert_eq!(engine.reset_after(&state, 999), 1);

        assert!(engine.try_acquire(&mut state, 1_000));
        assert_eq!(state.window_start_millis, 1_000);
        assert_eq!(state.count, 1);
    }

    #[test]
    fn test_window_reanchors_to_first_late_request() {
        let engine = window(2, 1_000);
        let mut state = engine.initial_state(0);
        engine.try_acquire(&mut state, 0);

        // Nothing happens until well past the window; the next window opens
        // at 2_350, not at the clock-aligned 2_000.
        assert!(engine.try_acquire(&mut state, 2_350));
        assert_eq!(state.window_start_millis, 2_350);
        assert!(engine.try_acquire(&mut state, 2_400));
        assert!(!engine.try_acquire(&mut state, 3_349));
        assert!(engine.try_acquire(&mut state, 3_350));
    }

    #[test]
    fn test_idle_window_reanchors_on_next_request() {
        let engine = window(1, 1_000);
        let mut state = engine.initial_state(100);

        // Window elapsed with count == 0.
        assert!(engine.try_acquire(&mut state, 1_700));
        assert_eq!(state.window_start_millis, 1_700);
        assert!(!engine.try_acquire(&mut state, 2_000));
    }

    #[test]
    fn test_reset_after_zero_when_under_limit() {
        let engine = window(5, 1_000);
        let mut state = engine.initial_state(0);
        engine.try_acquire(&mut state, 0);
        assert_eq!(engine.reset_after(&state, 10), 0);
        assert_eq!(engine.remaining(&state), 4);
    }

    #[test]
    fn test_clock_going_backwards_keeps_window() {
        let engine = window(1, 1_000);
        let mut state = engine.initial_state(5_000);
        engine.try_acquire(&mut state, 5_000);

        assert!(!engine.try_acquire(&mut state, 3_000));
        assert_eq!(state.window_start_millis, 5_000);
        assert_eq!(state.count, 1);
    }
}
