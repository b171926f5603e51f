// SPDX-License-Identifier: MIT OR Apache-2.0
//! Advisory runaway-loop detection.
//!
//! Counts transform calls in a rolling window of engine time, the same
//! virtual clock the timers run on. Crossing the threshold produces one
//! warning per window; execution always continues.

use crate::config::LoopGuardConfig;
use std::time::Duration;

/// Transform call counter
#[derive(Debug)]
pub struct LoopGuard {
    threshold: u64,
    window: Duration,
    window_start: Duration,
    calls: u64,
    warned: bool,
}

impl LoopGuard {
    /// Create a guard from configuration
    pub fn new(config: &LoopGuardConfig) -> Self {
        Self {
            threshold: config.threshold,
            window: config.window(),
            window_start: Duration::ZERO,
            calls: 0,
            warned: false,
        }
    }

    /// Count one call made at engine time `now`. Returns the call count the
    /// first time the threshold is exceeded within the current window.
    pub fn tick(&mut self, now: Duration) -> Option<u64> {
        if now.saturating_sub(self.window_start) >= self.window {
            self.window_start = now;
            self.calls = 0;
            self.warned = false;
        }
        self.calls += 1;
        if self.calls > self.threshold && !self.warned {
            self.warned = true;
            return Some(self.calls);
        }
        None
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(threshold: u64) -> LoopGuard {
        LoopGuard::new(&LoopGuardConfig {
            threshold,
            window_ms: 60_000,
        })
    }

    #[test]
    fn test_warns_once_per_window() {
        let mut guard = guard(3);
        let results: Vec<_> = (0..6).map(|_| guard.tick(Duration::ZERO)).collect();
        assert_eq!(results, vec![None, None, None, Some(4), None, None]);
    }

    #[test]
    fn test_window_resets() {
        let mut guard = guard(1);
        guard.tick(Duration::ZERO);
        assert_eq!(guard.tick(Duration::ZERO), Some(2));

        let later = Duration::from_secs(61);
        assert_eq!(guard.tick(later), None);
        assert_eq!(guard.tick(later), Some(2));
    }

    #[test]
    fn test_calls_spread_over_engine_time() {
        let mut guard = LoopGuard::new(&LoopGuardConfig {
            threshold: 5,
            window_ms: 1000,
        });
        let warnings = (0..50)
            .filter_map(|i| guard.tick(Duration::from_millis(i * 250)))
            .count();
        assert_eq!(warnings, 0);
    }
}
