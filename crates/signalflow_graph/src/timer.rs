// SPDX-License-Identifier: MIT OR Apache-2.0
//! Virtual-time timers for clock and delay nodes.
//!
//! Time only moves when the shell calls [`crate::Engine::advance`], which
//! makes timer behavior deterministic under test.

use crate::registry::InstanceKey;
use std::time::Duration;

/// Unique identifier for a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Timer {
    id: TimerId,
    owner: InstanceKey,
    handle: String,
    due: Duration,
    interval: Option<Duration>,
}

/// A timer that came due
#[derive(Debug, Clone, PartialEq)]
pub struct DueTimer {
    /// Instance owning the timer
    pub owner: InstanceKey,
    /// Signal handle to fire
    pub handle: String,
}

/// Timers ordered by due time
#[derive(Debug, Default)]
pub struct TimerQueue {
    now: Duration,
    next_id: u64,
    timers: Vec<Timer>,
}

impl TimerQueue {
    /// Create an empty queue at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `handle` to fire after `delay`, repeating every `delay` if
    /// `repeat` is set. Repeating timers need a non-zero delay.
    pub fn schedule(
        &mut self,
        owner: InstanceKey,
        handle: impl Into<String>,
        delay: Duration,
        repeat: bool,
    ) -> Option<TimerId> {
        if repeat && delay.is_zero() {
            return None;
        }
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            owner,
            handle: handle.into(),
            due: self.now + delay,
            interval: repeat.then_some(delay),
        });
        Some(id)
    }

    /// Cancel every timer owned by an instance
    pub fn cancel_owner(&mut self, owner: InstanceKey) -> usize {
        let before = self.timers.len();
        self.timers.retain(|t| t.owner != owner);
        before - self.timers.len()
    }

    /// Number of pending timers
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Number of pending timers owned by an instance
    pub fn pending_for(&self, owner: InstanceKey) -> usize {
        self.timers.iter().filter(|t| t.owner == owner).count()
    }

    /// Pop the earliest timer due at or before `until`, moving the clock to
    /// its due time. Repeating timers are rescheduled.
    pub fn pop_due(&mut self, until: Duration) -> Option<DueTimer> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= until)
            .min_by_key(|(_, t)| (t.due, t.id))
            .map(|(i, _)| i)?;

        let timer = &mut self.timers[index];
        self.now = self.now.max(timer.due);
        let due = DueTimer {
            owner: timer.owner,
            handle: timer.handle.clone(),
        };
        match timer.interval {
            Some(interval) => timer.due += interval,
            None => {
                self.timers.remove(index);
            }
        }
        Some(due)
    }

    /// Move the clock forward without firing anything
    pub fn advance_to(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: InstanceKey = InstanceKey::from_raw(1);
    const B: InstanceKey = InstanceKey::from_raw(2);

    #[test]
    fn test_one_shot() {
        let mut timers = TimerQueue::new();
        timers.schedule(A, "_bangout", Duration::from_millis(500), false);

        assert!(timers.pop_due(Duration::from_millis(499)).is_none());
        let due = timers.pop_due(Duration::from_millis(500)).unwrap();
        assert_eq!(due.owner, A);
        assert_eq!(timers.now(), Duration::from_millis(500));
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn test_repeating_and_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(A, "pulse", Duration::from_secs(1), true);
        timers.schedule(B, "_bangout", Duration::from_millis(1500), false);

        let until = Duration::from_secs(3);
        let mut fired = Vec::new();
        while let Some(due) = timers.pop_due(until) {
            fired.push(due.owner);
        }
        assert_eq!(fired, vec![A, B, A, A]);
        assert_eq!(timers.pending(), 1);
    }

    #[test]
    fn test_cancel_owner() {
        let mut timers = TimerQueue::new();
        timers.schedule(A, "pulse", Duration::from_secs(1), true);
        timers.schedule(A, "_bangout", Duration::from_secs(2), false);
        timers.schedule(B, "pulse", Duration::from_secs(1), true);

        assert_eq!(timers.cancel_owner(A), 2);
        assert_eq!(timers.pending_for(A), 0);
        assert_eq!(timers.pending(), 1);
    }

    #[test]
    fn test_zero_interval_repeat_rejected() {
        let mut timers = TimerQueue::new();
        assert!(timers.schedule(A, "pulse", Duration::ZERO, true).is_none());
        assert_eq!(timers.pending(), 0);
    }
}
