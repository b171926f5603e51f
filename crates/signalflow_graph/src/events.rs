// SPDX-License-Identifier: MIT OR Apache-2.0
//! Events queued for the editor shell.

use crate::handle::Value;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Informational
    Info,
    /// Something was rejected or degraded
    Warning,
    /// Something failed
    Error,
}

/// Something the shell should react to
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// An output handle of an on-screen node committed a value
    OutputChanged {
        /// Node id
        node_id: String,
        /// Output handle id
        handle: String,
        /// New value
        value: Value,
    },
    /// Types were added, removed or renamed
    TypeRegistryChanged,
    /// Saved graphs were added, removed or rewritten
    GraphListChanged,
    /// Transform calls exceeded the configured rate, or one firing ran out
    /// of propagation steps
    RuntimeLoopWarning {
        /// Calls or steps counted
        calls: u64,
        /// Window length; `None` when a single firing was cut off at the
        /// step budget
        window: Option<Duration>,
    },
    /// Message for a transient notification
    Notification {
        /// Severity
        level: NotificationLevel,
        /// Text
        message: String,
    },
}

impl EngineEvent {
    /// Warning notification
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Notification {
            level: NotificationLevel::Warning,
            message: message.into(),
        }
    }

    /// Error notification
    pub fn error(message: impl Into<String>) -> Self {
        Self::Notification {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Shared event queue
#[derive(Clone, Default)]
pub struct EventBus {
    queue: Arc<Mutex<VecDeque<EngineEvent>>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event
    pub fn emit(&self, event: EngineEvent) {
        self.queue.lock().push_back(event);
    }

    /// Take every queued event in emission order
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
