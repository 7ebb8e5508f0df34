//! Liveness-change events and listener fan-out.

use std::sync::{Arc, Mutex};

/// Severity of a liveness event, derived from the aggregate live count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Immutable snapshot published by the scheduler when aggregate liveness
/// changes (or on its periodic heartbeat).
#[derive(Debug, Clone)]
pub struct LivenessEvent {
    /// Name of the monitor that produced this event.
    pub monitor: String,
    /// Number of endpoints currently live.
    pub live_count: usize,
    /// Total number of monitored endpoints.
    pub total: usize,
    pub severity: Severity,
    /// Human-readable summary naming non-live endpoints and flagging hung
    /// ones.
    pub message: String,
}

/// Callback invoked for each published [`LivenessEvent`].
///
/// Listeners run synchronously on the scheduler task, so they must not
/// block for any significant time.
pub type EventListener = Arc<dyn Fn(&LivenessEvent) + Send + Sync>;

/// Registry of listener callbacks, broadcast in registration order.
pub(crate) struct ListenerRegistry {
    listeners: Mutex<Vec<EventListener>>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, listener: EventListener) {
        self.listeners.lock().expect("listener lock").push(listener);
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().expect("listener lock").len()
    }

    /// Invoke every registered listener. The registry lock is not held
    /// across the callbacks, so a listener may register further listeners.
    pub(crate) fn notify(&self, event: &LivenessEvent) {
        let snapshot: Vec<EventListener> =
            self.listeners.lock().expect("listener lock").clone();
        for listener in &snapshot {
            listener(event);
        }
    }
}
