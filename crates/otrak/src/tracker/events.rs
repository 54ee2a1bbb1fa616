// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Session events and their distribution.
//!
//! Two delivery styles, both safe to use from background threads:
//! registered callbacks (invoked inline on the publishing thread — keep them
//! short and non-blocking) and bounded channel subscriptions that drop
//! events on overflow rather than stall the publisher.

use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use super::snapshot::TrackingSnapshot;

/// Kinds of session events published to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Connecting,
    Connected,
    Initialized,
    Disconnected,
    Reset,
    TrackingStarted,
    TrackingStopped,
    RecordingStarted,
    RecordingStopped,
    Error,
}

/// One published session event with a free-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerEvent {
    pub kind: EventKind,
    pub message: String,
}

impl TrackerEvent {
    pub fn is_error(&self) -> bool {
        self.kind == EventKind::Error
    }
}

impl std::fmt::Display for TrackerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Callback invoked for every published event. Called from background
/// threads; must not block or panic.
pub type EventCallback = Arc<dyn Fn(&TrackerEvent) + Send + Sync>;

/// Callback invoked after every published snapshot.
pub type DataCallback = Arc<dyn Fn(&TrackingSnapshot) + Send + Sync>;

/// Event hub: callback list plus N bounded subscriber channels.
#[derive(Default)]
pub struct EventHub {
    callbacks: Mutex<Vec<EventCallback>>,
    subscribers: Mutex<Vec<Sender<TrackerEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for all future events.
    pub fn add_listener(&self, callback: EventCallback) {
        self.callbacks.lock().push(callback);
    }

    /// Subscribe with a dedicated bounded channel.
    ///
    /// If a subscriber falls behind and its channel fills up, events are
    /// dropped for that subscriber (lossy), never blocking the publisher.
    pub fn subscribe(&self, capacity: usize) -> Receiver<TrackerEvent> {
        let (tx, rx) = bounded(capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Publish an event to every callback and subscriber.
    pub fn publish(&self, kind: EventKind, message: impl Into<String>) {
        let event = TrackerEvent {
            kind,
            message: message.into(),
        };
        log::debug!("[event] {}", event);

        for callback in self.callbacks.lock().iter() {
            callback(&event);
        }

        // Drop disconnected subscribers as a side effect of publishing.
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("[event] subscriber full, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}
