//! Synchronous, typed event dispatch.
//!
//! Events are delivered immediately, in the same control-flow tick they are
//! posted: first to the owning device's local handler, then, only if the
//! handler asks for it, to one named peer connection or to all of them.
//! There is no cross-time queuing.
//!
//! When an event's payload implies a required downstream consumer, a
//! missing target connection is a hard, logged error for that action, never
//! a silent drop; the producer does not get an automatic retry.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, error, warn};

/// Typed event tags used across the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A new observing target should be picked up by the executor.
    SetTarget,
    ScriptStarted,
    ScriptEnded,
    /// A device finished its startup handshake.
    DeviceReady,
    /// An external detection (shower) arrived.
    ShowerDetected,
}

/// A typed tag plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub payload: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, payload: None }
    }

    pub fn with_payload(kind: EventKind, payload: impl Into<String>) -> Self {
        Self { kind, payload: Some(payload.into()) }
    }
}

/// The local handler's forwarding decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forward {
    /// Handled locally; no peer delivery.
    Stop,
    /// Deliver to one named connection; its absence is a hard error.
    To(String),
    /// Deliver to every registered connection.
    Broadcast,
}

/// The owning device's local event handler, always consulted first.
pub trait EventHandler {
    fn handle_event(&mut self, event: &Event) -> Forward;
}

/// Delivery endpoint for one registered peer connection.
pub trait EventSink {
    fn deliver(&mut self, event: &Event) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("no consumer connection named {0}")]
    NoConsumer(String),
    #[error("delivery to {0} failed: {1}")]
    Deliver(String, String),
}

/// Immediate-dispatch event bus over the currently registered connections.
#[derive(Default)]
pub struct EventBus {
    sinks: HashMap<String, Box<dyn EventSink + Send>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, sink: Box<dyn EventSink + Send>) {
        self.sinks.insert(name.into(), sink);
    }

    pub fn unregister(&mut self, name: &str) {
        self.sinks.remove(name);
    }

    pub fn has_connection(&self, name: &str) -> bool {
        self.sinks.contains_key(name)
    }

    /// Post an event: local handler first, then peer delivery per the
    /// handler's decision, all within this call.
    pub fn post(
        &mut self,
        event: &Event,
        handler: &mut dyn EventHandler,
    ) -> Result<(), EventError> {
        match handler.handle_event(event) {
            Forward::Stop => Ok(()),
            Forward::To(name) => {
                let sink = self.sinks.get_mut(&name).ok_or_else(|| {
                    error!("FATAL! no {} connection to post {:?} event", name, event.kind);
                    EventError::NoConsumer(name.clone())
                })?;
                sink.deliver(event)
                    .map_err(|cause| EventError::Deliver(name, cause))
            }
            Forward::Broadcast => {
                // Connections are independent failure domains; one failing
                // delivery must not stop the rest.
                for (name, sink) in &mut self.sinks {
                    if let Err(cause) = sink.deliver(event) {
                        warn!("event {:?} delivery to {} failed: {}", event.kind, name, cause);
                    }
                }
                debug!("event {:?} broadcast to {} connections", event.kind, self.sinks.len());
                Ok(())
            }
        }
    }
}
