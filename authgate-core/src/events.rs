//! Event model
//!
//! The core emits named events around every mutation and lifecycle change.
//! Delivery and subscription mechanics are external: an [`EventSink`] is
//! injected into the store and workflow at construction time, there is no
//! process-wide bus. Entity payloads travel as JSON snapshots so sinks can
//! forward them without depending on the model crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use tracing::info;

/// Events emitted by the identity core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    UserPreSave { uid: String, entity: Value },
    UserSaved { uid: String, entity: Value },
    UserPreDelete { uid: String },
    UserDeleted { uid: String },
    RolePreSave { name: String, entity: Value },
    RoleSaved { name: String, entity: Value },
    RolePreDelete { name: String },
    RoleDeleted { name: String },
    UserStatusChanged { uid: String, from: String, to: String },
    SignedUp { uid: String, login: String },
    SignedIn { uid: String, login: String },
    SignedOut { uid: String },
    SignInFailed { login: String, reason: String },
}

impl AuthEvent {
    /// Stable event name, used by sinks for routing
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::UserPreSave { .. } => "user.pre_save",
            AuthEvent::UserSaved { .. } => "user.save",
            AuthEvent::UserPreDelete { .. } => "user.pre_delete",
            AuthEvent::UserDeleted { .. } => "user.delete",
            AuthEvent::RolePreSave { .. } => "role.pre_save",
            AuthEvent::RoleSaved { .. } => "role.save",
            AuthEvent::RolePreDelete { .. } => "role.pre_delete",
            AuthEvent::RoleDeleted { .. } => "role.delete",
            AuthEvent::UserStatusChanged { .. } => "user.status_change",
            AuthEvent::SignedUp { .. } => "sign_up",
            AuthEvent::SignedIn { .. } => "sign_in",
            AuthEvent::SignedOut { .. } => "sign_out",
            AuthEvent::SignInFailed { .. } => "sign_in_error",
        }
    }
}

/// Sink for core events. Implementations decide about delivery; the core
/// only emits and never blocks on a sink.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AuthEvent);
}

/// Sink that drops everything
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: AuthEvent) {}
}

/// Sink that logs every event as a structured tracing record
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: AuthEvent) {
        info!(event = event.name(), payload = ?event, "Auth event");
    }
}

/// Sink that records events in memory, mainly for tests and diagnostics
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<AuthEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far
    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Names of everything emitted so far, in emission order
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }

    /// Drain recorded events
    pub fn take(&self) -> Vec<AuthEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: AuthEvent) {
        self.events.lock().unwrap().push(event);
    }
}
