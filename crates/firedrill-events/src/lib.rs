//! Core event types for firedrill sessions
//!
//! The host integration layer translates its input, physics and UI callbacks
//! into these types and pushes them into a session.

use std::time::Duration;

pub mod contact;
pub mod keyboard;

pub use contact::{ContactEvent, ContactInfo, ContactKind, ContactPhase};
pub use keyboard::{KeyCode, ParseKeyError};

// ============================================================================
// Event Source
// ============================================================================

/// Source of the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// Host frame loop (ticks, key state)
    Host,
    /// Host physics callbacks
    Physics,
    /// UI buttons or other collaborators
    Ui,
    /// Replayed from a scenario script
    Replay,
}

// ============================================================================
// Event Types
// ============================================================================

/// Reference to a package, either by catalog index or by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageRef {
    Index(usize),
    Name(String),
}

impl From<usize> for PackageRef {
    fn from(index: usize) -> Self {
        PackageRef::Index(index)
    }
}

impl From<&str> for PackageRef {
    fn from(name: &str) -> Self {
        PackageRef::Name(name.to_string())
    }
}

impl From<String> for PackageRef {
    fn from(name: String) -> Self {
        PackageRef::Name(name)
    }
}

/// Everything a session can be told by its host
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Host session initialised
    SessionStart,
    /// One frame elapsed; `active_keys` are the keys held at the end of it
    Tick {
        elapsed: Duration,
        active_keys: Vec<KeyCode>,
    },
    /// Physics contact
    Contact(ContactEvent),
    /// Manual trigger from UI or a collaborator
    Trigger(PackageRef),
    /// Cancel one package's active execution
    Stop(PackageRef),
    /// Cancel every active execution
    StopAll,
}

/// Complete event envelope
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub event: SessionEvent,
    /// Sequence number assigned by the producer
    pub sequence: u64,
    pub source: EventSource,
}

impl EventEnvelope {
    pub fn new(event: SessionEvent, sequence: u64, source: EventSource) -> Self {
        Self {
            event,
            sequence,
            source,
        }
    }
}

// ============================================================================
// Event Consumer Trait
// ============================================================================

/// Trait for anything that consumes session events
pub trait EventConsumer {
    /// Handle an event envelope
    fn handle_event(&mut self, envelope: EventEnvelope);
}
