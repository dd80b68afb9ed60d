//! Physics contact events reported by the host

use serde::{Deserialize, Serialize};

/// Which physics callback produced the contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    /// Solid collision between two colliders
    Collision,
    /// Another collider entered a trigger volume
    TriggerVolume,
}

/// Whether the contact began or ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactPhase {
    #[default]
    Enter,
    Exit,
}

/// The other party of a contact, as seen by the receiver
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Tag of the other entity (if any)
    #[serde(default)]
    pub tag: Option<String>,
    /// Physics layer of the other entity (0..=31)
    #[serde(default)]
    pub layer: u8,
    /// The other entity followed by its ancestors, nearest first
    #[serde(default)]
    pub lineage: Vec<String>,
}

impl ContactInfo {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            tag: None,
            layer: 0,
            lineage: vec![entity.into()],
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_layer(mut self, layer: u8) -> Self {
        self.layer = layer;
        self
    }

    /// Append an ancestor above the current topmost entry
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.lineage.push(parent.into());
        self
    }

    /// Name of the contacting entity itself
    pub fn entity(&self) -> Option<&str> {
        self.lineage.first().map(String::as_str)
    }

    /// True if the entity is `root` or sits anywhere below it
    pub fn is_under(&self, root: &str) -> bool {
        self.lineage.iter().any(|name| name == root)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag.as_deref() == Some(tag)
    }
}

/// A contact reported by the host physics step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactEvent {
    pub kind: ContactKind,
    pub phase: ContactPhase,
    /// Entity that owns the collider or volume being touched. `None` means the
    /// session's own controller body.
    pub receiver: Option<String>,
    pub other: ContactInfo,
}

impl ContactEvent {
    pub fn enter(kind: ContactKind, other: ContactInfo) -> Self {
        Self {
            kind,
            phase: ContactPhase::Enter,
            receiver: None,
            other,
        }
    }

    pub fn exit(kind: ContactKind, other: ContactInfo) -> Self {
        Self {
            kind,
            phase: ContactPhase::Exit,
            receiver: None,
            other,
        }
    }

    pub fn on(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }
}
