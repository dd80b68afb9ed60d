//! The narrow interface between the engine and the host scene
//!
//! Every method takes an entity name and reports whether the entity exists.
//! Callers treat a missing entity as "nothing to do", never as an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Host-side effects the engine can request
pub trait Actuators {
    /// Activate or deactivate an entity
    fn set_active(&mut self, entity: &str, active: bool) -> bool;

    /// Current active state, `None` if the entity does not exist
    fn is_active(&self, entity: &str) -> Option<bool>;

    /// Enable or disable a collider
    fn set_collider_enabled(&mut self, collider: &str, enabled: bool) -> bool;

    /// Stop whatever an audio source is playing
    fn stop_audio(&mut self, source: &str) -> bool;

    /// Play the source's own clip once
    fn play(&mut self, source: &str) -> bool;

    /// Start the source's own clip in looping mode
    fn play_looping(&mut self, source: &str) -> bool;

    /// Play a clip once through a source
    fn play_one_shot(&mut self, source: &str, clip: &str, volume: f32) -> bool;

    /// Replace the text of a text element
    fn set_text(&mut self, target: &str, text: &str) -> bool;
}

/// Playback state of one audio source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioSourceState {
    #[serde(default)]
    pub playing: bool,
    #[serde(default)]
    pub looping: bool,
    /// One-shot clips played so far, with their volume
    #[serde(skip)]
    pub one_shots: Vec<(String, f32)>,
    /// Number of times the source was stopped
    #[serde(skip)]
    pub stops: u32,
}

/// In-memory scene used by tests and the replay CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneState {
    /// Entity name → active
    pub entities: BTreeMap<String, bool>,
    /// Collider name → enabled
    pub colliders: BTreeMap<String, bool>,
    pub audio: BTreeMap<String, AudioSourceState>,
    /// Text element name → current text
    pub texts: BTreeMap<String, String>,
}

impl SceneState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, name: impl Into<String>, active: bool) -> Self {
        self.entities.insert(name.into(), active);
        self
    }

    pub fn with_collider(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.colliders.insert(name.into(), enabled);
        self
    }

    pub fn with_audio_source(mut self, name: impl Into<String>) -> Self {
        self.audio.insert(name.into(), AudioSourceState::default());
        self
    }

    pub fn with_text(mut self, name: impl Into<String>) -> Self {
        self.texts.insert(name.into(), String::new());
        self
    }

    pub fn collider_enabled(&self, collider: &str) -> Option<bool> {
        self.colliders.get(collider).copied()
    }

    pub fn audio_source(&self, source: &str) -> Option<&AudioSourceState> {
        self.audio.get(source)
    }

    pub fn text(&self, target: &str) -> Option<&str> {
        self.texts.get(target).map(String::as_str)
    }
}

impl Actuators for SceneState {
    fn set_active(&mut self, entity: &str, active: bool) -> bool {
        match self.entities.get_mut(entity) {
            Some(state) => {
                trace!(target: "actions", "{} -> {}", entity, if active { "on" } else { "off" });
                *state = active;
                true
            }
            None => false,
        }
    }

    fn is_active(&self, entity: &str) -> Option<bool> {
        self.entities.get(entity).copied()
    }

    fn set_collider_enabled(&mut self, collider: &str, enabled: bool) -> bool {
        match self.colliders.get_mut(collider) {
            Some(state) => {
                *state = enabled;
                true
            }
            None => false,
        }
    }

    fn stop_audio(&mut self, source: &str) -> bool {
        match self.audio.get_mut(source) {
            Some(state) => {
                state.playing = false;
                state.stops += 1;
                true
            }
            None => false,
        }
    }

    fn play(&mut self, source: &str) -> bool {
        match self.audio.get_mut(source) {
            Some(state) => {
                state.looping = false;
                state.playing = true;
                true
            }
            None => false,
        }
    }

    fn play_looping(&mut self, source: &str) -> bool {
        match self.audio.get_mut(source) {
            Some(state) => {
                state.looping = true;
                state.playing = true;
                true
            }
            None => false,
        }
    }

    fn play_one_shot(&mut self, source: &str, clip: &str, volume: f32) -> bool {
        match self.audio.get_mut(source) {
            Some(state) => {
                state.one_shots.push((clip.to_string(), volume));
                true
            }
            None => false,
        }
    }

    fn set_text(&mut self, target: &str, text: &str) -> bool {
        match self.texts.get_mut(target) {
            Some(current) => {
                *current = text.to_string();
                true
            }
            None => false,
        }
    }
}
