//! Fire that goes out under the right extinguisher and flares up under the wrong one
//!
//! A zone listens to trigger-volume contacts addressed to it by name. Agents
//! carrying the correct tag build up progress while at least one of them is
//! inside the volume; the first agent with the wrong tag ends the drill.

use std::time::Duration;

use firedrill_events::{ContactEvent, ContactKind, ContactPhase};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actuator::Actuators;
use crate::error::{check_seconds, ConfigError};
use crate::timeline::{seconds, Timeline};

pub const WRONG_AGENT_REASON: &str = "WRONG EXTINGUISHER!\nFire Intensified.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireZoneSettings {
    /// Receiver name contacts must be addressed to
    pub name: String,
    pub correct_tag: String,
    pub wrong_tag: String,
    pub seconds_to_extinguish: f32,
    /// Progress lost per second while nobody sprays
    pub decay_per_second: f32,
    pub turn_on: Vec<String>,
    pub turn_off: Vec<String>,
    /// Shown once the fire is out
    pub success_object: Option<String>,
    pub warning_object: Option<String>,
    pub warning_seconds: f32,
    pub failure_audio: Option<String>,
    pub failed_window: Option<String>,
    pub failure_reason_text: Option<String>,
    /// Disabled on failure so the trainee stays in front of the message
    pub locomotion: Option<String>,
    pub fire_root: Option<String>,
    pub disable_root_delay: f32,
    pub boost_multiplier: f32,
}

impl Default for FireZoneSettings {
    fn default() -> Self {
        Self {
            name: "FireZone".to_string(),
            correct_tag: "FumesClassD".to_string(),
            wrong_tag: "FumesWater".to_string(),
            seconds_to_extinguish: 2.0,
            decay_per_second: 0.5,
            turn_on: Vec::new(),
            turn_off: Vec::new(),
            success_object: None,
            warning_object: None,
            warning_seconds: 3.0,
            failure_audio: None,
            failed_window: None,
            failure_reason_text: None,
            locomotion: None,
            fire_root: None,
            disable_root_delay: 2.0,
            boost_multiplier: 1.5,
        }
    }
}

impl FireZoneSettings {
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let invalid = |reason: String| {
            ConfigError::component("fire zone", format!("#{} '{}': {}", index, self.name, reason))
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be blank".to_string()));
        }
        if self.correct_tag == self.wrong_tag {
            return Err(invalid("correct and wrong tags must differ".to_string()));
        }

        for (field, value) in [
            ("seconds_to_extinguish", self.seconds_to_extinguish),
            ("decay_per_second", self.decay_per_second),
            ("warning_seconds", self.warning_seconds),
            ("disable_root_delay", self.disable_root_delay),
            ("boost_multiplier", self.boost_multiplier),
        ] {
            check_seconds(value).map_err(|e| invalid(format!("{}: {}", field, e)))?;
        }
        Ok(())
    }
}

/// Outcome reported by a zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireZoneSignal {
    Extinguished,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZoneTimer {
    HideWarning,
    DisableRoot,
}

pub struct FireZone {
    settings: FireZoneSettings,
    timeline: Timeline<ZoneTimer>,
    agents_inside: u32,
    progress: f32,
    intensity: f32,
    extinguished: bool,
    failed: bool,
    warning_active: bool,
}

impl FireZone {
    pub fn new(settings: FireZoneSettings) -> Self {
        Self {
            settings,
            timeline: Timeline::new(),
            agents_inside: 0,
            progress: 0.0,
            intensity: 1.0,
            extinguished: false,
            failed: false,
            warning_active: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Seconds of effective spraying so far
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Fire scale relative to its original size
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn is_extinguished(&self) -> bool {
        self.extinguished
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Correct agents currently inside the volume
    pub fn agents_inside(&self) -> u32 {
        self.agents_inside
    }

    pub fn init(&mut self, scene: &mut dyn Actuators) {
        for object in [&self.settings.success_object, &self.settings.warning_object]
            .into_iter()
            .flatten()
        {
            scene.set_active(object, false);
        }
    }

    /// Feed a contact; anything not addressed to this zone is ignored
    pub fn contact(
        &mut self,
        contact: &ContactEvent,
        scene: &mut dyn Actuators,
    ) -> Option<FireZoneSignal> {
        if contact.kind != ContactKind::TriggerVolume
            || contact.receiver.as_deref() != Some(self.settings.name.as_str())
        {
            return None;
        }

        let other = &contact.other;
        match contact.phase {
            ContactPhase::Enter => {
                if self.failed || self.extinguished {
                    return None;
                }

                if other.has_tag(&self.settings.wrong_tag) {
                    if !self.warning_active {
                        self.show_warning(scene);
                    }
                    return Some(self.intensify(scene));
                }

                if other.has_tag(&self.settings.correct_tag) {
                    self.agents_inside += 1;
                    debug!(target: "fire_zone", "{}: agent entered ({} inside)", self.settings.name, self.agents_inside);
                }
                None
            }
            ContactPhase::Exit => {
                if other.has_tag(&self.settings.correct_tag) {
                    self.agents_inside = self.agents_inside.saturating_sub(1);
                }
                None
            }
        }
    }

    /// Run pending timers, then accumulate or decay progress
    pub fn advance(
        &mut self,
        elapsed: Duration,
        scene: &mut dyn Actuators,
    ) -> Option<FireZoneSignal> {
        for fired in self.timeline.advance(elapsed) {
            match fired.payload {
                ZoneTimer::HideWarning => {
                    if let Some(warning) = &self.settings.warning_object {
                        scene.set_active(warning, false);
                    }
                    self.warning_active = false;
                }
                ZoneTimer::DisableRoot => {
                    if let Some(root) = &self.settings.fire_root {
                        scene.set_active(root, false);
                    }
                    debug!(target: "fire_zone", "{}: fire root disabled", self.settings.name);
                }
            }
        }

        if self.extinguished || self.failed {
            return None;
        }

        let dt = elapsed.as_secs_f32();
        if self.agents_inside > 0 {
            self.progress += dt;
            if self.progress >= self.settings.seconds_to_extinguish {
                self.extinguish(scene);
                return Some(FireZoneSignal::Extinguished);
            }
        } else {
            self.progress = (self.progress - self.settings.decay_per_second * dt).max(0.0);
        }
        None
    }

    /// Put the zone and every scene object it touched back to the start
    pub fn reset(&mut self, scene: &mut dyn Actuators) {
        self.timeline = Timeline::new();
        self.agents_inside = 0;
        self.progress = 0.0;
        self.intensity = 1.0;
        self.extinguished = false;
        self.failed = false;
        self.warning_active = false;

        let settings = &self.settings;
        if let Some(locomotion) = &settings.locomotion {
            scene.set_active(locomotion, true);
        }
        if let Some(window) = &settings.failed_window {
            scene.set_active(window, false);
        }
        if let Some(root) = &settings.fire_root {
            scene.set_active(root, true);
        }
        for object in [&settings.success_object, &settings.warning_object]
            .into_iter()
            .flatten()
        {
            scene.set_active(object, false);
        }
        for object in &settings.turn_on {
            scene.set_active(object, false);
        }
        for object in &settings.turn_off {
            scene.set_active(object, true);
        }

        info!(target: "fire_zone", "{}: reset", settings.name);
    }

    fn show_warning(&mut self, scene: &mut dyn Actuators) {
        self.warning_active = true;
        if let Some(warning) = &self.settings.warning_object {
            scene.set_active(warning, true);
        }
        self.timeline
            .schedule_timer(seconds(self.settings.warning_seconds), ZoneTimer::HideWarning);
    }

    fn intensify(&mut self, scene: &mut dyn Actuators) -> FireZoneSignal {
        self.failed = true;
        self.intensity *= self.settings.boost_multiplier;
        warn!(target: "fire_zone",
            "{}: wrong extinguisher, fire intensified to {:.2}x",
            self.settings.name,
            self.intensity
        );

        let settings = &self.settings;
        if let Some(audio) = &settings.failure_audio {
            scene.play(audio);
        }
        if let Some(window) = &settings.failed_window {
            scene.set_active(window, true);
            if let Some(text) = &settings.failure_reason_text {
                scene.set_text(text, WRONG_AGENT_REASON);
            }
        }
        if let Some(locomotion) = &settings.locomotion {
            scene.set_active(locomotion, false);
        }

        FireZoneSignal::Failed(WRONG_AGENT_REASON.to_string())
    }

    fn extinguish(&mut self, scene: &mut dyn Actuators) {
        self.extinguished = true;
        info!(target: "fire_zone", "{}: fire extinguished after {:.2}s", self.settings.name, self.progress);

        let settings = &self.settings;
        for object in &settings.turn_on {
            scene.set_active(object, true);
        }
        for object in &settings.turn_off {
            scene.set_active(object, false);
        }
        if let Some(success) = &settings.success_object {
            scene.set_active(success, true);
        }

        if settings.disable_root_delay > 0.0 {
            self.timeline
                .schedule_timer(seconds(settings.disable_root_delay), ZoneTimer::DisableRoot);
        } else if let Some(root) = &settings.fire_root {
            scene.set_active(root, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::SceneState;
    use firedrill_events::ContactInfo;

    fn settings() -> FireZoneSettings {
        FireZoneSettings {
            name: "Zone".into(),
            turn_on: vec!["Smoke".into()],
            turn_off: vec!["Flames".into()],
            success_object: Some("Success".into()),
            warning_object: Some("Warning".into()),
            failure_audio: Some("Roar".into()),
            failed_window: Some("FailedWindow".into()),
            failure_reason_text: Some("Reason".into()),
            locomotion: Some("Locomotion".into()),
            fire_root: Some("Fire".into()),
            ..FireZoneSettings::default()
        }
    }

    fn scene() -> SceneState {
        SceneState::new()
            .with_entity("Smoke", false)
            .with_entity("Flames", true)
            .with_entity("Success", true)
            .with_entity("Warning", true)
            .with_entity("FailedWindow", false)
            .with_entity("Locomotion", true)
            .with_entity("Fire", true)
            .with_audio_source("Roar")
            .with_text("Reason")
    }

    fn fumes(tag: &str, phase: ContactPhase) -> ContactEvent {
        let other = ContactInfo::new("Fumes").with_tag(tag);
        let contact = match phase {
            ContactPhase::Enter => ContactEvent::enter(ContactKind::TriggerVolume, other),
            ContactPhase::Exit => ContactEvent::exit(ContactKind::TriggerVolume, other),
        };
        contact.on("Zone")
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_continuous_spraying_extinguishes() {
        let mut scene = scene();
        let mut zone = FireZone::new(settings());
        zone.init(&mut scene);
        assert_eq!(scene.is_active("Success"), Some(false));

        zone.contact(&fumes("FumesClassD", ContactPhase::Enter), &mut scene);
        assert_eq!(zone.advance(ms(1500), &mut scene), None);
        assert_eq!(zone.advance(ms(500), &mut scene), Some(FireZoneSignal::Extinguished));

        assert_eq!(scene.is_active("Smoke"), Some(true));
        assert_eq!(scene.is_active("Flames"), Some(false));
        assert_eq!(scene.is_active("Success"), Some(true));
        assert_eq!(scene.is_active("Fire"), Some(true));

        zone.advance(ms(2000), &mut scene);
        assert_eq!(scene.is_active("Fire"), Some(false));
        assert_eq!(zone.advance(ms(1000), &mut scene), None);
    }

    #[test]
    fn test_progress_decays_when_spraying_stops() {
        let mut scene = scene();
        let mut zone = FireZone::new(settings());

        zone.contact(&fumes("FumesClassD", ContactPhase::Enter), &mut scene);
        zone.advance(ms(1000), &mut scene);
        zone.contact(&fumes("FumesClassD", ContactPhase::Exit), &mut scene);
        assert_eq!(zone.agents_inside(), 0);

        zone.advance(ms(1000), &mut scene);
        assert!((zone.progress() - 0.5).abs() < 1e-4);
        zone.advance(ms(5000), &mut scene);
        assert_eq!(zone.progress(), 0.0);
    }

    #[test]
    fn test_wrong_agent_fails_once() {
        let mut scene = scene();
        let mut zone = FireZone::new(settings());
        zone.init(&mut scene);

        let signal = zone.contact(&fumes("FumesWater", ContactPhase::Enter), &mut scene);
        assert_eq!(signal, Some(FireZoneSignal::Failed(WRONG_AGENT_REASON.to_string())));
        assert_eq!(scene.is_active("Warning"), Some(true));
        assert_eq!(scene.is_active("FailedWindow"), Some(true));
        assert_eq!(scene.text("Reason"), Some(WRONG_AGENT_REASON));
        assert_eq!(scene.is_active("Locomotion"), Some(false));
        assert!(scene.audio_source("Roar").unwrap().playing);
        assert!((zone.intensity() - 1.5).abs() < 1e-6);

        // Game over: later contacts are ignored
        assert_eq!(zone.contact(&fumes("FumesWater", ContactPhase::Enter), &mut scene), None);
        zone.contact(&fumes("FumesClassD", ContactPhase::Enter), &mut scene);
        assert_eq!(zone.agents_inside(), 0);
        assert_eq!(zone.advance(ms(3000), &mut scene), None);
        assert_eq!(scene.is_active("Warning"), Some(false));
    }

    #[test]
    fn test_contacts_for_other_receivers_are_ignored() {
        let mut scene = scene();
        let mut zone = FireZone::new(settings());

        let elsewhere = ContactEvent::enter(
            ContactKind::TriggerVolume,
            ContactInfo::new("Fumes").with_tag("FumesWater"),
        )
        .on("OtherZone");
        assert_eq!(zone.contact(&elsewhere, &mut scene), None);
        assert!(!zone.is_failed());
    }

    #[test]
    fn test_reset_restores_scene() {
        let mut scene = scene();
        let mut zone = FireZone::new(settings());
        zone.init(&mut scene);
        let initial = scene.clone();

        zone.contact(&fumes("FumesWater", ContactPhase::Enter), &mut scene);
        zone.reset(&mut scene);

        assert!(!zone.is_failed());
        assert_eq!(zone.intensity(), 1.0);
        assert_eq!(scene.entities, initial.entities);

        // Pending warning hide from before the reset does not fire
        zone.contact(&fumes("FumesClassD", ContactPhase::Enter), &mut scene);
        assert_eq!(zone.agents_inside(), 1);
    }

    #[test]
    fn test_identical_tags_rejected() {
        let settings = FireZoneSettings {
            wrong_tag: "FumesClassD".into(),
            ..FireZoneSettings::default()
        };
        assert!(settings.validate(0).is_err());
    }
}
