use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use firedrill_events::{ContactKind, KeyCode, PackageRef};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{check_seconds, ConfigError};
use crate::filter::TriggerFilter;
use crate::hooks::HookBinding;
use crate::timeline::seconds;

/// Stable key of a package: its position in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub usize);

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Class of event that can start a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerMode {
    Manual,
    OnSessionStart,
    KeyPoll,
    Collision,
    TriggerVolume,
}

impl From<ContactKind> for TriggerMode {
    fn from(kind: ContactKind) -> Self {
        match kind {
            ContactKind::Collision => TriggerMode::Collision,
            ContactKind::TriggerVolume => TriggerMode::TriggerVolume,
        }
    }
}

/// How a package is triggered, with the mode-specific settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Trigger {
    /// Only through `trigger` calls
    #[default]
    Manual,
    /// Once, when the session starts
    OnSessionStart,
    /// When `key` goes from released to held
    KeyPoll { key: KeyCode },
    /// When the controller body collides with something
    Collision {
        #[serde(default)]
        filter: TriggerFilter,
    },
    /// When something enters the controller's trigger volume
    TriggerVolume {
        #[serde(default)]
        filter: TriggerFilter,
    },
}

impl Trigger {
    pub fn mode(&self) -> TriggerMode {
        match self {
            Trigger::Manual => TriggerMode::Manual,
            Trigger::OnSessionStart => TriggerMode::OnSessionStart,
            Trigger::KeyPoll { .. } => TriggerMode::KeyPoll,
            Trigger::Collision { .. } => TriggerMode::Collision,
            Trigger::TriggerVolume { .. } => TriggerMode::TriggerVolume,
        }
    }

    /// Contact filter for the physics modes
    pub fn filter(&self) -> Option<&TriggerFilter> {
        match self {
            Trigger::Collision { filter } | Trigger::TriggerVolume { filter } => Some(filter),
            _ => None,
        }
    }

    fn normalized(self) -> Self {
        match self {
            Trigger::Collision { filter } => Trigger::Collision {
                filter: filter.normalized(),
            },
            Trigger::TriggerVolume { filter } => Trigger::TriggerVolume {
                filter: filter.normalized(),
            },
            other => other,
        }
    }
}

/// Entities to switch when a package runs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectActions {
    pub turn_on: Vec<String>,
    pub turn_off: Vec<String>,
    pub toggle: Vec<String>,
    /// Undo the switches after `duration_seconds`
    pub auto_revert: bool,
    pub duration_seconds: f32,
}

impl ObjectActions {
    pub fn is_empty(&self) -> bool {
        self.turn_on.is_empty() && self.turn_off.is_empty() && self.toggle.is_empty()
    }
}

/// Colliders to switch when a package runs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColliderActions {
    pub enable: Vec<String>,
    pub disable: Vec<String>,
    /// Undo the switches after `duration_seconds`
    pub auto_revert: bool,
    pub duration_seconds: f32,
}

impl ColliderActions {
    pub fn is_empty(&self) -> bool {
        self.enable.is_empty() && self.disable.is_empty()
    }
}

/// Audio to play when a package runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundAction {
    /// Audio source everything plays through; nothing happens without one
    pub source: Option<String>,
    /// Candidate clips; one is picked at random per run
    pub one_shots: Vec<String>,
    pub volume: f32,
    pub stop_before_play: bool,
    /// Start the source itself in looping mode instead of a one-shot
    pub start_looping: bool,
    /// Stop the source before anything else
    pub stop_source: bool,
}

impl Default for SoundAction {
    fn default() -> Self {
        Self {
            source: None,
            one_shots: Vec::new(),
            volume: 1.0,
            stop_before_play: false,
            start_looping: false,
            stop_source: false,
        }
    }
}

/// Everything a package does when it executes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSet {
    pub sound: SoundAction,
    pub colliders: ColliderActions,
    pub objects: ObjectActions,
}

fn default_name() -> String {
    "New Package".to_string()
}

fn default_true() -> bool {
    true
}

/// A named, independently triggered unit of timed actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub delay_seconds: f32,
    /// Actions may be applied at most once per session
    #[serde(default = "default_true")]
    pub run_once: bool,
    /// Keep cycling until stopped
    #[serde(default)]
    pub repeat: bool,
    #[serde(flatten)]
    pub actions: ActionSet,
    #[serde(default)]
    pub hooks: Vec<HookBinding>,
}

impl Package {
    /// A manual, run-once package with no actions
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            trigger: Trigger::Manual,
            delay_seconds: 0.0,
            run_once: true,
            repeat: false,
            actions: ActionSet::default(),
            hooks: Vec::new(),
        }
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_delay(mut self, delay_seconds: f32) -> Self {
        self.delay_seconds = delay_seconds;
        self
    }

    pub fn run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self.run_once = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_objects(mut self, objects: ObjectActions) -> Self {
        self.actions.objects = objects;
        self
    }

    pub fn with_colliders(mut self, colliders: ColliderActions) -> Self {
        self.actions.colliders = colliders;
        self
    }

    pub fn with_sound(mut self, sound: SoundAction) -> Self {
        self.actions.sound = sound;
        self
    }

    pub fn with_hook(mut self, binding: HookBinding) -> Self {
        self.hooks.push(binding);
        self
    }

    pub fn delay(&self) -> Duration {
        seconds(self.delay_seconds)
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::package(index, &self.name, reason);

        check_seconds(self.delay_seconds).map_err(|e| invalid(format!("delay_seconds: {}", e)))?;
        check_seconds(self.actions.objects.duration_seconds)
            .map_err(|e| invalid(format!("objects.duration_seconds: {}", e)))?;
        check_seconds(self.actions.colliders.duration_seconds)
            .map_err(|e| invalid(format!("colliders.duration_seconds: {}", e)))?;

        if !self.actions.sound.volume.is_finite() {
            return Err(invalid("sound.volume is not a finite number".to_string()));
        }

        for binding in &self.hooks {
            if let crate::hooks::HookCommand::ShowMessage { seconds, .. }
            | crate::hooks::HookCommand::Prompt { seconds, .. } = &binding.run
            {
                check_seconds(*seconds).map_err(|e| invalid(format!("hook message: {}", e)))?;
            }
        }

        Ok(())
    }

    fn normalized(mut self) -> Self {
        self.trigger = self.trigger.normalized();
        self.actions.sound.volume = self.actions.sound.volume.clamp(0.0, 1.0);
        self
    }
}

/// Static definition of every package in a session
#[derive(Debug, Clone, Default)]
pub struct PackageCatalog {
    packages: Vec<Package>,
}

impl PackageCatalog {
    /// Validate and freeze a list of packages
    pub fn new(packages: Vec<Package>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut validated = Vec::with_capacity(packages.len());

        for (index, package) in packages.into_iter().enumerate() {
            package.validate(index)?;

            if !seen.insert(package.name.clone()) {
                warn!(target: "scheduler",
                    "Duplicate package name '{}' (#{}); lookups by name resolve to the first one",
                    package.name,
                    index
                );
            }

            validated.push(package.normalized());
        }

        Ok(Self {
            packages: validated,
        })
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn get(&self, id: PackageId) -> Option<&Package> {
        self.packages.get(id.0)
    }

    /// First package whose name matches exactly
    pub fn find_by_name(&self, name: &str) -> Option<PackageId> {
        if name.trim().is_empty() {
            return None;
        }
        self.packages
            .iter()
            .position(|p| p.name == name)
            .map(PackageId)
    }

    pub fn resolve(&self, package: &PackageRef) -> Option<PackageId> {
        match package {
            PackageRef::Index(index) => (*index < self.packages.len()).then_some(PackageId(*index)),
            PackageRef::Name(name) => self.find_by_name(name),
        }
    }

    /// All packages in catalog order
    pub fn iter(&self) -> impl Iterator<Item = (PackageId, &Package)> {
        self.packages
            .iter()
            .enumerate()
            .map(|(index, package)| (PackageId(index), package))
    }

    /// Enabled packages with the given trigger mode, in catalog order
    pub fn enabled_with_mode(
        &self,
        mode: TriggerMode,
    ) -> impl Iterator<Item = (PackageId, &Package)> {
        self.iter()
            .filter(move |(_, p)| p.enabled && p.trigger.mode() == mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_name_returns_first_match() {
        let catalog = PackageCatalog::new(vec![
            Package::new("Alarm"),
            Package::new("Sprinkler"),
            Package::new("Alarm"),
        ])
        .unwrap();

        assert_eq!(catalog.find_by_name("Alarm"), Some(PackageId(0)));
        assert_eq!(catalog.find_by_name("Sprinkler"), Some(PackageId(1)));
        assert_eq!(catalog.find_by_name("alarm"), None);
        assert_eq!(catalog.find_by_name("   "), None);
    }

    #[test]
    fn test_resolve_out_of_range_index() {
        let catalog = PackageCatalog::new(vec![Package::new("Only")]).unwrap();
        assert_eq!(catalog.resolve(&PackageRef::Index(0)), Some(PackageId(0)));
        assert_eq!(catalog.resolve(&PackageRef::Index(1)), None);
    }

    #[test]
    fn test_negative_delay_is_rejected() {
        let err = PackageCatalog::new(vec![Package::new("Bad").with_delay(-1.0)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPackage { index: 0, .. }));
    }

    #[test]
    fn test_unrepresentable_delay_is_rejected() {
        let objects = ObjectActions {
            turn_on: vec!["X".into()],
            ..ObjectActions::default()
        };
        let err = PackageCatalog::new(vec![Package::new("Forever")
            .with_delay(1e20)
            .with_objects(objects)])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPackage { index: 0, .. }));

        // Large but representable delays are fine
        assert!(PackageCatalog::new(vec![Package::new("Long").with_delay(1e9)]).is_ok());
    }

    #[test]
    fn test_unrepresentable_revert_duration_is_rejected() {
        let objects = ObjectActions {
            turn_on: vec!["X".into()],
            auto_revert: true,
            duration_seconds: 1e20,
            ..ObjectActions::default()
        };
        let colliders = ColliderActions {
            disable: vec!["Door".into()],
            auto_revert: true,
            duration_seconds: f32::MAX,
            ..ColliderActions::default()
        };

        let err = PackageCatalog::new(vec![
            Package::new("Ok"),
            Package::new("Objects").with_objects(objects),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPackage { index: 1, .. }));

        let err = PackageCatalog::new(vec![Package::new("Colliders").with_colliders(colliders)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPackage { index: 0, .. }));
    }

    #[test]
    fn test_volume_is_clamped() {
        let sound = SoundAction {
            volume: 3.0,
            ..SoundAction::default()
        };
        let catalog = PackageCatalog::new(vec![Package::new("Loud").with_sound(sound)]).unwrap();
        assert_eq!(catalog.get(PackageId(0)).unwrap().actions.sound.volume, 1.0);
    }

    #[test]
    fn test_enabled_with_mode_skips_disabled() {
        let catalog = PackageCatalog::new(vec![
            Package::new("A").with_trigger(Trigger::OnSessionStart),
            Package::new("B").with_trigger(Trigger::OnSessionStart).disabled(),
            Package::new("C"),
            Package::new("D").with_trigger(Trigger::OnSessionStart),
        ])
        .unwrap();

        let ids: Vec<_> = catalog
            .enabled_with_mode(TriggerMode::OnSessionStart)
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![PackageId(0), PackageId(3)]);
    }

    #[test]
    fn test_package_from_toml() {
        let package: Package = toml::from_str(
            r#"
            name = "Alarm"
            delay_seconds = 1.5
            trigger = { mode = "trigger_volume", filter = { tag = "Player", layers = [0, 3] } }

            [objects]
            turn_on = ["AlarmLight"]
            auto_revert = true
            duration_seconds = 2.0

            [sound]
            source = "Speaker"
            one_shots = ["siren"]
            "#,
        )
        .unwrap();

        assert!(package.enabled);
        assert!(package.run_once);
        assert_eq!(package.trigger.mode(), TriggerMode::TriggerVolume);
        assert_eq!(
            package.trigger.filter().and_then(|f| f.required_tag.as_deref()),
            Some("Player")
        );
        assert_eq!(package.actions.objects.turn_on, vec!["AlarmLight"]);
        assert_eq!(package.actions.sound.volume, 1.0);
        assert_eq!(package.delay(), Duration::from_millis(1500));
    }
}
