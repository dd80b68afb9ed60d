use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, trace};

use crate::actuator::Actuators;
use crate::catalog::{ActionSet, ColliderActions, ObjectActions, SoundAction};

/// What a single application touched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Actuator calls that reached an existing target
    pub applied: usize,
    /// References skipped because the target does not exist
    pub skipped: usize,
    /// Clip chosen for one-shot playback
    pub clip: Option<String>,
}

impl ExecutionReport {
    fn record(&mut self, reached: bool) {
        if reached {
            self.applied += 1;
        } else {
            self.skipped += 1;
        }
    }
}

/// Applies action sets to the scene
///
/// Order is fixed: sound, then colliders, then objects.
#[derive(Debug)]
pub struct ActionExecutor {
    rng: StdRng,
}

impl ActionExecutor {
    /// Create an executor; a seed makes clip choice reproducible
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Apply a package's actions
    pub fn apply(&mut self, actions: &ActionSet, scene: &mut dyn Actuators) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        self.apply_sound(&actions.sound, scene, &mut report);
        apply_colliders(&actions.colliders, scene, &mut report);
        apply_objects(&actions.objects, scene, &mut report);

        if report.skipped > 0 {
            debug!(target: "actions", "Skipped {} missing reference(s)", report.skipped);
        }

        report
    }

    fn apply_sound(
        &mut self,
        sound: &SoundAction,
        scene: &mut dyn Actuators,
        report: &mut ExecutionReport,
    ) {
        let Some(source) = sound.source.as_deref() else {
            return;
        };

        if sound.stop_source {
            report.record(scene.stop_audio(source));
        }

        if sound.start_looping {
            if sound.stop_before_play {
                report.record(scene.stop_audio(source));
            }
            report.record(scene.play_looping(source));
        } else if let Some(clip) = sound.one_shots.choose(&mut self.rng) {
            if sound.stop_before_play {
                report.record(scene.stop_audio(source));
            }
            trace!(target: "actions", "Playing {} through {}", clip, source);
            report.record(scene.play_one_shot(source, clip, sound.volume));
            report.clip = Some(clip.clone());
        }
    }

    /// Undo an object group: on becomes off, off becomes on, toggles flip back
    pub fn revert_objects(&self, objects: &ObjectActions, scene: &mut dyn Actuators) {
        let mut report = ExecutionReport::default();
        set_all_active(&objects.turn_on, false, scene, &mut report);
        set_all_active(&objects.turn_off, true, scene, &mut report);
        toggle_all(&objects.toggle, scene, &mut report);
        trace!(target: "actions", "Reverted objects ({} applied)", report.applied);
    }

    /// Undo a collider group: enabled become disabled and the other way round
    pub fn revert_colliders(&self, colliders: &ColliderActions, scene: &mut dyn Actuators) {
        let mut report = ExecutionReport::default();
        set_all_enabled(&colliders.enable, false, scene, &mut report);
        set_all_enabled(&colliders.disable, true, scene, &mut report);
        trace!(target: "actions", "Reverted colliders ({} applied)", report.applied);
    }
}

fn apply_colliders(
    colliders: &ColliderActions,
    scene: &mut dyn Actuators,
    report: &mut ExecutionReport,
) {
    set_all_enabled(&colliders.enable, true, scene, report);
    set_all_enabled(&colliders.disable, false, scene, report);
}

fn apply_objects(objects: &ObjectActions, scene: &mut dyn Actuators, report: &mut ExecutionReport) {
    set_all_active(&objects.turn_on, true, scene, report);
    set_all_active(&objects.turn_off, false, scene, report);
    toggle_all(&objects.toggle, scene, report);
}

fn set_all_active(
    entities: &[String],
    active: bool,
    scene: &mut dyn Actuators,
    report: &mut ExecutionReport,
) {
    for entity in entities {
        report.record(scene.set_active(entity, active));
    }
}

fn toggle_all(entities: &[String], scene: &mut dyn Actuators, report: &mut ExecutionReport) {
    for entity in entities {
        match scene.is_active(entity) {
            Some(active) => report.record(scene.set_active(entity, !active)),
            None => report.record(false),
        }
    }
}

fn set_all_enabled(
    colliders: &[String],
    enabled: bool,
    scene: &mut dyn Actuators,
    report: &mut ExecutionReport,
) {
    for collider in colliders {
        report.record(scene.set_collider_enabled(collider, enabled));
    }
}
