use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::actuator::Actuators;
use crate::error::{check_seconds, ConfigError};
use crate::timeline::{seconds, TimerId, Timeline};

const MIN_STEP_SECONDS: f32 = 0.1;

/// One instruction shown in the dialogue panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueStep {
    pub text: String,
    #[serde(default = "default_step_seconds")]
    pub seconds: f32,
}

fn default_step_seconds() -> f32 {
    3.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueSettings {
    pub panel: Option<String>,
    pub text: Option<String>,
    pub steps: Vec<DialogueStep>,
    pub hide_on_start: bool,
    /// A new message cancels the pending hide of the previous one
    pub interrupt_current: bool,
    /// Step shown when the session starts
    pub initial_step: Option<usize>,
}

impl Default for DialogueSettings {
    fn default() -> Self {
        Self {
            panel: None,
            text: None,
            steps: Vec::new(),
            hide_on_start: true,
            interrupt_current: true,
            initial_step: Some(0),
        }
    }
}

impl DialogueSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, step) in self.steps.iter().enumerate() {
            check_seconds(step.seconds).map_err(|e| {
                ConfigError::component("dialogue", format!("step {}: {}", index, e))
            })?;
            if step.seconds < MIN_STEP_SECONDS {
                return Err(ConfigError::component(
                    "dialogue",
                    format!("step {} must last at least {}s", index, MIN_STEP_SECONDS),
                ));
            }
        }
        Ok(())
    }
}

/// Timed instruction panel
pub struct StepDialogue {
    settings: DialogueSettings,
    timeline: Timeline<()>,
    pending_hides: Vec<TimerId>,
}

impl StepDialogue {
    pub fn new(settings: DialogueSettings) -> Self {
        Self {
            settings,
            timeline: Timeline::new(),
            pending_hides: Vec::new(),
        }
    }

    pub fn step_count(&self) -> usize {
        self.settings.steps.len()
    }

    /// Apply the start-of-session state, then show the initial step
    pub fn init(&mut self, scene: &mut dyn Actuators) {
        if self.settings.hide_on_start {
            if let Some(panel) = &self.settings.panel {
                scene.set_active(panel, false);
            }
        }
        if let Some(step) = self.settings.initial_step {
            self.show_step(step, scene);
        }
    }

    /// Show a configured step; out-of-range indices do nothing
    pub fn show_step(&mut self, index: usize, scene: &mut dyn Actuators) -> bool {
        let Some(step) = self.settings.steps.get(index) else {
            trace!(target: "dialogue", "No dialogue step {}", index);
            return false;
        };
        let (text, duration) = (step.text.clone(), seconds(step.seconds));

        debug!(target: "dialogue", "Showing step {}", index);
        self.show(&text, duration, scene);
        true
    }

    /// Show arbitrary text for a while
    pub fn show_custom(&mut self, text: &str, duration: Duration, scene: &mut dyn Actuators) {
        debug!(target: "dialogue", "Showing custom message for {:?}", duration);
        self.show(text, duration, scene);
    }

    /// Hide the panel and forget every pending hide
    pub fn hide_now(&mut self, scene: &mut dyn Actuators) {
        self.cancel_pending();
        if let Some(panel) = &self.settings.panel {
            scene.set_active(panel, false);
        }
    }

    pub fn advance(&mut self, elapsed: Duration, scene: &mut dyn Actuators) {
        for fired in self.timeline.advance(elapsed) {
            self.pending_hides.retain(|id| *id != fired.id);
            if let Some(panel) = &self.settings.panel {
                scene.set_active(panel, false);
            }
        }
    }

    fn show(&mut self, text: &str, duration: Duration, scene: &mut dyn Actuators) {
        if self.settings.interrupt_current {
            self.cancel_pending();
        }

        if let Some(panel) = &self.settings.panel {
            scene.set_active(panel, true);
        }
        if let Some(target) = &self.settings.text {
            scene.set_text(target, text);
        }

        let id = self.timeline.schedule_timer(duration, ());
        self.pending_hides.push(id);
    }

    fn cancel_pending(&mut self) {
        for id in self.pending_hides.drain(..) {
            self.timeline.cancel_timer(id);
        }
    }
}
