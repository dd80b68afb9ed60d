//! Alarm countdown with a `MM:SS` display and a timeout failure screen

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actuator::Actuators;
use crate::error::{check_seconds, ConfigError};
use crate::timeline::{seconds, TimerId, Timeline};

const MIN_TOTAL_SECONDS: f32 = 1.0;
const MIN_TICK_INTERVAL: f32 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownSettings {
    /// Time from start until the countdown expires
    pub total_seconds: f32,
    /// How often the display updates
    pub tick_interval: f32,
    /// Remaining time at or below which the display is in danger style
    pub danger_seconds: f32,
    /// Text element showing `MM:SS`
    pub timer_text: Option<String>,
    /// Optional label shown and hidden together with the timer
    pub timer_label: Option<String>,
    pub failed_window: Option<String>,
    pub failure_reason_text: Option<String>,
    /// Large message shown on failure
    pub center_text: Option<String>,
    pub center_message: String,
    /// How long the center message stays up; zero keeps it
    pub center_message_seconds: f32,
    /// Reason used for timeouts and blank failure reasons
    pub timeout_message: String,
    pub hide_until_start: bool,
    pub hide_timer_on_failure: bool,
    /// Open the failure window when the countdown runs out
    pub fail_on_timeout: bool,
}

impl Default for CountdownSettings {
    fn default() -> Self {
        Self {
            total_seconds: 60.0,
            tick_interval: 1.0,
            danger_seconds: 10.0,
            timer_text: None,
            timer_label: None,
            failed_window: None,
            failure_reason_text: None,
            center_text: None,
            center_message: "YOU FAILED TO CONTROL THE FIRE.".to_string(),
            center_message_seconds: 0.0,
            timeout_message: "TIME OUT!\nYou did not trigger the correct safety steps in time."
                .to_string(),
            hide_until_start: true,
            hide_timer_on_failure: true,
            fail_on_timeout: true,
        }
    }
}

impl CountdownSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::component("countdown", reason);

        check_seconds(self.total_seconds).map_err(|e| invalid(format!("total_seconds: {}", e)))?;
        if self.total_seconds < MIN_TOTAL_SECONDS {
            return Err(invalid(format!(
                "total_seconds must be at least {}",
                MIN_TOTAL_SECONDS
            )));
        }

        check_seconds(self.tick_interval).map_err(|e| invalid(format!("tick_interval: {}", e)))?;
        if self.tick_interval < MIN_TICK_INTERVAL {
            return Err(invalid(format!(
                "tick_interval must be at least {}",
                MIN_TICK_INTERVAL
            )));
        }

        check_seconds(self.danger_seconds).map_err(|e| invalid(format!("danger_seconds: {}", e)))?;
        check_seconds(self.center_message_seconds)
            .map_err(|e| invalid(format!("center_message_seconds: {}", e)))?;
        Ok(())
    }
}

/// Something the session may want to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownSignal {
    /// Time ran out
    Expired,
    /// The center failure message went away; the host may restart
    MessageElapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountdownTimer {
    Display,
    HideCenterMessage,
}

/// Format seconds as `MM:SS`, rounding up to whole seconds
pub fn format_remaining(remaining: f32) -> String {
    let total = remaining.max(0.0).ceil() as u32;
    format!("{:02}:{:02}", total / 60, total % 60)
}

pub struct AlarmCountdown {
    settings: CountdownSettings,
    timeline: Timeline<CountdownTimer>,
    display_timer: Option<TimerId>,
    steps: u32,
    remaining: f32,
    running: bool,
    danger: bool,
}

impl AlarmCountdown {
    pub fn new(settings: CountdownSettings) -> Self {
        let remaining = settings.total_seconds;
        Self {
            settings,
            timeline: Timeline::new(),
            display_timer: None,
            steps: 0,
            remaining,
            running: false,
            danger: false,
        }
    }

    pub fn settings(&self) -> &CountdownSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the display is in danger style
    pub fn is_danger(&self) -> bool {
        self.danger
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    /// Put the UI into its pre-start state
    pub fn init(&mut self, scene: &mut dyn Actuators) {
        if let Some(center) = &self.settings.center_text {
            scene.set_active(center, false);
        }
        if let Some(window) = &self.settings.failed_window {
            scene.set_active(window, false);
        }
        self.set_timer_visible(!self.settings.hide_until_start, scene);
        self.display(self.settings.total_seconds, scene);
    }

    /// Start counting down from the configured total
    ///
    /// The first display step happens immediately.
    pub fn start(&mut self, scene: &mut dyn Actuators) -> bool {
        if self.running {
            return false;
        }

        self.running = true;
        self.steps = 0;
        self.remaining = self.settings.total_seconds;
        self.danger = false;

        if self.settings.hide_until_start {
            self.set_timer_visible(true, scene);
        }
        self.display(self.remaining, scene);

        info!(target: "countdown", "Countdown started ({}s)", self.settings.total_seconds);
        self.step(scene);
        self.display_timer = Some(
            self.timeline
                .schedule_recurring(seconds(self.settings.tick_interval), CountdownTimer::Display),
        );
        true
    }

    /// Stop the countdown without failing
    pub fn cancel(&mut self, scene: &mut dyn Actuators) -> bool {
        if !self.running {
            return false;
        }

        self.halt();
        if self.settings.hide_until_start {
            self.set_timer_visible(false, scene);
        }
        self.danger = false;

        info!(target: "countdown", "Countdown cancelled with {:.1}s left", self.remaining);
        true
    }

    /// Show the failure screen with a reason
    pub fn fail(&mut self, reason: &str, scene: &mut dyn Actuators) {
        let reason = if reason.trim().is_empty() {
            self.settings.timeout_message.as_str()
        } else {
            reason
        };
        warn!(target: "countdown", "Failure: {}", reason.replace('\n', " "));

        if let Some(window) = &self.settings.failed_window {
            scene.set_active(window, true);
        }
        if let Some(text) = &self.settings.failure_reason_text {
            scene.set_text(text, reason);
        }
        if self.settings.hide_timer_on_failure {
            self.set_timer_visible(false, scene);
        }

        if let Some(center) = &self.settings.center_text {
            scene.set_text(center, &self.settings.center_message);
            scene.set_active(center, true);

            if self.settings.center_message_seconds > 0.0 {
                self.timeline.schedule_timer(
                    seconds(self.settings.center_message_seconds),
                    CountdownTimer::HideCenterMessage,
                );
            }
        }
    }

    /// Advance the countdown clock
    pub fn advance(&mut self, elapsed: Duration, scene: &mut dyn Actuators) -> Vec<CountdownSignal> {
        let target = self.timeline.now() + elapsed;
        let mut signals = Vec::new();

        while let Some(fired) = self.timeline.pop_due(target) {
            match fired.payload {
                CountdownTimer::Display => {
                    if !self.running {
                        continue;
                    }
                    if self.remaining > 0.0 {
                        self.step(scene);
                    } else {
                        self.expire(scene);
                        signals.push(CountdownSignal::Expired);
                    }
                }
                CountdownTimer::HideCenterMessage => {
                    if let Some(center) = &self.settings.center_text {
                        scene.set_active(center, false);
                    }
                    debug!(target: "countdown", "Center message elapsed");
                    signals.push(CountdownSignal::MessageElapsed);
                }
            }
        }

        self.timeline.settle(target);
        signals
    }

    fn step(&mut self, scene: &mut dyn Actuators) {
        self.steps += 1;
        // Derived from the step count so repeated subtraction cannot drift
        self.remaining =
            (self.settings.total_seconds - self.steps as f32 * self.settings.tick_interval).max(0.0);
        self.display(self.remaining, scene);

        let danger = self.remaining <= self.settings.danger_seconds;
        if danger && !self.danger {
            debug!(target: "countdown", "Entering danger zone at {:.1}s", self.remaining);
        }
        self.danger = danger;
    }

    fn expire(&mut self, scene: &mut dyn Actuators) {
        self.halt();
        info!(target: "countdown", "Countdown expired");

        if self.settings.fail_on_timeout {
            let message = self.settings.timeout_message.clone();
            self.fail(&message, scene);
        }
    }

    fn halt(&mut self) {
        self.running = false;
        if let Some(timer) = self.display_timer.take() {
            self.timeline.cancel_timer(timer);
        }
    }

    fn display(&self, remaining: f32, scene: &mut dyn Actuators) {
        if let Some(text) = &self.settings.timer_text {
            scene.set_text(text, &format_remaining(remaining));
        }
    }

    fn set_timer_visible(&self, visible: bool, scene: &mut dyn Actuators) {
        for target in [&self.settings.timer_text, &self.settings.timer_label]
            .into_iter()
            .flatten()
        {
            scene.set_active(target, visible);
        }
    }
}
