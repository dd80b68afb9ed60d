//! Lifecycle hooks attached to packages
//!
//! Hooks run synchronously at each lifecycle transition. They cannot reach
//! back into the engine directly; instead they queue [`SessionCommand`]s that
//! the session applies once the current lifecycle step has finished.

use std::collections::HashMap;
use std::time::Duration;

use firedrill_events::PackageRef;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, trace};

use crate::catalog::PackageId;
use crate::timeline::seconds;

/// Point in a package cycle where hooks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// Once, when the lifecycle task starts
    Started,
    /// After the actions of a cycle were applied
    Executed,
    /// After a cycle finished, including any auto-revert
    Completed,
}

/// Command a hook may ask the session to perform
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Trigger(PackageRef),
    Stop(PackageRef),
    StopAll,
    StartCountdown,
    CancelCountdown,
    /// Force the countdown failure screen with a reason
    Fail(String),
    ShowStep(usize),
    ShowMessage { text: String, duration: Duration },
    /// Like `ShowMessage`, but skipped once the alarm runs or the drill failed
    Prompt { text: String, duration: Duration },
    HideDialogue,
    ResetFire,
}

/// Hook command as written in a scenario file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "do", rename_all = "snake_case")]
pub enum HookCommand {
    Trigger {
        package: String,
    },
    Stop {
        package: String,
    },
    StopAll,
    StartCountdown,
    CancelCountdown,
    Fail {
        #[serde(default)]
        reason: String,
    },
    ShowStep {
        step: usize,
    },
    ShowMessage {
        text: String,
        seconds: f32,
    },
    Prompt {
        text: String,
        seconds: f32,
    },
    HideDialogue,
    ResetFire,
}

impl From<&HookCommand> for SessionCommand {
    fn from(command: &HookCommand) -> Self {
        match command {
            HookCommand::Trigger { package } => SessionCommand::Trigger(package.as_str().into()),
            HookCommand::Stop { package } => SessionCommand::Stop(package.as_str().into()),
            HookCommand::StopAll => SessionCommand::StopAll,
            HookCommand::StartCountdown => SessionCommand::StartCountdown,
            HookCommand::CancelCountdown => SessionCommand::CancelCountdown,
            HookCommand::Fail { reason } => SessionCommand::Fail(reason.clone()),
            HookCommand::ShowStep { step } => SessionCommand::ShowStep(*step),
            HookCommand::ShowMessage { text, seconds: secs } => SessionCommand::ShowMessage {
                text: text.clone(),
                duration: seconds(*secs),
            },
            HookCommand::Prompt { text, seconds: secs } => SessionCommand::Prompt {
                text: text.clone(),
                duration: seconds(*secs),
            },
            HookCommand::HideDialogue => SessionCommand::HideDialogue,
            HookCommand::ResetFire => SessionCommand::ResetFire,
        }
    }
}

/// A hook declared in the scenario file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookBinding {
    pub on: HookPoint,
    pub run: HookCommand,
}

/// Information handed to a hook when it runs
pub struct HookContext<'a> {
    pub package: PackageId,
    pub name: &'a str,
    pub point: HookPoint,
    /// 1-based cycle number of the lifecycle task
    pub cycle: u32,
    /// Logical session time of the transition
    pub now: Duration,
    commands: &'a UnboundedSender<SessionCommand>,
}

impl HookContext<'_> {
    /// Queue a command for the session
    pub fn send(&self, command: SessionCommand) {
        let _ = self.commands.send(command);
    }

    pub fn trigger(&self, package: impl Into<PackageRef>) {
        self.send(SessionCommand::Trigger(package.into()));
    }

    pub fn stop(&self, package: impl Into<PackageRef>) {
        self.send(SessionCommand::Stop(package.into()));
    }
}

pub type HookFn = Box<dyn FnMut(&HookContext<'_>) + Send>;

/// Registered hooks for every package
pub struct HookRegistry {
    hooks: HashMap<(PackageId, HookPoint), Vec<HookFn>>,
    commands: UnboundedSender<SessionCommand>,
}

impl HookRegistry {
    pub fn new(commands: UnboundedSender<SessionCommand>) -> Self {
        Self {
            hooks: HashMap::new(),
            commands,
        }
    }

    /// Register a closure to run at `point` of every cycle of `package`
    pub fn register<F>(&mut self, package: PackageId, point: HookPoint, hook: F)
    where
        F: FnMut(&HookContext<'_>) + Send + 'static,
    {
        self.hooks
            .entry((package, point))
            .or_default()
            .push(Box::new(hook));
    }

    /// Register a scenario-declared binding
    pub fn bind(&mut self, package: PackageId, binding: &HookBinding) {
        let command = SessionCommand::from(&binding.run);
        self.register(package, binding.on, move |ctx| ctx.send(command.clone()));
    }

    /// Number of hooks registered at a point
    pub fn count(&self, package: PackageId, point: HookPoint) -> usize {
        self.hooks.get(&(package, point)).map_or(0, Vec::len)
    }

    /// Run every hook registered at a point, in registration order
    pub fn invoke(
        &mut self,
        package: PackageId,
        name: &str,
        point: HookPoint,
        cycle: u32,
        now: Duration,
    ) {
        let Some(hooks) = self.hooks.get_mut(&(package, point)) else {
            return;
        };

        let ctx = HookContext {
            package,
            name,
            point,
            cycle,
            now,
            commands: &self.commands,
        };

        trace!(target: "scheduler", "Running {} {:?} hook(s) for {}", hooks.len(), point, name);

        for hook in hooks.iter_mut() {
            // A broken hook must not take the session down with it
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(&ctx))) {
                error!(target: "scheduler",
                    "Hook {:?} of package {} panicked: {:?}",
                    point,
                    name,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[test]
    fn test_hooks_run_in_registration_order() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = HookRegistry::new(tx);
        let log = Arc::new(Mutex::new(Vec::new()));

        for label in ["a", "b"] {
            let log = Arc::clone(&log);
            registry.register(PackageId(0), HookPoint::Started, move |ctx| {
                log.lock().unwrap().push(format!("{}:{}", ctx.name, label));
            });
        }

        registry.invoke(PackageId(0), "Alarm", HookPoint::Started, 1, Duration::ZERO);
        registry.invoke(PackageId(0), "Alarm", HookPoint::Executed, 1, Duration::ZERO);

        assert_eq!(*log.lock().unwrap(), vec!["Alarm:a", "Alarm:b"]);
    }

    #[test]
    fn test_panicking_hook_does_not_stop_others() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = HookRegistry::new(tx);
        let ran = Arc::new(Mutex::new(false));

        registry.register(PackageId(1), HookPoint::Executed, |_| panic!("boom"));
        let flag = Arc::clone(&ran);
        registry.register(PackageId(1), HookPoint::Executed, move |_| {
            *flag.lock().unwrap() = true;
        });

        registry.invoke(PackageId(1), "Broken", HookPoint::Executed, 1, Duration::ZERO);
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn test_binding_queues_command() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = HookRegistry::new(tx);
        let binding = HookBinding {
            on: HookPoint::Completed,
            run: HookCommand::ShowStep { step: 2 },
        };

        registry.bind(PackageId(3), &binding);
        registry.invoke(PackageId(3), "Intro", HookPoint::Completed, 1, Duration::ZERO);

        assert_eq!(rx.try_recv().ok(), Some(SessionCommand::ShowStep(2)));
        assert!(rx.try_recv().is_err());
    }
}
