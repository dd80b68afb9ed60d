use std::time::Duration;

use firedrill_events::{ContactEvent, EventConsumer, EventEnvelope, KeyCode, PackageRef, SessionEvent};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, trace, warn};

use crate::actuator::Actuators;
use crate::catalog::{PackageCatalog, PackageId};
use crate::config::{ScenarioConfig, SessionSettings};
use crate::countdown::{AlarmCountdown, CountdownSettings, CountdownSignal};
use crate::dialogue::{DialogueSettings, StepDialogue};
use crate::dispatcher::TriggerDispatcher;
use crate::error::ConfigError;
use crate::executor::ActionExecutor;
use crate::fire_zone::{FireZone, FireZoneSettings, FireZoneSignal};
use crate::hooks::{HookContext, HookPoint, HookRegistry, SessionCommand};
use crate::revert::RevertScheduler;
use crate::scheduler::{LifecycleEnv, PackageScheduler, Wake};

/// Hook commands applied per lifecycle step before the rest are dropped
pub const MAX_COMMANDS_PER_STEP: usize = 1024;

/// One training session: the package engine plus the scenario components
///
/// The host drives it with [`Session::tick`] once per frame and forwards
/// physics contacts and UI triggers as they happen. Time only moves inside
/// `tick`; everything else runs at the current logical time.
pub struct Session<A: Actuators> {
    scheduler: PackageScheduler,
    dispatcher: TriggerDispatcher,
    scene: A,
    hooks: HookRegistry,
    commands: UnboundedReceiver<SessionCommand>,
    countdown: Option<AlarmCountdown>,
    dialogue: Option<StepDialogue>,
    fire_zones: Vec<FireZone>,
    /// Logical time the components were last advanced to
    components_now: Duration,
    failure: Option<String>,
}

impl<A: Actuators> Session<A> {
    pub fn new(catalog: PackageCatalog, scene: A, settings: &SessionSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut hooks = HookRegistry::new(tx);

        for (id, package) in catalog.iter() {
            for binding in &package.hooks {
                hooks.bind(id, binding);
            }
        }

        let scheduler = PackageScheduler::new(
            catalog,
            ActionExecutor::new(settings.seed),
            RevertScheduler::new(settings.revert_timing),
        );

        Self {
            scheduler,
            dispatcher: TriggerDispatcher::new(),
            scene,
            hooks,
            commands: rx,
            countdown: None,
            dialogue: None,
            fire_zones: Vec::new(),
            components_now: Duration::ZERO,
            failure: None,
        }
    }

    /// Build a session from a validated scenario
    pub fn from_config(config: &ScenarioConfig, scene: A) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut session = Self::new(config.catalog()?, scene, &config.session);

        if let Some(countdown) = &config.countdown {
            session = session.with_countdown(countdown.clone());
        }
        if let Some(dialogue) = &config.dialogue {
            session = session.with_dialogue(dialogue.clone());
        }
        for zone in &config.fire_zones {
            session = session.with_fire_zone(zone.clone());
        }

        info!(target: "session",
            "Session ready: {} packages, {} fire zone(s)",
            session.scheduler.catalog().len(),
            session.fire_zones.len()
        );
        Ok(session)
    }

    pub fn with_countdown(mut self, settings: CountdownSettings) -> Self {
        self.countdown = Some(AlarmCountdown::new(settings));
        self
    }

    pub fn with_dialogue(mut self, settings: DialogueSettings) -> Self {
        self.dialogue = Some(StepDialogue::new(settings));
        self
    }

    pub fn with_fire_zone(mut self, settings: FireZoneSettings) -> Self {
        self.fire_zones.push(FireZone::new(settings));
        self
    }

    /// Register a hook closure for a package
    ///
    /// Returns false if the package does not exist.
    pub fn on<F>(&mut self, package: impl Into<PackageRef>, point: HookPoint, hook: F) -> bool
    where
        F: FnMut(&HookContext<'_>) + Send + 'static,
    {
        match self.resolve(&package.into()) {
            Some(id) => {
                self.hooks.register(id, point, hook);
                true
            }
            None => false,
        }
    }

    pub fn scene(&self) -> &A {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut A {
        &mut self.scene
    }

    pub fn scheduler(&self) -> &PackageScheduler {
        &self.scheduler
    }

    pub fn catalog(&self) -> &PackageCatalog {
        self.scheduler.catalog()
    }

    pub fn countdown(&self) -> Option<&AlarmCountdown> {
        self.countdown.as_ref()
    }

    pub fn dialogue(&self) -> Option<&StepDialogue> {
        self.dialogue.as_ref()
    }

    pub fn fire_zone(&self, name: &str) -> Option<&FireZone> {
        self.fire_zones.iter().find(|z| z.name() == name)
    }

    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    pub fn is_started(&self) -> bool {
        self.dispatcher.session_started()
    }

    /// Reason of the last failure screen, if any
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn resolve(&self, package: &PackageRef) -> Option<PackageId> {
        self.scheduler.catalog().resolve(package)
    }

    /// Initialise the components and fire the session-start packages
    ///
    /// Runs once; later calls do nothing.
    pub fn start(&mut self) {
        if self.dispatcher.session_started() {
            return;
        }

        if let Some(countdown) = &mut self.countdown {
            countdown.init(&mut self.scene);
        }
        if let Some(dialogue) = &mut self.dialogue {
            dialogue.init(&mut self.scene);
        }
        for zone in &mut self.fire_zones {
            zone.init(&mut self.scene);
        }

        let ids = self.dispatcher.session_start(self.scheduler.catalog());
        info!(target: "session", "Session started");
        self.dispatch(ids);
    }

    /// Advance the session clock by one host frame
    ///
    /// Timers due within the frame fire first, each at its own due time;
    /// then `active_keys` are polled at the new time.
    pub fn tick(&mut self, elapsed: Duration, active_keys: &[KeyCode]) {
        self.start();

        let target = self.scheduler.now() + elapsed;

        for wake in self.scheduler.take_deferred() {
            self.resume(wake);
        }

        while let Some(wake) = self.scheduler.pop_due(target) {
            self.advance_components(self.scheduler.now());
            self.resume(wake);
        }
        self.scheduler.settle(target);
        self.advance_components(target);

        let ids = self.dispatcher.key_poll(self.scheduler.catalog(), active_keys);
        self.dispatch(ids);
    }

    /// Forward a physics contact to the packages and fire zones
    pub fn contact(&mut self, contact: &ContactEvent) {
        self.start();

        let ids = self.dispatcher.contact(self.scheduler.catalog(), contact);
        self.dispatch(ids);

        let mut signals = Vec::new();
        for zone in &mut self.fire_zones {
            if let Some(signal) = zone.contact(contact, &mut self.scene) {
                signals.push((zone.name().to_string(), signal));
            }
        }
        for (zone, signal) in signals {
            self.handle_zone_signal(&zone, signal);
        }
    }

    /// Manually trigger a package by index or name
    pub fn trigger(&mut self, package: impl Into<PackageRef>) -> bool {
        self.start();

        let package = package.into();
        let Some(id) = self.resolve(&package) else {
            trace!(target: "session", "Trigger for unknown package {:?}", package);
            return false;
        };

        let started = self.scheduler.trigger(id, &mut self.hooks);
        self.pump();
        started
    }

    pub fn trigger_named(&mut self, name: &str) -> bool {
        self.trigger(PackageRef::Name(name.to_string()))
    }

    pub fn stop(&mut self, package: impl Into<PackageRef>) -> bool {
        self.start();

        match self.resolve(&package.into()) {
            Some(id) => self.scheduler.stop(id),
            None => false,
        }
    }

    pub fn stop_all(&mut self) -> usize {
        self.start();
        self.scheduler.stop_all()
    }

    fn dispatch(&mut self, ids: Vec<PackageId>) {
        if ids.is_empty() {
            return;
        }

        debug!(target: "dispatch", "Dispatching {} package(s)", ids.len());
        for id in ids {
            self.scheduler.trigger(id, &mut self.hooks);
        }
        self.pump();
    }

    fn resume(&mut self, wake: Wake) {
        let mut env = LifecycleEnv {
            scene: &mut self.scene,
            hooks: &mut self.hooks,
        };
        self.scheduler.resume(wake, &mut env);
        self.pump();
    }

    /// Apply queued hook commands and run tasks that became ready
    fn pump(&mut self) {
        let mut applied = 0;
        let mut dropped = 0;

        loop {
            if let Ok(command) = self.commands.try_recv() {
                if applied < MAX_COMMANDS_PER_STEP {
                    applied += 1;
                    self.apply_command(command);
                } else {
                    dropped += 1;
                }
                continue;
            }

            if let Some(wake) = self.scheduler.pop_ready() {
                let mut env = LifecycleEnv {
                    scene: &mut self.scene,
                    hooks: &mut self.hooks,
                };
                self.scheduler.resume(wake, &mut env);
                continue;
            }

            break;
        }

        if dropped > 0 {
            warn!(target: "session",
                "Dropped {} hook command(s) after {} in one step; hooks may be re-triggering each other",
                dropped,
                MAX_COMMANDS_PER_STEP
            );
        }
    }

    fn apply_command(&mut self, command: SessionCommand) {
        trace!(target: "session", "Applying {:?}", command);

        match command {
            SessionCommand::Trigger(package) => {
                if let Some(id) = self.resolve(&package) {
                    self.scheduler.trigger(id, &mut self.hooks);
                }
            }
            SessionCommand::Stop(package) => {
                if let Some(id) = self.resolve(&package) {
                    self.scheduler.stop(id);
                }
            }
            SessionCommand::StopAll => {
                self.scheduler.stop_all();
            }
            SessionCommand::StartCountdown => {
                if let Some(countdown) = &mut self.countdown {
                    countdown.start(&mut self.scene);
                }
            }
            SessionCommand::CancelCountdown => {
                if let Some(countdown) = &mut self.countdown {
                    countdown.cancel(&mut self.scene);
                }
            }
            SessionCommand::Fail(reason) => {
                let reason = match &mut self.countdown {
                    Some(countdown) => {
                        countdown.fail(&reason, &mut self.scene);
                        if reason.trim().is_empty() {
                            countdown.settings().timeout_message.clone()
                        } else {
                            reason
                        }
                    }
                    None => reason,
                };
                self.failure = Some(reason);
            }
            SessionCommand::ShowStep(step) => {
                if let Some(dialogue) = &mut self.dialogue {
                    dialogue.show_step(step, &mut self.scene);
                }
            }
            SessionCommand::ShowMessage { text, duration } => {
                if let Some(dialogue) = &mut self.dialogue {
                    dialogue.show_custom(&text, duration, &mut self.scene);
                }
            }
            SessionCommand::Prompt { text, duration } => {
                let alarm_running = self.countdown.as_ref().is_some_and(|c| c.is_running());
                if alarm_running || self.failure.is_some() {
                    debug!(target: "session", "Skipping prompt; the drill is already under way");
                } else if let Some(dialogue) = &mut self.dialogue {
                    dialogue.show_custom(&text, duration, &mut self.scene);
                }
            }
            SessionCommand::HideDialogue => {
                if let Some(dialogue) = &mut self.dialogue {
                    dialogue.hide_now(&mut self.scene);
                }
            }
            SessionCommand::ResetFire => {
                for zone in &mut self.fire_zones {
                    zone.reset(&mut self.scene);
                }
                self.failure = None;
            }
        }
    }

    /// Bring the components' clocks up to `until`
    fn advance_components(&mut self, until: Duration) {
        let Some(elapsed) = until.checked_sub(self.components_now) else {
            return;
        };
        if elapsed.is_zero() {
            return;
        }
        self.components_now = until;

        if let Some(countdown) = &mut self.countdown {
            for signal in countdown.advance(elapsed, &mut self.scene) {
                match signal {
                    CountdownSignal::Expired => {
                        if countdown.settings().fail_on_timeout {
                            self.failure = Some(countdown.settings().timeout_message.clone());
                        }
                    }
                    CountdownSignal::MessageElapsed => {
                        info!(target: "session", "Failure message elapsed; the host may restart the scenario");
                    }
                }
            }
        }

        if let Some(dialogue) = &mut self.dialogue {
            dialogue.advance(elapsed, &mut self.scene);
        }

        let mut signals = Vec::new();
        for zone in &mut self.fire_zones {
            if let Some(signal) = zone.advance(elapsed, &mut self.scene) {
                signals.push((zone.name().to_string(), signal));
            }
        }
        for (zone, signal) in signals {
            self.handle_zone_signal(&zone, signal);
        }
    }

    fn handle_zone_signal(&mut self, zone: &str, signal: FireZoneSignal) {
        match signal {
            FireZoneSignal::Extinguished => {
                info!(target: "session", "Fire zone {} extinguished", zone);
            }
            FireZoneSignal::Failed(reason) => {
                info!(target: "session", "Fire zone {} failed the drill", zone);
                self.failure = Some(reason);
            }
        }
    }
}

impl<A: Actuators> EventConsumer for Session<A> {
    fn handle_event(&mut self, envelope: EventEnvelope) {
        trace!(target: "session",
            "Event #{} from {:?}: {:?}",
            envelope.sequence,
            envelope.source,
            envelope.event
        );

        match envelope.event {
            SessionEvent::SessionStart => self.start(),
            SessionEvent::Tick {
                elapsed,
                active_keys,
            } => self.tick(elapsed, &active_keys),
            SessionEvent::Contact(contact) => self.contact(&contact),
            SessionEvent::Trigger(package) => {
                self.trigger(package);
            }
            SessionEvent::Stop(package) => {
                self.stop(package);
            }
            SessionEvent::StopAll => {
                self.stop_all();
            }
        }
    }
}
