//! Scripted replay of a scenario against its in-memory scene
//!
//! A script is a list of timestamped host inputs. The replayer turns them
//! into session events on a fixed frame step, optionally paced in real time.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use firedrill_events::{
    ContactEvent, ContactInfo, ContactKind, ContactPhase, EventConsumer, EventEnvelope,
    EventSource, KeyCode, PackageRef, SessionEvent,
};
use firedrill_sequencer::timeline::seconds;
use firedrill_sequencer::{Actuators, Session};
use serde::Deserialize;
use tracing::{debug, info};

/// Seconds replayed after the last scripted input when no length is given
pub const DEFAULT_TAIL_SECONDS: u64 = 5;

fn default_hold() -> f32 {
    0.1
}

/// One scripted host input
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptAction {
    /// Hold a key for `hold` seconds
    Press {
        key: KeyCode,
        #[serde(default = "default_hold")]
        hold: f32,
    },
    Contact {
        kind: ContactKind,
        #[serde(default)]
        phase: ContactPhase,
        #[serde(default)]
        receiver: Option<String>,
        entity: String,
        #[serde(default)]
        tag: Option<String>,
        #[serde(default)]
        layer: u8,
        /// Ancestors of `entity`, nearest first
        #[serde(default)]
        parents: Vec<String>,
    },
    Trigger {
        package: String,
    },
    Stop {
        package: String,
    },
    StopAll,
}

impl ScriptAction {
    /// Session event for this action; key presses have none
    fn to_event(&self) -> Option<SessionEvent> {
        let event = match self {
            ScriptAction::Press { .. } => return None,
            ScriptAction::Contact {
                kind,
                phase,
                receiver,
                entity,
                tag,
                layer,
                parents,
            } => {
                let other = ContactInfo {
                    tag: tag.clone(),
                    layer: *layer,
                    lineage: std::iter::once(entity.clone())
                        .chain(parents.iter().cloned())
                        .collect(),
                };
                SessionEvent::Contact(ContactEvent {
                    kind: *kind,
                    phase: *phase,
                    receiver: receiver.clone(),
                    other,
                })
            }
            ScriptAction::Trigger { package } => {
                SessionEvent::Trigger(PackageRef::Name(package.clone()))
            }
            ScriptAction::Stop { package } => SessionEvent::Stop(PackageRef::Name(package.clone())),
            ScriptAction::StopAll => SessionEvent::StopAll,
        };
        Some(event)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptEntry {
    /// Seconds since session start
    pub at: f32,
    #[serde(flatten)]
    pub action: ScriptAction,
}

/// The `[[script]]` section of a scenario file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub script: Vec<ScriptEntry>,
}

impl ReplayScript {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid script in {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let script: ReplayScript = toml::from_str(content)?;
        script.validate()?;
        Ok(script)
    }

    fn validate(&self) -> Result<()> {
        for (index, entry) in self.script.iter().enumerate() {
            if Duration::try_from_secs_f32(entry.at).is_err() {
                bail!("script entry {} has invalid time {}", index, entry.at);
            }
            if let ScriptAction::Press { hold, .. } = entry.action {
                if hold <= 0.0 || Duration::try_from_secs_f32(entry.at + hold).is_err() {
                    bail!("script entry {} holds its key for {}s", index, hold);
                }
            }
        }
        Ok(())
    }

    /// Time at which the last scripted input is over
    pub fn end_time(&self) -> Duration {
        self.script
            .iter()
            .map(|entry| match entry.action {
                ScriptAction::Press { hold, .. } => seconds(entry.at + hold),
                _ => seconds(entry.at),
            })
            .max()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Logical length of one frame
    pub frame: Duration,
    /// Logical time to stop at
    pub duration: Duration,
    /// Sleep between frames so the replay runs at wall-clock speed
    pub realtime: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            frame: Duration::from_millis(50),
            duration: Duration::from_secs(10),
            realtime: false,
        }
    }
}

/// Logical length of a replay
///
/// An explicit length must be a positive, representable number of seconds;
/// otherwise the replay runs a little past the last scripted input.
pub fn replay_duration(seconds: Option<f32>, script: &ReplayScript) -> Result<Duration> {
    match seconds {
        Some(seconds) if seconds > 0.0 => Duration::try_from_secs_f32(seconds)
            .with_context(|| format!("--seconds {} is out of range", seconds)),
        Some(seconds) => bail!("--seconds must be positive, got {}", seconds),
        None => Ok(script.end_time() + Duration::from_secs(DEFAULT_TAIL_SECONDS)),
    }
}

/// What the session looked like when the replay ended
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    pub frames: u64,
    pub events: u64,
    pub elapsed: Duration,
    pub completed: Vec<String>,
    pub running: Vec<String>,
    pub failure: Option<String>,
}

/// Feeds scripted events into any consumer
struct Replayer {
    entries: Vec<(Duration, ScriptAction)>,
    next: usize,
    held: Vec<(KeyCode, Duration)>,
    sequence: u64,
}

impl Replayer {
    fn new(script: &ReplayScript) -> Self {
        let mut entries: Vec<_> = script
            .script
            .iter()
            .map(|entry| (seconds(entry.at), entry.action.clone()))
            .collect();
        // Stable: entries at the same time keep file order
        entries.sort_by_key(|(at, _)| *at);

        Self {
            entries,
            next: 0,
            held: Vec::new(),
            sequence: 0,
        }
    }

    fn send<C: EventConsumer>(&mut self, consumer: &mut C, event: SessionEvent) {
        let envelope = EventEnvelope::new(event, self.sequence, EventSource::Replay);
        self.sequence += 1;
        consumer.handle_event(envelope);
    }

    /// Deliver everything due at `now`, then run one frame
    fn frame<C: EventConsumer>(&mut self, consumer: &mut C, now: Duration, frame: Duration) {
        while let Some((at, action)) = self.entries.get(self.next).cloned() {
            if at > now {
                break;
            }
            self.next += 1;

            debug!(target: "replay", "{:?}: {:?}", at, action);
            match action {
                ScriptAction::Press { key, hold } => self.held.push((key, now + seconds(hold))),
                other => {
                    if let Some(event) = other.to_event() {
                        self.send(consumer, event);
                    }
                }
            }
        }

        let active_keys: Vec<KeyCode> = self
            .held
            .iter()
            .filter(|(_, release)| *release > now)
            .map(|(key, _)| *key)
            .collect();
        let end = now + frame;
        self.held.retain(|(_, release)| *release > end);

        self.send(
            consumer,
            SessionEvent::Tick {
                elapsed: frame,
                active_keys,
            },
        );
    }
}

/// Run a script against a session and summarise the result
pub async fn run_replay<A: Actuators>(
    session: &mut Session<A>,
    script: &ReplayScript,
    options: &ReplayOptions,
) -> ReplaySummary {
    let frame = options.frame.max(Duration::from_millis(1));
    let mut replayer = Replayer::new(script);
    let mut interval = options.realtime.then(|| tokio::time::interval(frame));

    info!(target: "replay",
        "Replaying {} scripted input(s) over {:?} in {:?} frames",
        script.script.len(),
        options.duration,
        frame
    );

    replayer.send(session, SessionEvent::SessionStart);

    let mut now = Duration::ZERO;
    let mut frames = 0;
    while now < options.duration {
        if let Some(interval) = interval.as_mut() {
            interval.tick().await;
        }

        replayer.frame(session, now, frame);
        now += frame;
        frames += 1;
    }

    let scheduler = session.scheduler();
    let mut completed = Vec::new();
    let mut running = Vec::new();
    for (id, package) in session.catalog().iter() {
        if scheduler.has_completed(id) {
            completed.push(package.name.clone());
        }
        if scheduler.is_running(id) {
            running.push(package.name.clone());
        }
    }

    ReplaySummary {
        frames,
        events: replayer.sequence,
        elapsed: session.now(),
        completed,
        running,
        failure: session.failure().map(str::to_string),
    }
}
