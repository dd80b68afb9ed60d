//! Package sequencing engine for the fire-extinguisher training session
//!
//! Packages are named bundles of timed scene actions. The host feeds a
//! [`Session`] with frames, key state and physics contacts; the session
//! decides which packages fire and drives each one through its lifecycle.
//! Scene side effects go through the [`Actuators`] trait.

pub mod actuator;
pub mod catalog;
pub mod config;
pub mod countdown;
pub mod dialogue;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod filter;
pub mod fire_zone;
pub mod hooks;
pub mod revert;
pub mod scheduler;
pub mod session;
pub mod timeline;

// Re-export commonly used types for hosts
pub use actuator::{Actuators, SceneState};
pub use catalog::{
    ActionSet, ColliderActions, ObjectActions, Package, PackageCatalog, PackageId, SoundAction,
    Trigger, TriggerMode,
};
pub use config::{ScenarioConfig, SessionSettings};
pub use countdown::{AlarmCountdown, CountdownSettings};
pub use dialogue::{DialogueSettings, DialogueStep, StepDialogue};
pub use dispatcher::TriggerDispatcher;
pub use error::ConfigError;
pub use executor::ActionExecutor;
pub use filter::{LayerMask, TriggerFilter};
pub use fire_zone::{FireZone, FireZoneSettings};
pub use hooks::{HookBinding, HookCommand, HookContext, HookPoint, HookRegistry, SessionCommand};
pub use revert::{RevertScheduler, RevertTiming};
pub use scheduler::{PackageScheduler, Phase};
pub use session::Session;
pub use timeline::{TimerId, Timeline};
