use std::collections::HashSet;

use firedrill_events::{ContactEvent, ContactPhase, KeyCode};
use tracing::{debug, trace};

use crate::catalog::{PackageCatalog, PackageId, Trigger, TriggerMode};

/// Decides which packages an external event fires
///
/// The dispatcher only selects; the caller hands every selected id to the
/// scheduler, in the returned order.
#[derive(Debug, Default)]
pub struct TriggerDispatcher {
    held_keys: HashSet<KeyCode>,
    session_started: bool,
}

impl TriggerDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_started(&self) -> bool {
        self.session_started
    }

    /// Packages to fire when the session starts
    ///
    /// Only the first call selects anything.
    pub fn session_start(&mut self, catalog: &PackageCatalog) -> Vec<PackageId> {
        if self.session_started {
            return Vec::new();
        }
        self.session_started = true;

        let ids: Vec<_> = catalog
            .enabled_with_mode(TriggerMode::OnSessionStart)
            .map(|(id, _)| id)
            .collect();
        debug!(target: "dispatch", "Session start selects {} package(s)", ids.len());
        ids
    }

    /// Packages whose key went from released to held since the last poll
    pub fn key_poll(&mut self, catalog: &PackageCatalog, active_keys: &[KeyCode]) -> Vec<PackageId> {
        let held: HashSet<KeyCode> = active_keys
            .iter()
            .copied()
            .filter(|k| !k.is_null())
            .collect();

        let ids: Vec<_> = catalog
            .enabled_with_mode(TriggerMode::KeyPoll)
            .filter_map(|(id, package)| match &package.trigger {
                Trigger::KeyPoll { key } if held.contains(key) && !self.held_keys.contains(key) => {
                    trace!(target: "dispatch", "Key {} pressed for {}", key, package.name);
                    Some(id)
                }
                _ => None,
            })
            .collect();

        self.held_keys = held;
        ids
    }

    /// Packages whose physics filter accepts a contact on the controller body
    ///
    /// Exit phases and contacts addressed to other receivers select nothing.
    pub fn contact(&self, catalog: &PackageCatalog, contact: &ContactEvent) -> Vec<PackageId> {
        if contact.phase != ContactPhase::Enter || contact.receiver.is_some() {
            return Vec::new();
        }

        let mode = TriggerMode::from(contact.kind);
        let ids: Vec<_> = catalog
            .enabled_with_mode(mode)
            .filter(|(_, package)| {
                package
                    .trigger
                    .filter()
                    .is_some_and(|filter| filter.matches(&contact.other))
            })
            .map(|(id, _)| id)
            .collect();

        trace!(target: "dispatch",
            "{:?} contact with {:?} selects {} package(s)",
            contact.kind,
            contact.other.entity(),
            ids.len()
        );
        ids
    }
}
