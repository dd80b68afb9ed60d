use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::actuator::Actuators;
use crate::catalog::ActionSet;
use crate::executor::ActionExecutor;
use crate::timeline::seconds;

/// How the object and collider revert timers relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertTiming {
    /// Both timers start when the actions are applied
    #[default]
    Concurrent,
    /// The collider timer starts only after the object revert happened
    Sequential,
}

/// Action group that can be reverted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertGroup {
    Objects,
    Colliders,
}

/// One pending revert: wait `wait` after the previous step, then undo `group`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevertStep {
    pub wait: Duration,
    pub group: RevertGroup,
}

/// Builds revert plans and applies revert steps
#[derive(Debug, Clone, Copy, Default)]
pub struct RevertScheduler {
    timing: RevertTiming,
}

impl RevertScheduler {
    pub fn new(timing: RevertTiming) -> Self {
        Self { timing }
    }

    pub fn timing(&self) -> RevertTiming {
        self.timing
    }

    /// Steps to run after an execution, each wait relative to the previous step
    ///
    /// Only groups flagged for auto-revert with a positive duration take part.
    /// Objects come before colliders when both are due at the same time.
    pub fn plan(&self, actions: &ActionSet) -> VecDeque<RevertStep> {
        let mut groups = Vec::with_capacity(2);

        let objects = &actions.objects;
        if objects.auto_revert && objects.duration_seconds > 0.0 {
            groups.push((seconds(objects.duration_seconds), RevertGroup::Objects));
        }

        let colliders = &actions.colliders;
        if colliders.auto_revert && colliders.duration_seconds > 0.0 {
            groups.push((seconds(colliders.duration_seconds), RevertGroup::Colliders));
        }

        match self.timing {
            RevertTiming::Sequential => groups
                .into_iter()
                .map(|(wait, group)| RevertStep { wait, group })
                .collect(),
            RevertTiming::Concurrent => {
                // Stable sort keeps objects ahead of colliders on ties
                groups.sort_by_key(|(offset, _)| *offset);
                let mut elapsed = Duration::ZERO;
                groups
                    .into_iter()
                    .map(|(offset, group)| {
                        let wait = offset - elapsed;
                        elapsed = offset;
                        RevertStep { wait, group }
                    })
                    .collect()
            }
        }
    }

    /// Undo one group through the executor
    pub fn apply(
        &self,
        group: RevertGroup,
        actions: &ActionSet,
        executor: &ActionExecutor,
        scene: &mut dyn Actuators,
    ) {
        match group {
            RevertGroup::Objects => executor.revert_objects(&actions.objects, scene),
            RevertGroup::Colliders => executor.revert_colliders(&actions.colliders, scene),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColliderActions, ObjectActions};

    fn actions(objects: Option<f32>, colliders: Option<f32>) -> ActionSet {
        ActionSet {
            objects: ObjectActions {
                auto_revert: objects.is_some(),
                duration_seconds: objects.unwrap_or(0.0),
                ..ObjectActions::default()
            },
            colliders: ColliderActions {
                auto_revert: colliders.is_some(),
                duration_seconds: colliders.unwrap_or(0.0),
                ..ColliderActions::default()
            },
            ..ActionSet::default()
        }
    }

    fn step(wait_ms: u64, group: RevertGroup) -> RevertStep {
        RevertStep {
            wait: Duration::from_millis(wait_ms),
            group,
        }
    }

    #[test]
    fn test_nothing_to_revert() {
        let scheduler = RevertScheduler::default();
        assert!(scheduler.plan(&actions(None, None)).is_empty());
        // Zero duration means no revert even when flagged
        assert!(scheduler.plan(&actions(Some(0.0), Some(0.0))).is_empty());
    }

    #[test]
    fn test_concurrent_measures_from_execution() {
        let plan = RevertScheduler::new(RevertTiming::Concurrent).plan(&actions(Some(3.0), Some(1.0)));
        assert_eq!(
            Vec::from(plan),
            vec![step(1000, RevertGroup::Colliders), step(2000, RevertGroup::Objects)]
        );
    }

    #[test]
    fn test_concurrent_tie_reverts_objects_first() {
        let plan = RevertScheduler::new(RevertTiming::Concurrent).plan(&actions(Some(2.0), Some(2.0)));
        assert_eq!(
            Vec::from(plan),
            vec![step(2000, RevertGroup::Objects), step(0, RevertGroup::Colliders)]
        );
    }

    #[test]
    fn test_sequential_chains_waits() {
        let plan = RevertScheduler::new(RevertTiming::Sequential).plan(&actions(Some(3.0), Some(1.0)));
        assert_eq!(
            Vec::from(plan),
            vec![step(3000, RevertGroup::Objects), step(1000, RevertGroup::Colliders)]
        );
    }
}
