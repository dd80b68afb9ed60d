use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace};

use crate::actuator::Actuators;
use crate::catalog::{Package, PackageCatalog, PackageId};
use crate::executor::ActionExecutor;
use crate::hooks::{HookPoint, HookRegistry};
use crate::revert::{RevertScheduler, RevertStep};
use crate::timeline::{TimerId, Timeline};

/// Opaque handle of one lifecycle task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionHandle(u64);

/// Where a running lifecycle task currently waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Started hooks ran; waiting for the current dispatch pass to finish
    Started,
    /// Waiting out `delay_seconds`
    Delaying,
    /// Waiting for the next auto-revert step
    RevertPending,
    /// Repeat cycle without any wait; resumes on the next tick
    AwaitingNextCycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WakeStep {
    Begin,
    Execute,
    Revert,
    NextCycle,
}

/// A point where a suspended lifecycle task resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wake {
    package: PackageId,
    handle: ExecutionHandle,
    step: WakeStep,
}

#[derive(Debug)]
struct Execution {
    handle: ExecutionHandle,
    cycle: u32,
    phase: Phase,
    timer: Option<TimerId>,
    reverts: VecDeque<RevertStep>,
    /// Whether the current cycle waited on the timeline at all
    suspended: bool,
}

/// Everything a lifecycle step may touch outside the scheduler
pub struct LifecycleEnv<'a> {
    pub scene: &'a mut dyn Actuators,
    pub hooks: &'a mut HookRegistry,
}

/// Owns the runtime state of every package and drives their lifecycles
///
/// A lifecycle runs `Started → Delaying → Executing → (RevertPending →)?
/// Completed`, then either loops back to `Delaying` (repeat) or finishes.
/// Only one lifecycle per package may be in flight.
pub struct PackageScheduler {
    catalog: Arc<PackageCatalog>,
    running: HashMap<PackageId, Execution>,
    completed: HashSet<PackageId>,
    ready: VecDeque<Wake>,
    timeline: Timeline<Wake>,
    executor: ActionExecutor,
    reverts: RevertScheduler,
    next_handle: u64,
}

impl PackageScheduler {
    pub fn new(catalog: PackageCatalog, executor: ActionExecutor, reverts: RevertScheduler) -> Self {
        Self {
            catalog: Arc::new(catalog),
            running: HashMap::new(),
            completed: HashSet::new(),
            ready: VecDeque::new(),
            timeline: Timeline::new(),
            executor,
            reverts,
            next_handle: 0,
        }
    }

    pub fn catalog(&self) -> &PackageCatalog {
        &self.catalog
    }

    /// Current logical session time
    pub fn now(&self) -> Duration {
        self.timeline.now()
    }

    pub fn is_running(&self, id: PackageId) -> bool {
        self.running.contains_key(&id)
    }

    /// Whether the package's actions were applied at least once
    pub fn has_completed(&self, id: PackageId) -> bool {
        self.completed.contains(&id)
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn phase(&self, id: PackageId) -> Option<Phase> {
        self.running.get(&id).map(|e| e.phase)
    }

    /// Current 1-based cycle of a running package
    pub fn cycle(&self, id: PackageId) -> Option<u32> {
        self.running.get(&id).map(|e| e.cycle)
    }

    /// Start a lifecycle task for a package
    ///
    /// Silently ignored for unknown or disabled packages, run-once packages
    /// that already ran, and packages that are already running. The started
    /// hooks run immediately; the rest of the first cycle waits in the ready
    /// queue until [`PackageScheduler::pop_ready`] hands it out.
    pub fn trigger(&mut self, id: PackageId, hooks: &mut HookRegistry) -> bool {
        let Some(package) = self.catalog.get(id) else {
            trace!(target: "scheduler", "Ignoring trigger for unknown package {}", id);
            return false;
        };

        if !package.enabled {
            trace!(target: "scheduler", "Ignoring trigger for disabled package {}", package.name);
            return false;
        }

        if package.run_once && self.completed.contains(&id) {
            trace!(target: "scheduler", "Package {} already ran once", package.name);
            return false;
        }

        if self.running.contains_key(&id) {
            trace!(target: "scheduler", "Package {} is already running", package.name);
            return false;
        }

        let handle = ExecutionHandle(self.next_handle);
        self.next_handle += 1;

        self.running.insert(
            id,
            Execution {
                handle,
                cycle: 1,
                phase: Phase::Started,
                timer: None,
                reverts: VecDeque::new(),
                suspended: false,
            },
        );
        self.ready.push_back(Wake {
            package: id,
            handle,
            step: WakeStep::Begin,
        });

        debug!(target: "scheduler", "Started package {} {}", package.name, id);
        hooks.invoke(id, &package.name, HookPoint::Started, 1, self.timeline.now());
        true
    }

    /// Trigger the first package with this exact name
    pub fn trigger_named(&mut self, name: &str, hooks: &mut HookRegistry) -> bool {
        match self.catalog.find_by_name(name) {
            Some(id) => self.trigger(id, hooks),
            None => {
                trace!(target: "scheduler", "No package named '{}'", name);
                false
            }
        }
    }

    /// Cancel a package's lifecycle task
    ///
    /// Pending delays and reverts are dropped; no further hooks run.
    pub fn stop(&mut self, id: PackageId) -> bool {
        let Some(execution) = self.running.remove(&id) else {
            return false;
        };

        if let Some(timer) = execution.timer {
            self.timeline.cancel_timer(timer);
        }

        let name = self.catalog.get(id).map_or("?", |p| p.name.as_str());
        info!(target: "scheduler", "Stopped package {} {} during {:?}", name, id, execution.phase);
        true
    }

    /// Cancel every running lifecycle task
    pub fn stop_all(&mut self) -> usize {
        let mut ids: Vec<_> = self.running.keys().copied().collect();
        ids.sort();
        ids.into_iter().filter(|id| self.stop(*id)).count()
    }

    /// Next task waiting to begin its first cycle
    pub fn pop_ready(&mut self) -> Option<Wake> {
        self.ready.pop_front()
    }

    /// Tasks parked for this tick by zero-length repeat cycles
    pub fn take_deferred(&mut self) -> Vec<Wake> {
        self.timeline.take_deferred()
    }

    /// Earliest task whose wait ends at or before `until`
    pub fn pop_due(&mut self, until: Duration) -> Option<Wake> {
        self.timeline.pop_due(until).map(|fired| fired.payload)
    }

    /// Move the clock to `until` after all due tasks resumed
    pub fn settle(&mut self, until: Duration) {
        self.timeline.settle(until);
    }

    /// Resume parked and ready tasks, then advance the clock by `elapsed`
    ///
    /// Hook commands are not applied in between; the session does that.
    pub fn advance(&mut self, elapsed: Duration, env: &mut LifecycleEnv<'_>) {
        for wake in self.take_deferred() {
            self.resume(wake, env);
        }
        while let Some(wake) = self.pop_ready() {
            self.resume(wake, env);
        }

        let target = self.timeline.now() + elapsed;
        while let Some(wake) = self.pop_due(target) {
            self.resume(wake, env);
        }
        self.settle(target);
    }

    /// Continue a suspended lifecycle task
    pub fn resume(&mut self, wake: Wake, env: &mut LifecycleEnv<'_>) {
        let Some(execution) = self.running.get_mut(&wake.package) else {
            trace!(target: "scheduler", "Dropping wake for stopped package {}", wake.package);
            return;
        };
        if execution.handle != wake.handle {
            trace!(target: "scheduler", "Dropping stale wake for package {}", wake.package);
            return;
        }
        execution.timer = None;

        let catalog = Arc::clone(&self.catalog);
        let Some(package) = catalog.get(wake.package) else {
            return;
        };

        match wake.step {
            WakeStep::Begin | WakeStep::NextCycle => self.begin_cycle(wake.package, package, env),
            WakeStep::Execute => self.execute(wake.package, package, env),
            WakeStep::Revert => {
                let step = self
                    .running
                    .get_mut(&wake.package)
                    .and_then(|e| e.reverts.pop_front());
                if let Some(step) = step {
                    self.reverts
                        .apply(step.group, &package.actions, &self.executor, env.scene);
                    trace!(target: "scheduler", "Reverted {:?} of {}", step.group, package.name);
                }
                self.continue_reverts(wake.package, package, env);
            }
        }
    }

    fn begin_cycle(&mut self, id: PackageId, package: &Package, env: &mut LifecycleEnv<'_>) {
        let Some(execution) = self.running.get_mut(&id) else {
            return;
        };
        execution.suspended = false;

        let delay = package.delay();
        if delay > Duration::ZERO {
            execution.phase = Phase::Delaying;
            execution.suspended = true;
            execution.timer = Some(self.timeline.schedule_timer(
                delay,
                Wake {
                    package: id,
                    handle: execution.handle,
                    step: WakeStep::Execute,
                },
            ));
            trace!(target: "scheduler", "Package {} waiting {:?}", package.name, delay);
            return;
        }

        self.execute(id, package, env);
    }

    fn execute(&mut self, id: PackageId, package: &Package, env: &mut LifecycleEnv<'_>) {
        let Some(cycle) = self.running.get(&id).map(|e| e.cycle) else {
            return;
        };

        let report = self.executor.apply(&package.actions, env.scene);
        let first = self.completed.insert(id);
        debug!(target: "scheduler",
            "Executed package {} (cycle {}, {} applied{})",
            package.name,
            cycle,
            report.applied,
            if first { ", first run" } else { "" }
        );

        env.hooks
            .invoke(id, &package.name, HookPoint::Executed, cycle, self.timeline.now());

        let plan = self.reverts.plan(&package.actions);
        if let Some(execution) = self.running.get_mut(&id) {
            execution.reverts = plan;
        }
        self.continue_reverts(id, package, env);
    }

    fn continue_reverts(&mut self, id: PackageId, package: &Package, env: &mut LifecycleEnv<'_>) {
        loop {
            let Some(execution) = self.running.get_mut(&id) else {
                return;
            };
            let Some(step) = execution.reverts.front().copied() else {
                break;
            };

            if step.wait > Duration::ZERO {
                execution.phase = Phase::RevertPending;
                execution.suspended = true;
                execution.timer = Some(self.timeline.schedule_timer(
                    step.wait,
                    Wake {
                        package: id,
                        handle: execution.handle,
                        step: WakeStep::Revert,
                    },
                ));
                return;
            }

            execution.reverts.pop_front();
            self.reverts
                .apply(step.group, &package.actions, &self.executor, env.scene);
        }

        self.complete_cycle(id, package, env);
    }

    fn complete_cycle(&mut self, id: PackageId, package: &Package, env: &mut LifecycleEnv<'_>) {
        let Some(cycle) = self.running.get(&id).map(|e| e.cycle) else {
            return;
        };

        env.hooks
            .invoke(id, &package.name, HookPoint::Completed, cycle, self.timeline.now());

        // run_once wins over repeat: the actions may only ever apply once
        if !package.repeat || package.run_once {
            self.running.remove(&id);
            debug!(target: "scheduler", "Finished package {} {}", package.name, id);
            return;
        }

        let Some(execution) = self.running.get_mut(&id) else {
            return;
        };
        execution.cycle += 1;

        if execution.suspended {
            self.begin_cycle(id, package, env);
        } else {
            execution.phase = Phase::AwaitingNextCycle;
            let wake = Wake {
                package: id,
                handle: execution.handle,
                step: WakeStep::NextCycle,
            };
            self.timeline.defer_to_next_tick(wake);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::SceneState;
    use crate::catalog::{ObjectActions, Package};
    use crate::revert::RevertTiming;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    struct Harness {
        scheduler: PackageScheduler,
        scene: SceneState,
        hooks: HookRegistry,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Harness {
        fn new(packages: Vec<Package>) -> Self {
            let (tx, _rx) = mpsc::unbounded_channel();
            let mut hooks = HookRegistry::new(tx);
            let log = Arc::new(Mutex::new(Vec::new()));

            for index in 0..packages.len() {
                for point in [HookPoint::Started, HookPoint::Executed, HookPoint::Completed] {
                    let log = Arc::clone(&log);
                    hooks.register(PackageId(index), point, move |ctx| {
                        log.lock()
                            .unwrap()
                            .push(format!("{}.{:?}", ctx.name, ctx.point).to_lowercase());
                    });
                }
            }

            let catalog = PackageCatalog::new(packages).unwrap();
            Self {
                scheduler: PackageScheduler::new(
                    catalog,
                    ActionExecutor::new(Some(0)),
                    RevertScheduler::new(RevertTiming::Concurrent),
                ),
                scene: SceneState::new().with_entity("X", false),
                hooks,
                log,
            }
        }

        fn trigger(&mut self, index: usize) -> bool {
            let started = self.scheduler.trigger(PackageId(index), &mut self.hooks);
            self.advance(0);
            started
        }

        fn advance(&mut self, ms: u64) {
            let mut env = LifecycleEnv {
                scene: &mut self.scene,
                hooks: &mut self.hooks,
            };
            self.scheduler.advance(Duration::from_millis(ms), &mut env);
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn count(&self, entry: &str) -> usize {
            self.log().iter().filter(|e| *e == entry).count()
        }
    }

    fn turn_on_x() -> ObjectActions {
        ObjectActions {
            turn_on: vec!["X".into()],
            ..ObjectActions::default()
        }
    }

    #[test]
    fn test_zero_delay_runs_full_cycle() {
        let mut h = Harness::new(vec![Package::new("p").with_objects(turn_on_x())]);

        assert!(h.trigger(0));
        assert_eq!(h.scene.is_active("X"), Some(true));
        assert!(h.scheduler.has_completed(PackageId(0)));
        assert!(!h.scheduler.is_running(PackageId(0)));
        assert_eq!(h.log(), vec!["p.started", "p.executed", "p.completed"]);
    }

    #[test]
    fn test_delay_suspends_until_elapsed() {
        let mut h = Harness::new(vec![Package::new("p").with_delay(1.0).with_objects(turn_on_x())]);

        h.trigger(0);
        assert_eq!(h.scheduler.phase(PackageId(0)), Some(Phase::Delaying));
        h.advance(999);
        assert_eq!(h.scene.is_active("X"), Some(false));
        h.advance(1);
        assert_eq!(h.scene.is_active("X"), Some(true));
        assert!(!h.scheduler.is_running(PackageId(0)));
    }

    #[test]
    fn test_run_once_ignores_second_trigger() {
        let mut h = Harness::new(vec![Package::new("p").with_objects(turn_on_x())]);

        assert!(h.trigger(0));
        h.scene.set_active("X", false);
        assert!(!h.trigger(0));

        assert_eq!(h.count("p.executed"), 1);
        assert_eq!(h.scene.is_active("X"), Some(false));
    }

    #[test]
    fn test_trigger_while_running_is_ignored() {
        let mut h = Harness::new(vec![Package::new("p").run_once(false).with_delay(2.0)]);

        assert!(h.trigger(0));
        h.advance(500);
        assert!(!h.trigger(0));
        h.advance(1500);

        assert_eq!(h.count("p.started"), 1);
        assert_eq!(h.count("p.executed"), 1);

        // Once finished, a non-run-once package can go again
        assert!(h.trigger(0));
    }

    #[test]
    fn test_stop_during_revert_leaves_actions_applied() {
        let objects = ObjectActions {
            auto_revert: true,
            duration_seconds: 2.0,
            ..turn_on_x()
        };
        let mut h = Harness::new(vec![Package::new("p").with_objects(objects)]);

        h.trigger(0);
        assert_eq!(h.scheduler.phase(PackageId(0)), Some(Phase::RevertPending));
        assert!(h.scheduler.stop(PackageId(0)));
        h.advance(5000);

        assert_eq!(h.scene.is_active("X"), Some(true));
        assert_eq!(h.count("p.completed"), 0);
        assert_eq!(h.scheduler.running_count(), 0);
    }

    #[test]
    fn test_repeat_cycles_until_stopped() {
        let mut h = Harness::new(vec![Package::new("p").with_delay(1.0).repeating()]);

        h.trigger(0);
        h.advance(3500);
        assert_eq!(h.count("p.executed"), 3);
        assert_eq!(h.scheduler.cycle(PackageId(0)), Some(4));

        h.scheduler.stop(PackageId(0));
        let before = h.log().len();
        h.advance(10_000);
        assert_eq!(h.log().len(), before);
    }

    #[test]
    fn test_zero_length_repeat_runs_once_per_tick() {
        let mut h = Harness::new(vec![Package::new("p").repeating()]);

        h.trigger(0);
        assert_eq!(h.count("p.executed"), 1);
        assert_eq!(h.scheduler.phase(PackageId(0)), Some(Phase::AwaitingNextCycle));

        h.advance(16);
        h.advance(16);
        assert_eq!(h.count("p.executed"), 3);
        assert_eq!(h.count("p.started"), 1);
    }

    #[test]
    fn test_run_once_wins_over_repeat() {
        let mut h = Harness::new(vec![Package::new("p").with_delay(1.0).repeating().run_once(true)]);

        h.trigger(0);
        h.advance(5000);
        assert_eq!(h.count("p.executed"), 1);
        assert!(!h.scheduler.is_running(PackageId(0)));
    }

    #[test]
    fn test_disabled_and_unknown_are_ignored() {
        let mut h = Harness::new(vec![Package::new("p").disabled()]);

        assert!(!h.trigger(0));
        assert!(!h.trigger(7));
        assert!(!h.scheduler.trigger_named("nope", &mut h.hooks));
        assert!(h.log().is_empty());
    }

    #[test]
    fn test_stop_all_cancels_everything() {
        let mut h = Harness::new(vec![
            Package::new("a").with_delay(1.0),
            Package::new("b").with_delay(2.0),
        ]);

        h.trigger(0);
        h.trigger(1);
        assert_eq!(h.scheduler.stop_all(), 2);
        h.advance(5000);

        assert_eq!(h.count("a.executed") + h.count("b.executed"), 0);
        assert!(!h.scheduler.stop(PackageId(0)));
    }
}
