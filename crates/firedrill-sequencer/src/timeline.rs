use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Shortest interval a recurring timer may use
const MIN_RECURRING_INTERVAL: Duration = Duration::from_millis(1);

/// Convert configured seconds into a duration
///
/// Negative or non-finite values collapse to zero; scenario validation
/// rejects them before they reach the engine.
pub fn seconds(value: f32) -> Duration {
    Duration::try_from_secs_f32(value).unwrap_or(Duration::ZERO)
}

/// Unique identifier for a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Type of timer
#[derive(Debug, Clone)]
enum TimerType {
    /// One-shot timer that fires once and is removed
    OneShot,
    /// Recurring timer that fires repeatedly at an interval
    Recurring { interval: Duration },
}

#[derive(Debug, Clone)]
struct Timer<T> {
    payload: T,
    timer_type: TimerType,
}

/// A timer that came due
#[derive(Debug, Clone, PartialEq)]
pub struct Fired<T> {
    pub id: TimerId,
    /// Logical time the timer was due at
    pub at: Duration,
    pub payload: T,
}

/// Virtual session clock with timers
///
/// Time only moves when the owner advances it. Timers are ordered by due
/// time and then by creation order, so two timers due at the same instant
/// always fire in the order they were scheduled.
#[derive(Debug)]
pub struct Timeline<T> {
    now: Duration,
    queue: BTreeMap<(Duration, TimerId), Timer<T>>,
    due_at: HashMap<TimerId, Duration>,
    deferred: Vec<T>,
    next_id: u64,
}

impl<T: Clone> Timeline<T> {
    /// Create a timeline starting at zero
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            queue: BTreeMap::new(),
            due_at: HashMap::new(),
            deferred: Vec::new(),
            next_id: 0,
        }
    }

    /// Current logical time
    pub fn now(&self) -> Duration {
        self.now
    }

    fn allocate_id(&mut self) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert(&mut self, id: TimerId, fire_at: Duration, timer: Timer<T>) {
        self.queue.insert((fire_at, id), timer);
        self.due_at.insert(id, fire_at);
    }

    /// Schedule a one-shot timer that fires after a delay
    pub fn schedule_timer(&mut self, delay: Duration, payload: T) -> TimerId {
        let id = self.allocate_id();
        let fire_at = self.now + delay;
        self.insert(
            id,
            fire_at,
            Timer {
                payload,
                timer_type: TimerType::OneShot,
            },
        );
        id
    }

    /// Schedule a recurring timer that fires repeatedly at an interval
    pub fn schedule_recurring(&mut self, interval: Duration, payload: T) -> TimerId {
        let interval = interval.max(MIN_RECURRING_INTERVAL);
        let id = self.allocate_id();
        let fire_at = self.now + interval;
        self.insert(
            id,
            fire_at,
            Timer {
                payload,
                timer_type: TimerType::Recurring { interval },
            },
        );
        id
    }

    /// Cancel a timer
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        match self.due_at.remove(&id) {
            Some(fire_at) => self.queue.remove(&(fire_at, id)).is_some(),
            None => false,
        }
    }

    /// Queue a payload for the start of the next advance
    pub fn defer_to_next_tick(&mut self, payload: T) {
        self.deferred.push(payload);
    }

    /// Drain payloads queued with [`Timeline::defer_to_next_tick`]
    pub fn take_deferred(&mut self) -> Vec<T> {
        std::mem::take(&mut self.deferred)
    }

    /// Pop the earliest timer due at or before `until`
    ///
    /// The clock moves to the timer's due time, so anything scheduled while
    /// handling it is measured from that instant rather than from `until`.
    pub fn pop_due(&mut self, until: Duration) -> Option<Fired<T>> {
        let (&(fire_at, id), _) = self.queue.iter().next()?;
        if fire_at > until {
            return None;
        }

        let timer = self.queue.remove(&(fire_at, id))?;
        self.now = self.now.max(fire_at);

        match &timer.timer_type {
            TimerType::OneShot => {
                self.due_at.remove(&id);
            }
            TimerType::Recurring { interval } => {
                self.insert(id, fire_at + *interval, timer.clone());
            }
        }

        Some(Fired {
            id,
            at: fire_at,
            payload: timer.payload,
        })
    }

    /// Move the clock forward to `until` once all due timers are handled
    pub fn settle(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }

    /// Advance by `elapsed` and return every timer that fired, in order
    ///
    /// Suitable when handling a timer never schedules new ones; owners that
    /// chain timers should drive [`Timeline::pop_due`] themselves.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<Fired<T>> {
        let target = self.now + elapsed;
        let mut fired = Vec::new();
        while let Some(f) = self.pop_due(target) {
            fired.push(f);
        }
        self.settle(target);
        fired
    }

    /// Get the number of active timers
    pub fn active_count(&self) -> usize {
        self.due_at.len()
    }

    /// Due time of the earliest pending timer
    pub fn next_due(&self) -> Option<Duration> {
        self.queue.keys().next().map(|(at, _)| *at)
    }
}

impl<T: Clone> Default for Timeline<T> {
    fn default() -> Self {
        Self::new()
    }
}
