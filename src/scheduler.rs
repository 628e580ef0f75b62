//! Cooperative scheduler.
//!
//! One thread, no preemption. A task runs exactly one step at a time; the
//! next step happens only after the scheduler re-enters its loop. The
//! scheduler owns four structures:
//!
//! 1. a **delay queue** — min-heap of `(deadline, task)`, popped in
//!    deadline order with ties broken by insertion order;
//! 2. a **rate-paced bag** — tasks waiting for a rate-limited slot,
//!    released one at a time, picked uniformly at random, each release
//!    debiting one hit from the budget;
//! 3. a **lock table** — interned tokens acquired all-or-nothing when a
//!    task launches, held across its yields, released when it finishes;
//!    blocked tasks wait in FIFO order and the first feasible one runs;
//! 4. the **pending-spawn queue** on the context, drained after every
//!    step, so tasks can launch other tasks without seeing the scheduler.
//!
//! Random release from the bag is deliberate: when many related tasks
//! queue together, first-in/first-out would starve the late arrivals of
//! fresh data, so everything gets an equal chance instead. Callers must
//! not rely on any order there.

pub mod task;

use crate::clock::Clock;
use crate::runtime::CoreContext;
use crate::scheduler::task::{LockToken, Step, Task, TaskId};
use hashbrown::{HashMap, HashSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slab::Slab;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

/// Delay applied when a step ends in [`Step::Error`].
pub const RETRY_BACKOFF: Duration = Duration::from_secs(20);

struct TaskEntry {
    task: Box<dyn Task>,
    locks: Vec<LockToken>,
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct DelayEntry {
    deadline: Duration,
    seq: u64,
    id: TaskId,
}

pub struct Scheduler {
    clock: Rc<dyn Clock>,
    tasks: Slab<TaskEntry>,
    delay: BinaryHeap<Reverse<DelayEntry>>,
    delay_seq: u64,
    rate_bag: Vec<TaskId>,
    rate_deadline: Option<Duration>,
    interned: HashMap<String, LockToken>,
    granted: HashSet<LockToken>,
    waiters: VecDeque<TaskId>,
    rng: StdRng,
    quitting: bool,
}

impl Scheduler {
    /// `seed` fixes the rate-paced pick order; `None` seeds from the OS.
    pub fn new(clock: Rc<dyn Clock>, seed: Option<u64>) -> Self {
        Self {
            clock,
            tasks: Slab::new(),
            delay: BinaryHeap::new(),
            delay_seq: 0,
            rate_bag: Vec::new(),
            rate_deadline: None,
            interned: HashMap::new(),
            granted: HashSet::new(),
            waiters: VecDeque::new(),
            rng: seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64),
            quitting: false,
        }
    }

    /// Intern a lock name. The same name always yields the same token.
    pub fn lock_token(&mut self, name: &str) -> LockToken {
        if let Some(&token) = self.interned.get(name) {
            return token;
        }
        let token = LockToken(self.interned.len() as u32);
        self.interned.insert(name.to_owned(), token);
        token
    }

    /// Launch a task. Its whole lock set is acquired atomically; if any
    /// lock is held the task joins the FIFO wait queue, otherwise its
    /// first step runs right away.
    pub fn spawn(&mut self, task: Box<dyn Task>, locks: Vec<LockToken>, cx: &mut CoreContext) {
        if self.quitting {
            return;
        }
        log::debug!("spawning task '{}'", task.name());
        let id = TaskId(self.tasks.insert(TaskEntry { task, locks }));
        let wanted = self.tasks[id.0].locks.clone();
        if self.try_acquire(&wanted) {
            self.advance(id, cx);
        } else {
            self.waiters.push_back(id);
        }
    }

    /// Run one step of `id` and dispatch its yield.
    pub fn advance(&mut self, id: TaskId, cx: &mut CoreContext) {
        if self.quitting {
            return;
        }
        let step = match self.tasks.get_mut(id.0) {
            Some(entry) => entry.task.step(cx),
            None => return,
        };
        match step {
            Step::Done => {
                if let Some(entry) = self.tasks.try_remove(id.0) {
                    log::debug!("task '{}' finished", entry.task.name());
                    self.release_locks(&entry.locks, cx);
                }
            }
            Step::RunSoon => self.push_delay(Duration::ZERO, id),
            Step::After(delta) => self.push_delay(delta, id),
            Step::RatePaced => {
                self.rate_bag.push(id);
                if self.rate_deadline.is_none() {
                    self.rate_deadline = Some(self.clock.now() + cx.budget.rate_delta());
                }
            }
            Step::Error(error) => {
                let name = self
                    .tasks
                    .get(id.0)
                    .map_or("task", |entry| entry.task.name());
                log::warn!("task '{name}' failed: {error}; retrying in {RETRY_BACKOFF:?}");
                self.push_delay(RETRY_BACKOFF, id);
            }
        }
        self.drain_spawns(cx);
    }

    /// Earliest instant at which [`run_due`](Self::run_due) has work.
    pub fn next_wakeup(&self) -> Option<Duration> {
        if self.quitting {
            return None;
        }
        let head = self.delay.peek().map(|Reverse(entry)| entry.deadline);
        match (head, self.rate_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Advance everything whose deadline has passed.
    ///
    /// Delayed tasks go first, in deadline order; then at most the due
    /// rate-paced releases. Loops until nothing else is due at the current
    /// clock reading.
    pub fn run_due(&mut self, cx: &mut CoreContext) {
        // Work queued from outside a task step (an embedder reporting an
        // error, say) gets launched here.
        self.drain_spawns(cx);
        loop {
            if self.quitting {
                return;
            }
            let now = self.clock.now();
            let delay_due = self
                .delay
                .peek()
                .is_some_and(|Reverse(entry)| entry.deadline <= now);
            if delay_due {
                let Reverse(entry) = self.delay.pop().expect("peeked entry is present");
                self.advance(entry.id, cx);
                continue;
            }
            if self.rate_deadline.is_some_and(|deadline| deadline <= now) {
                self.fire_rate_paced(cx);
                continue;
            }
            break;
        }
    }

    /// Stop everything: drop queued work, forget tasks, release locks.
    /// No further timers are armed and later spawns are ignored.
    pub fn quit(&mut self) {
        if self.quitting {
            return;
        }
        log::debug!("scheduler quitting, dropping {} live tasks", self.tasks.len());
        self.quitting = true;
        self.delay.clear();
        self.rate_bag.clear();
        self.rate_deadline = None;
        self.waiters.clear();
        self.granted.clear();
        self.tasks.clear();
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting
    }

    /// Live tasks, including blocked and queued ones.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    fn push_delay(&mut self, delta: Duration, id: TaskId) {
        self.delay_seq += 1;
        self.delay.push(Reverse(DelayEntry {
            deadline: self.clock.now() + delta,
            seq: self.delay_seq,
            id,
        }));
    }

    fn try_acquire(&mut self, locks: &[LockToken]) -> bool {
        if locks.iter().any(|lock| self.granted.contains(lock)) {
            return false;
        }
        for lock in locks {
            self.granted.insert(*lock);
        }
        true
    }

    fn release_locks(&mut self, locks: &[LockToken], cx: &mut CoreContext) {
        for lock in locks {
            self.granted.remove(lock);
        }
        // In-order scan; the first waiter whose whole lock set is free runs.
        let mut ready = None;
        for (position, id) in self.waiters.iter().enumerate() {
            let Some(entry) = self.tasks.get(id.0) else {
                continue;
            };
            if entry.locks.iter().all(|lock| !self.granted.contains(lock)) {
                ready = Some((position, *id));
                break;
            }
        }
        if let Some((position, id)) = ready {
            self.waiters.remove(position);
            let wanted = self.tasks[id.0].locks.clone();
            for lock in wanted {
                self.granted.insert(lock);
            }
            self.advance(id, cx);
        }
    }

    fn fire_rate_paced(&mut self, cx: &mut CoreContext) {
        self.rate_deadline = None;
        if self.rate_bag.is_empty() {
            return;
        }
        let pick = self.rng.random_range(0..self.rate_bag.len());
        let id = self.rate_bag.swap_remove(pick);
        self.advance(id, cx);
        cx.budget.note_paced_release();
        if !self.rate_bag.is_empty() && self.rate_deadline.is_none() {
            self.rate_deadline = Some(self.clock.now() + cx.budget.rate_delta());
        }
    }

    fn drain_spawns(&mut self, cx: &mut CoreContext) {
        loop {
            let pending = cx.take_pending();
            if pending.is_empty() {
                break;
            }
            for spawn in pending {
                self.spawn(spawn.task, spawn.locks, cx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::config::CoreConfig;
    use crate::errors::RemoteError;
    use crate::remote::{FixedRemote, RemoteClient};
    use crate::runtime::CoreContext;
    use crate::view::NullSink;
    use std::cell::RefCell;

    fn context() -> CoreContext {
        let _ = env_logger::builder().is_test(true).try_init();
        CoreContext::new(
            CoreConfig::default(),
            RemoteClient::direct(Box::new(FixedRemote::new())),
            Box::new(NullSink),
        )
    }

    fn harness(seed: u64) -> (Rc<VirtualClock>, Scheduler, CoreContext) {
        let clock = Rc::new(VirtualClock::new());
        let scheduler = Scheduler::new(clock.clone(), Some(seed));
        (clock, scheduler, context())
    }

    /// Steps through a fixed script of yields, logging each resume.
    struct Script {
        label: &'static str,
        steps: VecDeque<Step>,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Script {
        fn new(
            label: &'static str,
            steps: Vec<Step>,
            log: &Rc<RefCell<Vec<&'static str>>>,
        ) -> Box<Self> {
            Box::new(Self {
                label,
                steps: steps.into(),
                log: log.clone(),
            })
        }
    }

    impl Task for Script {
        fn step(&mut self, _cx: &mut CoreContext) -> Step {
            self.log.borrow_mut().push(self.label);
            self.steps.pop_front().unwrap_or(Step::Done)
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    fn drive(clock: &VirtualClock, scheduler: &mut Scheduler, cx: &mut CoreContext) {
        while let Some(deadline) = scheduler.next_wakeup() {
            clock.skip_to(deadline);
            scheduler.run_due(cx);
        }
    }

    #[test]
    fn shorter_delays_resume_first() {
        let (clock, mut scheduler, mut cx) = harness(1);
        let log = Rc::new(RefCell::new(Vec::new()));

        let slow = Script::new("slow", vec![Step::After(Duration::from_secs(5))], &log);
        let fast = Script::new("fast", vec![Step::After(Duration::from_secs(1))], &log);
        scheduler.spawn(slow, vec![], &mut cx);
        scheduler.spawn(fast, vec![], &mut cx);
        log.borrow_mut().clear();

        drive(&clock, &mut scheduler, &mut cx);
        assert_eq!(*log.borrow(), ["fast", "slow"]);
    }

    #[test]
    fn equal_deadlines_resume_in_insertion_order() {
        let (clock, mut scheduler, mut cx) = harness(1);
        let log = Rc::new(RefCell::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let task = Script::new(label, vec![Step::After(Duration::from_secs(2))], &log);
            scheduler.spawn(task, vec![], &mut cx);
        }
        log.borrow_mut().clear();

        clock.skip_to(Duration::from_secs(2));
        scheduler.run_due(&mut cx);
        assert_eq!(*log.borrow(), ["first", "second", "third"]);
    }

    #[test]
    fn run_soon_resumes_without_moving_the_clock() {
        let (_clock, mut scheduler, mut cx) = harness(1);
        let log = Rc::new(RefCell::new(Vec::new()));

        let task = Script::new("soon", vec![Step::RunSoon], &log);
        scheduler.spawn(task, vec![], &mut cx);
        assert_eq!(scheduler.next_wakeup(), Some(Duration::ZERO));

        scheduler.run_due(&mut cx);
        assert_eq!(*log.borrow(), ["soon", "soon"]);
        assert_eq!(scheduler.task_count(), 0);
    }

    #[test]
    fn conflicting_lock_sets_serialize_in_launch_order() {
        let (clock, mut scheduler, mut cx) = harness(1);
        let log = Rc::new(RefCell::new(Vec::new()));
        let lock = scheduler.lock_token("remote");

        for label in ["one", "two", "three"] {
            let task = Script::new(label, vec![Step::After(Duration::from_secs(1))], &log);
            scheduler.spawn(task, vec![lock], &mut cx);
        }
        // Only the first holder has run; the others are queued on the lock.
        assert_eq!(*log.borrow(), ["one"]);

        drive(&clock, &mut scheduler, &mut cx);
        assert_eq!(*log.borrow(), ["one", "one", "two", "two", "three", "three"]);
    }

    #[test]
    fn disjoint_lock_sets_do_not_block_each_other() {
        let (_clock, mut scheduler, mut cx) = harness(1);
        let log = Rc::new(RefCell::new(Vec::new()));
        let left = scheduler.lock_token("left");
        let right = scheduler.lock_token("right");
        assert_ne!(left, right);

        scheduler.spawn(
            Script::new("a", vec![Step::After(Duration::from_secs(1))], &log),
            vec![left],
            &mut cx,
        );
        scheduler.spawn(
            Script::new("b", vec![Step::After(Duration::from_secs(1))], &log),
            vec![right],
            &mut cx,
        );
        assert_eq!(*log.borrow(), ["a", "b"]);
    }

    #[test]
    fn rate_paced_releases_debit_the_budget() {
        let (clock, mut scheduler, mut cx) = harness(7);
        let log = Rc::new(RefCell::new(Vec::new()));
        let before = cx.budget.auth_remaining();

        for label in ["a", "b", "c"] {
            let task = Script::new(label, vec![Step::RatePaced], &log);
            scheduler.spawn(task, vec![], &mut cx);
        }
        log.borrow_mut().clear();

        drive(&clock, &mut scheduler, &mut cx);
        assert_eq!(cx.budget.auth_remaining(), before - 3);
        assert_eq!(scheduler.task_count(), 0);
        // All three ran exactly once, in whatever order the pick chose.
        let mut resumed = log.borrow().clone();
        resumed.sort();
        assert_eq!(resumed, ["a", "b", "c"]);
    }

    #[test]
    fn rate_pacing_waits_for_the_budget_delta() {
        let (_clock, mut scheduler, mut cx) = harness(1);
        let log = Rc::new(RefCell::new(Vec::new()));
        cx.budget.set_auth_remaining(100);

        let task = Script::new("paced", vec![Step::RatePaced], &log);
        scheduler.spawn(task, vec![], &mut cx);
        assert_eq!(scheduler.next_wakeup(), Some(Duration::from_secs(1)));

        cx.budget.set_auth_remaining(0);
        let task = Script::new("slow", vec![Step::RatePaced], &log);
        scheduler.spawn(task, vec![], &mut cx);
        // The armed deadline is not recomputed for later arrivals.
        assert_eq!(scheduler.next_wakeup(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn a_failed_step_retries_after_the_backoff() {
        let (clock, mut scheduler, mut cx) = harness(1);
        let log = Rc::new(RefCell::new(Vec::new()));

        let task = Script::new(
            "flaky",
            vec![Step::Error(RemoteError::Transport("reset".into()))],
            &log,
        );
        scheduler.spawn(task, vec![], &mut cx);
        assert_eq!(scheduler.next_wakeup(), Some(RETRY_BACKOFF));

        drive(&clock, &mut scheduler, &mut cx);
        assert_eq!(*log.borrow(), ["flaky", "flaky"]);
    }

    #[test]
    fn tasks_can_spawn_tasks_through_the_context() {
        struct Spawner {
            log: Rc<RefCell<Vec<&'static str>>>,
        }

        impl Task for Spawner {
            fn step(&mut self, cx: &mut CoreContext) -> Step {
                self.log.borrow_mut().push("spawner");
                let log = self.log.clone();
                cx.spawn(Script::new("child", vec![], &log));
                Step::Done
            }
        }

        let (_clock, mut scheduler, mut cx) = harness(1);
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.spawn(Box::new(Spawner { log: log.clone() }), vec![], &mut cx);
        assert_eq!(*log.borrow(), ["spawner", "child"]);
    }

    #[test]
    fn quit_drains_everything() {
        let (_clock, mut scheduler, mut cx) = harness(1);
        let log = Rc::new(RefCell::new(Vec::new()));
        let lock = scheduler.lock_token("remote");

        scheduler.spawn(
            Script::new("delayed", vec![Step::After(Duration::from_secs(9))], &log),
            vec![],
            &mut cx,
        );
        scheduler.spawn(
            Script::new("paced", vec![Step::RatePaced], &log),
            vec![],
            &mut cx,
        );
        scheduler.spawn(
            Script::new("holder", vec![Step::After(Duration::from_secs(9))], &log),
            vec![lock],
            &mut cx,
        );
        scheduler.spawn(Script::new("blocked", vec![], &log), vec![lock], &mut cx);

        scheduler.quit();
        assert!(scheduler.is_quitting());
        assert_eq!(scheduler.next_wakeup(), None);
        assert_eq!(scheduler.task_count(), 0);

        // Later spawns are ignored.
        scheduler.spawn(Script::new("late", vec![], &log), vec![], &mut cx);
        assert_eq!(scheduler.task_count(), 0);
    }

    #[test]
    fn same_name_interns_to_the_same_token() {
        let (_clock, mut scheduler, _cx) = harness(1);
        let a = scheduler.lock_token("tab 12");
        let b = scheduler.lock_token("tab 12");
        let c = scheduler.lock_token("tab 13");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
