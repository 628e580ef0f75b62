//! The runtime: one explicit value owning the whole core.
//!
//! Where the original design kept the scheduler, registry, budget, remote
//! client and view sink as process-wide singletons, [`Runtime`] carries
//! them as owned fields and threads a [`CoreContext`] through every task
//! step. Nothing in the crate touches global state; two runtimes in one
//! process do not see each other.

pub(crate) mod tasks;

use crate::clock::{Clock, MonotonicClock};
use crate::config::CoreConfig;
use crate::errors::{CoreError, RemoteError};
use crate::rate::RateBudget;
use crate::remote::{RemoteApi, RemoteClient};
use crate::runtime::tasks::{ErrorBlanker, PeriodicReload, RateProbe, SendMessage, UserLookup};
use crate::scheduler::task::{LockToken, Task};
use crate::scheduler::Scheduler;
use crate::strip::Strip;
use crate::tabs::{PeriodicSource, TabGraph, TabId};
use crate::view::ViewSink;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

/// FIFO of diagnostics awaiting display on the view sink's error line.
#[derive(Default)]
pub struct ErrorChannel {
    list: VecDeque<String>,
    /// A blanker task is live and will drain the list.
    pub(crate) blanker_active: bool,
}

impl ErrorChannel {
    pub fn front(&self) -> Option<&str> {
        self.list.front().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub(crate) fn push(&mut self, diagnostic: String) {
        self.list.push_back(diagnostic);
    }

    pub(crate) fn pop(&mut self) {
        self.list.pop_front();
    }
}

/// A task waiting to be handed to the scheduler.
pub(crate) struct PendingTask {
    pub(crate) task: Box<dyn Task>,
    pub(crate) locks: Vec<LockToken>,
}

/// Everything a task step may touch.
///
/// The scheduler hands this to [`Task::step`]; tasks never see the
/// scheduler itself. Work a step wants launched goes through
/// [`spawn`](Self::spawn) and is picked up right after the step returns.
pub struct CoreContext {
    pub config: CoreConfig,
    pub tabs: TabGraph,
    pub budget: RateBudget,
    pub view: Box<dyn ViewSink>,
    pub remote: RemoteClient,
    pub errors: ErrorChannel,
    pending: Vec<PendingTask>,
}

impl CoreContext {
    pub fn new(config: CoreConfig, remote: RemoteClient, view: Box<dyn ViewSink>) -> Self {
        let budget = RateBudget::new(config.auth_limit_initial, config.ip_limit_initial);
        Self {
            config,
            tabs: TabGraph::new(),
            budget,
            view,
            remote,
            errors: ErrorChannel::default(),
            pending: Vec::new(),
        }
    }

    /// Queue a lock-free task for launch after the current step.
    pub fn spawn(&mut self, task: Box<dyn Task>) {
        self.pending.push(PendingTask {
            task,
            locks: Vec::new(),
        });
    }

    /// Queue a task holding the given locks for launch after the current
    /// step.
    pub fn spawn_locked(&mut self, task: Box<dyn Task>, locks: Vec<LockToken>) {
        self.pending.push(PendingTask { task, locks });
    }

    pub(crate) fn take_pending(&mut self) -> Vec<PendingTask> {
        std::mem::take(&mut self.pending)
    }

    /// Append a diagnostic and make sure a blanker task is draining the
    /// channel.
    pub fn report_error(&mut self, diagnostic: String) {
        log::warn!("{diagnostic}");
        self.errors.push(diagnostic);
        if !self.errors.blanker_active {
            self.errors.blanker_active = true;
            self.spawn(Box::new(ErrorBlanker::new()));
        }
    }

    /// Run one remote call under the busy-line decoration: announce
    /// `what`, run it, clear the line, and on failure append
    /// `"<error>, <what>"` to the error channel before handing the typed
    /// error back.
    pub fn remote_call<T>(
        &mut self,
        what: &str,
        call: impl FnOnce(&mut RemoteClient) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        self.view.message(None, &format!("{what}…"));
        let result = call(&mut self.remote);
        self.view.message(None, "");
        if let Err(error) = &result {
            self.report_error(format!("{error}, {what}"));
        }
        result
    }

    /// Refresh a tab through the graph with the sink attached.
    pub fn refresh_tab(&mut self, id: TabId) {
        let Self { tabs, view, .. } = self;
        tabs.refresh(id, view.as_mut());
    }

    /// Split borrow: the graph and the sink it reports to.
    pub fn graph_view(&mut self) -> (&mut TabGraph, &mut dyn ViewSink) {
        (&mut self.tabs, self.view.as_mut())
    }
}

/// The assembled core: scheduler plus context.
///
/// Drive it with [`run`](Self::run) on a real clock, or with
/// [`run_for`](Self::run_for) / [`run_due`](Self::run_due) when embedding
/// or testing against a [`VirtualClock`](crate::clock::VirtualClock). An
/// embedder with its own event loop arms a host timer from
/// [`next_wakeup`](Self::next_wakeup) and calls [`run_due`](Self::run_due)
/// when it fires.
pub struct Runtime {
    clock: Rc<dyn Clock>,
    scheduler: Scheduler,
    cx: CoreContext,
}

impl Runtime {
    /// Assemble a runtime on the real clock. `config.threaded` decides
    /// whether remote calls run inline or behind the serialized worker.
    pub fn new(
        config: CoreConfig,
        remote: Box<dyn RemoteApi + Send>,
        view: Box<dyn ViewSink>,
    ) -> Self {
        Self::with_clock(config, remote, view, Rc::new(MonotonicClock::new()))
    }

    /// Assemble a runtime on an explicit clock.
    pub fn with_clock(
        config: CoreConfig,
        remote: Box<dyn RemoteApi + Send>,
        view: Box<dyn ViewSink>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let client = if config.threaded {
            RemoteClient::threaded(remote)
        } else {
            RemoteClient::direct(remote)
        };
        let scheduler = Scheduler::new(clock.clone(), config.rng_seed);
        let cx = CoreContext::new(config, client, view);
        Self {
            clock,
            scheduler,
            cx,
        }
    }

    /// Launch the background rate-limit probes.
    pub fn start(&mut self) {
        self.scheduler
            .spawn(Box::new(RateProbe::auth()), Vec::new(), &mut self.cx);
        self.scheduler
            .spawn(Box::new(RateProbe::ip()), Vec::new(), &mut self.cx);
    }

    // ****************************************
    // ** Tab operations

    /// Create a periodic tab and launch its reload task. The task holds a
    /// per-tab lock, so a manual reload can never overlap the periodic
    /// one.
    pub fn create_periodic(&mut self, source: PeriodicSource) -> TabId {
        let id = {
            let (tabs, view) = self.cx.graph_view();
            tabs.create_periodic(source, view)
        };
        let lock = self.scheduler.lock_token(&format!("reload tab {id}"));
        self.scheduler
            .spawn(Box::new(PeriodicReload::new(id)), vec![lock], &mut self.cx);
        id
    }

    pub fn create_union(&mut self, inputs: &[TabId]) -> Result<TabId, CoreError> {
        self.create_derived(TabGraph::create_union, inputs)
    }

    pub fn create_intersection(&mut self, inputs: &[TabId]) -> Result<TabId, CoreError> {
        self.create_derived(TabGraph::create_intersection, inputs)
    }

    /// The first input is positive, the rest are subtractive.
    pub fn create_difference(&mut self, inputs: &[TabId]) -> Result<TabId, CoreError> {
        self.create_derived(TabGraph::create_difference, inputs)
    }

    fn create_derived(
        &mut self,
        construct: fn(&mut TabGraph, &mut dyn ViewSink) -> TabId,
        inputs: &[TabId],
    ) -> Result<TabId, CoreError> {
        let (tabs, view) = self.cx.graph_view();
        let id = construct(tabs, view);
        for input in inputs {
            if let Err(error) = tabs.add_input(id, *input, view) {
                // Leave no half-wired tab behind.
                let _ = tabs.close(id, view);
                return Err(error);
            }
        }
        Ok(id)
    }

    pub fn create_interactive(
        &mut self,
        values: impl IntoIterator<Item = String>,
    ) -> TabId {
        let (tabs, view) = self.cx.graph_view();
        tabs.create_interactive(values, view)
    }

    pub fn create_id_input(&mut self, path: PathBuf) -> Result<TabId, CoreError> {
        let (tabs, view) = self.cx.graph_view();
        tabs.create_id_input(path, view)
    }

    pub fn create_id_output(
        &mut self,
        path: PathBuf,
        inputs: &[TabId],
    ) -> Result<TabId, CoreError> {
        let (tabs, view) = self.cx.graph_view();
        let id = tabs.create_id_output(path, view);
        for input in inputs {
            if let Err(error) = tabs.add_input(id, *input, view) {
                let _ = tabs.close(id, view);
                return Err(error);
            }
        }
        Ok(id)
    }

    pub fn add_input(&mut self, tab: TabId, input: TabId) -> Result<(), CoreError> {
        let (tabs, view) = self.cx.graph_view();
        tabs.add_input(tab, input, view)
    }

    pub fn discard_input(&mut self, tab: TabId, input: TabId) -> Result<(), CoreError> {
        let (tabs, view) = self.cx.graph_view();
        tabs.discard_input(tab, input, view)
    }

    pub fn close_tab(&mut self, id: TabId) -> Result<(), CoreError> {
        let (tabs, view) = self.cx.graph_view();
        tabs.close(id, view)
    }

    pub fn set_name(&mut self, id: TabId, name: Option<&str>) -> Result<(), CoreError> {
        let (tabs, view) = self.cx.graph_view();
        tabs.rename(id, name, view)
    }

    pub fn select(&mut self, id: TabId, complement: bool) -> Result<(), CoreError> {
        let (tabs, view) = self.cx.graph_view();
        tabs.select(id, complement, view)
    }

    pub fn unselect(&mut self, id: TabId) -> Result<(), CoreError> {
        let (tabs, view) = self.cx.graph_view();
        tabs.unselect(id, view)
    }

    pub fn hide(&mut self, id: TabId) -> Result<(), CoreError> {
        self.cx.tabs.hide(id)
    }

    pub fn unhide(&mut self, id: TabId) -> Result<(), CoreError> {
        let (tabs, view) = self.cx.graph_view();
        tabs.unhide(id, view)
    }

    pub fn freeze(&mut self, id: TabId) -> Result<(), CoreError> {
        let (tabs, view) = self.cx.graph_view();
        tabs.freeze(id, view)
    }

    pub fn unfreeze(&mut self, id: TabId) -> Result<(), CoreError> {
        let (tabs, view) = self.cx.graph_view();
        tabs.unfreeze(id, view)
    }

    pub fn force_add(
        &mut self,
        id: TabId,
        strips: impl IntoIterator<Item = Strip>,
    ) -> Result<(), CoreError> {
        let (tabs, view) = self.cx.graph_view();
        tabs.force_add(id, strips, view)
    }

    pub fn suppress(
        &mut self,
        id: TabId,
        strips: impl IntoIterator<Item = Strip>,
    ) -> Result<(), CoreError> {
        let (tabs, view) = self.cx.graph_view();
        tabs.suppress(id, strips, view)
    }

    pub fn refresh(&mut self, id: TabId) {
        self.cx.refresh_tab(id);
    }

    // ****************************************
    // ** Messaging

    /// Send a message through the remote, as its own one-shot task.
    pub fn send_message(&mut self, text: impl Into<String>) {
        self.scheduler.spawn(
            Box::new(SendMessage::new(text.into())),
            Vec::new(),
            &mut self.cx,
        );
    }

    /// Fetch a user profile and answer on the global message line.
    pub fn lookup_user(&mut self, id: u64) {
        self.scheduler
            .spawn(Box::new(UserLookup::new(id)), Vec::new(), &mut self.cx);
    }

    // ****************************************
    // ** Driving

    /// Earliest instant at which [`run_due`](Self::run_due) has work.
    pub fn next_wakeup(&self) -> Option<Duration> {
        self.scheduler.next_wakeup()
    }

    /// Advance everything whose deadline has passed.
    pub fn run_due(&mut self) {
        self.scheduler.run_due(&mut self.cx);
    }

    /// Drive the scheduler across `span`, jumping the clock from deadline
    /// to deadline. Only moves on clocks that can jump (virtual ones);
    /// use [`run`](Self::run) on the real clock.
    pub fn run_for(&mut self, span: Duration) {
        let horizon = self.clock.now() + span;
        loop {
            let Some(deadline) = self.scheduler.next_wakeup() else {
                break;
            };
            if deadline > horizon || !self.clock.skip_to(deadline) {
                break;
            }
            self.scheduler.run_due(&mut self.cx);
        }
        self.clock.skip_to(horizon);
    }

    /// Sleep-and-advance loop on the real clock. Returns when nothing is
    /// scheduled anymore, which for a runtime with periodic tabs means
    /// after [`quit`](Self::quit).
    pub fn run(&mut self) {
        loop {
            let Some(deadline) = self.scheduler.next_wakeup() else {
                break;
            };
            let now = self.clock.now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
            self.scheduler.run_due(&mut self.cx);
        }
    }

    /// Stop scheduling. Queued work is dropped and locks are released.
    pub fn quit(&mut self) {
        self.scheduler.quit();
    }

    /// Close every tab (persisting dirty id outputs), quit the scheduler
    /// and stop the remote worker. Id outputs close before their inputs,
    /// while the strips they are meant to persist are still flowing in.
    /// The first close error is reported after everything else has been
    /// torn down.
    pub fn shutdown(&mut self) -> Result<(), CoreError> {
        let mut first_error = None;
        let mut ids = self.cx.tabs.tab_ids();
        ids.sort_by_key(|id| {
            self.cx
                .tabs
                .get(*id)
                .map_or(1, |tab| (tab.kind() != crate::tabs::TabKind::IdOutput) as u8)
        });
        for id in ids {
            let (tabs, view) = self.cx.graph_view();
            if let Err(error) = tabs.close(id, view) {
                log::error!("closing tab {id} failed: {error}");
                first_error.get_or_insert(error);
            }
        }
        self.scheduler.quit();
        self.cx.remote.shutdown();
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    // ****************************************
    // ** Introspection

    pub fn tabs(&self) -> &TabGraph {
        &self.cx.tabs
    }

    pub fn budget(&self) -> &RateBudget {
        &self.cx.budget
    }

    pub fn errors(&self) -> &ErrorChannel {
        &self.cx.errors
    }

    pub fn context_mut(&mut self) -> &mut CoreContext {
        &mut self.cx
    }
}
