//! Built-in tasks driven by the scheduler.

use crate::errors::RemoteError;
use crate::runtime::CoreContext;
use crate::scheduler::task::{Step, Task};
use crate::strip::Strip;
use crate::tabs::{PeriodicSource, TabId};
use std::time::Duration;

/// Reload loop for one periodic tab.
///
/// After a successful reload the task waits out the tab's nominal period,
/// then additionally waits for a rate-paced slot: the period is a floor,
/// the budget sets the ceiling. A failed reload retries on the error
/// backoff without burning a rate slot. The task ends when its tab is
/// gone.
pub(crate) struct PeriodicReload {
    tab: TabId,
    phase: ReloadPhase,
}

enum ReloadPhase {
    Reload,
    Pace,
}

impl PeriodicReload {
    pub(crate) fn new(tab: TabId) -> Self {
        Self {
            tab,
            phase: ReloadPhase::Reload,
        }
    }
}

impl Task for PeriodicReload {
    fn step(&mut self, cx: &mut CoreContext) -> Step {
        match self.phase {
            ReloadPhase::Reload => {
                let Some(source) = cx.tabs.periodic_source(self.tab) else {
                    return Step::Done;
                };
                match reload(cx, self.tab, source) {
                    Ok(()) => {
                        self.phase = ReloadPhase::Pace;
                        Step::After(source.period())
                    }
                    Err(error) => Step::Error(error),
                }
            }
            ReloadPhase::Pace => {
                self.phase = ReloadPhase::Reload;
                Step::RatePaced
            }
        }
    }

    fn name(&self) -> &str {
        "periodic reload"
    }
}

fn reload(cx: &mut CoreContext, tab: TabId, source: PeriodicSource) -> Result<(), RemoteError> {
    match source {
        PeriodicSource::Timeline(kind) => {
            let tweets = cx.remote_call(kind.busy_message(), |remote| remote.timeline(kind))?;
            let _ = cx
                .tabs
                .extend_preset(tab, tweets.into_iter().map(Strip::tweet));
        }
        PeriodicSource::Followers => {
            let ids = cx.remote_call("fetching followers", |remote| remote.followers_ids())?;
            let _ = cx
                .tabs
                .replace_preset(tab, ids.into_iter().map(Strip::user_id));
        }
        PeriodicSource::Following => {
            let ids = cx.remote_call("fetching following", |remote| remote.following_ids())?;
            let _ = cx
                .tabs
                .replace_preset(tab, ids.into_iter().map(Strip::user_id));
        }
    }
    cx.refresh_tab(tab);
    Ok(())
}

/// Background probe correcting one of the budget counters.
///
/// First reading happens shortly after startup, then on the nominal
/// period; failures retry on the error backoff.
pub(crate) struct RateProbe {
    authenticated: bool,
    period: Duration,
    started: bool,
}

impl RateProbe {
    const INITIAL_DELAY: Duration = Duration::from_secs(10);

    pub(crate) fn auth() -> Self {
        Self {
            authenticated: true,
            period: Duration::from_secs(120),
            started: false,
        }
    }

    pub(crate) fn ip() -> Self {
        Self {
            authenticated: false,
            period: Duration::from_secs(180),
            started: false,
        }
    }
}

impl Task for RateProbe {
    fn step(&mut self, cx: &mut CoreContext) -> Step {
        if !self.started {
            self.started = true;
            return Step::After(Self::INITIAL_DELAY);
        }
        let what = if self.authenticated {
            "getting Auth limit"
        } else {
            "getting IP limit"
        };
        let authenticated = self.authenticated;
        match cx.remote_call(what, |remote| remote.rate_limit(authenticated)) {
            Ok(status) => {
                if self.authenticated {
                    cx.budget.set_auth_remaining(status.remaining_hits);
                } else {
                    cx.budget.set_ip_remaining(status.remaining_hits);
                }
                let (auth, ip) = (cx.budget.auth_remaining(), cx.budget.ip_remaining());
                cx.view.limits_updated(auth, ip);
                Step::After(self.period)
            }
            Err(error) => Step::Error(error),
        }
    }

    fn name(&self) -> &str {
        if self.authenticated {
            "auth limit probe"
        } else {
            "ip limit probe"
        }
    }
}

/// Drains the error channel onto the view sink: show a diagnostic, hold it
/// for the blanking delay, blank it, breathe, pop, repeat until the
/// channel is empty. Spawned by the first diagnostic; at most one runs.
pub(crate) struct ErrorBlanker {
    phase: BlankPhase,
}

enum BlankPhase {
    Show,
    Blank,
    Pop,
}

impl ErrorBlanker {
    const BREATHER: Duration = Duration::from_millis(200);

    pub(crate) fn new() -> Self {
        Self {
            phase: BlankPhase::Show,
        }
    }

    fn show_front(cx: &mut CoreContext) -> Option<Step> {
        let diagnostic = cx.errors.front()?.to_owned();
        cx.view.error(&diagnostic);
        Some(Step::After(cx.config.error_blanking_delay))
    }
}

impl Task for ErrorBlanker {
    fn step(&mut self, cx: &mut CoreContext) -> Step {
        match self.phase {
            BlankPhase::Show => match Self::show_front(cx) {
                Some(step) => {
                    self.phase = BlankPhase::Blank;
                    step
                }
                None => {
                    cx.errors.blanker_active = false;
                    Step::Done
                }
            },
            BlankPhase::Blank => {
                cx.view.error("");
                self.phase = BlankPhase::Pop;
                Step::After(Self::BREATHER)
            }
            BlankPhase::Pop => {
                cx.errors.pop();
                match Self::show_front(cx) {
                    Some(step) => {
                        self.phase = BlankPhase::Blank;
                        step
                    }
                    None => {
                        cx.errors.blanker_active = false;
                        Step::Done
                    }
                }
            }
        }
    }

    fn name(&self) -> &str {
        "error blanker"
    }
}

/// One-shot send. Failures surface on the error channel; there is no
/// retry, matching an interactive send.
pub(crate) struct SendMessage {
    text: Option<String>,
}

impl SendMessage {
    pub(crate) fn new(text: String) -> Self {
        Self { text: Some(text) }
    }
}

impl Task for SendMessage {
    fn step(&mut self, cx: &mut CoreContext) -> Step {
        let Some(text) = self.text.take() else {
            return Step::Done;
        };
        let _ = cx.remote_call("sending message", |remote| remote.send_message(&text));
        Step::Done
    }

    fn name(&self) -> &str {
        "send message"
    }
}

/// One-shot profile fetch, answered on the global message line.
pub(crate) struct UserLookup {
    id: u64,
}

impl UserLookup {
    pub(crate) fn new(id: u64) -> Self {
        Self { id }
    }
}

impl Task for UserLookup {
    fn step(&mut self, cx: &mut CoreContext) -> Step {
        let id = self.id;
        if let Ok(profile) = cx.remote_call("getting user info", |remote| remote.user_show(id)) {
            cx.view.message(
                None,
                &format!("{} ({})", profile.screen_name, profile.name),
            );
        }
        Step::Done
    }

    fn name(&self) -> &str {
        "user lookup"
    }
}
