//! View sink: the capability the core produces events into.
//!
//! The core never draws anything. Every UI-relevant change — a strip
//! entering or leaving a visible tab, a rename, a label change, a busy or
//! error line — is pushed through a [`ViewSink`]. An embedder binds this to
//! its widget toolkit; the bundled [`NullSink`] discards everything and
//! [`RecordingSink`] captures events for inspection.

use crate::strip::{Strip, StripKey};
use crate::tabs::{Selection, TabId};
use std::cell::RefCell;
use std::rc::Rc;

/// What a tab's label should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabLabel {
    pub selected: Selection,
    pub frozen: bool,
    /// Number of strips currently displayed.
    pub count: usize,
}

/// Capability receiving all UI-relevant events from the core.
///
/// Calls arrive on the scheduler thread, between task yields. Hidden tabs
/// produce no strip or label events.
pub trait ViewSink {
    /// `strip` entered the visible set of `tab`.
    fn strip_added(&mut self, tab: TabId, strip: &Strip);

    /// `strip` left the visible set of `tab`.
    fn strip_removed(&mut self, tab: TabId, strip: &Strip);

    /// The tab was renamed; `None` means it reverted to its ordinal.
    fn tab_renamed(&mut self, tab: TabId, name: Option<&str>);

    /// Selection, frozen state or strip count changed.
    fn tab_label_updated(&mut self, tab: TabId, label: TabLabel);

    fn tab_created(&mut self, tab: TabId);

    fn tab_destroyed(&mut self, tab: TabId);

    /// Status line; `tab` is `None` for the global line. Empty text clears.
    fn message(&mut self, tab: Option<TabId>, text: &str);

    /// Error line. Empty text blanks it.
    fn error(&mut self, text: &str);

    /// Remaining auth/ip hits changed after a probe.
    fn limits_updated(&mut self, auth: i64, ip: i64) {
        let _ = (auth, ip);
    }
}

/// A sink that discards every event.
#[derive(Debug, Default)]
pub struct NullSink;

impl ViewSink for NullSink {
    fn strip_added(&mut self, _tab: TabId, _strip: &Strip) {}
    fn strip_removed(&mut self, _tab: TabId, _strip: &Strip) {}
    fn tab_renamed(&mut self, _tab: TabId, _name: Option<&str>) {}
    fn tab_label_updated(&mut self, _tab: TabId, _label: TabLabel) {}
    fn tab_created(&mut self, _tab: TabId) {}
    fn tab_destroyed(&mut self, _tab: TabId) {}
    fn message(&mut self, _tab: Option<TabId>, _text: &str) {}
    fn error(&mut self, _text: &str) {}
}

/// One recorded sink call.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    StripAdded { tab: TabId, strip: StripKey },
    StripRemoved { tab: TabId, strip: StripKey },
    TabRenamed { tab: TabId, name: Option<String> },
    LabelUpdated { tab: TabId, label: TabLabel },
    TabCreated(TabId),
    TabDestroyed(TabId),
    Message { tab: Option<TabId>, text: String },
    Error(String),
    LimitsUpdated { auth: i64, ip: i64 },
}

/// A sink that records every event into a shared buffer.
///
/// Clones share the buffer, so a test can keep one handle and give the
/// other to the runtime.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Rc<RefCell<Vec<ViewEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.borrow().clone()
    }

    /// Drain the buffer, returning what was recorded.
    pub fn take(&self) -> Vec<ViewEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    fn push(&self, event: ViewEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl ViewSink for RecordingSink {
    fn strip_added(&mut self, tab: TabId, strip: &Strip) {
        self.push(ViewEvent::StripAdded {
            tab,
            strip: strip.key().clone(),
        });
    }

    fn strip_removed(&mut self, tab: TabId, strip: &Strip) {
        self.push(ViewEvent::StripRemoved {
            tab,
            strip: strip.key().clone(),
        });
    }

    fn tab_renamed(&mut self, tab: TabId, name: Option<&str>) {
        self.push(ViewEvent::TabRenamed {
            tab,
            name: name.map(str::to_owned),
        });
    }

    fn tab_label_updated(&mut self, tab: TabId, label: TabLabel) {
        self.push(ViewEvent::LabelUpdated { tab, label });
    }

    fn tab_created(&mut self, tab: TabId) {
        self.push(ViewEvent::TabCreated(tab));
    }

    fn tab_destroyed(&mut self, tab: TabId) {
        self.push(ViewEvent::TabDestroyed(tab));
    }

    fn message(&mut self, tab: Option<TabId>, text: &str) {
        self.push(ViewEvent::Message {
            tab,
            text: text.to_owned(),
        });
    }

    fn error(&mut self, text: &str) {
        self.push(ViewEvent::Error(text.to_owned()));
    }

    fn limits_updated(&mut self, auth: i64, ip: i64) {
        self.push(ViewEvent::LimitsUpdated { auth, ip });
    }
}
