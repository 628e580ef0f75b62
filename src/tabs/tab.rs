//! Tab node: identity, state and label.

use crate::strip::{Strip, StripKind};
use crate::tabs::source::PeriodicSource;
use crate::view::TabLabel;
use hashbrown::HashSet;
use std::fmt;
use std::path::PathBuf;

/// A unique identifier for a tab within a [`TabGraph`](crate::tabs::TabGraph).
///
/// Wraps the tab's ordinal: a monotonically increasing number allocated at
/// construction and never reused, so a `TabId` stays unambiguous even after
/// its tab is closed. Unnamed tabs also display as this ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub(crate) u64);

impl TabId {
    pub fn ordinal(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What rule a tab maintains its strip set by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabKind {
    /// Externally fed set; no incoming edges.
    Preset,
    /// Preset refreshed from the remote API by its own task.
    Periodic,
    Union,
    Intersection,
    /// First input positive, the rest subtractive.
    Difference,
    /// Preset seeded from an id file.
    IdInput,
    /// Union that persists itself to an id file on close.
    IdOutput,
    /// Preset seeded from a literal list; accepts inputs.
    Interactive,
}

impl TabKind {
    /// Source kinds refuse incoming edges.
    pub fn refuses_inputs(self) -> bool {
        matches!(self, TabKind::Preset | TabKind::Periodic | TabKind::IdInput)
    }

    /// Automatic base name for freshly created tabs of this kind.
    pub(crate) fn name_base(self) -> Option<&'static str> {
        match self {
            TabKind::Union => Some("Union"),
            TabKind::Intersection => Some("Inter"),
            TabKind::Difference => Some("Diff"),
            _ => None,
        }
    }
}

impl fmt::Display for TabKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TabKind::Preset => "Preset",
            TabKind::Periodic => "Periodic",
            TabKind::Union => "Union",
            TabKind::Intersection => "Intersection",
            TabKind::Difference => "Difference",
            TabKind::IdInput => "IdInput",
            TabKind::IdOutput => "IdOutput",
            TabKind::Interactive => "Interactive",
        })
    }
}

/// Tri-state selection, a view-layer concept carried on the tab because
/// label events must report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    Unselected,
    Selected,
    /// Selected as the complement side of a set operation.
    Complement,
}

/// A node in the tab DAG.
///
/// Mutation goes through [`TabGraph`](crate::tabs::TabGraph), which keeps
/// the edge relation symmetric and pushes deltas downstream; the methods
/// here are read-only.
pub struct Tab {
    pub(crate) id: TabId,
    pub(crate) name: Option<String>,
    pub(crate) kind: TabKind,
    /// Fixed at construction for source tabs, adopted from the first input
    /// otherwise.
    pub(crate) strip_type: Option<StripKind>,
    /// Ordered; the order only matters for `Difference`.
    pub(crate) inputs: Vec<TabId>,
    pub(crate) outputs: HashSet<TabId>,
    /// Current materialised set.
    pub(crate) strips: HashSet<Strip>,
    /// Authoritative externally-fed set (source kinds only).
    pub(crate) preset_strips: HashSet<Strip>,
    /// Strips the user forced in.
    pub(crate) added: HashSet<Strip>,
    /// Strips the user suppressed.
    pub(crate) deleted: HashSet<Strip>,
    pub(crate) frozen: bool,
    pub(crate) hidden: bool,
    pub(crate) selected: Selection,
    /// Dirty bit (`IdOutput` only).
    pub(crate) modified: bool,
    /// Reload source (`Periodic` only).
    pub(crate) source: Option<PeriodicSource>,
    /// Backing file (`IdInput` / `IdOutput` only).
    pub(crate) path: Option<PathBuf>,
}

impl Tab {
    pub(crate) fn new(id: TabId, kind: TabKind, strip_type: Option<StripKind>) -> Self {
        Self {
            id,
            name: None,
            kind,
            strip_type,
            inputs: Vec::new(),
            outputs: HashSet::new(),
            strips: HashSet::new(),
            preset_strips: HashSet::new(),
            added: HashSet::new(),
            deleted: HashSet::new(),
            frozen: false,
            hidden: false,
            selected: Selection::Unselected,
            modified: false,
            source: None,
            path: None,
        }
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> TabKind {
        self.kind
    }

    pub fn strip_type(&self) -> Option<StripKind> {
        self.strip_type
    }

    pub fn inputs(&self) -> &[TabId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &HashSet<TabId> {
        &self.outputs
    }

    pub fn strips(&self) -> &HashSet<Strip> {
        &self.strips
    }

    pub fn preset_strips(&self) -> &HashSet<Strip> {
        &self.preset_strips
    }

    pub fn frozen(&self) -> bool {
        self.frozen
    }

    pub fn hidden(&self) -> bool {
        self.hidden
    }

    pub fn selected(&self) -> Selection {
        self.selected
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn label(&self) -> TabLabel {
        TabLabel {
            selected: self.selected,
            frozen: self.frozen,
            count: self.strips.len(),
        }
    }

    /// Human-readable handle for diagnostics, e.g. `Union Friends` or
    /// `Difference 7`.
    pub fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("{} {}", self.kind, name),
            None => format!("{} {}", self.kind, self.id),
        }
    }
}
