//! The tab graph: registry, wiring and set-algebra propagation.
//!
//! Tabs live in an arena keyed by their ordinal; edges are id pairs kept
//! symmetric (`t ∈ u.outputs ⇔ u ∈ t.inputs`), so neither side owns the
//! other and unlinking is cheap. Deltas flow downstream incrementally:
//! every tab filters an incoming delta through its own rule and re-emits
//! only what it accepted, skipping frozen outputs (they catch up on the
//! refresh that unfreezing triggers) and keeping hidden tabs silent on the
//! view sink.

use crate::errors::CoreError;
use crate::strip::{Strip, StripKind};
use crate::tabs::source::{self, PeriodicSource};
use crate::tabs::tab::{Selection, Tab, TabId, TabKind};
use crate::view::ViewSink;
use hashbrown::{HashMap, HashSet};
use regex::Regex;
use std::path::PathBuf;

/// How a tab is registered: by name once it has one, by ordinal otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TabKey {
    Name(String),
    Ordinal(u64),
}

pub struct TabGraph {
    tabs: HashMap<TabId, Tab>,
    registry: HashMap<TabKey, TabId>,
    next_ordinal: u64,
    /// Splits a trailing run of digits off a name.
    suffix: Regex,
}

impl TabGraph {
    pub fn new() -> Self {
        Self {
            tabs: HashMap::new(),
            registry: HashMap::new(),
            next_ordinal: 0,
            suffix: Regex::new(r"^(.*?)([0-9]+)$").expect("suffix pattern is valid"),
        }
    }

    // ****************************************
    // ** Construction

    pub fn create_preset(&mut self, strip_type: StripKind, view: &mut dyn ViewSink) -> TabId {
        self.create(TabKind::Preset, Some(strip_type), None, view)
    }

    pub fn create_periodic(&mut self, source: PeriodicSource, view: &mut dyn ViewSink) -> TabId {
        let id = self.create(TabKind::Periodic, Some(source.strip_kind()), None, view);
        self.tabs.get_mut(&id).expect("tab registered above").source = Some(source);
        self.rename(id, Some(source.name_base()), view)
            .expect("tab registered above");
        id
    }

    pub fn create_union(&mut self, view: &mut dyn ViewSink) -> TabId {
        self.create(TabKind::Union, None, None, view)
    }

    pub fn create_intersection(&mut self, view: &mut dyn ViewSink) -> TabId {
        self.create(TabKind::Intersection, None, None, view)
    }

    pub fn create_difference(&mut self, view: &mut dyn ViewSink) -> TabId {
        self.create(TabKind::Difference, None, None, view)
    }

    /// A preset-style tab seeded from literal values, kept as opaque strips.
    pub fn create_interactive(
        &mut self,
        values: impl IntoIterator<Item = String>,
        view: &mut dyn ViewSink,
    ) -> TabId {
        let id = self.create(TabKind::Interactive, Some(StripKind::Opaque), None, view);
        let tab = self.tabs.get_mut(&id).expect("tab registered above");
        tab.preset_strips = values.into_iter().map(Strip::opaque).collect();
        self.refresh(id, view);
        id
    }

    /// Load an id file into a new source tab. The file is read before the
    /// tab exists, so a bad path creates nothing.
    pub fn create_id_input(
        &mut self,
        path: PathBuf,
        view: &mut dyn ViewSink,
    ) -> Result<TabId, CoreError> {
        let strips = source::read_id_file(&path)?;
        let id = self.create(TabKind::IdInput, Some(StripKind::Opaque), Some(path), view);
        self.tabs.get_mut(&id).expect("tab registered above").preset_strips = strips;
        self.refresh(id, view);
        Ok(id)
    }

    /// A union that writes itself back to `path` when closed dirty.
    pub fn create_id_output(&mut self, path: PathBuf, view: &mut dyn ViewSink) -> TabId {
        self.create(TabKind::IdOutput, None, Some(path), view)
    }

    fn create(
        &mut self,
        kind: TabKind,
        strip_type: Option<StripKind>,
        path: Option<PathBuf>,
        view: &mut dyn ViewSink,
    ) -> TabId {
        self.next_ordinal += 1;
        let id = TabId(self.next_ordinal);
        let mut tab = Tab::new(id, kind, strip_type);
        tab.path = path;
        self.tabs.insert(id, tab);
        self.registry.insert(TabKey::Ordinal(id.0), id);
        log::debug!("created {} tab {id}", kind);
        view.tab_created(id);
        if let Some(base) = kind.name_base() {
            self.rename(id, Some(base), view).expect("tab registered above");
        } else {
            self.emit_label(id, view);
        }
        id
    }

    // ****************************************
    // ** Lookup

    pub fn get(&self, id: TabId) -> Option<&Tab> {
        self.tabs.get(&id)
    }

    pub fn contains(&self, id: TabId) -> bool {
        self.tabs.contains_key(&id)
    }

    /// Find a tab by its registered name.
    pub fn lookup(&self, name: &str) -> Option<TabId> {
        self.registry.get(&TabKey::Name(name.to_owned())).copied()
    }

    /// All live tab ids, in creation order.
    pub fn tab_ids(&self) -> Vec<TabId> {
        let mut ids: Vec<TabId> = self.tabs.keys().copied().collect();
        ids.sort();
        ids
    }

    pub(crate) fn periodic_source(&self, id: TabId) -> Option<PeriodicSource> {
        self.tabs.get(&id).and_then(|tab| tab.source)
    }

    // ****************************************
    // ** Naming

    /// Give the tab a name, resolving collisions with a numeric suffix, or
    /// revert it to ordinal registration with `None`.
    ///
    /// A taken name splits into base and trailing digit run; the counter
    /// starts one past the run (or at 2) and climbs until a free name is
    /// found. `"Friends"` collides to `"Friends2"`, `"Friends2"` to
    /// `"Friends3"`.
    pub fn rename(
        &mut self,
        id: TabId,
        wanted: Option<&str>,
        view: &mut dyn ViewSink,
    ) -> Result<(), CoreError> {
        if !self.tabs.contains_key(&id) {
            return Err(CoreError::NotFound);
        }
        let old_key = match self.tabs[&id].name.clone() {
            Some(name) => TabKey::Name(name),
            None => TabKey::Ordinal(id.0),
        };
        self.registry.remove(&old_key);

        let resolved = wanted.map(|name| self.free_name(name));
        match &resolved {
            Some(name) => {
                self.registry.insert(TabKey::Name(name.clone()), id);
            }
            None => {
                self.registry.insert(TabKey::Ordinal(id.0), id);
            }
        }
        self.tabs.get_mut(&id).expect("checked above").name = resolved.clone();
        view.tab_renamed(id, resolved.as_deref());
        self.emit_label(id, view);
        Ok(())
    }

    fn free_name(&self, wanted: &str) -> String {
        if !self.registry.contains_key(&TabKey::Name(wanted.to_owned())) {
            return wanted.to_owned();
        }
        let (base, start) = match self.suffix.captures(wanted) {
            Some(caps) => {
                let base = caps.get(1).expect("capture 1 exists").as_str();
                match caps.get(2).expect("capture 2 exists").as_str().parse::<u64>() {
                    Ok(counter) => (base, counter.saturating_add(1)),
                    // A digit run too large to count from is part of the base.
                    Err(_) => (wanted, 2),
                }
            }
            None => (wanted, 2),
        };
        let mut counter = start;
        loop {
            let candidate = format!("{base}{counter}");
            if !self.registry.contains_key(&TabKey::Name(candidate.clone())) {
                return candidate;
            }
            counter += 1;
        }
    }

    // ****************************************
    // ** Wiring

    /// Wire `input` into `tab`. Checks run before any mutation: source
    /// tabs refuse inputs, strip types must be compatible, and a
    /// `Difference` input must not close a negative loop. The tab adopts
    /// the input's strip type on first wire, then refreshes unless frozen.
    pub fn add_input(
        &mut self,
        tab: TabId,
        input: TabId,
        view: &mut dyn ViewSink,
    ) -> Result<(), CoreError> {
        if !self.tabs.contains_key(&tab) || !self.tabs.contains_key(&input) {
            return Err(CoreError::NotFound);
        }
        if self.tabs[&tab].kind.refuses_inputs() {
            return Err(CoreError::InputsForbidden(self.tabs[&tab].describe()));
        }
        if let (Some(wanted), Some(offered)) =
            (self.tabs[&tab].strip_type, self.tabs[&input].strip_type)
        {
            if !wanted.accepts(offered) {
                return Err(CoreError::TypeMismatch {
                    input: self.tabs[&input].describe(),
                    wanted,
                });
            }
        }
        if self.tabs[&input].kind == TabKind::Difference && self.closes_negative_loop(input, tab) {
            return Err(CoreError::Cycle);
        }

        if self.tabs[&tab].strip_type.is_none() {
            self.tabs.get_mut(&tab).expect("checked above").strip_type =
                self.tabs[&input].strip_type;
        }
        self.tabs.get_mut(&input).expect("checked above").outputs.insert(tab);
        let target = self.tabs.get_mut(&tab).expect("checked above");
        if !target.inputs.contains(&input) {
            target.inputs.push(input);
            if !target.frozen {
                self.refresh(tab, view);
            }
        }
        Ok(())
    }

    /// Unlink `input` from `tab` and refresh the tab unless frozen.
    pub fn discard_input(
        &mut self,
        tab: TabId,
        input: TabId,
        view: &mut dyn ViewSink,
    ) -> Result<(), CoreError> {
        if !self.tabs.contains_key(&tab) || !self.tabs.contains_key(&input) {
            return Err(CoreError::NotFound);
        }
        self.tabs.get_mut(&input).expect("checked above").outputs.remove(&tab);
        let target = self.tabs.get_mut(&tab).expect("checked above");
        if target.inputs.contains(&input) {
            target.inputs.retain(|candidate| *candidate != input);
            if !target.frozen {
                self.refresh(tab, view);
            }
        }
        Ok(())
    }

    /// Would wiring `diff -> candidate` let strips flow back into one of
    /// the difference's negative inputs? Walks outputs from `candidate`
    /// itself: the direct edge counts too.
    fn closes_negative_loop(&self, diff: TabId, candidate: TabId) -> bool {
        let negatives: HashSet<TabId> =
            self.tabs[&diff].inputs.iter().skip(1).copied().collect();
        if negatives.is_empty() {
            return false;
        }
        let mut seen: HashSet<TabId> = HashSet::new();
        let mut stack = vec![candidate];
        while let Some(top) = stack.pop() {
            if negatives.contains(&top) {
                return true;
            }
            if seen.insert(top) {
                if let Some(tab) = self.tabs.get(&top) {
                    stack.extend(tab.outputs.iter().copied());
                }
            }
        }
        false
    }

    // ****************************************
    // ** Lifecycle

    /// Close a tab: persist it if it is a dirty `IdOutput`, unlink every
    /// edge (refreshing downstream tabs), deregister and drop its strips.
    pub fn close(&mut self, id: TabId, view: &mut dyn ViewSink) -> Result<(), CoreError> {
        let Some(tab) = self.tabs.get(&id) else {
            return Err(CoreError::NotFound);
        };
        if tab.kind == TabKind::IdOutput && tab.modified {
            let path = tab.path.clone().expect("id output tabs carry a path");
            source::write_id_file(&path, &tab.strips)?;
        }

        let inputs = tab.inputs.clone();
        for input in inputs {
            if let Some(upstream) = self.tabs.get_mut(&input) {
                upstream.outputs.remove(&id);
            }
        }
        self.tabs.get_mut(&id).expect("checked above").inputs.clear();

        let outputs: Vec<TabId> = self.tabs[&id].outputs.iter().copied().collect();
        for output in outputs {
            self.tabs.get_mut(&id).expect("checked above").outputs.remove(&output);
            let frozen = match self.tabs.get_mut(&output) {
                Some(downstream) => {
                    downstream.inputs.retain(|candidate| *candidate != id);
                    downstream.frozen
                }
                None => continue,
            };
            if !frozen {
                self.refresh(output, view);
            }
        }

        let tab = self.tabs.remove(&id).expect("checked above");
        let key = match tab.name {
            Some(name) => TabKey::Name(name),
            None => TabKey::Ordinal(id.0),
        };
        self.registry.remove(&key);
        log::debug!("closed {} tab {id}", tab.kind);
        view.tab_destroyed(id);
        Ok(())
    }

    // ****************************************
    // ** Set algebra

    /// The full set this tab's rule yields right now, before overrides.
    fn recomputed(&self, id: TabId) -> HashSet<Strip> {
        let tab = &self.tabs[&id];
        match tab.kind {
            TabKind::Preset | TabKind::Periodic | TabKind::IdInput | TabKind::Interactive => {
                tab.preset_strips.clone()
            }
            TabKind::Union | TabKind::IdOutput => {
                let mut strips = HashSet::new();
                for input in &tab.inputs {
                    strips.extend(self.tabs[input].strips.iter().cloned());
                }
                strips
            }
            TabKind::Intersection => match tab.inputs.split_first() {
                Some((first, rest)) => {
                    let mut strips = self.tabs[first].strips.clone();
                    for input in rest {
                        strips.retain(|strip| self.tabs[input].strips.contains(strip));
                    }
                    strips
                }
                None => HashSet::new(),
            },
            TabKind::Difference => match tab.inputs.split_first() {
                Some((positive, negatives)) => {
                    let mut strips = self.tabs[positive].strips.clone();
                    for input in negatives {
                        strips.retain(|strip| !self.tabs[input].strips.contains(strip));
                    }
                    strips
                }
                None => HashSet::new(),
            },
        }
    }

    /// The subset of `incoming` this tab's rule admits right now.
    fn allowable(&self, id: TabId, incoming: &HashSet<Strip>) -> HashSet<Strip> {
        let tab = &self.tabs[&id];
        match tab.kind {
            TabKind::Preset | TabKind::Periodic | TabKind::IdInput | TabKind::Interactive => {
                incoming
                    .iter()
                    .filter(|strip| tab.preset_strips.contains(*strip))
                    .cloned()
                    .collect()
            }
            TabKind::Union | TabKind::IdOutput => incoming
                .iter()
                .filter(|strip| {
                    tab.inputs
                        .iter()
                        .any(|input| self.tabs[input].strips.contains(*strip))
                })
                .cloned()
                .collect(),
            TabKind::Intersection => {
                if tab.inputs.is_empty() {
                    return HashSet::new();
                }
                incoming
                    .iter()
                    .filter(|strip| {
                        tab.inputs
                            .iter()
                            .all(|input| self.tabs[input].strips.contains(*strip))
                    })
                    .cloned()
                    .collect()
            }
            TabKind::Difference => match tab.inputs.split_first() {
                Some((positive, negatives)) => incoming
                    .iter()
                    .filter(|strip| {
                        self.tabs[positive].strips.contains(*strip)
                            && !negatives
                                .iter()
                                .any(|input| self.tabs[input].strips.contains(*strip))
                    })
                    .cloned()
                    .collect(),
                None => HashSet::new(),
            },
        }
    }

    /// Recompute the tab's target set, diff it against the current one and
    /// push both deltas downstream. Periodic tabs trim their preset set to
    /// capacity first.
    pub fn refresh(&mut self, id: TabId, view: &mut dyn ViewSink) {
        let Some(tab) = self.tabs.get_mut(&id) else {
            return;
        };
        if tab.kind == TabKind::Periodic {
            if let Some(capacity) = tab.source.and_then(PeriodicSource::capacity) {
                if tab.preset_strips.len() > capacity {
                    let mut ordered: Vec<Strip> = tab.preset_strips.drain().collect();
                    ordered.sort();
                    tab.preset_strips = ordered.split_off(ordered.len() - capacity).into_iter().collect();
                }
            }
        }

        let mut target = self.recomputed(id);
        let tab = &self.tabs[&id];
        for strip in &tab.added {
            target.insert(strip.clone());
        }
        for strip in &tab.deleted {
            target.remove(strip);
        }
        let stale: HashSet<Strip> = tab.strips.difference(&target).cloned().collect();
        self.discard_strips(id, &stale, view);
        self.add_strips(id, &target, view);
    }

    /// Offer `incoming` to the tab. What its rule (or a forced-in
    /// override) admits and it does not already hold is taken, propagated
    /// to non-frozen outputs and, if the tab is visible, displayed in key
    /// order. On a `Difference`, growth of a negative input revokes
    /// previously held strips instead.
    pub fn add_strips(&mut self, id: TabId, incoming: &HashSet<Strip>, view: &mut dyn ViewSink) {
        if incoming.is_empty() || !self.tabs.contains_key(&id) {
            return;
        }
        let mut fresh = self.allowable(id, incoming);
        let tab = &self.tabs[&id];
        for strip in incoming {
            if tab.added.contains(strip) {
                fresh.insert(strip.clone());
            }
        }
        fresh.retain(|strip| !tab.deleted.contains(strip) && !tab.strips.contains(strip));

        let mut revoked: HashSet<Strip> = HashSet::new();
        if tab.kind == TabKind::Difference {
            let held: HashSet<Strip> = incoming.intersection(&tab.strips).cloned().collect();
            if !held.is_empty() {
                let still = self.allowable(id, &held);
                let tab = &self.tabs[&id];
                revoked = held
                    .into_iter()
                    .filter(|strip| !still.contains(strip) && !tab.added.contains(strip))
                    .collect();
            }
        }
        if !revoked.is_empty() {
            self.discard_strips(id, &revoked, view);
        }
        if fresh.is_empty() {
            return;
        }

        let tab = self.tabs.get_mut(&id).expect("checked above");
        for strip in &fresh {
            tab.strips.insert(strip.clone());
        }
        if tab.kind == TabKind::IdOutput {
            tab.modified = true;
        }
        let hidden = tab.hidden;
        let outputs: Vec<TabId> = tab.outputs.iter().copied().collect();
        for output in outputs {
            if self.tabs.get(&output).is_some_and(|downstream| !downstream.frozen) {
                self.add_strips(output, &fresh, view);
            }
        }
        if !hidden {
            let mut shown: Vec<&Strip> = fresh.iter().collect();
            shown.sort();
            for strip in shown {
                view.strip_added(id, strip);
            }
            self.emit_label(id, view);
        }
    }

    /// Withdraw `incoming` from the tab. Strips the rule still admits (or
    /// the user forced in) stay; the rest leave, propagate to non-frozen
    /// outputs and, if the tab is visible, are undisplayed in reverse key
    /// order. On a `Difference`, a shrinking negative input restores
    /// strips instead.
    pub fn discard_strips(&mut self, id: TabId, incoming: &HashSet<Strip>, view: &mut dyn ViewSink) {
        if incoming.is_empty() || !self.tabs.contains_key(&id) {
            return;
        }
        let tab = &self.tabs[&id];

        let mut restored: HashSet<Strip> = HashSet::new();
        if tab.kind == TabKind::Difference {
            let absent: HashSet<Strip> = incoming
                .iter()
                .filter(|strip| !tab.strips.contains(*strip))
                .cloned()
                .collect();
            if !absent.is_empty() {
                restored = self.allowable(id, &absent);
                let tab = &self.tabs[&id];
                restored.retain(|strip| !tab.deleted.contains(strip));
            }
        }

        let tab = &self.tabs[&id];
        let held: HashSet<Strip> = incoming.intersection(&tab.strips).cloned().collect();
        let outgoing: HashSet<Strip> = if held.is_empty() {
            HashSet::new()
        } else {
            let still = self.allowable(id, &held);
            let tab = &self.tabs[&id];
            held.into_iter()
                .filter(|strip| {
                    tab.deleted.contains(strip)
                        || (!still.contains(strip) && !tab.added.contains(strip))
                })
                .collect()
        };

        if !outgoing.is_empty() {
            let tab = self.tabs.get_mut(&id).expect("checked above");
            for strip in &outgoing {
                tab.strips.remove(strip);
            }
            if tab.kind == TabKind::IdOutput {
                tab.modified = true;
            }
            let hidden = tab.hidden;
            let outputs: Vec<TabId> = tab.outputs.iter().copied().collect();
            for output in outputs {
                if self.tabs.get(&output).is_some_and(|downstream| !downstream.frozen) {
                    self.discard_strips(output, &outgoing, view);
                }
            }
            if !hidden {
                let mut gone: Vec<&Strip> = outgoing.iter().collect();
                gone.sort();
                for strip in gone.iter().rev() {
                    view.strip_removed(id, strip);
                }
                self.emit_label(id, view);
            }
        }

        if !restored.is_empty() {
            self.add_strips(id, &restored, view);
        }
    }

    // ****************************************
    // ** Preset feeding

    /// Merge freshly fetched strips into a source tab's preset set.
    pub fn extend_preset(
        &mut self,
        id: TabId,
        strips: impl IntoIterator<Item = Strip>,
    ) -> Result<(), CoreError> {
        let tab = self.tabs.get_mut(&id).ok_or(CoreError::NotFound)?;
        tab.preset_strips.extend(strips);
        Ok(())
    }

    /// Replace a source tab's preset set wholesale.
    pub fn replace_preset(
        &mut self,
        id: TabId,
        strips: impl IntoIterator<Item = Strip>,
    ) -> Result<(), CoreError> {
        let tab = self.tabs.get_mut(&id).ok_or(CoreError::NotFound)?;
        tab.preset_strips = strips.into_iter().collect();
        Ok(())
    }

    // ****************************************
    // ** Overrides

    /// Force strips into the tab regardless of its rule.
    pub fn force_add(
        &mut self,
        id: TabId,
        strips: impl IntoIterator<Item = Strip>,
        view: &mut dyn ViewSink,
    ) -> Result<(), CoreError> {
        let tab = self.tabs.get_mut(&id).ok_or(CoreError::NotFound)?;
        for strip in strips {
            tab.deleted.remove(&strip);
            tab.added.insert(strip);
        }
        self.refresh(id, view);
        Ok(())
    }

    /// Suppress strips from the tab regardless of its rule.
    pub fn suppress(
        &mut self,
        id: TabId,
        strips: impl IntoIterator<Item = Strip>,
        view: &mut dyn ViewSink,
    ) -> Result<(), CoreError> {
        let tab = self.tabs.get_mut(&id).ok_or(CoreError::NotFound)?;
        for strip in strips {
            tab.added.remove(&strip);
            tab.deleted.insert(strip);
        }
        self.refresh(id, view);
        Ok(())
    }

    // ****************************************
    // ** Selection & visibility

    /// Select the tab, as itself or as a complement. Selecting a hidden
    /// tab unhides it.
    pub fn select(
        &mut self,
        id: TabId,
        complement: bool,
        view: &mut dyn ViewSink,
    ) -> Result<(), CoreError> {
        let wanted = if complement {
            Selection::Complement
        } else {
            Selection::Selected
        };
        let tab = self.tabs.get_mut(&id).ok_or(CoreError::NotFound)?;
        if tab.selected != wanted {
            tab.selected = wanted;
            if tab.hidden {
                self.unhide(id, view)?;
            } else {
                self.emit_label(id, view);
            }
        }
        Ok(())
    }

    pub fn unselect(&mut self, id: TabId, view: &mut dyn ViewSink) -> Result<(), CoreError> {
        let tab = self.tabs.get_mut(&id).ok_or(CoreError::NotFound)?;
        if tab.selected != Selection::Unselected {
            tab.selected = Selection::Unselected;
            self.emit_label(id, view);
        }
        Ok(())
    }

    /// Remove the tab's view presence. The strip set stays; the sink just
    /// stops hearing about this tab.
    pub fn hide(&mut self, id: TabId) -> Result<(), CoreError> {
        let tab = self.tabs.get_mut(&id).ok_or(CoreError::NotFound)?;
        tab.hidden = true;
        Ok(())
    }

    /// Restore view presence, re-announcing every current strip in key
    /// order.
    pub fn unhide(&mut self, id: TabId, view: &mut dyn ViewSink) -> Result<(), CoreError> {
        let tab = self.tabs.get_mut(&id).ok_or(CoreError::NotFound)?;
        if tab.hidden {
            tab.hidden = false;
            let mut shown: Vec<Strip> = tab.strips.iter().cloned().collect();
            shown.sort();
            for strip in &shown {
                view.strip_added(id, strip);
            }
            self.emit_label(id, view);
        }
        Ok(())
    }

    /// Defer inbound propagation into this tab.
    pub fn freeze(&mut self, id: TabId, view: &mut dyn ViewSink) -> Result<(), CoreError> {
        let tab = self.tabs.get_mut(&id).ok_or(CoreError::NotFound)?;
        if !tab.frozen {
            tab.frozen = true;
            self.emit_label(id, view);
        }
        Ok(())
    }

    /// Resume propagation and catch up with a refresh.
    pub fn unfreeze(&mut self, id: TabId, view: &mut dyn ViewSink) -> Result<(), CoreError> {
        let tab = self.tabs.get_mut(&id).ok_or(CoreError::NotFound)?;
        if tab.frozen {
            tab.frozen = false;
            self.refresh(id, view);
            self.emit_label(id, view);
        }
        Ok(())
    }

    fn emit_label(&self, id: TabId, view: &mut dyn ViewSink) {
        if let Some(tab) = self.tabs.get(&id) {
            if !tab.hidden {
                view.tab_label_updated(id, tab.label());
            }
        }
    }

    // ****************************************
    // ** Consistency

    /// Verify the edge relation is symmetric and the registry maps every
    /// tab back to itself. A violation here is a [`CoreError::Fatal`].
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        for (id, tab) in &self.tabs {
            for output in &tab.outputs {
                let symmetric = self
                    .tabs
                    .get(output)
                    .is_some_and(|downstream| downstream.inputs.contains(id));
                if !symmetric {
                    return Err(CoreError::Fatal(anyhow::anyhow!(
                        "outputs relation asymmetric: {id} -> {output}"
                    )));
                }
            }
            for input in &tab.inputs {
                let symmetric = self
                    .tabs
                    .get(input)
                    .is_some_and(|upstream| upstream.outputs.contains(id));
                if !symmetric {
                    return Err(CoreError::Fatal(anyhow::anyhow!(
                        "inputs relation asymmetric: {id} <- {input}"
                    )));
                }
            }
            let key = match &tab.name {
                Some(name) => TabKey::Name(name.clone()),
                None => TabKey::Ordinal(id.0),
            };
            if self.registry.get(&key) != Some(id) {
                return Err(CoreError::Fatal(anyhow::anyhow!(
                    "registry entry missing for tab {id}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for TabGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{NullSink, RecordingSink, ViewEvent};
    use crate::strip::StripKey;

    fn opaque_set(keys: &[&str]) -> HashSet<Strip> {
        keys.iter().copied().map(Strip::opaque).collect()
    }

    fn keys(strips: &HashSet<Strip>) -> Vec<String> {
        let mut out: Vec<String> = strips.iter().map(Strip::to_string).collect();
        out.sort();
        out
    }

    /// A preset tab fed directly, standing in for any upstream source.
    fn seeded_preset(graph: &mut TabGraph, view: &mut dyn ViewSink, keys: &[&str]) -> TabId {
        let id = graph.create_preset(StripKind::Opaque, view);
        graph.extend_preset(id, keys.iter().copied().map(Strip::opaque)).unwrap();
        graph.refresh(id, view);
        id
    }

    fn reseed(graph: &mut TabGraph, view: &mut dyn ViewSink, id: TabId, keys: &[&str]) {
        graph.replace_preset(id, keys.iter().copied().map(Strip::opaque)).unwrap();
        graph.refresh(id, view);
    }

    #[test]
    fn union_holds_the_union_and_sheds_lazily() {
        let mut view = RecordingSink::new();
        let mut graph = TabGraph::new();
        let p = seeded_preset(&mut graph, &mut view, &["1", "2"]);
        let q = seeded_preset(&mut graph, &mut view, &["2", "3"]);
        let u = graph.create_union(&mut view);
        graph.add_input(u, p, &mut view).unwrap();
        graph.add_input(u, q, &mut view).unwrap();
        assert_eq!(keys(graph.get(u).unwrap().strips()), ["1", "2", "3"]);

        // "2" leaves Q but survives in P, so the union keeps it silently.
        view.take();
        reseed(&mut graph, &mut view, q, &["3"]);
        assert_eq!(keys(graph.get(u).unwrap().strips()), ["1", "2", "3"]);
        assert!(view
            .events()
            .iter()
            .all(|event| !matches!(event, ViewEvent::StripRemoved { tab, .. } if *tab == u)));

        // Once "2" also leaves P the union sheds it, with one removal event.
        reseed(&mut graph, &mut view, p, &["1"]);
        assert_eq!(keys(graph.get(u).unwrap().strips()), ["1", "3"]);
        let removals = view
            .events()
            .iter()
            .filter(|event| matches!(event, ViewEvent::StripRemoved { tab, .. } if *tab == u))
            .count();
        assert_eq!(removals, 1);
        graph.check_invariants().unwrap();
    }

    #[test]
    fn intersection_requires_every_input() {
        let mut view = NullSink;
        let mut graph = TabGraph::new();
        let a = seeded_preset(&mut graph, &mut view, &["1", "2"]);
        let b = seeded_preset(&mut graph, &mut view, &["2", "3"]);
        let i = graph.create_intersection(&mut view);
        graph.add_input(i, a, &mut view).unwrap();
        graph.add_input(i, b, &mut view).unwrap();
        assert_eq!(keys(graph.get(i).unwrap().strips()), ["2"]);

        // "1" becomes common to both inputs.
        graph.extend_preset(b, [Strip::opaque("1")]).unwrap();
        graph.refresh(b, &mut view);
        assert_eq!(keys(graph.get(i).unwrap().strips()), ["1", "2"]);

        // "2" drops out of one input and therefore out of the intersection.
        reseed(&mut graph, &mut view, a, &["1"]);
        assert_eq!(keys(graph.get(i).unwrap().strips()), ["1"]);
    }

    #[test]
    fn difference_subtracts_and_tracks_negative_inputs() {
        let mut view = RecordingSink::new();
        let mut graph = TabGraph::new();
        let p = seeded_preset(&mut graph, &mut view, &["1", "2", "3"]);
        let q = seeded_preset(&mut graph, &mut view, &["2"]);
        let d = graph.create_difference(&mut view);
        graph.add_input(d, p, &mut view).unwrap();
        graph.add_input(d, q, &mut view).unwrap();
        assert_eq!(keys(graph.get(d).unwrap().strips()), ["1", "3"]);

        // The negative input grows: "3" is revoked from the difference.
        graph.extend_preset(q, [Strip::opaque("3")]).unwrap();
        graph.refresh(q, &mut view);
        assert_eq!(keys(graph.get(d).unwrap().strips()), ["1"]);

        // The negative input shrinks again: both come back.
        reseed(&mut graph, &mut view, q, &[]);
        assert_eq!(keys(graph.get(d).unwrap().strips()), ["1", "2", "3"]);
        graph.check_invariants().unwrap();
    }

    #[test]
    fn difference_refuses_a_negative_loop() {
        let mut view = NullSink;
        let mut graph = TabGraph::new();
        let p = seeded_preset(&mut graph, &mut view, &["1", "2", "3"]);
        let q = graph.create_union(&mut view);
        let q_src = seeded_preset(&mut graph, &mut view, &["2"]);
        graph.add_input(q, q_src, &mut view).unwrap();
        let d = graph.create_difference(&mut view);
        graph.add_input(d, p, &mut view).unwrap();
        graph.add_input(d, q, &mut view).unwrap();
        assert_eq!(keys(graph.get(d).unwrap().strips()), ["1", "3"]);

        // Wiring D into its own negative input is refused outright.
        assert!(matches!(
            graph.add_input(q, d, &mut view),
            Err(CoreError::Cycle)
        ));
        // And so is a longer path that reaches the negative input.
        let relay = graph.create_union(&mut view);
        graph.add_input(q, relay, &mut view).unwrap();
        assert!(matches!(
            graph.add_input(relay, d, &mut view),
            Err(CoreError::Cycle)
        ));
        // No edges were left behind by the refusals.
        graph.check_invariants().unwrap();
        assert!(graph.get(d).unwrap().outputs().is_empty());
    }

    #[test]
    fn source_tabs_refuse_inputs_and_types_must_match() {
        let mut view = NullSink;
        let mut graph = TabGraph::new();
        let preset = graph.create_preset(StripKind::Tweet, &mut view);
        let other = graph.create_preset(StripKind::User, &mut view);
        let union = graph.create_union(&mut view);

        assert!(matches!(
            graph.add_input(preset, other, &mut view),
            Err(CoreError::InputsForbidden(_))
        ));

        graph.add_input(union, preset, &mut view).unwrap();
        assert_eq!(graph.get(union).unwrap().strip_type(), Some(StripKind::Tweet));
        // The union adopted Tweet from its first input; User is refused.
        assert!(matches!(
            graph.add_input(union, other, &mut view),
            Err(CoreError::TypeMismatch { .. })
        ));

        // An opaque union is the top type and takes both.
        let wide = graph.create_union(&mut view);
        let lines = graph.create_interactive(["x".to_string()], &mut view);
        graph.add_input(wide, lines, &mut view).unwrap();
        graph.add_input(wide, preset, &mut view).unwrap();
        graph.add_input(wide, other, &mut view).unwrap();
    }

    #[test]
    fn names_allocate_with_numeric_suffixes() {
        let mut view = NullSink;
        let mut graph = TabGraph::new();
        let a = graph.create_union(&mut view);
        let b = graph.create_union(&mut view);
        let c = graph.create_union(&mut view);
        // Auto-naming already collides: Union, Union2, Union3.
        assert_eq!(graph.get(a).unwrap().name(), Some("Union"));
        assert_eq!(graph.get(b).unwrap().name(), Some("Union2"));
        assert_eq!(graph.get(c).unwrap().name(), Some("Union3"));

        graph.rename(a, Some("Friends"), &mut view).unwrap();
        graph.rename(b, Some("Friends"), &mut view).unwrap();
        assert_eq!(graph.get(a).unwrap().name(), Some("Friends"));
        assert_eq!(graph.get(b).unwrap().name(), Some("Friends2"));

        // A trailing digit run continues counting from itself.
        graph.rename(c, Some("Friends2"), &mut view).unwrap();
        assert_eq!(graph.get(c).unwrap().name(), Some("Friends3"));

        // Mixed names split on the longest trailing run only.
        let d = graph.create_union(&mut view);
        let e = graph.create_union(&mut view);
        graph.rename(d, Some("Foo12bar34"), &mut view).unwrap();
        graph.rename(e, Some("Foo12bar34"), &mut view).unwrap();
        assert_eq!(graph.get(e).unwrap().name(), Some("Foo12bar35"));

        assert_eq!(graph.lookup("Friends"), Some(a));
        assert_eq!(graph.lookup("Friends3"), Some(c));
        graph.check_invariants().unwrap();
    }

    #[test]
    fn renaming_round_trips_through_the_ordinal() {
        let mut view = RecordingSink::new();
        let mut graph = TabGraph::new();
        let tab = graph.create_preset(StripKind::Opaque, &mut view);

        graph.rename(tab, Some("Inbox"), &mut view).unwrap();
        graph.rename(tab, None, &mut view).unwrap();
        assert_eq!(graph.get(tab).unwrap().name(), None);
        assert_eq!(graph.lookup("Inbox"), None);

        graph.rename(tab, Some("Inbox"), &mut view).unwrap();
        assert_eq!(graph.get(tab).unwrap().name(), Some("Inbox"));

        // Keeping one's own name is not a collision.
        graph.rename(tab, Some("Inbox"), &mut view).unwrap();
        assert_eq!(graph.get(tab).unwrap().name(), Some("Inbox"));
        graph.check_invariants().unwrap();
    }

    #[test]
    fn hiding_suppresses_events_and_unhiding_replays_strips() {
        let mut view = RecordingSink::new();
        let mut graph = TabGraph::new();
        let p = seeded_preset(&mut graph, &mut view, &["b", "a"]);

        graph.hide(p).unwrap();
        graph.hide(p).unwrap(); // idempotent
        view.take();

        // Changes while hidden stay silent.
        graph.extend_preset(p, [Strip::opaque("c")]).unwrap();
        graph.refresh(p, &mut view);
        assert!(view.take().is_empty());
        assert_eq!(keys(graph.get(p).unwrap().strips()), ["a", "b", "c"]);

        // Unhiding replays the whole set in key order, no removals.
        graph.unhide(p, &mut view).unwrap();
        let events = view.take();
        let added: Vec<String> = events
            .iter()
            .filter_map(|event| match event {
                ViewEvent::StripAdded { strip, .. } => Some(strip.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(added, ["a", "b", "c"]);
        assert!(!events.iter().any(|event| matches!(event, ViewEvent::StripRemoved { .. })));

        // Unhiding again changes nothing.
        graph.unhide(p, &mut view).unwrap();
        assert!(view.take().is_empty());
    }

    #[test]
    fn frozen_tabs_defer_propagation_until_unfrozen() {
        let mut view = NullSink;
        let mut graph = TabGraph::new();
        let p = seeded_preset(&mut graph, &mut view, &["1"]);
        let u = graph.create_union(&mut view);
        graph.add_input(u, p, &mut view).unwrap();

        graph.freeze(u, &mut view).unwrap();
        graph.freeze(u, &mut view).unwrap(); // idempotent

        graph.extend_preset(p, [Strip::opaque("2")]).unwrap();
        graph.refresh(p, &mut view);
        // The delta did not land while frozen.
        assert_eq!(keys(graph.get(u).unwrap().strips()), ["1"]);

        graph.unfreeze(u, &mut view).unwrap();
        assert_eq!(keys(graph.get(u).unwrap().strips()), ["1", "2"]);
        assert!(!graph.get(u).unwrap().frozen());
    }

    #[test]
    fn selection_updates_labels_and_unhides() {
        let mut view = RecordingSink::new();
        let mut graph = TabGraph::new();
        let p = seeded_preset(&mut graph, &mut view, &["1"]);

        graph.select(p, false, &mut view).unwrap();
        assert_eq!(graph.get(p).unwrap().selected(), Selection::Selected);
        graph.select(p, true, &mut view).unwrap();
        assert_eq!(graph.get(p).unwrap().selected(), Selection::Complement);

        graph.hide(p).unwrap();
        graph.unselect(p, &mut view).unwrap();
        view.take();
        // Selecting a hidden tab unhides it and replays its strip.
        graph.select(p, false, &mut view).unwrap();
        assert!(!graph.get(p).unwrap().hidden());
        assert!(view
            .take()
            .iter()
            .any(|event| matches!(event, ViewEvent::StripAdded { .. })));
    }

    #[test]
    fn forced_and_suppressed_strips_override_the_rule() {
        let mut view = NullSink;
        let mut graph = TabGraph::new();
        let p = seeded_preset(&mut graph, &mut view, &["1", "2"]);
        let u = graph.create_union(&mut view);
        graph.add_input(u, p, &mut view).unwrap();

        graph.force_add(u, [Strip::opaque("9")], &mut view).unwrap();
        graph.suppress(u, [Strip::opaque("2")], &mut view).unwrap();
        assert_eq!(keys(graph.get(u).unwrap().strips()), ["1", "9"]);

        // Upstream churn does not disturb the overrides.
        graph.extend_preset(p, [Strip::opaque("3")]).unwrap();
        graph.refresh(p, &mut view);
        assert_eq!(keys(graph.get(u).unwrap().strips()), ["1", "3", "9"]);
        reseed(&mut graph, &mut view, p, &["2"]);
        assert_eq!(keys(graph.get(u).unwrap().strips()), ["9"]);

        // Lifting the suppression brings "2" back on refresh.
        graph.force_add(u, [Strip::opaque("2")], &mut view).unwrap();
        assert_eq!(keys(graph.get(u).unwrap().strips()), ["2", "9"]);
    }

    #[test]
    fn refresh_on_a_quiescent_tab_is_silent() {
        let mut view = RecordingSink::new();
        let mut graph = TabGraph::new();
        let p = seeded_preset(&mut graph, &mut view, &["1", "2"]);
        let u = graph.create_union(&mut view);
        graph.add_input(u, p, &mut view).unwrap();

        view.take();
        graph.refresh(u, &mut view);
        graph.refresh(p, &mut view);
        assert!(view.take().is_empty());
    }

    #[test]
    fn closing_unlinks_and_refreshes_downstream() {
        let mut view = RecordingSink::new();
        let mut graph = TabGraph::new();
        let p = seeded_preset(&mut graph, &mut view, &["1"]);
        let q = seeded_preset(&mut graph, &mut view, &["2"]);
        let u = graph.create_union(&mut view);
        graph.add_input(u, p, &mut view).unwrap();
        graph.add_input(u, q, &mut view).unwrap();
        assert_eq!(keys(graph.get(u).unwrap().strips()), ["1", "2"]);

        graph.close(q, &mut view).unwrap();
        assert!(!graph.contains(q));
        assert_eq!(keys(graph.get(u).unwrap().strips()), ["1"]);
        assert_eq!(graph.get(u).unwrap().inputs(), &[p]);
        assert!(matches!(graph.close(q, &mut view), Err(CoreError::NotFound)));
        assert!(view
            .events()
            .iter()
            .any(|event| matches!(event, ViewEvent::TabDestroyed(tab) if *tab == q)));
        graph.check_invariants().unwrap();
    }

    #[test]
    fn id_output_persists_on_close_and_id_input_reads_it_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kept-ids");
        let mut view = NullSink;
        let mut graph = TabGraph::new();

        let p = seeded_preset(&mut graph, &mut view, &["zeta", "alpha"]);
        let out = graph.create_id_output(path.clone(), &mut view);
        graph.add_input(out, p, &mut view).unwrap();
        assert!(graph.get(out).unwrap().is_modified());
        graph.close(out, &mut view).unwrap();

        let back = graph.create_id_input(path, &mut view).unwrap();
        assert_eq!(keys(graph.get(back).unwrap().strips()), ["alpha", "zeta"]);
        assert_eq!(
            graph.get(back).unwrap().strips(),
            &opaque_set(&["alpha", "zeta"])
        );
    }

    #[test]
    fn an_untouched_id_output_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never-written");
        let mut view = NullSink;
        let mut graph = TabGraph::new();

        let out = graph.create_id_output(path.clone(), &mut view);
        graph.close(out, &mut view).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn bad_id_input_paths_create_no_tab() {
        let mut view = NullSink;
        let mut graph = TabGraph::new();
        let before = graph.tab_ids().len();
        assert!(graph
            .create_id_input(PathBuf::from("/nonexistent/ids"), &mut view)
            .is_err());
        assert_eq!(graph.tab_ids().len(), before);
    }

    #[test]
    fn periodic_presets_trim_to_capacity_keeping_the_greatest_keys() {
        let mut view = NullSink;
        let mut graph = TabGraph::new();
        let tab = graph.create_periodic(
            PeriodicSource::Timeline(crate::remote::TimelineKind::Public),
            &mut view,
        );
        let tweets = (1..=250u64).map(|id| {
            Strip::tweet(crate::strip::Tweet {
                id,
                user_id: 1,
                screen_name: "s".into(),
                text: "t".into(),
                created_at: String::new(),
                source: "web".into(),
            })
        });
        graph.extend_preset(tab, tweets).unwrap();
        graph.refresh(tab, &mut view);

        let strips = graph.get(tab).unwrap().strips();
        assert_eq!(strips.len(), 200);
        assert!(!strips.contains(&Strip::tweet(crate::strip::Tweet {
            id: 50,
            user_id: 1,
            screen_name: "s".into(),
            text: "t".into(),
            created_at: String::new(),
            source: "web".into(),
        })));
        assert!(strips.iter().any(|strip| strip.key() == &StripKey::TweetId(250)));
    }

    #[test]
    fn derived_chains_propagate_end_to_end() {
        let mut view = NullSink;
        let mut graph = TabGraph::new();
        let p = seeded_preset(&mut graph, &mut view, &["1", "2", "3"]);
        let q = seeded_preset(&mut graph, &mut view, &["3"]);
        let d = graph.create_difference(&mut view);
        graph.add_input(d, p, &mut view).unwrap();
        graph.add_input(d, q, &mut view).unwrap();
        let u = graph.create_union(&mut view);
        graph.add_input(u, d, &mut view).unwrap();
        assert_eq!(keys(graph.get(u).unwrap().strips()), ["1", "2"]);

        reseed(&mut graph, &mut view, p, &["2", "3", "4"]);
        assert_eq!(keys(graph.get(d).unwrap().strips()), ["2", "4"]);
        assert_eq!(keys(graph.get(u).unwrap().strips()), ["2", "4"]);
        graph.check_invariants().unwrap();
    }
}
