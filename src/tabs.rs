//! Tabs: the reactive set-algebra DAG.
//!
//! A tab is a named collection of strips maintained by a rule — an
//! externally fed set, a periodic reload, or set algebra over other tabs.
//! The [`TabGraph`] owns every tab, keeps the edge relation symmetric and
//! pushes incremental deltas downstream; [`source`] covers externally
//! sourced tabs and the id-file format.

pub mod graph;
pub mod source;
pub mod tab;

pub use graph::TabGraph;
pub use source::PeriodicSource;
pub use tab::{Selection, Tab, TabId, TabKind};
