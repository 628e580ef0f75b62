#![forbid(unsafe_code)]

//! # TweeTabs Core
//!
//! The concurrency and dataflow core of a tabbed social-feed reader:
//! a single-threaded cooperative scheduler pacing work against a remote
//! rate budget, and a reactive set-algebra DAG of tabs over immutable
//! content strips.
//!
//! ## Quick start
//!
//! ```rust
//! use tweetabs_core::prelude::*;
//! use tweetabs_core::remote::{FixedRemote, TimelineKind};
//! use tweetabs_core::view::RecordingSink;
//!
//! # fn main() -> Result<(), CoreError> {
//! let remote = FixedRemote::new();
//! let sink = RecordingSink::new();
//! let mut runtime = Runtime::new(
//!     CoreConfig::default(),
//!     Box::new(remote),
//!     Box::new(sink.clone()),
//! );
//! runtime.start();
//!
//! let friends = runtime.create_periodic(PeriodicSource::Timeline(TimelineKind::Friends));
//! let replies = runtime.create_periodic(PeriodicSource::Timeline(TimelineKind::Replies));
//! let both = runtime.create_union(&[friends, replies])?;
//! runtime.set_name(both, Some("Everything"))?;
//!
//! // Drive the scheduler from your event loop:
//! let _next = runtime.next_wakeup();
//! runtime.run_due();
//! # Ok(()) }
//! ```
//!
//! ## Concepts
//! - [`Runtime`] — the main entry point; owns the scheduler and everything
//!   tasks touch
//! - [`Strip`](strip::Strip) — an immutable content item with key-only
//!   identity
//! - [`TabGraph`](tabs::TabGraph) — tabs composed by set algebra, with
//!   incremental delta propagation
//! - [`RemoteApi`](remote::RemoteApi) — the capability the core consumes
//! - [`ViewSink`](view::ViewSink) — the capability the core produces
//!   events into
//!
//! ## Modules
//! - [`runtime`] — the assembled core and its built-in tasks
//! - [`scheduler`] — cooperative scheduling: delay queue, rate-paced bag,
//!   lock table
//! - [`tabs`] — the tab DAG: registry, wiring, set-algebra propagation
//! - [`rate`] — the rate budget and its Fibonacci delta table
//! - [`strip`] — strip value types and remote payloads
//! - [`remote`] — the remote capability, canned client and worker mode
//! - [`view`] — view sink trait plus null and recording sinks
//! - [`clock`] — monotonic and virtual time sources

pub mod clock;
pub mod config;
pub mod errors;
pub mod rate;
pub mod remote;
pub mod runtime;
pub mod scheduler;
pub mod strip;
pub mod tabs;
pub mod view;

pub use config::CoreConfig;
pub use errors::{CoreError, RemoteError};
pub use runtime::{CoreContext, Runtime};
pub use strip::{Strip, StripKey, StripKind};
pub use tabs::{PeriodicSource, Selection, TabId, TabKind};

pub mod prelude {
    pub use crate::{
        CoreConfig, CoreError, PeriodicSource, Runtime, Strip, StripKey, StripKind, TabId,
    };
}
