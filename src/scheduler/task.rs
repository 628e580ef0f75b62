//! Task handles: the unit of work the scheduler drives.

use crate::errors::RemoteError;
use crate::runtime::CoreContext;
use std::time::Duration;

/// Identifies a live task inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

/// An interned, opaque lock identity.
///
/// Obtained from [`Scheduler::lock_token`](crate::scheduler::Scheduler::lock_token);
/// the same name always interns to the same token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(pub(crate) u32);

/// What a task hands back at a suspension point.
#[derive(Debug)]
pub enum Step {
    /// Finished. The scheduler releases the task's locks and forgets it.
    Done,
    /// Re-enqueue right away, after other ready tasks.
    RunSoon,
    /// Resume after at least this long.
    After(Duration),
    /// Resume when the rate budget next grants a slot.
    RatePaced,
    /// The step failed. Equivalent to `After(RETRY_BACKOFF)`; the
    /// diagnostic has already been routed through the error channel by the
    /// remote-call decoration.
    Error(RemoteError),
}

/// A suspendable logical task.
///
/// A task makes progress one step at a time; between steps it holds no
/// borrow of anything, so all observable state changes within a step are
/// atomic with respect to other tasks and timers. Long-lived loops are
/// written as small state machines stepping through their phases.
pub trait Task {
    /// Run one step and say how to continue.
    fn step(&mut self, cx: &mut CoreContext) -> Step;

    /// Short label for logs.
    fn name(&self) -> &str {
        "task"
    }
}
