use crate::strip::StripKind;

/// Failure reported by the remote API layer.
///
/// Remote errors are non-fatal: the owning task retries after a backoff and
/// the diagnostic is surfaced on the view sink's error line.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error("remote worker is gone")]
    WorkerGone,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{input} is not made of {wanted} strips")]
    TypeMismatch { input: String, wanted: StripKind },

    #[error("negative loop in tab plumbing")]
    Cycle,

    #[error("{0} does not take inputs")]
    InputsForbidden(String),

    #[error("no such tab")]
    NotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invariant violation. Not recoverable; the run loop stops cleanly.
    #[error("invariant violated: {0}")]
    Fatal(anyhow::Error),
}
