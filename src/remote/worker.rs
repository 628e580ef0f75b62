//! Serialized worker for the threaded deployment mode.
//!
//! The whole remote client moves behind a request queue consumed by a
//! single background thread; every request carries its own reply channel
//! and the caller blocks on the answer. From the scheduler's viewpoint the
//! remote stays a synchronous operation — only the thread doing the waiting
//! changes.

use crate::errors::RemoteError;
use crate::remote::{RateLimitStatus, RemoteApi, TimelineKind};
use crate::strip::{Tweet, UserProfile};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

enum Request {
    RateLimit {
        authenticated: bool,
        reply: mpsc::Sender<Result<RateLimitStatus, RemoteError>>,
    },
    FollowersIds {
        reply: mpsc::Sender<Result<Vec<u64>, RemoteError>>,
    },
    FollowingIds {
        reply: mpsc::Sender<Result<Vec<u64>, RemoteError>>,
    },
    UserShow {
        id: u64,
        reply: mpsc::Sender<Result<UserProfile, RemoteError>>,
    },
    Timeline {
        kind: TimelineKind,
        reply: mpsc::Sender<Result<Vec<Tweet>, RemoteError>>,
    },
    SendMessage {
        text: String,
        reply: mpsc::Sender<Result<(), RemoteError>>,
    },
    Quit,
}

/// Handle to the worker thread. Dropping it stops the worker.
pub struct WorkerHandle {
    tx: mpsc::Sender<Request>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn spawn(mut api: Box<dyn RemoteApi + Send>) -> Self {
        let (tx, rx) = mpsc::channel::<Request>();
        let join = thread::Builder::new()
            .name("remote worker".into())
            .spawn(move || {
                while let Ok(request) = rx.recv() {
                    match request {
                        Request::RateLimit {
                            authenticated,
                            reply,
                        } => {
                            let _ = reply.send(api.rate_limit(authenticated));
                        }
                        Request::FollowersIds { reply } => {
                            let _ = reply.send(api.followers_ids());
                        }
                        Request::FollowingIds { reply } => {
                            let _ = reply.send(api.following_ids());
                        }
                        Request::UserShow { id, reply } => {
                            let _ = reply.send(api.user_show(id));
                        }
                        Request::Timeline { kind, reply } => {
                            let _ = reply.send(api.timeline(kind));
                        }
                        Request::SendMessage { text, reply } => {
                            let _ = reply.send(api.send_message(&text));
                        }
                        Request::Quit => break,
                    }
                }
                log::debug!("remote worker exiting");
            })
            .expect("failed to spawn the remote worker thread");

        Self {
            tx,
            join: Some(join),
        }
    }

    fn call<T>(
        &self,
        build: impl FnOnce(mpsc::Sender<Result<T, RemoteError>>) -> Request,
    ) -> Result<T, RemoteError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(build(reply_tx))
            .map_err(|_| RemoteError::WorkerGone)?;
        reply_rx.recv().map_err(|_| RemoteError::WorkerGone)?
    }

    pub fn rate_limit(&self, authenticated: bool) -> Result<RateLimitStatus, RemoteError> {
        self.call(|reply| Request::RateLimit {
            authenticated,
            reply,
        })
    }

    pub fn followers_ids(&self) -> Result<Vec<u64>, RemoteError> {
        self.call(|reply| Request::FollowersIds { reply })
    }

    pub fn following_ids(&self) -> Result<Vec<u64>, RemoteError> {
        self.call(|reply| Request::FollowingIds { reply })
    }

    pub fn user_show(&self, id: u64) -> Result<UserProfile, RemoteError> {
        self.call(|reply| Request::UserShow { id, reply })
    }

    pub fn timeline(&self, kind: TimelineKind) -> Result<Vec<Tweet>, RemoteError> {
        self.call(|reply| Request::Timeline { kind, reply })
    }

    pub fn send_message(&self, text: &str) -> Result<(), RemoteError> {
        self.call(|reply| Request::SendMessage {
            text: text.to_owned(),
            reply,
        })
    }

    /// Ask the worker to stop and wait for it.
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(Request::Quit);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
