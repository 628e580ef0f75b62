//! Remote API capability consumed by the core.
//!
//! The core never speaks HTTP or JSON. It consumes a [`RemoteApi`]: a small
//! set of coarse RPCs returning typed results or a [`RemoteError`].
//! Marshalling, transport and authentication mechanics are the client's
//! concern.
//!
//! [`RemoteClient`] wraps the capability in one of two deployment modes:
//! direct (calls run inline on the scheduler thread) or threaded (calls are
//! serialized through a single background worker, see [`worker`]).

pub mod worker;

use crate::errors::RemoteError;
use crate::strip::{Tweet, UserProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Which timeline a periodic tab reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimelineKind {
    Public,
    Friends,
    User,
    Replies,
    Direct,
    DirectSent,
}

impl TimelineKind {
    /// Busy-line text shown while the call is in flight.
    pub fn busy_message(self) -> &'static str {
        match self {
            TimelineKind::Public => "loading public timeline",
            TimelineKind::Friends => "loading friends timeline",
            TimelineKind::User => "loading user timeline",
            TimelineKind::Replies => "loading replies timeline",
            TimelineKind::Direct => "loading direct timeline",
            TimelineKind::DirectSent => "loading direct sent timeline",
        }
    }
}

/// Answer to a rate-limit probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub remaining_hits: i64,
    pub hourly_limit: i64,
}

/// The remote capability. Every operation either answers or fails with a
/// [`RemoteError`]; the core retries on its own schedule.
pub trait RemoteApi {
    fn rate_limit(&mut self, authenticated: bool) -> Result<RateLimitStatus, RemoteError>;

    fn followers_ids(&mut self) -> Result<Vec<u64>, RemoteError>;

    fn following_ids(&mut self) -> Result<Vec<u64>, RemoteError>;

    fn user_show(&mut self, id: u64) -> Result<UserProfile, RemoteError>;

    fn timeline(&mut self, kind: TimelineKind) -> Result<Vec<Tweet>, RemoteError>;

    fn send_message(&mut self, text: &str) -> Result<(), RemoteError>;
}

#[derive(Debug)]
struct FixedState {
    rate: RateLimitStatus,
    followers: Vec<u64>,
    following: Vec<u64>,
    users: HashMap<u64, UserProfile>,
    timelines: HashMap<TimelineKind, Vec<Tweet>>,
    sent: Vec<String>,
    fail_next: Option<RemoteError>,
}

impl Default for FixedState {
    fn default() -> Self {
        Self {
            rate: RateLimitStatus {
                remaining_hits: 100,
                hourly_limit: 100,
            },
            followers: Vec::new(),
            following: Vec::new(),
            users: HashMap::new(),
            timelines: HashMap::new(),
            sent: Vec::new(),
            fail_next: None,
        }
    }
}

/// A canned in-memory [`RemoteApi`].
///
/// Serves whatever it was fed and records what was sent. Useful offline, in
/// examples and in tests; clones share state, so a test can keep one handle
/// while the runtime owns the other.
#[derive(Debug, Clone, Default)]
pub struct FixedRemote {
    state: Arc<Mutex<FixedState>>,
}

impl FixedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate_limit(&self, status: RateLimitStatus) {
        self.state.lock().unwrap().rate = status;
    }

    pub fn set_timeline(&self, kind: TimelineKind, tweets: Vec<Tweet>) {
        self.state.lock().unwrap().timelines.insert(kind, tweets);
    }

    pub fn set_followers(&self, ids: Vec<u64>) {
        self.state.lock().unwrap().followers = ids;
    }

    pub fn set_following(&self, ids: Vec<u64>) {
        self.state.lock().unwrap().following = ids;
    }

    pub fn insert_user(&self, profile: UserProfile) {
        self.state.lock().unwrap().users.insert(profile.id, profile);
    }

    /// Make the next call fail with `error`, then recover.
    pub fn fail_next(&self, error: RemoteError) {
        self.state.lock().unwrap().fail_next = Some(error);
    }

    /// Messages sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }

    fn checked<T>(&self, read: impl FnOnce(&mut FixedState) -> Result<T, RemoteError>) -> Result<T, RemoteError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        read(&mut state)
    }
}

impl RemoteApi for FixedRemote {
    fn rate_limit(&mut self, _authenticated: bool) -> Result<RateLimitStatus, RemoteError> {
        self.checked(|state| Ok(state.rate))
    }

    fn followers_ids(&mut self) -> Result<Vec<u64>, RemoteError> {
        self.checked(|state| Ok(state.followers.clone()))
    }

    fn following_ids(&mut self) -> Result<Vec<u64>, RemoteError> {
        self.checked(|state| Ok(state.following.clone()))
    }

    fn user_show(&mut self, id: u64) -> Result<UserProfile, RemoteError> {
        self.checked(|state| {
            state
                .users
                .get(&id)
                .cloned()
                .ok_or_else(|| RemoteError::Protocol(format!("unknown user id {id}")))
        })
    }

    fn timeline(&mut self, kind: TimelineKind) -> Result<Vec<Tweet>, RemoteError> {
        self.checked(|state| Ok(state.timelines.get(&kind).cloned().unwrap_or_default()))
    }

    fn send_message(&mut self, text: &str) -> Result<(), RemoteError> {
        self.checked(|state| {
            state.sent.push(text.to_owned());
            Ok(())
        })
    }
}

/// The remote capability in its deployment mode.
pub enum RemoteClient {
    /// Calls run inline on the scheduler thread.
    Direct(Box<dyn RemoteApi>),
    /// Calls are serialized through one background worker thread.
    Threaded(worker::WorkerHandle),
}

impl RemoteClient {
    pub fn direct(api: Box<dyn RemoteApi>) -> Self {
        RemoteClient::Direct(api)
    }

    pub fn threaded(api: Box<dyn RemoteApi + Send>) -> Self {
        RemoteClient::Threaded(worker::WorkerHandle::spawn(api))
    }

    pub fn rate_limit(&mut self, authenticated: bool) -> Result<RateLimitStatus, RemoteError> {
        match self {
            RemoteClient::Direct(api) => api.rate_limit(authenticated),
            RemoteClient::Threaded(handle) => handle.rate_limit(authenticated),
        }
    }

    pub fn followers_ids(&mut self) -> Result<Vec<u64>, RemoteError> {
        match self {
            RemoteClient::Direct(api) => api.followers_ids(),
            RemoteClient::Threaded(handle) => handle.followers_ids(),
        }
    }

    pub fn following_ids(&mut self) -> Result<Vec<u64>, RemoteError> {
        match self {
            RemoteClient::Direct(api) => api.following_ids(),
            RemoteClient::Threaded(handle) => handle.following_ids(),
        }
    }

    pub fn user_show(&mut self, id: u64) -> Result<UserProfile, RemoteError> {
        match self {
            RemoteClient::Direct(api) => api.user_show(id),
            RemoteClient::Threaded(handle) => handle.user_show(id),
        }
    }

    pub fn timeline(&mut self, kind: TimelineKind) -> Result<Vec<Tweet>, RemoteError> {
        match self {
            RemoteClient::Direct(api) => api.timeline(kind),
            RemoteClient::Threaded(handle) => handle.timeline(kind),
        }
    }

    pub fn send_message(&mut self, text: &str) -> Result<(), RemoteError> {
        match self {
            RemoteClient::Direct(api) => api.send_message(text),
            RemoteClient::Threaded(handle) => handle.send_message(text),
        }
    }

    /// Stop the worker thread, if any. Direct clients have nothing to stop.
    pub fn shutdown(&mut self) {
        if let RemoteClient::Threaded(handle) = self {
            handle.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_remote_serves_canned_data() {
        let remote = FixedRemote::new();
        remote.set_followers(vec![1, 2, 3]);

        let mut api = remote.clone();
        assert_eq!(api.followers_ids().unwrap(), vec![1, 2, 3]);
        assert_eq!(api.timeline(TimelineKind::Public).unwrap(), vec![]);

        api.send_message("hello").unwrap();
        assert_eq!(remote.sent(), vec!["hello".to_string()]);
    }

    #[test]
    fn fixed_remote_fails_once_then_recovers() {
        let remote = FixedRemote::new();
        remote.fail_next(RemoteError::Transport("connection reset".into()));

        let mut api = remote.clone();
        assert!(matches!(
            api.followers_ids(),
            Err(RemoteError::Transport(_))
        ));
        assert_eq!(api.followers_ids().unwrap(), Vec::<u64>::new());
    }

    #[test]
    fn unknown_user_is_a_protocol_error() {
        let mut api = FixedRemote::new();
        assert!(matches!(api.user_show(9), Err(RemoteError::Protocol(_))));
    }
}
