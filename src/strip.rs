//! Strip value types.
//!
//! A strip is an immutable content item: a tweet, a user, or an opaque line
//! of text. Strips are identified by their [`StripKey`] alone — two strips
//! with equal keys are the same strip for all set purposes, whatever payload
//! they carry. Payloads are shared behind an [`Arc`], so cloning a strip is
//! cheap and tabs never own the content they display.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of a strip. Equality, ordering and hashing all go through here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StripKey {
    TweetId(u64),
    UserId(u64),
    Opaque(String),
}

impl fmt::Display for StripKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StripKey::TweetId(id) | StripKey::UserId(id) => write!(f, "{id}"),
            StripKey::Opaque(text) => f.write_str(text),
        }
    }
}

/// The content family a strip (and, by extension, a tab) belongs to.
///
/// `Opaque` is the top type: a tab typed `Opaque` accepts tweet and user
/// inputs alike, while `Tweet` and `User` tabs only accept their own kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StripKind {
    Tweet,
    User,
    Opaque,
}

impl StripKind {
    /// Would a strip of kind `input` be admissible in a tab of kind `self`?
    pub fn accepts(self, input: StripKind) -> bool {
        self == StripKind::Opaque || self == input
    }
}

impl fmt::Display for StripKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StripKind::Tweet => "tweet",
            StripKind::User => "user",
            StripKind::Opaque => "opaque",
        })
    }
}

/// A single status message as returned by the remote API client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: u64,
    pub user_id: u64,
    pub screen_name: String,
    pub text: String,
    /// Creation stamp as the remote reports it, e.g. "Sat May 30 20:25:43 +0000 2009".
    pub created_at: String,
    /// Client the message was posted from.
    pub source: String,
}

/// Snapshot of a user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub screen_name: String,
    pub name: String,
    pub followers_count: u32,
    pub friends_count: u32,
}

#[derive(Debug)]
pub enum StripPayload {
    Tweet(Tweet),
    User(UserProfile),
}

/// An immutable content item with key-only identity.
#[derive(Debug, Clone)]
pub struct Strip {
    key: StripKey,
    payload: Option<Arc<StripPayload>>,
}

impl Strip {
    /// A strip keyed by a raw line of text, as read from an id file.
    pub fn opaque(key: impl Into<String>) -> Self {
        Self {
            key: StripKey::Opaque(key.into()),
            payload: None,
        }
    }

    pub fn tweet(tweet: Tweet) -> Self {
        Self {
            key: StripKey::TweetId(tweet.id),
            payload: Some(Arc::new(StripPayload::Tweet(tweet))),
        }
    }

    pub fn user(profile: UserProfile) -> Self {
        Self {
            key: StripKey::UserId(profile.id),
            payload: Some(Arc::new(StripPayload::User(profile))),
        }
    }

    /// A user strip known only by id (follower lists carry no profiles).
    pub fn user_id(id: u64) -> Self {
        Self {
            key: StripKey::UserId(id),
            payload: None,
        }
    }

    pub fn key(&self) -> &StripKey {
        &self.key
    }

    pub fn kind(&self) -> StripKind {
        match self.key {
            StripKey::TweetId(_) => StripKind::Tweet,
            StripKey::UserId(_) => StripKind::User,
            StripKey::Opaque(_) => StripKind::Opaque,
        }
    }

    pub fn tweet_payload(&self) -> Option<&Tweet> {
        match self.payload.as_deref() {
            Some(StripPayload::Tweet(tweet)) => Some(tweet),
            _ => None,
        }
    }

    pub fn user_payload(&self) -> Option<&UserProfile> {
        match self.payload.as_deref() {
            Some(StripPayload::User(profile)) => Some(profile),
            _ => None,
        }
    }
}

impl PartialEq for Strip {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Strip {}

impl Hash for Strip {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Strip {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Strip {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for Strip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key.fmt(f)
    }
}
