//! Identifiers used by the presence core

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Separator between the two participant ids of a conversation channel
pub const CHANNEL_SEPARATOR: char = '_';

/// Unique identifier for a live transport session
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new unique connection ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marketplace user identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Declared role of a user on the marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Caregiver,
    Careseeker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caregiver => write!(f, "caregiver"),
            Self::Careseeker => write!(f, "careseeker"),
        }
    }
}

/// Identifier of a conversation channel (room)
///
/// Opaque to the membership tracker. Channels for one-to-one conversations
/// are built with [`ChannelId::between`] so both participants derive the same
/// id without a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Create a channel ID from an arbitrary string
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Channel shared by two participants
    ///
    /// The ids are ordered by their decimal text before joining, which is the
    /// order the mobile and web clients use when they build the same id
    /// locally. `between(a, b) == between(b, a)` for all `a`, `b`.
    #[must_use]
    pub fn between(a: UserId, b: UserId) -> Self {
        let (a, b) = (a.to_string(), b.to_string());
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{first}{CHANNEL_SEPARATOR}{second}"))
    }

    /// Get the channel ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
