//! AT Protocol record and response types used by the graph engines.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BlueskyError, BlueskyResult};

/// Collection NSID for follow records.
pub const FOLLOW_COLLECTION: &str = "app.bsky.graph.follow";

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Decentralized identifier (`did:plc:...`, `did:web:...`).
///
/// The did is the stable primary key of an account. Handles can change and are
/// never used for addressing or deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Parse a did, rejecting anything without the `did:<method>:<id>` shape.
    pub fn parse(value: impl Into<String>) -> BlueskyResult<Self> {
        let value = value.into();
        let mut parts = value.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("did"), Some(method), Some(id)) if !method.is_empty() && !id.is_empty() => {
                Ok(Self(value))
            }
            _ => Err(BlueskyError::InvalidIdentity(value)),
        }
    }

    /// Whether `value` looks like a did rather than a handle.
    #[must_use]
    pub fn is_did(value: &str) -> bool {
        value.starts_with("did:")
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Did {
    type Error = BlueskyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a follow record: `at://<repo did>/app.bsky.graph.follow/<rkey>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeRef(String);

impl EdgeRef {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Record key, the last path segment of the at-uri.
    pub fn rkey(&self) -> BlueskyResult<&str> {
        match self.0.rsplit('/').next() {
            Some(rkey) if !rkey.is_empty() && self.0.contains('/') => Ok(rkey),
            _ => Err(BlueskyError::InvalidIdentity(format!(
                "edge reference has no record key: {}",
                self.0
            ))),
        }
    }
}

impl fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Authenticated session returned by `com.atproto.server.createSession`.
///
/// Owned by the caller and passed by reference into every authenticated call.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub did: Did,
    pub handle: String,
    pub access_jwt: String,
    #[serde(default)]
    pub refresh_jwt: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("did", &self.did)
            .field("handle", &self.handle)
            .field("access_jwt", &"[REDACTED]")
            .field("refresh_jwt", &self.refresh_jwt.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Accounts
// ─────────────────────────────────────────────────────────────────────────────

/// One endpoint of a follow edge (`app.bsky.actor.defs#profileView`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub did: Did,

    pub handle: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers_count: Option<u64>,

    /// The acting identity's relationship to this account.
    #[serde(default)]
    pub viewer: ViewerRelationship,
}

impl AccountRecord {
    /// Display name if set, otherwise the handle.
    #[must_use]
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.handle)
    }

    #[must_use]
    pub const fn is_followed(&self) -> bool {
        self.viewer.following.is_some()
    }

    #[must_use]
    pub const fn follows_back(&self) -> bool {
        self.viewer.followed_by.is_some()
    }
}

/// Viewer state as reported by the server (`app.bsky.actor.defs#viewerState`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerRelationship {
    /// Follow record created by the acting identity, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following: Option<EdgeRef>,

    /// Follow record created by this account pointing at the acting identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followed_by: Option<EdgeRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<bool>,
}

/// Detailed profile (`app.bsky.actor.defs#profileViewDetailed`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDetailed {
    pub did: Did,
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub follows_count: u64,
    #[serde(default)]
    pub posts_count: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph listing
// ─────────────────────────────────────────────────────────────────────────────

/// Which side of the target's follow graph to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Accounts following the target (`app.bsky.graph.getFollowers`).
    Followers,
    /// Accounts the target follows (`app.bsky.graph.getFollows`).
    Following,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Followers => f.write_str("followers"),
            Self::Following => f.write_str("following"),
        }
    }
}

/// One page of raw edge records.
#[derive(Debug, Clone, Default)]
pub struct EdgePage {
    pub records: Vec<AccountRecord>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FollowersResponse {
    #[serde(default)]
    pub followers: Vec<AccountRecord>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FollowsResponse {
    #[serde(default)]
    pub follows: Vec<AccountRecord>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl From<FollowersResponse> for EdgePage {
    fn from(resp: FollowersResponse) -> Self {
        Self {
            records: resp.followers,
            cursor: resp.cursor.filter(|c| !c.is_empty()),
        }
    }
}

impl From<FollowsResponse> for EdgePage {
    fn from(resp: FollowsResponse) -> Self {
        Self {
            records: resp.follows,
            cursor: resp.cursor.filter(|c| !c.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveHandleResponse {
    pub did: Did,
}

// ─────────────────────────────────────────────────────────────────────────────
// Repo writes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct CreateSessionRequest<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct FollowRecord<'a> {
    #[serde(rename = "$type")]
    pub record_type: &'static str,
    pub subject: &'a Did,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRecordRequest<'a> {
    pub repo: &'a Did,
    pub collection: &'static str,
    pub record: FollowRecord<'a>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRecordResponse {
    pub uri: EdgeRef,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteRecordRequest<'a> {
    pub repo: &'a Did,
    pub collection: &'static str,
    pub rkey: &'a str,
}
