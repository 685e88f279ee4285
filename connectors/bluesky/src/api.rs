//! The protocol surface consumed by the crawler and the action queue.

use async_trait::async_trait;

use crate::{
    error::{BlueskyError, BlueskyResult},
    types::{Did, Direction, EdgePage, EdgeRef, Session},
};

/// Largest page the graph listing endpoints accept.
pub const MAX_PAGE_SIZE: usize = 100;

/// Authenticated graph reads and follow-record writes.
///
/// `XrpcClient` is the network implementation; tests substitute scripted fakes.
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// Resolve a handle to its did. Fails with `NotFound` when unresolvable.
    async fn resolve_handle(&self, handle: &str) -> BlueskyResult<Did>;

    /// One page of accounts following `actor`.
    async fn list_followers(
        &self,
        session: &Session,
        actor: &Did,
        limit: usize,
        cursor: Option<&str>,
    ) -> BlueskyResult<EdgePage>;

    /// One page of accounts `actor` follows.
    async fn list_follows(
        &self,
        session: &Session,
        actor: &Did,
        limit: usize,
        cursor: Option<&str>,
    ) -> BlueskyResult<EdgePage>;

    /// Create a follow record from the session identity to `subject`.
    async fn create_follow(&self, session: &Session, subject: &Did) -> BlueskyResult<EdgeRef>;

    /// Delete a follow record owned by the session identity.
    async fn delete_follow(&self, session: &Session, edge: &EdgeRef) -> BlueskyResult<()>;

    /// Dispatch to the listing endpoint for `direction`.
    async fn list_edges(
        &self,
        session: &Session,
        actor: &Did,
        direction: Direction,
        limit: usize,
        cursor: Option<&str>,
    ) -> BlueskyResult<EdgePage> {
        match direction {
            Direction::Followers => self.list_followers(session, actor, limit, cursor).await,
            Direction::Following => self.list_follows(session, actor, limit, cursor).await,
        }
    }
}

/// Turn a handle or did into a canonical did.
///
/// Strings starting with `did:` are validated and returned without a network call;
/// anything else has whitespace and a leading `@` stripped and is resolved.
pub async fn resolve_identity<A>(api: &A, handle_or_did: &str) -> BlueskyResult<Did>
where
    A: GraphApi + ?Sized,
{
    let input = handle_or_did.trim();
    if Did::is_did(input) {
        return Did::parse(input);
    }

    let handle = input.trim_start_matches('@');
    if handle.is_empty() {
        return Err(BlueskyError::NotFound(format!(
            "Unable to resolve handle: {handle_or_did}"
        )));
    }

    api.resolve_handle(handle).await
}
