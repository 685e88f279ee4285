//! In-memory `GraphApi` used by the engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{
    api::GraphApi,
    error::{BlueskyError, BlueskyResult},
    types::{AccountRecord, Did, Direction, EdgePage, EdgeRef, Session, ViewerRelationship},
};

/// A request observed by [`ScriptedApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List {
        direction: Direction,
        actor: Did,
        limit: usize,
        cursor: Option<String>,
    },
    CreateFollow {
        subject: Did,
    },
    DeleteFollow {
        edge: EdgeRef,
    },
}

#[derive(Default)]
struct Inner {
    handles: HashMap<String, Did>,
    resolved: Vec<String>,
    pages: VecDeque<BlueskyResult<EdgePage>>,
    graph: Vec<AccountRecord>,
    mutation_failures: HashMap<usize, BlueskyError>,
    mutation_count: usize,
    calls: Vec<(Instant, Call)>,
}

/// Scripted graph API.
///
/// Listing calls pop scripted pages first and fall back to serving `graph` with
/// offset cursors. Mutations succeed unless a failure was scripted for that
/// mutation call number.
#[derive(Default)]
pub struct ScriptedApi {
    inner: Mutex<Inner>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handle(self, handle: &str, did: &str) -> Self {
        self.lock().handles.insert(handle.into(), did_of(did));
        self
    }

    pub fn with_page(self, records: Vec<AccountRecord>, cursor: Option<&str>) -> Self {
        self.lock().pages.push_back(Ok(EdgePage {
            records,
            cursor: cursor.map(String::from),
        }));
        self
    }

    pub fn with_page_error(self, err: BlueskyError) -> Self {
        self.lock().pages.push_back(Err(err));
        self
    }

    pub fn with_graph(self, graph: Vec<AccountRecord>) -> Self {
        self.lock().graph = graph;
        self
    }

    /// Fail the `n`th (zero-based) create/delete call.
    pub fn with_mutation_failure(self, n: usize, err: BlueskyError) -> Self {
        self.lock().mutation_failures.insert(n, err);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.lock().calls.clone()
    }

    pub fn list_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::List { .. }))
            .collect()
    }

    pub fn mutation_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::List { .. }))
            .collect()
    }

    pub fn resolved_handles(&self) -> Vec<String> {
        self.lock().resolved.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn list(
        &self,
        direction: Direction,
        actor: &Did,
        limit: usize,
        cursor: Option<&str>,
    ) -> BlueskyResult<EdgePage> {
        let mut inner = self.lock();
        inner.calls.push((
            Instant::now(),
            Call::List {
                direction,
                actor: actor.clone(),
                limit,
                cursor: cursor.map(String::from),
            },
        ));

        if let Some(page) = inner.pages.pop_front() {
            return page;
        }

        let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (offset + limit).min(inner.graph.len());
        let records = inner.graph.get(offset..end).unwrap_or_default().to_vec();
        let cursor = (end < inner.graph.len()).then(|| end.to_string());
        Ok(EdgePage { records, cursor })
    }

    fn mutate(&self, call: Call) -> BlueskyResult<usize> {
        let mut inner = self.lock();
        inner.calls.push((Instant::now(), call));
        let n = inner.mutation_count;
        inner.mutation_count += 1;
        match inner.mutation_failures.remove(&n) {
            Some(err) => Err(err),
            None => Ok(n),
        }
    }
}

#[async_trait]
impl GraphApi for ScriptedApi {
    async fn resolve_handle(&self, handle: &str) -> BlueskyResult<Did> {
        let mut inner = self.lock();
        inner.resolved.push(handle.to_string());
        inner
            .handles
            .get(handle)
            .cloned()
            .ok_or_else(|| BlueskyError::NotFound(format!("Unable to resolve handle: {handle}")))
    }

    async fn list_followers(
        &self,
        _session: &Session,
        actor: &Did,
        limit: usize,
        cursor: Option<&str>,
    ) -> BlueskyResult<EdgePage> {
        self.list(Direction::Followers, actor, limit, cursor)
    }

    async fn list_follows(
        &self,
        _session: &Session,
        actor: &Did,
        limit: usize,
        cursor: Option<&str>,
    ) -> BlueskyResult<EdgePage> {
        self.list(Direction::Following, actor, limit, cursor)
    }

    async fn create_follow(&self, session: &Session, subject: &Did) -> BlueskyResult<EdgeRef> {
        let n = self.mutate(Call::CreateFollow {
            subject: subject.clone(),
        })?;
        Ok(EdgeRef::new(format!(
            "at://{}/app.bsky.graph.follow/rk{n}",
            session.did
        )))
    }

    async fn delete_follow(&self, _session: &Session, edge: &EdgeRef) -> BlueskyResult<()> {
        self.mutate(Call::DeleteFollow { edge: edge.clone() })?;
        Ok(())
    }
}

pub fn did_of(s: &str) -> Did {
    Did::parse(s).unwrap()
}

pub fn session() -> Session {
    Session {
        did: did_of("did:plc:me"),
        handle: "me.bsky.social".into(),
        access_jwt: "access".into(),
        refresh_jwt: None,
    }
}

/// Account `did:plc:<name>` with no viewer relationship.
pub fn account(name: &str) -> AccountRecord {
    AccountRecord {
        did: did_of(&format!("did:plc:{name}")),
        handle: format!("{name}.bsky.social"),
        display_name: None,
        avatar: None,
        description: None,
        followers_count: None,
        viewer: ViewerRelationship::default(),
    }
}

/// Account already followed by the session identity.
pub fn followed(name: &str) -> AccountRecord {
    let mut record = account(name);
    record.viewer.following = Some(EdgeRef::new(format!(
        "at://did:plc:me/app.bsky.graph.follow/{name}"
    )));
    record
}

/// Account following the session identity back.
pub fn follower(name: &str) -> AccountRecord {
    let mut record = account(name);
    record.viewer.followed_by = Some(EdgeRef::new(format!(
        "at://did:plc:{name}/app.bsky.graph.follow/me"
    )));
    record
}

pub fn rate_limited() -> BlueskyError {
    BlueskyError::RateLimited { retry_after: None }
}
