//! AT Protocol XRPC client.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info, instrument};

use crate::{
    api::{GraphApi, MAX_PAGE_SIZE},
    config::{BlueskyConfig, RateLimitInfo},
    error::{BlueskyError, BlueskyResult},
    types::{
        CreateRecordRequest, CreateRecordResponse, CreateSessionRequest, DeleteRecordRequest, Did,
        EdgePage, EdgeRef, FOLLOW_COLLECTION, FollowRecord, FollowersResponse, FollowsResponse,
        ProfileDetailed, ResolveHandleResponse, Session,
    },
};

/// Error body returned by XRPC endpoints.
#[derive(Debug, Default, Deserialize)]
struct XrpcErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// XRPC client for a PDS or entryway.
///
/// Stateless with respect to authentication: every authenticated call takes the
/// caller's [`Session`]. Requests are never retried here; the crawler and the
/// action queue own their failure policies.
#[derive(Debug, Clone)]
pub struct XrpcClient {
    client: Client,
    base_url: String,
}

impl XrpcClient {
    /// Create a new client from configuration.
    pub fn new(config: &BlueskyConfig) -> BlueskyResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("bsky-graph/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.service_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.base_url, nsid)
    }

    /// XRPC query (`GET`). Parameters with `None` values are omitted.
    #[instrument(skip(self, params, session))]
    pub async fn query<T: DeserializeOwned>(
        &self,
        nsid: &str,
        params: &[(&str, Option<String>)],
        session: Option<&Session>,
    ) -> BlueskyResult<T> {
        let query: Vec<(&str, &str)> = params
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (*k, v)))
            .collect();

        debug!(nsid, authenticated = session.is_some(), "Making XRPC query");

        let mut req = self.client.get(self.url(nsid)).query(&query);
        if let Some(session) = session {
            req = req.bearer_auth(&session.access_jwt);
        }

        let response = req.send().await?;
        Self::handle_response(response).await
    }

    /// XRPC procedure (`POST` with a JSON body).
    #[instrument(skip(self, body, session))]
    pub async fn procedure<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        nsid: &str,
        body: &B,
        session: Option<&Session>,
    ) -> BlueskyResult<T> {
        debug!(nsid, authenticated = session.is_some(), "Making XRPC procedure call");

        let mut req = self.client.post(self.url(nsid)).json(body);
        if let Some(session) = session {
            req = req.bearer_auth(&session.access_jwt);
        }

        let response = req.send().await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> BlueskyResult<T> {
        let status = response.status();

        let rate_limit = RateLimitInfo::from_headers(response.headers());
        if rate_limit.is_exhausted() {
            debug!(reset = ?rate_limit.reset, "Rate limit exhausted");
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(BlueskyError::RateLimited {
                retry_after: rate_limit.time_until_reset().map(|d| d.as_secs()),
            });
        }

        let bytes = response.bytes().await?;

        if status.is_success() {
            // Some procedures answer with an empty body.
            let body: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
            return serde_json::from_slice(body).map_err(BlueskyError::from);
        }

        let body: XrpcErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();

        Err(BlueskyError::Api {
            status: status.as_u16(),
            error: body.error,
            message: body
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("API Error: {}", status.as_u16())),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session & profile
    // ─────────────────────────────────────────────────────────────────────────

    /// Log in with a handle (or email) and an app password.
    #[instrument(skip(self, password))]
    pub async fn create_session(&self, identifier: &str, password: &str) -> BlueskyResult<Session> {
        let identifier = identifier.trim().trim_start_matches('@');
        let password = password.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(BlueskyError::Config(
                "both identifier and app password are required".into(),
            ));
        }

        let session: Session = self
            .procedure(
                "com.atproto.server.createSession",
                &CreateSessionRequest {
                    identifier,
                    password,
                },
                None,
            )
            .await?;

        info!(did = %session.did, handle = %session.handle, "Session created");
        Ok(session)
    }

    /// Detailed profile of `actor` (handle or did).
    pub async fn get_profile(&self, session: &Session, actor: &str) -> BlueskyResult<ProfileDetailed> {
        self.query(
            "app.bsky.actor.getProfile",
            &[("actor", Some(actor.to_string()))],
            Some(session),
        )
        .await
    }

    fn page_params(actor: &Did, limit: usize, cursor: Option<&str>) -> [(&'static str, Option<String>); 3] {
        [
            ("actor", Some(actor.to_string())),
            ("limit", Some(limit.clamp(1, MAX_PAGE_SIZE).to_string())),
            ("cursor", cursor.map(String::from)),
        ]
    }
}

#[async_trait]
impl GraphApi for XrpcClient {
    async fn resolve_handle(&self, handle: &str) -> BlueskyResult<Did> {
        let resolved: ResolveHandleResponse = self
            .query(
                "com.atproto.identity.resolveHandle",
                &[("handle", Some(handle.to_string()))],
                None,
            )
            .await
            .map_err(|e| match e {
                BlueskyError::Api {
                    status: 400 | 404,
                    message,
                    ..
                } => BlueskyError::NotFound(message),
                other => other,
            })?;
        Ok(resolved.did)
    }

    async fn list_followers(
        &self,
        session: &Session,
        actor: &Did,
        limit: usize,
        cursor: Option<&str>,
    ) -> BlueskyResult<EdgePage> {
        let resp: FollowersResponse = self
            .query(
                "app.bsky.graph.getFollowers",
                &Self::page_params(actor, limit, cursor),
                Some(session),
            )
            .await?;
        Ok(resp.into())
    }

    async fn list_follows(
        &self,
        session: &Session,
        actor: &Did,
        limit: usize,
        cursor: Option<&str>,
    ) -> BlueskyResult<EdgePage> {
        let resp: FollowsResponse = self
            .query(
                "app.bsky.graph.getFollows",
                &Self::page_params(actor, limit, cursor),
                Some(session),
            )
            .await?;
        Ok(resp.into())
    }

    async fn create_follow(&self, session: &Session, subject: &Did) -> BlueskyResult<EdgeRef> {
        let request = CreateRecordRequest {
            repo: &session.did,
            collection: FOLLOW_COLLECTION,
            record: FollowRecord {
                record_type: FOLLOW_COLLECTION,
                subject,
                created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            },
        };
        let created: CreateRecordResponse = self
            .procedure("com.atproto.repo.createRecord", &request, Some(session))
            .await?;
        Ok(created.uri)
    }

    async fn delete_follow(&self, session: &Session, edge: &EdgeRef) -> BlueskyResult<()> {
        let request = DeleteRecordRequest {
            repo: &session.did,
            collection: FOLLOW_COLLECTION,
            rkey: edge.rkey()?,
        };
        let _: serde::de::IgnoredAny = self
            .procedure("com.atproto.repo.deleteRecord", &request, Some(session))
            .await?;
        Ok(())
    }
}
