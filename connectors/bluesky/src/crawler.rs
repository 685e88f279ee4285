//! Graph crawler: bounded, filterable enumeration of followers / follows.
//!
//! A [`Crawl`] is a pull-based sequence of pages. Each call to
//! [`Crawl::next_page`] issues at most one listing request and reports a
//! [`CrawlProgress`]; once a termination condition is met it yields `None`
//! forever. [`crawl`] drives a crawl to completion and forwards progress to an
//! optional channel.
//!
//! Termination is checked after every page, in this order:
//!
//! 1. the accepted records reached `max`
//! 2. the server returned no cursor
//! 3. the server returned an empty page
//! 4. the total raw records scanned reached the scan ceiling
//!
//! The returned records are always truncated to `max`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    api::{GraphApi, MAX_PAGE_SIZE, resolve_identity},
    config::CrawlConfig,
    error::{BlueskyResult, CrawlError},
    types::{AccountRecord, Did, Direction, Session},
};

/// Predicate applied to every raw record before it is accepted.
#[derive(Clone)]
pub struct RecordFilter {
    name: &'static str,
    predicate: Arc<dyn Fn(&AccountRecord) -> bool + Send + Sync>,
}

impl RecordFilter {
    pub fn new<F>(name: &'static str, predicate: F) -> Self
    where
        F: Fn(&AccountRecord) -> bool + Send + Sync + 'static,
    {
        Self {
            name,
            predicate: Arc::new(predicate),
        }
    }

    /// Accounts that do not follow the acting identity back.
    #[must_use]
    pub fn non_mutual() -> Self {
        Self::new("non_mutual", |record| !record.follows_back())
    }

    #[must_use]
    pub fn matches(&self, record: &AccountRecord) -> bool {
        (self.predicate)(record)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for RecordFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordFilter").field(&self.name).finish()
    }
}

/// Crawl parameters.
#[derive(Debug, Clone)]
pub struct FetchSpec {
    pub actor: Did,
    pub direction: Direction,
    pub max: usize,
    pub filter: Option<RecordFilter>,
    pub page_delay: Duration,
    pub scan_ceiling: usize,
}

impl FetchSpec {
    /// Unfiltered crawl using the default pacing and scan ceiling.
    #[must_use]
    pub fn new(actor: Did, direction: Direction, max: usize) -> Self {
        Self::with_config(actor, direction, max, &CrawlConfig::default())
    }

    #[must_use]
    pub fn with_config(actor: Did, direction: Direction, max: usize, config: &CrawlConfig) -> Self {
        Self {
            actor,
            direction,
            max,
            filter: None,
            page_delay: config.page_delay,
            scan_ceiling: config.scan_ceiling,
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: RecordFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub const fn page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    #[must_use]
    pub const fn scan_ceiling(mut self, ceiling: usize) -> Self {
        self.scan_ceiling = ceiling;
        self
    }
}

/// Emitted after every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrawlProgress {
    /// 1-based page number
    pub page: usize,
    pub accepted_so_far: usize,
    pub accepted_this_page: usize,
    /// Raw records returned by the server so far, accepted or not
    pub total_scanned: usize,
}

/// Why a crawl stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ReachedMax,
    NoCursor,
    EmptyPage,
    ScanCeiling,
    Failed,
}

/// An in-progress crawl.
pub struct Crawl<'a, A: ?Sized> {
    api: &'a A,
    session: &'a Session,
    spec: FetchSpec,
    cursor: Option<String>,
    records: Vec<AccountRecord>,
    scanned: usize,
    pages: usize,
    stopped: Option<StopReason>,
}

impl<'a, A> Crawl<'a, A>
where
    A: GraphApi + ?Sized,
{
    #[must_use]
    pub fn new(api: &'a A, session: &'a Session, spec: FetchSpec) -> Self {
        let stopped = (spec.max == 0).then_some(StopReason::ReachedMax);
        Self {
            api,
            session,
            spec,
            cursor: None,
            records: Vec::new(),
            scanned: 0,
            pages: 0,
            stopped,
        }
    }

    /// Fetch the next page.
    ///
    /// Returns `Ok(None)` once the crawl has terminated. An error ends the crawl;
    /// records accepted before it stay available through [`Crawl::records`].
    pub async fn next_page(&mut self) -> BlueskyResult<Option<CrawlProgress>> {
        if self.stopped.is_some() {
            return Ok(None);
        }

        if self.pages > 0 && !self.spec.page_delay.is_zero() {
            tokio::time::sleep(self.spec.page_delay).await;
        }

        // Filtering shrinks yield unpredictably, so filtered crawls always ask
        // for full pages.
        let limit = if self.spec.filter.is_some() {
            MAX_PAGE_SIZE
        } else {
            MAX_PAGE_SIZE.min(self.spec.max - self.records.len())
        };

        let page = match self
            .api
            .list_edges(
                self.session,
                &self.spec.actor,
                self.spec.direction,
                limit,
                self.cursor.as_deref(),
            )
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.stopped = Some(StopReason::Failed);
                return Err(e);
            }
        };

        self.pages += 1;
        let raw = page.records.len();
        self.scanned += raw;

        let before = self.records.len();
        match &self.spec.filter {
            Some(filter) => self
                .records
                .extend(page.records.into_iter().filter(|r| filter.matches(r))),
            None => self.records.extend(page.records),
        }

        let progress = CrawlProgress {
            page: self.pages,
            accepted_so_far: self.records.len(),
            accepted_this_page: self.records.len() - before,
            total_scanned: self.scanned,
        };
        debug!(
            actor = %self.spec.actor,
            direction = %self.spec.direction,
            page = progress.page,
            limit,
            raw,
            accepted = progress.accepted_this_page,
            total_scanned = progress.total_scanned,
            "Fetched graph page"
        );

        self.cursor = page.cursor;
        self.stopped = if self.records.len() >= self.spec.max {
            Some(StopReason::ReachedMax)
        } else if self.cursor.is_none() {
            Some(StopReason::NoCursor)
        } else if raw == 0 {
            Some(StopReason::EmptyPage)
        } else if self.scanned >= self.spec.scan_ceiling {
            Some(StopReason::ScanCeiling)
        } else {
            None
        };

        if self.stopped.is_some() {
            self.records.truncate(self.spec.max);
        }

        Ok(Some(progress))
    }

    /// Records accepted so far.
    #[must_use]
    pub fn records(&self) -> &[AccountRecord] {
        &self.records
    }

    #[must_use]
    pub const fn stop_reason(&self) -> Option<StopReason> {
        self.stopped
    }

    #[must_use]
    pub const fn total_scanned(&self) -> usize {
        self.scanned
    }

    /// Consume the crawl, returning at most `max` records.
    #[must_use]
    pub fn into_records(mut self) -> Vec<AccountRecord> {
        self.records.truncate(self.spec.max);
        self.records
    }
}

/// Resolve the crawl target before any page is requested.
pub async fn resolve_target<A>(api: &A, handle_or_did: &str) -> Result<Did, CrawlError>
where
    A: GraphApi + ?Sized,
{
    resolve_identity(api, handle_or_did)
        .await
        .map_err(|source| CrawlError::Resolution {
            input: handle_or_did.to_string(),
            source,
        })
}

/// Run a crawl to completion.
///
/// Progress events are sent in page order; a dropped receiver does not stop the
/// crawl.
pub async fn crawl<A>(
    api: &A,
    session: &Session,
    spec: FetchSpec,
    progress: Option<&mpsc::UnboundedSender<CrawlProgress>>,
) -> Result<Vec<AccountRecord>, CrawlError>
where
    A: GraphApi + ?Sized,
{
    info!(
        actor = %spec.actor,
        direction = %spec.direction,
        max = spec.max,
        filter = spec.filter.as_ref().map_or("none", RecordFilter::name),
        "Starting graph crawl"
    );

    let mut crawl = Crawl::new(api, session, spec);
    loop {
        match crawl.next_page().await {
            Ok(Some(event)) => {
                if let Some(tx) = progress {
                    let _ = tx.send(event);
                }
            }
            Ok(None) => break,
            Err(source) => {
                return Err(CrawlError::Transport {
                    source,
                    partial: crawl.into_records(),
                });
            }
        }
    }

    info!(
        records = crawl.records().len(),
        scanned = crawl.total_scanned(),
        reason = ?crawl.stop_reason(),
        "Graph crawl finished"
    );
    Ok(crawl.into_records())
}
