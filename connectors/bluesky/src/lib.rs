//! Bluesky social-graph bulk tool
//!
//! Two engines over the AT Protocol graph endpoints:
//!
//! - **Crawler**: cursor-paginated, bounded, optionally filtered collection of
//!   an account's followers or follows ([`crawl`], [`Crawl`]).
//! - **Action queue**: sequential, paced, cancellable follow/unfollow runs with
//!   dry-run support and a cooldown after rate limiting ([`ActionQueue`]).
//!
//! Both engines are generic over [`GraphApi`]; [`XrpcClient`] is the network
//! implementation. [`GraphSession`] holds the crawled records, the view filter
//! and the selection the queue runs against.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod api;
mod client;
mod config;
mod crawler;
mod error;
mod graph;
mod queue;
mod types;

#[cfg(test)]
mod testing;

pub use api::{GraphApi, MAX_PAGE_SIZE, resolve_identity};
pub use client::XrpcClient;
pub use config::{BlueskyConfig, CrawlConfig, QueueConfig, RateLimitInfo};
pub use crawler::{
    Crawl, CrawlProgress, FetchSpec, RecordFilter, StopReason, crawl, resolve_target,
};
pub use error::{BlueskyError, BlueskyResult, CrawlError};
pub use graph::{GraphSession, Source, ViewFilter};
pub use queue::{
    ActionOutcome, ActionQueue, ActionTask, FailureKind, MutationKind, QueueState, RunEvent,
    RunMode, RunStats, RunStatus, RunSummary, SkipReason,
};
pub use types::{
    AccountRecord, Did, Direction, EdgePage, EdgeRef, FOLLOW_COLLECTION, ProfileDetailed, Session,
    ViewerRelationship,
};
