//! Action queue: sequential, paced, cancellable follow / unfollow runs.
//!
//! Tasks are processed strictly one at a time. For every task the queue
//! checks for cancellation, skips tasks whose target is already in the wanted
//! state, performs the mutation (unless dry-run), syncs the caller's records,
//! and emits a [`RunEvent::Task`]. A rate-limited mutation is recorded as
//! failed and followed by a fixed cooldown; it is not retried. Dry runs take
//! every decision and every pause a live run would, without mutating anything.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    api::GraphApi,
    config::QueueConfig,
    error::BlueskyError,
    graph::GraphSession,
    types::{AccountRecord, Did, Session},
};

/// Follow-graph mutation applied by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Follow,
    Unfollow,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Follow => f.write_str("follow"),
            Self::Unfollow => f.write_str("unfollow"),
        }
    }
}

/// One queued mutation.
#[derive(Debug, Clone)]
pub struct ActionTask {
    pub did: Did,
    pub kind: MutationKind,
    /// Record the task was built from. Only consulted when the graph session
    /// no longer holds the did.
    pub snapshot: Option<AccountRecord>,
}

impl ActionTask {
    #[must_use]
    pub const fn follow(did: Did) -> Self {
        Self {
            did,
            kind: MutationKind::Follow,
            snapshot: None,
        }
    }

    #[must_use]
    pub const fn unfollow(did: Did) -> Self {
        Self {
            did,
            kind: MutationKind::Unfollow,
            snapshot: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyFollowing,
    NotFollowing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyFollowing => f.write_str("already following"),
            Self::NotFollowing => f.write_str("not following"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    Mutation,
}

/// Terminal result of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Succeeded,
    Skipped { reason: SkipReason },
    Failed { kind: FailureKind, message: String },
}

impl ActionOutcome {
    fn from_error(err: &BlueskyError) -> Self {
        let kind = if err.is_rate_limited() {
            FailureKind::RateLimited
        } else {
            FailureKind::Mutation
        };
        Self::Failed {
            kind,
            message: err.to_string(),
        }
    }

    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                kind: FailureKind::RateLimited,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunStats {
    fn record(&mut self, outcome: &ActionOutcome) {
        match outcome {
            ActionOutcome::Succeeded => self.succeeded += 1,
            ActionOutcome::Skipped { .. } => self.skipped += 1,
            ActionOutcome::Failed { .. } => self.failed += 1,
        }
    }

    #[must_use]
    pub const fn processed(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub stats: RunStats,
    pub total: usize,
    pub dry_run: bool,
}

/// Emitted in task order while a run progresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        total: usize,
        dry_run: bool,
    },
    Task {
        index: usize,
        total: usize,
        did: Did,
        handle: String,
        kind: MutationKind,
        #[serde(flatten)]
        outcome: ActionOutcome,
    },
    Finished(RunSummary),
}

/// Run options.
#[derive(Debug, Clone)]
pub struct RunMode {
    /// Take every decision and pause, but send no mutation.
    pub dry_run: bool,
    /// Delay between consecutive tasks.
    pub pace: Duration,
    /// Pause after a rate-limited mutation.
    pub rate_limit_cooldown: Duration,
}

impl RunMode {
    #[must_use]
    pub fn from_config(config: &QueueConfig, dry_run: bool) -> Self {
        Self {
            dry_run,
            pace: config.pace,
            rate_limit_cooldown: config.rate_limit_cooldown,
        }
    }

    #[must_use]
    pub const fn pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }
}

impl Default for RunMode {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default(), false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Sequential executor for follow / unfollow batches.
///
/// `run` borrows the queue mutably, so one queue never has two active runs.
#[derive(Debug)]
pub struct ActionQueue {
    state: QueueState,
    cancel: CancellationToken,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: QueueState::Idle,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> QueueState {
        self.state
    }

    /// Token that stops the current (or next) run at the next task boundary.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Execute `tasks` in order.
    ///
    /// A cancellation left over from a previous run is cleared first, so tokens
    /// must be taken from [`ActionQueue::cancellation_token`] after a cancelled
    /// run ends.
    pub async fn run<A>(
        &mut self,
        api: &A,
        session: &Session,
        graph: &mut GraphSession,
        tasks: Vec<ActionTask>,
        mode: &RunMode,
        events: Option<&mpsc::UnboundedSender<RunEvent>>,
    ) -> RunSummary
    where
        A: GraphApi + ?Sized,
    {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.state = QueueState::Running;

        let total = tasks.len();
        let emit = |event: RunEvent| {
            if let Some(tx) = events {
                let _ = tx.send(event);
            }
        };

        info!(total, dry_run = mode.dry_run, "Starting action queue");
        emit(RunEvent::Started {
            total,
            dry_run: mode.dry_run,
        });

        let mut stats = RunStats::default();
        let mut status = RunStatus::Completed;

        for (index, task) in tasks.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(processed = index, total, "Action queue aborted by user");
                status = RunStatus::Cancelled;
                break;
            }

            let handle = graph
                .record(&task.did)
                .or(task.snapshot.as_ref())
                .map_or_else(|| task.did.to_string(), |r| r.handle.clone());

            let outcome = execute(api, session, graph, &task, mode.dry_run).await;
            stats.record(&outcome);

            match &outcome {
                ActionOutcome::Succeeded => {
                    info!(index, did = %task.did, handle = %handle, kind = %task.kind, "Task succeeded");
                }
                ActionOutcome::Skipped { reason } => {
                    info!(index, did = %task.did, handle = %handle, reason = %reason, "Task skipped");
                }
                ActionOutcome::Failed { message, .. } => {
                    warn!(index, did = %task.did, handle = %handle, error = %message, "Task failed");
                }
            }

            let rate_limited = outcome.is_rate_limited();
            emit(RunEvent::Task {
                index,
                total,
                did: task.did,
                handle,
                kind: task.kind,
                outcome,
            });

            if rate_limited {
                warn!(
                    cooldown_ms = mode.rate_limit_cooldown.as_millis(),
                    "Rate limited, pausing before next task"
                );
                self.pause(mode.rate_limit_cooldown).await;
            }

            if index + 1 < total {
                self.pause(mode.pace).await;
            }
        }

        self.state = match status {
            RunStatus::Completed => QueueState::Completed,
            RunStatus::Cancelled => QueueState::Cancelled,
        };

        let summary = RunSummary {
            status,
            stats,
            total,
            dry_run: mode.dry_run,
        };
        info!(
            status = ?summary.status,
            succeeded = stats.succeeded,
            skipped = stats.skipped,
            failed = stats.failed,
            "Action queue finished"
        );
        emit(RunEvent::Finished(summary.clone()));
        summary
    }

    /// Sleep for `duration`, waking early if the run is cancelled.
    async fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = self.cancel.cancelled() => {}
        }
    }
}

/// Guard, mutate and sync a single task.
async fn execute<A>(
    api: &A,
    session: &Session,
    graph: &mut GraphSession,
    task: &ActionTask,
    dry_run: bool,
) -> ActionOutcome
where
    A: GraphApi + ?Sized,
{
    // The guard reads the record as it is now, so earlier tasks in the same run
    // are visible to later duplicates.
    let current = graph.record(&task.did).or(task.snapshot.as_ref());

    match task.kind {
        MutationKind::Follow => {
            if current.is_some_and(AccountRecord::is_followed) {
                return ActionOutcome::Skipped {
                    reason: SkipReason::AlreadyFollowing,
                };
            }
            if dry_run {
                return ActionOutcome::Succeeded;
            }
            match api.create_follow(session, &task.did).await {
                Ok(edge) => {
                    graph.set_following(&task.did, Some(edge));
                    ActionOutcome::Succeeded
                }
                Err(e) => ActionOutcome::from_error(&e),
            }
        }
        MutationKind::Unfollow => {
            let Some(edge) = current.and_then(|r| r.viewer.following.clone()) else {
                return ActionOutcome::Skipped {
                    reason: SkipReason::NotFollowing,
                };
            };
            if dry_run {
                return ActionOutcome::Succeeded;
            }
            match api.delete_follow(session, &edge).await {
                Ok(()) => {
                    graph.set_following(&task.did, None);
                    ActionOutcome::Succeeded
                }
                Err(e) => ActionOutcome::from_error(&e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ViewFilter;
    use crate::testing::{Call, ScriptedApi, account, did_of, followed, rate_limited, session};

    fn mode(dry_run: bool, pace_ms: u64) -> RunMode {
        RunMode {
            dry_run,
            pace: Duration::from_millis(pace_ms),
            rate_limit_cooldown: Duration::from_secs(5),
        }
    }

    fn outcomes(summary_events: &[RunEvent]) -> Vec<ActionOutcome> {
        summary_events
            .iter()
            .filter_map(|e| match e {
                RunEvent::Task { outcome, .. } => Some(outcome.clone()),
                _ => None,
            })
            .collect()
    }

    fn drain(mut rx: mpsc::UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn follow_all(graph: &mut GraphSession) -> Vec<ActionTask> {
        graph.select_all_visible();
        graph.tasks_for(MutationKind::Follow)
    }

    #[tokio::test]
    async fn test_skips_already_followed_and_follows_the_rest() {
        let api = ScriptedApi::new();
        let session = session();
        let mut graph = GraphSession::from_records(vec![followed("a"), account("b"), account("c")]);
        let tasks = follow_all(&mut graph);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut queue = ActionQueue::new();
        let summary = queue
            .run(&api, &session, &mut graph, tasks, &mode(false, 0), Some(&tx))
            .await;

        assert_eq!(
            outcomes(&drain(rx)),
            vec![
                ActionOutcome::Skipped {
                    reason: SkipReason::AlreadyFollowing
                },
                ActionOutcome::Succeeded,
                ActionOutcome::Succeeded,
            ]
        );
        assert_eq!(
            summary.stats,
            RunStats {
                succeeded: 2,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(queue.state(), QueueState::Completed);
        assert_eq!(api.mutation_calls().len(), 2);
        assert!(graph.record(&did_of("did:plc:b")).unwrap().is_followed());
        assert!(graph.record(&did_of("did:plc:c")).unwrap().is_followed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_task_fails_then_cools_down() {
        let api = ScriptedApi::new().with_mutation_failure(1, rate_limited());
        let session = session();
        let mut graph = GraphSession::from_records(vec![
            account("a"),
            account("b"),
            account("c"),
            account("d"),
        ]);
        let tasks = follow_all(&mut graph);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut queue = ActionQueue::new();
        let summary = queue
            .run(&api, &session, &mut graph, tasks, &mode(false, 0), Some(&tx))
            .await;

        let outcomes = outcomes(&drain(rx));
        assert_eq!(outcomes[0], ActionOutcome::Succeeded);
        assert!(outcomes[1].is_rate_limited());
        assert_eq!(outcomes[2], ActionOutcome::Succeeded);
        assert_eq!(outcomes[3], ActionOutcome::Succeeded);
        assert_eq!(summary.stats.failed, 1);
        assert_eq!(summary.stats.succeeded, 3);

        // Not retried: exactly one call per task.
        let calls = api.timed_calls();
        assert_eq!(calls.len(), 4);
        assert!(calls[2].0 - calls[1].0 >= Duration::from_secs(5));
        assert!(calls[1].0 - calls[0].0 < Duration::from_secs(1));
        assert!(!graph.record(&did_of("did:plc:b")).unwrap().is_followed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_failures_do_not_cool_down() {
        let api = ScriptedApi::new().with_mutation_failure(
            0,
            BlueskyError::Api {
                status: 400,
                error: Some("InvalidRequest".into()),
                message: "Record not found".into(),
            },
        );
        let session = session();
        let mut graph = GraphSession::from_records(vec![account("a"), account("b")]);
        let tasks = follow_all(&mut graph);
        let (tx, rx) = mpsc::unbounded_channel();

        let start = tokio::time::Instant::now();
        let summary = ActionQueue::new()
            .run(&api, &session, &mut graph, tasks, &mode(false, 0), Some(&tx))
            .await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(
            outcomes(&drain(rx))[0],
            ActionOutcome::Failed {
                kind: FailureKind::Mutation,
                message: "Record not found".into(),
            }
        );
        assert_eq!(summary.stats.succeeded, 1);
        assert_eq!(summary.stats.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_matches_live_decisions_and_timing() {
        let records = vec![followed("a"), account("b"), account("c")];
        let session = session();

        let dry_api = ScriptedApi::new();
        let mut dry_graph = GraphSession::from_records(records.clone());
        let tasks = follow_all(&mut dry_graph);
        let (tx, rx) = mpsc::unbounded_channel();
        let start = tokio::time::Instant::now();
        let dry = ActionQueue::new()
            .run(&dry_api, &session, &mut dry_graph, tasks, &mode(true, 300), Some(&tx))
            .await;
        let dry_elapsed = start.elapsed();
        let dry_outcomes = outcomes(&drain(rx));

        let live_api = ScriptedApi::new();
        let mut live_graph = GraphSession::from_records(records.clone());
        let tasks = follow_all(&mut live_graph);
        let (tx, rx) = mpsc::unbounded_channel();
        let start = tokio::time::Instant::now();
        let live = ActionQueue::new()
            .run(&live_api, &session, &mut live_graph, tasks, &mode(false, 300), Some(&tx))
            .await;
        let live_elapsed = start.elapsed();

        assert_eq!(dry_outcomes, outcomes(&drain(rx)));
        assert_eq!(dry.stats, live.stats);
        assert_eq!(dry_elapsed, live_elapsed);
        assert_eq!(dry_elapsed, Duration::from_millis(600));
        assert!(dry.dry_run);

        assert!(dry_api.mutation_calls().is_empty());
        assert_eq!(dry_graph.records(), records.as_slice());
    }

    #[tokio::test]
    async fn test_duplicate_tasks_see_state_from_earlier_tasks() {
        let api = ScriptedApi::new();
        let session = session();
        let mut graph = GraphSession::from_records(vec![account("a")]);
        let a = did_of("did:plc:a");
        let tasks = vec![ActionTask::follow(a.clone()), ActionTask::follow(a.clone())];
        let (tx, rx) = mpsc::unbounded_channel();

        ActionQueue::new()
            .run(&api, &session, &mut graph, tasks.clone(), &mode(false, 0), Some(&tx))
            .await;
        assert_eq!(
            outcomes(&drain(rx)),
            vec![
                ActionOutcome::Succeeded,
                ActionOutcome::Skipped {
                    reason: SkipReason::AlreadyFollowing
                }
            ]
        );

        // Dry runs never touch the records, so duplicates both "succeed".
        let mut graph = GraphSession::from_records(vec![account("a")]);
        let (tx, rx) = mpsc::unbounded_channel();
        ActionQueue::new()
            .run(&api, &session, &mut graph, tasks, &mode(true, 0), Some(&tx))
            .await;
        assert_eq!(
            outcomes(&drain(rx)),
            vec![ActionOutcome::Succeeded, ActionOutcome::Succeeded]
        );
    }

    #[tokio::test]
    async fn test_unfollow_uses_edge_reference_and_clears_it() {
        let api = ScriptedApi::new();
        let session = session();
        let mut graph = GraphSession::from_records(vec![followed("a"), account("b")]);
        graph.select_all_visible();
        let mut tasks = graph.tasks_for(MutationKind::Unfollow);
        tasks.push(ActionTask::unfollow(did_of("did:plc:stranger")));
        let (tx, rx) = mpsc::unbounded_channel();

        let summary = ActionQueue::new()
            .run(&api, &session, &mut graph, tasks, &mode(false, 0), Some(&tx))
            .await;

        let not_following = ActionOutcome::Skipped {
            reason: SkipReason::NotFollowing,
        };
        assert_eq!(
            outcomes(&drain(rx)),
            vec![ActionOutcome::Succeeded, not_following.clone(), not_following]
        );
        assert_eq!(
            api.mutation_calls(),
            vec![Call::DeleteFollow {
                edge: crate::types::EdgeRef::new("at://did:plc:me/app.bsky.graph.follow/a"),
            }]
        );
        assert!(!graph.record(&did_of("did:plc:a")).unwrap().is_followed());
        assert_eq!(summary.stats.skipped, 2);
    }

    #[tokio::test]
    async fn test_snapshot_used_when_graph_lacks_record() {
        let api = ScriptedApi::new();
        let session = session();
        let mut graph = GraphSession::new();
        let task = ActionTask {
            did: did_of("did:plc:a"),
            kind: MutationKind::Follow,
            snapshot: Some(followed("a")),
        };

        let summary = ActionQueue::new()
            .run(&api, &session, &mut graph, vec![task], &mode(false, 0), None)
            .await;
        assert_eq!(summary.stats.skipped, 1);
        assert!(api.mutation_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_between_tasks() {
        let api = ScriptedApi::new();
        let session = session();
        let mut graph = GraphSession::from_records(vec![account("a"), account("b"), account("c")]);
        let tasks = follow_all(&mut graph);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut queue = ActionQueue::new();
        let token = queue.cancellation_token();
        let start = tokio::time::Instant::now();

        let run = async {
            let summary = queue
                .run(&api, &session, &mut graph, tasks, &mode(false, 1000), Some(&tx))
                .await;
            drop(tx);
            summary
        };
        let listener = async {
            let mut seen = Vec::new();
            while let Some(event) = rx.recv().await {
                if matches!(event, RunEvent::Task { index: 0, .. }) {
                    token.cancel();
                }
                seen.push(event);
            }
            seen
        };
        let (summary, events) = tokio::join!(run, listener);

        // The pacing sleep after task 0 was cut short.
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert_eq!(summary.status, RunStatus::Cancelled);
        assert_eq!(summary.stats.processed(), 1);
        assert_eq!(outcomes(&events), vec![ActionOutcome::Succeeded]);
        assert_eq!(api.mutation_calls().len(), 1);
        assert!(!graph.record(&did_of("did:plc:b")).unwrap().is_followed());
        assert!(matches!(events.last(), Some(RunEvent::Finished(_))));
        assert_eq!(queue.state(), QueueState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_wakes_rate_limit_cooldown() {
        let api = ScriptedApi::new().with_mutation_failure(0, rate_limited());
        let session = session();
        let mut graph = GraphSession::from_records(vec![account("a"), account("b")]);
        let tasks = follow_all(&mut graph);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut queue = ActionQueue::new();
        let token = queue.cancellation_token();
        let start = tokio::time::Instant::now();

        let run = async {
            let summary = queue
                .run(&api, &session, &mut graph, tasks, &mode(false, 0), Some(&tx))
                .await;
            drop(tx);
            summary
        };
        let listener = async {
            while let Some(event) = rx.recv().await {
                if let RunEvent::Task { outcome, .. } = &event {
                    if outcome.is_rate_limited() {
                        token.cancel();
                    }
                }
            }
        };
        let (summary, ()) = tokio::join!(run, listener);

        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(summary.status, RunStatus::Cancelled);
        assert_eq!(summary.stats.failed, 1);
        assert_eq!(summary.stats.processed(), 1);
        assert_eq!(api.mutation_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_live_sync_refreshes_hide_following_view() {
        let api = ScriptedApi::new().with_mutation_failure(1, rate_limited());
        let session = session();
        let mut graph =
            GraphSession::from_records(vec![account("a"), account("b"), account("c")]);
        graph.set_view(ViewFilter {
            query: String::new(),
            hide_following: true,
        });
        let tasks = follow_all(&mut graph);
        let mode = RunMode {
            rate_limit_cooldown: Duration::ZERO,
            ..mode(false, 0)
        };

        let summary = ActionQueue::new()
            .run(&api, &session, &mut graph, tasks, &mode, None)
            .await;
        assert_eq!(summary.stats.succeeded, 2);

        // Only the failed follow is still shown and still selected.
        let b = did_of("did:plc:b");
        let visible: Vec<_> = graph.visible().map(|r| r.did.clone()).collect();
        assert_eq!(visible, vec![b.clone()]);
        assert_eq!(graph.visible_len(), 1);
        assert_eq!(graph.selected(), &[b]);
        assert_eq!(graph.select_all_visible(), graph.visible_len());
    }

    #[tokio::test]
    async fn test_dry_run_leaves_view_untouched() {
        let api = ScriptedApi::new();
        let session = session();
        let mut graph = GraphSession::from_records(vec![account("a"), account("b")]);
        graph.set_view(ViewFilter {
            query: String::new(),
            hide_following: true,
        });
        let tasks = follow_all(&mut graph);

        ActionQueue::new()
            .run(&api, &session, &mut graph, tasks, &mode(true, 0), None)
            .await;

        assert_eq!(graph.visible_len(), 2);
        assert_eq!(graph.selected().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_cancellation_is_cleared_on_start() {
        let api = ScriptedApi::new();
        let session = session();
        let mut graph = GraphSession::from_records(vec![account("a")]);
        let tasks = follow_all(&mut graph);

        let mut queue = ActionQueue::new();
        queue.cancel();
        let summary = queue
            .run(&api, &session, &mut graph, tasks, &mode(false, 0), None)
            .await;

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.stats.succeeded, 1);
    }

    #[tokio::test]
    async fn test_event_order() {
        let api = ScriptedApi::new();
        let session = session();
        let mut graph = GraphSession::from_records(vec![account("a"), account("b")]);
        let tasks = follow_all(&mut graph);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut queue = ActionQueue::new();
        assert_eq!(queue.state(), QueueState::Idle);
        queue
            .run(&api, &session, &mut graph, tasks, &mode(true, 0), Some(&tx))
            .await;

        let events = drain(rx);
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            RunEvent::Started {
                total: 2,
                dry_run: true
            }
        );
        assert!(matches!(&events[1], RunEvent::Task { index: 0, total: 2, handle, .. } if handle == "a.bsky.social"));
        assert!(matches!(&events[2], RunEvent::Task { index: 1, .. }));
        assert!(matches!(&events[3], RunEvent::Finished(s) if s.status == RunStatus::Completed));
    }

    #[test]
    fn test_task_event_serializes_flat() {
        let event = RunEvent::Task {
            index: 0,
            total: 1,
            did: did_of("did:plc:a"),
            handle: "a.bsky.social".into(),
            kind: MutationKind::Follow,
            outcome: ActionOutcome::Skipped {
                reason: SkipReason::AlreadyFollowing,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "task");
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"], "already_following");
        assert_eq!(json["kind"], "follow");
    }
}
