//! `bsky-graph run` command implementation.
//!
//! Crawls a source, applies the view filter, selects every visible record and
//! executes one follow or unfollow per selected account.

use std::time::Duration;

use anyhow::Result;
use bsky_graph::{
    ActionOutcome, ActionQueue, BlueskyConfig, FetchSpec, GraphSession, MutationKind, RunEvent,
    RunMode, RunStatus, RunSummary, Source, ViewFilter,
};
use clap::{Args, ValueEnum};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{GlobalArgs, crawl, settings};

/// Mutation requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Follow,
    Unfollow,
}

impl From<KindArg> for MutationKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Follow => Self::Follow,
            KindArg::Unfollow => Self::Unfollow,
        }
    }
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// What to fetch: followers, followers_non_mutuals, following,
    /// following_non_mutuals or my_non_mutuals.
    #[arg(long, short = 's')]
    pub source: Source,

    /// Account to crawl (handle or did). Ignored for my_non_mutuals.
    #[arg(long, short = 't')]
    pub target: Option<String>,

    /// Maximum number of accounts to fetch.
    #[arg(long, short = 'n', default_value_t = 100)]
    pub max: usize,

    /// Only act on accounts whose handle or display name contains this text.
    #[arg(long, short = 'q')]
    pub query: Option<String>,

    /// Skip accounts you already follow.
    #[arg(long, default_value_t = false)]
    pub hide_following: bool,

    /// Mutation to apply. Defaults to unfollow for my_non_mutuals, follow otherwise.
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,

    /// Decide and pace every task without sending any mutation.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Delay between tasks in milliseconds (overrides the config file).
    #[arg(long)]
    pub pace_ms: Option<u64>,

    /// Print run events as JSON lines instead of log lines.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl RunArgs {
    fn kind(&self) -> MutationKind {
        self.kind.map_or_else(|| self.source.default_kind(), MutationKind::from)
    }

    fn mode(&self, config: &BlueskyConfig) -> RunMode {
        let mode = RunMode::from_config(&config.queue, self.dry_run);
        match self.pace_ms {
            Some(ms) => mode.pace(Duration::from_millis(ms)),
            None => mode,
        }
    }

    fn view(&self) -> ViewFilter {
        ViewFilter {
            query: self.query.clone().unwrap_or_default(),
            hide_following: self.hide_following,
        }
    }
}

pub async fn run(global: &GlobalArgs, config: &BlueskyConfig, args: &RunArgs) -> Result<()> {
    let (client, session) = settings::login(global, config).await?;
    let target = settings::target_for(&client, &session, args.source, args.target.as_deref()).await?;

    let mut spec = FetchSpec::with_config(target, args.source.direction(), args.max, &config.crawl);
    if let Some(filter) = args.source.filter() {
        spec = spec.filter(filter);
    }
    let records = crawl::fetch(&client, &session, spec).await?;

    let mut graph = GraphSession::from_records(records);
    graph.set_view(args.view());
    let selected = graph.select_all_visible();
    info!(
        fetched = graph.len(),
        visible = graph.visible_len(),
        selected,
        "Selection ready"
    );

    let tasks = graph.tasks_for(args.kind());
    let mode = args.mode(config);

    let mut queue = ActionQueue::new();
    let cancel = queue.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current task");
            cancel.cancel();
        }
    });

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(rx, args.json));

    let summary = queue
        .run(&client, &session, &mut graph, tasks, &mode, Some(&tx))
        .await;

    drop(tx);
    let _ = printer.await;
    ctrl_c.abort();

    if !args.json {
        println!("{}", describe_summary(&summary));
    }
    Ok(())
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<RunEvent>, json: bool) {
    while let Some(event) = rx.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to serialize run event"),
            }
        } else if let Some(line) = describe_event(&event) {
            println!("{line}");
        }
    }
}

/// Human log line for a run event. `Finished` is reported by the summary.
pub fn describe_event(event: &RunEvent) -> Option<String> {
    match event {
        RunEvent::Started { total, dry_run } => Some(if *dry_run {
            format!("Starting dry run of {total} tasks")
        } else {
            format!("Starting {total} tasks")
        }),
        RunEvent::Task {
            index,
            total,
            handle,
            kind,
            outcome,
            ..
        } => {
            let position = format!("[{}/{}]", index + 1, total);
            let line = match outcome {
                ActionOutcome::Succeeded => {
                    let verb = match kind {
                        MutationKind::Follow => "Followed",
                        MutationKind::Unfollow => "Unfollowed",
                    };
                    format!("{position} {verb} @{handle}")
                }
                ActionOutcome::Skipped { reason } => {
                    format!("{position} Skipped @{handle} ({reason})")
                }
                ActionOutcome::Failed { message, .. } if outcome.is_rate_limited() => {
                    format!("{position} Error @{handle}: {message} (pausing)")
                }
                ActionOutcome::Failed { message, .. } => {
                    format!("{position} Error @{handle}: {message}")
                }
            };
            Some(line)
        }
        RunEvent::Finished(_) => None,
    }
}

pub fn describe_summary(summary: &RunSummary) -> String {
    let status = match summary.status {
        RunStatus::Completed => "Done",
        RunStatus::Cancelled => "Stopped",
    };
    let dry = if summary.dry_run { " (dry run)" } else { "" };
    format!(
        "{status}{dry}: {} succeeded, {} skipped, {} failed of {} tasks",
        summary.stats.succeeded, summary.stats.skipped, summary.stats.failed, summary.total
    )
}
