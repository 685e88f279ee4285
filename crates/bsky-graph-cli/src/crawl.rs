//! `bsky-graph crawl` command implementation.
//!
//! # Usage
//!
//! ```text
//! # Non-mutual followers of an account, human-readable
//! bsky-graph crawl --source followers_non_mutuals --target alice.bsky.social --max 200
//!
//! # Everyone you follow who does not follow back, as JSON lines
//! bsky-graph crawl --source my_non_mutuals --json
//! ```

use anyhow::Result;
use bsky_graph::{
    AccountRecord, BlueskyConfig, CrawlProgress, FetchSpec, GraphApi, Session, Source, crawl,
};
use clap::Args;
use tokio::sync::mpsc;
use tracing::info;

use crate::{GlobalArgs, settings};

/// Arguments for the `crawl` command.
#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// What to fetch: followers, followers_non_mutuals, following,
    /// following_non_mutuals or my_non_mutuals.
    #[arg(long, short = 's')]
    pub source: Source,

    /// Account to crawl (handle or did). Ignored for my_non_mutuals.
    #[arg(long, short = 't')]
    pub target: Option<String>,

    /// Maximum number of accounts to return.
    #[arg(long, short = 'n', default_value_t = 100)]
    pub max: usize,

    /// Output one JSON object per account instead of a table.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

pub async fn run(global: &GlobalArgs, config: &BlueskyConfig, args: &CrawlArgs) -> Result<()> {
    let (client, session) = settings::login(global, config).await?;
    let target = settings::target_for(&client, &session, args.source, args.target.as_deref()).await?;

    let mut spec = FetchSpec::with_config(target, args.source.direction(), args.max, &config.crawl);
    if let Some(filter) = args.source.filter() {
        spec = spec.filter(filter);
    }

    let records = fetch(&client, &session, spec).await?;

    if args.json {
        for record in &records {
            println!("{}", serde_json::to_string(record)?);
        }
    } else {
        for record in &records {
            println!("{}", format_record(record));
        }
    }
    Ok(())
}

/// Run a crawl, logging progress as pages arrive.
pub async fn fetch<A>(api: &A, session: &Session, spec: FetchSpec) -> Result<Vec<AccountRecord>>
where
    A: GraphApi + ?Sized,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_progress(rx));

    let result = crawl(api, session, spec, Some(&tx)).await;
    drop(tx);
    let _ = reporter.await;

    Ok(result?)
}

async fn report_progress(mut rx: mpsc::UnboundedReceiver<CrawlProgress>) {
    while let Some(progress) = rx.recv().await {
        info!(
            page = progress.page,
            found = progress.accepted_so_far,
            scanned = progress.total_scanned,
            "Fetching..."
        );
    }
}

/// One table row: handle, name, did and relationship flags.
pub fn format_record(record: &AccountRecord) -> String {
    let mut flags = Vec::new();
    if record.is_followed() {
        flags.push("following");
    }
    if record.follows_back() {
        flags.push("follows you");
    }
    format!(
        "@{:<32} {:<32} {} {}",
        record.handle,
        record.name(),
        record.did,
        flags.join(", ")
    )
    .trim_end()
    .to_string()
}
