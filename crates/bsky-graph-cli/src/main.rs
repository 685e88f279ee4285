//! Bluesky follow-graph operator CLI.
//!
//! - `bsky-graph profile` - Log in and show the acting account
//! - `bsky-graph crawl` - Fetch followers / follows of an account
//! - `bsky-graph run` - Crawl, then follow or unfollow every visible result

#![forbid(unsafe_code)]

mod crawl;
mod logging;
mod profile;
mod run;
mod settings;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Bulk follow-graph tool for Bluesky.
#[derive(Parser)]
#[command(name = "bsky-graph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// PDS / entryway base URL (overrides the config file).
    #[arg(long, global = true)]
    pub service_url: Option<String>,

    /// Handle or email to log in with.
    #[arg(long, global = true, env = "BSKY_IDENTIFIER")]
    pub identifier: Option<String>,

    /// App password. Never pass your main account password.
    #[arg(long, global = true, env = "BSKY_APP_PASSWORD", hide_env_values = true)]
    pub app_password: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the acting account's profile.
    Profile(profile::ProfileArgs),

    /// Fetch the followers or follows of an account.
    ///
    /// Example: bsky-graph crawl --source followers_non_mutuals --target alice.bsky.social
    Crawl(crawl::CrawlArgs),

    /// Crawl, select every visible record and follow or unfollow them in sequence.
    ///
    /// Ctrl-C stops the run after the task in flight.
    Run(run::RunArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for JSON output.
    logging::init(cli.global.json_logs)?;

    let config = settings::load(&cli.global)?;

    match cli.command {
        Commands::Profile(args) => profile::run(&cli.global, &config, &args).await,
        Commands::Crawl(args) => crawl::run(&cli.global, &config, &args).await,
        Commands::Run(args) => run::run(&cli.global, &config, &args).await,
    }
}
