//! `bsky-graph profile` command implementation.

use anyhow::{Context, Result};
use bsky_graph::BlueskyConfig;
use clap::Args;

use crate::{GlobalArgs, settings};

/// Arguments for the `profile` command.
#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// Output JSON instead of human-readable format.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

pub async fn run(global: &GlobalArgs, config: &BlueskyConfig, args: &ProfileArgs) -> Result<()> {
    let (client, session) = settings::login(global, config).await?;
    let profile = client
        .get_profile(&session, session.did.as_str())
        .await
        .context("failed to load profile")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    println!("@{} ({})", profile.handle, profile.did);
    if let Some(name) = profile.display_name.as_deref().filter(|n| !n.is_empty()) {
        println!("Name:       {name}");
    }
    println!("Followers:  {}", profile.followers_count);
    println!("Following:  {}", profile.follows_count);
    println!("Posts:      {}", profile.posts_count);
    Ok(())
}
