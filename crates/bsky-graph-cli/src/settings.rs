//! Configuration loading, login and target selection shared by the subcommands.

use std::path::Path;

use anyhow::{Context, Result, bail};
use bsky_graph::{BlueskyConfig, Did, Session, Source, XrpcClient, resolve_target};
use tracing::info;

use crate::GlobalArgs;

/// Load the config file (if any) and apply flag overrides.
pub fn load(global: &GlobalArgs) -> Result<BlueskyConfig> {
    let mut config = match &global.config {
        Some(path) => from_file(path)?,
        None => BlueskyConfig::default(),
    };

    if let Some(url) = &global.service_url {
        config.service_url.clone_from(url);
    }

    config.validate()?;
    Ok(config)
}

fn from_file(path: &Path) -> Result<BlueskyConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse(&text).with_context(|| format!("invalid config file {}", path.display()))
}

fn parse(text: &str) -> Result<BlueskyConfig> {
    Ok(toml::from_str(text)?)
}

/// Build a client and log in with the configured credentials.
pub async fn login(global: &GlobalArgs, config: &BlueskyConfig) -> Result<(XrpcClient, Session)> {
    let (Some(identifier), Some(password)) = (&global.identifier, &global.app_password) else {
        bail!("login requires --identifier (or BSKY_IDENTIFIER) and BSKY_APP_PASSWORD");
    };

    let client = XrpcClient::new(config)?;
    let session = client
        .create_session(identifier, password)
        .await
        .context("login failed")?;
    Ok((client, session))
}

/// Pick the account a source crawls.
///
/// `my_non_mutuals` always targets the logged-in account; every other source
/// needs an explicit handle or did.
pub async fn target_for(
    client: &XrpcClient,
    session: &Session,
    source: Source,
    target: Option<&str>,
) -> Result<Did> {
    if source.targets_self() {
        return Ok(session.did.clone());
    }

    let Some(input) = target.map(str::trim).filter(|t| !t.is_empty()) else {
        bail!("--target is required for source '{source}'");
    };

    let did = resolve_target(client, input).await?;
    info!(target = input, did = %did, "Resolved crawl target");
    Ok(did)
}
