//! Tracing subscriber setup.

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber. `RUST_LOG` wins over the `info` default.
pub fn init(json_logs: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if json_logs {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_target(true);

        subscriber
            .with(json_layer)
            .try_init()
            .context("failed to initialise logging")?;
    } else {
        let pretty_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);

        subscriber
            .with(pretty_layer)
            .try_init()
            .context("failed to initialise logging")?;
    }

    Ok(())
}
