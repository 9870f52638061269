/*!
`run.rs`

Main flow: open the broker connection, spawn the command, forward both output
streams until they close, then reap the child and disconnect.

Broker connection problems are logged by the connection's event loop and never
stop forwarding. Errors returned from here end the process with status 1.
*/

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use super::args::Config;
use crate::forward::{FrameOptions, StreamSession, StreamTag, forward_streams};
use crate::mqtt::{self, BrokerOptions};
use crate::process;

/// How long to wait for queued lines to reach the broker on shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Build a single-threaded runtime and run the forwarder to completion.
pub fn execute_run(config: Config) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;
    rt.block_on(run(&config, SHUTDOWN_GRACE))
}

pub async fn run(config: &Config, shutdown_grace: Duration) -> Result<()> {
    let endpoint = mqtt::parse_endpoint(&config.broker_url)?;
    let options = BrokerOptions::new(
        endpoint,
        &config.client_id,
        config.username.as_deref(),
        config.password.as_deref(),
    );
    let connection = mqtt::connect(&options);

    let spec = process::parse_command(&config.command, config.tokenizer)?;
    info!("Running command {}", config.command);
    let mut child = process::spawn(&spec, &config.extra_env)?;

    let stdout = child.stdout.take().map(|r| {
        StreamSession::new(StreamTag::Stdout, &config.topic, config.split_streams, r)
    });
    let stderr = child.stderr.take().map(|r| {
        StreamSession::new(StreamTag::Stderr, &config.topic, config.split_streams, r)
    });

    let opts = FrameOptions {
        keep_empty: config.keep_empty,
    };
    let (out, err) = forward_streams(stdout, stderr, &connection, opts)
        .await
        .with_context(|| format!("Failed to forward output of '{spec}'"))?;

    let status = child
        .wait()
        .await
        .with_context(|| format!("Failed to wait for '{spec}'"))?;
    info!(
        %status,
        stdout_lines = out.lines_published,
        stderr_lines = err.lines_published,
        dropped = out.publish_failures + err.publish_failures,
        "Command finished"
    );

    connection.close(shutdown_grace).await;
    Ok(())
}
