mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cert_watcher::agent::ReloadAgent;
use cert_watcher::config::WatcherConfig;
use cert_watcher::{CertWatcher, Watcher, compute_hash};
use cli::{Cli, Commands};

#[derive(Debug, Serialize)]
struct HashOutput {
    digest: String,
    /// Files that were readable and contributed to the digest.
    files: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cert_watcher=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            paths,
            config,
            quiet_period_ms,
            retry_interval_ms,
            exec,
            skip_unchanged,
        } => {
            let mut config = WatcherConfig::load(&config);
            config.paths.extend(paths);
            if let Some(ms) = quiet_period_ms {
                config.quiet_period_ms = ms;
            }
            if let Some(ms) = retry_interval_ms {
                config.retry_interval_ms = ms;
            }
            if exec.is_some() {
                config.reload_command = exec;
            }
            config.skip_unchanged |= skip_unchanged;

            watch(config).await?;
        }
        Commands::Hash { paths, json } => hash(&paths, json)?,
    }

    Ok(())
}

async fn watch(config: WatcherConfig) -> Result<()> {
    if config.paths.is_empty() {
        warn!("no paths configured; idling until interrupted");
    }
    info!(
        paths = config.paths.len(),
        quiet_period_ms = config.quiet_period_ms,
        retry_interval_ms = config.retry_interval_ms,
        "starting cert-watcher"
    );

    let cancel = CancellationToken::new();
    let agent = ReloadAgent::new(config.reload_command.clone());
    let watcher = Watcher::new(
        config.paths.clone(),
        agent.config_sender(),
        CertWatcher::new(config.quiet_period(), config.retry_interval()),
    )
    .skip_unchanged(config.skip_unchanged);

    let agent_task = tokio::spawn(agent.run(cancel.clone()));
    let watcher_task = tokio::spawn(watcher.run(cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for interrupt signal")?;
    info!("interrupted; shutting down");
    cancel.cancel();

    watcher_task.await.context("watcher task failed")?;
    let reloads = agent_task.await.context("agent task failed")?;
    info!(reloads, "stopped");

    Ok(())
}

fn hash(paths: &[PathBuf], json: bool) -> Result<()> {
    let mut hasher = Sha256::new();
    let files = compute_hash(&mut hasher, paths);
    let digest = hex::encode(hasher.finalize());

    if json {
        let output = HashOutput { digest, files };
        println!(
            "{}",
            serde_json::to_string(&output).context("failed to serialize digest")?
        );
    } else {
        println!("{digest}");
    }

    Ok(())
}
