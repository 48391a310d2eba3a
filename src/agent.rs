//! Reference consumer of change signals.
//!
//! Regenerating proxy configuration is not this crate's job; the agent logs
//! each reload request and, when configured, runs an external reload command.

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bridge::Signal;

/// Capacity of the agent's inbound signal channel.
const SIGNAL_BUFFER: usize = 1;

pub struct ReloadAgent {
    config_tx: mpsc::Sender<Signal>,
    config_rx: mpsc::Receiver<Signal>,
    reload_command: Option<String>,
    reloads: usize,
}

impl ReloadAgent {
    pub fn new(reload_command: Option<String>) -> Self {
        let (config_tx, config_rx) = mpsc::channel(SIGNAL_BUFFER);
        Self {
            config_tx,
            config_rx,
            reload_command,
            reloads: 0,
        }
    }

    /// Sender side of the inbound channel.
    pub fn config_sender(&self) -> mpsc::Sender<Signal> {
        self.config_tx.clone()
    }

    /// Consume signals until `cancel` fires. Returns the number of reloads
    /// performed.
    pub async fn run(mut self, cancel: CancellationToken) -> usize {
        // The agent holds a sender itself, so the channel never closes and
        // only cancellation ends the loop.
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(Signal) = self.config_rx.recv() => self.reload().await,
            }
        }

        info!(reloads = self.reloads, "agent stopped");
        self.reloads
    }

    async fn reload(&mut self) {
        self.reloads += 1;
        info!(reload = self.reloads, "reload requested");

        let Some(command) = self.reload_command.as_deref() else {
            return;
        };
        match Command::new("sh").arg("-c").arg(command).status().await {
            Ok(status) if status.success() => {
                info!(command, "reload command succeeded");
            }
            Ok(status) => {
                warn!(command, %status, "reload command failed");
            }
            Err(err) => {
                warn!(command, error = %err, "failed to spawn reload command");
            }
        }
    }
}
