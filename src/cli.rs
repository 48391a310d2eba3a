use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cert_watcher::config::DEFAULT_CONFIG_FILE;

/// Certificate and proxy-config hot-reload watcher.
///
/// cert-watcher observes certificate and bootstrap-config files, coalesces the
/// noisy filesystem events produced by rotation tooling into a single settled
/// change, and triggers a reload of the fronted proxy.
#[derive(Parser, Debug)]
#[command(
    name = "cert-watcher",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch files and request a reload whenever they settle after a change.
    ///
    /// Runs until interrupted. Paths given on the command line are added to
    /// those listed in the config file.
    Watch {
        /// Files to watch (need not exist yet).
        paths: Vec<PathBuf>,

        /// Path to the TOML config file.
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Event silence (milliseconds) before a burst counts as settled.
        #[arg(long)]
        quiet_period_ms: Option<u64>,

        /// Delay (milliseconds) between registration attempts for missing files.
        #[arg(long)]
        retry_interval_ms: Option<u64>,

        /// Shell command to run on every reload.
        #[arg(long)]
        exec: Option<String>,

        /// Skip reloads when the watched content is byte-identical.
        #[arg(long)]
        skip_unchanged: bool,
    },

    /// Print the SHA-256 content digest of a list of files.
    ///
    /// Missing or unreadable files are skipped.
    Hash {
        /// Files to hash, in order.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output results as JSON instead of a bare hex digest.
        #[arg(long)]
        json: bool,
    },
}
