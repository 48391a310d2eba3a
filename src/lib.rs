pub mod agent;
pub mod bridge;
pub mod config;
pub mod hash;
pub mod watcher;

pub use bridge::{Signal, Watcher};
pub use hash::{ChangeDetector, cert_digest, compute_hash};
pub use watcher::{CertWatcher, watch_certs};
