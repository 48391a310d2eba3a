//! Content digests over a list of files.
//!
//! Filesystem notifications say *that* something happened to a path, not that
//! its bytes changed. A digest over the watched files gives a cheap check on
//! top: identical content in identical order always hashes identically, and a
//! path that cannot be read contributes nothing.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::trace;

/// Feed the content of each readable path, in order, into `hasher`.
///
/// Missing or unreadable paths are skipped; they never fail the computation
/// and leave the hasher exactly as if they were not listed. Returns the
/// number of files that contributed.
pub fn compute_hash<D, P>(hasher: &mut D, paths: &[P]) -> usize
where
    D: Digest,
    P: AsRef<Path>,
{
    let mut hashed = 0;
    for path in paths {
        let path = path.as_ref();
        // Read fully before updating, so a read failing midway adds nothing.
        match std::fs::read(path) {
            Ok(content) => {
                hasher.update(&content);
                hashed += 1;
            }
            Err(err) => {
                trace!(path = %path.display(), error = %err, "skipping unreadable file");
            }
        }
    }
    hashed
}

/// SHA-256 digest of the concatenated content of `paths`.
pub fn cert_digest<P: AsRef<Path>>(paths: &[P]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    compute_hash(&mut hasher, paths);
    hasher.finalize().to_vec()
}

/// Tracks the digest of a fixed path list across checks.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    paths: Vec<PathBuf>,
    last: Option<Vec<u8>>,
}

impl ChangeDetector {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths, last: None }
    }

    /// Recompute the digest and report whether it differs from the previous
    /// check. The first check always reports a change.
    pub fn refresh(&mut self) -> bool {
        let digest = cert_digest(&self.paths);
        let changed = self.last.as_deref() != Some(digest.as_slice());
        self.last = Some(digest);
        changed
    }

    pub fn last_digest(&self) -> Option<&[u8]> {
        self.last.as_deref()
    }
}
