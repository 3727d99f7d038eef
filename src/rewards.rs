//! Reward Store
//!
//! Persisted counter of audited tool-call successes. The file holds one
//! integer; reads tolerate a missing or garbled file, and writes go through
//! a temp file plus rename so concurrent sessions never see a torn value.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

pub struct RewardStore {
    path: PathBuf,
}

impl RewardStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Current total. Missing file or unparsable content reads as zero.
    pub fn total(&self) -> u64 {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Add `n` to the total and persist it. Returns the new total.
    pub fn add(&self, n: u64) -> Result<u64> {
        let total = self.total() + n;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, total.to_string())
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(total, "reward banked");
        Ok(total)
    }
}
