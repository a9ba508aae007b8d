use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::foundation::error::VidstampResult;
use crate::render::executor::{RenderResult, RenderStatus};

/// Outcome of a whole batch. `results` is ordered by input index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Number of input records.
    pub total: usize,
    /// Items rendered in this run.
    pub succeeded: usize,
    /// Items that failed binding or rendering.
    pub failed: usize,
    /// Items whose output was already complete.
    pub skipped: usize,
    /// Items never started because the batch was cancelled.
    pub cancelled: usize,
    /// Wall time of the whole batch.
    pub elapsed_ms: u64,
    /// One entry per record.
    pub results: Vec<RenderResult>,
}

impl BatchReport {
    /// Tally `results`, sorting them by index.
    pub fn from_results(mut results: Vec<RenderResult>, elapsed_ms: u64) -> Self {
        results.sort_by_key(|r| r.index);
        let count = |s: RenderStatus| results.iter().filter(|r| r.status == s).count();
        Self {
            total: results.len(),
            succeeded: count(RenderStatus::Succeeded),
            failed: count(RenderStatus::Failed),
            skipped: count(RenderStatus::Skipped),
            cancelled: count(RenderStatus::Cancelled),
            elapsed_ms,
            results,
        }
    }

    /// True when every item either rendered or was already done.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    /// Failed items, in input order.
    pub fn failures(&self) -> impl Iterator<Item = &RenderResult> {
        self.results
            .iter()
            .filter(|r| r.status == RenderStatus::Failed)
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: impl AsRef<Path>) -> VidstampResult<()> {
        let path = path.as_ref();
        let body = serde_json::to_vec_pretty(self).context("serialize batch report")?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create report directory '{}'", dir.display()))?;
        }
        std::fs::write(path, body)
            .with_context(|| format!("write batch report '{}'", path.display()))?;
        Ok(())
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} items: {} succeeded, {} failed, {} skipped",
            self.total, self.succeeded, self.failed, self.skipped
        )?;
        if self.cancelled > 0 {
            write!(f, ", {} cancelled", self.cancelled)?;
        }
        write!(f, " in {:.1}s", self.elapsed_ms as f64 / 1000.0)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/batch/report.rs"]
mod tests;
