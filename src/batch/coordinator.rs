use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::batch::report::BatchReport;
use crate::bind::{BindContext, RenderPlan, bind, item_id_for};
use crate::foundation::error::{VidstampError, VidstampResult};
use crate::record::DataRecord;
use crate::render::executor::{
    RenderExecutor, RenderResult, RenderStatus, SkipPolicy, is_complete,
};
use crate::template::model::Template;

/// Knobs for one batch run.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchOptions {
    /// Number of items rendered at once.
    pub concurrency_limit: usize,
    /// Extra attempts for transient failures.
    pub max_retries: u32,
    /// Wait before the first retry; doubled for each later one.
    pub retry_backoff: Duration,
    /// Upper bound on any single retry delay.
    pub max_backoff: Duration,
    /// Which existing outputs count as done.
    pub skip_policy: SkipPolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 3,
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            skip_policy: SkipPolicy::Fingerprint,
        }
    }
}

impl BatchOptions {
    /// Reject a zero concurrency limit.
    pub fn validate(&self) -> VidstampResult<()> {
        if self.concurrency_limit == 0 {
            return Err(VidstampError::config("concurrency_limit must be >= 1"));
        }
        Ok(())
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Batch-wide cancellation flag. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop dispatching new items. Renders already running finish.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`CancelToken::cancel`] was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-item lifecycle: `Pending -> Bound -> Rendering -> {Succeeded, Failed}`.
///
/// Items that fail to bind go straight from `Pending` to `Failed`; items with a valid prior
/// output end `Skipped` without rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemState {
    /// Not bound yet.
    Pending,
    /// Bound into a plan.
    Bound,
    /// A render attempt is running.
    Rendering,
    /// Output published.
    Succeeded,
    /// Gave up.
    Failed,
    /// Already complete from an earlier run.
    Skipped,
    /// Never started.
    Cancelled,
}

/// Progress hooks. Called from worker threads.
pub trait BatchObserver: Send + Sync {
    /// Item `index` entered `state`.
    fn on_state(&self, _index: usize, _state: ItemState) {}

    /// Item reached its final result.
    fn on_item_finished(&self, _result: &RenderResult) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Binds every record, dispatches the plans onto a bounded worker pool, and collects one
/// [`RenderResult`] per record.
pub struct BatchCoordinator {
    executor: RenderExecutor,
    bind_ctx: BindContext,
    options: BatchOptions,
    cancel: CancelToken,
    observer: Arc<dyn BatchObserver>,
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("executor", &self.executor)
            .field("bind_ctx", &self.bind_ctx)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

enum Prepared {
    Ready(RenderPlan),
    Done(RenderResult),
}

impl BatchCoordinator {
    /// Coordinator with a fresh cancel token and no observer.
    pub fn new(executor: RenderExecutor, bind_ctx: BindContext, options: BatchOptions) -> Self {
        Self {
            executor,
            bind_ctx,
            options,
            cancel: CancelToken::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Share `cancel` with the caller, e.g. a Ctrl-C handler.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report progress to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Token that cancels this coordinator's batches.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Options in effect.
    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Bind every record without rendering. Index-aligned with `records`.
    pub fn plan(
        &self,
        template: &Template,
        records: &[DataRecord],
    ) -> VidstampResult<Vec<VidstampResult<RenderPlan>>> {
        template.validate()?;
        let mut claimed = HashMap::<PathBuf, usize>::new();
        Ok(records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let plan = bind(template, record, index, &self.bind_ctx)?;
                if let Some(first) = claimed.get(&plan.output_path) {
                    return Err(VidstampError::validation(format!(
                        "output '{}' is already produced by item {first}",
                        plan.output_path.display()
                    )));
                }
                claimed.insert(plan.output_path.clone(), index);
                Ok(plan)
            })
            .collect())
    }

    /// Render one output per record.
    ///
    /// Only an invalid template or configuration is returned as an error; every per-item
    /// failure is captured in the report.
    #[tracing::instrument(level = "info", skip_all, fields(items = records.len(), jobs = self.options.concurrency_limit))]
    pub fn run(&self, template: &Template, records: &[DataRecord]) -> VidstampResult<BatchReport> {
        self.options.validate()?;
        let t0 = Instant::now();

        let plans = self.plan(template, records)?;
        let mut results = Vec::with_capacity(records.len());
        let mut ready = Vec::new();
        for ((index, record), plan) in records.iter().enumerate().zip(plans) {
            self.observer.on_state(index, ItemState::Pending);
            match self.prepare(index, record, plan) {
                Prepared::Ready(plan) => ready.push(plan),
                Prepared::Done(result) => {
                    self.observer.on_item_finished(&result);
                    results.push(result);
                }
            }
        }
        tracing::info!(
            to_render = ready.len(),
            already_done = results.len(),
            "batch prepared"
        );

        let pool = build_thread_pool(self.options.concurrency_limit)?;
        let rendered: Vec<RenderResult> = pool.install(|| {
            ready
                .par_iter()
                .with_max_len(1)
                .map(|plan| {
                    let result = self.run_item(plan);
                    self.observer.on_item_finished(&result);
                    result
                })
                .collect()
        });
        results.extend(rendered);

        self.executor.cache().clear();

        let report = BatchReport::from_results(results, t0.elapsed().as_millis() as u64);
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "batch finished"
        );
        Ok(report)
    }

    fn prepare(
        &self,
        index: usize,
        record: &DataRecord,
        plan: VidstampResult<RenderPlan>,
    ) -> Prepared {
        let plan = match plan {
            Ok(plan) => plan,
            Err(e) => {
                let item_id = item_id_for(record, index).unwrap_or_else(|_| index.to_string());
                tracing::warn!(index, id = %item_id, error = %e, "item failed to bind");
                self.observer.on_state(index, ItemState::Failed);
                return Prepared::Done(RenderResult::failed(index, item_id, None, &e, 0));
            }
        };
        self.observer.on_state(index, ItemState::Bound);

        if is_complete(&plan, self.options.skip_policy) {
            tracing::debug!(index, id = %plan.item_id, output = %plan.output_path.display(), "output already complete");
            self.observer.on_state(index, ItemState::Skipped);
            return Prepared::Done(RenderResult::skipped(&plan));
        }
        Prepared::Ready(plan)
    }

    /// Render with retries. Cancellation is honored before the first attempt and between
    /// attempts; an attempt in flight always runs to completion.
    fn run_item(&self, plan: &RenderPlan) -> RenderResult {
        if self.cancel.is_cancelled() {
            self.observer.on_state(plan.index, ItemState::Cancelled);
            return RenderResult::cancelled(plan);
        }

        let mut attempts = 0u32;
        let mut elapsed_ms = 0u64;
        loop {
            attempts += 1;
            self.observer.on_state(plan.index, ItemState::Rendering);
            let mut result = self.executor.render(plan);
            elapsed_ms += result.elapsed_ms;
            result.attempts = attempts;
            result.elapsed_ms = elapsed_ms;

            if !result.is_transient_failure() || attempts > self.options.max_retries {
                self.finish(&result);
                return result;
            }

            let delay = self.options.backoff_for(attempts);
            tracing::warn!(
                index = plan.index,
                id = %plan.item_id,
                attempt = attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = result.error.as_ref().map(|e| e.message.as_str()).unwrap_or_default(),
                "transient render failure, retrying"
            );
            if !self.sleep_unless_cancelled(delay) {
                self.finish(&result);
                return result;
            }
        }
    }

    fn finish(&self, result: &RenderResult) {
        let state = match result.status {
            RenderStatus::Succeeded => ItemState::Succeeded,
            RenderStatus::Skipped => ItemState::Skipped,
            RenderStatus::Cancelled => ItemState::Cancelled,
            RenderStatus::Failed => {
                tracing::warn!(
                    index = result.index,
                    id = %result.item_id,
                    attempts = result.attempts,
                    error = result.error.as_ref().map(|e| e.message.as_str()).unwrap_or_default(),
                    "item failed"
                );
                ItemState::Failed
            }
        };
        self.observer.on_state(result.index, state);
    }

    /// Returns false if the batch was cancelled while waiting.
    fn sleep_unless_cancelled(&self, total: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(25);
        let deadline = Instant::now() + total;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLICE.min(deadline - now));
        }
    }
}

fn build_thread_pool(threads: usize) -> VidstampResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(VidstampError::config("concurrency_limit must be >= 1"));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("vidstamp-worker-{i}"))
        .build()
        .map_err(|e| VidstampError::Other(anyhow::anyhow!("failed to build worker pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/batch/coordinator.rs"]
mod tests;
