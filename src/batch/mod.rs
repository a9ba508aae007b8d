//! Running a whole batch.
//!
//! [`coordinator`] binds and dispatches items onto a bounded pool; [`report`] collects their
//! outcomes.

/// Bounded-concurrency batch runner.
pub mod coordinator;
/// Batch outcome summary.
pub mod report;
