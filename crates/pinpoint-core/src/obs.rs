//! Structured observability hooks for bisection and pipeline events.
//!
//! This module provides:
//! - Attempt-scoped tracing spans via `AttemptSpan`
//! - Emission functions for midpoints, DEPS rolls and execution transitions
//!
//! Events are emitted at `info!` level unless noted; filter with `RUST_LOG`.

use std::future::Future;

use tracing::{info, warn, Instrument};

/// Span scoping every log line of one change's attempt.
///
/// # Example
///
/// ```ignore
/// let span = AttemptSpan::new(&change.id_string());
/// span.run(execution.poll(&services)).await?;
/// ```
#[derive(Debug, Clone)]
pub struct AttemptSpan {
    span: tracing::Span,
}

impl AttemptSpan {
    pub fn new(change_id: &str) -> Self {
        Self {
            span: tracing::info_span!("pinpoint.attempt", change = %change_id),
        }
    }

    /// Run `future` inside the attempt span.
    pub async fn run<F: Future>(&self, future: F) -> F::Output {
        future.instrument(self.span.clone()).await
    }
}

/// Emit event: midpoint computed between two commits (`None` when adjacent).
pub fn emit_midpoint_computed(a: &str, b: &str, midpoint: Option<&str>) {
    info!(
        event = "midpoint.computed",
        a = %a,
        b = %b,
        midpoint = midpoint.unwrap_or("none"),
    );
}

/// Emit event: a dependency roll found between adjacent commits.
pub fn emit_deps_roll_detected(repository: &str, from: &str, to: &str) {
    info!(event = "midpoint.deps_roll", repository = %repository, from = %from, to = %to);
}

/// Emit event: a pipeline stage started for a change.
pub fn emit_stage_started(quest: &str, change_id: &str) {
    info!(event = "execution.started", quest = %quest, change = %change_id);
}

/// Emit event: a stage completed with its result count.
pub fn emit_execution_completed(quest: &str, result_values: usize) {
    info!(event = "execution.completed", quest = %quest, result_values = result_values);
}

/// Emit event: a stage failed (warning level). The failure is kept as data.
pub fn emit_execution_failed(quest: &str, error: &dyn std::fmt::Display) {
    warn!(event = "execution.failed", quest = %quest, error = %error);
}
