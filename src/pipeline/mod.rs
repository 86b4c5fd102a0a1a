//! Scan data point pipelines.
//!
//! A pipeline accepts [`ScanPoint`]s from the scan loop via `put`, forces
//! their deferred slots to concrete values, and hands each fully-resolved
//! point to the publisher in strict submission order. Two variants exist:
//!
//! - [`SequentialPipeline`]: resolves and publishes synchronously inside
//!   `put`, for scans with no asynchronous device reads.
//! - [`ConcurrentPipeline`]: bounded, order-preserving; resolves multiple
//!   points concurrently on a worker pool while a dedicated sequencing stage
//!   republishes strictly in submission order.

mod concurrent;
mod sequential;

pub use concurrent::{ConcurrentPipeline, PipelineBuilder};
pub use sequential::SequentialPipeline;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::PipelineResult;
use crate::point::ScanPoint;

/// Lifecycle of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Accepting points.
    Open,
    /// Shutdown requested; no longer accepting points, outstanding work may
    /// still be completing.
    Draining,
    /// The sink's collection has been finalized.
    Closed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PipelineState::Open => "open",
            PipelineState::Draining => "draining",
            PipelineState::Closed => "closed",
        };
        write!(f, "{}", label)
    }
}

/// Common contract of both pipeline variants.
///
/// The producer is the scan loop; it is the only caller of `put` and of the
/// graceful `shutdown`. `shutdown_now` is the cancellation path and is safe
/// to call from another task while a `put` is in flight.
#[async_trait]
pub trait ScanDataPointPipeline: Send + Sync {
    /// Admit one point for resolution and ordered publishing.
    ///
    /// Blocks while the admission buffer is full. A failure recorded since
    /// the producer's last call is raised here instead of admitting.
    async fn put(&self, point: ScanPoint) -> PipelineResult<()>;

    /// Stop accepting points, wait up to `timeout` for outstanding points to
    /// publish, then finalize the sink's collection exactly once.
    async fn shutdown(&self, timeout: Duration) -> PipelineResult<()>;

    /// Stop accepting points and discard outstanding work without waiting,
    /// still finalizing the sink's collection exactly once.
    async fn shutdown_now(&self) -> PipelineResult<()>;

    /// Current lifecycle state.
    fn state(&self) -> PipelineState;
}
