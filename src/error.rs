//! Custom error types for the scan pipeline.
//!
//! `PipelineError` is the producer-facing error type for every pipeline
//! operation. Failures that first occur on a resolver worker are recorded
//! inside the pipeline and surfaced later, possibly more than once (from the
//! next `put` and again from `shutdown`), so every variant is `Clone`.
//!
//! ## Error Hierarchy
//!
//! - **`Resolution`**: a deferred slot's underlying computation failed, for
//!   example a device readback error. Carries the slot kind, slot name, the
//!   point index and the underlying cause's message.
//! - **`Acquisition`**: the pipeline-level wrapper handed to the producer.
//!   Wraps the recorded failure; when re-raised from `shutdown` after having
//!   first been observed on a worker, the recorded wrapper is wrapped a
//!   second time, preserving the full surfacing history.
//! - **`Closed`**: `put` was called after the pipeline began draining or has
//!   closed.
//! - **`DrainTimeout`**: `shutdown` did not complete within its deadline.
//! - **`Sink`**: the data sink or notifier failed while appending,
//!   notifying, or finalizing.
//! - **`Config`**: configuration loading or validation failed.

use std::time::Duration;
use thiserror::Error;

/// Which side of a scan point a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// A position readback from a participating position provider.
    Position,
    /// A data readout from a participating detector.
    Detector,
}

impl std::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SlotKind::Position => "position",
            SlotKind::Detector => "detector",
        };
        write!(f, "{}", label)
    }
}

/// A deferred slot's underlying computation failed.
///
/// The failure is terminal for the point: deferred handles are invoked at
/// most once and never retried.
#[derive(Error, Debug, Clone)]
#[error("Could not resolve {kind} '{slot}' for point {point}: {message}")]
pub struct ResolutionError {
    /// Whether the failing slot was a position or a detector readout.
    pub kind: SlotKind,
    /// Name of the provider that supplied the failing slot.
    pub slot: String,
    /// Sequence index of the point the slot belongs to.
    pub point: u64,
    /// Message of the underlying cause.
    pub message: String,
}

impl ResolutionError {
    /// Build a resolution error from a slot identity and its cause.
    pub fn new(
        kind: SlotKind,
        slot: impl Into<String>,
        point: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            slot: slot.into(),
            point,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using the pipeline error type.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Primary error type for the scan data point pipeline.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// A deferred slot failed to resolve. Terminal for the point.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Pipeline-level wrapper surfaced to the producer.
    ///
    /// Carries the failure the producer can meaningfully react to, typically
    /// by aborting the scan.
    #[error("Error in scan data point pipeline: {0}")]
    Acquisition(Box<PipelineError>),

    /// `put` was called on a pipeline that is draining or closed.
    #[error("Could not add new point to {0} as it is shutdown.")]
    Closed(String),

    /// `shutdown` did not drain every admitted point within the deadline.
    ///
    /// Outstanding workers keep running in the background; the pipeline stays
    /// in the draining state and a follow-up `shutdown` or `shutdown_now`
    /// finalizes the sink.
    #[error("Scan data point pipeline '{name}' did not drain within {timeout:?}")]
    DrainTimeout {
        /// Pipeline name, as configured at construction.
        name: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The data sink or notifier failed.
    #[error("Data sink error: {0}")]
    Sink(String),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A storage format was requested whose backend was not compiled in.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl PipelineError {
    /// Wrap a failure in the producer-facing acquisition wrapper.
    pub fn acquisition(inner: PipelineError) -> Self {
        PipelineError::Acquisition(Box::new(inner))
    }

    /// Strip any acquisition wrappers and return the originating failure.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::Acquisition(inner) => inner.root_cause(),
            other => other,
        }
    }

    /// True for the closed-pipeline rejection raised by `put`.
    pub fn is_closed(&self) -> bool {
        matches!(self, PipelineError::Closed(_))
    }

    /// True for a drain deadline expiry raised by `shutdown`.
    pub fn is_drain_timeout(&self) -> bool {
        matches!(self, PipelineError::DrainTimeout { .. })
    }
}
