//! Bounded, order-preserving concurrent pipeline.
//!
//! The scan loop admits points through `put` up to a fixed capacity, a
//! worker pool resolves the slots of several points concurrently, and a
//! single dedicated sequencing task reassembles the out-of-order completions
//! and publishes strictly in submission order.
//!
//! # Architecture
//!
//! ```text
//! put → capacity semaphore → resolver task (pool of W) ─┐
//!                                                       ├→ sequencing task → sink → notifier
//! put → capacity semaphore → resolver task ─────────────┘     (holding map, next-expected index)
//! ```
//!
//! Each admitted point holds one capacity permit until the sequencing task
//! retires it, so a fast scan loop can run at most `N` points ahead of
//! persistence. Failures on a worker are recorded and surfaced to the
//! producer at its next call against the pipeline, which is the only place
//! the scan loop can meaningfully react.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{PipelineSettings, DEFAULT_POINT_QUEUE_LENGTH, DEFAULT_RESOLVER_POOL_SIZE};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{PipelineState, ScanDataPointPipeline};
use crate::point::{ResolvedPoint, ScanPoint};
use crate::publish::{DataSink, PointPublisher, ScanNotifier};
use crate::resolve;

/// Builder for [`ConcurrentPipeline`].
pub struct PipelineBuilder {
    name: Option<String>,
    point_queue_length: usize,
    resolver_pool_size: usize,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Builder with default capacity and pool size.
    pub fn new() -> Self {
        Self {
            name: None,
            point_queue_length: DEFAULT_POINT_QUEUE_LENGTH,
            resolver_pool_size: DEFAULT_RESOLVER_POOL_SIZE,
        }
    }

    /// Builder seeded from loaded settings.
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new()
            .point_queue_length(settings.point_queue_length)
            .resolver_pool_size(settings.resolver_pool_size)
    }

    /// Human-readable pipeline/scan name, used in error messages and file
    /// naming. Generated when not set.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// How many points the admission buffer holds before `put` blocks.
    pub fn point_queue_length(mut self, length: usize) -> Self {
        self.point_queue_length = length;
        self
    }

    /// How many points may resolve their slots concurrently.
    pub fn resolver_pool_size(mut self, size: usize) -> Self {
        self.resolver_pool_size = size;
        self
    }

    /// Create the pipeline, bound to one sink and one notifier, and spawn
    /// its sequencing task.
    pub fn build(
        self,
        sink: Box<dyn DataSink>,
        notifier: Box<dyn ScanNotifier>,
    ) -> ConcurrentPipeline {
        let name = self
            .name
            .unwrap_or_else(|| format!("scan-{}", &Uuid::new_v4().to_string()[..8]));
        let queue_length = self.point_queue_length.max(1);
        let pool_size = self.resolver_pool_size.max(1);
        if queue_length != self.point_queue_length || pool_size != self.resolver_pool_size {
            warn!(pipeline = %name, "queue length and pool size must be at least 1, clamping");
        }

        info!(
            "Creating scan data point pipeline '{}' which can hold {} points before blocking, \
             resolving up to {} points concurrently",
            name, queue_length, pool_size
        );

        let shared = Arc::new(Shared {
            name: name.clone(),
            admission: Mutex::new(Admission {
                state: PipelineState::Open,
                submitted: 0,
            }),
            failure: Mutex::new(None),
        });
        let (sequencer_tx, sequencer_rx) = mpsc::unbounded_channel();
        let (retired_tx, retired_rx) = watch::channel(0u64);
        let publisher = PointPublisher::new(sink, notifier, name);
        tokio::spawn(run_sequencer(
            publisher,
            sequencer_rx,
            retired_tx,
            Arc::clone(&shared),
        ));

        ConcurrentPipeline {
            shared,
            capacity: Arc::new(Semaphore::new(queue_length)),
            workers: Arc::new(Semaphore::new(pool_size)),
            sequencer_tx,
            retired: retired_rx,
        }
    }
}

struct Admission {
    state: PipelineState,
    /// Points admitted so far; doubles as the next submission sequence.
    submitted: u64,
}

struct Shared {
    name: String,
    admission: Mutex<Admission>,
    /// First recorded failure, already wrapped for the producer. Sticky: it
    /// is cloned out on surfacing, never cleared, so `shutdown` re-reports
    /// what an earlier `put` reported.
    failure: Mutex<Option<PipelineError>>,
}

enum PointOutcome {
    Resolved(ResolvedPoint),
    Failed(PipelineError),
    /// Worker pool was closed by an abrupt shutdown before resolution ran.
    Discarded,
}

struct CompletedPoint {
    seq: u64,
    outcome: PointOutcome,
    /// Admission permit, held until the sequencing task retires the point.
    _permit: OwnedSemaphorePermit,
}

enum SequencerMessage {
    Point(CompletedPoint),
    Finalize(oneshot::Sender<PipelineResult<()>>),
}

/// Bounded pipeline resolving points concurrently and publishing in strict
/// submission order.
///
/// Share it between the scan loop and an abort controller behind an `Arc`;
/// every method takes `&self` and `shutdown_now` is safe concurrently with
/// an in-flight `put`. Dropping the pipeline without a shutdown call ends
/// the sequencing task without finalizing the sink.
pub struct ConcurrentPipeline {
    shared: Arc<Shared>,
    capacity: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    sequencer_tx: mpsc::UnboundedSender<SequencerMessage>,
    retired: watch::Receiver<u64>,
}

impl ConcurrentPipeline {
    /// Pipeline name, as used in error messages.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    fn closed_error(&self) -> PipelineError {
        PipelineError::Closed(self.shared.name.clone())
    }

    fn recorded_failure(&self) -> Option<PipelineError> {
        self.shared.failure.lock().clone()
    }

    /// Ask the sequencing task to finalize the sink's collection. The task
    /// guards against double finalization, so this is idempotent across any
    /// sequence of shutdown calls.
    async fn finalize(&self) -> PipelineResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.sequencer_tx
            .send(SequencerMessage::Finalize(ack_tx))
            .map_err(|_| PipelineError::Sink("sequencing stage terminated".to_string()))?;
        match ack_rx.await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Sink(
                "sequencing stage dropped the finalize request".to_string(),
            )),
        }
    }
}

#[async_trait]
impl ScanDataPointPipeline for ConcurrentPipeline {
    async fn put(&self, point: ScanPoint) -> PipelineResult<()> {
        if self.state() != PipelineState::Open {
            return Err(self.closed_error());
        }
        // Failures happen on workers, away from the producer; they are
        // surfaced here, at the producer's next synchronous boundary.
        if let Some(recorded) = self.recorded_failure() {
            return Err(recorded);
        }

        // Backpressure: one permit per point in flight, held until the
        // sequencing task retires the point.
        let permit = match Arc::clone(&self.capacity).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Err(self.closed_error()),
        };
        let seq = {
            let mut admission = self.shared.admission.lock();
            if admission.state != PipelineState::Open {
                return Err(self.closed_error());
            }
            let seq = admission.submitted;
            admission.submitted += 1;
            seq
        };
        debug!(pipeline = %self.shared.name, point = point.index, seq, "admitted scan point");

        let workers = Arc::clone(&self.workers);
        let tx = self.sequencer_tx.clone();
        tokio::spawn(async move {
            let outcome = match workers.acquire().await {
                Ok(guard) => {
                    let outcome = match resolve::resolve(point).await {
                        Ok(resolved) => PointOutcome::Resolved(resolved),
                        Err(err) => PointOutcome::Failed(err.into()),
                    };
                    drop(guard);
                    outcome
                }
                Err(_) => PointOutcome::Discarded,
            };
            // Send failure means the pipeline is gone; the point is lost
            // along with it.
            let _ = tx.send(SequencerMessage::Point(CompletedPoint {
                seq,
                outcome,
                _permit: permit,
            }));
        });
        Ok(())
    }

    async fn shutdown(&self, timeout: Duration) -> PipelineResult<()> {
        let (target, already_closed) = {
            let mut admission = self.shared.admission.lock();
            let already_closed = admission.state == PipelineState::Closed;
            if admission.state == PipelineState::Open {
                admission.state = PipelineState::Draining;
            }
            (admission.submitted, already_closed)
        };

        if !already_closed {
            info!(
                pipeline = %self.shared.name,
                points = target,
                "draining scan data point pipeline"
            );
            let mut retired = self.retired.clone();
            let drain_result =
                tokio::time::timeout(timeout, retired.wait_for(|count| *count >= target)).await;
            match drain_result {
                Ok(Ok(_)) => {}
                Ok(Err(_)) => {
                    return Err(PipelineError::Sink(
                        "sequencing stage terminated before drain completed".to_string(),
                    ));
                }
                Err(_) => {
                    warn!(
                        pipeline = %self.shared.name,
                        ?timeout,
                        "drain deadline elapsed, outstanding workers continue in the background"
                    );
                    return Err(PipelineError::DrainTimeout {
                        name: self.shared.name.clone(),
                        timeout,
                    });
                }
            }
        }

        self.finalize().await?;
        self.shared.admission.lock().state = PipelineState::Closed;

        if let Some(recorded) = self.recorded_failure() {
            return Err(PipelineError::acquisition(recorded));
        }
        Ok(())
    }

    async fn shutdown_now(&self) -> PipelineResult<()> {
        {
            let mut admission = self.shared.admission.lock();
            if admission.state == PipelineState::Open {
                admission.state = PipelineState::Draining;
            }
        }
        info!(pipeline = %self.shared.name, "abrupt shutdown, discarding unpublished points");
        // Wake any producer blocked in put and abort queued resolutions.
        self.capacity.close();
        self.workers.close();

        self.finalize().await?;
        self.shared.admission.lock().state = PipelineState::Closed;

        if let Some(recorded) = self.recorded_failure() {
            return Err(PipelineError::acquisition(recorded));
        }
        Ok(())
    }

    fn state(&self) -> PipelineState {
        self.shared.admission.lock().state
    }
}

/// The dedicated sequencing stage.
///
/// Owns the publisher outright: all sink and notifier calls happen on this
/// task, so neither collaborator needs internal synchronization for
/// ordering. Completions arrive in arbitrary order and are parked in an
/// index-keyed holding map, drained greedily from the next expected
/// submission index.
async fn run_sequencer(
    mut publisher: PointPublisher,
    mut rx: mpsc::UnboundedReceiver<SequencerMessage>,
    retired_tx: watch::Sender<u64>,
    shared: Arc<Shared>,
) {
    let mut pending: BTreeMap<u64, CompletedPoint> = BTreeMap::new();
    let mut next_expected: u64 = 0;
    // Once halted, points are retired without publishing: either a failure
    // was recorded, or an abrupt shutdown discarded the remaining stream.
    let mut halted = false;
    let mut finalized = false;

    while let Some(message) = rx.recv().await {
        match message {
            SequencerMessage::Point(completed) => {
                pending.insert(completed.seq, completed);
                while let Some(completed) = pending.remove(&next_expected) {
                    let seq = completed.seq;
                    match completed.outcome {
                        PointOutcome::Resolved(point) => {
                            if halted {
                                debug!(%point, seq, "dropping resolved point, pipeline halted");
                            } else if let Err(err) = publisher.publish(&point).await {
                                warn!(%point, seq, error = %err, "publish failed, halting output");
                                record_failure(&shared, err);
                                halted = true;
                            }
                        }
                        PointOutcome::Failed(err) => {
                            if halted {
                                debug!(seq, error = %err, "dropping failed point, pipeline halted");
                            } else {
                                warn!(seq, error = %err, "point failed to resolve, halting output");
                                record_failure(&shared, err);
                                halted = true;
                            }
                        }
                        PointOutcome::Discarded => {}
                    }
                    next_expected += 1;
                    let _ = retired_tx.send(next_expected);
                    // The admission permit releases here, unblocking a
                    // producer waiting in put.
                }
            }
            SequencerMessage::Finalize(ack) => {
                halted = true;
                // Abrupt shutdown: out-of-order completions still parked are
                // discarded along with their admission permits.
                pending.clear();
                let result = if finalized {
                    Ok(())
                } else {
                    finalized = true;
                    publisher.complete_collection().await
                };
                let _ = ack.send(result);
            }
        }
    }
}

/// Record the first failure for lazy surfacing; later ones only get logged.
fn record_failure(shared: &Shared, err: PipelineError) {
    let mut failure = shared.failure.lock();
    if failure.is_none() {
        *failure = Some(PipelineError::acquisition(err));
    } else {
        debug!(error = %err, "additional failure after pipeline already failed");
    }
}
