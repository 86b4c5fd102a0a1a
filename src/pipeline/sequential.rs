//! Single-threaded pipeline: resolve and publish inside `put`.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{PipelineState, ScanDataPointPipeline};
use crate::point::ScanPoint;
use crate::publish::{DataSink, PointPublisher, ScanNotifier};
use crate::resolve;

/// Pipeline that resolves and publishes each point synchronously.
///
/// `put` blocks the caller across any deferred slots and returns only after
/// the point has been appended and notified, so there is never buffered
/// work: ordering is trivially the call order, and failures surface
/// immediately from the `put` that caused them. For scans with no
/// asynchronous device reads.
pub struct SequentialPipeline {
    name: String,
    state: parking_lot::Mutex<PipelineState>,
    inner: tokio::sync::Mutex<Inner>,
}

struct Inner {
    publisher: PointPublisher,
    finalized: bool,
}

impl SequentialPipeline {
    /// Create a pipeline bound to one sink and one notifier.
    pub fn new(
        name: impl Into<String>,
        sink: Box<dyn DataSink>,
        notifier: Box<dyn ScanNotifier>,
    ) -> Self {
        let name = name.into();
        info!(pipeline = %name, "Creating sequential scan data point pipeline");
        let publisher = PointPublisher::new(sink, notifier, name.clone());
        Self {
            name,
            state: parking_lot::Mutex::new(PipelineState::Open),
            inner: tokio::sync::Mutex::new(Inner {
                publisher,
                finalized: false,
            }),
        }
    }

    /// Pipeline name, as used in error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn close(&self) -> PipelineResult<()> {
        {
            let mut state = self.state.lock();
            if *state == PipelineState::Open {
                *state = PipelineState::Draining;
            }
        }
        let mut inner = self.inner.lock().await;
        if !inner.finalized {
            inner.publisher.complete_collection().await?;
            inner.finalized = true;
            info!(pipeline = %self.name, "scan data collection completed");
        }
        *self.state.lock() = PipelineState::Closed;
        Ok(())
    }
}

#[async_trait]
impl ScanDataPointPipeline for SequentialPipeline {
    async fn put(&self, point: ScanPoint) -> PipelineResult<()> {
        if *self.state.lock() != PipelineState::Open {
            return Err(PipelineError::Closed(self.name.clone()));
        }
        let resolved = resolve::resolve(point)
            .await
            .map_err(|e| PipelineError::acquisition(e.into()))?;
        let mut inner = self.inner.lock().await;
        inner.publisher.publish(&resolved).await
    }

    async fn shutdown(&self, _timeout: Duration) -> PipelineResult<()> {
        self.close().await
    }

    async fn shutdown_now(&self) -> PipelineResult<()> {
        self.close().await
    }

    fn state(&self) -> PipelineState {
        *self.state.lock()
    }
}
