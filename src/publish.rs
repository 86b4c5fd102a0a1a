//! Point publishing: persistent sink plus broadcast notification.
//!
//! The publisher passes each fully-resolved point first to the data sink's
//! append operation and then to the notifier, in that fixed order, once per
//! point. Neither collaborator is safe for reentrant concurrent use; in the
//! concurrent pipeline only the sequencing stage touches them.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::point::ResolvedPoint;

/// The persistent storage collaborator.
///
/// `complete_collection` must be invoked exactly once per pipeline lifetime,
/// at the end of shutdown, regardless of success or failure; the pipeline
/// enforces this.
#[async_trait]
pub trait DataSink: Send + std::fmt::Debug {
    /// Append one resolved point to the collection.
    async fn append(&mut self, point: &ResolvedPoint) -> Result<()>;

    /// Finalize the collection. Called exactly once, after the last append.
    async fn complete_collection(&mut self) -> Result<()>;
}

/// The broadcast capability telling other system parts a point was written.
#[async_trait]
pub trait ScanNotifier: Send {
    /// Notify observers of one published point. Called once per point,
    /// immediately after the sink append.
    async fn notify(&mut self, scan_name: &str, point: &ResolvedPoint) -> Result<()>;
}

/// Notifier that drops every notification.
///
/// For scans nothing observes, e.g. unit tests of sink behaviour.
#[derive(Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl ScanNotifier for NullNotifier {
    async fn notify(&mut self, _scan_name: &str, _point: &ResolvedPoint) -> Result<()> {
        Ok(())
    }
}

/// Notifier fanning resolved points out over a bounded mpsc channel.
///
/// Uses the lossless mpsc pattern rather than a broadcast channel: a slow
/// subscriber slows the sequencing stage down instead of silently losing
/// points. A vanished subscriber is not an error; notifications are then
/// dropped at debug level.
pub struct ChannelNotifier {
    tx: mpsc::Sender<Arc<ResolvedPoint>>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end observers consume.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<ResolvedPoint>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ScanNotifier for ChannelNotifier {
    async fn notify(&mut self, scan_name: &str, point: &ResolvedPoint) -> Result<()> {
        if self.tx.send(Arc::new(point.clone())).await.is_err() {
            debug!(scan = scan_name, point = point.index, "no subscriber for point notification");
        }
        Ok(())
    }
}

/// Publishes fully-resolved points: sink append, then notification.
pub struct PointPublisher {
    sink: Box<dyn DataSink>,
    notifier: Box<dyn ScanNotifier>,
    scan_name: String,
}

impl PointPublisher {
    /// Bind a publisher to one sink, one notifier and the owning scan.
    pub fn new(
        sink: Box<dyn DataSink>,
        notifier: Box<dyn ScanNotifier>,
        scan_name: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            notifier,
            scan_name: scan_name.into(),
        }
    }

    /// Name of the owning scan, passed to the notifier with each point.
    pub fn scan_name(&self) -> &str {
        &self.scan_name
    }

    /// Append `point` to the sink, then notify observers.
    ///
    /// Only ever called with points in submission order, once per point.
    /// A failed append drops the notification as well; the point must never
    /// be partially published.
    pub async fn publish(&mut self, point: &ResolvedPoint) -> PipelineResult<()> {
        self.sink
            .append(point)
            .await
            .map_err(|e| PipelineError::Sink(format!("append failed for {point}: {e:#}")))?;
        self.notifier
            .notify(&self.scan_name, point)
            .await
            .map_err(|e| PipelineError::Sink(format!("notify failed for {point}: {e:#}")))?;
        debug!(scan = %self.scan_name, point = point.index, "published scan point");
        Ok(())
    }

    /// Finalize the sink's collection.
    pub async fn complete_collection(&mut self) -> PipelineResult<()> {
        self.sink
            .complete_collection()
            .await
            .map_err(|e| PipelineError::Sink(format!("complete_collection failed: {e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{recording_pair, SinkEvent};
    use crate::point::{NamedValue, ScanValue};
    use chrono::Utc;

    fn resolved_point(index: u64) -> ResolvedPoint {
        ResolvedPoint {
            index,
            scan_name: "test-scan".to_string(),
            unique_name: None,
            total_points: None,
            metadata: None,
            resolved_at: Utc::now(),
            positions: vec![NamedValue {
                name: "stage_x".to_string(),
                value: ScanValue::Scalar(index as f64),
            }],
            detector_data: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_publish_appends_before_notifying() {
        let (sink, notifier, log) = recording_pair();
        let mut publisher = PointPublisher::new(Box::new(sink), Box::new(notifier), "test-scan");

        publisher.publish(&resolved_point(0)).await.unwrap();
        publisher.publish(&resolved_point(1)).await.unwrap();
        publisher.complete_collection().await.unwrap();

        assert_eq!(
            log.snapshot(),
            vec![
                SinkEvent::Append(0),
                SinkEvent::Notify(0),
                SinkEvent::Append(1),
                SinkEvent::Notify(1),
                SinkEvent::CompleteCollection,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_append_skips_notification() {
        let (mut sink, notifier, log) = recording_pair();
        sink.fail_append_on(0);
        let mut publisher = PointPublisher::new(Box::new(sink), Box::new(notifier), "test-scan");

        let err = publisher.publish(&resolved_point(0)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Sink(_)));
        assert!(log.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_channel_notifier_delivers_points() {
        let (mut notifier, mut rx) = ChannelNotifier::new(4);
        let point = resolved_point(3);
        notifier.notify("test-scan", &point).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.index, 3);
    }

    #[tokio::test]
    async fn test_channel_notifier_tolerates_dropped_subscriber() {
        let (mut notifier, rx) = ChannelNotifier::new(4);
        drop(rx);
        notifier.notify("test-scan", &resolved_point(0)).await.unwrap();
    }
}
