//! Integration tests for the sequential pipeline.
//!
//! The sequential variant resolves and publishes each point inside `put`,
//! so ordering is the call order, failures surface immediately, and there
//! is never buffered work to drain.

use anyhow::anyhow;
use scan_daq::error::PipelineError;
use scan_daq::mock::{recording_pair, SinkEvent};
use scan_daq::pipeline::{PipelineState, ScanDataPointPipeline, SequentialPipeline};
use scan_daq::point::{ScanPoint, ScanValue, Slot};
use std::time::Duration;
use tokio::time::sleep;
use tokio_test::assert_ok;

fn eager_point(index: u64) -> ScanPoint {
    let mut point = ScanPoint::new(index, "step-scan");
    point.add_position("stage_x", Slot::resolved(index as f64));
    point.add_detector_data("det", Slot::resolved(index as f64 * 10.0));
    point
}

#[tokio::test]
async fn test_points_resolve_and_publish_inside_put() {
    let (sink, notifier, log) = recording_pair();
    let pipeline = SequentialPipeline::new("step-scan", Box::new(sink), Box::new(notifier));

    // Deferred slots are forced inline; put blocks the caller across them.
    for index in 0..3u64 {
        let mut point = eager_point(index);
        point.add_detector_data(
            "slow_det",
            Slot::deferred(async move {
                sleep(Duration::from_millis(10)).await;
                Ok(ScanValue::Scalar(index as f64))
            }),
        );
        assert_ok!(pipeline.put(point).await);
    }
    assert_ok!(pipeline.shutdown(Duration::from_secs(1)).await);

    assert_eq!(
        log.snapshot(),
        vec![
            SinkEvent::Append(0),
            SinkEvent::Notify(0),
            SinkEvent::Append(1),
            SinkEvent::Notify(1),
            SinkEvent::Append(2),
            SinkEvent::Notify(2),
            SinkEvent::CompleteCollection,
        ]
    );
}

#[tokio::test]
async fn test_resolution_failure_propagates_from_the_same_put() {
    let (sink, notifier, log) = recording_pair();
    let pipeline = SequentialPipeline::new("step-scan", Box::new(sink), Box::new(notifier));

    let mut point = eager_point(0);
    point.add_detector_data(
        "det",
        Slot::deferred(async { Err(anyhow!("detector fault")) }),
    );

    let err = pipeline.put(point).await.unwrap_err();
    assert!(matches!(
        err.root_cause(),
        PipelineError::Resolution(resolution)
            if resolution.slot == "det" && resolution.message.contains("detector fault")
    ));

    // The failed point was dropped; the scan may continue with the next one.
    assert_ok!(pipeline.put(eager_point(1)).await);
    assert_ok!(pipeline.shutdown(Duration::from_secs(1)).await);
    assert_eq!(log.appended(), vec![1]);
}

#[tokio::test]
async fn test_put_after_shutdown_is_rejected() {
    let (sink, notifier, _log) = recording_pair();
    let pipeline = SequentialPipeline::new("step-scan", Box::new(sink), Box::new(notifier));

    assert_ok!(pipeline.shutdown_now().await);
    let err = pipeline.put(eager_point(0)).await.unwrap_err();
    assert!(err.is_closed());
    assert_eq!(
        err.to_string(),
        "Could not add new point to step-scan as it is shutdown."
    );
}

#[tokio::test]
async fn test_repeated_shutdowns_finalize_once() {
    let (sink, notifier, log) = recording_pair();
    let pipeline = SequentialPipeline::new("step-scan", Box::new(sink), Box::new(notifier));

    assert_eq!(pipeline.state(), PipelineState::Open);
    assert_ok!(pipeline.shutdown(Duration::from_secs(1)).await);
    assert_ok!(pipeline.shutdown_now().await);
    assert_ok!(pipeline.shutdown(Duration::from_secs(1)).await);

    assert_eq!(log.finalize_count(), 1);
    assert_eq!(pipeline.state(), PipelineState::Closed);
}
