//! Integration tests for failure surfacing.
//!
//! Resolution happens on workers, away from the producer, so failures are
//! detected lazily: they are raised at the producer's next call against the
//! pipeline, never thrown into an unrelated task, and never lost. A failed
//! point is dropped from the output stream along with every later point;
//! the sink is still finalized exactly once.

use anyhow::anyhow;
use scan_daq::error::PipelineError;
use scan_daq::mock::{recording_pair, TriggeredDetector};
use scan_daq::pipeline::{PipelineBuilder, ScanDataPointPipeline};
use scan_daq::point::{ScanPoint, Slot};
use scan_daq::provider::DetectorReadout;
use std::time::Duration;
use tokio::time::sleep;

fn eager_point(index: u64) -> ScanPoint {
    let mut point = ScanPoint::new(index, "failure-scan");
    point.add_position("stage_x", Slot::resolved(index as f64));
    point
}

fn failing_point(index: u64) -> ScanPoint {
    let mut point = eager_point(index);
    point.add_detector_data(
        "det",
        Slot::deferred(async { Err(anyhow!("detector fault")) }),
    );
    point
}

#[tokio::test]
async fn test_deferred_failure_surfaces_on_next_put() {
    let (sink, notifier, log) = recording_pair();
    let pipeline = PipelineBuilder::new()
        .name("failure-scan")
        .build(Box::new(sink), Box::new(notifier));

    // The put that carries the doomed point succeeds; the failure has not
    // happened yet.
    pipeline.put(failing_point(0)).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let err = pipeline.put(eager_point(1)).await.unwrap_err();
    let PipelineError::Acquisition(inner) = &err else {
        panic!("expected acquisition wrapper, got {err}");
    };
    let PipelineError::Resolution(resolution) = inner.as_ref() else {
        panic!("expected resolution cause, got {inner}");
    };
    assert_eq!(resolution.slot, "det");
    assert_eq!(resolution.point, 0);
    assert!(resolution.message.contains("detector fault"));

    assert!(log.appended().is_empty());
}

#[tokio::test]
async fn test_failure_re_raised_from_shutdown_after_put_observed_it() {
    let (sink, notifier, log) = recording_pair();
    let pipeline = PipelineBuilder::new()
        .name("failure-scan")
        .build(Box::new(sink), Box::new(notifier));

    pipeline.put(failing_point(0)).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    pipeline.put(eager_point(1)).await.unwrap_err();

    // Shutdown finalizes the sink, then re-raises the recorded failure with
    // a second wrapper layer.
    let err = pipeline.shutdown(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(
        &err,
        PipelineError::Acquisition(inner) if matches!(inner.as_ref(), PipelineError::Acquisition(_))
    ));
    assert!(matches!(
        err.root_cause(),
        PipelineError::Resolution(resolution) if resolution.slot == "det"
    ));
    assert_eq!(log.finalize_count(), 1);
}

#[tokio::test]
async fn test_failure_surfaces_from_shutdown_when_no_further_put_occurs() {
    let (sink, notifier, log) = recording_pair();
    let pipeline = PipelineBuilder::new()
        .name("failure-scan")
        .build(Box::new(sink), Box::new(notifier));

    pipeline.put(failing_point(0)).await.unwrap();

    let err = pipeline.shutdown(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(
        err.root_cause(),
        PipelineError::Resolution(resolution) if resolution.point == 0
    ));
    assert_eq!(log.finalize_count(), 1);
    assert!(log.appended().is_empty());
}

#[tokio::test]
async fn test_points_before_failure_publish_and_later_points_are_dropped() {
    let (sink, notifier, log) = recording_pair();
    let pipeline = PipelineBuilder::new()
        .name("failure-scan")
        .point_queue_length(3)
        .build(Box::new(sink), Box::new(notifier));

    pipeline.put(eager_point(0)).await.unwrap();
    pipeline.put(failing_point(1)).await.unwrap();
    pipeline.put(eager_point(2)).await.unwrap();

    let err = pipeline.shutdown(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(
        err.root_cause(),
        PipelineError::Resolution(resolution) if resolution.point == 1
    ));

    // Point 0 made it out before the failure; point 2 resolved fine but is
    // dropped, never published out of order or after a gap.
    assert_eq!(log.appended(), vec![0]);
    assert_eq!(log.finalize_count(), 1);
}

#[tokio::test]
async fn test_failure_held_back_by_trigger_drops_already_resolved_followers() {
    let detector = TriggeredDetector::new("det");
    let (sink, notifier, log) = recording_pair();
    let pipeline = PipelineBuilder::new()
        .name("failure-scan")
        .point_queue_length(3)
        .build(Box::new(sink), Box::new(notifier));

    let mut gated = eager_point(0);
    gated.add_detector_data("det", detector.readout_slot().await.unwrap());
    pipeline.put(gated).await.unwrap();
    pipeline.put(eager_point(1)).await.unwrap();
    pipeline.put(eager_point(2)).await.unwrap();

    // Points 1 and 2 resolve while point 0 is outstanding, then point 0
    // fails: nothing may publish.
    sleep(Duration::from_millis(100)).await;
    assert!(detector.fail("sensor dropout"));

    let err = pipeline.shutdown(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(
        err.root_cause(),
        PipelineError::Resolution(resolution)
            if resolution.point == 0 && resolution.message.contains("sensor dropout")
    ));
    assert!(log.appended().is_empty());
    assert_eq!(log.finalize_count(), 1);
}

#[tokio::test]
async fn test_sink_append_failure_surfaces_like_a_resolution_failure() {
    let (mut sink, notifier, log) = recording_pair();
    sink.fail_append_on(0);
    let pipeline = PipelineBuilder::new()
        .name("failure-scan")
        .build(Box::new(sink), Box::new(notifier));

    pipeline.put(eager_point(0)).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let err = pipeline.put(eager_point(1)).await.unwrap_err();
    assert!(matches!(err.root_cause(), PipelineError::Sink(_)));

    // The failed append never notified, and nothing later published.
    pipeline.shutdown(Duration::from_secs(1)).await.unwrap_err();
    assert!(log.snapshot().iter().all(|e| !matches!(e, scan_daq::mock::SinkEvent::Notify(_))));
    assert_eq!(log.finalize_count(), 1);
}
