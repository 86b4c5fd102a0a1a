//! Position and detector slot providers.
//!
//! Providers are the device-side collaborators of the pipeline. Each one
//! yields a [`Slot`] per sample: a concrete value when it is available
//! synchronously, or a deferred one-shot handle when obtaining the value
//! requires hardware interaction. Device communication itself lives behind
//! these traits and is out of scope here.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::point::{ScanPoint, Slot};

/// A participating position provider, e.g. a motor or an encoder.
#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Stable provider name, used as the slot name in points and errors.
    fn name(&self) -> &str;

    /// The provider's position for the current sample.
    ///
    /// Returns a resolved slot when the readback is cheap, or a deferred
    /// handle when it requires hardware interaction.
    async fn position_slot(&self) -> Result<Slot>;
}

/// A participating detector.
#[async_trait]
pub trait DetectorReadout: Send + Sync {
    /// Stable detector name, used as the slot name in points and errors.
    fn name(&self) -> &str;

    /// The detector's readout for the current sample.
    async fn readout_slot(&self) -> Result<Slot>;
}

/// Build one scan point by querying every provider in fixed order.
///
/// Position providers are queried first, then detectors, matching the slot
/// order later written out by sinks. Provider errors abort point
/// construction; they happen on the scan loop's thread, before admission.
pub async fn collect_point(
    index: u64,
    scan_name: &str,
    positions: &[Arc<dyn PositionProvider>],
    detectors: &[Arc<dyn DetectorReadout>],
) -> Result<ScanPoint> {
    let mut point = ScanPoint::new(index, scan_name);
    for provider in positions {
        point.add_position(provider.name(), provider.position_slot().await?);
    }
    for detector in detectors {
        point.add_detector_data(detector.name(), detector.readout_slot().await?);
    }
    Ok(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDetector, MockStage};

    #[tokio::test]
    async fn test_collect_point_preserves_provider_order() {
        let stage_x = Arc::new(MockStage::new("stage_x"));
        let stage_y = Arc::new(MockStage::new("stage_y"));
        stage_y.move_abs(2.0).await;
        let det = Arc::new(MockDetector::new("det"));

        let positions: Vec<Arc<dyn PositionProvider>> = vec![stage_x, stage_y];
        let detectors: Vec<Arc<dyn DetectorReadout>> = vec![det];

        let point = collect_point(7, "test-scan", &positions, &detectors)
            .await
            .unwrap();
        assert_eq!(point.index, 7);
        let names: Vec<_> = point.positions.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["stage_x", "stage_y"]);
        assert_eq!(point.detector_data[0].name, "det");
        assert!(point.has_deferred());
    }
}
