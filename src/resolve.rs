//! Slot resolution: forcing deferred slots to concrete values.

use chrono::Utc;

use crate::error::{ResolutionError, SlotKind};
use crate::point::{NamedValue, ResolvedPoint, ScanPoint, ScanValue, Slot, SlotEntry};

/// Force every deferred slot in `point` to its concrete value.
///
/// Slots are awaited in provider order; resolution of independent slots
/// within one point carries no ordering requirement, and resolution across
/// different points runs concurrently in the pipeline. Each deferred handle
/// is invoked at most once. A failure is terminal for the point and is not
/// retried; the returned [`ResolutionError`] names the failing slot and
/// carries the underlying cause's message.
pub async fn resolve(point: ScanPoint) -> Result<ResolvedPoint, ResolutionError> {
    let ScanPoint {
        index,
        scan_name,
        unique_name,
        total_points,
        metadata,
        positions,
        detector_data,
    } = point;

    let positions = resolve_slots(positions, SlotKind::Position, index).await?;
    let detector_data = resolve_slots(detector_data, SlotKind::Detector, index).await?;

    Ok(ResolvedPoint {
        index,
        scan_name,
        unique_name,
        total_points,
        metadata,
        resolved_at: Utc::now(),
        positions,
        detector_data,
    })
}

async fn resolve_slots(
    entries: Vec<SlotEntry>,
    kind: SlotKind,
    point: u64,
) -> Result<Vec<NamedValue>, ResolutionError> {
    let mut resolved = Vec::with_capacity(entries.len());
    for SlotEntry { name, slot } in entries {
        let value = resolve_slot(slot)
            .await
            .map_err(|cause| ResolutionError::new(kind, &name, point, format!("{cause:#}")))?;
        resolved.push(NamedValue { name, value });
    }
    Ok(resolved)
}

async fn resolve_slot(slot: Slot) -> anyhow::Result<ScanValue> {
    match slot {
        Slot::Resolved(value) => Ok(value),
        Slot::Deferred(handle) => handle.resolve().await,
    }
}
