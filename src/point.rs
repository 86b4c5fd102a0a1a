//! Scan point data model.
//!
//! A [`ScanPoint`] is one sample in a scan: an ordered set of position slots
//! and an ordered set of detector-data slots, inserted in a fixed provider
//! order. Each [`Slot`] is either an already-resolved [`ScanValue`] or a
//! [`DeferredValue`], a one-shot asynchronous computation supplied by the
//! collaborating provider when the value requires hardware interaction.
//!
//! Resolution consumes the point and produces a [`ResolvedPoint`], which is
//! immutable and safe to read from any thread.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// A single position or detector value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScanValue {
    /// A scalar reading, the common case for positions.
    Scalar(f64),
    /// A vector reading, e.g. a spectrum or a waveform.
    Array(Vec<f64>),
    /// A textual reading, e.g. an enum-valued device state.
    Text(String),
}

impl ScanValue {
    /// Flatten to a single `f64` where the value permits it.
    ///
    /// Scalars convert directly, single-element arrays unwrap, and text is
    /// parsed when it holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScanValue::Scalar(v) => Some(*v),
            ScanValue::Array(values) if values.len() == 1 => Some(values[0]),
            ScanValue::Array(_) => None,
            ScanValue::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl fmt::Display for ScanValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanValue::Scalar(v) => write!(f, "{}", v),
            ScanValue::Array(values) => {
                let joined = values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                write!(f, "[{}]", joined)
            }
            ScanValue::Text(text) => write!(f, "{}", text),
        }
    }
}

impl From<f64> for ScanValue {
    fn from(value: f64) -> Self {
        ScanValue::Scalar(value)
    }
}

impl From<Vec<f64>> for ScanValue {
    fn from(values: Vec<f64>) -> Self {
        ScanValue::Array(values)
    }
}

impl From<&str> for ScanValue {
    fn from(text: &str) -> Self {
        ScanValue::Text(text.to_string())
    }
}

/// A one-shot asynchronous value computation.
///
/// Supplied by a position or detector provider when the value is not known
/// at point-construction time. The computation is invoked exactly once:
/// resolving consumes the handle, so a second invocation cannot happen.
pub struct DeferredValue {
    future: BoxFuture<'static, anyhow::Result<ScanValue>>,
}

impl DeferredValue {
    /// Wrap a future producing the eventual value or its failure.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<ScanValue>> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
        }
    }

    /// Run the computation to completion, consuming the handle.
    pub async fn resolve(self) -> anyhow::Result<ScanValue> {
        self.future.await
    }
}

impl fmt::Debug for DeferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeferredValue(..)")
    }
}

/// One value slot of a scan point.
#[derive(Debug)]
pub enum Slot {
    /// The value was available when the point was constructed.
    Resolved(ScanValue),
    /// The value is supplied by a deferred one-shot computation.
    Deferred(DeferredValue),
}

impl Slot {
    /// Slot holding an already-known value.
    pub fn resolved(value: impl Into<ScanValue>) -> Self {
        Slot::Resolved(value.into())
    }

    /// Slot backed by a deferred computation.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<ScanValue>> + Send + 'static,
    {
        Slot::Deferred(DeferredValue::new(future))
    }

    /// True when the value still needs to be computed.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Slot::Deferred(_))
    }
}

/// A named slot, in provider order.
#[derive(Debug)]
pub struct SlotEntry {
    /// Name of the provider that supplied the slot.
    pub name: String,
    /// The slot itself.
    pub slot: Slot,
}

/// One sample of a running scan, prior to resolution.
///
/// Created by the scan loop per sample; slots are filled by collaborators at
/// construction time, some eagerly and some as deferred handles. The point
/// is handed to a pipeline via `put` and discarded after publish.
#[derive(Debug)]
pub struct ScanPoint {
    /// Monotonically increasing sequence index assigned by the scan loop.
    pub index: u64,
    /// Label of the owning scan, used for notifications and file naming.
    pub scan_name: String,
    /// Optional human-readable unique identity for this point.
    pub unique_name: Option<String>,
    /// Total number of points in the scan, when known up front.
    pub total_points: Option<u64>,
    /// Free-form metadata attached to this specific point.
    pub metadata: Option<serde_json::Value>,
    /// Position slots, one per participating position provider.
    pub positions: Vec<SlotEntry>,
    /// Detector-data slots, one per participating detector.
    pub detector_data: Vec<SlotEntry>,
}

impl ScanPoint {
    /// Create an empty point for the given scan.
    pub fn new(index: u64, scan_name: impl Into<String>) -> Self {
        Self {
            index,
            scan_name: scan_name.into(),
            unique_name: None,
            total_points: None,
            metadata: None,
            positions: Vec::new(),
            detector_data: Vec::new(),
        }
    }

    /// Attach a human-readable unique name.
    pub fn with_unique_name(mut self, unique_name: impl Into<String>) -> Self {
        self.unique_name = Some(unique_name.into());
        self
    }

    /// Record the total number of points in the owning scan.
    pub fn with_total_points(mut self, total_points: u64) -> Self {
        self.total_points = Some(total_points);
        self
    }

    /// Attach free-form metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Append a position slot. Call once per provider, in provider order.
    pub fn add_position(&mut self, name: impl Into<String>, slot: Slot) {
        self.positions.push(SlotEntry {
            name: name.into(),
            slot,
        });
    }

    /// Append a detector-data slot. Call once per detector, in provider order.
    pub fn add_detector_data(&mut self, name: impl Into<String>, slot: Slot) {
        self.detector_data.push(SlotEntry {
            name: name.into(),
            slot,
        });
    }

    /// True when any slot still holds a deferred computation.
    pub fn has_deferred(&self) -> bool {
        self.positions
            .iter()
            .chain(self.detector_data.iter())
            .any(|entry| entry.slot.is_deferred())
    }
}

/// A named, concrete value of a resolved point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    /// Name of the provider that supplied the value.
    pub name: String,
    /// The concrete value.
    pub value: ScanValue,
}

/// A fully-resolved scan point.
///
/// Every slot holds its concrete value; the point is immutable and safe to
/// share across threads. This is the only shape the publisher accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedPoint {
    /// Sequence index assigned at creation time by the scan loop.
    pub index: u64,
    /// Label of the owning scan.
    pub scan_name: String,
    /// Optional human-readable unique identity.
    pub unique_name: Option<String>,
    /// Total number of points in the scan, when known.
    pub total_points: Option<u64>,
    /// Free-form metadata carried over from the scan point.
    pub metadata: Option<serde_json::Value>,
    /// When resolution of the last slot completed.
    pub resolved_at: DateTime<Utc>,
    /// Position values, in provider order.
    pub positions: Vec<NamedValue>,
    /// Detector-data values, in provider order.
    pub detector_data: Vec<NamedValue>,
}

impl ResolvedPoint {
    /// Look up a position value by provider name.
    pub fn position(&self, name: &str) -> Option<&ScanValue> {
        self.positions
            .iter()
            .find(|nv| nv.name == name)
            .map(|nv| &nv.value)
    }

    /// Look up a detector value by detector name.
    pub fn detector_data(&self, name: &str) -> Option<&ScanValue> {
        self.detector_data
            .iter()
            .find(|nv| nv.name == name)
            .map(|nv| &nv.value)
    }

    /// All values in output order, positions first.
    pub fn all_values(&self) -> impl Iterator<Item = &NamedValue> {
        self.positions.iter().chain(self.detector_data.iter())
    }

    /// Position values flattened to doubles, where they permit it.
    pub fn positions_as_f64(&self) -> Vec<Option<f64>> {
        self.positions.iter().map(|nv| nv.value.as_f64()).collect()
    }
}

impl fmt::Display for ResolvedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identifier = self.unique_name.as_deref().unwrap_or(&self.scan_name);
        match self.total_points {
            Some(total) => write!(
                f,
                "ScanPoint [point={}/{}, scan={}]",
                self.index + 1,
                total,
                identifier
            ),
            None => write!(f, "ScanPoint [point={}, scan={}]", self.index + 1, identifier),
        }
    }
}
