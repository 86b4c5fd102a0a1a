//! Mock collaborators for testing without beamline hardware.
//!
//! # Available Mocks
//!
//! - `MockStage` - position provider with instantly-known readback
//! - `MockEncoder` - position provider returning deferred readbacks
//! - `MockDetector` - detector with deferred readout and optional failure
//! - `TriggeredDetector` - detector whose readouts resolve on an external trigger
//! - `RecordingSink` / `RecordingNotifier` - record publish traffic for assertions
//!
//! All mocks use async-safe operations (tokio::time::sleep, never
//! std::thread::sleep).

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tokio::time::{sleep, Duration};

use crate::point::{ResolvedPoint, ScanValue, Slot};
use crate::provider::{DetectorReadout, PositionProvider};
use crate::publish::{DataSink, ScanNotifier};

// =============================================================================
// Providers
// =============================================================================

/// Position provider whose readback is always known synchronously.
pub struct MockStage {
    name: String,
    position: Arc<RwLock<f64>>,
}

impl MockStage {
    /// New stage at position 0.0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Arc::new(RwLock::new(0.0)),
        }
    }

    /// Move to an absolute position.
    pub async fn move_abs(&self, target: f64) {
        sleep(Duration::from_millis(1)).await;
        *self.position.write().await = target;
    }
}

#[async_trait]
impl PositionProvider for MockStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn position_slot(&self) -> Result<Slot> {
        Ok(Slot::resolved(*self.position.read().await))
    }
}

/// Position provider whose readback requires simulated hardware interaction,
/// yielding a deferred slot that resolves after `latency`.
pub struct MockEncoder {
    name: String,
    latency: Duration,
    position: Arc<RwLock<f64>>,
}

impl MockEncoder {
    /// New encoder at position 0.0 with the given readback latency.
    pub fn new(name: impl Into<String>, latency: Duration) -> Self {
        Self {
            name: name.into(),
            latency,
            position: Arc::new(RwLock::new(0.0)),
        }
    }

    /// Set the position the next readback reports.
    pub async fn set_position(&self, position: f64) {
        *self.position.write().await = position;
    }
}

#[async_trait]
impl PositionProvider for MockEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn position_slot(&self) -> Result<Slot> {
        let latency = self.latency;
        let position = Arc::clone(&self.position);
        Ok(Slot::deferred(async move {
            sleep(latency).await;
            Ok(ScanValue::Scalar(*position.read().await))
        }))
    }
}

/// Detector producing deferred readouts around a base value with noise.
///
/// `fail_next` makes the following readout's deferred computation fail,
/// simulating a device communication error during a scan.
pub struct MockDetector {
    name: String,
    latency: Duration,
    base: f64,
    fail_next: Arc<AtomicBool>,
}

impl MockDetector {
    /// New detector with no readout latency.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_latency(name, Duration::ZERO)
    }

    /// New detector with the given readout latency.
    pub fn with_latency(name: impl Into<String>, latency: Duration) -> Self {
        Self {
            name: name.into(),
            latency,
            base: 100.0,
            fail_next: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make the next readout fail when resolved.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DetectorReadout for MockDetector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn readout_slot(&self) -> Result<Slot> {
        let fail = self.fail_next.swap(false, Ordering::SeqCst);
        let name = self.name.clone();
        let latency = self.latency;
        let base = self.base;
        Ok(Slot::deferred(async move {
            if latency > Duration::ZERO {
                sleep(latency).await;
            }
            if fail {
                bail!("simulated readout failure on '{name}'");
            }
            let noise: f64 = rand::thread_rng().gen_range(-0.05..0.05);
            Ok(ScanValue::Scalar(base + noise))
        }))
    }
}

/// Detector whose deferred readouts resolve only on an external trigger.
///
/// Each `readout_slot` call queues one pending readout; `trigger` releases
/// them in the order they were created. Lets tests hold the first point of a
/// scan back while later points resolve, exercising the sequencing stage.
pub struct TriggeredDetector {
    name: String,
    pending: Arc<parking_lot::Mutex<VecDeque<oneshot::Sender<Result<ScanValue>>>>>,
}

impl TriggeredDetector {
    /// New detector with no pending readouts.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pending: Arc::new(parking_lot::Mutex::new(VecDeque::new())),
        }
    }

    /// Release the oldest pending readout with `value`. Returns false when
    /// no readout is waiting.
    pub fn trigger(&self, value: impl Into<ScanValue>) -> bool {
        match self.pending.lock().pop_front() {
            Some(tx) => tx.send(Ok(value.into())).is_ok(),
            None => false,
        }
    }

    /// Fail the oldest pending readout. Returns false when none is waiting.
    pub fn fail(&self, message: &str) -> bool {
        match self.pending.lock().pop_front() {
            Some(tx) => tx.send(Err(anyhow!("{}", message))).is_ok(),
            None => false,
        }
    }

    /// Number of readouts waiting for a trigger.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl DetectorReadout for TriggeredDetector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn readout_slot(&self) -> Result<Slot> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().push_back(tx);
        Ok(Slot::deferred(async move {
            rx.await.map_err(|_| anyhow!("trigger source dropped"))?
        }))
    }
}

// =============================================================================
// Sink and notifier doubles
// =============================================================================

/// One observed sink or notifier call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// The sink appended the point with this index.
    Append(u64),
    /// The notifier broadcast the point with this index.
    Notify(u64),
    /// The sink's collection was finalized.
    CompleteCollection,
}

/// Shared, ordered log of sink and notifier traffic.
///
/// One log backs both doubles of a `recording_pair`, so tests can assert the
/// interleaving of appends and notifications, not just their counts.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<parking_lot::Mutex<Vec<SinkEvent>>>);

impl EventLog {
    fn push(&self, event: SinkEvent) {
        self.0.lock().push(event);
    }

    /// Copy of the events observed so far, in call order.
    pub fn snapshot(&self) -> Vec<SinkEvent> {
        self.0.lock().clone()
    }

    /// Indices of appended points, in append order.
    pub fn appended(&self) -> Vec<u64> {
        self.0
            .lock()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Append(index) => Some(*index),
                _ => None,
            })
            .collect()
    }

    /// How many times the collection was finalized.
    pub fn finalize_count(&self) -> usize {
        self.0
            .lock()
            .iter()
            .filter(|event| matches!(event, SinkEvent::CompleteCollection))
            .count()
    }
}

/// Sink double recording every call into an [`EventLog`].
#[derive(Debug)]
pub struct RecordingSink {
    log: EventLog,
    fail_append_on: Option<u64>,
}

impl RecordingSink {
    /// Make the append of the point with `index` fail.
    pub fn fail_append_on(&mut self, index: u64) {
        self.fail_append_on = Some(index);
    }
}

#[async_trait]
impl DataSink for RecordingSink {
    async fn append(&mut self, point: &ResolvedPoint) -> Result<()> {
        if self.fail_append_on == Some(point.index) {
            bail!("simulated sink failure appending point {}", point.index);
        }
        self.log.push(SinkEvent::Append(point.index));
        Ok(())
    }

    async fn complete_collection(&mut self) -> Result<()> {
        self.log.push(SinkEvent::CompleteCollection);
        Ok(())
    }
}

/// Notifier double recording every call into an [`EventLog`].
pub struct RecordingNotifier {
    log: EventLog,
}

#[async_trait]
impl ScanNotifier for RecordingNotifier {
    async fn notify(&mut self, _scan_name: &str, point: &ResolvedPoint) -> Result<()> {
        self.log.push(SinkEvent::Notify(point.index));
        Ok(())
    }
}

/// A sink and notifier sharing one event log.
pub fn recording_pair() -> (RecordingSink, RecordingNotifier, EventLog) {
    let log = EventLog::default();
    let sink = RecordingSink {
        log: log.clone(),
        fail_append_on: None,
    };
    let notifier = RecordingNotifier { log: log.clone() };
    (sink, notifier, log)
}
