//! # Scan DAQ Core Library
//!
//! Scan data point pipeline for a beamline data-acquisition stack. A running
//! scan emits sample points, instrument positions plus detector readouts,
//! some of whose values are supplied by deferred asynchronous computations.
//! The pipeline guarantees that points are persisted and broadcast in strict
//! submission order while resolving different points' deferred values
//! concurrently, with bounded memory so a fast scan loop cannot outrun
//! storage.
//!
//! ## Crate Structure
//!
//! - **`config`**: Structures for loading and validating settings from TOML
//!   files. See `config::Settings`.
//! - **`error`**: The `PipelineError` taxonomy surfaced to the producer.
//! - **`point`**: The `ScanPoint` / `Slot` data model and the immutable
//!   `ResolvedPoint` produced by resolution.
//! - **`resolve`**: Forces deferred slots to concrete values.
//! - **`publish`**: `DataSink` and `ScanNotifier` collaborator seams plus
//!   the `PointPublisher` that drives them in the fixed append-then-notify
//!   order.
//! - **`provider`**: Capability traits for the position and detector
//!   collaborators that fill a point's slots.
//! - **`pipeline`**: The two pipeline variants. `SequentialPipeline`
//!   resolves and publishes synchronously inside `put`;
//!   `ConcurrentPipeline` is the bounded, order-preserving variant with a
//!   resolver worker pool and a dedicated sequencing stage.
//! - **`storage`**: File-backed reference sinks (CSV).
//! - **`mock`**: Simulated providers, sink and notifier for tests and
//!   development without beamline hardware.
//! - **`trace`**: Structured logging setup on `tracing-subscriber`.

pub mod config;
pub mod error;
pub mod mock;
pub mod pipeline;
pub mod point;
pub mod provider;
pub mod publish;
pub mod resolve;
pub mod storage;
pub mod trace;
