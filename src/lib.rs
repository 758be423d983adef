//! # fleetsim - industrial machinery telemetry simulator
//!
//! fleetsim generates plausible time-series telemetry for a fleet of
//! machines. Each selected sensor streams samples at its own cadence, with
//! occasional fault samples injected per machinery, and everything is
//! appended to a persistence sink.
//!
//! ## Core Concepts
//!
//! - **RollingWindowBuffer**: per-channel sliding encoder window plus a
//!   lookahead queue, turning the forecast oracle's batched predictions into
//!   a sequential stream of values
//! - **Generator**: fans one sensor instance out across its heads, refilling
//!   all heads in lockstep
//! - **Scheduler**: the tick loop driving fault rolls, frequency gating, and
//!   dispatch onto a bounded worker pool
//! - **DeterministicCatalog**: sensors with below-threshold variance are
//!   replayed from a catalog instead of forecast
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fleetsim::{
//!     FleetConfig, InMemoryHistory, InMemorySink, Scheduler, SchedulerConfig,
//!     SchedulerDeps, DeterministicCatalog, TypeCatalog,
//! };
//!
//! let deps = SchedulerDeps {
//!     oracle: my_oracle,
//!     history: Arc::new(my_history),
//!     sink: Arc::new(InMemorySink::new()),
//!     catalog: Arc::new(DeterministicCatalog::new()),
//!     types: Arc::new(TypeCatalog::new()),
//! };
//! let scheduler = Scheduler::new(deps, SchedulerConfig::default());
//! let report = scheduler.start(&fleet_config)?; // blocks until stop()
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod catalog;
pub mod config;
pub mod error;
pub mod generator;
pub mod history;
pub mod oracle;
pub mod scheduler;
pub mod sensor;
pub mod sink;
pub mod window;

// Re-export primary types at crate root for convenience
pub use buffer::{BufferParams, RollingWindowBuffer, DEFAULT_BIAS_PERCENT, DEFAULT_STD_MULTIPLIER};
pub use catalog::{CatalogEntry, DeterministicCatalog, DeterministicSpec, TypeCatalog};
pub use config::{FleetConfig, MachineryConfig, SensorConfig};
pub use error::{ConfigError, OracleError, SchedulerError, SimError, SimResult, SinkError};
pub use generator::{Generator, Sample};
pub use history::{HistoryProvider, HistorySeries, InMemoryHistory};
pub use oracle::{ForecastBatch, ForecastOracle};
pub use scheduler::{RunCounters, RunReport, Scheduler, SchedulerConfig, SchedulerDeps};
pub use sensor::{head_label, head_sample_name, SensorCategory, ValueKind};
pub use sink::{InMemorySink, PersistenceSink, RecordId, SampleEntry, SinkRecord};
pub use window::{EncoderWindow, WindowRecord};
