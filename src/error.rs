//! Error types for fleetsim.
//!
//! All errors are strongly typed using thiserror. The taxonomy follows the
//! failure domains of a simulation run: configuration rejection before a run
//! starts, per-task oracle and sink failures, and scheduler-fatal conditions
//! that abort run start.

use thiserror::Error;

use crate::sensor::SensorCategory;

/// Configuration errors, rejected before any generator is constructed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Fleet configuration contains no machineries")]
    EmptyFleet,

    #[error("Machinery '{uid}' has no sensors selected")]
    NoSensors {
        uid: String,
    },

    #[error("Duplicate machinery uid '{uid}'")]
    DuplicateMachinery {
        uid: String,
    },

    #[error("Machinery '{uid}' has fault frequency {value}, expected >= 1")]
    InvalidFaultFrequency {
        uid: String,
        value: u64,
    },

    #[error("Machinery '{uid}' has fault probability {value}, expected 1..=100")]
    InvalidFaultProbability {
        uid: String,
        value: u64,
    },

    #[error("Sensor '{sensor}' on machinery '{uid}' has data frequency {value}, expected >= 1")]
    InvalidDataFrequency {
        uid: String,
        sensor: String,
        value: u64,
    },

    #[error("Sensor '{sensor}' on machinery '{uid}' selects no heads")]
    NoHeads {
        uid: String,
        sensor: String,
    },

    #[error("Sensor '{sensor}' on machinery '{uid}' selects head {head}, expected 1..=24")]
    InvalidHead {
        uid: String,
        sensor: String,
        head: u8,
    },

    #[error("Sensor '{sensor}' is not part of the '{category}' roster")]
    UnknownSensor {
        category: SensorCategory,
        sensor: String,
    },

    #[error("No historical data for {channel}")]
    MissingHistory {
        channel: String,
    },

    #[error("Historical window for {channel} is empty")]
    EmptyHistory {
        channel: String,
    },

    #[error("Deterministic cycle for {channel} has no values")]
    EmptyCycle {
        channel: String,
    },
}

/// Errors surfaced by a forecast oracle call. Isolated to one generation
/// attempt; the scheduler and sibling tasks are unaffected.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {message}")]
    Unavailable {
        message: String,
    },

    #[error("Oracle returned {actual} steps, expected at least {expected}")]
    ShortHorizon {
        expected: usize,
        actual: usize,
    },

    #[error("Oracle returned an empty quantile row at step {step}")]
    EmptyQuantiles {
        step: usize,
    },
}

/// Persistence-sink errors. Same isolation semantics as [`OracleError`].
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Record not found: {id}")]
    RecordNotFound {
        id: uuid::Uuid,
    },

    #[error("Sink backend error: {message}")]
    Backend {
        message: String,
    },

    #[error("Snapshot serialization failed: {message}")]
    Serialization {
        message: String,
    },

    #[error("Snapshot export I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scheduler-fatal errors that abort a run start entirely.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("A simulation run is already in progress")]
    AlreadyRunning,

    #[error("Worker pool could not be created: {message}")]
    PoolSpawn {
        message: String,
    },

    #[error("Generation queue is full (capacity {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Generation queue is disconnected")]
    Disconnected,
}

/// Top-level error type for fleetsim.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl SimError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this error is isolated to one dispatched task.
    ///
    /// Isolated errors are logged at the task boundary; they never abort the
    /// scheduler or other in-flight tasks.
    #[must_use]
    pub const fn is_task_isolated(&self) -> bool {
        matches!(self, Self::Oracle(_) | Self::Sink(_))
    }

    /// Returns true if this error aborts run start.
    #[must_use]
    pub const fn is_run_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Scheduler(_))
    }
}

/// Result type alias for fleetsim operations.
pub type SimResult<T> = Result<T, SimError>;
