//! Sensor categories, head labels, and value kinds.
//!
//! A fleet exposes three sensor categories. `eqtq` (capping-head torque) and
//! `drive` (drive temperatures) are multi-head: one physical measurement
//! channel per machine head, up to 24 per machinery. `plc` variables are
//! single-channel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Highest head index a machinery can expose.
pub const MAX_HEADS: u8 = 24;

/// Sensor roster for the `eqtq` category.
pub const EQTQ_SENSORS: &[&str] = &[
    "LockDegree",
    "Index",
    "stsClosureOK",
    "stsNoLoad",
    "MaxLockPosition",
    "stsBadClosure",
    "AverageTorque",
    "stsTotalCount",
    "MinLockPosition",
    "stsNoClosure",
    "AverageFriction",
];

/// Sensor roster for the `drive` category.
pub const DRIVE_SENSORS: &[&str] = &["Tcpu", "Twindings", "Tboard", "Tplate"];

/// Variable roster for the `plc` category.
pub const PLC_SENSORS: &[&str] = &[
    "OperationMode",
    "Alarm",
    "OperationState",
    "MainMotorSpeed",
    "MainMotorCurrent",
    "HeadMotorSpeed",
    "HeadMotorCurrent",
    "ProdSpeed",
    "PowerVoltage",
    "PowerCurrent",
    "AirConsumption",
    "LubeLevel",
    "test1",
    "test2",
    "test3",
    "TotalProduct",
];

/// Sensor whose served values are sign-inverted on output only.
pub const INVERTED_OUTPUT_SENSOR: &str = "AverageFriction";

/// Telemetry category of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorCategory {
    /// Capping-head torque sensors (multi-head).
    Eqtq,
    /// Drive temperature sensors (multi-head).
    Drive,
    /// PLC variables (single-channel).
    Plc,
}

impl SensorCategory {
    /// Persistence collection name for this category.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Eqtq => "eqtq",
            Self::Drive => "drive",
            Self::Plc => "plc",
        }
    }

    /// Returns true for categories with one channel per machine head.
    #[must_use]
    pub const fn is_multi_head(self) -> bool {
        matches!(self, Self::Eqtq | Self::Drive)
    }

    /// Known sensor names for this category.
    #[must_use]
    pub const fn roster(self) -> &'static [&'static str] {
        match self {
            Self::Eqtq => EQTQ_SENSORS,
            Self::Drive => DRIVE_SENSORS,
            Self::Plc => PLC_SENSORS,
        }
    }
}

impl fmt::Display for SensorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// Numeric kind of a channel's values, governing rounding of served samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Values are rounded to the nearest integer when buffered and served.
    Int,
    /// Values pass through unrounded.
    Float,
}

impl ValueKind {
    /// Applies this kind's rounding rule to a raw value.
    #[must_use]
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Int => value.round(),
            Self::Float => value,
        }
    }
}

/// Label for one machine head, e.g. `Head_07`.
#[must_use]
pub fn head_label(index: u8) -> String {
    format!("Head_{index:02}")
}

/// Sample-name prefix form of a head label, e.g. `H07_AverageTorque`.
#[must_use]
pub fn head_sample_name(index: u8, sensor: &str) -> String {
    format!("H{index:02}_{sensor}")
}
