//! Fleet configuration model and validation.
//!
//! A [`FleetConfig`] enumerates the machineries to simulate, each with a
//! fault frequency and probability and a set of selected sensors with
//! per-sensor data frequencies. Wire names are camelCase, matching the
//! payloads produced by the operator console.
//!
//! Validation runs before any generator is constructed; a rejected
//! configuration never starts a run.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sensor::{SensorCategory, MAX_HEADS};

/// One sensor selected on a machinery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorConfig {
    /// Sensor name within its category roster.
    pub name: String,
    /// Telemetry category.
    pub category: SensorCategory,
    /// Generate a sample every `data_frequency` ticks.
    pub data_frequency: u64,
    /// Selected head indices (1..=24). Ignored for single-channel categories.
    #[serde(default)]
    pub heads: Vec<u8>,
}

/// One machinery in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineryConfig {
    /// Stable machinery identifier.
    pub uid: String,
    /// Roll for a fault every `fault_frequency` ticks.
    pub fault_frequency: u64,
    /// Probability in (0, 100] that a roll arms the pending-fault flag.
    pub fault_probability: u64,
    /// Sensors selected for generation.
    #[serde(rename = "sensorsSelected")]
    pub sensors: Vec<SensorConfig>,
}

/// Full fleet configuration carried by a start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetConfig {
    /// Machineries to simulate.
    #[serde(rename = "machineriesSelected")]
    pub machineries: Vec<MachineryConfig>,
}

impl FleetConfig {
    /// Total number of (machinery, sensor) pairs, used to size the worker pool.
    #[must_use]
    pub fn total_sensor_instances(&self) -> usize {
        self.machineries.iter().map(|m| m.sensors.len()).sum()
    }

    /// Distinct categories in use across the fleet.
    #[must_use]
    pub fn categories_in_use(&self) -> Vec<SensorCategory> {
        let mut cats = Vec::new();
        for machinery in &self.machineries {
            for sensor in &machinery.sensors {
                if !cats.contains(&sensor.category) {
                    cats.push(sensor.category);
                }
            }
        }
        cats
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] encountered; the run must not start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.machineries.is_empty() {
            return Err(ConfigError::EmptyFleet);
        }

        let mut seen = Vec::with_capacity(self.machineries.len());
        for machinery in &self.machineries {
            if seen.contains(&&machinery.uid) {
                return Err(ConfigError::DuplicateMachinery {
                    uid: machinery.uid.clone(),
                });
            }
            seen.push(&machinery.uid);
            machinery.validate()?;
        }
        Ok(())
    }
}

impl MachineryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.fault_frequency == 0 {
            return Err(ConfigError::InvalidFaultFrequency {
                uid: self.uid.clone(),
                value: self.fault_frequency,
            });
        }
        if self.fault_probability == 0 || self.fault_probability > 100 {
            return Err(ConfigError::InvalidFaultProbability {
                uid: self.uid.clone(),
                value: self.fault_probability,
            });
        }
        if self.sensors.is_empty() {
            return Err(ConfigError::NoSensors {
                uid: self.uid.clone(),
            });
        }
        for sensor in &self.sensors {
            sensor.validate(&self.uid)?;
        }
        Ok(())
    }
}

impl SensorConfig {
    fn validate(&self, uid: &str) -> Result<(), ConfigError> {
        if !self.category.roster().contains(&self.name.as_str()) {
            return Err(ConfigError::UnknownSensor {
                category: self.category,
                sensor: self.name.clone(),
            });
        }
        if self.data_frequency == 0 {
            return Err(ConfigError::InvalidDataFrequency {
                uid: uid.to_string(),
                sensor: self.name.clone(),
                value: self.data_frequency,
            });
        }
        if self.category.is_multi_head() {
            if self.heads.is_empty() {
                return Err(ConfigError::NoHeads {
                    uid: uid.to_string(),
                    sensor: self.name.clone(),
                });
            }
            for &head in &self.heads {
                if head == 0 || head > MAX_HEADS {
                    return Err(ConfigError::InvalidHead {
                        uid: uid.to_string(),
                        sensor: self.name.clone(),
                        head,
                    });
                }
            }
        }
        Ok(())
    }
}
