//! Per-sensor sample generator.
//!
//! A [`Generator`] fans one sensor instance out across its heads: multi-head
//! categories own one [`RollingWindowBuffer`] per head, single-channel
//! categories exactly one. Whether the sensor is deterministic is decided
//! once at construction and the refill strategy never changes mid-run.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::buffer::{BufferParams, RollingWindowBuffer, DEFAULT_BIAS_PERCENT, DEFAULT_STD_MULTIPLIER};
use crate::catalog::{CatalogEntry, DeterministicCatalog, DeterministicSpec, TypeCatalog};
use crate::config::SensorConfig;
use crate::error::{ConfigError, SimError, SimResult};
use crate::history::HistoryProvider;
use crate::oracle::ForecastOracle;
use crate::sensor::{head_label, SensorCategory, INVERTED_OUTPUT_SENSOR};

/// One generated sample, shaped by the sensor's category.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// One value per head, sharing a single wall-clock timestamp.
    MultiHead {
        /// Timestamp at serve time.
        taken_at: DateTime<Utc>,
        /// Head label to value.
        heads: BTreeMap<String, f64>,
    },
    /// A single-channel value.
    Single {
        /// Timestamp at serve time.
        taken_at: DateTime<Utc>,
        /// The value.
        value: f64,
    },
}

impl Sample {
    /// Number of values carried by this sample.
    #[must_use]
    pub fn value_count(&self) -> usize {
        match self {
            Self::MultiHead { heads, .. } => heads.len(),
            Self::Single { .. } => 1,
        }
    }

    /// Timestamp shared by all values of this sample.
    #[must_use]
    pub const fn taken_at(&self) -> DateTime<Utc> {
        match self {
            Self::MultiHead { taken_at, .. } | Self::Single { taken_at, .. } => *taken_at,
        }
    }
}

/// Channel fan-out of one sensor instance, resolved once at construction.
#[derive(Debug)]
enum Channels {
    MultiHead(BTreeMap<String, RollingWindowBuffer>),
    Single(RollingWindowBuffer),
}

/// Sample generator for one (machinery, sensor) pair.
#[derive(Debug)]
pub struct Generator {
    channels: Channels,
    /// Buffered values left before the next lockstep refill.
    remaining: usize,
    horizon: usize,
}

impl Generator {
    /// Builds the generator for a sensor instance.
    ///
    /// Initial encoder windows are loaded per head from `history`; the
    /// deterministic catalog is consulted once to select the refill
    /// strategy for the sensor's whole lifetime.
    ///
    /// # Errors
    /// Configuration errors (missing or empty history, malformed catalog
    /// entry) abort generator construction and therefore the run start.
    pub fn new(
        machinery_uid: &str,
        sensor: &SensorConfig,
        history: &dyn HistoryProvider,
        catalog: &DeterministicCatalog,
        types: &TypeCatalog,
        oracle: Arc<dyn ForecastOracle>,
        params: BufferParams,
    ) -> SimResult<Self> {
        let kind = types.kind(sensor.category, &sensor.name);
        let invert = sensor.name == INVERTED_OUTPUT_SENSOR;
        let entry = catalog.get(sensor.category, &sensor.name);

        let channels = if sensor.category.is_multi_head() {
            let mut heads = BTreeMap::new();
            for &index in &sensor.heads {
                let label = head_label(index);
                let channel = format!(
                    "{machinery_uid}/{}/{}/{label}",
                    sensor.category, sensor.name
                );
                let series = history.initial_window(
                    machinery_uid,
                    sensor.category,
                    &sensor.name,
                    Some(&label),
                )?;
                let buffer = match entry {
                    Some(entry) => {
                        let spec = head_spec(entry, &sensor.name, &label, sensor.category)?;
                        RollingWindowBuffer::deterministic(
                            params, kind, invert, spec, series, &channel,
                        )?
                    }
                    None => RollingWindowBuffer::stochastic(
                        params,
                        kind,
                        invert,
                        Arc::clone(&oracle),
                        series,
                        &channel,
                    )?,
                };
                heads.insert(label, buffer);
            }
            Channels::MultiHead(heads)
        } else {
            let channel = format!("{machinery_uid}/{}/{}", sensor.category, sensor.name);
            let series =
                history.initial_window(machinery_uid, sensor.category, &sensor.name, None)?;
            let buffer = match entry {
                Some(entry) => {
                    let spec = single_spec(entry, &sensor.name, sensor.category)?;
                    RollingWindowBuffer::deterministic(params, kind, invert, spec, series, &channel)?
                }
                None => RollingWindowBuffer::stochastic(
                    params,
                    kind,
                    invert,
                    Arc::clone(&oracle),
                    series,
                    &channel,
                )?,
            };
            Channels::Single(buffer)
        };

        Ok(Self {
            channels,
            remaining: 0,
            horizon: params.max_prediction_length,
        })
    }

    /// Serves the next sample, refilling every head in lockstep when the
    /// shared cursor is exhausted.
    ///
    /// # Errors
    /// An oracle failure aborts only this generation attempt; the buffers
    /// remain consistent for the next call.
    pub fn get_values(&mut self) -> SimResult<Sample> {
        if self.remaining == 0 {
            match &mut self.channels {
                Channels::MultiHead(heads) => {
                    // Plan every head before committing any of them: a failed
                    // oracle call must not leave earlier heads a batch ahead
                    // of their siblings.
                    let mut batches = Vec::with_capacity(heads.len());
                    for buffer in heads.values_mut() {
                        batches.push(buffer.plan_refill()?);
                    }
                    for (buffer, batch) in heads.values_mut().zip(batches) {
                        buffer.commit_refill(batch);
                    }
                }
                Channels::Single(buffer) => buffer.refill()?,
            }
            self.remaining = self.horizon;
        }

        let taken_at = Utc::now();
        let sample = match &mut self.channels {
            Channels::MultiHead(heads) => {
                let mut values = BTreeMap::new();
                for (label, buffer) in heads.iter_mut() {
                    let value = buffer.take_buffered().ok_or_else(drained)?;
                    values.insert(label.clone(), value);
                }
                Sample::MultiHead {
                    taken_at,
                    heads: values,
                }
            }
            Channels::Single(buffer) => Sample::Single {
                taken_at,
                value: buffer.take_buffered().ok_or_else(drained)?,
            },
        };
        self.remaining -= 1;
        Ok(sample)
    }

    /// Serves a fault sample. The lookahead and the shared cursor are left
    /// untouched.
    #[must_use]
    pub fn gen_fault(&mut self, std_multiplier: f64, bias_percent: f64) -> Sample {
        let taken_at = Utc::now();
        match &mut self.channels {
            Channels::MultiHead(heads) => {
                let mut values = BTreeMap::new();
                for (label, buffer) in heads.iter_mut() {
                    values.insert(label.clone(), buffer.fault_level(std_multiplier, bias_percent));
                }
                Sample::MultiHead {
                    taken_at,
                    heads: values,
                }
            }
            Channels::Single(buffer) => Sample::Single {
                taken_at,
                value: buffer.fault_level(std_multiplier, bias_percent),
            },
        }
    }

    /// [`Self::gen_fault`] with the default perturbation parameters.
    #[must_use]
    pub fn gen_fault_default(&mut self) -> Sample {
        self.gen_fault(DEFAULT_STD_MULTIPLIER, DEFAULT_BIAS_PERCENT)
    }

    /// Returns true if the sensor was classified deterministic.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        match &self.channels {
            Channels::MultiHead(heads) => {
                heads.values().next().is_some_and(RollingWindowBuffer::is_deterministic)
            }
            Channels::Single(buffer) => buffer.is_deterministic(),
        }
    }
}

fn drained() -> SimError {
    SimError::internal("lookahead drained out of lockstep with the refill cursor")
}

fn head_spec(
    entry: &CatalogEntry,
    sensor: &str,
    label: &str,
    category: SensorCategory,
) -> Result<DeterministicSpec, ConfigError> {
    match entry {
        CatalogEntry::PerHead(heads) => heads
            .get(label)
            .map(|&value| DeterministicSpec::Fixed { value })
            .ok_or_else(|| ConfigError::MissingHistory {
                channel: format!("{category}/{sensor}/{label} (catalog)"),
            }),
        CatalogEntry::Single(_) => Err(ConfigError::UnknownSensor {
            category,
            sensor: sensor.to_string(),
        }),
    }
}

fn single_spec(
    entry: &CatalogEntry,
    sensor: &str,
    category: SensorCategory,
) -> Result<DeterministicSpec, ConfigError> {
    match entry {
        CatalogEntry::Single(spec) => Ok(spec.clone()),
        CatalogEntry::PerHead(_) => Err(ConfigError::UnknownSensor {
            category,
            sensor: sensor.to_string(),
        }),
    }
}
