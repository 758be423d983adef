//! Deterministic replay and type catalogs.
//!
//! Both catalogs are produced by an upstream classification job over the raw
//! historical data: sensors whose variance falls below threshold are
//! classified deterministic and replayed from the [`DeterministicCatalog`]
//! instead of forecast; the [`TypeCatalog`] records whether a sensor's values
//! are integer or floating point. Catalogs are immutable for a given run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::sensor::{SensorCategory, ValueKind};

/// Replay recipe for one deterministic channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DeterministicSpec {
    /// A single representative value, repeated indefinitely.
    Fixed {
        /// The value.
        value: f64,
    },
    /// A small fixed sequence replayed with wraparound. Alarm/state-style
    /// sensors encode their last two observed transition values as a
    /// 2-entry cycle.
    Cycle {
        /// The values, in replay order.
        values: Vec<f64>,
    },
    /// A cumulative counter that grows by `step` for every produced value.
    Counter {
        /// Starting value.
        base: f64,
        /// Increment per produced value.
        step: f64,
    },
}

/// Catalog entry for one deterministic sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatalogEntry {
    /// Multi-head sensors: one representative value per head label.
    PerHead(HashMap<String, f64>),
    /// Single-channel sensors: a full replay spec.
    Single(DeterministicSpec),
}

/// Lookup of deterministic sensors, keyed by category then sensor name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeterministicCatalog {
    entries: HashMap<SensorCategory, HashMap<String, CatalogEntry>>,
}

impl DeterministicCatalog {
    /// Creates an empty catalog (every sensor stochastic).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry for a sensor.
    pub fn insert(&mut self, category: SensorCategory, sensor: &str, entry: CatalogEntry) {
        self.entries
            .entry(category)
            .or_default()
            .insert(sensor.to_string(), entry);
    }

    /// Looks up the entry for a sensor, if it is classified deterministic.
    #[must_use]
    pub fn get(&self, category: SensorCategory, sensor: &str) -> Option<&CatalogEntry> {
        self.entries.get(&category)?.get(sensor)
    }

    /// Returns true if the sensor is classified deterministic.
    #[must_use]
    pub fn is_deterministic(&self, category: SensorCategory, sensor: &str) -> bool {
        self.get(category, sensor).is_some()
    }
}

/// Lookup of value kinds, keyed by category then sensor name.
///
/// Sensors absent from the catalog default to [`ValueKind::Float`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeCatalog {
    entries: HashMap<SensorCategory, HashMap<String, ValueKind>>,
}

impl TypeCatalog {
    /// Creates an empty catalog (every sensor float).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the value kind of a sensor.
    pub fn insert(&mut self, category: SensorCategory, sensor: &str, kind: ValueKind) {
        self.entries
            .entry(category)
            .or_default()
            .insert(sensor.to_string(), kind);
    }

    /// Value kind for a sensor, defaulting to float.
    #[must_use]
    pub fn kind(&self, category: SensorCategory, sensor: &str) -> ValueKind {
        self.entries
            .get(&category)
            .and_then(|sensors| sensors.get(sensor))
            .copied()
            .unwrap_or(ValueKind::Float)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_classification() {
        let mut catalog = DeterministicCatalog::new();
        catalog.insert(
            SensorCategory::Plc,
            "OperationMode",
            CatalogEntry::Single(DeterministicSpec::Fixed { value: 2.0 }),
        );

        assert!(catalog.is_deterministic(SensorCategory::Plc, "OperationMode"));
        assert!(!catalog.is_deterministic(SensorCategory::Plc, "ProdSpeed"));
        assert!(!catalog.is_deterministic(SensorCategory::Eqtq, "OperationMode"));
    }

    #[test]
    fn per_head_entries_keep_head_values() {
        let mut heads = HashMap::new();
        heads.insert("Head_01".to_string(), 1.5);
        heads.insert("Head_02".to_string(), 2.5);

        let mut catalog = DeterministicCatalog::new();
        catalog.insert(SensorCategory::Eqtq, "Index", CatalogEntry::PerHead(heads));

        let Some(CatalogEntry::PerHead(map)) = catalog.get(SensorCategory::Eqtq, "Index") else {
            panic!("expected per-head entry");
        };
        assert_eq!(map.get("Head_02"), Some(&2.5));
    }

    #[test]
    fn type_catalog_defaults_to_float() {
        let mut types = TypeCatalog::new();
        types.insert(SensorCategory::Plc, "Alarm", ValueKind::Int);

        assert_eq!(types.kind(SensorCategory::Plc, "Alarm"), ValueKind::Int);
        assert_eq!(types.kind(SensorCategory::Plc, "ProdSpeed"), ValueKind::Float);
    }

    #[test]
    fn deterministic_spec_serde_round_trip() {
        let spec = DeterministicSpec::Counter {
            base: 1000.0,
            step: 10.0,
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: DeterministicSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);

        let cycle: DeterministicSpec =
            serde_json::from_str(r#"{"kind":"cycle","values":[0.0,3.0]}"#).unwrap();
        assert_eq!(
            cycle,
            DeterministicSpec::Cycle {
                values: vec![0.0, 3.0]
            }
        );
    }
}
