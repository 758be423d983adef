//! Persistence sink: append-only sample storage per collection.
//!
//! One collection per sensor category; one record per (machinery, head) or
//! (machinery, plc variable). Records carry bookkeeping fields alongside
//! the embedded sample list: `first_time` is set once on the first write,
//! `last_time` is overwritten on every write, `n_samples` counts writes.
//!
//! The in-memory implementation is the reference backend for embedded use
//! and tests; production backends implement the same trait.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SinkError;

/// Stable identifier of one sink record.
pub type RecordId = Uuid;

/// One appended sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEntry {
    /// Sample name (`H<nn>_<Sensor>` for multi-head, the variable name for plc).
    pub name: String,
    /// Served value, rounded to 3 decimals at the sink boundary.
    pub value: f64,
    /// Wall-clock timestamp, milliseconds since the epoch.
    pub time: i64,
}

/// One record in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkRecord {
    /// Record identifier, stable across re-initialization.
    pub id: RecordId,
    /// Owning machinery.
    pub machinery_uid: String,
    /// Head label for multi-head categories, variable name for plc.
    pub channel: String,
    /// Initialization day, formatted `%a %b %d %Y`.
    pub day: String,
    /// Timestamp of the first appended sample; set exactly once.
    pub first_time: Option<i64>,
    /// Timestamp of the most recent appended sample.
    pub last_time: Option<i64>,
    /// Number of appended samples.
    pub n_samples: u64,
    /// The samples themselves.
    pub samples: Vec<SampleEntry>,
}

/// Append-only store of generated samples.
pub trait PersistenceSink: Send + Sync {
    /// Drops a working collection. Clearing an absent collection is a no-op.
    fn clear(&self, collection: &str) -> Result<(), SinkError>;

    /// Initializes the record for a (machinery, channel) pair.
    ///
    /// Idempotent: an existing record's identifier is reused rather than
    /// creating a duplicate.
    fn init_record(
        &self,
        collection: &str,
        machinery_uid: &str,
        channel: &str,
    ) -> Result<RecordId, SinkError>;

    /// Appends one sample to a record and updates its bookkeeping fields.
    fn append(
        &self,
        collection: &str,
        id: RecordId,
        sample_name: &str,
        value: f64,
        timestamp_ms: i64,
    ) -> Result<(), SinkError>;

    /// Number of samples appended to a record so far.
    fn record_sample_count(&self, collection: &str, id: RecordId) -> Result<u64, SinkError>;

    /// Serializes a collection to `<dir>/<collection>.json`, leaving the
    /// working collection intact. Returns the written path.
    fn export_snapshot(&self, collection: &str, dir: &Path) -> Result<PathBuf, SinkError>;
}

fn lock_err(context: &'static str) -> SinkError {
    SinkError::Backend {
        message: format!("poisoned lock: {context}"),
    }
}

/// Thread-safe in-memory sink.
#[derive(Debug, Default)]
pub struct InMemorySink {
    collections: RwLock<HashMap<String, Vec<SinkRecord>>>,
}

impl InMemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a collection's records, for inspection.
    ///
    /// # Errors
    /// Fails only on a poisoned lock.
    pub fn records(&self, collection: &str) -> Result<Vec<SinkRecord>, SinkError> {
        let collections = self.collections.read().map_err(|_| lock_err("records"))?;
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }

    /// Total samples appended across a collection.
    ///
    /// # Errors
    /// Fails only on a poisoned lock.
    pub fn total_samples(&self, collection: &str) -> Result<u64, SinkError> {
        Ok(self
            .records(collection)?
            .iter()
            .map(|r| r.n_samples)
            .sum())
    }
}

impl PersistenceSink for InMemorySink {
    fn clear(&self, collection: &str) -> Result<(), SinkError> {
        let mut collections = self.collections.write().map_err(|_| lock_err("clear"))?;
        collections.remove(collection);
        Ok(())
    }

    fn init_record(
        &self,
        collection: &str,
        machinery_uid: &str,
        channel: &str,
    ) -> Result<RecordId, SinkError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| lock_err("init_record"))?;
        let records = collections.entry(collection.to_string()).or_default();

        if let Some(existing) = records
            .iter()
            .find(|r| r.machinery_uid == machinery_uid && r.channel == channel)
        {
            return Ok(existing.id);
        }

        let record = SinkRecord {
            id: Uuid::new_v4(),
            machinery_uid: machinery_uid.to_string(),
            channel: channel.to_string(),
            day: Utc::now().format("%a %b %d %Y").to_string(),
            first_time: None,
            last_time: None,
            n_samples: 0,
            samples: Vec::new(),
        };
        let id = record.id;
        records.push(record);
        Ok(id)
    }

    fn append(
        &self,
        collection: &str,
        id: RecordId,
        sample_name: &str,
        value: f64,
        timestamp_ms: i64,
    ) -> Result<(), SinkError> {
        let mut collections = self.collections.write().map_err(|_| lock_err("append"))?;
        let record = collections
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or(SinkError::RecordNotFound { id })?;

        record.samples.push(SampleEntry {
            name: sample_name.to_string(),
            value,
            time: timestamp_ms,
        });
        if record.first_time.is_none() {
            record.first_time = Some(timestamp_ms);
        }
        record.last_time = Some(timestamp_ms);
        record.n_samples += 1;
        Ok(())
    }

    fn record_sample_count(&self, collection: &str, id: RecordId) -> Result<u64, SinkError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| lock_err("record_sample_count"))?;
        collections
            .get(collection)
            .and_then(|records| records.iter().find(|r| r.id == id))
            .map(|r| r.n_samples)
            .ok_or(SinkError::RecordNotFound { id })
    }

    fn export_snapshot(&self, collection: &str, dir: &Path) -> Result<PathBuf, SinkError> {
        let records = self.records(collection)?;
        let json =
            serde_json::to_string_pretty(&records).map_err(|err| SinkError::Serialization {
                message: err.to_string(),
            })?;
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{collection}.json"));
        fs::write(&path, json)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_record_is_idempotent() {
        let sink = InMemorySink::new();
        let first = sink.init_record("eqtq", "ejda1", "Head_01").unwrap();
        let again = sink.init_record("eqtq", "ejda1", "Head_01").unwrap();
        assert_eq!(first, again);

        let other = sink.init_record("eqtq", "ejda1", "Head_02").unwrap();
        assert_ne!(first, other);
        assert_eq!(sink.records("eqtq").unwrap().len(), 2);
    }

    #[test]
    fn append_updates_bookkeeping() {
        let sink = InMemorySink::new();
        let id = sink.init_record("plc", "ejda1", "ProdSpeed").unwrap();

        sink.append("plc", id, "ProdSpeed", 40.123, 1_000).unwrap();
        sink.append("plc", id, "ProdSpeed", 41.5, 2_000).unwrap();
        sink.append("plc", id, "ProdSpeed", 39.0, 3_000).unwrap();

        let records = sink.records("plc").unwrap();
        let record = &records[0];
        assert_eq!(record.first_time, Some(1_000));
        assert_eq!(record.last_time, Some(3_000));
        assert_eq!(record.n_samples, 3);
        assert_eq!(record.samples.len(), 3);
        assert_eq!(sink.record_sample_count("plc", id).unwrap(), 3);
        assert_eq!(sink.total_samples("plc").unwrap(), 3);
    }

    #[test]
    fn append_to_unknown_record_fails() {
        let sink = InMemorySink::new();
        let err = sink
            .append("plc", Uuid::new_v4(), "ProdSpeed", 1.0, 1)
            .unwrap_err();
        assert!(matches!(err, SinkError::RecordNotFound { .. }));
    }

    #[test]
    fn clear_drops_the_collection() {
        let sink = InMemorySink::new();
        let id = sink.init_record("drive", "m1", "Head_01").unwrap();
        sink.append("drive", id, "H01_Tcpu", 55.0, 10).unwrap();

        sink.clear("drive").unwrap();
        assert!(sink.records("drive").unwrap().is_empty());
        // Clearing again is a no-op.
        sink.clear("drive").unwrap();

        // Re-initialization after a clear mints a fresh record.
        let fresh = sink.init_record("drive", "m1", "Head_01").unwrap();
        assert_ne!(fresh, id);
    }

    #[test]
    fn snapshot_export_writes_json_and_keeps_collection() {
        let sink = InMemorySink::new();
        let id = sink.init_record("eqtq", "m1", "Head_01").unwrap();
        sink.append("eqtq", id, "H01_AverageTorque", 4.2, 99).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = sink.export_snapshot("eqtq", dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "eqtq.json");

        let contents = fs::read_to_string(&path).unwrap();
        let parsed: Vec<SinkRecord> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].samples[0].name, "H01_AverageTorque");

        // Working collection is left intact for the next run.
        assert_eq!(sink.records("eqtq").unwrap().len(), 1);
    }
}
