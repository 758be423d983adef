//! Historical-data boundary.
//!
//! Initial encoder windows are supplied by the upstream extraction job; this
//! module defines the contract plus a thread-safe in-memory implementation
//! for embedded use and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::error::ConfigError;
use crate::sensor::SensorCategory;
use crate::window::WindowRecord;

/// Historical series for one channel, as extracted upstream.
#[derive(Debug, Clone)]
pub struct HistorySeries {
    /// Trailing records of the channel, oldest first.
    pub records: Vec<WindowRecord>,
    /// Timestamp of the last observation; its day-of-month becomes the
    /// channel's day bucket.
    pub last_observed: DateTime<Utc>,
}

/// Supplies initial encoder windows per channel.
pub trait HistoryProvider: Send + Sync {
    /// Historical series for a channel. `head` is `None` for single-channel
    /// categories.
    ///
    /// # Errors
    /// [`ConfigError::MissingHistory`] when the channel has no extracted data.
    fn initial_window(
        &self,
        machinery_uid: &str,
        category: SensorCategory,
        sensor: &str,
        head: Option<&str>,
    ) -> Result<HistorySeries, ConfigError>;
}

fn channel_key(
    machinery_uid: &str,
    category: SensorCategory,
    sensor: &str,
    head: Option<&str>,
) -> String {
    match head {
        Some(head) => format!("{machinery_uid}/{category}/{sensor}/{head}"),
        None => format!("{machinery_uid}/{category}/{sensor}"),
    }
}

/// In-memory history provider.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    series: RwLock<HashMap<String, HistorySeries>>,
}

impl InMemoryHistory {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the series for a channel, replacing any previous one.
    pub fn insert(
        &self,
        machinery_uid: &str,
        category: SensorCategory,
        sensor: &str,
        head: Option<&str>,
        series: HistorySeries,
    ) {
        let key = channel_key(machinery_uid, category, sensor, head);
        if let Ok(mut map) = self.series.write() {
            map.insert(key, series);
        }
    }
}

impl HistoryProvider for InMemoryHistory {
    fn initial_window(
        &self,
        machinery_uid: &str,
        category: SensorCategory,
        sensor: &str,
        head: Option<&str>,
    ) -> Result<HistorySeries, ConfigError> {
        let key = channel_key(machinery_uid, category, sensor, head);
        let map = self.series.read().map_err(|_| ConfigError::MissingHistory {
            channel: key.clone(),
        })?;
        map.get(&key)
            .cloned()
            .ok_or(ConfigError::MissingHistory { channel: key })
    }
}
