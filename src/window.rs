//! Sliding encoder window over a channel's recent history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// One record in an encoder window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    /// Monotonic position in the channel's series.
    pub time_idx: i64,
    /// Categorical day bucket, fixed per channel at construction.
    pub day: String,
    /// Observed or generated value, stored with its natural sign.
    pub value: f64,
}

/// Ordered window of the most recent records for one channel, capped at
/// `max_encoder_length`. Oldest records are dropped after each append.
#[derive(Debug, Clone)]
pub struct EncoderWindow {
    records: VecDeque<WindowRecord>,
    cap: usize,
}

impl EncoderWindow {
    /// Creates a window with the given cap, seeded from historical records.
    ///
    /// Only the trailing `cap` records are kept.
    #[must_use]
    pub fn new(cap: usize, history: Vec<WindowRecord>) -> Self {
        let cap = cap.max(1);
        let mut records = VecDeque::with_capacity(cap + 1);
        let skip = history.len().saturating_sub(cap);
        for record in history.into_iter().skip(skip) {
            records.push_back(record);
        }
        Self { records, cap }
    }

    /// Appends a record and trims the window back to its cap.
    pub fn push(&mut self, record: WindowRecord) {
        self.records.push_back(record);
        while self.records.len() > self.cap {
            self.records.pop_front();
        }
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when the window holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent record, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&WindowRecord> {
        self.records.back()
    }

    /// Highest `time_idx` in the window, or -1 when empty.
    #[must_use]
    pub fn last_time_idx(&self) -> i64 {
        self.records.back().map_or(-1, |r| r.time_idx)
    }

    /// Iterates the windowed values in order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.records.iter().map(|r| r.value)
    }

    /// Sample standard deviation (ddof = 1) of the windowed values.
    ///
    /// Fewer than 2 records cannot support a variance estimate; the
    /// standard deviation is reported as 0.0 in that case.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        let n = self.records.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.values().sum::<f64>() / n as f64;
        let variance = self
            .values()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / (n - 1) as f64;
        variance.sqrt()
    }
}
