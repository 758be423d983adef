//! Rolling-window buffer: the per-channel generation state machine.
//!
//! Each channel owns a sliding [`EncoderWindow`] and a lookahead queue of
//! not-yet-served future values. When the lookahead runs dry the buffer
//! refills it in one shot: stochastic channels ask the forecast oracle for a
//! batch and keep the median trajectory; deterministic channels replay their
//! catalog entry. Fault samples perturb the most recent window value and
//! never consume the lookahead.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;

use crate::catalog::DeterministicSpec;
use crate::error::{ConfigError, OracleError};
use crate::history::HistorySeries;
use crate::oracle::ForecastOracle;
use crate::sensor::ValueKind;
use crate::window::{EncoderWindow, WindowRecord};

/// Default fault standard-deviation multiplier.
pub const DEFAULT_STD_MULTIPLIER: f64 = 3.0;
/// Default fault bias used when the window carries no variance.
pub const DEFAULT_BIAS_PERCENT: f64 = 0.1;

/// Window and lookahead sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferParams {
    /// Encoder window cap.
    pub max_encoder_length: usize,
    /// Lookahead batch size produced per refill.
    pub max_prediction_length: usize,
}

impl Default for BufferParams {
    fn default() -> Self {
        Self {
            max_encoder_length: 10,
            max_prediction_length: 5,
        }
    }
}

/// Stateful replay of a deterministic catalog entry.
///
/// The cycle cursor and the running counter persist across refills.
#[derive(Debug, Clone)]
struct DeterministicReplay {
    spec: DeterministicSpec,
    cursor: usize,
    counter: Option<f64>,
}

impl DeterministicReplay {
    fn new(spec: DeterministicSpec) -> Self {
        Self {
            spec,
            cursor: 0,
            counter: None,
        }
    }

    fn next(&mut self) -> f64 {
        match &self.spec {
            DeterministicSpec::Fixed { value } => *value,
            DeterministicSpec::Cycle { values } => {
                // Empty cycles are rejected at construction.
                let value = values[self.cursor];
                self.cursor = (self.cursor + 1) % values.len();
                value
            }
            DeterministicSpec::Counter { base, step } => {
                let next = self.counter.unwrap_or(*base) + step;
                self.counter = Some(next);
                next
            }
        }
    }
}

/// Where refill batches come from. Fixed at construction for the channel's
/// whole lifetime.
enum RefillSource {
    Oracle(Arc<dyn ForecastOracle>),
    Deterministic(DeterministicReplay),
}

impl std::fmt::Debug for RefillSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oracle(_) => f.debug_tuple("Oracle").finish(),
            Self::Deterministic(replay) => f.debug_tuple("Deterministic").field(replay).finish(),
        }
    }
}

/// Per-channel rolling-window buffer.
#[derive(Debug)]
pub struct RollingWindowBuffer {
    window: EncoderWindow,
    lookahead: VecDeque<f64>,
    source: RefillSource,
    kind: ValueKind,
    invert_output: bool,
    day: String,
    next_time_idx: i64,
    params: BufferParams,
}

impl RollingWindowBuffer {
    /// Builds a stochastic buffer backed by a forecast oracle.
    ///
    /// # Errors
    /// [`ConfigError::EmptyHistory`] when the initial window has no records.
    pub fn stochastic(
        params: BufferParams,
        kind: ValueKind,
        invert_output: bool,
        oracle: Arc<dyn ForecastOracle>,
        history: HistorySeries,
        channel: &str,
    ) -> Result<Self, ConfigError> {
        Self::build(params, kind, invert_output, RefillSource::Oracle(oracle), history, channel)
    }

    /// Builds a deterministic buffer replaying a catalog entry.
    ///
    /// # Errors
    /// [`ConfigError::EmptyHistory`] when the initial window has no records;
    /// [`ConfigError::EmptyCycle`] when a cycle entry carries no values.
    pub fn deterministic(
        params: BufferParams,
        kind: ValueKind,
        invert_output: bool,
        spec: DeterministicSpec,
        history: HistorySeries,
        channel: &str,
    ) -> Result<Self, ConfigError> {
        if matches!(&spec, DeterministicSpec::Cycle { values } if values.is_empty()) {
            return Err(ConfigError::EmptyCycle {
                channel: channel.to_string(),
            });
        }
        Self::build(
            params,
            kind,
            invert_output,
            RefillSource::Deterministic(DeterministicReplay::new(spec)),
            history,
            channel,
        )
    }

    fn build(
        params: BufferParams,
        kind: ValueKind,
        invert_output: bool,
        source: RefillSource,
        history: HistorySeries,
        channel: &str,
    ) -> Result<Self, ConfigError> {
        if history.records.is_empty() {
            return Err(ConfigError::EmptyHistory {
                channel: channel.to_string(),
            });
        }
        let day = history.last_observed.day().to_string();
        let window = EncoderWindow::new(params.max_encoder_length, history.records);
        let next_time_idx = window.last_time_idx() + 1;
        Ok(Self {
            window,
            lookahead: VecDeque::with_capacity(params.max_prediction_length),
            source,
            kind,
            invert_output,
            day,
            next_time_idx,
            params,
        })
    }

    /// Returns true if this channel replays a deterministic catalog entry.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        matches!(self.source, RefillSource::Deterministic(_))
    }

    /// Returns true when the lookahead is exhausted.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.lookahead.is_empty()
    }

    /// Current window length (test and introspection surface).
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Produces one batch of `max_prediction_length` future values and
    /// appends them to the window.
    ///
    /// # Errors
    /// Oracle failures abort this refill; the buffer state is unchanged.
    pub fn refill(&mut self) -> Result<(), OracleError> {
        let values = self.plan_refill()?;
        self.commit_refill(values);
        Ok(())
    }

    /// Computes the next refill batch without touching the window or the
    /// lookahead. Multi-head generators plan every head before committing
    /// any of them, so one failed oracle call leaves no sibling a batch
    /// ahead.
    pub(crate) fn plan_refill(&mut self) -> Result<Vec<f64>, OracleError> {
        let horizon = self.params.max_prediction_length;
        match &mut self.source {
            RefillSource::Oracle(oracle) => {
                let batch = oracle.predict(&self.window)?;
                if batch.horizon() < horizon {
                    return Err(OracleError::ShortHorizon {
                        expected: horizon,
                        actual: batch.horizon(),
                    });
                }
                let mut median = batch.median()?;
                median.truncate(horizon);
                Ok(median)
            }
            RefillSource::Deterministic(replay) => {
                Ok((0..horizon).map(|_| replay.next()).collect())
            }
        }
    }

    /// Pushes a planned batch into the window and the lookahead.
    pub(crate) fn commit_refill(&mut self, values: Vec<f64>) {
        for raw in values {
            let stored = self.kind.apply(raw);
            self.window.push(WindowRecord {
                time_idx: self.next_time_idx,
                day: self.day.clone(),
                value: stored,
            });
            self.next_time_idx += 1;
            self.lookahead.push_back(stored);
        }
    }

    /// Serves the next buffered value, refilling when and only when the
    /// lookahead is exhausted. The value is stamped with wall-clock now.
    ///
    /// # Errors
    /// Propagates refill failures.
    pub fn next_value(&mut self) -> Result<(DateTime<Utc>, f64), OracleError> {
        if self.lookahead.is_empty() {
            self.refill()?;
        }
        let value = self
            .take_buffered()
            .ok_or(OracleError::ShortHorizon {
                expected: self.params.max_prediction_length,
                actual: 0,
            })?;
        Ok((Utc::now(), value))
    }

    /// Pops one already-buffered value without triggering a refill.
    ///
    /// Used by multi-head generators that drive refills in lockstep.
    pub(crate) fn take_buffered(&mut self) -> Option<f64> {
        self.lookahead.pop_front().map(|v| self.serve(v))
    }

    /// Fault sample: perturbs the most recent window value without consuming
    /// the lookahead.
    ///
    /// Stochastic channels with nonzero window standard deviation get a
    /// strictly upward excursion of `std * (std_multiplier + U(0, 1))`; with
    /// zero standard deviation the perturbation is `bias_percent * value`.
    /// Deterministic channels return their current value unperturbed.
    #[must_use]
    pub fn fault_value(
        &mut self,
        std_multiplier: f64,
        bias_percent: f64,
    ) -> (DateTime<Utc>, f64) {
        (Utc::now(), self.fault_level(std_multiplier, bias_percent))
    }

    /// Fault value without the timestamp (one timestamp is shared across the
    /// heads of a multi-head sample).
    pub(crate) fn fault_level(&mut self, std_multiplier: f64, bias_percent: f64) -> f64 {
        let base = self.window.latest().map_or(0.0, |r| r.value);
        let perturbed = if self.is_deterministic() {
            base
        } else {
            let std = self.window.std_dev();
            if std == 0.0 {
                base + bias_percent * base
            } else {
                base + std * (std_multiplier + rand::thread_rng().gen_range(0.0..1.0))
            }
        };
        self.serve(self.kind.apply(perturbed))
    }

    /// Output transform: sign inversion for the designated friction channel.
    /// Storage and refill keep the natural sign.
    fn serve(&self, value: f64) -> f64 {
        if self.invert_output {
            -value
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::oracle::ForecastBatch;

    struct CountingOracle {
        calls: AtomicUsize,
        value: f64,
    }

    impl CountingOracle {
        fn new(value: f64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                value,
            }
        }
    }

    impl ForecastOracle for CountingOracle {
        fn predict(&self, _window: &EncoderWindow) -> Result<ForecastBatch, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ForecastBatch::from_point(vec![self.value; 5]))
        }
    }

    fn history(values: &[f64]) -> HistorySeries {
        HistorySeries {
            records: values
                .iter()
                .enumerate()
                .map(|(i, &value)| WindowRecord {
                    time_idx: i as i64,
                    day: "15".to_string(),
                    value,
                })
                .collect(),
            last_observed: Utc::now(),
        }
    }

    fn stochastic_buffer(oracle: Arc<CountingOracle>, values: &[f64]) -> RollingWindowBuffer {
        RollingWindowBuffer::stochastic(
            BufferParams::default(),
            ValueKind::Float,
            false,
            oracle,
            history(values),
            "test",
        )
        .unwrap()
    }

    #[test]
    fn empty_history_is_rejected() {
        let err = RollingWindowBuffer::stochastic(
            BufferParams::default(),
            ValueKind::Float,
            false,
            Arc::new(CountingOracle::new(1.0)),
            history(&[]),
            "m1/eqtq/AverageTorque/Head_01",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyHistory { .. }));
    }

    #[test]
    fn refill_happens_exactly_on_exhaustion() {
        let oracle = Arc::new(CountingOracle::new(2.0));
        let mut buffer = stochastic_buffer(oracle.clone(), &[1.0, 2.0, 3.0]);

        // One batch serves exactly max_prediction_length values.
        for _ in 0..5 {
            let (_, value) = buffer.next_value().unwrap();
            assert_eq!(value, 2.0);
            assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        }

        // The sixth call transitions from empty and triggers the second call.
        let _ = buffer.next_value().unwrap();
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn window_cap_holds_across_refills() {
        let oracle = Arc::new(CountingOracle::new(2.0));
        let mut buffer = stochastic_buffer(oracle, &[1.0; 10]);
        for _ in 0..23 {
            let _ = buffer.next_value().unwrap();
            assert!(buffer.window_len() <= 10);
        }
        assert_eq!(buffer.window_len(), 10);
    }

    struct FailingOracle;

    impl ForecastOracle for FailingOracle {
        fn predict(&self, _window: &EncoderWindow) -> Result<ForecastBatch, OracleError> {
            Err(OracleError::Unavailable {
                message: "forecast backend down".to_string(),
            })
        }
    }

    #[test]
    fn failed_refill_leaves_the_buffer_unchanged() {
        let mut buffer = RollingWindowBuffer::stochastic(
            BufferParams::default(),
            ValueKind::Float,
            false,
            Arc::new(FailingOracle),
            history(&[1.0, 2.0, 3.0]),
            "test",
        )
        .unwrap();

        assert!(buffer.next_value().is_err());
        assert!(buffer.is_exhausted());
        assert_eq!(buffer.window_len(), 3);
    }

    #[test]
    fn empty_cycle_is_rejected_at_construction() {
        let err = RollingWindowBuffer::deterministic(
            BufferParams::default(),
            ValueKind::Float,
            false,
            DeterministicSpec::Cycle { values: vec![] },
            history(&[1.0]),
            "m1/plc/Alarm",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCycle { .. }));
    }

    #[test]
    fn fixed_replay_is_stable() {
        let mut buffer = RollingWindowBuffer::deterministic(
            BufferParams::default(),
            ValueKind::Float,
            false,
            DeterministicSpec::Fixed { value: 4.25 },
            history(&[4.25]),
            "test",
        )
        .unwrap();
        for _ in 0..17 {
            let (_, value) = buffer.next_value().unwrap();
            assert_eq!(value, 4.25);
        }
    }

    #[test]
    fn cyclic_replay_wraps_around() {
        let cycle = vec![0.0, 1.0, 3.0];
        let mut buffer = RollingWindowBuffer::deterministic(
            BufferParams::default(),
            ValueKind::Float,
            false,
            DeterministicSpec::Cycle {
                values: cycle.clone(),
            },
            history(&[0.0]),
            "test",
        )
        .unwrap();

        let mut served = Vec::new();
        for _ in 0..=cycle.len() {
            served.push(buffer.next_value().unwrap().1);
        }
        // Position k+1 repeats the first value.
        assert_eq!(served[cycle.len()], served[0]);
        assert_eq!(&served[..3], &cycle[..]);
    }

    #[test]
    fn counter_is_monotonic_across_refills() {
        let mut buffer = RollingWindowBuffer::deterministic(
            BufferParams::default(),
            ValueKind::Int,
            false,
            DeterministicSpec::Counter {
                base: 1000.0,
                step: 10.0,
            },
            history(&[1000.0]),
            "test",
        )
        .unwrap();

        let mut previous = 1000.0;
        // Spans two refills; the counter must not restart at the boundary.
        for i in 0..10 {
            let (_, value) = buffer.next_value().unwrap();
            assert!(value > previous, "step {i}: {value} <= {previous}");
            assert_eq!(value, 1000.0 + 10.0 * f64::from(i + 1));
            previous = value;
        }
    }

    #[test]
    fn fault_is_one_sided_with_variance() {
        let oracle = Arc::new(CountingOracle::new(2.0));
        let mut buffer = stochastic_buffer(oracle, &[2.0, 4.0, 4.0, 6.0]);

        let base = 6.0;
        let std = (8.0f64 / 3.0).sqrt();
        for _ in 0..32 {
            let (_, value) = buffer.fault_value(3.0, 0.1);
            assert!(value >= base + 3.0 * std);
            assert!(value < base + 4.0 * std);
        }
        // Lookahead was never consumed.
        assert!(buffer.is_exhausted());
    }

    #[test]
    fn fault_uses_bias_without_variance() {
        let oracle = Arc::new(CountingOracle::new(5.0));
        let mut buffer = stochastic_buffer(oracle, &[5.0, 5.0, 5.0]);
        let (_, value) = buffer.fault_value(3.0, 0.1);
        assert!((value - 5.5).abs() < 1e-12);
    }

    #[test]
    fn fault_uses_bias_on_single_point_window() {
        // Fewer than 2 points cannot support a variance estimate.
        let oracle = Arc::new(CountingOracle::new(5.0));
        let mut buffer = stochastic_buffer(oracle, &[8.0]);
        let (_, value) = buffer.fault_value(3.0, 0.25);
        assert!((value - 10.0).abs() < 1e-12);
    }

    #[test]
    fn deterministic_fault_is_unperturbed() {
        let mut buffer = RollingWindowBuffer::deterministic(
            BufferParams::default(),
            ValueKind::Float,
            false,
            DeterministicSpec::Fixed { value: 7.0 },
            history(&[7.0]),
            "test",
        )
        .unwrap();
        let (_, value) = buffer.fault_value(3.0, 0.1);
        assert_eq!(value, 7.0);
    }

    #[test]
    fn int_channels_round_served_values() {
        let oracle = Arc::new(CountingOracle::new(2.4));
        let mut buffer = RollingWindowBuffer::stochastic(
            BufferParams::default(),
            ValueKind::Int,
            false,
            oracle,
            history(&[2.0, 3.0]),
            "test",
        )
        .unwrap();
        let (_, value) = buffer.next_value().unwrap();
        assert_eq!(value, 2.0);
    }

    #[test]
    fn friction_channel_inverts_output_only() {
        let oracle = Arc::new(CountingOracle::new(3.0));
        let mut buffer = RollingWindowBuffer::stochastic(
            BufferParams::default(),
            ValueKind::Float,
            true,
            oracle,
            history(&[2.0, 3.0]),
            "test",
        )
        .unwrap();

        let (_, value) = buffer.next_value().unwrap();
        assert_eq!(value, -3.0);

        // The window keeps the natural sign so rolling statistics are
        // undistorted.
        assert!(buffer.window.values().all(|v| v > 0.0));
    }
}
