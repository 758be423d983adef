//! Simulation scheduler.
//!
//! One control thread drives a logical tick loop; sample generation and
//! persistence are offloaded to a bounded worker pool. Per tick the loop
//! rolls machinery faults, shuffles each machinery's sensors to avoid
//! positional bias, dispatches the sensors whose data frequency divides the
//! tick, and sleeps to the next boundary. Cancellation is cooperative: a
//! shared stop flag checked once per tick, then a pool drain.
//!
//! The scheduler is a state machine over a single run:
//! Idle -> Running -> Stopping -> Idle.

mod context;
mod pool;

pub use context::{RunContext, RunCounters};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::buffer::BufferParams;
use crate::catalog::{DeterministicCatalog, TypeCatalog};
use crate::config::{FleetConfig, MachineryConfig, SensorConfig};
use crate::error::{SchedulerError, SimError, SimResult};
use crate::generator::{Generator, Sample};
use crate::history::HistoryProvider;
use crate::oracle::ForecastOracle;
use crate::sensor::{head_label, head_sample_name, SensorCategory};
use crate::sink::{PersistenceSink, RecordId};

use pool::WorkerPool;

/// Scheduler pacing and capacity knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Real-time length of one tick.
    pub tick_interval: Duration,
    /// Maximum queued generation jobs.
    pub queue_capacity: usize,
    /// Where to export collection snapshots at run end; `None` disables
    /// export.
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            queue_capacity: 1024,
            snapshot_dir: None,
        }
    }
}

/// Collaborators a scheduler drives a run against.
pub struct SchedulerDeps {
    /// Forecasting component for stochastic channels.
    pub oracle: Arc<dyn ForecastOracle>,
    /// Supplier of initial encoder windows.
    pub history: Arc<dyn HistoryProvider>,
    /// Sample store.
    pub sink: Arc<dyn PersistenceSink>,
    /// Deterministic replay catalog.
    pub catalog: Arc<DeterministicCatalog>,
    /// Value-kind catalog.
    pub types: Arc<TypeCatalog>,
}

/// Outcome of one completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Final counters.
    pub counters: RunCounters,
    /// Ticks elapsed before the stop signal was observed.
    pub ticks: u64,
    /// Snapshot files written at run end.
    pub snapshots: Vec<PathBuf>,
}

/// Where a sensor's values land in the sink.
enum SampleTargets {
    /// Head label -> (record, sample name).
    MultiHead(BTreeMap<String, (RecordId, String)>),
    Single {
        id: RecordId,
        name: String,
    },
}

/// Everything a dispatched task needs about one sensor instance.
struct SensorRuntime {
    machinery_uid: String,
    category: SensorCategory,
    name: String,
    data_frequency: u64,
    generator: Mutex<Generator>,
    targets: SampleTargets,
}

struct MachineryRuntime {
    uid: String,
    fault_frequency: u64,
    fault_probability: u64,
    sensors: Vec<Arc<SensorRuntime>>,
}

/// Fleet simulation scheduler.
pub struct Scheduler {
    deps: SchedulerDeps,
    config: SchedulerConfig,
    params: BufferParams,
    stop: Arc<AtomicBool>,
    running: AtomicBool,
}

impl Scheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new(deps: SchedulerDeps, config: SchedulerConfig) -> Self {
        Self::with_params(deps, config, BufferParams::default())
    }

    /// Creates an idle scheduler with custom window sizing.
    #[must_use]
    pub fn with_params(deps: SchedulerDeps, config: SchedulerConfig, params: BufferParams) -> Self {
        Self {
            deps,
            config,
            params,
            stop: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
        }
    }

    /// Runs a simulation until [`Self::stop`] is called.
    ///
    /// Blocks the calling thread for the run's duration and returns the
    /// final counters once the worker pool has drained.
    ///
    /// # Errors
    /// Configuration and pool-creation errors abort the start; per-sample
    /// failures during the run are isolated and logged instead.
    pub fn start(&self, fleet: &FleetConfig) -> SimResult<RunReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SchedulerError::AlreadyRunning.into());
        }

        let result = self.run(fleet);

        self.stop.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Requests a cooperative stop. The tick loop observes the signal at
    /// the next tick boundary.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Returns true while a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn run(&self, fleet: &FleetConfig) -> SimResult<RunReport> {
        fleet.validate()?;

        let categories = fleet.categories_in_use();
        for category in &categories {
            self.deps.sink.clear(category.collection())?;
        }

        let machineries = self.build_runtimes(fleet)?;

        let ctx = Arc::new(RunContext::new(
            machineries.iter().map(|m| m.uid.as_str()),
            Arc::clone(&self.stop),
        ));

        let workers = pool_size(fleet.total_sensor_instances(), available_parallelism());
        let pool = WorkerPool::start("fleetsim-gen", workers, self.config.queue_capacity)?;
        log::info!("simulation started: {workers} workers, {} sensors", fleet.total_sensor_instances());

        let mut rng = rand::thread_rng();
        let mut ticks: u64 = 0;
        while !ctx.stop_requested() {
            ticks += 1;
            log::info!("{ticks}...");

            for machinery in &machineries {
                if ticks % machinery.fault_frequency == 0
                    && rng.gen_range(1..=100u64) <= machinery.fault_probability
                {
                    ctx.arm_fault(&machinery.uid);
                }
            }

            for machinery in &machineries {
                let mut order: Vec<usize> = (0..machinery.sensors.len()).collect();
                order.shuffle(&mut rng);
                for idx in order {
                    let sensor = &machinery.sensors[idx];
                    if ticks % sensor.data_frequency != 0 {
                        continue;
                    }
                    let fault = ctx.take_fault(&machinery.uid);
                    dispatch(&pool, &machinery.uid, sensor, fault, &ctx, &self.deps.sink);
                }
            }

            thread::sleep(self.config.tick_interval);
        }

        // Stopping: no new dispatches, drain already-queued tasks.
        pool.shutdown();

        let mut snapshots = Vec::new();
        if let Some(dir) = &self.config.snapshot_dir {
            for category in &categories {
                match self.deps.sink.export_snapshot(category.collection(), dir) {
                    Ok(path) => snapshots.push(path),
                    Err(err) => log::error!(
                        "snapshot export failed for {}: {err}",
                        category.collection()
                    ),
                }
            }
        }

        log::info!("the simulation has been interrupted after {ticks} ticks");
        Ok(RunReport {
            counters: ctx.counters(),
            ticks,
            snapshots,
        })
    }

    fn build_runtimes(&self, fleet: &FleetConfig) -> SimResult<Vec<MachineryRuntime>> {
        let mut machineries = Vec::with_capacity(fleet.machineries.len());
        for machinery in &fleet.machineries {
            let mut sensors = Vec::with_capacity(machinery.sensors.len());
            for sensor in &machinery.sensors {
                sensors.push(Arc::new(self.build_sensor_runtime(machinery, sensor)?));
            }
            machineries.push(MachineryRuntime {
                uid: machinery.uid.clone(),
                fault_frequency: machinery.fault_frequency,
                fault_probability: machinery.fault_probability,
                sensors,
            });
        }
        Ok(machineries)
    }

    fn build_sensor_runtime(
        &self,
        machinery: &MachineryConfig,
        sensor: &SensorConfig,
    ) -> SimResult<SensorRuntime> {
        let generator = Generator::new(
            &machinery.uid,
            sensor,
            self.deps.history.as_ref(),
            &self.deps.catalog,
            &self.deps.types,
            Arc::clone(&self.deps.oracle),
            self.params,
        )?;

        let collection = sensor.category.collection();
        let targets = if sensor.category.is_multi_head() {
            let mut targets = BTreeMap::new();
            for &index in &sensor.heads {
                let label = head_label(index);
                let id = self
                    .deps
                    .sink
                    .init_record(collection, &machinery.uid, &label)?;
                targets.insert(label, (id, head_sample_name(index, &sensor.name)));
            }
            SampleTargets::MultiHead(targets)
        } else {
            let id = self
                .deps
                .sink
                .init_record(collection, &machinery.uid, &sensor.name)?;
            SampleTargets::Single {
                id,
                name: sensor.name.clone(),
            }
        };

        Ok(SensorRuntime {
            machinery_uid: machinery.uid.clone(),
            category: sensor.category,
            name: sensor.name.clone(),
            data_frequency: sensor.data_frequency,
            generator: Mutex::new(generator),
            targets,
        })
    }
}

/// Worker-pool sizing: bounded by the sensor count and by the host's spare
/// parallelism, never zero.
fn pool_size(total_sensors: usize, parallelism: usize) -> usize {
    total_sensors.min(parallelism.saturating_sub(1)).max(1)
}

fn available_parallelism() -> usize {
    thread::available_parallelism().map_or(2, std::num::NonZeroUsize::get)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Queues one sensor task. A rejected submit drops the sample, but a fault
/// flag consumed for it is re-armed so the fault lands with a later sensor
/// instead of evaporating.
fn dispatch(
    pool: &WorkerPool,
    machinery_uid: &str,
    sensor: &Arc<SensorRuntime>,
    fault: bool,
    ctx: &Arc<RunContext>,
    sink: &Arc<dyn PersistenceSink>,
) {
    let job_sensor = Arc::clone(sensor);
    let job_ctx = Arc::clone(ctx);
    let job_sink = Arc::clone(sink);
    if let Err(err) = pool.submit(Box::new(move || {
        run_sensor_task(&job_sensor, fault, &job_ctx, job_sink.as_ref());
    })) {
        if fault {
            ctx.arm_fault(machinery_uid);
        }
        log::warn!(
            "dropped dispatch for {machinery_uid} - {} - {}: {err}",
            sensor.category,
            sensor.name
        );
    }
}

/// Task boundary: failures are logged here and never reach the tick loop.
fn run_sensor_task(
    sensor: &SensorRuntime,
    fault: bool,
    ctx: &RunContext,
    sink: &dyn PersistenceSink,
) {
    if let Err(err) = try_sensor_task(sensor, fault, ctx, sink) {
        log::error!(
            "sample generation failed for {} - {} - {}: {err}",
            sensor.machinery_uid,
            sensor.category,
            sensor.name
        );
    }
}

fn try_sensor_task(
    sensor: &SensorRuntime,
    fault: bool,
    ctx: &RunContext,
    sink: &dyn PersistenceSink,
) -> SimResult<()> {
    let sample = {
        let mut generator = sensor
            .generator
            .lock()
            .map_err(|_| SimError::internal("poisoned generator lock"))?;
        if fault {
            generator.gen_fault_default()
        } else {
            generator.get_values()?
        }
    };

    let collection = sensor.category.collection();
    let timestamp_ms = sample.taken_at().timestamp_millis();
    let tag = if fault { "FAULT" } else { "DATA" };
    let mut written: u64 = 0;

    match (&sample, &sensor.targets) {
        (Sample::MultiHead { heads, .. }, SampleTargets::MultiHead(targets)) => {
            for (label, value) in heads {
                let (id, name) = targets.get(label).ok_or_else(|| {
                    SimError::internal(format!("no sink target for head {label}"))
                })?;
                let rounded = round3(*value);
                sink.append(collection, *id, name, rounded, timestamp_ms)?;
                written += 1;
                log::info!(
                    "{tag} --> {} - {} - {} - {label} - {rounded} - {timestamp_ms}",
                    sensor.machinery_uid,
                    sensor.category,
                    sensor.name
                );
            }
        }
        (Sample::Single { value, .. }, SampleTargets::Single { id, name }) => {
            let rounded = round3(*value);
            sink.append(collection, *id, name, rounded, timestamp_ms)?;
            written += 1;
            log::info!(
                "{tag} --> {} - {} - {} - {rounded} - {timestamp_ms}",
                sensor.machinery_uid,
                sensor.category,
                sensor.name
            );
        }
        _ => {
            return Err(SimError::internal(
                "sample shape does not match the sensor's sink targets",
            ));
        }
    }

    if fault {
        ctx.add_faults(written);
    } else {
        ctx.add_samples(written);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use crossbeam_channel::bounded;

    use super::*;
    use crate::error::OracleError;
    use crate::history::{HistorySeries, InMemoryHistory};
    use crate::oracle::ForecastBatch;
    use crate::sink::InMemorySink;
    use crate::window::{EncoderWindow, WindowRecord};

    struct PointOracle;

    impl ForecastOracle for PointOracle {
        fn predict(&self, window: &EncoderWindow) -> Result<ForecastBatch, OracleError> {
            let last = window.latest().map_or(0.0, |r| r.value);
            Ok(ForecastBatch::from_point(vec![last; 5]))
        }
    }

    fn series(values: &[f64]) -> HistorySeries {
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

    #[test]
    fn rejected_dispatch_rearms_a_consumed_fault() {
        let history = InMemoryHistory::new();
        history.insert("m1", SensorCategory::Plc, "ProdSpeed", None, series(&[40.0, 41.0]));
        let deps = SchedulerDeps {
            oracle: Arc::new(PointOracle),
            history: Arc::new(history),
            sink: Arc::new(InMemorySink::new()),
            catalog: Arc::new(DeterministicCatalog::new()),
            types: Arc::new(TypeCatalog::new()),
        };
        let scheduler = Scheduler::new(deps, SchedulerConfig::default());
        let machinery = MachineryConfig {
            uid: "m1".to_string(),
            fault_frequency: 1,
            fault_probability: 100,
            sensors: vec![SensorConfig {
                name: "ProdSpeed".to_string(),
                category: SensorCategory::Plc,
                data_frequency: 1,
                heads: vec![],
            }],
        };
        let sensor = Arc::new(
            scheduler
                .build_sensor_runtime(&machinery, &machinery.sensors[0])
                .unwrap(),
        );

        let ctx = Arc::new(RunContext::new(
            ["m1"],
            Arc::new(AtomicBool::new(false)),
        ));
        let pool = WorkerPool::start("rearm-pool", 1, 1).unwrap();

        // Park the single worker, then fill the single queue slot.
        let (started_tx, started_rx) = bounded::<()>(0);
        let (gate_tx, gate_rx) = bounded::<()>(0);
        pool.submit(Box::new(move || {
            let _ = started_tx.send(());
            let _ = gate_rx.recv();
        }))
        .unwrap();
        started_rx.recv().unwrap();
        pool.submit(Box::new(|| {})).unwrap();

        ctx.arm_fault("m1");
        let fault = ctx.take_fault("m1");
        assert!(fault);

        dispatch(&pool, "m1", &sensor, fault, &ctx, &scheduler.deps.sink);

        // The dropped dispatch gave the fault back to the machinery.
        assert!(ctx.fault_pending("m1"));

        drop(gate_tx);
        pool.shutdown();
    }

    #[test]
    fn pool_size_is_clamped() {
        // Bounded by spare parallelism.
        assert_eq!(pool_size(100, 8), 7);
        // Bounded by the sensor count.
        assert_eq!(pool_size(3, 8), 3);
        // Never zero, even on a single-core host.
        assert_eq!(pool_size(5, 1), 1);
        assert_eq!(pool_size(0, 8), 1);
    }

    #[test]
    fn round3_rounds_to_three_decimals() {
        assert_eq!(round3(1.23456), 1.235);
        assert_eq!(round3(-0.0004), -0.0);
        assert_eq!(round3(2.0), 2.0);
    }
}
