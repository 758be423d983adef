//! Bounded worker pool for generation tasks.
//!
//! A small thread-based pool behind a bounded crossbeam channel. Dispatch is
//! fire-and-forget: the tick loop never blocks on a submitted task. Shutdown
//! closes the channel, lets workers drain already-queued jobs, then joins.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::error::SchedulerError;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct WorkerPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    capacity: usize,
}

impl WorkerPool {
    /// Spawns `workers` named threads over a queue of `capacity` jobs.
    pub(crate) fn start(
        name: &'static str,
        workers: usize,
        capacity: usize,
    ) -> Result<Self, SchedulerError> {
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let (tx, rx) = bounded::<Job>(capacity);

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{idx}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                })
                .map_err(|err| SchedulerError::PoolSpawn {
                    message: err.to_string(),
                })?;
            handles.push(handle);
        }

        Ok(Self {
            tx: Some(tx),
            workers: handles,
            capacity,
        })
    }

    /// Queues a job without blocking.
    pub(crate) fn submit(&self, job: Job) -> Result<(), SchedulerError> {
        let Some(tx) = &self.tx else {
            return Err(SchedulerError::Disconnected);
        };
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SchedulerError::QueueFull {
                capacity: self.capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(SchedulerError::Disconnected),
        }
    }

    /// Closes the queue, drains already-submitted jobs, and joins workers.
    pub(crate) fn shutdown(mut self) {
        self.drain();
    }

    fn drain(&mut self) {
        drop(self.tx.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.drain();
    }
}
