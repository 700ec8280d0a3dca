//! Concurrent sensor update dispatch
//!
//! One poll cycle runs every registered sensor's `update` at the same time:
//! the updates are blocking file and process I/O, so they go onto a private
//! tokio runtime as `spawn_blocking` tasks, one worker per sensor. The cycle
//! blocks until the join barrier completes, which bounds its wall time by the
//! slowest sensor instead of the sum of all of them.
//!
//! A panicking update is isolated to its own task: the join error is logged
//! and the barrier still completes, so one failing driver cannot stall the
//! cycle or take down the process. Cycle cadence belongs to the caller; there
//! is no timer and no mid-cycle cancellation here.

use std::sync::Arc;

use futures::future::join_all;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, error, instrument};

use crate::sensor::{SensorSet, SharedSensor};


/// Runs the update phase of each poll cycle across all sensors.
///
/// The runtime is built lazily on the first cycle, once the registry size is
/// known, and shut down when the pool drops.
pub struct UpdatePool {
    registry: Vec<(String, SharedSensor)>,
    runtime: Option<Runtime>,
}

impl UpdatePool {
    pub fn new() -> Self {
        UpdatePool { registry: Vec::new(), runtime: None }
    }

    /// Pool over every sensor in a set, registered under its own name.
    pub fn from_set(set: &SensorSet) -> Self {
        let mut pool = UpdatePool::new();
        for sensor in set {
            let id = sensor.read().name().to_string();
            pool.register(id, Arc::clone(sensor));
        }
        pool
    }

    /// Registers a sensor for update dispatch.
    ///
    /// Must happen before the first [`run_cycle`](Self::run_cycle): the worker
    /// pool is sized from the registry when it is first built.
    pub fn register(&mut self, id: impl Into<String>, sensor: SharedSensor) {
        self.registry.push((id.into(), sensor));
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    fn runtime(&mut self) -> Option<&Runtime> {
        if self.runtime.is_none() {
            let workers = self.registry.len().max(1);
            debug!(workers, "building update pool runtime");
            match Builder::new_multi_thread()
                .worker_threads(workers)
                .max_blocking_threads(workers)
                .thread_name("sensor-update")
                .enable_all()
                .build()
            {
                Ok(runtime) => self.runtime = Some(runtime),
                Err(e) => error!(error = %e, "update pool runtime build failed, updating inline"),
            }
        }
        self.runtime.as_ref()
    }

    /// Dispatches one `update` per registered sensor and waits for all of
    /// them to finish.
    ///
    /// Each sensor takes its own write lock only for the duration of its
    /// update, so reads between cycles always see a consistent metric set.
    #[instrument(skip(self), fields(sensors = self.registry.len()))]
    pub fn run_cycle(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        let tasks: Vec<_> = self
            .registry
            .iter()
            .map(|(id, sensor)| {
                let id = id.clone();
                let sensor = Arc::clone(sensor);
                (id, sensor)
            })
            .collect();

        let Some(runtime) = self.runtime() else {
            // Degraded path: no pool, so the cycle runs sequentially.
            for (_, sensor) in tasks {
                sensor.write().update();
            }
            return;
        };
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|(id, sensor)| {
                let handle = runtime.spawn_blocking(move || sensor.write().update());
                (id, handle)
            })
            .collect();

        let (ids, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = runtime.block_on(join_all(handles));
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                error!(sensor = %id, error = %e, "sensor update panicked");
            }
        }
    }
}

impl Default for UpdatePool {
    fn default() -> Self {
        UpdatePool::new()
    }
}
