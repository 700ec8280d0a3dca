use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::cpu::{CpuFrequency, CpuUsage};
use crate::disk::DriveTemp;
use crate::fan::SysFan;
use crate::gpu::Gpu;
use crate::memory::MemoryUsage;
use crate::power::CpuPower;
use crate::sensor::Sensor;
use crate::temperature::CpuTemperature;

/// A sensor shared between the update pool and the presentation layer.
///
/// The write lock is held only inside that sensor's own `update`, so a reader
/// between cycles always sees a fully updated metric set, never a half-written
/// one.
pub type SharedSensor = Arc<RwLock<dyn Sensor>>;

/// The ordered collection of active sensors for the current host.
///
/// Built once at startup by probing which hardware is present. Order is
/// display order and never changes. A probe that finds nothing yields an
/// empty-but-valid sensor rather than an absent one, so every consumer can
/// iterate the set uniformly without null checks.
pub struct SensorSet {
    sensors: Vec<SharedSensor>,
}

impl SensorSet {
    /// An empty set; sensors are added with [`push`](Self::push).
    pub fn new() -> Self {
        SensorSet { sensors: Vec::new() }
    }

    /// Probes the host hardware once per sensor kind and returns the full set
    /// in display order.
    ///
    /// Never fails: a sensor whose data source is entirely absent degrades to
    /// empty instead of preventing the rest of the set from functioning.
    pub fn detect() -> Self {
        let mut set = SensorSet::new();
        set.push(CpuFrequency::new());
        set.push(CpuUsage::new());
        set.push(CpuTemperature::new());
        set.push(CpuPower::new());
        set.push(Gpu::new());
        set.push(DriveTemp::new());
        set.push(SysFan::new());
        set.push(MemoryUsage::new());
        for sensor in &set.sensors {
            let sensor = sensor.read();
            debug!(
                name = sensor.name(),
                metrics = sensor.stats_table().len(),
                empty = sensor.is_empty(),
                "sensor probed",
            );
        }
        set
    }

    /// Appends a sensor, taking ownership and wrapping it for shared access.
    pub fn push<S: Sensor + 'static>(&mut self, sensor: S) {
        self.sensors.push(Arc::new(RwLock::new(sensor)));
    }

    /// Appends an already-shared sensor.
    pub fn push_shared(&mut self, sensor: SharedSensor) {
        self.sensors.push(sensor);
    }

    /// Sensors in display order.
    pub fn iter(&self) -> std::slice::Iter<'_, SharedSensor> {
        self.sensors.iter()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl Default for SensorSet {
    fn default() -> Self {
        SensorSet::new()
    }
}

impl<'a> IntoIterator for &'a SensorSet {
    type Item = &'a SharedSensor;
    type IntoIter = std::slice::Iter<'a, SharedSensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
