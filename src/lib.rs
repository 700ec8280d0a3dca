//! Stressmon - aggregated hardware telemetry for Linux stress testing
//!
//! This crate polls the hardware sensors that matter during a stress run and
//! keeps the current, minimum, maximum and mean of every metric since
//! monitoring began. Data comes from sysfs, procfs and the kernel's hwmon
//! interface; no daemon and no root-only service is required (a couple of
//! probes degrade gracefully without privileges).
//!
//! # Features
//!
//! - **CPU Frequency**: per-core clock speeds with P/E-class aggregates on
//!   hybrid parts
//! - **CPU Usage**: per-core busy percentages from `/proc/stat` deltas
//! - **CPU Temperature**: coretemp/k10temp channels grouped by package
//! - **CPU Power**: package watts from RAPL energy counters, with outlier
//!   rejection
//! - **GPU Telemetry**: temperature, clocks, fan, power, VRAM and load per
//!   card, for NVIDIA (NVML) and AMD (drm sysfs) boards
//! - **Drive Temperature**: NVMe and SATA drive channels
//! - **System Fans**: every hwmon fan tach, grouped by driver
//! - **Memory Usage**: RAM and swap totals, usage and percentages
//!
//! # Examples
//!
//! ```no_run
//! use stressmon::prelude::*;
//!
//! let set = SensorSet::detect();
//! let mut pool = UpdatePool::from_set(&set);
//!
//! pool.run_cycle();
//!
//! for sensor in &set {
//!     let sensor = sensor.read();
//!     for path in sensor.paths() {
//!         if let Some(current) = sensor.current(&path) {
//!             println!("{path}: {current}");
//!         }
//!     }
//! }
//! ```
//!
//! # Concurrency
//!
//! A poll cycle updates every sensor at once: [`pool::UpdatePool`] dispatches
//! each `update` onto its own worker, so one slow driver bounds the cycle
//! instead of serializing it. Sensors live behind `parking_lot` read/write
//! locks; readers between cycles always see a fully updated metric set.
//!
//! # Error Handling
//!
//! Probe and read errors stop at the sensor boundary: a sensor whose hardware
//! is absent comes up empty but valid, and a transient read failure is logged
//! via `tracing` and leaves the previous values in place. Polling APIs never
//! return errors.

pub mod cpu;
pub mod disk;
mod error;
pub mod fan;
pub mod gpu;
pub mod memory;
pub mod metric;
pub mod pool;
pub mod power;
pub mod report;
pub mod sensor;
pub mod temperature;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::Error;
    pub use crate::Result;
    pub use crate::cpu::{CpuFrequency, CpuInfo, CpuUsage};
    pub use crate::disk::DriveTemp;
    pub use crate::fan::SysFan;
    pub use crate::gpu::Gpu;
    pub use crate::memory::MemoryUsage;
    pub use crate::metric::{MetricPath, MetricPaths, RunningStats};
    pub use crate::pool::UpdatePool;
    pub use crate::power::CpuPower;
    pub use crate::report::Snapshot;
    pub use crate::sensor::{Sensor, SensorSet, SharedSensor};
    pub use crate::temperature::CpuTemperature;
}
