//! System fan speed sensor
//!
//! Enumerates the fan tachometer channels of every hwmon chip, grouped by
//! driver name. The amdgpu driver is excluded here; its fans are reported by
//! the GPU sensor alongside the rest of that card's telemetry. A channel
//! without a label file takes its driver's name as its row label.

use std::fs;
use std::path::PathBuf;

use tracing::warn;

use crate::error::{Error, Result};
use crate::metric::{MetricPath, StatsTable};
use crate::sensor::Sensor;


#[cfg(test)]
use mockall::automock;

/// One fan tach reading.
#[derive(Debug, Clone, PartialEq)]
pub struct FanReading {
    pub driver: String,
    pub fan: String,
    pub rpm: f64,
}

impl FanReading {
    pub fn new(driver: impl Into<String>, fan: impl Into<String>, rpm: f64) -> Self {
        FanReading { driver: driver.into(), fan: fan.into(), rpm }
    }
}

/// Data source for fan speeds across all drivers.
#[cfg_attr(test, automock)]
pub trait FanSource: Send + Sync {
    fn read(&mut self) -> Result<Vec<FanReading>>;
}

/// Fan channels of every hwmon chip except amdgpu.
#[derive(Debug)]
pub struct HwmonFans {
    root: PathBuf,
}

impl HwmonFans {
    pub fn new() -> Self {
        Self::at("/sys/class/hwmon".into())
    }

    /// Source scanning an alternate hwmon root, for fixtures.
    pub fn at(root: PathBuf) -> Self {
        HwmonFans { root }
    }
}

impl Default for HwmonFans {
    fn default() -> Self {
        Self::new()
    }
}

impl FanSource for HwmonFans {
    fn read(&mut self) -> Result<Vec<FanReading>> {
        let mut chips: Vec<PathBuf> =
            fs::read_dir(&self.root)?.flatten().map(|e| e.path()).collect();
        chips.sort();

        let mut readings = Vec::new();
        for chip in chips {
            let Ok(driver) = fs::read_to_string(chip.join("name")) else { continue };
            let driver = driver.trim();
            if driver == "amdgpu" {
                continue;
            }
            let mut channels = Vec::new();
            for entry in fs::read_dir(&chip)?.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if let Some(index) =
                    name.strip_prefix("fan").and_then(|n| n.strip_suffix("_input"))
                {
                    if let Ok(index) = index.parse::<u32>() {
                        channels.push(index);
                    }
                }
            }
            channels.sort_unstable();
            for channel in channels {
                let input = chip.join(format!("fan{channel}_input"));
                let Ok(raw) = fs::read_to_string(&input) else { continue };
                let rpm: f64 = raw.trim().parse().map_err(|_| {
                    Error::invalid_data(format!("bad reading in {}", input.display()))
                })?;
                let fan = fs::read_to_string(chip.join(format!("fan{channel}_label")))
                    .map(|l| l.trim().to_string())
                    .unwrap_or_default();
                readings.push(FanReading { driver: driver.to_string(), fan, rpm });
            }
        }
        Ok(readings)
    }
}

/// Normalizes one reading's row label: a blank fan label falls back to the
/// driver name.
fn fan_label(reading: &FanReading) -> String {
    if reading.fan.is_empty() {
        reading.driver.clone()
    } else {
        reading.fan.clone()
    }
}

/// System fan sensor: driver, then fan, one row per tach channel.
pub struct SysFan {
    source: Box<dyn FanSource>,
    table: StatsTable,
}

impl SysFan {
    const HEADINGS: [&'static str; 5] =
        ["Fans", "Current(RPM)", "Min(RPM)", "Max(RPM)", "Mean(RPM)"];

    /// Probes `/sys/class/hwmon` for fan channels.
    pub fn new() -> Self {
        Self::with_source(Box::new(HwmonFans::new()))
    }

    /// Builds the topology from one probe read of the given source.
    pub fn with_source(mut source: Box<dyn FanSource>) -> Self {
        let readings = match source.read() {
            Ok(readings) => readings,
            Err(e) => {
                warn!(error = %e, "fan probe read failed, sensor disabled");
                Vec::new()
            },
        };
        let paths = readings
            .iter()
            .map(|r| MetricPath::pair(r.driver.clone(), fan_label(r)))
            .collect();
        SysFan { source, table: StatsTable::new(paths) }
    }
}

impl Default for SysFan {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for SysFan {
    fn name(&self) -> &str {
        "sys_fan"
    }

    fn headings(&self) -> &[&'static str] {
        &Self::HEADINGS
    }

    fn path_arity(&self) -> usize {
        2
    }

    fn stats_table(&self) -> &StatsTable {
        &self.table
    }

    fn update(&mut self) {
        if self.table.is_empty() {
            return;
        }
        let readings = match self.source.read() {
            Ok(readings) => readings,
            Err(e) => {
                warn!(error = %e, "fan read failed");
                return;
            },
        };
        for reading in &readings {
            self.table.observe(&MetricPath::pair(reading.driver.clone(), fan_label(reading)), reading.rpm);
        }
    }

    fn section(&self, path: &MetricPath) -> Option<String> {
        let path = crate::sensor::check_arity(path, 2)?;
        path.segment(0).map(str::to_owned)
    }
}
