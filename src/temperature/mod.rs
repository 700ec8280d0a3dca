//! CPU die temperature sensor
//!
//! Reads the coretemp (Intel) or k10temp (AMD) hwmon chip and groups its
//! channels by physical package. Intel chips expose a `Package id N` row per
//! package followed by its cores; AMD chips expose a `Tctl` control row per
//! die, renamed here to `TctlN` so multi-die parts stay distinguishable.

use std::fs;
use std::path::PathBuf;

use tracing::warn;

use crate::error::{Error, Result};
use crate::metric::{MetricPath, StatsTable};
use crate::sensor::Sensor;


#[cfg(test)]
use mockall::automock;

/// One labelled temperature channel, in degrees Celsius.
#[derive(Debug, Clone, PartialEq)]
pub struct TempReading {
    pub label: String,
    pub celsius: f64,
}

impl TempReading {
    pub fn new(label: impl Into<String>, celsius: f64) -> Self {
        TempReading { label: label.into(), celsius }
    }
}

/// Data source for CPU temperature channels.
///
/// Readings must come back in the chip's channel order every cycle; the
/// package grouping walk depends on each `Package id`/`Tctl` row preceding
/// the cores it owns.
#[cfg_attr(test, automock)]
pub trait TemperatureSource: Send + Sync {
    fn readings(&self) -> Result<Vec<TempReading>>;
}

const CHIPS: [&str; 2] = ["coretemp", "k10temp"];

/// Temperature channels of the first coretemp or k10temp chip under
/// `/sys/class/hwmon`.
#[derive(Debug)]
pub struct HwmonTemps {
    chip: PathBuf,
}

impl HwmonTemps {
    pub fn new() -> Result<Self> {
        Self::at("/sys/class/hwmon".into())
    }

    /// Locates the CPU chip under an alternate hwmon root, for fixtures.
    pub fn at(root: PathBuf) -> Result<Self> {
        for entry in fs::read_dir(&root)? {
            let dir = entry?.path();
            let Ok(name) = fs::read_to_string(dir.join("name")) else { continue };
            if CHIPS.contains(&name.trim()) {
                return Ok(HwmonTemps { chip: dir });
            }
        }
        Err(Error::not_available("no coretemp or k10temp chip under hwmon"))
    }

    fn channels(&self) -> Result<Vec<u32>> {
        let mut channels = Vec::new();
        for entry in fs::read_dir(&self.chip)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(index) = name.strip_prefix("temp").and_then(|n| n.strip_suffix("_input")) {
                if let Ok(index) = index.parse() {
                    channels.push(index);
                }
            }
        }
        channels.sort_unstable();
        Ok(channels)
    }
}

impl TemperatureSource for HwmonTemps {
    fn readings(&self) -> Result<Vec<TempReading>> {
        let mut readings = Vec::new();
        for channel in self.channels()? {
            let input = self.chip.join(format!("temp{channel}_input"));
            let Ok(raw) = fs::read_to_string(&input) else { continue };
            let milli: f64 = raw
                .trim()
                .parse()
                .map_err(|_| Error::invalid_data(format!("bad reading in {}", input.display())))?;
            let label = fs::read_to_string(self.chip.join(format!("temp{channel}_label")))
                .map(|l| l.trim().to_string())
                .unwrap_or_else(|_| format!("temp{channel}"));
            readings.push(TempReading { label, celsius: milli / 1000.0 });
        }
        Ok(readings)
    }
}

/// Assigns each reading to its package group, in raw channel order.
///
/// A `Tctl` or `Package id N` row (N matching the running package count) opens
/// the next group; `Tctl` rows are renamed `TctlN`. Rows before any group row
/// are dropped.
fn group_readings(readings: &[TempReading]) -> Vec<(String, String, f64)> {
    let mut grouped = Vec::with_capacity(readings.len());
    let mut package = 0u32;
    let mut group = String::new();
    for reading in readings {
        let mut label = reading.label.clone();
        if label == "Tctl" || label == format!("Package id {package}") {
            if label == "Tctl" {
                label = format!("Tctl{package}");
            }
            group = label.clone();
            package += 1;
        }
        if !group.is_empty() {
            grouped.push((group.clone(), label, reading.celsius));
        }
    }
    grouped
}

/// Ordering key for rows within a package: the package row itself first, then
/// cores by their embedded number, unnumbered rows before numbered ones.
fn row_order(label: &str) -> (bool, i64) {
    let digits: String =
        label.chars().skip_while(|c| !c.is_ascii_digit()).take_while(char::is_ascii_digit).collect();
    let number = digits.parse().unwrap_or(-1);
    let is_package = label.contains("Tctl") || label.contains("Package id");
    (!is_package, number)
}

/// CPU die temperature sensor, one row per hwmon channel grouped by package.
pub struct CpuTemperature {
    source: Box<dyn TemperatureSource>,
    table: StatsTable,
}

impl CpuTemperature {
    const HEADINGS: [&'static str; 5] = ["Core", "Current(C)", "Min(C)", "Max(C)", "Mean(C)"];

    /// Probes `/sys/class/hwmon` for a CPU temperature chip.
    pub fn new() -> Self {
        match HwmonTemps::new() {
            Ok(source) => Self::with_source(Box::new(source)),
            Err(e) => {
                warn!(error = %e, "cpu temperature probe failed, sensor disabled");
                CpuTemperature {
                    source: Box::new(NoTemps),
                    table: StatsTable::empty(),
                }
            },
        }
    }

    /// Builds the topology from one probe read of the given source.
    pub fn with_source(source: Box<dyn TemperatureSource>) -> Self {
        let readings = match source.readings() {
            Ok(readings) => readings,
            Err(e) => {
                warn!(error = %e, "cpu temperature probe read failed, sensor disabled");
                Vec::new()
            },
        };

        let grouped = group_readings(&readings);
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for (group, label, _) in &grouped {
            match groups.iter_mut().find(|(name, _)| name == group) {
                Some((_, labels)) => labels.push(label.clone()),
                None => groups.push((group.clone(), vec![label.clone()])),
            }
        }

        let mut paths = Vec::with_capacity(grouped.len());
        for (group, mut labels) in groups {
            labels.sort_by_key(|l| row_order(l));
            paths.extend(labels.into_iter().map(|l| MetricPath::pair(group.clone(), l)));
        }

        CpuTemperature { source, table: StatsTable::new(paths) }
    }
}

impl Default for CpuTemperature {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for CpuTemperature {
    fn name(&self) -> &str {
        "cpu_temperature"
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
        let readings = match self.source.readings() {
            Ok(readings) => readings,
            Err(e) => {
                warn!(error = %e, "cpu temperature read failed");
                return;
            },
        };
        for (group, label, celsius) in group_readings(&readings) {
            self.table.observe(&MetricPath::pair(group, label), celsius);
        }
    }

    fn section(&self, path: &MetricPath) -> Option<String> {
        crate::sensor::check_arity(path, 2)?;
        Some("CPU Core Temperatures".to_string())
    }
}

/// Placeholder source for a disabled sensor.
struct NoTemps;

impl TemperatureSource for NoTemps {
    fn readings(&self) -> Result<Vec<TempReading>> {
        Ok(Vec::new())
    }
}
