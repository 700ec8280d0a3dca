//! CPU package power sensor
//!
//! Derives watts from the RAPL energy counters under
//! `/sys/class/powercap/intel-rapl:N/energy_uj`. The counter is cumulative
//! microjoules, so each cycle's wattage is the energy delta over the elapsed
//! time since the previous read. Counter wraparound and implausible spikes are
//! rejected rather than folded into the statistics.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::metric::{MetricPath, StatsTable};
use crate::sensor::Sensor;


#[cfg(test)]
use mockall::automock;

/// Data source for cumulative package energy counters, in microjoules.
///
/// `read` returns one counter per package, in package order, and takes
/// `&mut self` so file-backed sources can rewind their handles in place.
#[cfg_attr(test, automock)]
pub trait EnergySource: Send + Sync {
    fn read(&mut self) -> Result<Vec<u64>>;
}

/// RAPL counters read from sysfs powercap.
///
/// The `energy_uj` files are opened once at construction and rewound with a
/// seek on every read; the handles are released when the sensor drops.
#[derive(Debug)]
pub struct SysfsEnergy {
    files: Vec<File>,
}

impl SysfsEnergy {
    pub fn new() -> Result<Self> {
        Self::at("/sys/class/powercap".into())
    }

    /// Opens the counters under an alternate powercap root, for fixtures.
    pub fn at(root: PathBuf) -> Result<Self> {
        let mut files = Vec::new();
        for package in 0.. {
            let path = root.join(format!("intel-rapl:{package}/energy_uj"));
            match File::open(&path) {
                Ok(file) => files.push(file),
                Err(_) => break,
            }
        }
        if files.is_empty() {
            return Err(Error::not_available("no RAPL energy counters under powercap"));
        }
        Ok(SysfsEnergy { files })
    }
}

impl EnergySource for SysfsEnergy {
    fn read(&mut self) -> Result<Vec<u64>> {
        let mut counters = Vec::with_capacity(self.files.len());
        for file in &mut self.files {
            file.seek(SeekFrom::Start(0))?;
            let mut text = String::new();
            file.read_to_string(&mut text)?;
            let micro_joules = text
                .trim()
                .parse()
                .map_err(|_| Error::invalid_data("bad RAPL energy counter"))?;
            counters.push(micro_joules);
        }
        Ok(counters)
    }
}

/// Folds one computed wattage into the accumulator for `path`.
///
/// A non-positive wattage means the counter wrapped between reads; a wattage
/// above 2.5 times the running mean (once a mean exists) is a spurious spike.
/// Both are counted but not accepted, so the previous current value stays
/// visible and min/max/mean are untouched.
pub(crate) fn apply_watts(table: &mut StatsTable, path: &MetricPath, watts: f64) {
    let mean = table.get(path).and_then(|s| s.mean_value()).unwrap_or(0.0);
    if watts <= 0.0 || (mean != 0.0 && watts > mean * 2.5) {
        debug!(%path, watts, mean, "rejected wattage sample");
        table.discard(path);
    } else {
        table.observe(path, watts);
    }
}

/// Package power draw sensor, one `CPU{N}` row per RAPL package.
pub struct CpuPower {
    source: Box<dyn EnergySource>,
    table: StatsTable,
    previous: Vec<(u64, Instant)>,
}

impl CpuPower {
    const HEADINGS: [&'static str; 5] = ["CPU", "Current(W)", "Min(W)", "Max(W)", "Mean(W)"];

    /// Probes sysfs powercap for RAPL counters.
    pub fn new() -> Self {
        match SysfsEnergy::new() {
            Ok(source) => Self::with_source(Box::new(source)),
            Err(e) => {
                warn!(error = %e, "RAPL probe failed, power sensor disabled");
                CpuPower {
                    source: Box::new(NoEnergy),
                    table: StatsTable::empty(),
                    previous: Vec::new(),
                }
            },
        }
    }

    /// Builds the sensor over the given source, seeding the baseline counters
    /// with one read.
    pub fn with_source(mut source: Box<dyn EnergySource>) -> Self {
        let (paths, previous) = match source.read() {
            Ok(counters) => {
                let now = Instant::now();
                let paths = (0..counters.len()).map(|i| MetricPath::flat(format!("CPU{i}"))).collect();
                let previous = counters.into_iter().map(|uj| (uj, now)).collect();
                (paths, previous)
            },
            Err(e) => {
                warn!(error = %e, "RAPL baseline read failed, power sensor disabled");
                (Vec::new(), Vec::new())
            },
        };
        CpuPower { source, table: StatsTable::new(paths), previous }
    }
}

impl Default for CpuPower {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for CpuPower {
    fn name(&self) -> &str {
        "cpu_power"
    }

    fn headings(&self) -> &[&'static str] {
        &Self::HEADINGS
    }

    fn path_arity(&self) -> usize {
        1
    }

    fn stats_table(&self) -> &StatsTable {
        &self.table
    }

    fn update(&mut self) {
        if self.table.is_empty() {
            return;
        }
        let counters = match self.source.read() {
            Ok(counters) => counters,
            Err(e) => {
                warn!(error = %e, "RAPL read failed");
                return;
            },
        };
        let now = Instant::now();

        let paths: Vec<MetricPath> = self.table.paths().collect();
        for (package, &micro_joules) in counters.iter().enumerate() {
            let Some((previous_uj, previous_at)) = self.previous.get_mut(package) else { break };
            let delta_uj = micro_joules as i64 - *previous_uj as i64;
            let micros = now.duration_since(*previous_at).as_micros();
            *previous_uj = micro_joules;
            *previous_at = now;
            if micros == 0 {
                continue;
            }
            let watts = delta_uj as f64 / micros as f64;
            if let Some(path) = paths.get(package) {
                apply_watts(&mut self.table, path, watts);
            }
        }
    }

    fn section(&self, path: &MetricPath) -> Option<String> {
        crate::sensor::check_arity(path, 1)?;
        Some("CPU Watts".to_string())
    }

    /// Power rows export as `CPU0(Watts)` in CSV, not the bare label.
    fn csv_headings(&self) -> Vec<String> {
        self.table
            .paths()
            .filter(|p| self.table.get(p).is_some_and(|s| s.has_samples()))
            .map(|p| format!("{p}(Watts)"))
            .collect()
    }
}

/// Placeholder source for a disabled sensor.
struct NoEnergy;

impl EnergySource for NoEnergy {
    fn read(&mut self) -> Result<Vec<u64>> {
        Ok(Vec::new())
    }
}
