use std::fs;
use std::path::PathBuf;

use tracing::warn;

use crate::cpu::{class_means, core_labels, CpuInfo};
use crate::error::{Error, Result};
use crate::metric::{MetricPath, StatsTable};
use crate::sensor::Sensor;

#[cfg(test)]
use mockall::automock;

/// One frequency reading: the package clock plus the per-core clocks, in MHz.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencySample {
    pub package_mhz: f64,
    pub core_mhz: Vec<f64>,
}

/// Data source for CPU clock speeds.
#[cfg_attr(test, automock)]
pub trait FrequencySource: Send + Sync {
    fn sample(&self) -> Result<FrequencySample>;
}

/// Reads `scaling_cur_freq` from sysfs cpufreq, per logical core.
///
/// The package value is the mean of the per-core clocks; sysfs reports
/// kilohertz, converted here to MHz.
#[derive(Debug)]
pub struct SysfsFrequency {
    root: PathBuf,
}

impl SysfsFrequency {
    pub fn new() -> Self {
        Self::at("/sys/devices/system/cpu".into())
    }

    /// Source rooted at an alternate directory, for fixtures.
    pub fn at(root: PathBuf) -> Self {
        SysfsFrequency { root }
    }
}

impl Default for SysfsFrequency {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencySource for SysfsFrequency {
    fn sample(&self) -> Result<FrequencySample> {
        let mut core_mhz = Vec::new();
        for core in 0.. {
            let path = self.root.join(format!("cpu{core}/cpufreq/scaling_cur_freq"));
            let Ok(text) = fs::read_to_string(&path) else { break };
            let khz: f64 = text
                .trim()
                .parse()
                .map_err(|_| Error::invalid_data(format!("bad frequency in {}", path.display())))?;
            core_mhz.push(khz / 1000.0);
        }
        if core_mhz.is_empty() {
            return Err(Error::not_available("no cpufreq entries under sysfs"));
        }
        let package_mhz = core_mhz.iter().sum::<f64>() / core_mhz.len() as f64;
        Ok(FrequencySample { package_mhz, core_mhz })
    }
}

/// Per-core CPU clock speed sensor.
///
/// Flat topology (arity 1): `"CPU"`, optional `"P Cores"`/`"E Cores"`
/// aggregates on hybrid parts, then one row per logical core. The aggregates
/// are arithmetic means of the current per-core clocks, observed into their
/// own accumulators like any other row.
pub struct CpuFrequency {
    info: CpuInfo,
    source: Box<dyn FrequencySource>,
    table: StatsTable,
    section: String,
}

impl CpuFrequency {
    const HEADINGS: [&'static str; 5] =
        ["Core", "Current(MHz)", "Min(MHz)", "Max(MHz)", "Mean(MHz)"];

    /// Probes the host topology and reads from sysfs cpufreq.
    pub fn new() -> Self {
        match CpuInfo::probe() {
            Ok(info) => Self::with_source(info, Box::new(SysfsFrequency::new())),
            Err(e) => {
                warn!(error = %e, "cpu topology probe failed, frequency sensor disabled");
                Self::disabled()
            },
        }
    }

    /// Builds the sensor over an explicit topology and source.
    pub fn with_source(info: CpuInfo, source: Box<dyn FrequencySource>) -> Self {
        let paths = core_labels(&info).into_iter().map(MetricPath::flat).collect();
        let section = format!("CPU: {}", info.model());
        CpuFrequency { info, source, table: StatsTable::new(paths), section }
    }

    fn disabled() -> Self {
        CpuFrequency {
            info: CpuInfo::from_parts("Unknown", "Unknown", 0, 0),
            source: Box::new(SysfsFrequency::new()),
            table: StatsTable::empty(),
            section: String::new(),
        }
    }

    pub fn model(&self) -> &str {
        self.info.model()
    }
}

impl Default for CpuFrequency {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for CpuFrequency {
    fn name(&self) -> &str {
        "cpu_frequency"
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
        let sample = match self.source.sample() {
            Ok(sample) if !sample.core_mhz.is_empty() => sample,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "cpu frequency read failed");
                return;
            },
        };

        let mut values = Vec::with_capacity(self.table.len());
        values.push(sample.package_mhz);
        if let Some(perf) = self.info.performance_threads() {
            let (p_mean, e_mean) = class_means(&sample.core_mhz, perf as usize);
            values.push(p_mean);
            values.push(e_mean);
        }
        values.extend_from_slice(&sample.core_mhz);

        for (path, value) in self.table.paths().zip(values) {
            self.table.observe(&path, value);
        }
    }

    fn section(&self, path: &MetricPath) -> Option<String> {
        crate::sensor::check_arity(path, 1)?;
        Some(self.section.clone())
    }
}
