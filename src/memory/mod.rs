//! Memory and swap usage sensor
//!
//! Fixed two-group topology: `Mem` with Total/Available/Used/Percent and
//! `Swap` with Total/Free/Used/Percent. Sizes are reported in bytes; the
//! percent rows are derived from used over total. DIMM part numbers are
//! captured once at construction through `dmidecode` when it is available.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use tracing::warn;

use crate::error::{Error, Result};
use crate::metric::{MetricPath, StatsTable};
use crate::sensor::Sensor;

#[cfg(test)]
mod tests;

#[cfg(test)]
use mockall::automock;

/// One memory reading, sizes in bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    pub mem_total: f64,
    pub mem_available: f64,
    pub swap_total: f64,
    pub swap_free: f64,
}

/// Data source for memory and swap sizes.
#[cfg_attr(test, automock)]
pub trait MemorySource: Send + Sync {
    fn sample(&self) -> Result<MemorySample>;
}

/// Sizes parsed from `/proc/meminfo` (kB fields, converted to bytes).
#[derive(Debug)]
pub struct ProcMeminfo {
    meminfo: PathBuf,
}

impl ProcMeminfo {
    pub fn new() -> Self {
        Self::at("/proc/meminfo".into())
    }

    /// Source reading an alternate meminfo file, for fixtures.
    pub fn at(meminfo: PathBuf) -> Self {
        ProcMeminfo { meminfo }
    }
}

impl Default for ProcMeminfo {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for ProcMeminfo {
    fn sample(&self) -> Result<MemorySample> {
        let text = fs::read_to_string(&self.meminfo)?;
        let field = |key: &str| -> Result<f64> {
            let line = text
                .lines()
                .find_map(|l| l.strip_prefix(key).and_then(|l| l.strip_prefix(':')))
                .ok_or_else(|| Error::invalid_data(format!("{key} missing from meminfo")))?;
            let kilobytes: f64 = line
                .trim()
                .trim_end_matches(" kB")
                .parse()
                .map_err(|_| Error::invalid_data(format!("bad {key} value in meminfo")))?;
            Ok(kilobytes * 1024.0)
        };
        Ok(MemorySample {
            mem_total: field("MemTotal")?,
            mem_available: field("MemAvailable")?,
            swap_total: field("SwapTotal")?,
            swap_free: field("SwapFree")?,
        })
    }
}

/// DIMM part numbers from `dmidecode --type 17`, filtered of placeholder
/// strings. `None` when dmidecode is unavailable or needs privileges we do
/// not have.
fn dimm_part_numbers() -> Option<Vec<String>> {
    let output = Command::new("dmidecode").args(["--type", "17"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    let skus: Vec<String> = text
        .lines()
        .filter_map(|l| l.trim().strip_prefix("Part Number:"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "Not Specified" && v != "Unknown")
        .collect();
    (!skus.is_empty()).then_some(skus)
}

fn percent(used: f64, total: f64) -> f64 {
    if total == 0.0 {
        return 0.0;
    }
    100.0 * used / total
}

/// Memory and swap usage sensor.
pub struct MemoryUsage {
    source: Box<dyn MemorySource>,
    table: StatsTable,
    skus: Option<Vec<String>>,
}

impl MemoryUsage {
    const HEADINGS: [&'static str; 5] = ["Memory", "Current", "Min", "Max", "Mean"];

    const ROWS: [(&'static str, &'static str); 8] = [
        ("Mem", "Total"),
        ("Mem", "Available"),
        ("Mem", "Used"),
        ("Mem", "Percent"),
        ("Swap", "Total"),
        ("Swap", "Free"),
        ("Swap", "Used"),
        ("Swap", "Percent"),
    ];

    /// Reads from `/proc/meminfo` and probes DIMM part numbers once.
    pub fn new() -> Self {
        let mut sensor = Self::with_source(Box::new(ProcMeminfo::new()));
        sensor.skus = dimm_part_numbers();
        sensor
    }

    /// Builds the sensor over the given source; no part-number probe.
    pub fn with_source(source: Box<dyn MemorySource>) -> Self {
        let paths = Self::ROWS.iter().map(|(g, l)| MetricPath::pair(*g, *l)).collect();
        MemoryUsage { source, table: StatsTable::new(paths), skus: None }
    }

    /// Installed DIMM part numbers, when the probe could read them.
    pub fn memory_skus(&self) -> Option<&[String]> {
        self.skus.as_deref()
    }
}

impl Default for MemoryUsage {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for MemoryUsage {
    fn name(&self) -> &str {
        "memory_usage"
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
        let sample = match self.source.sample() {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "memory read failed");
                return;
            },
        };
        let mem_used = sample.mem_total - sample.mem_available;
        let swap_used = sample.swap_total - sample.swap_free;
        let values = [
            sample.mem_total,
            sample.mem_available,
            mem_used,
            percent(mem_used, sample.mem_total),
            sample.swap_total,
            sample.swap_free,
            swap_used,
            percent(swap_used, sample.swap_total),
        ];
        for ((group, label), value) in Self::ROWS.iter().zip(values) {
            self.table.observe(&MetricPath::pair(*group, *label), value);
        }
    }

    fn section(&self, path: &MetricPath) -> Option<String> {
        crate::sensor::check_arity(path, 2)?;
        Some("Memory Usage".to_string())
    }
}
