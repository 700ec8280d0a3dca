use std::fs;
use std::path::PathBuf;

use tracing::warn;

use crate::cpu::{class_means, core_labels, CpuInfo};
use crate::error::{Error, Result};
use crate::metric::{MetricPath, StatsTable};
use crate::sensor::Sensor;

#[cfg(test)]
use mockall::automock;

/// One usage reading: total busy percentage plus per-core percentages.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSample {
    pub total_percent: f64,
    pub core_percent: Vec<f64>,
}

/// Data source for CPU load percentages.
///
/// Takes `&mut self` because percentage sources derive their value from the
/// delta between two successive counter reads and must keep the previous
/// read, the one piece of cross-cycle state the sensor contract allows for
/// rate-derived metrics.
#[cfg_attr(test, automock)]
pub trait UsageSource: Send + Sync {
    fn sample(&mut self) -> Result<UsageSample>;
}

#[derive(Debug, Clone, Copy, Default)]
struct CpuTicks {
    busy: u64,
    total: u64,
}

/// Busy percentages from `/proc/stat` jiffy counters.
///
/// Busy time excludes both `idle` and `iowait`. The first sample after
/// construction has no delta to compare against and reports zero.
#[derive(Debug)]
pub struct ProcStatUsage {
    stat: PathBuf,
    previous: Option<Vec<CpuTicks>>,
}

impl ProcStatUsage {
    pub fn new() -> Self {
        Self::at("/proc/stat".into())
    }

    /// Source reading an alternate stat file, for fixtures.
    pub fn at(stat: PathBuf) -> Self {
        ProcStatUsage { stat, previous: None }
    }

    fn read_ticks(&self) -> Result<Vec<CpuTicks>> {
        let text = fs::read_to_string(&self.stat)?;
        let mut ticks = Vec::new();
        for line in text.lines() {
            if !line.starts_with("cpu") {
                continue;
            }
            let fields: Vec<u64> = line
                .split_whitespace()
                .skip(1)
                .map_while(|f| f.parse().ok())
                .collect();
            if fields.len() < 5 {
                return Err(Error::invalid_data("short cpu line in stat file"));
            }
            let total: u64 = fields.iter().sum();
            let idle = fields[3] + fields[4];
            ticks.push(CpuTicks { busy: total - idle, total });
        }
        if ticks.is_empty() {
            return Err(Error::invalid_data("no cpu lines in stat file"));
        }
        Ok(ticks)
    }
}

impl Default for ProcStatUsage {
    fn default() -> Self {
        Self::new()
    }
}

fn percent(now: CpuTicks, before: CpuTicks) -> f64 {
    let total = now.total.saturating_sub(before.total);
    if total == 0 {
        return 0.0;
    }
    let busy = now.busy.saturating_sub(before.busy);
    100.0 * busy as f64 / total as f64
}

impl UsageSource for ProcStatUsage {
    fn sample(&mut self) -> Result<UsageSample> {
        let ticks = self.read_ticks()?;
        let sample = match &self.previous {
            Some(previous) => {
                let pct: Vec<f64> = ticks
                    .iter()
                    .zip(previous)
                    .map(|(&now, &before)| percent(now, before))
                    .collect();
                UsageSample { total_percent: pct[0], core_percent: pct[1..].to_vec() }
            },
            None => UsageSample {
                total_percent: 0.0,
                core_percent: vec![0.0; ticks.len().saturating_sub(1)],
            },
        };
        self.previous = Some(ticks);
        Ok(sample)
    }
}

/// Per-core CPU load sensor.
///
/// Same flat topology as [`CpuFrequency`](crate::cpu::CpuFrequency): package
/// row, optional P/E aggregates, per-core rows.
pub struct CpuUsage {
    info: CpuInfo,
    source: Box<dyn UsageSource>,
    table: StatsTable,
    section: String,
}

impl CpuUsage {
    const HEADINGS: [&'static str; 5] = ["Core", "Current(%)", "Min(%)", "Max(%)", "Mean(%)"];

    /// Probes the host topology and reads from `/proc/stat`.
    pub fn new() -> Self {
        match CpuInfo::probe() {
            Ok(info) => Self::with_source(info, Box::new(ProcStatUsage::new())),
            Err(e) => {
                warn!(error = %e, "cpu topology probe failed, usage sensor disabled");
                CpuUsage {
                    info: CpuInfo::from_parts("Unknown", "Unknown", 0, 0),
                    source: Box::new(ProcStatUsage::new()),
                    table: StatsTable::empty(),
                    section: String::new(),
                }
            },
        }
    }

    /// Builds the sensor over an explicit topology and source.
    pub fn with_source(info: CpuInfo, source: Box<dyn UsageSource>) -> Self {
        let paths = core_labels(&info).into_iter().map(MetricPath::flat).collect();
        let section = format!("CPU: {}", info.model());
        CpuUsage { info, source, table: StatsTable::new(paths), section }
    }

    pub fn model(&self) -> &str {
        self.info.model()
    }
}

impl Default for CpuUsage {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for CpuUsage {
    fn name(&self) -> &str {
        "cpu_usage"
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
            Ok(sample) if !sample.core_percent.is_empty() => sample,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "cpu usage read failed");
                return;
            },
        };

        let mut values = Vec::with_capacity(self.table.len());
        values.push(sample.total_percent);
        if let Some(perf) = self.info.performance_threads() {
            let (p_mean, e_mean) = class_means(&sample.core_percent, perf as usize);
            values.push(p_mean);
            values.push(e_mean);
        }
        values.extend_from_slice(&sample.core_percent);

        for (path, value) in self.table.paths().zip(values) {
            self.table.observe(&path, value);
        }
    }

    fn section(&self, path: &MetricPath) -> Option<String> {
        crate::sensor::check_arity(path, 1)?;
        Some(self.section.clone())
    }
}
