//! CPU sensors: per-core clock speed and per-core load
//!
//! Both sensors share one flat topology derived from [`CpuInfo`]: a "CPU"
//! package row, two synthetic class aggregates on hybrid (P/E core) parts,
//! then one row per logical core. The frequency sensor reads sysfs cpufreq;
//! the usage sensor derives busy percentages from `/proc/stat` deltas.

mod frequency;
mod info;
mod usage;


pub use frequency::{CpuFrequency, FrequencySample, FrequencySource, SysfsFrequency};
pub use info::CpuInfo;
pub use usage::{CpuUsage, ProcStatUsage, UsageSample, UsageSource};

/// Row labels for the shared CPU topology, in display order.
///
/// `"CPU"` first, then `"P Cores"`/`"E Cores"` aggregates when the part is
/// hybrid, then `"P Core 0"`..`"E Core 11"` (or plain `"Core N"`) per logical
/// core.
pub(crate) fn core_labels(info: &CpuInfo) -> Vec<String> {
    let mut labels = Vec::with_capacity(info.logical_cores() as usize + 3);
    labels.push("CPU".to_string());
    let perf_threads = info.performance_threads();
    if perf_threads.is_some() {
        labels.push("P Cores".to_string());
        labels.push("E Cores".to_string());
    }
    for core in 0..info.logical_cores() {
        let class = match perf_threads {
            Some(p) if core < p => "P ",
            Some(_) => "E ",
            None => "",
        };
        labels.push(format!("{class}Core {core}"));
    }
    labels
}

pub(crate) fn arithmetic_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Means of the performance and efficiency core classes.
///
/// The first `perf_threads` logical cores are the performance class; the rest
/// are the efficiency class.
pub(crate) fn class_means(per_core: &[f64], perf_threads: usize) -> (f64, f64) {
    let split = perf_threads.min(per_core.len());
    (arithmetic_mean(&per_core[..split]), arithmetic_mean(&per_core[split..]))
}
