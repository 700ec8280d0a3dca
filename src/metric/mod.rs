//! Metric addressing and incremental statistics
//!
//! Every sensor exposes its readings as a set of [`MetricPath`]s, each backed
//! by a [`RunningStats`] accumulator holding the current value plus the
//! minimum, maximum and mean since monitoring began. No raw sample history is
//! retained: the mean is maintained with Welford's incremental formula, so the
//! accumulators stay exact-enough and overflow-free over arbitrarily long runs.
//!
//! [`StatsTable`] ties the two together for a sensor: an ordered, frozen set
//! of paths plus the per-path accumulators. The key set is fixed when the
//! sensor probes its topology at construction; only the values mutate, once
//! per poll cycle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

#[cfg(test)]
mod tests;

/// Ordered key identifying one leaf measurement within a sensor's topology.
///
/// A path has one to three string segments depending on the sensor's shape:
/// flat sensors (per-core frequency) use one segment, grouped sensors
/// (package → core temperature) use two, and the GPU sensor uses three
/// (vendor → device → metric). The same path always addresses the same
/// logical metric for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MetricPath(Vec<String>);

impl MetricPath {
    /// Single-segment path for flat sensors.
    pub fn flat(label: impl Into<String>) -> Self {
        MetricPath(vec![label.into()])
    }

    /// Two-segment path: outer grouping key, then leaf name.
    pub fn pair(group: impl Into<String>, leaf: impl Into<String>) -> Self {
        MetricPath(vec![group.into(), leaf.into()])
    }

    /// Three-segment path: vendor, device, metric name.
    pub fn triple(
        vendor: impl Into<String>,
        device: impl Into<String>,
        metric: impl Into<String>,
    ) -> Self {
        MetricPath(vec![vendor.into(), device.into(), metric.into()])
    }

    /// Number of segments (1 to 3).
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Segment at `index`, or `None` past the end.
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// All segments in order.
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for MetricPath {
    /// Segments joined by a single space, the default CSV heading form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// Restartable iterator over a sensor's metric paths.
///
/// The iterator captures an immutable snapshot of the path list, so a fresh
/// traversal can be started at any time and repeated or concurrent traversals
/// never interfere with each other. Order is the order fixed at sensor
/// construction: outer grouping key in insertion order, then inner key, then
/// metric name in declared order.
#[derive(Clone, Debug)]
pub struct MetricPaths {
    paths: Arc<[MetricPath]>,
    next: usize,
}

impl MetricPaths {
    pub(crate) fn new(paths: Arc<[MetricPath]>) -> Self {
        MetricPaths { paths, next: 0 }
    }
}

impl Iterator for MetricPaths {
    type Item = MetricPath;

    fn next(&mut self) -> Option<MetricPath> {
        let path = self.paths.get(self.next)?.clone();
        self.next += 1;
        Some(path)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.paths.len() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for MetricPaths {}

/// Incremental current/min/max/mean accumulator for one metric.
///
/// Before the first accepted sample the minimum and maximum hold inverted
/// infinities as sentinels and every value accessor returns `None`; once a
/// sample has been observed, `minimum <= current <= maximum` holds.
///
/// The sample count advances on [`observe`](Self::observe) *and* on
/// [`discard`](Self::discard); see `discard` for why.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunningStats {
    current: f64,
    minimum: f64,
    maximum: f64,
    mean: f64,
    samples: u64,
}

impl RunningStats {
    pub fn new() -> Self {
        RunningStats {
            current: 0.0,
            minimum: f64::INFINITY,
            maximum: f64::NEG_INFINITY,
            mean: 0.0,
            samples: 0,
        }
    }

    /// Folds one sample into the accumulator.
    ///
    /// Sets the current value, widens min/max, and advances the mean by
    /// `(sample - mean) / samples` so no sample history is needed.
    pub fn observe(&mut self, sample: f64) {
        self.current = sample;
        self.minimum = self.minimum.min(sample);
        self.maximum = self.maximum.max(sample);
        self.samples += 1;
        self.mean += (sample - self.mean) / self.samples as f64;
    }

    /// Advances the sample count without accepting a value.
    ///
    /// Used by the power sensor when it rejects a spurious spike: the rejected
    /// wattage must not touch min/max/mean, but the cycle still counts, so the
    /// count keeps advancing whether or not the sample was accepted. Frequent
    /// discards therefore make the mean respond more slowly to later samples;
    /// that matches the long-standing polling behavior and is deliberate.
    pub fn discard(&mut self) {
        self.samples += 1;
    }

    /// True once at least one sample has been accepted.
    pub fn has_samples(&self) -> bool {
        // The sentinels invert min/max until the first accepted sample.
        self.minimum <= self.maximum
    }

    /// Number of poll cycles counted, accepted or discarded.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Current value, unrounded.
    pub fn value(&self) -> Option<f64> {
        self.has_samples().then_some(self.current)
    }

    /// Minimum accepted sample, unrounded.
    pub fn min_value(&self) -> Option<f64> {
        self.has_samples().then_some(self.minimum)
    }

    /// Maximum accepted sample, unrounded.
    pub fn max_value(&self) -> Option<f64> {
        self.has_samples().then_some(self.maximum)
    }

    /// Running mean, unrounded.
    pub fn mean_value(&self) -> Option<f64> {
        self.has_samples().then_some(self.mean)
    }

    /// Current value rounded for display; ties round away from zero.
    pub fn current(&self) -> Option<i64> {
        self.value().map(round_display)
    }

    /// Minimum rounded for display; ties round away from zero.
    pub fn minimum(&self) -> Option<i64> {
        self.min_value().map(round_display)
    }

    /// Maximum rounded for display; ties round away from zero.
    pub fn maximum(&self) -> Option<i64> {
        self.max_value().map(round_display)
    }

    /// Mean rounded for display; ties round away from zero.
    pub fn mean(&self) -> Option<i64> {
        self.mean_value().map(round_display)
    }

    /// Current value with four decimal digits kept, for CSV export.
    pub fn csv_current(&self) -> Option<f64> {
        self.value().map(round_csv)
    }
}

impl Default for RunningStats {
    fn default() -> Self {
        RunningStats::new()
    }
}

/// Display rounding: nearest integer, ties away from zero (`f64::round`).
fn round_display(value: f64) -> i64 {
    value.round() as i64
}

/// CSV rounding: four decimal digits, ties away from zero.
fn round_csv(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Ordered per-sensor mapping from [`MetricPath`] to [`RunningStats`].
///
/// The path set and its order are frozen at construction; iteration never
/// depends on `HashMap` ordering because the order lives in a shared slice
/// and the map is lookup-only. Observing an unknown path is a silent no-op,
/// which keeps sensor update loops free of error plumbing.
#[derive(Debug, Clone)]
pub struct StatsTable {
    order: Arc<[MetricPath]>,
    stats: HashMap<MetricPath, RunningStats>,
}

impl StatsTable {
    /// Builds a table over `paths`, in the given (display) order.
    pub fn new(paths: Vec<MetricPath>) -> Self {
        let stats = paths.iter().cloned().map(|p| (p, RunningStats::new())).collect();
        StatsTable { order: Arc::from(paths), stats }
    }

    /// Table with no paths, for sensors whose probe found nothing.
    pub fn empty() -> Self {
        StatsTable::new(Vec::new())
    }

    /// Restartable traversal of the paths in construction order.
    pub fn paths(&self) -> MetricPaths {
        MetricPaths::new(Arc::clone(&self.order))
    }

    /// Accumulator for `path`, if the path belongs to this table.
    pub fn get(&self, path: &MetricPath) -> Option<&RunningStats> {
        self.stats.get(path)
    }

    /// Folds `sample` into the accumulator for `path`; unknown paths are
    /// ignored.
    pub fn observe(&mut self, path: &MetricPath, sample: f64) {
        if let Some(stats) = self.stats.get_mut(path) {
            stats.observe(sample);
        }
    }

    /// Counts a rejected sample for `path`; unknown paths are ignored.
    pub fn discard(&mut self, path: &MetricPath) {
        if let Some(stats) = self.stats.get_mut(path) {
            stats.discard();
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
