//! The polymorphic sensor capability
//!
//! [`Sensor`] is the one contract every hardware domain implements: a
//! frequency sensor with a flat list of cores, a temperature sensor grouped by
//! package, and the three-level GPU sensor all answer the same questions:
//! which metric paths exist, what are their current/min/max/mean values, and
//! how should they be labeled and grouped for display. Consumers never need to
//! know a sensor's shape; a path of the wrong arity simply answers `None`.
//!
//! The lookup and projection plumbing is shared as provided methods over a
//! required [`stats_table`](Sensor::stats_table)/[`path_arity`](Sensor::path_arity)
//! pair, so each variant only supplies its topology probe, its `update`, and
//! its labeling.

mod set;

#[cfg(test)]
mod tests;

pub use set::{SensorSet, SharedSensor};

use crate::metric::{MetricPath, MetricPaths, RunningStats, StatsTable};

/// Guards a path against the arity a sensor expects.
///
/// Wrong-shaped queries are a normal consequence of driving heterogeneous
/// sensors through one interface, so the answer is "no value", never an error.
pub(crate) fn check_arity<'a>(path: &'a MetricPath, arity: usize) -> Option<&'a MetricPath> {
    (path.arity() == arity).then_some(path)
}

/// One hardware telemetry domain.
///
/// Implementations own a private [`StatsTable`] built once from a topology
/// probe at construction; `update` refreshes it once per poll cycle from the
/// external data source. The path set never changes after construction; a
/// probe that finds no hardware of its kind yields an empty sensor
/// ([`is_empty`](Sensor::is_empty)) that still satisfies the whole contract.
pub trait Sensor: Send + Sync {
    /// Identifier used for registry keys and display headers.
    fn name(&self) -> &str;

    /// Display column headings, e.g. `["Core", "Current(MHz)", ...]`.
    fn headings(&self) -> &[&'static str];

    /// The arity every path of this sensor has (1 to 3).
    fn path_arity(&self) -> usize;

    /// The sensor's metric-state table.
    fn stats_table(&self) -> &StatsTable;

    /// Pulls one fresh sample set from the data source.
    ///
    /// Never fails: a transient source error is logged and leaves the previous
    /// values in place (stale-but-valid), so one misbehaving driver cannot
    /// poison a polling cycle.
    fn update(&mut self);

    /// Display section this path belongs to, `None` on arity mismatch.
    fn section(&self, path: &MetricPath) -> Option<String>;

    /// Display subsection, used by nested sensors; `None` otherwise.
    fn subsection(&self, path: &MetricPath) -> Option<String> {
        let _ = path;
        None
    }

    /// Row label for a path: its last segment, `None` on arity mismatch.
    fn label(&self, path: &MetricPath) -> Option<String> {
        let path = check_arity(path, self.path_arity())?;
        path.segment(path.arity() - 1).map(str::to_owned)
    }

    /// Restartable traversal of every metric path, in display order.
    fn paths(&self) -> MetricPaths {
        self.stats_table().paths()
    }

    /// Accumulator lookup with the arity guard applied.
    fn stats(&self, path: &MetricPath) -> Option<&RunningStats> {
        let path = check_arity(path, self.path_arity())?;
        self.stats_table().get(path)
    }

    /// Current value rounded for display; `None` for unknown paths, wrong
    /// arity, or metrics that have not produced a sample yet.
    fn current(&self, path: &MetricPath) -> Option<i64> {
        self.stats(path)?.current()
    }

    /// Minimum since monitoring began, rounded for display.
    fn minimum(&self, path: &MetricPath) -> Option<i64> {
        self.stats(path)?.minimum()
    }

    /// Maximum since monitoring began, rounded for display.
    fn maximum(&self, path: &MetricPath) -> Option<i64> {
        self.stats(path)?.maximum()
    }

    /// Running mean since monitoring began, rounded for display.
    fn mean(&self, path: &MetricPath) -> Option<i64> {
        self.stats(path)?.mean()
    }

    /// CSV column headings, aligned 1:1 with [`csv_data`](Sensor::csv_data).
    ///
    /// Restricted to paths that currently hold a value, so a device without a
    /// given capability omits the column entirely instead of emitting a
    /// placeholder.
    fn csv_headings(&self) -> Vec<String> {
        let table = self.stats_table();
        self.paths()
            .filter(|p| table.get(p).is_some_and(RunningStats::has_samples))
            .map(|p| p.to_string())
            .collect()
    }

    /// Current values for CSV export, four decimal digits kept.
    fn csv_data(&self) -> Vec<f64> {
        let table = self.stats_table();
        self.paths()
            .filter_map(|p| table.get(&p).and_then(RunningStats::csv_current))
            .collect()
    }

    /// True iff the topology probe found no devices of this sensor's kind.
    fn is_empty(&self) -> bool {
        self.stats_table().is_empty()
    }
}
