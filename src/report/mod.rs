//! Presentation boundary
//!
//! Turns sensor state into plain data the display and export layers can
//! consume without knowing any sensor's shape: ordered rows of decorated
//! display values per sensor, a position-aligned CSV frame, and a
//! [`Snapshot`] over a whole [`SensorSet`]. Everything here is `Serialize`,
//! so a snapshot can go straight to JSON.
//!
//! Rendering itself (terminal UI, CSV files on disk) stays out of this crate.

use serde::Serialize;

use crate::sensor::{Sensor, SensorSet};


/// One display row: the decorated projections of a single metric path.
///
/// `current` through `mean` are `None` until the metric produces its first
/// sample; the row still renders so topology stays visible from cycle zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub label: Option<String>,
    pub section: Option<String>,
    pub subsection: Option<String>,
    pub current: Option<i64>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub mean: Option<i64>,
}

/// Rows for every path of one sensor, in enumeration order.
pub fn sensor_rows(sensor: &dyn Sensor) -> Vec<MetricRow> {
    sensor
        .paths()
        .map(|path| MetricRow {
            label: sensor.label(&path),
            section: sensor.section(&path),
            subsection: sensor.subsection(&path),
            current: sensor.current(&path),
            minimum: sensor.minimum(&path),
            maximum: sensor.maximum(&path),
            mean: sensor.mean(&path),
        })
        .collect()
}

/// Position-aligned CSV headings and current values for one sensor.
///
/// Both sides are restricted to paths that currently hold a value, so the
/// two vectors are always the same length; asserting that equality is the
/// caller's job when it splices frames from several sensors together.
pub fn csv_frame(sensor: &dyn Sensor) -> (Vec<String>, Vec<f64>) {
    (sensor.csv_headings(), sensor.csv_data())
}

/// One sensor's rows plus its display metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReport {
    pub name: String,
    pub headings: Vec<String>,
    pub rows: Vec<MetricRow>,
}

impl SensorReport {
    pub fn capture(sensor: &dyn Sensor) -> Self {
        SensorReport {
            name: sensor.name().to_string(),
            headings: sensor.headings().iter().map(|h| h.to_string()).collect(),
            rows: sensor_rows(sensor),
        }
    }
}

/// Point-in-time view of every non-empty sensor in a set.
///
/// Capture takes each sensor's read lock in turn, between cycles; a sensor
/// mid-update blocks its own capture but never another sensor's.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub sensors: Vec<SensorReport>,
}

impl Snapshot {
    pub fn capture(set: &SensorSet) -> Self {
        let sensors = set
            .iter()
            .map(|sensor| sensor.read())
            .filter(|sensor| !sensor.is_empty())
            .map(|sensor| SensorReport::capture(&*sensor))
            .collect();
        Snapshot { sensors }
    }
}
