use super::*;
use crate::metric::{MetricPath, StatsTable};

struct FlatSensor {
    table: StatsTable,
}

impl FlatSensor {
    fn new(labels: &[&str]) -> Self {
        FlatSensor {
            table: StatsTable::new(labels.iter().map(|l| MetricPath::flat(*l)).collect()),
        }
    }
}

impl Sensor for FlatSensor {
    fn name(&self) -> &str {
        "flat"
    }

    fn headings(&self) -> &[&'static str] {
        &["Core", "Current", "Min", "Max", "Mean"]
    }

    fn path_arity(&self) -> usize {
        1
    }

    fn stats_table(&self) -> &StatsTable {
        &self.table
    }

    fn update(&mut self) {
        for (i, path) in self.table.paths().enumerate() {
            self.table.observe(&path, i as f64 + 0.5);
        }
    }

    fn section(&self, path: &MetricPath) -> Option<String> {
        check_arity(path, 1)?;
        Some("Flat".to_string())
    }
}

#[test]
fn arity_guard_accepts_only_the_declared_shape() {
    let flat = MetricPath::flat("CPU");
    let pair = MetricPath::pair("CPU", "Core 0");
    assert_eq!(check_arity(&flat, 1), Some(&flat));
    assert_eq!(check_arity(&pair, 1), None);
    assert_eq!(check_arity(&pair, 2), Some(&pair));
    assert_eq!(check_arity(&flat, 3), None);
}

#[test]
fn provided_projections_share_the_guard() {
    let mut sensor = FlatSensor::new(&["CPU", "Core 0"]);
    sensor.update();

    let good = MetricPath::flat("Core 0");
    assert_eq!(sensor.current(&good), Some(2));
    assert_eq!(sensor.label(&good).as_deref(), Some("Core 0"));

    let wrong_shape = MetricPath::pair("Core 0", "x");
    assert_eq!(sensor.current(&wrong_shape), None);
    assert_eq!(sensor.minimum(&wrong_shape), None);
    assert_eq!(sensor.label(&wrong_shape), None);

    let unknown = MetricPath::flat("Core 99");
    assert_eq!(sensor.current(&unknown), None);
}

#[test]
fn set_preserves_push_order() {
    let mut set = SensorSet::new();
    set.push(FlatSensor::new(&["a"]));
    set.push(FlatSensor::new(&[]));
    set.push(FlatSensor::new(&["b", "c"]));

    assert_eq!(set.len(), 3);
    let path_counts: Vec<usize> =
        set.iter().map(|s| s.read().paths().len()).collect();
    assert_eq!(path_counts, [1, 0, 2]);
}

#[test]
fn empty_sensors_iterate_uniformly() {
    let mut set = SensorSet::new();
    set.push(FlatSensor::new(&[]));

    for sensor in &set {
        let sensor = sensor.read();
        assert!(sensor.is_empty());
        assert_eq!(sensor.paths().count(), 0);
        assert!(sensor.csv_headings().is_empty());
        assert!(sensor.csv_data().is_empty());
    }
}

#[test]
fn updates_through_the_shared_handle_are_visible() {
    let mut set = SensorSet::new();
    set.push(FlatSensor::new(&["CPU"]));

    let sensor = set.iter().next().unwrap();
    sensor.write().update();
    assert_eq!(sensor.read().current(&MetricPath::flat("CPU")), Some(1));
}
