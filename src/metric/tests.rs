use proptest::prelude::*;

use super::*;

#[test]
fn fresh_stats_report_nothing() {
    let stats = RunningStats::new();
    assert!(!stats.has_samples());
    assert_eq!(stats.samples(), 0);
    assert_eq!(stats.current(), None);
    assert_eq!(stats.minimum(), None);
    assert_eq!(stats.maximum(), None);
    assert_eq!(stats.mean(), None);
    assert_eq!(stats.csv_current(), None);
}

#[test]
fn observe_tracks_min_max_current() {
    let mut stats = RunningStats::new();
    stats.observe(40.0);
    stats.observe(10.0);
    stats.observe(25.0);
    assert_eq!(stats.current(), Some(25));
    assert_eq!(stats.minimum(), Some(10));
    assert_eq!(stats.maximum(), Some(40));
    assert_eq!(stats.mean(), Some(25));
    assert_eq!(stats.samples(), 3);
}

#[test]
fn display_rounding_ties_go_away_from_zero() {
    let mut stats = RunningStats::new();
    stats.observe(2.5);
    assert_eq!(stats.current(), Some(3));
    stats.observe(3.5);
    assert_eq!(stats.current(), Some(4));
    stats.observe(-0.5);
    assert_eq!(stats.current(), Some(-1));
}

#[test]
fn csv_rounding_keeps_four_decimals() {
    let mut stats = RunningStats::new();
    stats.observe(1234.567_89);
    assert_eq!(stats.csv_current(), Some(1234.5679));
    stats.observe(0.000_04);
    assert_eq!(stats.csv_current(), Some(0.0));
}

#[test]
fn discard_advances_count_without_touching_values() {
    let mut stats = RunningStats::new();
    stats.observe(100.0);
    stats.discard();
    stats.discard();
    assert_eq!(stats.samples(), 3);
    assert_eq!(stats.current(), Some(100));
    assert_eq!(stats.maximum(), Some(100));
    assert_eq!(stats.mean(), Some(100));
}

#[test]
fn discard_before_first_sample_slows_the_mean() {
    let mut stats = RunningStats::new();
    stats.discard();
    assert!(!stats.has_samples());
    stats.observe(50.0);
    // Two counted cycles, one accepted sample: the mean lags the sample.
    assert_eq!(stats.mean_value(), Some(25.0));
}

proptest! {
    #[test]
    fn incremental_stats_match_direct_computation(
        samples in prop::collection::vec(-1.0e6_f64..1.0e6, 1..200),
    ) {
        let mut stats = RunningStats::new();
        for &s in &samples {
            stats.observe(s);
        }

        let direct_mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let minimum = stats.min_value().unwrap();
        let maximum = stats.max_value().unwrap();
        for &s in &samples {
            prop_assert!(minimum <= s && s <= maximum);
        }
        prop_assert!((stats.mean_value().unwrap() - direct_mean).abs() < 1.0e-6);
        prop_assert_eq!(stats.samples(), samples.len() as u64);
    }
}

#[test]
fn path_accessors() {
    let path = MetricPath::triple("nvidia", "RTX-0", "temp");
    assert_eq!(path.arity(), 3);
    assert_eq!(path.segment(0), Some("nvidia"));
    assert_eq!(path.segment(2), Some("temp"));
    assert_eq!(path.segment(3), None);
    assert_eq!(path.to_string(), "nvidia RTX-0 temp");
}

#[test]
fn paths_iterator_is_restartable_and_stable() {
    let table = StatsTable::new(vec![
        MetricPath::flat("CPU"),
        MetricPath::flat("Core 0"),
        MetricPath::flat("Core 1"),
    ]);
    let first: Vec<_> = table.paths().collect();
    let second: Vec<_> = table.paths().collect();
    assert_eq!(first, second);
    assert_eq!(first[0], MetricPath::flat("CPU"));

    // Two in-flight traversals do not interfere.
    let mut a = table.paths();
    let mut b = table.paths();
    a.next();
    a.next();
    assert_eq!(b.next(), Some(MetricPath::flat("CPU")));
    assert_eq!(a.len(), 1);
}

#[test]
fn table_ignores_unknown_paths() {
    let mut table = StatsTable::new(vec![MetricPath::flat("CPU")]);
    table.observe(&MetricPath::flat("nope"), 1.0);
    table.discard(&MetricPath::flat("nope"));
    assert!(table.get(&MetricPath::flat("nope")).is_none());
    let stats = table.get(&MetricPath::flat("CPU")).unwrap();
    assert_eq!(stats.samples(), 0);
}

#[test]
fn empty_table() {
    let table = StatsTable::empty();
    assert!(table.is_empty());
    assert_eq!(table.paths().len(), 0);
    assert_eq!(table.paths().count(), 0);
}
