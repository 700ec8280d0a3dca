use std::fs;

use tempfile::TempDir;

use super::*;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn half_used() -> MemorySample {
    MemorySample {
        mem_total: 32.0 * GIB,
        mem_available: 16.0 * GIB,
        swap_total: 8.0 * GIB,
        swap_free: 8.0 * GIB,
    }
}

#[test]
fn topology_is_fixed_mem_then_swap() {
    let mut source = MockMemorySource::new();
    source.expect_sample().returning(|| Ok(half_used()));
    let sensor = MemoryUsage::with_source(Box::new(source));

    let paths: Vec<String> = sensor.paths().map(|p| p.to_string()).collect();
    assert_eq!(
        paths,
        [
            "Mem Total", "Mem Available", "Mem Used", "Mem Percent", "Swap Total", "Swap Free",
            "Swap Used", "Swap Percent",
        ]
    );
    assert!(!sensor.is_empty());
}

#[test]
fn derived_rows_come_from_totals() {
    let mut source = MockMemorySource::new();
    source.expect_sample().returning(|| Ok(half_used()));
    let mut sensor = MemoryUsage::with_source(Box::new(source));
    sensor.update();

    assert_eq!(sensor.current(&MetricPath::pair("Mem", "Used")), Some((16.0 * GIB) as i64));
    assert_eq!(sensor.current(&MetricPath::pair("Mem", "Percent")), Some(50));
    // Idle swap divides to zero percent, not NaN, even when totals are zero.
    assert_eq!(sensor.current(&MetricPath::pair("Swap", "Used")), Some(0));
    assert_eq!(sensor.current(&MetricPath::pair("Swap", "Percent")), Some(0));
    assert_eq!(sensor.section(&MetricPath::pair("Mem", "Total")).as_deref(), Some("Memory Usage"));
}

#[test]
fn zero_swap_total_reads_as_zero_percent() {
    let mut source = MockMemorySource::new();
    source.expect_sample().returning(|| {
        Ok(MemorySample { swap_total: 0.0, swap_free: 0.0, ..half_used() })
    });
    let mut sensor = MemoryUsage::with_source(Box::new(source));
    sensor.update();

    assert_eq!(sensor.current(&MetricPath::pair("Swap", "Percent")), Some(0));
}

#[test]
fn csv_frame_uses_space_joined_headings() {
    let mut source = MockMemorySource::new();
    source.expect_sample().returning(|| Ok(half_used()));
    let mut sensor = MemoryUsage::with_source(Box::new(source));
    sensor.update();

    let headings = sensor.csv_headings();
    assert_eq!(headings.len(), 8);
    assert_eq!(headings[0], "Mem Total");
    assert_eq!(headings[7], "Swap Percent");
    assert_eq!(sensor.csv_data().len(), 8);
}

#[test]
fn skus_default_to_none_without_a_probe() {
    let mut source = MockMemorySource::new();
    source.expect_sample().returning(|| Ok(half_used()));
    let sensor = MemoryUsage::with_source(Box::new(source));
    assert!(sensor.memory_skus().is_none());
}

#[test]
fn meminfo_fixture_parses_to_bytes() {
    let dir = TempDir::new().unwrap();
    let meminfo = dir.path().join("meminfo");
    fs::write(
        &meminfo,
        "MemTotal:       32768000 kB\n\
         MemFree:         1024000 kB\n\
         MemAvailable:   16384000 kB\n\
         SwapTotal:       8192000 kB\n\
         SwapFree:        8192000 kB\n",
    )
    .unwrap();

    let sample = ProcMeminfo::at(meminfo).sample().unwrap();
    assert_eq!(sample.mem_total, 32_768_000.0 * 1024.0);
    assert_eq!(sample.mem_available, 16_384_000.0 * 1024.0);
    assert_eq!(sample.swap_free, 8_192_000.0 * 1024.0);
}

#[test]
fn truncated_meminfo_is_an_error() {
    let dir = TempDir::new().unwrap();
    let meminfo = dir.path().join("meminfo");
    fs::write(&meminfo, "MemTotal:       32768000 kB\n").unwrap();

    assert!(ProcMeminfo::at(meminfo).sample().is_err());
}
