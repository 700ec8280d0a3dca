use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use stressmon::cpu::{ProcStatUsage, SysfsFrequency};
use stressmon::memory::ProcMeminfo;
use stressmon::power::SysfsEnergy;
use stressmon::prelude::*;
use stressmon::report::{csv_frame, Snapshot};
use stressmon::temperature::HwmonTemps;
use tempfile::TempDir;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Lays out a small fake machine: two CPU cores, one temperature chip, one
/// RAPL package, RAM and swap.
struct FakeMachine {
    root: TempDir,
}

impl FakeMachine {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let machine = FakeMachine { root };

        for (core, khz) in [(0, 4_200_000), (1, 3_900_000)] {
            let cpufreq = machine.path().join(format!("cpu/cpu{core}/cpufreq"));
            fs::create_dir_all(&cpufreq).unwrap();
            fs::write(cpufreq.join("scaling_cur_freq"), format!("{khz}\n")).unwrap();
        }

        machine.write_stat(100, 900);

        let chip = machine.path().join("hwmon/hwmon0");
        fs::create_dir_all(&chip).unwrap();
        fs::write(chip.join("name"), "coretemp\n").unwrap();
        fs::write(chip.join("temp1_label"), "Package id 0\n").unwrap();
        fs::write(chip.join("temp1_input"), "46000\n").unwrap();
        fs::write(chip.join("temp2_label"), "Core 0\n").unwrap();
        fs::write(chip.join("temp2_input"), "43000\n").unwrap();

        let rapl = machine.path().join("powercap/intel-rapl:0");
        fs::create_dir_all(&rapl).unwrap();
        fs::write(rapl.join("energy_uj"), "10000000\n").unwrap();

        fs::write(
            machine.path().join("meminfo"),
            "MemTotal:       16000000 kB\n\
             MemAvailable:    8000000 kB\n\
             SwapTotal:       4000000 kB\n\
             SwapFree:        4000000 kB\n",
        )
        .unwrap();

        machine
    }

    fn path(&self) -> &Path {
        self.root.path()
    }

    fn write_stat(&self, busy: u64, idle: u64) {
        let per_core = busy / 2;
        fs::write(
            self.path().join("stat"),
            format!(
                "cpu  {busy} 0 0 {idle} 0 0 0\n\
                 cpu0 {per_core} 0 0 {half} 0 0 0\n\
                 cpu1 {per_core} 0 0 {half} 0 0 0\n",
                half = idle / 2,
            ),
        )
        .unwrap();
    }

    fn advance(&self) {
        // More busy time, more energy, slightly warmer cores.
        self.write_stat(400, 1200);
        fs::write(self.path().join("powercap/intel-rapl:0/energy_uj"), "90000000\n").unwrap();
        fs::write(self.path().join("hwmon/hwmon0/temp1_input"), "52000\n").unwrap();
        fs::write(self.path().join("hwmon/hwmon0/temp2_input"), "49000\n").unwrap();
    }

    fn sensor_set(&self) -> SensorSet {
        let info = CpuInfo::from_parts("Test CPU", "GenuineIntel", 2, 2);
        let mut set = SensorSet::new();
        set.push(CpuFrequency::with_source(
            info.clone(),
            Box::new(SysfsFrequency::at(self.path().join("cpu"))),
        ));
        set.push(CpuUsage::with_source(
            info,
            Box::new(ProcStatUsage::at(self.path().join("stat"))),
        ));
        set.push(CpuTemperature::with_source(Box::new(
            HwmonTemps::at(self.path().join("hwmon")).unwrap(),
        )));
        set.push(CpuPower::with_source(Box::new(
            SysfsEnergy::at(self.path().join("powercap")).unwrap(),
        )));
        set.push(MemoryUsage::with_source(Box::new(ProcMeminfo::at(
            self.path().join("meminfo"),
        ))));
        set
    }
}

#[test]
fn full_cycle_across_all_sensor_kinds() {
    init_tracing();
    let machine = FakeMachine::new();
    let set = machine.sensor_set();
    let mut pool = UpdatePool::from_set(&set);
    assert_eq!(pool.len(), 5);

    pool.run_cycle();
    thread::sleep(Duration::from_millis(10));
    machine.advance();
    pool.run_cycle();

    // Frequency: stable clocks, per-core rows present.
    let frequency = set.iter().next().unwrap().read();
    assert_eq!(frequency.current(&MetricPath::flat("CPU")), Some(4050));
    assert_eq!(frequency.current(&MetricPath::flat("Core 1")), Some(3900));
    assert_eq!(frequency.stats(&MetricPath::flat("CPU")).unwrap().samples(), 2);

    // Usage: first cycle has no delta, second one does.
    let usage = set.iter().nth(1).unwrap().read();
    assert_eq!(usage.minimum(&MetricPath::flat("CPU")), Some(0));
    assert_eq!(usage.current(&MetricPath::flat("CPU")), Some(50));

    // Temperature: grouped rows with widened min/max.
    let temperature = set.iter().nth(2).unwrap().read();
    let core = MetricPath::pair("Package id 0", "Core 0");
    assert_eq!(temperature.minimum(&core), Some(43));
    assert_eq!(temperature.maximum(&core), Some(49));

    // Power: 80 J over ~10ms is implausible only to humans; the first sample
    // has no mean to compare against, so it is accepted.
    let power = set.iter().nth(3).unwrap().read();
    let package = MetricPath::flat("CPU0");
    assert!(power.stats(&package).unwrap().value().unwrap() > 0.0);
    assert_eq!(power.section(&package).as_deref(), Some("CPU Watts"));

    // Memory: derived percent row.
    let memory = set.iter().nth(4).unwrap().read();
    assert_eq!(memory.current(&MetricPath::pair("Mem", "Percent")), Some(50));
}

#[test]
fn snapshot_and_csv_stay_aligned_after_cycles() {
    init_tracing();
    let machine = FakeMachine::new();
    let set = machine.sensor_set();
    let mut pool = UpdatePool::from_set(&set);

    pool.run_cycle();
    thread::sleep(Duration::from_millis(10));
    machine.advance();
    pool.run_cycle();

    let snapshot = Snapshot::capture(&set);
    assert_eq!(snapshot.sensors.len(), 5);
    for sensor in &snapshot.sensors {
        assert!(!sensor.rows.is_empty(), "{} has no rows", sensor.name);
        assert_eq!(sensor.headings.len(), 5);
    }

    // Splicing per-sensor frames relies on both sides staying aligned.
    let mut headings = Vec::new();
    let mut values = Vec::new();
    for sensor in &set {
        let sensor = sensor.read();
        let (h, v) = csv_frame(&*sensor);
        assert_eq!(h.len(), v.len());
        headings.extend(h);
        values.extend(v);
    }
    assert_eq!(headings.len(), values.len());
    assert!(headings.contains(&"CPU0(Watts)".to_string()));
    assert!(headings.contains(&"Mem Percent".to_string()));

    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("\"cpu_frequency\""));
}
