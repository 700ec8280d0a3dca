use std::fs;
use std::os::unix::fs::symlink;

use tempfile::TempDir;

use super::*;

fn nvme_drive() -> DriveInfo {
    DriveInfo {
        name: "nvme0".to_string(),
        model: "Samsung SSD 990 PRO 2TB".to_string(),
        sensors: vec!["Composite".to_string(), "Sensor 1".to_string(), "Sensor 2".to_string()],
    }
}

fn sata_drive() -> DriveInfo {
    DriveInfo {
        name: "sda".to_string(),
        model: "WDC WD40EFRX".to_string(),
        sensors: vec!["Composite".to_string()],
    }
}

#[test]
fn rows_group_per_drive_in_probe_order() {
    let mut source = MockDriveSource::new();
    source.expect_drives().returning(|| Ok(vec![nvme_drive(), sata_drive()]));
    let sensor = DriveTemp::with_source(Box::new(source));

    let paths: Vec<String> = sensor.paths().map(|p| p.to_string()).collect();
    assert_eq!(
        paths,
        ["nvme0 Composite", "nvme0 Sensor 1", "nvme0 Sensor 2", "sda Composite"]
    );
}

#[test]
fn section_carries_the_drive_model() {
    let mut source = MockDriveSource::new();
    source.expect_drives().returning(|| Ok(vec![nvme_drive()]));
    let sensor = DriveTemp::with_source(Box::new(source));

    let composite = MetricPath::pair("nvme0", "Composite");
    assert_eq!(
        sensor.section(&composite).as_deref(),
        Some("nvme0 - Samsung SSD 990 PRO 2TB")
    );
    assert_eq!(sensor.label(&composite).as_deref(), Some("Composite"));
    assert_eq!(sensor.subsection(&composite), None);
    assert_eq!(sensor.section(&MetricPath::pair("nvme9", "Composite")), None);
}

#[test]
fn update_observes_labelled_channels() {
    let mut source = MockDriveSource::new();
    source.expect_drives().returning(|| Ok(vec![nvme_drive()]));
    source.expect_temperatures().returning(|_| {
        Ok(vec![
            ("Composite".to_string(), 41.5),
            ("Sensor 1".to_string(), 39.0),
            ("Sensor 2".to_string(), 48.0),
        ])
    });

    let mut sensor = DriveTemp::with_source(Box::new(source));
    sensor.update();

    assert_eq!(sensor.current(&MetricPath::pair("nvme0", "Composite")), Some(42));
    assert_eq!(sensor.current(&MetricPath::pair("nvme0", "Sensor 2")), Some(48));
    assert_eq!(sensor.csv_headings()[0], "nvme0 Composite");
}

#[test]
fn no_drives_means_an_empty_sensor() {
    let mut source = MockDriveSource::new();
    source.expect_drives().returning(|| Ok(Vec::new()));
    let mut sensor = DriveTemp::with_source(Box::new(source));

    assert!(sensor.is_empty());
    sensor.update();
    assert!(sensor.csv_headings().is_empty());
}

#[test]
fn hwmon_source_reads_drive_chip_fixture() {
    let dir = TempDir::new().unwrap();

    // NVMe controller device the chip links back to.
    let controller = dir.path().join("devices/nvme0");
    fs::create_dir_all(&controller).unwrap();
    fs::write(controller.join("model"), "Samsung SSD 990 PRO 2TB\n").unwrap();

    let chip = dir.path().join("hwmon0");
    fs::create_dir_all(&chip).unwrap();
    fs::write(chip.join("name"), "nvme\n").unwrap();
    symlink(&controller, chip.join("device")).unwrap();
    fs::write(chip.join("temp1_label"), "Composite\n").unwrap();
    fs::write(chip.join("temp1_input"), "41500\n").unwrap();
    fs::write(chip.join("temp2_label"), "Sensor 1\n").unwrap();
    fs::write(chip.join("temp2_input"), "39000\n").unwrap();

    let mut source = HwmonDrives::at(dir.path().to_path_buf()).unwrap();
    let drives = source.drives().unwrap();
    assert_eq!(drives, [nvme_drive_with_two_sensors()]);

    let temps = source.temperatures(0).unwrap();
    assert_eq!(temps, [("Composite".to_string(), 41.5), ("Sensor 1".to_string(), 39.0)]);
}

fn nvme_drive_with_two_sensors() -> DriveInfo {
    DriveInfo {
        name: "nvme0".to_string(),
        model: "Samsung SSD 990 PRO 2TB".to_string(),
        sensors: vec!["Composite".to_string(), "Sensor 1".to_string()],
    }
}

#[test]
fn unlabelled_drivetemp_channel_reads_as_composite() {
    let dir = TempDir::new().unwrap();
    let disk = dir.path().join("devices/sda");
    fs::create_dir_all(&disk).unwrap();
    fs::write(disk.join("model"), "WDC WD40EFRX\n").unwrap();

    let chip = dir.path().join("hwmon0");
    fs::create_dir_all(&chip).unwrap();
    fs::write(chip.join("name"), "drivetemp\n").unwrap();
    symlink(&disk, chip.join("device")).unwrap();
    fs::write(chip.join("temp1_input"), "34000\n").unwrap();

    let mut source = HwmonDrives::at(dir.path().to_path_buf()).unwrap();
    assert_eq!(source.drives().unwrap(), [sata_drive()]);
    assert_eq!(source.temperatures(0).unwrap(), [("Composite".to_string(), 34.0)]);
}

#[test]
fn hwmon_root_without_drive_chips_is_an_error() {
    let dir = TempDir::new().unwrap();
    let chip = dir.path().join("hwmon0");
    fs::create_dir_all(&chip).unwrap();
    fs::write(chip.join("name"), "coretemp\n").unwrap();

    assert!(HwmonDrives::at(dir.path().to_path_buf()).is_err());
}
