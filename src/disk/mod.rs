//! Drive temperature sensor
//!
//! Covers NVMe and SATA drives through the kernel's hwmon interface: NVMe
//! controllers expose an `nvme` chip with a `Composite` channel plus numbered
//! internal sensors, SATA drives expose a single-channel `drivetemp` chip.
//! Rows are grouped per drive; the section line carries the drive's model
//! string.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};
use crate::metric::{MetricPath, StatsTable};
use crate::sensor::Sensor;

#[cfg(test)]
mod tests;

#[cfg(test)]
use mockall::automock;

/// One detected drive and its temperature channel labels.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveInfo {
    pub name: String,
    pub model: String,
    pub sensors: Vec<String>,
}

/// Data source for drive temperatures.
#[cfg_attr(test, automock)]
pub trait DriveSource: Send + Sync {
    /// Detected drives, probed once at sensor construction.
    fn drives(&self) -> Result<Vec<DriveInfo>>;

    /// Labelled temperatures for the drive at `index`, in degrees Celsius.
    fn temperatures(&mut self, index: usize) -> Result<Vec<(String, f64)>>;
}

const CHIPS: [&str; 2] = ["drivetemp", "nvme"];

/// Drive temperature chips under `/sys/class/hwmon`.
#[derive(Debug)]
pub struct HwmonDrives {
    chips: Vec<PathBuf>,
}

impl HwmonDrives {
    pub fn new() -> Result<Self> {
        Self::at("/sys/class/hwmon".into())
    }

    /// Scans an alternate hwmon root, for fixtures.
    pub fn at(root: PathBuf) -> Result<Self> {
        let mut chips = Vec::new();
        let mut entries: Vec<PathBuf> =
            fs::read_dir(&root)?.flatten().map(|e| e.path()).collect();
        entries.sort();
        for dir in entries {
            let Ok(name) = fs::read_to_string(dir.join("name")) else { continue };
            if CHIPS.contains(&name.trim()) {
                chips.push(dir);
            }
        }
        if chips.is_empty() {
            return Err(Error::not_available("no drive temperature chips under hwmon"));
        }
        Ok(HwmonDrives { chips })
    }

    fn channels(chip: &Path) -> Vec<u32> {
        let mut channels = Vec::new();
        if let Ok(entries) = fs::read_dir(chip) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if let Some(index) =
                    name.strip_prefix("temp").and_then(|n| n.strip_suffix("_input"))
                {
                    if let Ok(index) = index.parse() {
                        channels.push(index);
                    }
                }
            }
        }
        channels.sort_unstable();
        channels
    }

    fn channel_label(chip: &Path, channel: u32) -> String {
        if let Ok(label) = fs::read_to_string(chip.join(format!("temp{channel}_label"))) {
            return label.trim().to_string();
        }
        // Single-channel drivetemp chips carry no label files.
        if channel == 1 {
            "Composite".to_string()
        } else {
            format!("Sensor {}", channel - 1)
        }
    }
}

impl DriveSource for HwmonDrives {
    fn drives(&self) -> Result<Vec<DriveInfo>> {
        let mut drives = Vec::with_capacity(self.chips.len());
        for chip in &self.chips {
            let device = fs::canonicalize(chip.join("device"))?;
            let name = device
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::probe("hwmon chip without a device link"))?;
            let model = fs::read_to_string(device.join("model"))
                .map(|m| m.trim().to_string())
                .unwrap_or_default();
            let sensors =
                Self::channels(chip).into_iter().map(|c| Self::channel_label(chip, c)).collect();
            drives.push(DriveInfo { name, model, sensors });
        }
        Ok(drives)
    }

    fn temperatures(&mut self, index: usize) -> Result<Vec<(String, f64)>> {
        let chip = self
            .chips
            .get(index)
            .ok_or_else(|| Error::invalid_data(format!("no drive chip at index {index}")))?;
        let mut temps = Vec::new();
        for channel in Self::channels(chip) {
            let input = chip.join(format!("temp{channel}_input"));
            let Ok(raw) = fs::read_to_string(&input) else { continue };
            let milli: f64 = raw
                .trim()
                .parse()
                .map_err(|_| Error::invalid_data(format!("bad reading in {}", input.display())))?;
            temps.push((Self::channel_label(chip, channel), milli / 1000.0));
        }
        Ok(temps)
    }
}

/// Per-drive temperature sensor, one row per channel grouped by drive.
pub struct DriveTemp {
    source: Box<dyn DriveSource>,
    /// Drive name to model string, path order.
    models: Vec<(String, String)>,
    table: StatsTable,
}

impl DriveTemp {
    const HEADINGS: [&'static str; 5] = ["Data", "Current(C)", "Min(C)", "Max(C)", "Mean(C)"];

    /// Probes `/sys/class/hwmon` for drive temperature chips.
    pub fn new() -> Self {
        match HwmonDrives::new() {
            Ok(source) => Self::with_source(Box::new(source)),
            Err(e) => {
                warn!(error = %e, "drive temperature probe failed, sensor disabled");
                DriveTemp {
                    source: Box::new(NoDrives),
                    models: Vec::new(),
                    table: StatsTable::empty(),
                }
            },
        }
    }

    /// Builds the topology from one drive probe of the given source.
    pub fn with_source(source: Box<dyn DriveSource>) -> Self {
        let drives = match source.drives() {
            Ok(drives) => drives,
            Err(e) => {
                warn!(error = %e, "drive probe read failed, sensor disabled");
                Vec::new()
            },
        };

        let mut models = Vec::with_capacity(drives.len());
        let mut paths = Vec::new();
        for drive in drives {
            paths.extend(drive.sensors.iter().map(|s| MetricPath::pair(drive.name.clone(), s)));
            models.push((drive.name, drive.model));
        }

        DriveTemp { source, models, table: StatsTable::new(paths) }
    }

    /// Model string for a detected drive.
    pub fn model(&self, drive: &str) -> Option<&str> {
        self.models.iter().find(|(name, _)| name == drive).map(|(_, model)| model.as_str())
    }
}

impl Default for DriveTemp {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for DriveTemp {
    fn name(&self) -> &str {
        "drive_temp"
    }

    fn headings(&self) -> &[&'static str] {
        &Self::HEADINGS
    }

    fn path_arity(&self) -> usize {
        2
    }

    fn stats_table(&self) -> &StatsTable {
        &self.table
    }

    fn update(&mut self) {
        for index in 0..self.models.len() {
            let drive = self.models[index].0.clone();
            let temps = match self.source.temperatures(index) {
                Ok(temps) => temps,
                Err(e) => {
                    warn!(%drive, error = %e, "drive temperature read failed");
                    continue;
                },
            };
            for (label, celsius) in temps {
                self.table.observe(&MetricPath::pair(drive.clone(), label), celsius);
            }
        }
    }

    fn section(&self, path: &MetricPath) -> Option<String> {
        let path = crate::sensor::check_arity(path, 2)?;
        let drive = path.segment(0)?;
        let model = self.model(drive)?;
        Some(format!("{drive} - {model}"))
    }
}

/// Placeholder source for a disabled sensor.
struct NoDrives;

impl DriveSource for NoDrives {
    fn drives(&self) -> Result<Vec<DriveInfo>> {
        Ok(Vec::new())
    }

    fn temperatures(&mut self, _index: usize) -> Result<Vec<(String, f64)>> {
        Ok(Vec::new())
    }
}
