//! GPU telemetry sensor
//!
//! Three-level topology: vendor, then device, then metric. Every device gets
//! the full fixed metric set; a capability the hardware lacks (desktop cards
//! without a fan tach, for instance) never produces a sample, so its rows stay
//! valueless and drop out of CSV export rather than reporting zeros.
//!
//! Two sources feed the sensor: NVIDIA boards through NVML, amdgpu cards
//! through `/sys/class/drm` and their hwmon files. Both can be present at
//! once; vendor groups stay contiguous in path order. Device names and
//! subsystem vendors come from a single `lspci` probe at construction;
//! per-cycle reads never shell out.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use nvml_wrapper::enum_wrappers::device::{Clock, TemperatureSensor};
use nvml_wrapper::Nvml;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::metric::{MetricPath, StatsTable};
use crate::sensor::Sensor;


#[cfg(test)]
use mockall::automock;

/// Metric names per device, in display order.
pub const METRICS: [&str; 6] = ["temp", "clock", "fan_speed", "power", "memory", "utilization"];

/// One detected GPU, as reported by the probe.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuDevice {
    pub vendor: String,
    pub name: String,
    /// Board power limit in watts, where the driver exposes one.
    pub power_limit_w: Option<f64>,
    /// Total VRAM in mebibytes.
    pub memory_limit_mb: Option<f64>,
    /// Board partner, resolved from the PCI subsystem vendor id.
    pub subsystem_vendor: Option<String>,
}

/// One cycle's readings for a device. `None` marks a capability the device
/// does not expose.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpuReading {
    pub temp_c: Option<f64>,
    pub clock_mhz: Option<f64>,
    /// RPM from hwmon tachs, duty-cycle percent from NVML.
    pub fan_speed: Option<f64>,
    pub power_w: Option<f64>,
    pub memory_used_mb: Option<f64>,
    pub utilization_pct: Option<f64>,
}

impl GpuReading {
    /// Value for a metric name from [`METRICS`].
    fn metric(&self, name: &str) -> Option<f64> {
        match name {
            "temp" => self.temp_c,
            "clock" => self.clock_mhz,
            "fan_speed" => self.fan_speed,
            "power" => self.power_w,
            "memory" => self.memory_used_mb,
            "utilization" => self.utilization_pct,
            _ => None,
        }
    }
}

/// Data source for GPU devices and their per-cycle readings.
#[cfg_attr(test, automock)]
pub trait GpuSource: Send + Sync {
    /// Detected devices, probed once at sensor construction.
    fn devices(&self) -> Result<Vec<GpuDevice>>;

    /// Fresh readings for the device at `index` (in [`devices`](Self::devices)
    /// order).
    fn read(&mut self, index: usize) -> Result<GpuReading>;
}

/// amdgpu cards under `/sys/class/drm`, read through their hwmon interface.
#[derive(Debug)]
pub struct SysfsGpu {
    cards: Vec<PathBuf>,
}

impl SysfsGpu {
    pub fn new() -> Result<Self> {
        Self::at("/sys/class/drm".into())
    }

    /// Scans an alternate drm root, for fixtures.
    pub fn at(root: PathBuf) -> Result<Self> {
        let mut cards = Vec::new();
        for index in 0.. {
            let device = root.join(format!("card{index}/device"));
            if !device.is_dir() {
                break;
            }
            let Ok(uevent) = fs::read_to_string(device.join("uevent")) else { continue };
            if uevent.lines().any(|l| l == "DRIVER=amdgpu") {
                cards.push(device);
            }
        }
        if cards.is_empty() {
            return Err(Error::not_available("no amdgpu cards under drm"));
        }
        Ok(SysfsGpu { cards })
    }

    fn hwmon(card: &Path) -> Option<PathBuf> {
        fs::read_dir(card.join("hwmon")).ok()?.flatten().map(|e| e.path()).next()
    }

    fn read_value(path: PathBuf) -> Option<f64> {
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }
}

/// `Device:` and `SVendor:` fields from `lspci -vmm` for one PCI slot.
fn lspci_names(slot: &str) -> (Option<String>, Option<String>) {
    let output = match Command::new("lspci").args(["-vmm", "-s", slot]).output() {
        Ok(output) if output.status.success() => output,
        _ => return (None, None),
    };
    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    let field = |key: &str| {
        text.lines()
            .find_map(|l| l.strip_prefix(key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    (field("Device:"), field("SVendor:"))
}

/// Narrows an NVML bus id (`"00000000:2D:00.0"`) to the domain width `lspci
/// -s` accepts.
fn pci_slot(bus_id: &str) -> String {
    match bus_id.split_once(':') {
        Some((domain, rest)) if domain.len() > 4 => {
            format!("{}:{rest}", &domain[domain.len() - 4..])
        },
        _ => bus_id.to_string(),
    }
}

/// NVIDIA boards through the NVML management library.
///
/// `Nvml::init` loads the driver library at runtime, so construction fails
/// cleanly on machines without the NVIDIA stack. Device handles are re-resolved
/// by index on every read; only the library handle and the board count live
/// across cycles.
pub struct NvmlGpu {
    nvml: Nvml,
    count: u32,
}

impl NvmlGpu {
    pub fn new() -> Result<Self> {
        let nvml = Nvml::init()
            .map_err(|e| Error::not_available(format!("NVML unavailable: {e}")))?;
        let count = nvml.device_count().map_err(|e| Error::probe(e.to_string()))?;
        if count == 0 {
            return Err(Error::not_available("no NVIDIA devices"));
        }
        Ok(NvmlGpu { nvml, count })
    }
}

impl GpuSource for NvmlGpu {
    fn devices(&self) -> Result<Vec<GpuDevice>> {
        let mut devices = Vec::with_capacity(self.count as usize);
        for index in 0..self.count {
            let device =
                self.nvml.device_by_index(index).map_err(|e| Error::probe(e.to_string()))?;
            let name = device.name().unwrap_or_else(|_| format!("Device_{index}"));
            let power_limit_w =
                device.power_management_limit().ok().map(|mw| f64::from(mw) / 1000.0);
            let memory_limit_mb =
                device.memory_info().ok().map(|m| m.total as f64 / 1024.0 / 1024.0);
            let subsystem_vendor = device
                .pci_info()
                .ok()
                .and_then(|pci| lspci_names(&pci_slot(&pci.bus_id)).1);
            devices.push(GpuDevice {
                vendor: "nvidia".to_string(),
                name,
                power_limit_w,
                memory_limit_mb,
                subsystem_vendor,
            });
        }
        Ok(devices)
    }

    fn read(&mut self, index: usize) -> Result<GpuReading> {
        let device = self
            .nvml
            .device_by_index(index as u32)
            .map_err(|e| Error::probe(e.to_string()))?;
        Ok(GpuReading {
            temp_c: device.temperature(TemperatureSensor::Gpu).ok().map(f64::from),
            clock_mhz: device.clock_info(Clock::Graphics).ok().map(f64::from),
            fan_speed: device.fan_speed(0).ok().map(f64::from),
            power_w: device.power_usage().ok().map(|mw| f64::from(mw) / 1000.0),
            memory_used_mb: device.memory_info().ok().map(|m| m.used as f64 / 1024.0 / 1024.0),
            utilization_pct: device.utilization_rates().ok().map(|u| f64::from(u.gpu)),
        })
    }
}

impl GpuSource for SysfsGpu {
    fn devices(&self) -> Result<Vec<GpuDevice>> {
        let mut devices = Vec::with_capacity(self.cards.len());
        for card in &self.cards {
            let slot = fs::read_to_string(card.join("uevent"))
                .ok()
                .and_then(|u| {
                    u.lines().find_map(|l| l.strip_prefix("PCI_SLOT_NAME=").map(str::to_string))
                });
            let (name, subsystem_vendor) = match &slot {
                Some(slot) => lspci_names(slot),
                None => (None, None),
            };
            let name = name.unwrap_or_else(|| {
                let device_id = fs::read_to_string(card.join("device"))
                    .map(|d| d.trim().trim_start_matches("0x").to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                format!("Device_{device_id}")
            });

            let power_limit_w = Self::hwmon(card)
                .and_then(|h| Self::read_value(h.join("power1_cap")))
                .map(|uw| uw / 1_000_000.0);
            let memory_limit_mb = Self::read_value(card.join("mem_info_vram_total"))
                .map(|bytes| bytes / 1024.0 / 1024.0);

            devices.push(GpuDevice {
                vendor: "amdgpu".to_string(),
                name,
                power_limit_w,
                memory_limit_mb,
                subsystem_vendor,
            });
        }
        Ok(devices)
    }

    fn read(&mut self, index: usize) -> Result<GpuReading> {
        let card = self
            .cards
            .get(index)
            .ok_or_else(|| Error::invalid_data(format!("no amdgpu card at index {index}")))?;
        let hwmon = Self::hwmon(card);
        let from_hwmon =
            |file: &str| hwmon.as_ref().and_then(|h| Self::read_value(h.join(file)));

        Ok(GpuReading {
            temp_c: from_hwmon("temp1_input").map(|milli| milli / 1000.0),
            clock_mhz: from_hwmon("freq1_input").map(|hz| hz / 1_000_000.0),
            fan_speed: from_hwmon("fan1_input"),
            power_w: from_hwmon("power1_average").map(|uw| uw / 1_000_000.0),
            memory_used_mb: Self::read_value(card.join("mem_info_vram_used"))
                .map(|bytes| bytes / 1024.0 / 1024.0),
            utilization_pct: Self::read_value(card.join("gpu_busy_percent")),
        })
    }
}

/// GPU sensor: vendor, device, metric, with the fixed metric order of
/// [`METRICS`].
pub struct Gpu {
    sources: Vec<Box<dyn GpuSource>>,
    /// Vendor, display name (`"{name}-{index}"`), source index, index within
    /// that source; path order.
    devices: Vec<(String, String, usize, usize)>,
    info: Vec<GpuDevice>,
    table: StatsTable,
}

impl Gpu {
    const HEADINGS: [&'static str; 5] = ["Data", "Current", "Min", "Max", "Mean"];

    /// Probes NVML, then `/sys/class/drm`, keeping every source that finds
    /// hardware.
    pub fn new() -> Self {
        let mut sources: Vec<Box<dyn GpuSource>> = Vec::new();
        match NvmlGpu::new() {
            Ok(source) => sources.push(Box::new(source)),
            Err(e) => debug!(error = %e, "no NVIDIA GPUs"),
        }
        match SysfsGpu::new() {
            Ok(source) => sources.push(Box::new(source)),
            Err(e) => debug!(error = %e, "no amdgpu cards"),
        }
        if sources.is_empty() {
            warn!("no supported GPUs found, sensor disabled");
        }
        Self::with_sources(sources)
    }

    /// Builds the topology from one device probe of the given source.
    pub fn with_source(source: Box<dyn GpuSource>) -> Self {
        Self::with_sources(vec![source])
    }

    /// Builds the topology over several sources, one device probe each. A
    /// source whose probe fails is skipped; the others keep their devices.
    pub fn with_sources(sources: Vec<Box<dyn GpuSource>>) -> Self {
        let mut info = Vec::new();
        let mut devices = Vec::new();
        let mut per_vendor: Vec<(String, u32)> = Vec::new();
        for (source_index, source) in sources.iter().enumerate() {
            let probed = match source.devices() {
                Ok(probed) => probed,
                Err(e) => {
                    warn!(error = %e, "GPU device probe failed, source skipped");
                    continue;
                },
            };
            for (device_index, device) in probed.into_iter().enumerate() {
                let ordinal = match per_vendor.iter_mut().find(|(v, _)| *v == device.vendor) {
                    Some((_, n)) => {
                        *n += 1;
                        *n - 1
                    },
                    None => {
                        per_vendor.push((device.vendor.clone(), 1));
                        0
                    },
                };
                devices.push((
                    device.vendor.clone(),
                    format!("{}-{ordinal}", device.name),
                    source_index,
                    device_index,
                ));
                info.push(device);
            }
        }

        // Vendor groups stay contiguous in path order even if detection
        // interleaved them.
        let mut paths = Vec::with_capacity(devices.len() * METRICS.len());
        for (vendor, _) in &per_vendor {
            for (device_vendor, display, _, _) in &devices {
                if device_vendor != vendor {
                    continue;
                }
                paths.extend(
                    METRICS.iter().map(|m| MetricPath::triple(vendor.clone(), display.clone(), *m)),
                );
            }
        }

        Gpu { sources, devices, info, table: StatsTable::new(paths) }
    }

    /// Detected devices with their probe-time attributes, in source order.
    pub fn devices(&self) -> &[GpuDevice] {
        &self.info
    }
}

impl Default for Gpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for Gpu {
    fn name(&self) -> &str {
        "gpu"
    }

    fn headings(&self) -> &[&'static str] {
        &Self::HEADINGS
    }

    fn path_arity(&self) -> usize {
        3
    }

    fn stats_table(&self) -> &StatsTable {
        &self.table
    }

    fn update(&mut self) {
        for (vendor, display_name, source_index, device_index) in self.devices.clone() {
            let Some(source) = self.sources.get_mut(source_index) else { continue };
            let reading = match source.read(device_index) {
                Ok(reading) => reading,
                Err(e) => {
                    warn!(device = %display_name, error = %e, "GPU read failed");
                    continue;
                },
            };
            for metric in METRICS {
                if let Some(value) = reading.metric(metric) {
                    let path = MetricPath::triple(vendor.clone(), display_name.clone(), metric);
                    self.table.observe(&path, value);
                }
            }
        }
    }

    fn section(&self, path: &MetricPath) -> Option<String> {
        crate::sensor::check_arity(path, 3)?;
        path.segment(0).map(str::to_owned)
    }

    fn subsection(&self, path: &MetricPath) -> Option<String> {
        crate::sensor::check_arity(path, 3)?;
        path.segment(1).map(str::to_owned)
    }
}
