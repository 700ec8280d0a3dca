use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// One-shot CPU topology probe.
///
/// Captures the model and vendor strings plus the physical/logical core
/// counts, and from those infers whether the part splits its cores into
/// performance and efficiency classes. Probed once at startup; the topology
/// does not change at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuInfo {
    model: String,
    vendor: String,
    physical_cores: u32,
    logical_cores: u32,
}

impl CpuInfo {
    /// Reads `/proc/cpuinfo` and the logical processor count.
    pub fn probe() -> Result<Self> {
        Self::probe_at(Path::new("/proc/cpuinfo"))
    }

    pub(crate) fn probe_at(cpuinfo: &Path) -> Result<Self> {
        let text = fs::read_to_string(cpuinfo)?;

        let mut model = None;
        let mut vendor = None;
        let mut package_cores: HashSet<(String, String)> = HashSet::new();
        let mut processors = 0u32;
        let mut physical_id = String::new();

        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else { continue };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "processor" => processors += 1,
                "model name" if model.is_none() => model = Some(value.to_string()),
                "vendor_id" if vendor.is_none() => vendor = Some(value.to_string()),
                "physical id" => physical_id = value.to_string(),
                "core id" => {
                    package_cores.insert((physical_id.clone(), value.to_string()));
                },
                _ => {},
            }
        }

        if processors == 0 {
            return Err(Error::invalid_data("no processors listed in cpuinfo"));
        }

        let logical = logical_core_count().unwrap_or(processors);
        let physical = if package_cores.is_empty() { logical } else { package_cores.len() as u32 };

        Ok(CpuInfo {
            model: model.unwrap_or_else(|| "Unknown".to_string()),
            vendor: vendor.unwrap_or_else(|| "Unknown".to_string()),
            physical_cores: physical,
            logical_cores: logical,
        })
    }

    /// Builds a topology from known counts, for synthetic hosts in tests and
    /// for degraded sensors whose probe failed.
    pub fn from_parts(
        model: impl Into<String>,
        vendor: impl Into<String>,
        physical_cores: u32,
        logical_cores: u32,
    ) -> Self {
        CpuInfo { model: model.into(), vendor: vendor.into(), physical_cores, logical_cores }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn physical_cores(&self) -> u32 {
        self.physical_cores
    }

    pub fn logical_cores(&self) -> u32 {
        self.logical_cores
    }

    /// Whether the part splits its cores into performance/efficiency classes.
    ///
    /// Inferred from the counts: a split part has SMT on only some cores, so
    /// `physical != logical` while `physical > logical / 2`. There is no
    /// direct kernel interface for this, hence the arithmetic.
    pub fn has_hybrid_cores(&self) -> bool {
        self.physical_cores != self.logical_cores
            && self.physical_cores > self.logical_cores / 2
    }

    /// Number of physical performance-class cores, hybrid parts only.
    pub fn performance_cores(&self) -> Option<u32> {
        self.has_hybrid_cores().then(|| self.logical_cores - self.physical_cores)
    }

    /// Number of logical performance-class cores (two SMT threads each),
    /// hybrid parts only.
    pub fn performance_threads(&self) -> Option<u32> {
        self.performance_cores().map(|cores| cores * 2)
    }
}

/// Logical processor count from the C runtime.
fn logical_core_count() -> Option<u32> {
    let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    (count > 0).then_some(count as u32)
}
