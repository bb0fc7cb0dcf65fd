use std::fmt;
use std::str::FromStr;

/// Summary of the adapter wgpu picked, kept for logging and software checks.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension: u32,
}

impl AdapterProfile {
    pub(crate) fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            max_texture_dimension: limits.max_texture_dimension_2d,
        }
    }

    /// True for CPU rasterizers such as llvmpipe or WARP.
    pub fn is_software(&self) -> bool {
        if self.device_type == wgpu::DeviceType::Cpu {
            return true;
        }
        let name = self.name.to_ascii_lowercase();
        ["llvmpipe", "softpipe", "swiftshader", "lavapipe", "warp"]
            .iter()
            .any(|needle| name.contains(needle))
    }
}

/// Which adapter class to ask wgpu for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

impl GpuPowerPreference {
    pub(crate) fn to_wgpu(self) -> wgpu::PowerPreference {
        match self {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        }
    }
}

impl FromStr for GpuPowerPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "low-power" | "integrated" => Ok(GpuPowerPreference::Low),
            "high" | "high-performance" | "discrete" => Ok(GpuPowerPreference::High),
            other => Err(format!("unknown GPU power preference '{other}'; expected low or high")),
        }
    }
}

impl fmt::Display for GpuPowerPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuPowerPreference::Low => f.write_str("low"),
            GpuPowerPreference::High => f.write_str("high"),
        }
    }
}

/// Placement of the analysed frame inside the window.
///
/// `offset` and `scale` are in normalized window units: an offset of `[0, 0]`
/// with a scale of `[1, 1]` fills the window exactly. Analysed textures are
/// stored top row first, so the default draws them upright.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
    pub offset: [f32; 2],
    pub scale: [f32; 2],
    pub flip_vertical: bool,
}

impl Default for DisplayTransform {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            scale: [1.0, 1.0],
            flip_vertical: false,
        }
    }
}

/// Window created by the windowed context before the stream geometry is known.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    pub initial_size: (u32, u32),
    pub visible: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "hci".to_string(),
            initial_size: (640, 480),
            visible: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_adapters_are_detected_by_name() {
        let profile = AdapterProfile {
            name: "llvmpipe (LLVM 17.0.6, 256 bits)".to_string(),
            backend: wgpu::Backend::Vulkan,
            device_type: wgpu::DeviceType::Other,
            max_texture_dimension: 8192,
        };
        assert!(profile.is_software());
    }

    #[test]
    fn parses_power_preference() {
        assert_eq!("LOW".parse::<GpuPowerPreference>(), Ok(GpuPowerPreference::Low));
        assert!("medium".parse::<GpuPowerPreference>().is_err());
    }
}
