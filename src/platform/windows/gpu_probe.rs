//! Windows `GpuProbe`: DXGI adapter enumeration for presence/name/memory
//! budget. Ported from `Platform::WindowsGPUProbe`, which in the original is
//! itself a stub pending DXGI/D3DKMT/NVML work — this port goes one step
//! further and wires up DXGI adapter enumeration (the teacher already links
//! `Win32_Graphics_Dxgi`), leaving per-process attribution (D3DKMT) and
//! vendor detail (NVML) as absent capabilities.

use windows::Win32::Graphics::Dxgi::{CreateDXGIFactory1, IDXGIFactory1};

use crate::platform::{GpuCapabilities, GpuCounters, GpuProbe, ProcessGpuCounters};

pub struct WindowsGpuProbe {
    factory: Option<IDXGIFactory1>,
}

impl WindowsGpuProbe {
    pub fn new() -> Self {
        let factory = unsafe { CreateDXGIFactory1::<IDXGIFactory1>() }.ok();
        if factory.is_none() {
            tracing::debug!("DXGI factory creation failed, GPU probe disabled");
        }
        Self { factory }
    }
}

impl Default for WindowsGpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuProbe for WindowsGpuProbe {
    fn read(&mut self) -> (Vec<GpuCounters>, Vec<ProcessGpuCounters>) {
        let Some(factory) = &self.factory else {
            return (Vec::new(), Vec::new());
        };

        let mut gpus = Vec::new();
        let mut index = 0u32;
        unsafe {
            while let Ok(adapter) = factory.EnumAdapters1(index) {
                if let Ok(desc) = adapter.GetDesc1() {
                    let name = wide_to_string(&desc.Description);
                    gpus.push(GpuCounters {
                        index,
                        name,
                        utilization_percent: 0.0,
                        memory_used_bytes: 0,
                        memory_total_bytes: desc.DedicatedVideoMemory as u64,
                        temperature_celsius: 0.0,
                        power_watts: 0.0,
                    });
                }
                index += 1;
            }
        }

        (gpus, Vec::new())
    }

    fn capabilities(&self) -> GpuCapabilities {
        GpuCapabilities {
            has_gpu: self.factory.is_some(),
            has_per_process_usage: false,
            has_temperature: false,
            has_power_usage: false,
        }
    }
}

fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}
