//! Windows `SystemProbe`: `GetSystemTimes`, `GlobalMemoryStatusEx`,
//! `GetTickCount64`. Ported from `Platform::WindowsSystemProbe`.
//!
//! Per-core CPU counters and live link speed aren't exposed through the
//! Win32 APIs used here without PDH counter sets (the teacher's
//! `system/gpu.rs` shows that idiom for GPU counters); this probe reports
//! only the aggregate CPU line and leaves `per_core_cpu` empty, which
//! `capabilities().has_per_core_cpu == false` reflects honestly.

use windows::Win32::System::SystemInformation::{
    GetSystemTimes, GetTickCount64, GlobalMemoryStatusEx, MEMORYSTATUSEX,
};

use crate::platform::{CpuCounters, MemoryCounters, SystemCapabilities, SystemCounters, SystemProbe};

pub struct WindowsSystemProbe {
    num_cores: u32,
}

impl WindowsSystemProbe {
    pub fn new() -> Self {
        let num_cores = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        tracing::debug!(num_cores, "windows system probe initialized");
        Self { num_cores }
    }
}

impl Default for WindowsSystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for WindowsSystemProbe {
    fn read(&mut self) -> SystemCounters {
        let mut counters = SystemCounters::default();
        read_cpu_counters(&mut counters);
        read_memory_counters(&mut counters);
        counters.uptime_seconds = unsafe { GetTickCount64() } / 1000;
        counters
    }

    fn capabilities(&self) -> SystemCapabilities {
        SystemCapabilities {
            has_load_average: false,
            has_cpu_frequency: false,
            has_per_core_cpu: false,
            has_network_interfaces: false,
            has_swap: true,
        }
    }
}

fn read_cpu_counters(counters: &mut SystemCounters) {
    unsafe {
        let mut idle = std::mem::zeroed();
        let mut kernel = std::mem::zeroed();
        let mut user = std::mem::zeroed();
        if GetSystemTimes(Some(&mut idle), Some(&mut kernel), Some(&mut user)).is_err() {
            tracing::error!("GetSystemTimes failed");
            return;
        }
        let idle_ticks = filetime_to_ticks(idle);
        let kernel_ticks = filetime_to_ticks(kernel);
        let user_ticks = filetime_to_ticks(user);
        // kernel time includes idle time on Windows.
        counters.total_cpu = CpuCounters {
            user: user_ticks,
            idle: idle_ticks,
            system: kernel_ticks.saturating_sub(idle_ticks),
            ..Default::default()
        };
    }
}

fn read_memory_counters(counters: &mut SystemCounters) {
    unsafe {
        let mut status = MEMORYSTATUSEX {
            dwLength: std::mem::size_of::<MEMORYSTATUSEX>() as u32,
            ..std::mem::zeroed()
        };
        if GlobalMemoryStatusEx(&mut status).is_ok() {
            counters.memory = MemoryCounters {
                total_bytes: status.ullTotalPhys,
                available_bytes: status.ullAvailPhys,
                free_bytes: status.ullAvailPhys,
                cached_bytes: 0,
                buffers_bytes: 0,
                swap_total_bytes: status.ullTotalPageFile.saturating_sub(status.ullTotalPhys),
                swap_free_bytes: status.ullAvailPageFile.saturating_sub(status.ullAvailPhys),
            };
        } else {
            tracing::warn!("GlobalMemoryStatusEx failed");
        }
    }
}

fn filetime_to_ticks(ft: windows::Win32::Foundation::FILETIME) -> u64 {
    ((ft.dwHighDateTime as u64) << 32) | ft.dwLowDateTime as u64
}
