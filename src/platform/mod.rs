//! OS-facing layer: raw counter types, capability descriptors, and the probe
//! traits that `domain` models are refreshed from.
//!
//! Every probe is capability-gated: a probe that cannot read a given value on
//! the running kernel/OS reports that in its [`ProcessCapabilities`] /
//! [`SystemCapabilities`] / [`GpuCapabilities`] rather than inventing a zero
//! that looks like real data. Ported from `Platform::IProcessProbe` /
//! `Platform::ISystemProbe` / the `*Types.h` headers in the original
//! implementation.

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "windows")]
pub mod windows;

use thiserror::Error;

/// Errors that can occur constructing a probe (never returned from
/// `enumerate`/`read` — those skip bad per-record data internally and log it).
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Raw per-process counters as read from the OS this instant. Fields the
/// platform can't supply are left at their default and the corresponding
/// `ProcessCapabilities` flag is `false`.
#[derive(Debug, Clone, Default)]
pub struct ProcessCounters {
    pub pid: u32,
    pub parent_pid: u32,
    pub name: String,
    pub command: String,
    pub user: String,
    pub state: char,
    pub status: String,
    pub nice: i32,
    pub start_time_ticks: u64,
    pub user_time_ticks: u64,
    pub system_time_ticks: u64,
    pub rss_bytes: u64,
    pub peak_rss_bytes: u64,
    pub virtual_bytes: u64,
    pub shared_bytes: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub thread_count: u32,
    pub page_fault_count: u64,
    pub cpu_affinity_mask: u64,
    pub net_sent_bytes: u64,
    pub net_received_bytes: u64,
    pub energy_microjoules: u64,
}

/// What a [`ProcessProbe`] can actually supply on this OS/kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessCapabilities {
    pub has_io_counters: bool,
    pub has_thread_count: bool,
    pub has_user_system_time: bool,
    pub has_start_time: bool,
    pub has_user: bool,
    pub has_command: bool,
    pub has_nice: bool,
    pub has_page_faults: bool,
    pub has_peak_rss: bool,
    pub has_cpu_affinity: bool,
    pub has_network_counters: bool,
    pub has_power_usage: bool,
    pub has_status: bool,
}

/// One CPU's (or the system-wide aggregate's) jiffies/ticks, split by bucket.
/// `total()`/`active()` mirror the original's `CpuCounters` helpers.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuCounters {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub io_wait: u64,
    pub irq: u64,
    pub soft_irq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuCounters {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.io_wait
            + self.irq
            + self.soft_irq
            + self.steal
    }

    pub fn active(&self) -> u64 {
        self.total().saturating_sub(self.idle + self.io_wait)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryCounters {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub free_bytes: u64,
    pub cached_bytes: u64,
    pub buffers_bytes: u64,
    pub swap_total_bytes: u64,
    pub swap_free_bytes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkInterfaceCounters {
    pub name: String,
    pub received_bytes: u64,
    pub sent_bytes: u64,
    pub is_up: bool,
    pub speed_mbps: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SystemCounters {
    pub hostname: String,
    pub cpu_model: String,
    pub total_cpu: CpuCounters,
    pub per_core_cpu: Vec<CpuCounters>,
    pub memory: MemoryCounters,
    pub uptime_seconds: u64,
    pub load_average_1: f64,
    pub load_average_5: f64,
    pub load_average_15: f64,
    pub cpu_frequency_mhz: Vec<u64>,
    pub network_interfaces: Vec<NetworkInterfaceCounters>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCapabilities {
    pub has_load_average: bool,
    pub has_cpu_frequency: bool,
    pub has_per_core_cpu: bool,
    pub has_network_interfaces: bool,
    pub has_swap: bool,
}

/// Raw per-GPU counters, capability-gated the same way as process/system.
#[derive(Debug, Clone, Default)]
pub struct GpuCounters {
    pub index: u32,
    pub name: String,
    pub utilization_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub temperature_celsius: f64,
    pub power_watts: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessGpuCounters {
    pub pid: u32,
    pub gpu_index: u32,
    pub memory_used_bytes: u64,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GpuCapabilities {
    pub has_gpu: bool,
    pub has_per_process_usage: bool,
    pub has_temperature: bool,
    pub has_power_usage: bool,
}

/// Enumerates all processes currently visible to this OS. The loop in
/// `domain::sampler::BackgroundSampler` calls this once per tick.
pub trait ProcessProbe: Send {
    fn enumerate(&mut self) -> Vec<ProcessCounters>;
    fn capabilities(&self) -> ProcessCapabilities;
    /// System-wide CPU-time total at this instant, in the same tick unit as
    /// `ProcessCounters::{user,system}_time_ticks`. Used by `ProcessModel` as
    /// the denominator of the per-process CPU-percent formula.
    fn total_cpu_time(&self) -> u64;
    fn ticks_per_second(&self) -> u64;
}

pub trait SystemProbe: Send {
    fn read(&mut self) -> SystemCounters;
    fn capabilities(&self) -> SystemCapabilities;
}

pub trait GpuProbe: Send {
    fn read(&mut self) -> (Vec<GpuCounters>, Vec<ProcessGpuCounters>);
    fn capabilities(&self) -> GpuCapabilities;
}

/// Per-device cumulative disk counters.
#[derive(Debug, Clone, Default)]
pub struct StorageCounters {
    pub device_name: String,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
    pub time_in_io_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiskCapabilities {
    pub has_time_in_io: bool,
    pub has_op_counts: bool,
}

pub trait DiskProbe: Send {
    fn read(&mut self) -> Vec<StorageCounters>;
    fn capabilities(&self) -> DiskCapabilities;
}

/// Process-control actions (§4.6 external interfaces): signal-equivalent
/// verbs the UI can invoke on a selected pid.
pub trait ProcessActions: Send {
    fn terminate(&self, pid: u32) -> Result<(), ProbeError>;
    fn kill(&self, pid: u32) -> Result<(), ProbeError>;
    fn suspend(&self, pid: u32) -> Result<(), ProbeError>;
    fn resume(&self, pid: u32) -> Result<(), ProbeError>;
}

/// Builds the probe set appropriate to the running OS, matching the
/// original's `Platform::Factory`.
pub fn build_process_probe() -> Box<dyn ProcessProbe> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::process_probe::LinuxProcessProbe::new())
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::process_probe::WindowsProcessProbe::new())
    }
}

pub fn build_system_probe() -> Box<dyn SystemProbe> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::system_probe::LinuxSystemProbe::new())
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::system_probe::WindowsSystemProbe::new())
    }
}

pub fn build_gpu_probe() -> Box<dyn GpuProbe> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::gpu_probe::LinuxGpuProbe::new())
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::gpu_probe::WindowsGpuProbe::new())
    }
}

pub fn build_disk_probe() -> Box<dyn DiskProbe> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::disk_probe::LinuxDiskProbe::new())
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::disk_probe::WindowsDiskProbe::new())
    }
}

pub fn build_process_actions() -> Box<dyn ProcessActions> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::process_actions::LinuxProcessActions)
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::process_actions::WindowsProcessActions)
    }
}
