//! `SystemModel`: CPU/memory/swap/network percentages and bounded histories
//! derived from successive `SystemCounters` snapshots.
//!
//! Ported from `Domain::SystemModel`. History capacity is `HISTORY_SIZE =
//! 120` samples (2 minutes at the default 1Hz cadence), matching the
//! original's constant.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::platform::{CpuCounters, SystemCapabilities, SystemCounters, SystemProbe};

use super::history::History;

pub const HISTORY_SIZE: usize = 120;

#[derive(Debug, Clone, Copy, Default)]
pub struct CpuUsage {
    pub user_percent: f64,
    pub system_percent: f64,
    pub idle_percent: f64,
    pub iowait_percent: f64,
    pub steal_percent: f64,
    pub total_percent: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    pub core_count: usize,
    pub memory_total_bytes: u64,
    pub memory_available_bytes: u64,
    pub memory_cached_bytes: u64,
    pub memory_buffers_bytes: u64,
    pub memory_used_bytes: u64,
    pub memory_used_percent: f64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
    pub swap_used_percent: f64,
    pub uptime_seconds: u64,
    pub hostname: String,
    pub cpu_model: String,
    pub load_avg_1: f64,
    pub load_avg_5: f64,
    pub load_avg_15: f64,
    pub cpu_freq_mhz: Vec<u64>,
    pub cpu_total: CpuUsage,
    pub cpu_per_core: Vec<CpuUsage>,
    pub net_rx_bytes_per_sec: f64,
    pub net_tx_bytes_per_sec: f64,
}

struct Shared {
    prev: SystemCounters,
    has_previous: bool,
    snapshot: SystemSnapshot,
    max_history_len: usize,
    cpu_total_history: History<f32, HISTORY_SIZE>,
    cpu_user_history: History<f32, HISTORY_SIZE>,
    cpu_system_history: History<f32, HISTORY_SIZE>,
    cpu_iowait_history: History<f32, HISTORY_SIZE>,
    cpu_idle_history: History<f32, HISTORY_SIZE>,
    memory_history: History<f32, HISTORY_SIZE>,
    swap_history: History<f32, HISTORY_SIZE>,
    per_core_history: Vec<History<f32, HISTORY_SIZE>>,
    net_rx_history: HashMap<String, History<f32, HISTORY_SIZE>>,
    net_tx_history: HashMap<String, History<f32, HISTORY_SIZE>>,
    last_rx_by_iface: HashMap<String, u64>,
    last_tx_by_iface: HashMap<String, u64>,
}

pub struct SystemModel {
    probe: Box<dyn SystemProbe>,
    capabilities: SystemCapabilities,
    shared: RwLock<Shared>,
}

impl SystemModel {
    pub fn new(probe: Box<dyn SystemProbe>) -> Self {
        let capabilities = probe.capabilities();
        tracing::debug!(
            per_core = capabilities.has_per_core_cpu,
            swap = capabilities.has_swap,
            "system model initialized"
        );
        Self {
            probe,
            capabilities,
            shared: RwLock::new(Shared {
                prev: SystemCounters::default(),
                has_previous: false,
                snapshot: SystemSnapshot::default(),
                max_history_len: HISTORY_SIZE,
                cpu_total_history: History::new(),
                cpu_user_history: History::new(),
                cpu_system_history: History::new(),
                cpu_iowait_history: History::new(),
                cpu_idle_history: History::new(),
                memory_history: History::new(),
                swap_history: History::new(),
                per_core_history: Vec::new(),
                net_rx_history: HashMap::new(),
                net_tx_history: HashMap::new(),
                last_rx_by_iface: HashMap::new(),
                last_tx_by_iface: HashMap::new(),
            }),
        }
    }

    pub fn refresh(&mut self) {
        let counters = self.probe.read();
        self.update_from_counters(counters);
    }

    pub fn update_from_counters(&mut self, counters: SystemCounters) {
        let mut shared = self.shared.write().unwrap();
        compute_snapshot(&mut shared, &counters);
        shared.prev = counters;
        shared.has_previous = true;
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        self.shared.read().unwrap().snapshot.clone()
    }

    pub fn capabilities(&self) -> SystemCapabilities {
        self.capabilities
    }

    /// Clamps to `[HISTORY_SECONDS_MIN, HISTORY_SECONDS_MAX]` then to the
    /// ring's own physical capacity (`HISTORY_SIZE` samples), per spec.md
    /// §6's "the core exposes ... `setMaxHistorySeconds()` on models". One
    /// sample corresponds to one refresh, approximated here as one second
    /// per spec.md §4.3's "HISTORY_SIZE ≈ 120 samples = 2 minutes at 1 Hz".
    pub fn set_max_history_seconds(&self, seconds: u64) {
        let clamped = super::config::clamp_history_seconds(seconds).min(HISTORY_SIZE as u64);
        self.shared.write().unwrap().max_history_len = clamped.max(1) as usize;
    }

    pub fn max_history_seconds(&self) -> u64 {
        self.shared.read().unwrap().max_history_len as u64
    }

    pub fn cpu_total_history(&self) -> Vec<f32> {
        let shared = self.shared.read().unwrap();
        shared.cpu_total_history.recent(shared.max_history_len)
    }

    pub fn memory_history(&self) -> Vec<f32> {
        let shared = self.shared.read().unwrap();
        shared.memory_history.recent(shared.max_history_len)
    }

    pub fn swap_history(&self) -> Vec<f32> {
        let shared = self.shared.read().unwrap();
        shared.swap_history.recent(shared.max_history_len)
    }

    pub fn per_core_history(&self) -> Vec<Vec<f32>> {
        let shared = self.shared.read().unwrap();
        shared
            .per_core_history
            .iter()
            .map(|h| h.recent(shared.max_history_len))
            .collect()
    }
}

fn compute_snapshot(shared: &mut Shared, counters: &SystemCounters) {
    let mut snap = SystemSnapshot {
        core_count: counters.per_core_cpu.len(),
        memory_total_bytes: counters.memory.total_bytes,
        memory_available_bytes: counters.memory.available_bytes,
        memory_cached_bytes: counters.memory.cached_bytes,
        memory_buffers_bytes: counters.memory.buffers_bytes,
        uptime_seconds: counters.uptime_seconds,
        hostname: counters.hostname.clone(),
        cpu_model: counters.cpu_model.clone(),
        load_avg_1: counters.load_average_1,
        load_avg_5: counters.load_average_5,
        load_avg_15: counters.load_average_15,
        cpu_freq_mhz: counters.cpu_frequency_mhz.clone(),
        ..Default::default()
    };

    snap.memory_used_bytes = if counters.memory.available_bytes > 0 {
        counters
            .memory
            .total_bytes
            .saturating_sub(counters.memory.available_bytes)
    } else {
        counters
            .memory
            .total_bytes
            .saturating_sub(counters.memory.free_bytes)
            .saturating_sub(counters.memory.cached_bytes)
            .saturating_sub(counters.memory.buffers_bytes)
    };
    if counters.memory.total_bytes > 0 {
        snap.memory_used_percent = 100.0 * snap.memory_used_bytes as f64 / counters.memory.total_bytes as f64;
    }

    snap.swap_total_bytes = counters.memory.swap_total_bytes;
    snap.swap_used_bytes = counters
        .memory
        .swap_total_bytes
        .saturating_sub(counters.memory.swap_free_bytes);
    if counters.memory.swap_total_bytes > 0 {
        snap.swap_used_percent = 100.0 * snap.swap_used_bytes as f64 / counters.memory.swap_total_bytes as f64;
    }

    if shared.has_previous {
        snap.cpu_total = compute_cpu_usage(&counters.total_cpu, &shared.prev.total_cpu);

        let num_cores = counters.per_core_cpu.len().min(shared.prev.per_core_cpu.len());
        if shared.per_core_history.len() < num_cores {
            shared.per_core_history.resize_with(num_cores, History::new);
        }
        snap.cpu_per_core = (0..num_cores)
            .map(|i| compute_cpu_usage(&counters.per_core_cpu[i], &shared.prev.per_core_cpu[i]))
            .collect();

        let mut total_rx = 0u64;
        let mut total_tx = 0u64;
        for iface in &counters.network_interfaces {
            total_rx += iface.received_bytes;
            total_tx += iface.sent_bytes;

            if let Some(&prev_rx) = shared.last_rx_by_iface.get(&iface.name) {
                if iface.received_bytes >= prev_rx {
                    let rate = (iface.received_bytes - prev_rx) as f32;
                    shared
                        .net_rx_history
                        .entry(iface.name.clone())
                        .or_default()
                        .push(rate);
                }
            }
            if let Some(&prev_tx) = shared.last_tx_by_iface.get(&iface.name) {
                if iface.sent_bytes >= prev_tx {
                    let rate = (iface.sent_bytes - prev_tx) as f32;
                    shared
                        .net_tx_history
                        .entry(iface.name.clone())
                        .or_default()
                        .push(rate);
                }
            }
            shared.last_rx_by_iface.insert(iface.name.clone(), iface.received_bytes);
            shared.last_tx_by_iface.insert(iface.name.clone(), iface.sent_bytes);
        }
        let prev_total_rx: u64 = shared.prev.network_interfaces.iter().map(|i| i.received_bytes).sum();
        let prev_total_tx: u64 = shared.prev.network_interfaces.iter().map(|i| i.sent_bytes).sum();
        snap.net_rx_bytes_per_sec = total_rx.saturating_sub(prev_total_rx) as f64;
        snap.net_tx_bytes_per_sec = total_tx.saturating_sub(prev_total_tx) as f64;
    }

    shared.snapshot = snap.clone();

    if shared.has_previous {
        shared.cpu_total_history.push(snap.cpu_total.total_percent as f32);
        shared.cpu_user_history.push(snap.cpu_total.user_percent as f32);
        shared.cpu_system_history.push(snap.cpu_total.system_percent as f32);
        shared.cpu_iowait_history.push(snap.cpu_total.iowait_percent as f32);
        shared.cpu_idle_history.push(snap.cpu_total.idle_percent as f32);
        shared.memory_history.push(snap.memory_used_percent as f32);
        shared.swap_history.push(snap.swap_used_percent as f32);

        for (i, core) in snap.cpu_per_core.iter().enumerate() {
            if let Some(hist) = shared.per_core_history.get_mut(i) {
                hist.push(core.total_percent as f32);
            }
        }
    }
}

/// `user` is reported as `user + nice` per convention; `total = 100 - idle`.
fn compute_cpu_usage(current: &CpuCounters, previous: &CpuCounters) -> CpuUsage {
    let total_delta = current.total().saturating_sub(previous.total());
    if total_delta == 0 {
        return CpuUsage::default();
    }

    let percent = |curr: u64, prev: u64| -> f64 {
        let delta = curr.saturating_sub(prev);
        100.0 * delta as f64 / total_delta as f64
    };

    let mut usage = CpuUsage {
        user_percent: percent(current.user + current.nice, previous.user + previous.nice),
        system_percent: percent(current.system, previous.system),
        idle_percent: percent(current.idle, previous.idle),
        iowait_percent: percent(current.io_wait, previous.io_wait),
        steal_percent: percent(current.steal, previous.steal),
        total_percent: 0.0,
    };
    usage.total_percent = (100.0 - usage.idle_percent).clamp(0.0, 100.0);
    usage.user_percent = usage.user_percent.clamp(0.0, 100.0);
    usage.system_percent = usage.system_percent.clamp(0.0, 100.0);
    usage.idle_percent = usage.idle_percent.clamp(0.0, 100.0);
    usage.iowait_percent = usage.iowait_percent.clamp(0.0, 100.0);
    usage.steal_percent = usage.steal_percent.clamp(0.0, 100.0);
    usage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MemoryCounters, SystemCapabilities};

    struct FixedProbe;
    impl SystemProbe for FixedProbe {
        fn read(&mut self) -> SystemCounters {
            SystemCounters::default()
        }
        fn capabilities(&self) -> SystemCapabilities {
            SystemCapabilities::default()
        }
    }

    fn cpu(user: u64, nice: u64, system: u64, idle: u64) -> CpuCounters {
        CpuCounters {
            user,
            nice,
            system,
            idle,
            ..Default::default()
        }
    }

    #[test]
    fn first_sample_has_no_cpu_percentages() {
        let mut model = SystemModel::new(Box::new(FixedProbe));
        let counters = SystemCounters {
            total_cpu: cpu(10, 0, 10, 80),
            ..Default::default()
        };
        model.update_from_counters(counters);
        let snap = model.snapshot();
        assert_eq!(snap.cpu_total.total_percent, 0.0);
    }

    #[test]
    fn cpu_percentages_match_spec_s1_scenario() {
        // S1 from spec.md: prev {user:100,idle:900}, curr {user:150,idle:950}
        // Δtotal = 100, Δuser = 50 → user% = 50, idle% = 50, total% = 50.
        let mut model = SystemModel::new(Box::new(FixedProbe));
        let prev = SystemCounters {
            total_cpu: cpu(100, 0, 0, 900),
            ..Default::default()
        };
        model.update_from_counters(prev);

        let curr = SystemCounters {
            total_cpu: cpu(150, 0, 0, 950),
            ..Default::default()
        };
        model.update_from_counters(curr);

        let snap = model.snapshot();
        assert!((snap.cpu_total.user_percent - 50.0).abs() < 1e-9);
        assert!((snap.cpu_total.idle_percent - 50.0).abs() < 1e-9);
        assert!((snap.cpu_total.total_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn memory_used_prefers_available_over_fallback() {
        let mut model = SystemModel::new(Box::new(FixedProbe));
        let counters = SystemCounters {
            memory: MemoryCounters {
                total_bytes: 1000,
                available_bytes: 400,
                free_bytes: 100,
                cached_bytes: 50,
                buffers_bytes: 50,
                ..Default::default()
            },
            ..Default::default()
        };
        model.update_from_counters(counters);
        let snap = model.snapshot();
        assert_eq!(snap.memory_used_bytes, 600);
        assert_eq!(snap.memory_used_percent, 60.0);
    }

    #[test]
    fn memory_falls_back_without_mem_available() {
        let mut model = SystemModel::new(Box::new(FixedProbe));
        let counters = SystemCounters {
            memory: MemoryCounters {
                total_bytes: 1000,
                available_bytes: 0,
                free_bytes: 100,
                cached_bytes: 200,
                buffers_bytes: 50,
                ..Default::default()
            },
            ..Default::default()
        };
        model.update_from_counters(counters);
        let snap = model.snapshot();
        assert_eq!(snap.memory_used_bytes, 650);
    }

    #[test]
    fn per_core_history_tracks_two_cores_across_refreshes() {
        let mut model = SystemModel::new(Box::new(FixedProbe));
        let c1 = SystemCounters {
            per_core_cpu: vec![cpu(10, 0, 0, 90), cpu(10, 0, 0, 90)],
            ..Default::default()
        };
        model.update_from_counters(c1);

        let c2 = SystemCounters {
            per_core_cpu: vec![cpu(20, 0, 0, 180), cpu(20, 0, 0, 180)],
            ..Default::default()
        };
        model.update_from_counters(c2);

        assert_eq!(model.per_core_history().len(), 2);
        assert_eq!(model.per_core_history()[0].len(), 1);
    }

    #[test]
    fn per_core_history_does_not_shrink_when_core_count_drops() {
        // `compute_snapshot` only ever grows `per_core_history` (`resize_with`
        // is called only when the new core count is larger) — a later sample
        // reporting fewer cores (e.g. hot-unplug) keeps the existing rings
        // rather than discarding them, matching the original's stable-array
        // behavior for per-core history.
        let mut model = SystemModel::new(Box::new(FixedProbe));
        let three_cores = SystemCounters {
            per_core_cpu: vec![cpu(10, 0, 0, 90), cpu(10, 0, 0, 90), cpu(10, 0, 0, 90)],
            ..Default::default()
        };
        model.update_from_counters(three_cores.clone());
        model.update_from_counters(three_cores);
        assert_eq!(model.per_core_history().len(), 3);

        let one_core = SystemCounters {
            per_core_cpu: vec![cpu(20, 0, 0, 180)],
            ..Default::default()
        };
        model.update_from_counters(one_core);

        assert_eq!(model.per_core_history().len(), 3);
    }

    #[test]
    fn set_max_history_seconds_clamps_and_windows_history() {
        let mut model = SystemModel::new(Box::new(FixedProbe));
        // The first update only seeds `prev` (no history push yet — see
        // `has_previous` above), so 11 calls yield 10 pushed samples.
        for i in 0..11 {
            let counters = SystemCounters {
                total_cpu: cpu(i, 0, 0, 100 - i.min(100)),
                ..Default::default()
            };
            model.update_from_counters(counters);
        }
        assert_eq!(model.max_history_seconds(), HISTORY_SIZE as u64);

        // Below HISTORY_SECONDS_MIN clamps up to 10, not down to 3.
        model.set_max_history_seconds(3);
        assert_eq!(model.max_history_seconds(), crate::domain::config::HISTORY_SECONDS_MIN);
        assert_eq!(model.cpu_total_history().len(), 10);

        model.set_max_history_seconds(0);
        assert_eq!(model.max_history_seconds(), crate::domain::config::HISTORY_SECONDS_MIN);

        model.set_max_history_seconds(1_000_000);
        assert_eq!(model.max_history_seconds(), HISTORY_SIZE as u64);
    }
}
