//! `GpuModel`: per-GPU derived snapshot plus bounded history, one [`History`]
//! ring per GPU index. Ported from `Domain::GPUModel`.
//!
//! The original tracks additional counters this port's [`GpuProbe`] doesn't
//! expose (PCIe bandwidth, clocks, fan speed, encoder/decoder, hotspot temp) —
//! trimmed here since no probe in this port (DRM sysfs or NVML) supplies them
//! honestly; see DESIGN.md.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use crate::platform::{GpuCapabilities, GpuCounters, GpuProbe, ProcessGpuCounters};

use super::history::History;

pub const GPU_HISTORY_CAPACITY: usize = 300;

#[derive(Debug, Clone, Default)]
pub struct GpuSnapshot {
    pub index: u32,
    pub name: String,
    pub utilization_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub memory_used_percent: f64,
    pub temperature_celsius: f64,
    pub power_watts: f64,
}

struct Shared {
    snapshots: HashMap<u32, GpuSnapshot>,
    process_usage: Vec<ProcessGpuCounters>,
    histories: HashMap<u32, History<GpuSnapshot, GPU_HISTORY_CAPACITY>>,
    prev_sample_time: Instant,
    max_history_len: usize,
}

pub struct GpuModel {
    probe: Box<dyn GpuProbe>,
    capabilities: GpuCapabilities,
    shared: RwLock<Shared>,
}

impl GpuModel {
    pub fn new(probe: Box<dyn GpuProbe>) -> Self {
        let capabilities = probe.capabilities();
        tracing::debug!(has_gpu = capabilities.has_gpu, "gpu model initialized");
        Self {
            probe,
            capabilities,
            shared: RwLock::new(Shared {
                snapshots: HashMap::new(),
                process_usage: Vec::new(),
                histories: HashMap::new(),
                prev_sample_time: Instant::now(),
                max_history_len: GPU_HISTORY_CAPACITY,
            }),
        }
    }

    pub fn refresh(&mut self) {
        let (counters, process_usage) = self.probe.read();
        self.update_from_counters(counters, process_usage);
    }

    pub fn update_from_counters(&mut self, counters: Vec<GpuCounters>, process_usage: Vec<ProcessGpuCounters>) {
        let mut shared = self.shared.write().unwrap();
        let now = Instant::now();

        let mut new_snapshots = HashMap::with_capacity(counters.len());
        for current in &counters {
            let snapshot = compute_snapshot(current);
            new_snapshots.insert(current.index, snapshot);
        }

        for (index, snapshot) in &new_snapshots {
            shared
                .histories
                .entry(*index)
                .or_default()
                .push(snapshot.clone());
        }

        shared.snapshots = new_snapshots;
        shared.process_usage = process_usage;
        shared.prev_sample_time = now;
    }

    pub fn snapshots(&self) -> Vec<GpuSnapshot> {
        self.shared.read().unwrap().snapshots.values().cloned().collect()
    }

    pub fn process_usage(&self) -> Vec<ProcessGpuCounters> {
        self.shared.read().unwrap().process_usage.clone()
    }

    pub fn history(&self, gpu_index: u32) -> Vec<GpuSnapshot> {
        let shared = self.shared.read().unwrap();
        shared
            .histories
            .get(&gpu_index)
            .map(|h| h.recent(shared.max_history_len))
            .unwrap_or_default()
    }

    pub fn capabilities(&self) -> GpuCapabilities {
        self.capabilities
    }

    /// See `SystemModel::set_max_history_seconds` for the seconds-to-samples
    /// approximation (spec.md §6).
    pub fn set_max_history_seconds(&self, seconds: u64) {
        let clamped = super::config::clamp_history_seconds(seconds).min(GPU_HISTORY_CAPACITY as u64);
        self.shared.write().unwrap().max_history_len = clamped.max(1) as usize;
    }

    pub fn max_history_seconds(&self) -> u64 {
        self.shared.read().unwrap().max_history_len as u64
    }
}

fn compute_snapshot(current: &GpuCounters) -> GpuSnapshot {
    let mut snapshot = GpuSnapshot {
        index: current.index,
        name: current.name.clone(),
        utilization_percent: current.utilization_percent,
        memory_used_bytes: current.memory_used_bytes,
        memory_total_bytes: current.memory_total_bytes,
        temperature_celsius: current.temperature_celsius,
        power_watts: current.power_watts,
        ..Default::default()
    };

    if current.memory_total_bytes > 0 {
        snapshot.memory_used_percent =
            100.0 * current.memory_used_bytes as f64 / current.memory_total_bytes as f64;
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe(Vec<GpuCounters>);
    impl GpuProbe for FixedProbe {
        fn read(&mut self) -> (Vec<GpuCounters>, Vec<ProcessGpuCounters>) {
            (self.0.clone(), Vec::new())
        }
        fn capabilities(&self) -> GpuCapabilities {
            GpuCapabilities {
                has_gpu: true,
                ..Default::default()
            }
        }
    }

    #[test]
    fn memory_percent_derived_from_used_over_total() {
        let mut model = GpuModel::new(Box::new(FixedProbe(vec![GpuCounters {
            index: 0,
            name: "test-gpu".into(),
            memory_used_bytes: 512,
            memory_total_bytes: 1024,
            ..Default::default()
        }])));
        model.refresh();
        let snap = &model.snapshots()[0];
        assert_eq!(snap.memory_used_percent, 50.0);
    }

    #[test]
    fn zero_total_memory_avoids_division_by_zero() {
        let mut model = GpuModel::new(Box::new(FixedProbe(vec![GpuCounters {
            index: 0,
            memory_used_bytes: 10,
            memory_total_bytes: 0,
            ..Default::default()
        }])));
        model.refresh();
        assert_eq!(model.snapshots()[0].memory_used_percent, 0.0);
    }

    #[test]
    fn history_accumulates_per_gpu_index() {
        let mut model = GpuModel::new(Box::new(FixedProbe(vec![GpuCounters {
            index: 3,
            ..Default::default()
        }])));
        model.refresh();
        model.refresh();
        model.refresh();
        assert_eq!(model.history(3).len(), 3);
        assert!(model.history(9).is_empty());
    }

    #[test]
    fn set_max_history_seconds_windows_per_gpu_history() {
        let mut model = GpuModel::new(Box::new(FixedProbe(vec![GpuCounters {
            index: 0,
            ..Default::default()
        }])));
        for _ in 0..15 {
            model.refresh();
        }
        assert_eq!(model.history(0).len(), 15);

        // Below HISTORY_SECONDS_MIN clamps up to 10, not down to 0.
        model.set_max_history_seconds(2);
        assert_eq!(model.max_history_seconds(), 10);
        assert_eq!(model.history(0).len(), 10);
    }
}
