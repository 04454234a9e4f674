//! `StorageModel`: per-device disk throughput and utilization derived from
//! successive `StorageCounters` cumulative samples. Structured the same way
//! as [`super::gpu_model::GpuModel`] — §4.4 calls the two "analogous
//! derivation[s]" over a per-device previous-sample map.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use crate::platform::{DiskCapabilities, DiskProbe, StorageCounters};

use super::history::History;

pub const STORAGE_HISTORY_CAPACITY: usize = 300;

#[derive(Debug, Clone, Default)]
pub struct StorageSnapshot {
    pub device_name: String,
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
    pub read_ops_per_sec: f64,
    pub write_ops_per_sec: f64,
    pub utilization_percent: f64,
}

struct PrevEntry {
    counters: StorageCounters,
    sampled_at: Instant,
}

struct Shared {
    prev: HashMap<String, PrevEntry>,
    snapshots: HashMap<String, StorageSnapshot>,
    histories: HashMap<String, History<StorageSnapshot, STORAGE_HISTORY_CAPACITY>>,
    max_history_len: usize,
}

pub struct StorageModel {
    probe: Box<dyn DiskProbe>,
    capabilities: DiskCapabilities,
    shared: RwLock<Shared>,
}

impl StorageModel {
    pub fn new(probe: Box<dyn DiskProbe>) -> Self {
        let capabilities = probe.capabilities();
        Self {
            probe,
            capabilities,
            shared: RwLock::new(Shared {
                prev: HashMap::new(),
                snapshots: HashMap::new(),
                histories: HashMap::new(),
                max_history_len: STORAGE_HISTORY_CAPACITY,
            }),
        }
    }

    pub fn refresh(&mut self) {
        let counters = self.probe.read();
        self.update_from_counters(counters);
    }

    pub fn update_from_counters(&mut self, counters: Vec<StorageCounters>) {
        let mut shared = self.shared.write().unwrap();
        let now = Instant::now();

        let mut new_snapshots = HashMap::with_capacity(counters.len());
        let mut new_prev = HashMap::with_capacity(counters.len());

        for current in counters {
            let snapshot = if let Some(prev) = shared.prev.get(&current.device_name) {
                compute_snapshot(&current, Some(&prev.counters), now.duration_since(prev.sampled_at).as_secs_f64())
            } else {
                compute_snapshot(&current, None, 0.0)
            };
            new_snapshots.insert(current.device_name.clone(), snapshot);
            new_prev.insert(
                current.device_name.clone(),
                PrevEntry {
                    counters: current,
                    sampled_at: now,
                },
            );
        }

        for (name, snapshot) in &new_snapshots {
            shared
                .histories
                .entry(name.clone())
                .or_default()
                .push(snapshot.clone());
        }

        shared.snapshots = new_snapshots;
        shared.prev = new_prev;
    }

    pub fn snapshots(&self) -> Vec<StorageSnapshot> {
        self.shared.read().unwrap().snapshots.values().cloned().collect()
    }

    pub fn history(&self, device_name: &str) -> Vec<StorageSnapshot> {
        let shared = self.shared.read().unwrap();
        shared
            .histories
            .get(device_name)
            .map(|h| h.recent(shared.max_history_len))
            .unwrap_or_default()
    }

    pub fn capabilities(&self) -> DiskCapabilities {
        self.capabilities
    }

    /// See `SystemModel::set_max_history_seconds` for the seconds-to-samples
    /// approximation (spec.md §6).
    pub fn set_max_history_seconds(&self, seconds: u64) {
        let clamped = super::config::clamp_history_seconds(seconds).min(STORAGE_HISTORY_CAPACITY as u64);
        self.shared.write().unwrap().max_history_len = clamped.max(1) as usize;
    }

    pub fn max_history_seconds(&self) -> u64 {
        self.shared.read().unwrap().max_history_len as u64
    }
}

fn compute_snapshot(current: &StorageCounters, previous: Option<&StorageCounters>, delta_seconds: f64) -> StorageSnapshot {
    let mut snapshot = StorageSnapshot {
        device_name: current.device_name.clone(),
        ..Default::default()
    };

    let Some(previous) = previous else {
        return snapshot;
    };
    if delta_seconds <= 0.0 {
        return snapshot;
    }

    snapshot.read_bytes_per_sec = rate(current.read_bytes, previous.read_bytes, delta_seconds);
    snapshot.write_bytes_per_sec = rate(current.write_bytes, previous.write_bytes, delta_seconds);
    snapshot.read_ops_per_sec = rate(current.read_ops, previous.read_ops, delta_seconds);
    snapshot.write_ops_per_sec = rate(current.write_ops, previous.write_ops, delta_seconds);

    if current.time_in_io_ms >= previous.time_in_io_ms {
        let io_ms_delta = (current.time_in_io_ms - previous.time_in_io_ms) as f64;
        snapshot.utilization_percent = (100.0 * io_ms_delta / (delta_seconds * 1000.0)).clamp(0.0, 100.0);
    }

    snapshot
}

fn rate(current: u64, previous: u64, delta_seconds: f64) -> f64 {
    if current < previous {
        return 0.0;
    }
    (current - previous) as f64 / delta_seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe(Vec<StorageCounters>);
    impl DiskProbe for FixedProbe {
        fn read(&mut self) -> Vec<StorageCounters> {
            self.0.clone()
        }
        fn capabilities(&self) -> DiskCapabilities {
            DiskCapabilities {
                has_time_in_io: true,
                has_op_counts: true,
            }
        }
    }

    fn device(name: &str, read_bytes: u64, write_bytes: u64, time_in_io_ms: u64) -> StorageCounters {
        StorageCounters {
            device_name: name.to_string(),
            read_bytes,
            write_bytes,
            read_ops: 0,
            write_ops: 0,
            time_in_io_ms,
        }
    }

    #[test]
    fn first_sample_reports_zero_rates() {
        let mut model = StorageModel::new(Box::new(FixedProbe(vec![device("sda", 100, 100, 10)])));
        model.refresh();
        let snap = &model.snapshots()[0];
        assert_eq!(snap.read_bytes_per_sec, 0.0);
        assert_eq!(snap.utilization_percent, 0.0);
    }

    #[test]
    fn counter_reset_yields_zero_not_negative_rate() {
        let mut model = StorageModel::new(Box::new(FixedProbe(vec![device("sda", 1000, 0, 0)])));
        model.refresh();
        model.update_from_counters(vec![device("sda", 10, 0, 0)]);
        let snap = &model.snapshots()[0];
        assert_eq!(snap.read_bytes_per_sec, 0.0);
    }

    #[test]
    fn utilization_percent_is_time_in_io_over_wall_clock() {
        let snapshot = compute_snapshot(&device("sda", 0, 0, 500), Some(&device("sda", 0, 0, 0)), 1.0);
        assert_eq!(snapshot.utilization_percent, 50.0);
    }

    #[test]
    fn set_max_history_seconds_windows_per_device_history() {
        let mut model = StorageModel::new(Box::new(FixedProbe(vec![device("sda", 0, 0, 0)])));
        for i in 0..15 {
            model.update_from_counters(vec![device("sda", i, i, i)]);
        }
        assert_eq!(model.history("sda").len(), 15);

        // Below HISTORY_SECONDS_MIN clamps up to 10, not down to 0.
        model.set_max_history_seconds(2);
        assert_eq!(model.max_history_seconds(), 10);
        assert_eq!(model.history("sda").len(), 10);
    }
}
