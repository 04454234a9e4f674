//! `ProcessModel`: derives percentages/rates from successive
//! `ProcessCounters` snapshots, keyed by [`ProcessIdentity`] so a reused pid
//! never inherits another process's CPU history.
//!
//! Ported from `Domain::ProcessModel`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use crate::platform::{ProcessCapabilities, ProcessCounters, ProcessProbe};

use super::identity::ProcessIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    Running,
    Sleeping,
    DiskSleep,
    Zombie,
    Stopped,
    Tracing,
    Dead,
    Idle,
    Unknown,
}

impl DisplayState {
    pub fn from_raw(state: char) -> Self {
        match state {
            'R' => Self::Running,
            'S' => Self::Sleeping,
            'D' => Self::DiskSleep,
            'Z' => Self::Zombie,
            'T' => Self::Stopped,
            't' => Self::Tracing,
            'X' => Self::Dead,
            'I' => Self::Idle,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Sleeping => "Sleeping",
            Self::DiskSleep => "Disk Sleep",
            Self::Zombie => "Zombie",
            Self::Stopped => "Stopped",
            Self::Tracing => "Tracing",
            Self::Dead => "Dead",
            Self::Idle => "Idle",
            Self::Unknown => "Unknown",
        }
    }
}

/// Immutable, UI-ready per-process data computed from raw counter deltas.
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub parent_pid: u32,
    pub nice: i32,
    pub thread_count: u32,
    pub unique_key: u64,

    pub cpu_percent: f64,
    pub cpu_user_percent: f64,
    pub cpu_system_percent: f64,
    pub memory_percent: f64,
    pub cpu_time_seconds: f64,

    pub memory_bytes: u64,
    pub virtual_bytes: u64,
    pub shared_bytes: u64,
    pub peak_memory_bytes: u64,
    pub start_time_epoch: u64,

    pub io_read_bytes_per_sec: f64,
    pub io_write_bytes_per_sec: f64,
    pub net_sent_bytes_per_sec: f64,
    pub net_received_bytes_per_sec: f64,
    pub page_faults_per_sec: f64,
    pub page_faults: u64,
    pub power_watts: f64,
    pub cpu_affinity_mask: u64,

    pub name: String,
    pub command: String,
    pub user: String,
    pub display_state: Option<DisplayState>,
    pub status: String,
}

struct PrevEntry {
    counters: ProcessCounters,
    sampled_at: Instant,
}

struct Shared {
    prev: HashMap<ProcessIdentity, PrevEntry>,
    prev_total_cpu_time: u64,
    snapshots: Vec<ProcessSnapshot>,
}

pub struct ProcessModel {
    probe: Box<dyn ProcessProbe>,
    system_total_memory_bytes: u64,
    shared: RwLock<Shared>,
}

impl ProcessModel {
    pub fn new(probe: Box<dyn ProcessProbe>, system_total_memory_bytes: u64) -> Self {
        Self {
            probe,
            system_total_memory_bytes,
            shared: RwLock::new(Shared {
                prev: HashMap::new(),
                prev_total_cpu_time: 0,
                snapshots: Vec::new(),
            }),
        }
    }

    pub fn refresh(&mut self) {
        let counters = self.probe.enumerate();
        let total_cpu_time = self.probe.total_cpu_time();
        self.update_from_counters(counters, total_cpu_time);
    }

    /// Exposed directly so tests can feed fixture data without a real probe.
    pub fn update_from_counters(&mut self, counters: Vec<ProcessCounters>, total_cpu_time: u64) {
        let now = Instant::now();
        let ticks_per_second = self.probe.ticks_per_second().max(1);
        let mut shared = self.shared.write().unwrap();

        if counters.is_empty() {
            // Whole-batch failure: leave the previous snapshot intact.
            return;
        }

        let prev_total = shared.prev_total_cpu_time;
        let delta_total = total_cpu_time.saturating_sub(prev_total);

        let mut new_prev = HashMap::with_capacity(counters.len());
        let mut snapshots = Vec::with_capacity(counters.len());

        for c in counters {
            let identity = ProcessIdentity::new(c.pid, c.start_time_ticks);
            let prev_entry = shared.prev.get(&identity);

            let (cpu_percent, cpu_user_percent, cpu_system_percent) = match prev_entry {
                Some(prev) if delta_total > 0 => {
                    let delta_user = c.user_time_ticks.saturating_sub(prev.counters.user_time_ticks);
                    let delta_system = c.system_time_ticks.saturating_sub(prev.counters.system_time_ticks);
                    let cpu = 100.0 * (delta_user + delta_system) as f64 / delta_total as f64;
                    let user = 100.0 * delta_user as f64 / delta_total as f64;
                    let system = 100.0 * delta_system as f64 / delta_total as f64;
                    (cpu, user, system)
                }
                _ => (0.0, 0.0, 0.0),
            };

            let delta_wall = prev_entry.map(|p| (now - p.sampled_at).as_secs_f64());

            let io_read_rate = rate_or_zero(prev_entry, delta_wall, |p| p.counters.read_bytes, c.read_bytes);
            let io_write_rate = rate_or_zero(prev_entry, delta_wall, |p| p.counters.write_bytes, c.write_bytes);
            let net_sent_rate = rate_or_zero(prev_entry, delta_wall, |p| p.counters.net_sent_bytes, c.net_sent_bytes);
            let net_recv_rate = rate_or_zero(prev_entry, delta_wall, |p| p.counters.net_received_bytes, c.net_received_bytes);
            let page_fault_rate = rate_or_zero(prev_entry, delta_wall, |p| p.counters.page_fault_count, c.page_fault_count);

            let power_watts = match (prev_entry, delta_wall) {
                (Some(prev), Some(dt)) if dt > 0.0 => {
                    let delta_energy = c.energy_microjoules.saturating_sub(prev.counters.energy_microjoules);
                    (delta_energy as f64 / 1_000_000.0) / dt
                }
                _ => 0.0,
            };

            let memory_percent = if self.system_total_memory_bytes > 0 {
                100.0 * c.rss_bytes as f64 / self.system_total_memory_bytes as f64
            } else {
                0.0
            };

            snapshots.push(ProcessSnapshot {
                pid: c.pid,
                parent_pid: c.parent_pid,
                nice: c.nice,
                thread_count: c.thread_count,
                unique_key: identity.unique_key(),
                cpu_percent,
                cpu_user_percent,
                cpu_system_percent,
                memory_percent,
                cpu_time_seconds: (c.user_time_ticks + c.system_time_ticks) as f64 / ticks_per_second as f64,
                memory_bytes: c.rss_bytes,
                virtual_bytes: c.virtual_bytes,
                shared_bytes: c.shared_bytes,
                peak_memory_bytes: c.peak_rss_bytes,
                start_time_epoch: c.start_time_ticks,
                io_read_bytes_per_sec: io_read_rate,
                io_write_bytes_per_sec: io_write_rate,
                net_sent_bytes_per_sec: net_sent_rate,
                net_received_bytes_per_sec: net_recv_rate,
                page_faults_per_sec: page_fault_rate,
                page_faults: c.page_fault_count,
                power_watts,
                cpu_affinity_mask: c.cpu_affinity_mask,
                name: c.name.clone(),
                command: c.command.clone(),
                user: c.user.clone(),
                display_state: Some(DisplayState::from_raw(c.state)),
                status: c.status.clone(),
            });

            new_prev.insert(
                identity,
                PrevEntry {
                    counters: c,
                    sampled_at: now,
                },
            );
        }

        shared.prev = new_prev;
        shared.prev_total_cpu_time = total_cpu_time;
        shared.snapshots = snapshots;
    }

    pub fn snapshots(&self) -> Vec<ProcessSnapshot> {
        self.shared.read().unwrap().snapshots.clone()
    }

    pub fn process_count(&self) -> usize {
        self.shared.read().unwrap().snapshots.len()
    }

    pub fn capabilities(&self) -> ProcessCapabilities {
        self.probe.capabilities()
    }
}

/// Computes `(current - previous) / Δt`, treating a negative delta (identity
/// changed mid-measurement, or a counter wrapped) as zero rather than a
/// misleading negative rate.
fn rate_or_zero(
    prev_entry: Option<&PrevEntry>,
    delta_wall: Option<f64>,
    field: impl Fn(&PrevEntry) -> u64,
    current: u64,
) -> f64 {
    match (prev_entry, delta_wall) {
        (Some(prev), Some(dt)) if dt > 0.0 => {
            let prev_value = field(prev);
            if current < prev_value {
                0.0
            } else {
                (current - prev_value) as f64 / dt
            }
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ProcessCounters;

    struct FixedProbe {
        batches: Vec<(Vec<ProcessCounters>, u64)>,
        next: usize,
    }

    impl ProcessProbe for FixedProbe {
        fn enumerate(&mut self) -> Vec<ProcessCounters> {
            let (c, _) = &self.batches[self.next];
            c.clone()
        }
        fn capabilities(&self) -> ProcessCapabilities {
            ProcessCapabilities::default()
        }
        fn total_cpu_time(&self) -> u64 {
            self.batches[self.next].1
        }
        fn ticks_per_second(&self) -> u64 {
            100
        }
    }

    fn counters(pid: u32, start: u64, user: u64, system: u64) -> ProcessCounters {
        ProcessCounters {
            pid,
            start_time_ticks: start,
            user_time_ticks: user,
            system_time_ticks: system,
            state: 'R',
            ..Default::default()
        }
    }

    #[test]
    fn first_sample_reports_zero_cpu_percent() {
        let probe = Box::new(FixedProbe {
            batches: vec![(vec![counters(1, 100, 50, 50)], 1000)],
            next: 0,
        });
        let mut model = ProcessModel::new(probe, 1_000_000);
        model.refresh();
        let snaps = model.snapshots();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].cpu_percent, 0.0);
    }

    #[test]
    fn cpu_percent_is_delta_over_total_delta() {
        let mut model = ProcessModel::new(
            Box::new(FixedProbe { batches: vec![], next: 0 }),
            1_000_000,
        );
        model.update_from_counters(vec![counters(1, 100, 50, 50)], 1000);
        model.update_from_counters(vec![counters(1, 100, 60, 60)], 1100);
        let snaps = model.snapshots();
        // Δuser+Δsystem = 20, Δtotal = 100 → 20%
        assert!((snaps[0].cpu_percent - 20.0).abs() < 1e-9);
    }

    #[test]
    fn pid_reuse_with_new_start_time_does_not_inherit_old_cpu_history() {
        let mut model = ProcessModel::new(
            Box::new(FixedProbe { batches: vec![], next: 0 }),
            1_000_000,
        );
        model.update_from_counters(vec![counters(42, 100, 9999, 9999)], 1_000_000);
        // Same pid, new start time: a different process occupying pid 42.
        model.update_from_counters(vec![counters(42, 500, 10, 10)], 1_000_100);
        let snaps = model.snapshots();
        assert_eq!(snaps[0].cpu_percent, 0.0);
    }

    #[test]
    fn whole_batch_failure_keeps_previous_snapshot() {
        let mut model = ProcessModel::new(
            Box::new(FixedProbe { batches: vec![], next: 0 }),
            1_000_000,
        );
        model.update_from_counters(vec![counters(1, 100, 50, 50)], 1000);
        model.update_from_counters(vec![], 1100);
        assert_eq!(model.process_count(), 1);
    }

    #[test]
    fn display_state_maps_raw_chars() {
        assert_eq!(DisplayState::from_raw('R'), DisplayState::Running);
        assert_eq!(DisplayState::from_raw('S'), DisplayState::Sleeping);
        assert_eq!(DisplayState::from_raw('D'), DisplayState::DiskSleep);
        assert_eq!(DisplayState::from_raw('Z'), DisplayState::Zombie);
        assert_eq!(DisplayState::from_raw('?'), DisplayState::Unknown);
    }
}
