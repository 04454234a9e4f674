//! Application state: wires the domain models to a minimal TUI. Per spec.md
//! §1 the rendering front-end is out of core scope — this is a thin consumer
//! demonstrating the pipeline end to end, not a reimplementation of the
//! teacher's full htop-style feature set.

use std::sync::{Arc, Mutex};

use procwatch::domain::process_model::ProcessSnapshot;
use procwatch::domain::sampler::BackgroundSampler;
use procwatch::domain::system_model::SystemSnapshot;
use procwatch::domain::{config::SamplingConfig, process_model::ProcessModel, system_model::SystemModel};
use procwatch::platform::{build_process_actions, build_process_probe, build_system_probe, ProcessActions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Cpu,
    Memory,
    Pid,
}

pub struct App {
    pub should_quit: bool,
    pub paused: bool,

    process_model: Arc<Mutex<ProcessModel>>,
    system_model: Arc<Mutex<SystemModel>>,
    process_sampler: BackgroundSampler<Box<dyn FnMut() + Send>>,
    system_sampler: BackgroundSampler<Box<dyn FnMut() + Send>>,
    actions: Box<dyn ProcessActions>,

    pub processes: Vec<ProcessSnapshot>,
    pub system: SystemSnapshot,

    pub selected_index: usize,
    pub scroll_offset: usize,
    pub visible_rows: usize,
    pub sort_field: SortField,

    pub status_message: Option<String>,
}

impl App {
    pub fn new(config: SamplingConfig) -> Self {
        let process_probe = build_process_probe();
        let system_probe = build_system_probe();
        let system_total_memory = {
            // First read establishes total memory for memory_percent denominator.
            let mut probe = build_system_probe();
            probe.read().memory.total_bytes
        };

        let process_model = Arc::new(Mutex::new(ProcessModel::new(process_probe, system_total_memory)));
        let system_model = Arc::new(Mutex::new(SystemModel::new(system_probe)));
        system_model.lock().unwrap().set_max_history_seconds(config.history_seconds());

        let sampler_process_model = Arc::clone(&process_model);
        let process_tick: Box<dyn FnMut() + Send> = Box::new(move || {
            sampler_process_model.lock().unwrap().refresh();
        });
        let mut process_sampler = BackgroundSampler::new(config.refresh_interval_ms(), process_tick);
        process_sampler.start();

        let sampler_system_model = Arc::clone(&system_model);
        let system_tick: Box<dyn FnMut() + Send> = Box::new(move || {
            sampler_system_model.lock().unwrap().refresh();
        });
        let mut system_sampler = BackgroundSampler::new(config.refresh_interval_ms(), system_tick);
        system_sampler.start();

        Self {
            should_quit: false,
            paused: false,
            process_model,
            system_model,
            process_sampler,
            system_sampler,
            actions: build_process_actions(),
            processes: Vec::new(),
            system: SystemSnapshot::default(),
            selected_index: 0,
            scroll_offset: 0,
            visible_rows: 20,
            sort_field: SortField::Cpu,
            status_message: None,
        }
    }

    /// Pulls the latest snapshots out of the models for rendering. Cheap: the
    /// models hold their own reader/writer lock internally, this just clones
    /// the already-computed snapshot vector.
    pub fn pull_snapshots(&mut self) {
        if self.paused {
            return;
        }
        self.processes = self.process_model.lock().unwrap().snapshots();
        self.sort_processes();
        self.system = self.system_model.lock().unwrap().snapshot();
        self.clamp_selection();
    }

    pub fn sort_processes(&mut self) {
        match self.sort_field {
            SortField::Cpu => self
                .processes
                .sort_by(|a, b| b.cpu_percent.partial_cmp(&a.cpu_percent).unwrap_or(std::cmp::Ordering::Equal)),
            SortField::Memory => self
                .processes
                .sort_by(|a, b| b.memory_percent.partial_cmp(&a.memory_percent).unwrap_or(std::cmp::Ordering::Equal)),
            SortField::Pid => self.processes.sort_by_key(|p| p.pid),
        }
    }

    pub fn request_refresh(&self) {
        self.process_sampler.request_refresh();
        self.system_sampler.request_refresh();
    }

    pub fn select_prev(&mut self) {
        self.selected_index = self.selected_index.saturating_sub(1);
        self.ensure_visible();
    }

    pub fn select_next(&mut self) {
        let max = self.processes.len().saturating_sub(1);
        if self.selected_index < max {
            self.selected_index += 1;
        }
        self.ensure_visible();
    }

    pub fn page_up(&mut self) {
        self.selected_index = self.selected_index.saturating_sub(self.visible_rows);
        self.ensure_visible();
    }

    pub fn page_down(&mut self) {
        let max = self.processes.len().saturating_sub(1);
        self.selected_index = (self.selected_index + self.visible_rows).min(max);
        self.ensure_visible();
    }

    fn ensure_visible(&mut self) {
        if self.selected_index < self.scroll_offset {
            self.scroll_offset = self.selected_index;
        } else if self.selected_index >= self.scroll_offset + self.visible_rows {
            self.scroll_offset = self.selected_index - self.visible_rows + 1;
        }
    }

    fn clamp_selection(&mut self) {
        if self.processes.is_empty() {
            self.selected_index = 0;
            self.scroll_offset = 0;
        } else if self.selected_index >= self.processes.len() {
            self.selected_index = self.processes.len() - 1;
        }
    }

    pub fn selected_process(&self) -> Option<&ProcessSnapshot> {
        self.processes.get(self.selected_index)
    }

    pub fn terminate_selected(&mut self) {
        if let Some(pid) = self.selected_process().map(|p| p.pid) {
            match self.actions.terminate(pid) {
                Ok(()) => self.status_message = Some(format!("terminated pid {pid}")),
                Err(e) => self.status_message = Some(format!("failed to terminate pid {pid}: {e}")),
            }
        }
    }

    pub fn kill_selected(&mut self) {
        if let Some(pid) = self.selected_process().map(|p| p.pid) {
            match self.actions.kill(pid) {
                Ok(()) => self.status_message = Some(format!("killed pid {pid}")),
                Err(e) => self.status_message = Some(format!("failed to kill pid {pid}: {e}")),
            }
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.process_sampler.stop();
        self.system_sampler.stop();
    }
}
