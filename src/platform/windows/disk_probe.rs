//! Windows `DiskProbe`: stub pending `IOCTL_DISK_PERFORMANCE` wiring.
//!
//! The original tree has no Windows disk-counter source at all (only
//! Linux's `/proc/diskstats` is implemented); this honestly reports the
//! absence via `DiskCapabilities` rather than inventing numbers.

use crate::platform::{DiskCapabilities, DiskProbe, StorageCounters};

pub struct WindowsDiskProbe;

impl WindowsDiskProbe {
    pub fn new() -> Self {
        tracing::debug!("windows disk probe initialized (counters unavailable)");
        Self
    }
}

impl Default for WindowsDiskProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskProbe for WindowsDiskProbe {
    fn read(&mut self) -> Vec<StorageCounters> {
        Vec::new()
    }

    fn capabilities(&self) -> DiskCapabilities {
        DiskCapabilities::default()
    }
}
