//! Linux `DiskProbe`: parses `/proc/diskstats`.
//!
//! Field layout grounded in the kernel's `Documentation/admin-guide/iostats.rst`
//! (the same layout used by `rpglot-core`'s `procfs::parser::parse_diskstats`):
//! `major minor name reads r_merged r_sectors r_time writes w_merged w_sectors
//! w_time io_in_progress io_time weighted_io_time [...]`. Sector counts are
//! converted to bytes assuming the traditional 512-byte sector.

use std::fs;

use crate::platform::{DiskCapabilities, DiskProbe, StorageCounters};

const SECTOR_BYTES: u64 = 512;

pub struct LinuxDiskProbe;

impl LinuxDiskProbe {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinuxDiskProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskProbe for LinuxDiskProbe {
    fn read(&mut self) -> Vec<StorageCounters> {
        let Ok(content) = fs::read_to_string("/proc/diskstats") else {
            tracing::warn!("failed to open /proc/diskstats");
            return Vec::new();
        };
        parse_diskstats(&content)
    }

    fn capabilities(&self) -> DiskCapabilities {
        DiskCapabilities {
            has_time_in_io: true,
            has_op_counts: true,
        }
    }
}

fn parse_diskstats(content: &str) -> Vec<StorageCounters> {
    let mut disks = Vec::new();
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 14 {
            continue;
        }
        let get = |i: usize| fields.get(i).and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
        disks.push(StorageCounters {
            device_name: fields[2].to_string(),
            read_ops: get(3),
            read_bytes: get(5) * SECTOR_BYTES,
            write_ops: get(7),
            write_bytes: get(9) * SECTOR_BYTES,
            time_in_io_ms: get(12),
        });
    }
    disks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sample_diskstats_line() {
        let sample = "   8       0 sda 1000 50 20000 300 2000 100 40000 600 0 900 900 0 0 0 0\n";
        let disks = parse_diskstats(sample);
        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].device_name, "sda");
        assert_eq!(disks[0].read_ops, 1000);
        assert_eq!(disks[0].read_bytes, 20000 * SECTOR_BYTES);
        assert_eq!(disks[0].write_ops, 2000);
        assert_eq!(disks[0].time_in_io_ms, 900);
    }

    #[test]
    fn skips_malformed_lines() {
        let sample = "not enough fields here\n";
        assert!(parse_diskstats(sample).is_empty());
    }
}
