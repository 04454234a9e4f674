//! Linux `SystemProbe`: `/proc/stat`, `/proc/meminfo`, `/proc/uptime`,
//! `/proc/loadavg`, `/sys/devices/system/cpu/cpu0/cpufreq/*`, `/proc/net/dev`
//! plus `/sys/class/net/<iface>/{operstate,speed}`.
//!
//! Ported from `Platform::LinuxSystemProbe`.

use std::fs;

use crate::platform::{
    CpuCounters, NetworkInterfaceCounters, SystemCapabilities, SystemCounters,
    SystemProbe,
};

pub struct LinuxSystemProbe {
    hostname: String,
    cpu_model: String,
}

impl LinuxSystemProbe {
    pub fn new() -> Self {
        let hostname = read_hostname();
        let cpu_model = read_cpu_model();

        tracing::debug!(hostname, cpu_model, "linux system probe initialized");

        Self { hostname, cpu_model }
    }
}

impl Default for LinuxSystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for LinuxSystemProbe {
    fn read(&mut self) -> SystemCounters {
        let mut counters = SystemCounters {
            hostname: self.hostname.clone(),
            cpu_model: self.cpu_model.clone(),
            ..Default::default()
        };

        read_cpu_counters(&mut counters);
        read_memory_counters(&mut counters);
        read_uptime(&mut counters);
        read_load_avg(&mut counters);
        counters.cpu_frequency_mhz = read_cpu_freq().into_iter().collect();
        read_network_counters(&mut counters);

        counters
    }

    fn capabilities(&self) -> SystemCapabilities {
        SystemCapabilities {
            has_load_average: true,
            has_cpu_frequency: true,
            has_per_core_cpu: true,
            has_network_interfaces: true,
            has_swap: true,
        }
    }
}

fn read_hostname() -> String {
    let mut buf = vec![0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "unknown".to_string();
    }
    let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..nul]).into_owned()
}

fn read_cpu_model() -> String {
    let Ok(content) = fs::read_to_string("/proc/cpuinfo") else {
        return "Unknown CPU".to_string();
    };
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("model name") {
            if let Some(value) = rest.split_once(':').map(|x| x.1) {
                return value.trim().to_string();
            }
        }
    }
    "Unknown CPU".to_string()
}

fn parse_cpu_line(fields: &[&str]) -> CpuCounters {
    let get = |i: usize| fields.get(i).and_then(|s| s.parse().ok()).unwrap_or(0);
    CpuCounters {
        user: get(0),
        nice: get(1),
        system: get(2),
        idle: get(3),
        io_wait: get(4),
        irq: get(5),
        soft_irq: get(6),
        steal: get(7),
        guest: get(8),
        guest_nice: get(9),
    }
}

fn read_cpu_counters(counters: &mut SystemCounters) {
    let Ok(content) = fs::read_to_string("/proc/stat") else {
        tracing::warn!("failed to open /proc/stat");
        return;
    };

    let mut found_total = false;
    for line in content.lines() {
        if !line.starts_with("cpu") {
            break;
        }
        let mut parts = line.split_whitespace();
        let Some(label) = parts.next() else { continue };
        let fields: Vec<&str> = parts.collect();
        let cpu = parse_cpu_line(&fields);

        if label == "cpu" {
            counters.total_cpu = cpu;
            found_total = true;
        } else if label.len() > 3 {
            counters.per_core_cpu.push(cpu);
        }
    }

    if !found_total {
        tracing::warn!("failed to parse aggregate cpu line from /proc/stat");
    }
}

fn read_memory_counters(counters: &mut SystemCounters) {
    let Ok(content) = fs::read_to_string("/proc/meminfo") else {
        tracing::warn!("failed to open /proc/meminfo");
        return;
    };

    const KB: u64 = 1024;
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let Some(key) = parts.next() else { continue };
        let Some(Ok(value)) = parts.next().map(str::parse::<u64>) else {
            continue;
        };
        let key = key.trim_end_matches(':');
        match key {
            "MemTotal" => counters.memory.total_bytes = value * KB,
            "MemFree" => counters.memory.free_bytes = value * KB,
            "MemAvailable" => counters.memory.available_bytes = value * KB,
            "Buffers" => counters.memory.buffers_bytes = value * KB,
            "Cached" => counters.memory.cached_bytes = value * KB,
            "SwapTotal" => counters.memory.swap_total_bytes = value * KB,
            "SwapFree" => counters.memory.swap_free_bytes = value * KB,
            _ => {}
        }
    }
}

fn read_uptime(counters: &mut SystemCounters) {
    let Ok(content) = fs::read_to_string("/proc/uptime") else {
        return;
    };
    if let Some(seconds_str) = content.split_whitespace().next() {
        if let Ok(seconds) = seconds_str.parse::<f64>() {
            counters.uptime_seconds = seconds as u64;
        }
    }
}

fn read_load_avg(counters: &mut SystemCounters) {
    let Ok(content) = fs::read_to_string("/proc/loadavg") else {
        return;
    };
    let mut parts = content.split_whitespace();
    if let (Some(a), Some(b), Some(c)) = (parts.next(), parts.next(), parts.next()) {
        counters.load_average_1 = a.parse().unwrap_or(0.0);
        counters.load_average_5 = b.parse().unwrap_or(0.0);
        counters.load_average_15 = c.parse().unwrap_or(0.0);
    }
}

/// `scaling_cur_freq` first (reflects governor-selected frequency), falling
/// back to `cpuinfo_cur_freq` (hardware-reported) if unavailable. Returns an
/// empty vec if neither path exists (e.g. a VM with no cpufreq driver).
fn read_cpu_freq() -> Option<u64> {
    for path in [
        "/sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq",
        "/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_cur_freq",
    ] {
        if let Ok(content) = fs::read_to_string(path) {
            if let Ok(khz) = content.trim().parse::<u64>() {
                return Some(khz / 1000);
            }
        }
    }
    None
}

fn read_network_counters(counters: &mut SystemCounters) {
    let Ok(content) = fs::read_to_string("/proc/net/dev") else {
        tracing::warn!("failed to open /proc/net/dev");
        return;
    };

    for line in content.lines().skip(2) {
        let Some(colon) = line.find(':') else {
            continue;
        };
        let iface = line[..colon].trim();
        if iface.is_empty() || iface == "lo" {
            continue;
        }

        let fields: Vec<&str> = line[colon + 1..].split_whitespace().collect();
        if fields.len() < 9 {
            continue;
        }
        let rx_bytes: u64 = fields[0].parse().unwrap_or(0);
        let tx_bytes: u64 = fields[8].parse().unwrap_or(0);

        counters.network_interfaces.push(NetworkInterfaceCounters {
            name: iface.to_string(),
            received_bytes: rx_bytes,
            sent_bytes: tx_bytes,
            is_up: read_interface_operstate(iface),
            speed_mbps: read_interface_link_speed(iface),
        });
    }
}

fn read_interface_operstate(iface: &str) -> bool {
    fs::read_to_string(format!("/sys/class/net/{iface}/operstate"))
        .map(|s| s.trim() == "up")
        .unwrap_or(false)
}

fn read_interface_link_speed(iface: &str) -> u64 {
    fs::read_to_string(format!("/sys/class/net/{iface}/speed"))
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|&v| v >= 0)
        .map(|v| v as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_real_proc_stat_total_line() {
        let mut counters = SystemCounters::default();
        read_cpu_counters(&mut counters);
        assert!(counters.total_cpu.total() > 0);
    }

    #[test]
    fn parses_real_meminfo_total() {
        let mut counters = SystemCounters::default();
        read_memory_counters(&mut counters);
        assert!(counters.memory.total_bytes > 0);
    }

    #[test]
    fn cpu_line_parsing_maps_fields_in_order() {
        let fields = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"];
        let cpu = parse_cpu_line(&fields);
        assert_eq!(cpu.user, 1);
        assert_eq!(cpu.nice, 2);
        assert_eq!(cpu.system, 3);
        assert_eq!(cpu.idle, 4);
        assert_eq!(cpu.steal, 8);
    }

    #[test]
    fn missing_optional_fields_default_to_zero() {
        let cpu = parse_cpu_line(&["100", "5", "20", "500"]);
        assert_eq!(cpu.idle, 500);
        assert_eq!(cpu.io_wait, 0);
        assert_eq!(cpu.steal, 0);
    }
}
