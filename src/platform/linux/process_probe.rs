//! Linux `ProcessProbe`: parses `/proc/<pid>/{stat,statm,status,cmdline,io,cgroup}`
//! plus `sched_getaffinity`, RAPL energy attribution, and (via [`super::netlink`])
//! per-process network byte attribution.
//!
//! Ported from `Platform::LinuxProcessProbe`.

use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

use crate::platform::{ProcessCapabilities, ProcessCounters, ProcessProbe};

use super::netlink::{aggregate_by_pid, build_inode_to_pid_map, NetlinkSocketStats};

fn username_cache() -> &'static Mutex<HashMap<u32, String>> {
    static CACHE: std::sync::OnceLock<Mutex<HashMap<u32, String>>> = std::sync::OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn username_for_uid(uid: u32) -> String {
    if let Some(name) = username_cache().lock().unwrap().get(&uid) {
        return name.clone();
    }
    let name = lookup_passwd_name(uid).unwrap_or_else(|| uid.to_string());
    username_cache().lock().unwrap().insert(uid, name.clone());
    name
}

fn lookup_passwd_name(uid: u32) -> Option<String> {
    let mut buf = vec![0i8; 1024];
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();
    loop {
        let rc = unsafe {
            libc::getpwuid_r(
                uid,
                &mut pwd,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        break;
    }
    if result.is_null() {
        return None;
    }
    let cstr = unsafe { std::ffi::CStr::from_ptr(pwd.pw_name) };
    Some(cstr.to_string_lossy().into_owned())
}

pub struct LinuxProcessProbe {
    ticks_per_second: u64,
    page_size: u64,
    has_power_cap: bool,
    power_cap_path: Option<std::path::PathBuf>,
    has_network_counters: bool,
    socket_stats: NetlinkSocketStats,
    io_counters_available: bool,
}

impl LinuxProcessProbe {
    pub fn new() -> Self {
        let ticks_per_second = {
            let t = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
            if t > 0 {
                t as u64
            } else {
                tracing::warn!("failed to read CLK_TCK, defaulting to 100");
                100
            }
        };
        let page_size = {
            let p = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if p > 0 {
                p as u64
            } else {
                4096
            }
        };

        let power_cap_path = detect_power_cap();
        let has_power_cap = power_cap_path.is_some();
        if let Some(path) = &power_cap_path {
            tracing::info!("power monitoring available via RAPL at {}", path.display());
        } else {
            tracing::debug!("power monitoring not available (RAPL not found)");
        }

        let socket_stats = NetlinkSocketStats::new();
        let has_network_counters = socket_stats.is_available();
        if has_network_counters {
            tracing::info!("per-process network monitoring available via netlink inet_diag");
        } else {
            tracing::debug!("per-process network monitoring not available");
        }

        let io_counters_available = check_io_counters_availability();

        Self {
            ticks_per_second,
            page_size,
            has_power_cap,
            power_cap_path,
            has_network_counters,
            socket_stats,
            io_counters_available,
        }
    }
}

impl Default for LinuxProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for LinuxProcessProbe {
    fn enumerate(&mut self) -> Vec<ProcessCounters> {
        let mut processes = Vec::with_capacity(512);

        let Ok(proc_dir) = fs::read_dir("/proc") else {
            tracing::warn!("failed to open /proc");
            return processes;
        };

        for entry in proc_dir.flatten() {
            let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
                continue;
            };

            let Some(mut counters) = parse_process_stat(pid, self.page_size) else {
                tracing::trace!("failed to parse /proc/{pid}/stat");
                continue;
            };

            parse_process_statm(pid, self.page_size, &mut counters);
            parse_process_status(pid, &mut counters);
            parse_process_cmdline(pid, &mut counters);
            parse_process_affinity(pid, &mut counters);

            if self.io_counters_available {
                parse_process_io(pid, &mut counters);
            }
            counters.status = process_freezer_status(pid);

            processes.push(counters);
        }

        if self.has_power_cap {
            attribute_energy_to_processes(self.power_cap_path.as_deref(), &mut processes);
        }

        if self.has_network_counters {
            attribute_network_to_processes(&self.socket_stats, &mut processes);
        }

        processes
    }

    fn capabilities(&self) -> ProcessCapabilities {
        ProcessCapabilities {
            has_io_counters: self.io_counters_available,
            has_thread_count: true,
            has_user_system_time: true,
            has_start_time: true,
            has_user: true,
            has_command: true,
            has_nice: true,
            has_page_faults: true,
            has_peak_rss: false,
            has_cpu_affinity: true,
            has_network_counters: self.has_network_counters,
            has_power_usage: self.has_power_cap,
            has_status: true,
        }
    }

    fn total_cpu_time(&self) -> u64 {
        read_total_cpu_time()
    }

    fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }
}

/// Parses `/proc/<pid>/stat`. The process name sits between the first `(`
/// and the *last* `)` so that names containing parentheses (or spaces)
/// don't desync the field count that follows.
fn parse_process_stat(pid: u32, page_size: u64) -> Option<ProcessCounters> {
    let content = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let name_start = content.find('(')?;
    let name_end = content.rfind(')')?;
    if name_end <= name_start {
        return None;
    }
    let name = content[name_start + 1..name_end].to_string();

    let fields: Vec<&str> = content[name_end + 2..].split_whitespace().collect();
    if fields.len() < 20 {
        return None;
    }

    let state = fields[0].chars().next().unwrap_or('?');
    let parent_pid: i64 = fields[1].parse().ok()?;
    let minflt: u64 = fields[7].parse().unwrap_or(0);
    let majflt: u64 = fields[9].parse().unwrap_or(0);
    let utime: u64 = fields[11].parse().unwrap_or(0);
    let stime: u64 = fields[12].parse().unwrap_or(0);
    let nice: i64 = fields[16].parse().unwrap_or(0);
    let num_threads: i64 = fields[17].parse().unwrap_or(1);
    let starttime: u64 = fields[19].parse().unwrap_or(0);
    let vsize: u64 = fields.get(20).and_then(|s| s.parse().ok()).unwrap_or(0);
    let rss: i64 = fields.get(21).and_then(|s| s.parse().ok()).unwrap_or(0);

    Some(ProcessCounters {
        pid,
        parent_pid: parent_pid.max(0) as u32,
        name,
        state,
        user_time_ticks: utime,
        system_time_ticks: stime,
        thread_count: if num_threads > 0 { num_threads as u32 } else { 1 },
        start_time_ticks: starttime,
        virtual_bytes: vsize,
        rss_bytes: (rss.max(0) as u64) * page_size,
        nice: nice as i32,
        page_fault_count: minflt + majflt,
        ..Default::default()
    })
}

fn parse_process_statm(pid: u32, page_size: u64, counters: &mut ProcessCounters) {
    let Ok(content) = fs::read_to_string(format!("/proc/{pid}/statm")) else {
        return;
    };
    let mut fields = content.split_whitespace();
    let Some(Ok(_size)) = fields.next().map(str::parse::<u64>) else {
        return;
    };
    let Some(Ok(resident)) = fields.next().map(str::parse::<u64>) else {
        return;
    };
    let Some(Ok(shared)) = fields.next().map(str::parse::<u64>) else {
        return;
    };
    counters.rss_bytes = resident * page_size;
    counters.shared_bytes = shared * page_size;
}

fn parse_process_status(pid: u32, counters: &mut ProcessCounters) {
    let Ok(content) = fs::read_to_string(format!("/proc/{pid}/status")) else {
        return;
    };
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("Uid:") {
            if let Some(uid_str) = rest.split_whitespace().next() {
                if let Ok(uid) = uid_str.parse::<u32>() {
                    counters.user = username_for_uid(uid);
                }
            }
            break;
        }
    }
}

fn parse_process_cmdline(pid: u32, counters: &mut ProcessCounters) {
    let raw = fs::read(format!("/proc/{pid}/cmdline")).unwrap_or_default();
    let cmdline = raw
        .split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    counters.command = if cmdline.is_empty() {
        format!("[{}]", counters.name)
    } else {
        cmdline
    };
}

fn parse_process_affinity(pid: u32, counters: &mut ProcessCounters) {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        let rc = libc::sched_getaffinity(pid as i32, std::mem::size_of::<libc::cpu_set_t>(), &mut set);
        if rc != 0 {
            counters.cpu_affinity_mask = 0;
            return;
        }
        let mut mask = 0u64;
        for cpu in 0..64 {
            if libc::CPU_ISSET(cpu, &set) {
                mask |= 1u64 << cpu;
            }
        }
        counters.cpu_affinity_mask = mask;
    }
}

fn parse_process_io(pid: u32, counters: &mut ProcessCounters) {
    let Ok(content) = fs::read_to_string(format!("/proc/{pid}/io")) else {
        return;
    };
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("read_bytes:") {
            if let Ok(v) = rest.trim().parse() {
                counters.read_bytes = v;
            }
        } else if let Some(rest) = line.strip_prefix("write_bytes:") {
            if let Ok(v) = rest.trim().parse() {
                counters.write_bytes = v;
            }
        }
    }
}

fn check_io_counters_availability() -> bool {
    fs::File::open("/proc/self/io").is_ok()
}

/// cgroup v2 `freezer.state` first, then the v1 freezer-controller hierarchy.
fn process_freezer_status(pid: u32) -> String {
    if let Ok(state) = fs::read_to_string(format!("/sys/fs/cgroup/{pid}/freezer.state")) {
        let state = state.trim();
        if state == "FROZEN" || state == "FREEZING" {
            return "Suspended".to_string();
        }
    }

    if let Ok(content) = fs::read_to_string(format!("/proc/{pid}/cgroup")) {
        for line in content.lines() {
            let mut parts = line.splitn(3, ':');
            let (_hier, controllers, sub_path) = match (parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(c), Some(p)) => (h, c, p),
                _ => continue,
            };
            if controllers.contains("freezer") && sub_path.starts_with('/') {
                let path = format!("/sys/fs/cgroup/freezer{sub_path}/freezer.state");
                if let Ok(state) = fs::read_to_string(&path) {
                    let state = state.trim();
                    if state == "FROZEN" || state == "FREEZING" {
                        return "Suspended".to_string();
                    }
                }
            }
        }
    }

    String::new()
}

fn read_total_cpu_time() -> u64 {
    let Ok(content) = fs::read_to_string("/proc/stat") else {
        tracing::warn!("failed to open /proc/stat");
        return 0;
    };
    let Some(first_line) = content.lines().next() else {
        return 0;
    };
    let fields: Vec<&str> = first_line.split_whitespace().collect();
    if fields.first() != Some(&"cpu") || fields.len() < 9 {
        tracing::warn!("failed to parse /proc/stat");
        return 0;
    }
    fields[1..9]
        .iter()
        .filter_map(|s| s.parse::<u64>().ok())
        .sum()
}

fn detect_power_cap() -> Option<std::path::PathBuf> {
    for candidate in [
        "/sys/class/powercap/intel-rapl/intel-rapl:0/energy_uj",
        "/sys/class/powercap/intel-rapl:0/energy_uj",
    ] {
        if std::path::Path::new(candidate).exists() {
            return Some(candidate.into());
        }
    }

    let entries = fs::read_dir("/sys/class/powercap").ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with("intel-rapl") {
            continue;
        }
        let direct = entry.path().join("energy_uj");
        if direct.exists() {
            return Some(direct);
        }
        let packaged = entry.path().join("intel-rapl:0").join("energy_uj");
        if packaged.exists() {
            return Some(packaged);
        }
    }
    None
}

fn read_system_energy(power_cap_path: Option<&std::path::Path>) -> u64 {
    let Some(path) = power_cap_path else {
        return 0;
    };
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Attributes system-wide RAPL energy to processes proportionally by each
/// process's share of total CPU time this tick. An approximation, not a
/// measurement — accepted as such.
fn attribute_energy_to_processes(power_cap_path: Option<&std::path::Path>, processes: &mut [ProcessCounters]) {
    let system_energy = read_system_energy(power_cap_path);
    if system_energy == 0 {
        return;
    }

    let total_cpu_time: u64 = processes
        .iter()
        .map(|p| p.user_time_ticks + p.system_time_ticks)
        .sum();
    if total_cpu_time == 0 {
        return;
    }

    for proc in processes.iter_mut() {
        let proc_cpu_time = proc.user_time_ticks + proc.system_time_ticks;
        let proportion = proc_cpu_time as f64 / total_cpu_time as f64;
        proc.energy_microjoules = (system_energy as f64 * proportion) as u64;
    }
}

fn attribute_network_to_processes(socket_stats: &NetlinkSocketStats, processes: &mut [ProcessCounters]) {
    let sockets = socket_stats.query_all_sockets();
    if sockets.is_empty() {
        return;
    }
    let inode_to_pid = build_inode_to_pid_map();
    if inode_to_pid.is_empty() {
        return;
    }
    let pid_stats = aggregate_by_pid(&sockets, &inode_to_pid);

    for proc in processes.iter_mut() {
        if let Some(&(received, sent)) = pid_stats.get(&proc.pid) {
            proc.net_received_bytes = received;
            proc.net_sent_bytes = sent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_cpu_time_reads_real_proc_stat() {
        // /proc/stat always exists on a running Linux kernel.
        assert!(read_total_cpu_time() > 0);
    }

    #[test]
    fn io_counters_availability_matches_proc_self_io() {
        assert_eq!(check_io_counters_availability(), std::path::Path::new("/proc/self/io").exists());
    }

    #[test]
    fn parse_own_process_stat_succeeds() {
        let pid = std::process::id();
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 };
        let counters = parse_process_stat(pid, page_size).expect("own /proc/<pid>/stat must parse");
        assert_eq!(counters.pid, pid);
        assert!(counters.thread_count >= 1);
    }

    #[test]
    fn empty_cmdline_falls_back_to_bracketed_name() {
        let mut counters = ProcessCounters {
            name: "kworker/0:1".to_string(),
            ..Default::default()
        };
        // Simulate what parse_process_cmdline does for a kernel thread, whose
        // /proc/<pid>/cmdline reads back empty.
        let cmdline = String::new();
        counters.command = if cmdline.is_empty() {
            format!("[{}]", counters.name)
        } else {
            cmdline
        };
        assert_eq!(counters.command, "[kworker/0:1]");
    }

    #[test]
    fn energy_attribution_is_proportional_to_cpu_share() {
        let mut processes = vec![
            ProcessCounters {
                pid: 1,
                user_time_ticks: 10,
                system_time_ticks: 0,
                ..Default::default()
            },
            ProcessCounters {
                pid: 2,
                user_time_ticks: 30,
                system_time_ticks: 0,
                ..Default::default()
            },
        ];
        let path = std::env::temp_dir().join("procwatch_test_energy_uj");
        std::fs::write(&path, "4000").unwrap();
        attribute_energy_to_processes(Some(&path), &mut processes);
        std::fs::remove_file(&path).ok();
        assert_eq!(processes[0].energy_microjoules, 1000);
        assert_eq!(processes[1].energy_microjoules, 3000);
    }
}
