//! Windows `ProcessProbe`: `CreateToolhelp32Snapshot` for enumeration,
//! `OpenProcess` + `GetProcessTimes`/`GetProcessMemoryInfo`/`GetProcessIoCounters`
//! for detail. Ported from `Platform::WindowsProcessProbe` and the teacher's
//! `system/winapi.rs`.

use windows::Win32::Foundation::CloseHandle;
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};
use windows::Win32::System::SystemInformation::GetSystemTimes;
use windows::Win32::System::Threading::{
    GetProcessIoCounters, GetProcessMemoryInfo, GetProcessTimes, OpenProcess,
    PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_VM_READ,
};

use crate::platform::{ProcessCapabilities, ProcessCounters, ProcessProbe};

/// Windows `FILETIME` ticks per second (100ns resolution).
const WINDOWS_TICKS_PER_SECOND: u64 = 10_000_000;

pub struct WindowsProcessProbe;

impl WindowsProcessProbe {
    pub fn new() -> Self {
        tracing::debug!("windows process probe initialized");
        Self
    }
}

impl Default for WindowsProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for WindowsProcessProbe {
    fn enumerate(&mut self) -> Vec<ProcessCounters> {
        let mut results = Vec::new();

        unsafe {
            let Ok(snapshot) = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) else {
                tracing::error!("CreateToolhelp32Snapshot failed");
                return results;
            };

            let mut entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..std::mem::zeroed()
            };

            if Process32FirstW(snapshot, &mut entry).is_err() {
                let _ = CloseHandle(snapshot);
                return results;
            }

            loop {
                let mut counters = ProcessCounters {
                    pid: entry.th32ProcessID,
                    parent_pid: entry.th32ParentProcessID,
                    name: wide_to_string(&entry.szExeFile),
                    thread_count: entry.cntThreads,
                    state: '?',
                    ..Default::default()
                };
                fill_process_details(entry.th32ProcessID, &mut counters);
                results.push(counters);

                let mut next = PROCESSENTRY32W {
                    dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                    ..std::mem::zeroed()
                };
                if Process32NextW(snapshot, &mut next).is_err() {
                    break;
                }
                entry = next;
            }

            let _ = CloseHandle(snapshot);
        }

        results
    }

    fn capabilities(&self) -> ProcessCapabilities {
        ProcessCapabilities {
            has_io_counters: true,
            has_thread_count: true,
            has_user_system_time: true,
            has_start_time: true,
            has_user: false,
            has_command: false,
            has_nice: false,
            has_page_faults: false,
            has_peak_rss: true,
            has_cpu_affinity: false,
            has_network_counters: false,
            has_power_usage: false,
            has_status: false,
        }
    }

    fn total_cpu_time(&self) -> u64 {
        unsafe {
            let mut idle = std::mem::zeroed();
            let mut kernel = std::mem::zeroed();
            let mut user = std::mem::zeroed();
            if GetSystemTimes(Some(&mut idle), Some(&mut kernel), Some(&mut user)).is_err() {
                tracing::error!("GetSystemTimes failed");
                return 0;
            }
            filetime_to_ticks(kernel) + filetime_to_ticks(user)
        }
    }

    fn ticks_per_second(&self) -> u64 {
        WINDOWS_TICKS_PER_SECOND
    }
}

fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

fn filetime_to_ticks(ft: windows::Win32::Foundation::FILETIME) -> u64 {
    ((ft.dwHighDateTime as u64) << 32) | ft.dwLowDateTime as u64
}

/// Best-effort detail fill; protected/system processes may deny access, in
/// which case the counters stay at their zero defaults (matching the
/// original, which still includes the process with default fields).
fn fill_process_details(pid: u32, counters: &mut ProcessCounters) {
    unsafe {
        let Ok(handle) = OpenProcess(
            PROCESS_QUERY_LIMITED_INFORMATION | PROCESS_VM_READ,
            false,
            pid,
        ) else {
            return;
        };

        let mut creation = std::mem::zeroed();
        let mut exit = std::mem::zeroed();
        let mut kernel = std::mem::zeroed();
        let mut user = std::mem::zeroed();
        if GetProcessTimes(handle, &mut creation, &mut exit, &mut kernel, &mut user).is_ok() {
            counters.user_time_ticks = filetime_to_ticks(user);
            counters.system_time_ticks = filetime_to_ticks(kernel);
            counters.start_time_ticks = filetime_to_ticks(creation);
        }
        counters.state = 'R';

        let mut mem_counters: windows::Win32::System::ProcessStatus::PROCESS_MEMORY_COUNTERS_EX =
            std::mem::zeroed();
        mem_counters.cb = std::mem::size_of_val(&mem_counters) as u32;
        if GetProcessMemoryInfo(
            handle,
            &mut mem_counters as *mut _ as *mut windows::Win32::System::ProcessStatus::PROCESS_MEMORY_COUNTERS,
            std::mem::size_of_val(&mem_counters) as u32,
        )
        .is_ok()
        {
            counters.rss_bytes = mem_counters.WorkingSetSize as u64;
            counters.virtual_bytes = mem_counters.PrivateUsage as u64;
        }

        let mut io = std::mem::zeroed();
        if GetProcessIoCounters(handle, &mut io).is_ok() {
            counters.read_bytes = io.ReadTransferCount;
            counters.write_bytes = io.WriteTransferCount;
        }

        let _ = CloseHandle(handle);
    }
}
