//! Windows `ProcessActions`: `TerminateProcess` via the `windows` crate for
//! terminate/kill, `ntdll!NtSuspendProcess`/`NtResumeProcess` via `ntapi` for
//! suspend/resume — `windows` has no safe wrapper for either, so this is the
//! one place in the port that reaches into `ntapi` directly. Ported for
//! parity with the teacher's priority-change helpers in `system/winapi.rs`,
//! replacing priority-class changes (out of scope here) with the
//! signal-equivalent lifecycle verbs spec.md §4.6 calls for.

use windows::Win32::Foundation::CloseHandle;
use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_SUSPEND_RESUME, PROCESS_TERMINATE};

use crate::platform::{ProbeError, ProcessActions};

pub struct WindowsProcessActions;

impl ProcessActions for WindowsProcessActions {
    fn terminate(&self, pid: u32) -> Result<(), ProbeError> {
        terminate(pid)
    }

    fn kill(&self, pid: u32) -> Result<(), ProbeError> {
        terminate(pid)
    }

    fn suspend(&self, pid: u32) -> Result<(), ProbeError> {
        nt_suspend_resume(pid, ntapi::ntpsapi::NtSuspendProcess)
    }

    fn resume(&self, pid: u32) -> Result<(), ProbeError> {
        nt_suspend_resume(pid, ntapi::ntpsapi::NtResumeProcess)
    }
}

fn terminate(pid: u32) -> Result<(), ProbeError> {
    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, false, pid)
            .map_err(|e| ProbeError::Unavailable(e.to_string()))?;
        let result = TerminateProcess(handle, 1);
        let _ = CloseHandle(handle);
        result.map_err(|e| ProbeError::Io(std::io::Error::from_raw_os_error(e.code().0)))
    }
}

/// Opens `pid` with `PROCESS_SUSPEND_RESUME` and hands the raw handle to an
/// `ntdll` entry point (`NtSuspendProcess`/`NtResumeProcess`), both of which
/// take a bare `HANDLE` and return an `NTSTATUS`. `windows::Win32::Foundation::HANDLE`
/// and `ntapi`'s `HANDLE` are both `*mut c_void` under the hood, so the raw
/// pointer crosses the two crates without conversion.
fn nt_suspend_resume(pid: u32, nt_fn: unsafe extern "system" fn(ntapi::winapi::shared::ntdef::HANDLE) -> ntapi::winapi::shared::ntdef::NTSTATUS) -> Result<(), ProbeError> {
    unsafe {
        let handle = OpenProcess(PROCESS_SUSPEND_RESUME, false, pid)
            .map_err(|e| ProbeError::Unavailable(e.to_string()))?;
        let status = nt_fn(handle.0);
        let _ = CloseHandle(handle);
        if status < 0 {
            return Err(ProbeError::Unavailable(format!("NTSTATUS 0x{status:08X}")));
        }
        Ok(())
    }
}
