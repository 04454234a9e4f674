//! Linux `ProcessActions`: `kill(2)` signal delivery.

use crate::platform::{ProbeError, ProcessActions};

pub struct LinuxProcessActions;

impl ProcessActions for LinuxProcessActions {
    fn terminate(&self, pid: u32) -> Result<(), ProbeError> {
        send_signal(pid, libc::SIGTERM)
    }

    fn kill(&self, pid: u32) -> Result<(), ProbeError> {
        send_signal(pid, libc::SIGKILL)
    }

    fn suspend(&self, pid: u32) -> Result<(), ProbeError> {
        send_signal(pid, libc::SIGSTOP)
    }

    fn resume(&self, pid: u32) -> Result<(), ProbeError> {
        send_signal(pid, libc::SIGCONT)
    }
}

fn send_signal(pid: u32, signal: i32) -> Result<(), ProbeError> {
    let rc = unsafe { libc::kill(pid as i32, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(ProbeError::Io(std::io::Error::last_os_error()))
    }
}
