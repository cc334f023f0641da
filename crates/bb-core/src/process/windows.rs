//! Single-process termination for Windows
//!
//! Windows has no process groups in the Unix sense; killing the tunnel
//! process itself is the best-effort fallback.

use std::io;
use std::time::Duration;

use tokio::process::{Child, Command};
use windows_sys::Win32::Foundation::CloseHandle;
use windows_sys::Win32::System::Threading::{
    OpenProcess, TerminateProcess, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE,
};

use crate::traits::PidKill;

const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Keep the tunnel from opening a console window
pub(super) fn configure(cmd: &mut Command) {
    cmd.creation_flags(CREATE_NO_WINDOW);
}

/// Check if a process with the given PID is still alive
pub fn is_process_alive(pid: u32) -> bool {
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle == 0 {
            return false;
        }
        CloseHandle(handle);
        true
    }
}

pub(super) async fn terminate(
    child: &mut Child,
    _pid: Option<u32>,
    timeout: Duration,
) -> io::Result<()> {
    child.start_kill()?;
    tokio::time::timeout(timeout, child.wait())
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "process still running after kill"))??;
    Ok(())
}

pub(super) async fn kill_pid(pid: u32, _timeout: Duration) -> io::Result<PidKill> {
    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if handle == 0 {
            return Ok(PidKill::NotRunning);
        }
        let ok = TerminateProcess(handle, 1);
        let err = io::Error::last_os_error();
        CloseHandle(handle);
        if ok == 0 {
            return Err(err);
        }
    }
    Ok(PidKill::Killed)
}
