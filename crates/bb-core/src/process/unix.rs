//! Process-group based termination for Unix
//!
//! Tunnels are spawned as leaders of a new process group so that helpers
//! they fork can be signalled together with them.

use std::io;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::traits::PidKill;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Put the tunnel in its own process group
pub(super) fn configure(cmd: &mut Command) {
    cmd.process_group(0);
}

/// Check if a process with the given PID is still alive
///
/// Uses kill(pid, 0): success or EPERM means the process exists.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    unsafe {
        if libc::kill(pid, 0) == 0 {
            return true;
        }
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Send `signal` to `target` (negative for a process group); a vanished target is not an error
fn send_signal(target: libc::pid_t, signal: libc::c_int) -> io::Result<bool> {
    let rc = unsafe { libc::kill(target, signal) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(false)
    } else {
        Err(err)
    }
}

fn group_of(pid: u32) -> io::Result<libc::pid_t> {
    libc::pid_t::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .map(|p| -p)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {}", pid)))
}

/// SIGTERM the group, wait for the leader, escalate to SIGKILL on timeout
pub(super) async fn terminate(
    child: &mut Child,
    pid: Option<u32>,
    timeout: Duration,
) -> io::Result<()> {
    let Some(pid) = pid else {
        child.kill().await?;
        return Ok(());
    };
    let group = group_of(pid)?;

    send_signal(group, libc::SIGTERM)?;
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            status?;
        }
        Err(_) => {
            tracing::warn!(
                "Tunnel process {} ignored SIGTERM for {:?}, sending SIGKILL",
                pid,
                timeout
            );
            send_signal(group, libc::SIGKILL)?;
            tokio::time::timeout(timeout, child.wait())
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("process {} still running after SIGKILL", pid),
                    )
                })??;
        }
    }

    // Helpers left behind in the group go too
    send_signal(group, libc::SIGKILL)?;
    Ok(())
}

/// Kill a process (and its group, if it leads one) known only by pid
pub(super) async fn kill_pid(pid: u32, timeout: Duration) -> io::Result<PidKill> {
    if !is_process_alive(pid) {
        return Ok(PidKill::NotRunning);
    }
    let group = group_of(pid)?;
    let single = -group;

    let signal_all = |signal| -> io::Result<bool> {
        match send_signal(group, signal) {
            Ok(true) => Ok(true),
            // Not a group leader, or the group is not ours to signal
            Ok(false) | Err(_) => send_signal(single, signal),
        }
    };

    if !signal_all(libc::SIGTERM)? {
        return Ok(PidKill::NotRunning);
    }

    if wait_for_exit(pid, timeout).await {
        return Ok(PidKill::Killed);
    }

    tracing::warn!("Process {} ignored SIGTERM, sending SIGKILL", pid);
    signal_all(libc::SIGKILL)?;
    if wait_for_exit(pid, timeout).await {
        Ok(PidKill::Killed)
    } else {
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("process {} still running after SIGKILL", pid),
        ))
    }
}

async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while is_process_alive(pid) {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    true
}
