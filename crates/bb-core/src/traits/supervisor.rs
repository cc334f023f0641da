//! Tunnel process supervision traits

use async_trait::async_trait;

use crate::error::BastionError;
use crate::types::{TunnelId, TunnelSpec};

/// Handle to one launched tunnel process
#[async_trait]
pub trait TunnelProcess: Send + Sync {
    /// OS process identifier, if the process is still owned
    fn pid(&self) -> Option<u32>;

    /// Whether the process has already exited
    fn has_exited(&mut self) -> bool;

    /// Captured stdout/stderr so far
    fn output(&self) -> String;

    /// Kill the process and, where supported, its process group
    ///
    /// Best-effort: after a successful return the process and any children
    /// it spawned into its group are gone.
    async fn terminate(&mut self) -> Result<(), BastionError>;
}

/// Outcome of killing a process known only by its pid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidKill {
    /// A live process was signalled
    Killed,
    /// The pid no longer referred to a live process
    NotRunning,
}

/// Launches, verifies and kills tunnel processes
#[async_trait]
pub trait TunnelSupervisor: Send + Sync {
    /// Start the tunnel process for `id` without waiting for it to come up
    async fn launch(
        &self,
        id: &TunnelId,
        spec: &TunnelSpec,
    ) -> Result<Box<dyn TunnelProcess>, BastionError>;

    /// Confirm the process is alive and `local_port` accepts connections
    async fn verify_listening(
        &self,
        process: &mut dyn TunnelProcess,
        local_port: u16,
    ) -> Result<(), BastionError>;

    /// Whether `pid` refers to a live process
    fn is_alive(&self, pid: u32) -> bool;

    /// Whether `127.0.0.1:local_port` accepts a connection right now
    async fn is_listening(&self, local_port: u16) -> bool;

    /// Kill a process we no longer hold a handle for
    async fn kill_pid(&self, pid: u32) -> Result<PidKill, BastionError>;

    /// Drop any per-tunnel resources (logs) once `id` is no longer tracked
    fn release(&self, _id: &TunnelId) {}
}
