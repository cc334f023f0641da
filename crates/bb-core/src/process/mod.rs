//! Tunnel process supervisor
//!
//! Launches the external tunnel executable, verifies it came up, and kills
//! it again. Combined stdout/stderr of every tunnel goes to a per-tunnel log
//! file in the supervisor's log directory rather than a pipe, so the tunnel
//! keeps running after the launching CLI exits. Diagnostics read back the
//! newest `output_limit` bytes of that file.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as platform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as platform;

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

use crate::config::AppConfig;
use crate::error::BastionError;
use crate::traits::{PidKill, TunnelProcess, TunnelSupervisor};
use crate::types::{TunnelId, TunnelSpec};

pub use platform::is_process_alive;

/// Name of the log directory inside the config directory
pub const LOG_DIR_NAME: &str = "logs";

/// Builds the argument vector for the tunnel executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelCommand {
    pub program: String,
    pub prefix: Vec<String>,
}

impl TunnelCommand {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            program: config.tunnel_program.clone(),
            prefix: config.tunnel_args.clone(),
        }
    }

    /// Full argument list for one tunnel
    pub fn args(&self, spec: &TunnelSpec) -> Vec<String> {
        let mut args = self.prefix.clone();
        args.extend([
            "--subscription".to_string(),
            spec.bastion.subscription_id.clone(),
            "--target-resource-id".to_string(),
            spec.target.id.clone(),
            "--resource-port".to_string(),
            spec.remote_port.to_string(),
            "--port".to_string(),
            spec.local_port.to_string(),
            "--name".to_string(),
            spec.bastion.name.clone(),
            "--resource-group".to_string(),
            spec.bastion.resource_group.clone(),
        ]);
        args
    }
}

/// Read at most the newest `limit` bytes of `path`
///
/// The cut may land inside a UTF-8 sequence; invalid bytes are replaced.
pub fn read_tail(path: &Path, limit: usize) -> io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(limit as u64);
    file.seek(SeekFrom::Start(start))?;

    let mut buf = Vec::with_capacity((len - start) as usize);
    file.take(limit as u64).read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Check that `process` is alive and `127.0.0.1:local_port` accepts a connection
///
/// Waits `settle` first so the tunnel has a chance to bind its port.
pub async fn verify_listening(
    process: &mut dyn TunnelProcess,
    local_port: u16,
    settle: Duration,
    dial_timeout: Duration,
) -> Result<(), BastionError> {
    tokio::time::sleep(settle).await;

    if process.has_exited() {
        return Err(BastionError::StartupFailure {
            port: local_port,
            reason: "tunnel process exited immediately".to_string(),
            output: process.output(),
        });
    }

    let reason = match dial_local(local_port, dial_timeout).await {
        Ok(()) => {
            tracing::debug!("Tunnel port {} accepted a connection", local_port);
            return Ok(());
        }
        Err(reason) => reason,
    };

    Err(BastionError::StartupFailure {
        port: local_port,
        reason,
        output: process.output(),
    })
}

/// One bounded TCP connect to `127.0.0.1:local_port`
async fn dial_local(local_port: u16, dial_timeout: Duration) -> Result<(), String> {
    let addr = SocketAddr::from(([127, 0, 0, 1], local_port));
    match tokio::time::timeout(dial_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(format!("port {} is not listening: {}", local_port, e)),
        Err(_) => Err(format!(
            "port {} did not accept a connection within {:?}",
            local_port, dial_timeout
        )),
    }
}

/// Supervisor backed by real OS processes
#[derive(Debug, Clone)]
pub struct Supervisor {
    command: TunnelCommand,
    log_dir: PathBuf,
    settle_delay: Duration,
    dial_timeout: Duration,
    terminate_timeout: Duration,
    output_limit: usize,
}

impl Supervisor {
    /// Create a supervisor writing tunnel output under `log_dir`
    pub fn new(config: &AppConfig, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: TunnelCommand::from_config(config),
            log_dir: log_dir.into(),
            settle_delay: config.settle_delay,
            dial_timeout: config.dial_timeout,
            terminate_timeout: config.terminate_timeout,
            output_limit: config.output_limit,
        }
    }

    /// Log file for tunnel `id`
    pub fn log_path(&self, id: &TunnelId) -> PathBuf {
        self.log_dir.join(format!("{}.log", id))
    }

    fn open_log(&self, id: &TunnelId) -> io::Result<(PathBuf, File, File)> {
        fs::create_dir_all(&self.log_dir)?;
        let path = self.log_path(id);
        let stdout = File::create(&path)?;
        let stderr = stdout.try_clone()?;
        Ok((path, stdout, stderr))
    }
}

#[async_trait]
impl TunnelSupervisor for Supervisor {
    async fn launch(
        &self,
        id: &TunnelId,
        spec: &TunnelSpec,
    ) -> Result<Box<dyn TunnelProcess>, BastionError> {
        let args = self.command.args(spec);
        tracing::debug!("Launching {} {:?}", self.command.program, args);

        let (log_path, stdout, stderr) =
            self.open_log(id)
                .map_err(|e| BastionError::Spawn {
                    program: self.command.program.clone(),
                    source: e,
                })?;

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(false);
        platform::configure(&mut cmd);

        let child = cmd.spawn().map_err(|e| {
            let _ = fs::remove_file(&log_path);
            BastionError::Spawn {
                program: self.command.program.clone(),
                source: e,
            }
        })?;

        let pid = child.id();
        tracing::info!(
            "Launched tunnel {} (pid {:?}) to {} on local port {}",
            id,
            pid,
            spec.target.name,
            spec.local_port
        );

        Ok(Box::new(ChildProcess {
            child,
            pid,
            log_path,
            output_limit: self.output_limit,
            terminate_timeout: self.terminate_timeout,
        }))
    }

    async fn verify_listening(
        &self,
        process: &mut dyn TunnelProcess,
        local_port: u16,
    ) -> Result<(), BastionError> {
        verify_listening(process, local_port, self.settle_delay, self.dial_timeout).await
    }

    fn is_alive(&self, pid: u32) -> bool {
        is_process_alive(pid)
    }

    async fn is_listening(&self, local_port: u16) -> bool {
        dial_local(local_port, self.dial_timeout).await.is_ok()
    }

    async fn kill_pid(&self, pid: u32) -> Result<PidKill, BastionError> {
        platform::kill_pid(pid, self.terminate_timeout)
            .await
            .map_err(|e| BastionError::TerminationFailure {
                id: format!("pid {}", pid),
                reason: e.to_string(),
            })
    }

    fn release(&self, id: &TunnelId) {
        let path = self.log_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove tunnel log {:?}: {}", path, e),
        }
    }
}

/// A tunnel process spawned by this program
pub struct ChildProcess {
    child: Child,
    pid: Option<u32>,
    log_path: PathBuf,
    output_limit: usize,
    terminate_timeout: Duration,
}

#[async_trait]
impl TunnelProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!("Tunnel process {:?} exited with {}", self.pid, status);
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Failed to poll tunnel process {:?}: {}", self.pid, e);
                false
            }
        }
    }

    fn output(&self) -> String {
        read_tail(&self.log_path, self.output_limit).unwrap_or_default()
    }

    async fn terminate(&mut self) -> Result<(), BastionError> {
        let pid = self.pid;
        platform::terminate(&mut self.child, pid, self.terminate_timeout)
            .await
            .map_err(|e| BastionError::TerminationFailure {
                id: pid.map_or_else(|| "tunnel".to_string(), |p| format!("pid {}", p)),
                reason: e.to_string(),
            })?;
        tracing::info!("Terminated tunnel process {:?}", pid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BastionHost, TargetResource};
    use tempfile::TempDir;

    fn spec(local_port: u16) -> TunnelSpec {
        TunnelSpec {
            target: TargetResource {
                id: "/subscriptions/sub/vms/vm-a".to_string(),
                name: "vm-a".to_string(),
                subscription_id: "sub".to_string(),
            },
            bastion: BastionHost {
                name: "hub-bastion".to_string(),
                resource_group: "rg-hub".to_string(),
                subscription_id: "hub".to_string(),
            },
            local_port,
            remote_port: 22,
        }
    }

    #[test]
    fn test_tunnel_command_args() {
        let cmd = TunnelCommand::from_config(&AppConfig::default());
        let args = cmd.args(&spec(5000));
        assert_eq!(
            args,
            vec![
                "network",
                "bastion",
                "tunnel",
                "--subscription",
                "hub",
                "--target-resource-id",
                "/subscriptions/sub/vms/vm-a",
                "--resource-port",
                "22",
                "--port",
                "5000",
                "--name",
                "hub-bastion",
                "--resource-group",
                "rg-hub",
            ]
        );
    }

    #[test]
    fn test_read_tail_is_bounded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        std::fs::write(&path, "0123456789").unwrap();

        assert_eq!(read_tail(&path, 4).unwrap(), "6789");
        assert_eq!(read_tail(&path, 100).unwrap(), "0123456789");
    }

    #[test]
    fn test_log_path_per_tunnel() {
        let supervisor = Supervisor::new(&AppConfig::default(), "/tmp/bb-logs");
        assert_eq!(
            supervisor.log_path(&TunnelId::from("abc")),
            PathBuf::from("/tmp/bb-logs/abc.log")
        );
    }

    #[cfg(unix)]
    fn sh_supervisor(dir: &Path, script: &str) -> Supervisor {
        let config = AppConfig {
            tunnel_program: "sh".to_string(),
            tunnel_args: vec!["-c".to_string(), script.to_string(), "tunnel".to_string()],
            settle_delay: Duration::from_millis(300),
            terminate_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        Supervisor::new(&config, dir)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_process_fails_verification_with_output() {
        let dir = TempDir::new().unwrap();
        let supervisor = sh_supervisor(dir.path(), "echo 'bastion refused'; exit 3");
        let id = TunnelId::generate();

        let mut process = supervisor.launch(&id, &spec(1)).await.unwrap();
        let err = supervisor
            .verify_listening(process.as_mut(), 1)
            .await
            .unwrap_err();

        match err {
            BastionError::StartupFailure { output, reason, .. } => {
                assert!(reason.contains("exited"));
                assert!(output.contains("bastion refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_live_process_with_listener_verifies() {
        let dir = TempDir::new().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let supervisor = sh_supervisor(dir.path(), "sleep 30");
        let id = TunnelId::generate();

        let mut process = supervisor.launch(&id, &spec(port)).await.unwrap();
        supervisor
            .verify_listening(process.as_mut(), port)
            .await
            .unwrap();

        let pid = process.pid().unwrap();
        assert!(supervisor.is_alive(pid));
        process.terminate().await.unwrap();
        assert!(process.has_exited());

        supervisor.release(&id);
        assert!(!supervisor.log_path(&id).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_program_is_a_spawn_error() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            tunnel_program: "/nonexistent/bastion-tunnel".to_string(),
            ..Default::default()
        };
        let supervisor = Supervisor::new(&config, dir.path());

        let result = supervisor.launch(&TunnelId::generate(), &spec(5000)).await;
        assert!(matches!(result, Err(BastionError::Spawn { .. })));
    }
}
