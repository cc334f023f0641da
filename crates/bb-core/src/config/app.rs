//! Application configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Runtime settings for launching and supervising tunnels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Executable that opens a bastion tunnel
    pub tunnel_program: String,

    /// Arguments placed before the bastion/target/port arguments
    pub tunnel_args: Vec<String>,

    /// How long to wait after spawning before verifying the tunnel
    #[serde(with = "duration_millis")]
    pub settle_delay: Duration,

    /// Timeout for the local TCP dial that proves the tunnel is listening
    #[serde(with = "duration_secs")]
    pub dial_timeout: Duration,

    /// How long a terminated tunnel gets to exit before it is force-killed
    #[serde(with = "duration_secs")]
    pub terminate_timeout: Duration,

    /// Maximum bytes of tunnel output kept for diagnostics
    pub output_limit: usize,

    /// Run `az login` when no credential is available
    pub interactive_login: bool,

    /// Drop restored records whose process is gone instead of listing them as stale
    pub discard_stale_on_restore: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tunnel_program: default_program().to_string(),
            tunnel_args: vec![
                "network".to_string(),
                "bastion".to_string(),
                "tunnel".to_string(),
            ],
            settle_delay: Duration::from_secs(2),
            dial_timeout: Duration::from_secs(1),
            terminate_timeout: Duration::from_secs(5),
            output_limit: 64 * 1024,
            interactive_login: true,
            discard_stale_on_restore: false,
        }
    }
}

/// Name of the Azure CLI executable on this platform
pub fn default_program() -> &'static str {
    if cfg!(windows) {
        "az.cmd"
    } else {
        "az"
    }
}
