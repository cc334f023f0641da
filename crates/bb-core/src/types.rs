//! Core domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a tunnel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TunnelId(pub String);

impl TunnelId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TunnelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TunnelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of saved connection; each kind has its own partition on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    #[default]
    Tunnel,
    Ssh,
    Rdp,
}

impl ConnectionKind {
    pub const ALL: [ConnectionKind; 3] = [Self::Tunnel, Self::Ssh, Self::Rdp];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Tunnel => "tunnel",
            ConnectionKind::Ssh => "ssh",
            ConnectionKind::Rdp => "rdp",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tunnel" => Ok(Self::Tunnel),
            "ssh" => Ok(Self::Ssh),
            "rdp" => Ok(Self::Rdp),
            other => Err(format!(
                "unknown connection kind '{}' (expected tunnel, ssh or rdp)",
                other
            )),
        }
    }
}

// Older files carry an empty or free-form kind; anything unrecognised is a tunnel.
impl<'de> Deserialize<'de> for ConnectionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .and_then(|s| s.parse().ok())
            .unwrap_or(ConnectionKind::Tunnel))
    }
}

/// Bastion host brokering the connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BastionHost {
    pub name: String,
    pub resource_group: String,
    /// Owning scope (subscription) of the bastion
    pub subscription_id: String,
}

/// Private resource reachable through a bastion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResource {
    /// Full resource identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Owning scope (subscription) of the resource
    pub subscription_id: String,
}

/// Named, reusable description of a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedConnectionProfile {
    pub name: String,
    #[serde(default)]
    pub subscription_id: String,
    pub resource_id: String,
    #[serde(default)]
    pub resource_name: String,
    #[serde(default)]
    pub local_port: u16,
    #[serde(default)]
    pub remote_port: u16,
    pub last_used: DateTime<Utc>,
    #[serde(default)]
    pub bastion_name: String,
    #[serde(default)]
    pub bastion_resource_group: String,
    #[serde(default)]
    pub bastion_subscription_id: String,
    #[serde(default)]
    pub connection_type: ConnectionKind,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub auth_type: String,
}

impl SavedConnectionProfile {
    /// Build a tunnel profile named after its target resource
    pub fn for_tunnel(
        target: &TargetResource,
        bastion: &BastionHost,
        local_port: u16,
        remote_port: u16,
    ) -> Self {
        Self {
            name: default_tunnel_name(&target.name),
            subscription_id: target.subscription_id.clone(),
            resource_id: target.id.clone(),
            resource_name: target.name.clone(),
            local_port,
            remote_port,
            last_used: Utc::now(),
            bastion_name: bastion.name.clone(),
            bastion_resource_group: bastion.resource_group.clone(),
            bastion_subscription_id: bastion.subscription_id.clone(),
            connection_type: ConnectionKind::Tunnel,
            username: String::new(),
            auth_type: String::new(),
        }
    }

    pub fn kind(&self) -> ConnectionKind {
        self.connection_type
    }

    pub fn target(&self) -> TargetResource {
        TargetResource {
            id: self.resource_id.clone(),
            name: self.resource_name.clone(),
            subscription_id: self.subscription_id.clone(),
        }
    }

    pub fn bastion(&self) -> BastionHost {
        BastionHost {
            name: self.bastion_name.clone(),
            resource_group: self.bastion_resource_group.clone(),
            subscription_id: self.bastion_subscription_id.clone(),
        }
    }

    /// Launch tuple for this profile
    pub fn tunnel_spec(&self) -> TunnelSpec {
        TunnelSpec {
            target: self.target(),
            bastion: self.bastion(),
            local_port: self.local_port,
            remote_port: self.remote_port,
        }
    }
}

/// Default profile name for a tunnel to `resource_name`
pub fn default_tunnel_name(resource_name: &str) -> String {
    default_profile_name(ConnectionKind::Tunnel, resource_name)
}

/// Default profile name for a `kind` connection to `resource_name`
pub fn default_profile_name(kind: ConnectionKind, resource_name: &str) -> String {
    format!("{}-{}", kind, resource_name)
}

/// Lifecycle status of a tracked tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelStatus {
    /// Process spawned, not yet verified
    Starting,
    /// Process alive and local port accepting connections
    Running,
    /// Startup verification failed
    Failed,
    /// Loaded from disk; the recorded process is still alive
    Restored,
    /// Loaded from disk; the recorded process is gone
    Stale,
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelStatus::Starting => write!(f, "starting"),
            TunnelStatus::Running => write!(f, "running"),
            TunnelStatus::Failed => write!(f, "failed"),
            TunnelStatus::Restored => write!(f, "restored"),
            TunnelStatus::Stale => write!(f, "stale"),
        }
    }
}

/// Persisted evidence that a tunnel was started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTunnelRecord {
    pub id: TunnelId,
    pub local_port: u16,
    pub remote_port: u16,
    pub resource_id: String,
    #[serde(default)]
    pub resource_name: String,
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub bastion_name: String,
    #[serde(default)]
    pub bastion_resource_group: String,
    #[serde(default)]
    pub bastion_subscription_id: String,
    pub start_time: DateTime<Utc>,
    pub status: String,
    #[serde(default)]
    pub pid: Option<u32>,
}

/// Everything needed to launch one tunnel process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    pub target: TargetResource,
    pub bastion: BastionHost,
    pub local_port: u16,
    pub remote_port: u16,
}

/// The registry's view of one tracked tunnel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TunnelSession {
    pub id: TunnelId,
    pub local_port: u16,
    pub remote_port: u16,
    pub target: TargetResource,
    pub bastion: BastionHost,
    pub start_time: DateTime<Utc>,
    pub status: TunnelStatus,
    pub pid: Option<u32>,
}

impl TunnelSession {
    pub(crate) fn starting(id: TunnelId, spec: &TunnelSpec, pid: Option<u32>) -> Self {
        Self {
            id,
            local_port: spec.local_port,
            remote_port: spec.remote_port,
            target: spec.target.clone(),
            bastion: spec.bastion.clone(),
            start_time: Utc::now(),
            status: TunnelStatus::Starting,
            pid,
        }
    }

    /// Rebuild a session from a persisted record
    pub(crate) fn restored(record: &ActiveTunnelRecord, status: TunnelStatus) -> Self {
        Self {
            id: record.id.clone(),
            local_port: record.local_port,
            remote_port: record.remote_port,
            target: TargetResource {
                id: record.resource_id.clone(),
                name: record.resource_name.clone(),
                subscription_id: record.subscription_id.clone(),
            },
            bastion: BastionHost {
                name: record.bastion_name.clone(),
                resource_group: record.bastion_resource_group.clone(),
                subscription_id: record.bastion_subscription_id.clone(),
            },
            start_time: record.start_time,
            status,
            pid: record.pid,
        }
    }

    /// Project the session onto its persisted form
    pub fn to_record(&self) -> ActiveTunnelRecord {
        ActiveTunnelRecord {
            id: self.id.clone(),
            local_port: self.local_port,
            remote_port: self.remote_port,
            resource_id: self.target.id.clone(),
            resource_name: self.target.name.clone(),
            subscription_id: self.target.subscription_id.clone(),
            bastion_name: self.bastion.name.clone(),
            bastion_resource_group: self.bastion.resource_group.clone(),
            bastion_subscription_id: self.bastion.subscription_id.clone(),
            start_time: self.start_time,
            status: self.status.to_string(),
            pid: self.pid,
        }
    }
}
