//! Connection orchestration
//!
//! Glue between saved profiles, the resource directory and the registry.
//! Tunnels are supervised by the registry; SSH and RDP sessions are a
//! blocking hand-off to the Azure CLI that ends when the user disconnects.

use std::process::ExitStatus;

use chrono::Utc;
use tokio::process::Command;

use crate::error::{BastionError, ConfigError, NotFound, Result};
use crate::init::LazyContext;
use crate::registry::Registry;
use crate::traits::{ResourceDirectory, Selection};
use crate::types::{
    default_profile_name, default_tunnel_name, ConnectionKind, SavedConnectionProfile,
    TunnelSession, TunnelSpec,
};

/// Auth type used for SSH when the profile does not name one
pub const DEFAULT_SSH_AUTH_TYPE: &str = "password";

/// Stamp `last_used` and upsert the profile
pub async fn ensure_profile(
    registry: &Registry,
    mut profile: SavedConnectionProfile,
) -> Result<SavedConnectionProfile> {
    profile.last_used = Utc::now();
    registry.save_profile(profile.clone()).await?;
    Ok(profile)
}

/// Start the tunnel a tunnel profile describes
pub async fn launch_from_profile(
    registry: &Registry,
    profile: &SavedConnectionProfile,
) -> Result<TunnelSession> {
    if profile.kind() != ConnectionKind::Tunnel {
        return Err(ConfigError::Invalid(format!(
            "'{}' is an {} configuration, not a tunnel",
            profile.name,
            profile.kind()
        ))
        .into());
    }
    if profile.local_port == 0 || profile.remote_port == 0 {
        return Err(ConfigError::Invalid(format!(
            "tunnel configuration '{}' has no port pair",
            profile.name
        ))
        .into());
    }
    registry.start_named(&profile.tunnel_spec(), &profile.name).await
}

/// Start a saved tunnel profile by name
pub async fn start_saved_tunnel(ctx: &LazyContext, name: &str) -> Result<TunnelSession> {
    let registry = ctx.registry().await?;
    let profile = registry
        .find_profile(name, Some(ConnectionKind::Tunnel))
        .await
        .ok_or_else(|| NotFound::Profile {
            kind: Some(ConnectionKind::Tunnel),
            name: name.to_string(),
        })?;
    launch_from_profile(&registry, &profile).await
}

/// Resolve a selection and start a tunnel to it
///
/// The tunnel is saved under `name`, or `tunnel-<resource name>` if none is given.
pub async fn open_tunnel(
    ctx: &LazyContext,
    directory: &dyn ResourceDirectory,
    selection: &Selection,
    local_port: u16,
    remote_port: u16,
    name: Option<&str>,
) -> Result<TunnelSession> {
    let registry = ctx.registry().await?;
    let (target, bastion) = directory.resolve(selection).await?;
    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| default_tunnel_name(&target.name));

    let spec = TunnelSpec {
        target,
        bastion,
        local_port,
        remote_port,
    };
    registry.start_named(&spec, &name).await
}

/// Login details saved with an SSH or RDP profile
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Profile name; `<kind>-<resource name>` when absent
    pub name: Option<String>,
    pub username: String,
    pub auth_type: String,
}

/// Resolve a selection and save it as an SSH or RDP profile
pub async fn save_session_profile(
    ctx: &LazyContext,
    directory: &dyn ResourceDirectory,
    kind: ConnectionKind,
    selection: &Selection,
    options: &SessionOptions,
) -> Result<SavedConnectionProfile> {
    if kind == ConnectionKind::Tunnel {
        return Err(ConfigError::Invalid(
            "tunnel configurations are saved by `open`".to_string(),
        )
        .into());
    }

    let registry = ctx.registry().await?;
    let (target, bastion) = directory.resolve(selection).await?;
    let profile = SavedConnectionProfile {
        name: options
            .name
            .clone()
            .unwrap_or_else(|| default_profile_name(kind, &target.name)),
        connection_type: kind,
        username: options.username.clone(),
        auth_type: options.auth_type.clone(),
        ..SavedConnectionProfile::for_tunnel(&target, &bastion, 0, 0)
    };
    ensure_profile(&registry, profile).await
}

/// Run an interactive SSH or RDP session from a saved profile
///
/// Blocks until the Azure CLI exits and returns its exit status.
pub async fn handoff(ctx: &LazyContext, kind: ConnectionKind, name: &str) -> Result<ExitStatus> {
    if kind == ConnectionKind::Tunnel {
        return Err(ConfigError::Invalid(
            "tunnels are started with `start`, not handed off".to_string(),
        )
        .into());
    }

    let registry = ctx.registry().await?;
    let profile = registry
        .find_profile(name, Some(kind))
        .await
        .ok_or_else(|| NotFound::Profile {
            kind: Some(kind),
            name: name.to_string(),
        })?;
    let profile = ensure_profile(&registry, profile).await?;

    let program = &ctx.config().tunnel_program;
    let args = handoff_args(kind, &profile);
    tracing::info!("Connecting to {} via {}...", profile.resource_name, kind);
    tracing::debug!("{} {}", program, args.join(" "));

    Command::new(program)
        .args(&args)
        .status()
        .await
        .map_err(|source| BastionError::Spawn {
            program: program.clone(),
            source,
        })
}

/// `az network bastion ssh|rdp` arguments for a profile
pub fn handoff_args(kind: ConnectionKind, profile: &SavedConnectionProfile) -> Vec<String> {
    let mut args: Vec<String> = ["network", "bastion", kind.as_str()]
        .into_iter()
        .map(str::to_string)
        .collect();
    args.extend([
        "--name".to_string(),
        profile.bastion_name.clone(),
        "--resource-group".to_string(),
        profile.bastion_resource_group.clone(),
        "--target-resource-id".to_string(),
        profile.resource_id.clone(),
    ]);
    if !profile.bastion_subscription_id.is_empty() {
        args.extend(["--subscription".to_string(), profile.bastion_subscription_id.clone()]);
    }

    if kind == ConnectionKind::Ssh {
        let auth_type = if profile.auth_type.is_empty() {
            DEFAULT_SSH_AUTH_TYPE
        } else {
            profile.auth_type.as_str()
        };
        args.extend(["--auth-type".to_string(), auth_type.to_string()]);
        if !profile.username.is_empty() {
            args.extend(["--username".to_string(), profile.username.clone()]);
        }
    }
    args
}
