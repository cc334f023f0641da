//! Stop command implementations

use anyhow::{bail, Context, Result};

use bb_core::{LazyContext, TunnelId};

use crate::output::{print_info, print_success, print_warning};

/// Stop one tunnel by id
pub async fn stop_command(ctx: &LazyContext, id: &str) -> Result<()> {
    let registry = ctx.registry().await?;
    let id = TunnelId::from(id);
    registry
        .stop(&id)
        .await
        .with_context(|| format!("Failed to stop tunnel {}", id))?;
    print_success(&format!("Stopped tunnel {}", id));
    Ok(())
}

/// Stop every tracked tunnel
pub async fn stop_all_command(ctx: &LazyContext) -> Result<()> {
    let registry = ctx.registry().await?;
    let report = registry.stop_all().await;

    if report.stopped.is_empty() && report.is_clean() {
        print_info("No active tunnels");
        return Ok(());
    }

    for warning in &report.warnings {
        match &warning.id {
            Some(id) => print_warning(&format!("Tunnel {}: {}", id, warning.error)),
            None => print_warning(&warning.error.to_string()),
        }
    }
    print_success(&format!("Stopped {} tunnel(s)", report.stopped.len()));

    if !report.is_clean() {
        bail!(
            "{} problem(s) while stopping tunnels; processes may still be running",
            report.warnings.len()
        );
    }
    Ok(())
}
