//! Status command implementation

use anyhow::Result;
use chrono::Utc;

use bb_core::{LazyContext, TunnelStatus};

use crate::output::{format_tunnels, print_info};

/// Show tracked tunnels
pub async fn status_command(ctx: &LazyContext) -> Result<()> {
    let sessions = ctx.registry().await?.list().await;

    println!("Active Tunnels:");
    println!("{}", format_tunnels(&sessions, Utc::now()));

    let stale = sessions
        .iter()
        .filter(|s| s.status == TunnelStatus::Stale)
        .count();
    if stale > 0 {
        print_info(&format!(
            "{} tunnel(s) are no longer running; `bastion-buddy stop <id>` forgets them",
            stale
        ));
    }
    Ok(())
}
