//! Start command implementation

use anyhow::{Context, Result};

use bb_core::{connect, LazyContext};

use super::announce_tunnel;
use crate::output::print_info;

/// Start a saved tunnel configuration by name
pub async fn start_command(ctx: &LazyContext, name: &str) -> Result<()> {
    print_info(&format!("Starting tunnel '{}'...", name));
    let session = connect::start_saved_tunnel(ctx, name)
        .await
        .with_context(|| format!("Failed to start tunnel '{}'", name))?;
    announce_tunnel(&session);
    Ok(())
}
