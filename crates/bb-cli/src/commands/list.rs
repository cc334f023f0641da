//! List command implementation

use anyhow::Result;

use bb_core::{ConnectionKind, LazyContext};

use crate::output::format_profiles;

/// List saved configurations, optionally of one kind
pub async fn list_command(ctx: &LazyContext, kind: Option<ConnectionKind>) -> Result<()> {
    let registry = ctx.registry().await?;
    let kinds = match kind {
        Some(kind) => vec![kind],
        None => ConnectionKind::ALL.to_vec(),
    };

    for (i, kind) in kinds.into_iter().enumerate() {
        if i > 0 {
            println!();
        }
        let profiles = registry.saved_profiles(Some(kind)).await;
        println!("{} configurations:", heading(kind));
        println!("{}", format_profiles(&profiles));
    }
    Ok(())
}

fn heading(kind: ConnectionKind) -> &'static str {
    match kind {
        ConnectionKind::Tunnel => "Tunnel",
        ConnectionKind::Ssh => "SSH",
        ConnectionKind::Rdp => "RDP",
    }
}
