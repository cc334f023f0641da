//! Open command implementation

use anyhow::{Context, Result};

use bb_core::directory::StaticDirectory;
use bb_core::traits::Selection;
use bb_core::{connect, LazyContext};

use super::announce_tunnel;
use crate::output::print_info;

/// Flags of `bastion-buddy open`
#[derive(Debug, Clone, Default)]
pub struct OpenArgs {
    pub resource_id: String,
    pub resource_name: Option<String>,
    pub bastion: String,
    pub bastion_group: String,
    pub bastion_scope: Option<String>,
    pub local_port: u16,
    pub remote_port: u16,
    pub name: Option<String>,
}

impl OpenArgs {
    fn selection(&self) -> Selection {
        Selection {
            resource_id: Some(self.resource_id.clone()),
            resource_name: self.resource_name.clone(),
            resource_subscription: None,
            bastion_name: Some(self.bastion.clone()),
            bastion_resource_group: Some(self.bastion_group.clone()),
            bastion_subscription: self.bastion_scope.clone(),
        }
    }
}

/// Open a new tunnel and save it as a tunnel configuration
pub async fn open_command(ctx: &LazyContext, args: &OpenArgs) -> Result<()> {
    let app = ctx.get().await.context("Failed to initialize")?;
    let directory = StaticDirectory::new(app.credential.subscription_id.clone());

    print_info(&format!(
        "Opening tunnel localhost:{} -> port {}...",
        args.local_port, args.remote_port
    ));
    let session = connect::open_tunnel(
        ctx,
        &directory,
        &args.selection(),
        args.local_port,
        args.remote_port,
        args.name.as_deref(),
    )
    .await
    .context("Failed to open tunnel")?;

    announce_tunnel(&session);
    Ok(())
}
