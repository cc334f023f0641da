//! SSH and RDP hand-off

use anyhow::{bail, Context, Result};

use bb_core::connect::{self, SessionOptions};
use bb_core::directory::StaticDirectory;
use bb_core::traits::Selection;
use bb_core::{ConnectionKind, LazyContext};

use crate::output::print_success;

/// Arguments of `bastion-buddy ssh|rdp`
///
/// With `resource_id` set the target is saved as a profile first, otherwise
/// `name` must refer to an existing one.
#[derive(Debug, Clone, Default)]
pub struct SessionArgs {
    pub name: Option<String>,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub bastion: Option<String>,
    pub bastion_group: Option<String>,
    pub bastion_scope: Option<String>,
    pub username: String,
    pub auth_type: String,
}

impl SessionArgs {
    fn selection(&self) -> Option<Selection> {
        let resource_id = self.resource_id.clone()?;
        Some(Selection {
            resource_id: Some(resource_id),
            resource_name: self.resource_name.clone(),
            resource_subscription: None,
            bastion_name: self.bastion.clone(),
            bastion_resource_group: self.bastion_group.clone(),
            bastion_subscription: self.bastion_scope.clone(),
        })
    }

    fn options(&self) -> SessionOptions {
        SessionOptions {
            name: self.name.clone(),
            username: self.username.clone(),
            auth_type: self.auth_type.clone(),
        }
    }
}

/// Run an interactive session, saving the target first when flags describe one
pub async fn handoff_command(
    ctx: &LazyContext,
    kind: ConnectionKind,
    args: &SessionArgs,
) -> Result<()> {
    let name = match args.selection() {
        Some(selection) => {
            let app = ctx.get().await.context("Failed to initialize")?;
            let directory = StaticDirectory::new(app.credential.subscription_id.clone());
            let profile =
                connect::save_session_profile(ctx, &directory, kind, &selection, &args.options())
                    .await
                    .with_context(|| format!("Failed to save {} configuration", kind))?;
            print_success(&format!("Saved {} configuration '{}'", kind, profile.name));
            profile.name
        }
        None => match &args.name {
            Some(name) => name.clone(),
            None => bail!("Give a configuration name or --resource-id"),
        },
    };

    let status = connect::handoff(ctx, kind, &name)
        .await
        .with_context(|| format!("Failed to connect '{}'", name))?;
    if !status.success() {
        bail!("{} session '{}' ended with {}", kind, name, status);
    }
    Ok(())
}
