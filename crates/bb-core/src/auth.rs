//! Credential acquisition through the Azure CLI

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::BastionError;
use crate::traits::{AuthProvider, Credential};

/// Uses `az account show`, falling back to `az login` when allowed
#[derive(Debug, Clone)]
pub struct AzCliAuth {
    program: String,
    interactive_login: bool,
}

#[derive(Deserialize)]
struct AccountShow {
    id: String,
    #[serde(rename = "tenantId", default)]
    tenant_id: String,
    #[serde(default)]
    user: Option<AccountUser>,
}

#[derive(Deserialize)]
struct AccountUser {
    name: String,
}

impl AzCliAuth {
    pub fn new(program: impl Into<String>, interactive_login: bool) -> Self {
        Self {
            program: program.into(),
            interactive_login,
        }
    }

    /// `Ok(None)` when the CLI reports that nobody is logged in
    async fn account_show(&self) -> Result<Option<Credential>, BastionError> {
        let output = Command::new(&self.program)
            .args(["account", "show", "--output", "json"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.launch_error(e))?;

        if output.status.success() {
            return parse_account(&output.stdout).map(Some);
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if needs_login(&combined) {
            return Ok(None);
        }
        Err(BastionError::AuthRequired(format!(
            "error checking Azure login status: {}",
            combined.trim()
        )))
    }

    async fn login(&self) -> Result<(), BastionError> {
        tracing::info!("Not logged into Azure. Starting login process...");
        let status = Command::new(&self.program)
            .arg("login")
            .status()
            .await
            .map_err(|e| self.launch_error(e))?;
        if !status.success() {
            return Err(BastionError::AuthRequired(format!(
                "az login failed with {}",
                status
            )));
        }
        Ok(())
    }

    fn launch_error(&self, e: io::Error) -> BastionError {
        if e.kind() == io::ErrorKind::NotFound {
            BastionError::AuthRequired(format!(
                "Azure CLI ({}) is not installed. Please install it from https://docs.microsoft.com/cli/azure/install-azure-cli",
                self.program
            ))
        } else {
            BastionError::Spawn {
                program: self.program.clone(),
                source: e,
            }
        }
    }
}

#[async_trait]
impl AuthProvider for AzCliAuth {
    async fn credential(&self) -> Result<Credential, BastionError> {
        if let Some(credential) = self.account_show().await? {
            return Ok(credential);
        }
        if !self.interactive_login {
            return Err(BastionError::AuthRequired(
                "run `az login` and try again".to_string(),
            ));
        }

        self.login().await?;
        self.account_show().await?.ok_or_else(|| {
            BastionError::AuthRequired("still not logged in after az login".to_string())
        })
    }
}

/// Provider for commands that only touch local state
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAuth;

#[async_trait]
impl AuthProvider for OfflineAuth {
    async fn credential(&self) -> Result<Credential, BastionError> {
        Ok(Credential::default())
    }
}

fn parse_account(stdout: &[u8]) -> Result<Credential, BastionError> {
    let account: AccountShow = serde_json::from_slice(stdout).map_err(|e| {
        BastionError::AuthRequired(format!("unexpected output from az account show: {}", e))
    })?;
    Ok(Credential {
        subscription_id: account.id,
        tenant_id: account.tenant_id,
        user: account.user.map(|u| u.name).unwrap_or_default(),
    })
}

fn needs_login(output: &str) -> bool {
    output.contains("az login") || output.contains("not logged in")
}
