//! Authentication provider trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BastionError;

/// Identity of the logged-in account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Default owning scope (subscription) of the account
    pub subscription_id: String,
    pub tenant_id: String,
    /// Signed-in principal
    pub user: String,
}

/// Source of a valid credential
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Return a valid credential or [`BastionError::AuthRequired`]
    async fn credential(&self) -> Result<Credential, BastionError>;
}
