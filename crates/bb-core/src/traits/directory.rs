//! Resource directory trait

use async_trait::async_trait;

use crate::error::BastionError;
use crate::types::{BastionHost, TargetResource};

/// What the caller picked, by whatever means (menu, flags, static config)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub resource_subscription: Option<String>,
    pub bastion_name: Option<String>,
    pub bastion_resource_group: Option<String>,
    pub bastion_subscription: Option<String>,
}

/// Resolves a selection into a target resource and the bastion that reaches it
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    async fn resolve(&self, selection: &Selection)
        -> Result<(TargetResource, BastionHost), BastionError>;
}
