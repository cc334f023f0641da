//! Resource directory implementations

use async_trait::async_trait;

use crate::error::BastionError;
use crate::traits::{ResourceDirectory, Selection};
use crate::types::{BastionHost, TargetResource};

/// Resolves selections that already name every identifier
///
/// Missing owning scopes fall back to `default_subscription`, normally the
/// subscription of the logged-in account.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    default_subscription: String,
}

impl StaticDirectory {
    pub fn new(default_subscription: impl Into<String>) -> Self {
        Self {
            default_subscription: default_subscription.into(),
        }
    }
}

#[async_trait]
impl ResourceDirectory for StaticDirectory {
    async fn resolve(
        &self,
        selection: &Selection,
    ) -> Result<(TargetResource, BastionHost), BastionError> {
        let resource_id = required(&selection.resource_id, "resource id")?;
        let resource_name = selection
            .resource_name
            .clone()
            .unwrap_or_else(|| resource_name_from_id(&resource_id));

        let target = TargetResource {
            subscription_id: selection
                .resource_subscription
                .clone()
                .or_else(|| subscription_from_id(&resource_id))
                .unwrap_or_else(|| self.default_subscription.clone()),
            id: resource_id,
            name: resource_name,
        };
        let bastion = BastionHost {
            name: required(&selection.bastion_name, "bastion name")?,
            resource_group: required(&selection.bastion_resource_group, "bastion resource group")?,
            subscription_id: selection
                .bastion_subscription
                .clone()
                .unwrap_or_else(|| target.subscription_id.clone()),
        };
        Ok((target, bastion))
    }
}

fn required(value: &Option<String>, what: &str) -> Result<String, BastionError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BastionError::Config(crate::error::ConfigError::Invalid(format!("missing {}", what))))
}

/// Last path segment of an ARM resource id
fn resource_name_from_id(id: &str) -> String {
    id.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(id)
        .to_string()
}

/// Segment after `/subscriptions/` in an ARM resource id
fn subscription_from_id(id: &str) -> Option<String> {
    let mut parts = id.split('/');
    while let Some(part) = parts.next() {
        if part.eq_ignore_ascii_case("subscriptions") {
            return parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        }
    }
    None
}
