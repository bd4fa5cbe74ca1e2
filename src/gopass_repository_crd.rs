use std::time::Duration;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::{Error, Result};

/// Reference to a single key inside a Kubernetes Secret.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone, JsonSchema)]
pub struct SecretKeyRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema, Validate)]
#[kube(
    group = "gopass.gopass.operator",
    version = "v1alpha1",
    kind = "GopassRepository",
    plural = "gopassrepositories",
    status = "GopassRepositoryStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GopassRepositorySpec {
    /// URL of the git repository holding the password store
    #[serde(default)]
    pub repository_url: String,
    /// How often the repository is pulled and the secret re-rendered. Empty disables refreshing.
    #[serde(default)]
    #[validate(custom = "validate_refresh_interval")]
    pub refresh_interval: String,
    /// User name used to authenticate against the repository
    #[serde(default)]
    pub user_name: String,
    /// Secret holding the password or token for `user_name`
    #[serde(default)]
    pub secret_key_ref: SecretKeyRef,
    /// Secret holding the armored gpg private key
    #[serde(default)]
    pub gpg_key_ref: SecretKeyRef,
}

/// Failure detail is not surfaced here; failures show up in logs and metrics only.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone, JsonSchema)]
pub struct GopassRepositoryStatus {}

impl GopassRepositorySpec {
    /// `None` means periodic refreshing is disabled.
    pub fn refresh_interval(&self) -> Result<Option<Duration>> {
        parse_refresh_interval(&self.refresh_interval)
    }
}

pub fn parse_refresh_interval(refresh_interval: &str) -> Result<Option<Duration>> {
    let refresh_interval = refresh_interval.trim();
    if refresh_interval.is_empty() {
        return Ok(None);
    }

    let interval = humantime::parse_duration(refresh_interval).map_err(|source| {
        Error::InvalidInterval {
            value: refresh_interval.to_string(),
            source,
        }
    })?;

    if interval.is_zero() {
        Ok(None)
    } else {
        Ok(Some(interval))
    }
}

fn validate_refresh_interval(refresh_interval: &str) -> Result<(), ValidationError> {
    parse_refresh_interval(refresh_interval)
        .map(|_| ())
        .map_err(|_| ValidationError::new("refresh_interval"))
}
