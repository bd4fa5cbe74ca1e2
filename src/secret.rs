use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{DeleteParams, ObjectMeta, PostParams};
use kube::{Api, Client, ResourceExt};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use crate::proto;
use crate::sync::PasswordEntry;
use crate::Result;

lazy_static! {
    static ref RE_INVALID_KEY_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9]+").unwrap();
}

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "gopass-operator";

/// Where the rendered secret of a repository lives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecretTarget {
    pub namespace: String,
    pub name: String,
}

impl From<proto::NamespacedName> for SecretTarget {
    fn from(name: proto::NamespacedName) -> Self {
        Self {
            namespace: name.namespace,
            name: name.name,
        }
    }
}

impl From<&SecretTarget> for proto::NamespacedName {
    fn from(target: &SecretTarget) -> Self {
        Self {
            namespace: target.namespace.clone(),
            name: target.name.clone(),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    async fn create(&self, secret: &Secret) -> Result<()>;

    /// Replaces the whole object, dropping keys missing from `secret`.
    async fn replace(&self, secret: &Secret) -> Result<()>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn create(&self, secret: &Secret) -> Result<()> {
        let namespace = secret.namespace().unwrap_or_default();
        self.api(&namespace)
            .create(&PostParams::default(), secret)
            .await?;
        Ok(())
    }

    async fn replace(&self, secret: &Secret) -> Result<()> {
        let namespace = secret.namespace().unwrap_or_default();
        self.api(&namespace)
            .replace(&secret.name_any(), &PostParams::default(), secret)
            .await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

/// Collapses every run of characters outside `[A-Za-z0-9]` into a single `-`.
pub fn sanitize(name: &str) -> String {
    RE_INVALID_KEY_CHARS.replace_all(name, "-").into_owned()
}

/// Secret payload for a list of passwords. Colliding sanitized names keep the last value.
pub fn render_data(entries: &[PasswordEntry]) -> BTreeMap<String, ByteString> {
    entries
        .iter()
        .map(|entry| {
            (
                sanitize(&entry.name),
                ByteString(entry.password.as_bytes().to_vec()),
            )
        })
        .collect()
}

/// Projects enumerated passwords into a Kubernetes secret.
#[derive(Clone)]
pub struct SecretPublisher {
    store: Arc<dyn SecretStore>,
}

impl SecretPublisher {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    //create or overwrite secret
    pub async fn publish(&self, target: &SecretTarget, entries: &[PasswordEntry]) -> Result<()> {
        let mut secret = Secret {
            metadata: ObjectMeta {
                name: Some(target.name.clone()),
                namespace: Some(target.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.to_string(),
                    MANAGED_BY.to_string(),
                )])),
                ..Default::default()
            },
            data: Some(render_data(entries)),
            ..Default::default()
        };

        match self.store.get(&target.namespace, &target.name).await? {
            None => {
                self.store.create(&secret).await?;
                info!(
                    "Created secret {} in namespace {} with {} entries",
                    target.name,
                    target.namespace,
                    entries.len()
                );
            }
            Some(existing) => {
                secret.metadata.resource_version = existing.metadata.resource_version;
                self.store.replace(&secret).await?;
                info!(
                    "Updated secret {} in namespace {} with {} entries",
                    target.name,
                    target.namespace,
                    entries.len()
                );
            }
        }
        Ok(())
    }

    //delete secret, succeeding when it is already gone
    pub async fn delete(&self, target: &SecretTarget) -> Result<bool> {
        if self.store.get(&target.namespace, &target.name).await?.is_none() {
            warn!(
                "Secret {} does not exist in namespace {}",
                target.name, target.namespace
            );
            return Ok(true);
        }

        self.store.delete(&target.namespace, &target.name).await?;
        info!("Deleted secret {} in namespace {}", target.name, target.namespace);
        Ok(true)
    }
}
