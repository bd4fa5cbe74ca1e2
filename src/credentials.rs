//! Repository credentials and gpg key material, read from cluster secrets.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

pub const DEFAULT_GPG_KEY_REF: &str = "gpg-key";
pub const DEFAULT_GPG_KEY_REF_KEY: &str = "gpg-key";

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Password or token stored at `secret_key` of secret `secret_ref`.
    async fn fetch_credential(
        &self,
        namespace: &str,
        secret_ref: &str,
        secret_key: &str,
    ) -> Result<String>;

    /// Armored gpg private key stored at `gpg_key_ref_key` of secret `gpg_key_ref`.
    async fn fetch_gpg_key(
        &self,
        namespace: &str,
        gpg_key_ref: &str,
        gpg_key_ref_key: &str,
    ) -> Result<Vec<u8>>;
}

/// Imports private keys into the keyring used for decryption.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Keyring: Send + Sync {
    async fn import_key(&self, key: &[u8]) -> Result<()>;
}

#[derive(Clone)]
pub struct KubeCredentialProvider {
    client: Client,
}

impl KubeCredentialProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn read_key(&self, namespace: &str, name: &str, key: &str) -> Result<Vec<u8>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get_opt(name).await?.ok_or_else(|| {
            Error::NotFound(format!("secret '{}' in namespace '{}'", name, namespace))
        })?;
        extract_key(&secret, namespace, name, key)
    }
}

#[async_trait]
impl CredentialProvider for KubeCredentialProvider {
    async fn fetch_credential(
        &self,
        namespace: &str,
        secret_ref: &str,
        secret_key: &str,
    ) -> Result<String> {
        debug!(namespace, secret_ref, "fetching repository credentials");
        let password = self.read_key(namespace, secret_ref, secret_key).await?;
        Ok(String::from_utf8_lossy(&password).into_owned())
    }

    async fn fetch_gpg_key(
        &self,
        namespace: &str,
        gpg_key_ref: &str,
        gpg_key_ref_key: &str,
    ) -> Result<Vec<u8>> {
        debug!(namespace, gpg_key_ref, "fetching gpg key");
        self.read_key(namespace, gpg_key_ref, gpg_key_ref_key).await
    }
}

pub fn extract_key(secret: &Secret, namespace: &str, name: &str, key: &str) -> Result<Vec<u8>> {
    if let Some(value) = secret.data.as_ref().and_then(|data| data.get(key)) {
        return Ok(value.0.clone());
    }
    // stringData is write-only on the apiserver but shows up on objects built client side
    if let Some(value) = secret.string_data.as_ref().and_then(|data| data.get(key)) {
        return Ok(value.clone().into_bytes());
    }
    Err(Error::KeyNotFound {
        key: key.to_string(),
        secret: name.to_string(),
        namespace: namespace.to_string(),
    })
}

/// Imports keys by running `gpg --batch --import`.
#[derive(Clone, Debug)]
pub struct GpgKeyring {
    binary: PathBuf,
}

impl GpgKeyring {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for GpgKeyring {
    fn default() -> Self {
        Self::new("gpg")
    }
}

#[async_trait]
impl Keyring for GpgKeyring {
    async fn import_key(&self, key: &[u8]) -> Result<()> {
        info!("add gpg key");
        let mut child = Command::new(&self.binary)
            .args(["--batch", "--import"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::KeyImportFailed(format!("unable to run {}: {}", self.binary.display(), e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(key)
                .await
                .map_err(|e| Error::KeyImportFailed(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::KeyImportFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(Error::KeyImportFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}
