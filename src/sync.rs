//! Local clones of gopass repositories, keyed by repository URL.
//!
//! A repository is unknown until [`SyncEngine::initialize`] cloned it and
//! opened its password store; from then on it can be refreshed and
//! enumerated. The registry only lives as long as the process, a restart
//! means cloning again.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use tempfile::TempDir;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use crate::credentials::Keyring;
use crate::password_store::GopassStore;
use crate::repository::{GitCredentials, PullOutcome, Repository};
use crate::{Error, Result};

/// A decrypted password-store item.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordEntry {
    pub name: String,
    pub password: String,
}

impl fmt::Debug for PasswordEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

struct RegistryEntry {
    // removed together with the entry
    directory: TempDir,
    store: GopassStore,
    working_copy: Arc<StdMutex<Repository>>,
    credentials: GitCredentials,
}

pub struct SyncEngine {
    registry: RwLock<HashMap<String, Arc<RegistryEntry>>>,
    // clone-and-open and the keyring import are serialized process wide
    init_lock: Mutex<()>,
    keyring: Arc<dyn Keyring>,
    gpg_binary: PathBuf,
}

impl SyncEngine {
    pub fn new(keyring: Arc<dyn Keyring>, gpg_binary: impl Into<PathBuf>) -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            init_lock: Mutex::new(()),
            keyring,
            gpg_binary: gpg_binary.into(),
        }
    }

    pub async fn contains(&self, url: &str) -> bool {
        self.registry.read().await.contains_key(url)
    }

    pub async fn registered_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.registry.read().await.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Local checkout directory of a registered repository.
    pub async fn directory_of(&self, url: &str) -> Option<PathBuf> {
        let registry = self.registry.read().await;
        registry.get(url).map(|entry| entry.directory.path().to_path_buf())
    }

    /// Clones `url`, imports `gpg_key` and opens the password store.
    ///
    /// Succeeds without doing anything when `url` is already registered. The
    /// entry is only registered once every step succeeded.
    #[instrument(skip(self, credentials, gpg_key))]
    pub async fn initialize(
        &self,
        url: &str,
        credentials: GitCredentials,
        gpg_key: &[u8],
    ) -> Result<()> {
        let _guard = self.init_lock.lock().await;

        if self.contains(url).await {
            info!("repository with URL '{}' already initialized", url);
            return Ok(());
        }

        let remote_url = url.to_string();
        let clone_credentials = credentials.clone();
        // the directory lives inside the blocking task until the clone returns
        let (directory, working_copy) = tokio::task::spawn_blocking(move || {
            let directory = tempfile::Builder::new().prefix("gopass").tempdir()?;
            let working_copy =
                Repository::clone(&remote_url, directory.path(), &clone_credentials)?;
            Ok::<_, Error>((directory, working_copy))
        })
        .await??;

        self.keyring.import_key(gpg_key).await?;

        let store = GopassStore::open(directory.path(), self.gpg_binary.clone())?;

        let entry = RegistryEntry {
            directory,
            store,
            working_copy: Arc::new(StdMutex::new(working_copy)),
            credentials,
        };
        self.registry
            .write()
            .await
            .insert(url.to_string(), Arc::new(entry));

        info!("initialized repository with URL '{}'", url);
        Ok(())
    }

    /// Pulls the registered working copy with the credentials it was cloned with.
    #[instrument(skip(self))]
    pub async fn refresh(&self, url: &str) -> Result<PullOutcome> {
        let entry = self.entry(url).await?;

        let outcome = tokio::task::spawn_blocking(move || {
            let working_copy = entry
                .working_copy
                .lock()
                .map_err(|_| Error::GitError(git2::Error::from_str("working copy lock poisoned")))?;
            working_copy.pull(&entry.credentials)
        })
        .await??;

        info!(?outcome, "refreshed repository with URL '{}'", url);
        Ok(outcome)
    }

    /// Decrypts every entry of the store; entries that fail are logged and skipped.
    #[instrument(skip(self))]
    pub async fn enumerate(&self, url: &str) -> Result<Vec<PasswordEntry>> {
        let entry = self.entry(url).await?;

        let names = entry.store.list().await?;
        let mut passwords = Vec::with_capacity(names.len());
        for name in names {
            match entry.store.get(&name).await {
                Ok(password) => passwords.push(PasswordEntry { name, password }),
                Err(error) => {
                    warn!(%error, "not able to fetch password '{}'", name);
                }
            }
        }

        Ok(passwords)
    }

    async fn entry(&self, url: &str) -> Result<Arc<RegistryEntry>> {
        self.registry
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("repository with URL '{}'", url)))
    }
}
