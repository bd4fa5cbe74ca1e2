use std::cell::Cell;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{Error, Result};

/// Username/password pair used for the git transport.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct GitCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for GitCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullOutcome {
    UpToDate,
    FastForwarded,
}

// libgit2 keeps asking for credentials while the server rejects them
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

pub struct Repository {
    inner: git2::Repository,
    base_path: PathBuf,
    remote_url: String,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("base_path", &self.base_path)
            .field("remote_url", &self.remote_url)
            .finish()
    }
}

impl Repository {
    //clone repository, shallow where the transport supports it
    pub fn clone(
        remote_url: &str,
        target_path: &Path,
        credentials: &GitCredentials,
    ) -> Result<Self> {
        let fetch_options =
            Self::fetch_options(credentials, fetch_depth(remote_url, FetchKind::Clone));

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch_options);

        info!("Cloning {} into {}", remote_url, target_path.display());

        let repo = builder.clone(remote_url, target_path)?;

        Ok(Self {
            inner: repo,
            base_path: target_path.to_path_buf(),
            remote_url: remote_url.to_string(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    //fetch origin and fast-forward the checked out branch
    pub fn pull(&self, credentials: &GitCredentials) -> Result<PullOutcome> {
        let head = self.inner.head()?;
        let branch = head
            .shorthand()
            .ok_or_else(|| git2::Error::from_str("HEAD is not a valid branch name"))?
            .to_string();

        let mut fetch_options =
            Self::fetch_options(credentials, fetch_depth(&self.remote_url, FetchKind::Pull));

        let mut remote = self.inner.find_remote("origin")?;
        debug!("Fetching {} from {}", branch, self.remote_url);
        remote.fetch(&[branch.as_str()], Some(&mut fetch_options), None)?;

        let fetch_head = self.inner.find_reference("FETCH_HEAD")?;
        let fetch_commit = self.inner.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = self.inner.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            debug!("{} already up to date", self.remote_url);
            return Ok(PullOutcome::UpToDate);
        }

        if !analysis.is_fast_forward() {
            return Err(Error::GitError(git2::Error::from_str(&format!(
                "unable to fast-forward branch '{}' of {}",
                branch, self.remote_url
            ))));
        }

        let refname = format!("refs/heads/{}", branch);
        let mut reference = self.inner.find_reference(&refname)?;
        reference.set_target(fetch_commit.id(), "pull: fast-forward")?;
        self.inner.set_head(&refname)?;
        self.inner
            .checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;

        info!("Fast-forwarded {} to {}", self.remote_url, fetch_commit.id());
        Ok(PullOutcome::FastForwarded)
    }

    fn fetch_options(credentials: &GitCredentials, depth: Option<i32>) -> git2::FetchOptions<'_> {
        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.remote_callbacks(Self::remote_callbacks(credentials));
        if let Some(depth) = depth {
            fetch_options.depth(depth);
        }
        fetch_options
    }

    fn remote_callbacks(credentials: &GitCredentials) -> git2::RemoteCallbacks<'_> {
        let mut callbacks = git2::RemoteCallbacks::new();
        let attempts = Cell::new(0usize);
        callbacks.credentials(move |_url, user_from_url, allowed| {
            attempts.set(attempts.get() + 1);
            if attempts.get() > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str("authentication failed"));
            }
            Self::credentials_cb(credentials, user_from_url, allowed)
        });
        callbacks.transfer_progress(Self::transfer_progress_cb);
        callbacks
    }

    pub fn credentials_cb(
        credentials: &GitCredentials,
        user_from_url: Option<&str>,
        allowed: git2::CredentialType,
    ) -> Result<git2::Cred, git2::Error> {
        let user = if credentials.username.is_empty() {
            user_from_url.unwrap_or("git")
        } else {
            credentials.username.as_str()
        };

        if allowed.contains(git2::CredentialType::USERNAME) {
            return git2::Cred::username(user);
        }

        if allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
            debug!("authenticate with user {} and password", user);
            return git2::Cred::userpass_plaintext(user, &credentials.password);
        }

        Err(git2::Error::from_str(&format!(
            "unsupported authentication method requested: {:?}",
            allowed
        )))
    }

    pub fn transfer_progress_cb(progress: git2::Progress<'_>) -> bool {
        if progress.received_objects() == progress.total_objects() {
            debug!(
                "Resolving deltas {}/{}",
                progress.indexed_deltas(),
                progress.total_deltas()
            );
        } else if progress.total_objects() > 0 {
            debug!(
                "Received {}/{} objects ({}) in {} bytes",
                progress.received_objects(),
                progress.total_objects(),
                progress.indexed_objects(),
                progress.received_bytes()
            );
        }
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FetchKind {
    Clone,
    Pull,
}

// Only the initial clone is shallow. A depth limited re-fetch grafts the new
// tip without parents, which leaves HEAD and FETCH_HEAD without a merge base.
fn fetch_depth(remote_url: &str, kind: FetchKind) -> Option<i32> {
    match kind {
        FetchKind::Clone if supports_shallow(remote_url) => Some(1),
        _ => None,
    }
}

/// Local paths and `file://` go through libgit2's local transport which has
/// no shallow fetch support.
pub fn supports_shallow(remote_url: &str) -> bool {
    let network_scheme = ["http://", "https://", "ssh://", "git://"]
        .iter()
        .any(|scheme| remote_url.starts_with(scheme));
    let scp_like = !remote_url.contains("://")
        && remote_url
            .split_once(':')
            .map_or(false, |(host, _)| host.contains('@'));
    network_scheme || scp_like
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_all, init_store_remote, url_of};

    #[test]
    fn shallow_only_for_network_transports() {
        assert!(supports_shallow("https://example.com/store.git"));
        assert!(supports_shallow("ssh://git@example.com/store.git"));
        assert!(supports_shallow("git@example.com:team/store.git"));
        assert!(!supports_shallow("/tmp/store"));
        assert!(!supports_shallow("file:///tmp/store"));
    }

    #[test]
    fn only_the_clone_is_shallow() {
        assert_eq!(
            fetch_depth("https://example.com/store.git", FetchKind::Clone),
            Some(1)
        );
        assert_eq!(
            fetch_depth("git@example.com:team/store.git", FetchKind::Clone),
            Some(1)
        );
        assert_eq!(fetch_depth("/tmp/store", FetchKind::Clone), None);

        // pulls from a shallow clone negotiate from the existing boundary
        assert_eq!(
            fetch_depth("https://example.com/store.git", FetchKind::Pull),
            None
        );
        assert_eq!(
            fetch_depth("ssh://git@example.com/store.git", FetchKind::Pull),
            None
        );
    }

    #[test]
    fn credentials_are_not_printed() {
        let credentials = GitCredentials {
            username: "bot".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", credentials).contains("hunter2"));
    }

    #[test]
    fn clone_checks_out_the_store() {
        let remote_dir = tempfile::tempdir().unwrap();
        init_store_remote(remote_dir.path());
        let target = tempfile::tempdir().unwrap();

        let repo = Repository::clone(
            &url_of(remote_dir.path()),
            target.path(),
            &GitCredentials::default(),
        )
        .unwrap();

        assert_eq!(repo.base_path(), target.path());
        assert!(target.path().join(".gpg-id").exists());
        assert!(target.path().join("mail.gpg").exists());
    }

    #[test]
    fn pull_fast_forwards_then_reports_up_to_date() {
        let remote_dir = tempfile::tempdir().unwrap();
        let remote = init_store_remote(remote_dir.path());
        let target = tempfile::tempdir().unwrap();
        let credentials = GitCredentials::default();

        let repo =
            Repository::clone(&url_of(remote_dir.path()), target.path(), &credentials).unwrap();
        assert_eq!(repo.pull(&credentials).unwrap(), PullOutcome::UpToDate);

        std::fs::write(remote_dir.path().join("new.gpg"), "p3\n").unwrap();
        commit_all(&remote, "add new password");

        assert_eq!(repo.pull(&credentials).unwrap(), PullOutcome::FastForwarded);
        assert!(target.path().join("new.gpg").exists());
        assert_eq!(repo.pull(&credentials).unwrap(), PullOutcome::UpToDate);
    }

    #[test]
    fn clone_of_missing_remote_fails() {
        let target = tempfile::tempdir().unwrap();
        let err = Repository::clone(
            "/nonexistent/store",
            &target.path().join("clone"),
            &GitCredentials::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::GitError(_)));
    }
}
