use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

const GPG_ID_FILE: &str = ".gpg-id";
const ENTRY_EXTENSION: &str = "gpg";

/// A gopass/pass compatible password store rooted at a checked out directory.
///
/// Every `*.gpg` file below the root is an entry named by its relative path
/// without extension. Each store carries its own root and gpg binary, so
/// several stores can be open in one process.
#[derive(Clone, Debug)]
pub struct GopassStore {
    root: PathBuf,
    gpg_binary: PathBuf,
}

impl GopassStore {
    pub fn open(root: &Path, gpg_binary: impl Into<PathBuf>) -> Result<Self> {
        if !root.join(GPG_ID_FILE).is_file() {
            return Err(Error::NotFound(format!(
                "password store ({} in '{}')",
                GPG_ID_FILE,
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
            gpg_binary: gpg_binary.into(),
        })
    }

    /// Names of all entries, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        let mut names = tokio::task::spawn_blocking(move || {
            let mut names = Vec::new();
            collect_entries(&root, &root, &mut names)?;
            Ok::<_, std::io::Error>(names)
        })
        .await??;
        names.sort();
        Ok(names)
    }

    /// Decrypts `name` and returns the password, i.e. the first line of the plaintext.
    pub async fn get(&self, name: &str) -> Result<String> {
        let path = self.entry_path(name)?;
        debug!(name, "decrypting password");

        let output = Command::new(&self.gpg_binary)
            .args(["--quiet", "--batch", "--decrypt"])
            .arg(&path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::DecryptionFailed {
                name: name.to_string(),
                message: format!("unable to run {}: {}", self.gpg_binary.display(), e),
            })?;

        if !output.status.success() {
            return Err(Error::DecryptionFailed {
                name: name.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let plaintext = String::from_utf8_lossy(&output.stdout);
        Ok(plaintext.lines().next().unwrap_or_default().to_string())
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(Error::NotFound(format!("password '{}'", name)));
        }
        let path = self.root.join(format!("{}.{}", name, ENTRY_EXTENSION));
        if !path.is_file() {
            return Err(Error::NotFound(format!("password '{}'", name)));
        }
        Ok(path)
    }
}

fn collect_entries(root: &Path, dir: &Path, names: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = entry.file_name();
        // .git, .gpg-id, .public-keys, ...
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_entries(root, &path, names)?;
        } else if file_type.is_file()
            && path.extension().map_or(false, |ext| ext == ENTRY_EXTENSION)
        {
            let without_extension = path.with_extension("");
            if let Ok(relative) = without_extension.strip_prefix(root) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                names.push(name);
            }
        }
    }
    Ok(())
}
