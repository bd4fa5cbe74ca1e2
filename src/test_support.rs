//! Fixtures shared by unit tests: local git remotes and stand-in executables.

use std::path::{Path, PathBuf};

/// Writes an executable `/bin/sh` script and returns its path.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A gpg stand-in whose `--decrypt` prints the file unchanged and fails on
/// files containing `CORRUPT`.
#[cfg(unix)]
pub fn fake_gpg(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-gpg",
        "for arg; do file=$arg; done\n\
         if grep -q CORRUPT \"$file\"; then echo 'decryption failed: No secret key' >&2; exit 2; fi\n\
         cat \"$file\"\n",
    )
}

/// Creates a non-bare repository laid out as a password store.
pub fn init_store_remote(dir: &Path) -> git2::Repository {
    let repo = git2::Repository::init(dir).unwrap();
    {
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "John Doe").unwrap();
        config.set_str("user.email", "john@doe.org").unwrap();
    }
    std::fs::write(dir.join(".gpg-id"), "0xDEADBEEF\n").unwrap();
    std::fs::create_dir_all(dir.join("web")).unwrap();
    std::fs::write(dir.join("web/example com.gpg"), "p1\nuser: admin\n").unwrap();
    std::fs::write(dir.join("mail.gpg"), "p2\n").unwrap();
    commit_all(&repo, "initial password store");
    repo
}

/// Stages everything in the working tree and commits it on HEAD.
pub fn commit_all(repo: &git2::Repository, message: &str) -> git2::Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = git2::Signature::now("John Doe", "john@doe.org").unwrap();

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

pub fn url_of(dir: &Path) -> String {
    dir.to_string_lossy().into_owned()
}
