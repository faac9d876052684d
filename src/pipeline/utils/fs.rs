//! File system helpers for pipeline stages.
//!
//! Safe copy/remove operations with automatic parent-directory creation
//! and symlink preservation. Symlink handling matters here: an app bundle
//! may legitimately contain symlinks (framework version links), and the
//! staging copy for the disk image must preserve them.

use crate::pipeline::error::{Error, Result};
use std::io;
use std::path::Path;
use tokio::fs;

/// Creates all of the directories of the specified path, erasing it first
/// if specified.
pub async fn create_dir_all(path: &Path, erase: bool) -> Result<()> {
    if erase && path.exists() {
        remove_dir_all(path).await?;
    }
    Ok(fs::create_dir_all(path).await?)
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(fs::remove_dir_all(path).await?)
    } else {
        Ok(())
    }
}

/// Removes a file if it exists.
pub async fn remove_file(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(fs::remove_file(path).await?)
    } else {
        Ok(())
    }
}

#[cfg(unix)]
fn symlink_any(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink_any(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        std::os::windows::fs::symlink_dir(src, dst)
    } else {
        std::os::windows::fs::symlink_file(src, dst)
    }
}

/// Copies a regular file from one path to another, creating any parent
/// directories of the destination path as necessary.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.exists() {
        return Err(Error::Generic(format!("{from:?} does not exist")));
    }
    if !from.is_file() {
        return Err(Error::Generic(format!("{from:?} is not a file")));
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir).await?;
    }
    fs::copy(from, to).await?;
    Ok(())
}

/// Recursively copies a directory from one path to another, creating any
/// parent directories of the destination path as necessary.
///
/// Preserves symlinks and file permissions (the bundle's executable bits
/// must survive the staging copy or the signature breaks on mount).
pub async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    if !from.exists() {
        return Err(Error::Generic(format!("{from:?} does not exist")));
    }
    if !from.is_dir() {
        return Err(Error::Generic(format!("{from:?} is not a directory")));
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).await?;
    }

    for entry in walkdir::WalkDir::new(from) {
        let entry = entry?;
        debug_assert!(entry.path().starts_with(from));
        let rel_path = entry.path().strip_prefix(from)?;
        let dest_path = to.join(rel_path);

        if entry.path_is_symlink() {
            let target = fs::read_link(entry.path()).await?;
            symlink_any(&target, &dest_path)?;
        } else if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path).await?;
        } else {
            fs::copy(entry.path(), &dest_path).await?;
            #[cfg(unix)]
            {
                let perms = fs::metadata(entry.path()).await?.permissions();
                fs::set_permissions(&dest_path, perms).await?;
            }
        }
    }

    Ok(())
}
