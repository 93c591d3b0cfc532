use crate::error::{InstallError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Check that `dir` can be listed.
pub fn ensure_readable(dir: &Path) -> Result<()> {
    match std::fs::read_dir(dir) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(InstallError::PermissionDenied(
            format!("You don't have permission to read from '{}'.", dir.display()),
        )),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(InstallError::NotFound(format!(
            "Directory '{}' does not exist",
            dir.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Check that `target` can be written to, or created if it does not exist
/// yet. The nearest existing ancestor is probed by creating and removing a
/// temporary file in it.
pub fn ensure_writable(target: &Path) -> Result<()> {
    let existing = nearest_existing_ancestor(target)?;

    if !existing.is_dir() {
        return Err(InstallError::Config(format!(
            "'{}' exists and is not a directory",
            existing.display()
        )));
    }

    debug!("Probing write access in {}", existing.display());
    match tempfile::Builder::new()
        .prefix(".airdb-probe")
        .tempfile_in(&existing)
    {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(InstallError::PermissionDenied(
            format!("You don't have permission to write to '{}'.", existing.display()),
        )),
        Err(e) => Err(e.into()),
    }
}

fn nearest_existing_ancestor(target: &Path) -> Result<PathBuf> {
    let mut current = if target.as_os_str().is_empty() {
        std::env::current_dir()?
    } else {
        target.to_path_buf()
    };

    loop {
        if current.exists() {
            return Ok(current);
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent.to_path_buf(),
            _ => return Ok(std::env::current_dir()?),
        }
    }
}
