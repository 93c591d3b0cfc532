use crate::error::{InstallError, Result};
use crate::utils::constants::{DATABASE_EXTENSION, DATA_DIR, LICENSE_EXTENSION};
use crate::utils::permissions::ensure_readable;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files that ship next to the installer: the template database, its
/// license and the directory of serialized measurements.
#[derive(Debug, Clone)]
pub struct BundleLayout {
    pub database: PathBuf,
    pub license: PathBuf,
    pub data_dir: PathBuf,
}

impl BundleLayout {
    /// Directory holding the running executable
    pub fn default_root() -> Result<PathBuf> {
        let exe = std::env::current_exe()?;
        let root = exe
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| InstallError::NotFound("Installer directory cannot be determined".to_string()))?;
        Ok(root)
    }

    pub fn resolve(root: &Path) -> Result<Self> {
        ensure_readable(root)?;

        let mut databases = Vec::new();
        let mut licenses = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match path.extension().and_then(|e| e.to_str()) {
                Some(DATABASE_EXTENSION) => databases.push(path),
                Some(LICENSE_EXTENSION) => licenses.push(path),
                _ => {}
            }
        }
        databases.sort();
        licenses.sort();

        let database = match databases.len() {
            0 => {
                return Err(InstallError::NotFound(
                    "Database cannot be found".to_string(),
                ))
            }
            1 => databases.remove(0),
            _ => {
                return Err(InstallError::AmbiguousBundle(format!(
                    "{} database files found in '{}'",
                    databases.len(),
                    root.display()
                )))
            }
        };

        let license = Self::pick_license(&database, licenses)?;

        let data_dir = root.join(DATA_DIR);
        if !data_dir.is_dir() {
            return Err(InstallError::NotFound(format!(
                "Data directory '{}' does not exist",
                data_dir.display()
            )));
        }

        debug!(
            "Bundle resolved: database={}, license={}, data={}",
            database.display(),
            license.display(),
            data_dir.display()
        );

        Ok(Self {
            database,
            license,
            data_dir,
        })
    }

    /// `<db stem>.LICENSE` wins; otherwise the bundle must hold exactly one
    /// license file.
    fn pick_license(database: &Path, mut candidates: Vec<PathBuf>) -> Result<PathBuf> {
        let expected = database.with_extension(LICENSE_EXTENSION);
        if let Some(pos) = candidates.iter().position(|c| *c == expected) {
            return Ok(candidates.swap_remove(pos));
        }

        match candidates.len() {
            0 => Err(InstallError::NotFound(format!(
                "{} does not exist",
                expected
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            ))),
            1 => {
                warn!(
                    "License file {} does not match the database name",
                    candidates[0].display()
                );
                Ok(candidates.remove(0))
            }
            n => Err(InstallError::AmbiguousBundle(format!(
                "{} license files found and none is named {}",
                n,
                expected.display()
            ))),
        }
    }

    pub fn license_text(&self) -> Result<String> {
        Ok(std::fs::read_to_string(&self.license)?)
    }

    pub fn database_file_name(&self) -> String {
        file_name_of(&self.database)
    }

    pub fn license_file_name(&self) -> String {
        file_name_of(&self.license)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
