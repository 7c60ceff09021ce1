use std::{
    fs,
    path::{Path, PathBuf},
};

use driverman_registry::CatalogEntry;
use driverman_utils::fs::{move_path, set_executable};
use tracing::{debug, info};

use crate::{
    error::{DrivermanError, ErrorContext, Result},
    marker::VersionMarker,
};

/// How the extracted files are placed in the install directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// A single directory, moved to `<id>`.
    Directory,
    /// A single file, moved to `<id>[.exe]` and made executable.
    File,
    /// Anything else; the whole extraction directory becomes `<id>`.
    Tree,
}

#[derive(Debug, Clone)]
pub struct Installer {
    install_dir: PathBuf,
}

impl Installer {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn marker(&self, entry: &CatalogEntry) -> VersionMarker {
        VersionMarker::for_entry(&self.install_dir, entry)
    }

    /// The installed file or directory for `entry`, if any.
    pub fn installed_path(&self, entry: &CatalogEntry) -> Option<PathBuf> {
        [entry.file_name(), entry.id()]
            .into_iter()
            .map(|name| self.install_dir.join(name))
            .find(|path| path.exists())
    }

    /// True when nothing is installed for `entry` or the installed marker records a different
    /// entry.
    pub fn needs_installation(&self, entry: &CatalogEntry) -> Result<bool> {
        if self.installed_path(entry).is_none() {
            debug!("{} is not installed", entry.id());
            return Ok(true);
        }
        Ok(!self.marker(entry).matches(entry)?)
    }

    /// Moves the content of `extracted` into the install directory and records the version
    /// marker. Returns the installed path.
    pub fn install(&self, entry: &CatalogEntry, extracted: &Path) -> Result<PathBuf> {
        let id = entry.id();
        let children = read_children(extracted)
            .with_context(|| format!("reading extracted files of {id}"))?;

        let (layout, source, dest) = match children.as_slice() {
            [] => {
                return Err(DrivermanError::NothingToInstall {
                    driver: id,
                    path: extracted.to_path_buf(),
                })
            }
            [only] if only.is_dir() => (Layout::Directory, only.as_path(), self.install_dir.join(&id)),
            [only] => (Layout::File, only.as_path(), self.install_dir.join(entry.file_name())),
            _ => (Layout::Tree, extracted, self.install_dir.join(&id)),
        };

        debug!(
            "installing {} as {:?}: {} -> {}",
            id,
            layout,
            source.display(),
            dest.display()
        );

        let install_err = |source| {
            DrivermanError::InstallFailed {
                driver: id.clone(),
                source,
            }
        };
        move_path(source, &dest).map_err(install_err)?;
        if layout == Layout::File {
            set_executable(&dest).map_err(install_err)?;
        }

        self.marker(entry).write(entry)?;
        info!("installed {} to {}", id, dest.display());
        Ok(dest)
    }
}

fn read_children(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut children = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    children.sort();
    Ok(children)
}
