use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use driverman_registry::CatalogEntry;

use crate::error::{DrivermanError, Result};

pub const MARKER_EXTENSION: &str = "version";

/// The `<id>.version` file written next to an installed driver.
///
/// Its content is the pretty-printed serialization of the installed catalog entry and is
/// compared byte for byte against a freshly resolved entry.
#[derive(Debug, Clone)]
pub struct VersionMarker {
    driver: String,
    path: PathBuf,
}

impl VersionMarker {
    pub fn for_entry(install_dir: &Path, entry: &CatalogEntry) -> Self {
        let driver = entry.id();
        let path = install_dir.join(format!("{driver}.{MARKER_EXTENSION}"));
        Self {
            driver,
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current marker content, `None` when no marker exists.
    pub fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self.error(err)),
        }
    }

    /// Whether the marker records exactly `entry`.
    pub fn matches(&self, entry: &CatalogEntry) -> Result<bool> {
        let Some(current) = self.read()? else {
            return Ok(false);
        };
        Ok(current == self.render(entry)?)
    }

    pub fn write(&self, entry: &CatalogEntry) -> Result<()> {
        let content = self.render(entry)?;
        fs::write(&self.path, content).map_err(|err| self.error(err))
    }

    fn render(&self, entry: &CatalogEntry) -> Result<String> {
        entry.to_marker().map_err(|err| self.error(io::Error::from(err)))
    }

    fn error(&self, source: io::Error) -> DrivermanError {
        DrivermanError::MarkerIoFailed {
            driver: self.driver.clone(),
            path: self.path.clone(),
            source,
        }
    }
}
