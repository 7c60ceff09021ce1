//! Error types for driverman-core.

use std::{fmt, path::PathBuf};

use driverman_config::error::ConfigError;
use driverman_dl::error::{ArchiveError, DownloadError};
use driverman_registry::RegistryError;
use driverman_utils::error::FileSystemError;
use miette::Diagnostic;
use thiserror::Error;

/// Pipeline stage an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Download,
    Extract,
    Install,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Stage::Resolve => "resolve",
            Stage::Download => "download",
            Stage::Extract => "extract",
            Stage::Install => "install",
        };
        f.write_str(stage)
    }
}

/// Error returned by the install pipeline. Every per-driver variant names the driver it
/// belongs to.
#[derive(Error, Diagnostic, Debug)]
pub enum DrivermanError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to load the driver catalog")]
    #[diagnostic(
        code(driverman::catalog),
        help("Check the repository URL or pass another one with --repository")
    )]
    Catalog {
        #[source]
        source: RegistryError,
    },

    #[error("Invalid request for {driver}")]
    #[diagnostic(code(driverman::invalid_request))]
    InvalidRequest {
        driver: String,
        #[source]
        source: RegistryError,
    },

    #[error("Could not resolve {driver}")]
    #[diagnostic(
        code(driverman::not_found),
        help("Run `driverman list` to see the drivers available for this platform")
    )]
    NotFound {
        driver: String,
        #[source]
        source: RegistryError,
    },

    #[error("Failed to download {driver}")]
    #[diagnostic(code(driverman::download))]
    DownloadFailed {
        driver: String,
        #[source]
        source: DownloadError,
    },

    #[error("Failed to extract {driver}")]
    #[diagnostic(
        code(driverman::extract),
        help("The extraction directory was left in place for inspection")
    )]
    ExtractionFailed {
        driver: String,
        #[source]
        source: ArchiveError,
    },

    #[error("Failed to install {driver}")]
    #[diagnostic(
        code(driverman::install),
        help("The destination may be in use by a running process")
    )]
    InstallFailed {
        driver: String,
        #[source]
        source: FileSystemError,
    },

    #[error("Nothing to install for {driver}: `{}` is empty", .path.display())]
    #[diagnostic(
        code(driverman::nothing_to_install),
        help("Check `file_match_inside`, it may not match any file in the archive")
    )]
    NothingToInstall { driver: String, path: PathBuf },

    #[error("Failed to access version marker `{}` of {driver}", .path.display())]
    #[diagnostic(code(driverman::marker))]
    MarkerIoFailed {
        driver: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error while {action}")]
    #[diagnostic(code(driverman::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },
}

impl DrivermanError {
    /// Stage the failure happened in, when it is tied to a single driver.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::InvalidRequest { .. } | Self::NotFound { .. } => Some(Stage::Resolve),
            Self::DownloadFailed { .. } => Some(Stage::Download),
            Self::ExtractionFailed { .. } => Some(Stage::Extract),
            Self::InstallFailed { .. }
            | Self::NothingToInstall { .. }
            | Self::MarkerIoFailed { .. } => Some(Stage::Install),
            Self::Config(_) | Self::Catalog { .. } | Self::IoError { .. } => None,
        }
    }

    /// Driver the failure belongs to.
    pub fn driver(&self) -> Option<&str> {
        match self {
            Self::InvalidRequest { driver, .. }
            | Self::NotFound { driver, .. }
            | Self::DownloadFailed { driver, .. }
            | Self::ExtractionFailed { driver, .. }
            | Self::InstallFailed { driver, .. }
            | Self::NothingToInstall { driver, .. }
            | Self::MarkerIoFailed { driver, .. } => Some(driver),
            Self::Config(_) | Self::Catalog { .. } | Self::IoError { .. } => None,
        }
    }

    /// Sorts a resolution failure into a request error or a missing catalog entry.
    pub(crate) fn resolve(driver: impl Into<String>, source: RegistryError) -> Self {
        let driver = driver.into();
        match source {
            RegistryError::NotFound { .. } => {
                Self::NotFound {
                    driver,
                    source,
                }
            }
            source => {
                Self::InvalidRequest {
                    driver,
                    source,
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, DrivermanError>;

pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            DrivermanError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
