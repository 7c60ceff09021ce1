//! Error types for the registry crate.

use driverman_dl::error::DownloadError;
use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur while loading a catalog or resolving a query against it.
#[derive(Error, Diagnostic, Debug)]
pub enum RegistryError {
    #[error("Invalid driver request: {reason}")]
    #[diagnostic(
        code(driverman_registry::invalid_request),
        help("Every driver needs at least a name")
    )]
    InvalidRequest { reason: String },

    #[error("No catalog entry matches {query}")]
    #[diagnostic(
        code(driverman_registry::not_found),
        help("Explicit platform, bit and version values must exist in the catalog as written")
    )]
    NotFound { query: String },

    #[error("Failed to fetch catalog from {url}: HTTP {status}")]
    #[diagnostic(
        code(driverman_registry::fetch),
        help("Verify the repository URL is correct and accessible")
    )]
    CatalogFetch { url: String, status: u16 },

    #[error("Catalog at {source_name} contains no drivers")]
    #[diagnostic(
        code(driverman_registry::empty_catalog),
        help("The catalog must be a JSON array of drivers or an object with a `drivers` array")
    )]
    EmptyCatalog { source_name: String },

    #[error("Invalid file pattern `{pattern}`")]
    #[diagnostic(code(driverman_registry::invalid_pattern))]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    #[diagnostic(
        code(driverman_registry::json),
        help("The catalog may be corrupted or in an invalid format")
    )]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    DownloadError(#[from] DownloadError),

    #[error("Error while {action}: {source}")]
    #[diagnostic(code(driverman_registry::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },
}

/// A specialized Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Extension trait for adding context to I/O errors.
pub trait ErrorContext<T> {
    /// Adds context to an error, describing what action was being performed.
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
            RegistryError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::NotFound {
            query: "chromedriver platform=windows bit=64".into(),
        };
        assert_eq!(
            err.to_string(),
            "No catalog entry matches chromedriver platform=windows bit=64"
        );

        let err = RegistryError::CatalogFetch {
            url: "https://example.com/repo.json".into(),
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "Failed to fetch catalog from https://example.com/repo.json: HTTP 503"
        );
    }

    #[test]
    fn test_with_context() {
        let result: std::io::Result<()> = Err(std::io::Error::other("boom"));
        let err = result.with_context(|| "reading catalog".into()).unwrap_err();
        assert_eq!(err.to_string(), "Error while reading catalog: boom");
    }
}
