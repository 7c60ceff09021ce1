use std::path::PathBuf;

use driverman_utils::error::FileSystemError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DownloadError {
    #[error("Invalid URL: {url}")]
    #[diagnostic(code(driverman_dl::invalid_url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid proxy `{proxy}`: {reason}")]
    #[diagnostic(
        code(driverman_dl::invalid_proxy),
        help("Use the form http://host:port")
    )]
    InvalidProxy { proxy: String, reason: String },

    #[error(transparent)]
    #[diagnostic(
        code(driverman_dl::network),
        help("Check your internet connection or try again later")
    )]
    Network(#[from] Box<ureq::Error>),

    #[error("HTTP {status}: {url}")]
    #[diagnostic(code(driverman_dl::http_error))]
    HttpError { status: u16, url: String },

    #[error("Error while {action}")]
    #[diagnostic(code(driverman_dl::io))]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    FileSystem(#[from] FileSystemError),

    #[error("Giving up on {url} after {attempts} attempt(s){}", .status.map(|s| format!(", last status {s}")).unwrap_or_default())]
    #[diagnostic(
        code(driverman_dl::retries_exhausted),
        help("Check that the URL is reachable and that the proxy settings are correct")
    )]
    RetriesExhausted {
        url: String,
        attempts: u32,
        status: Option<u16>,
        #[source]
        last: Box<DownloadError>,
    },
}

impl DownloadError {
    /// HTTP status carried by this error, looking through exhausted retries.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpError { status, .. } => Some(*status),
            Self::RetriesExhausted { status, .. } => *status,
            Self::Network(err) => {
                match err.as_ref() {
                    ureq::Error::StatusCode(status) => Some(*status),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl From<ureq::Error> for DownloadError {
    fn from(e: ureq::Error) -> Self {
        Self::Network(Box::new(e))
    }
}

#[derive(Error, Diagnostic, Debug)]
pub enum ArchiveError {
    #[error("Failed to {action} `{}`: {source}", .path.display())]
    #[diagnostic(code(driverman_dl::archive::io))]
    Io {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed zip archive `{}`: {source}", .path.display())]
    #[diagnostic(
        code(driverman_dl::archive::zip),
        help("The download may be truncated. Remove it from the cache and try again")
    )]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Entry `{entry}` in `{}` escapes the extraction directory", .archive.display())]
    #[diagnostic(
        code(driverman_dl::archive::path_traversal),
        help("The archive is unsafe and was not extracted")
    )]
    PathTraversal { archive: PathBuf, entry: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    FileSystem(#[from] FileSystemError),
}
