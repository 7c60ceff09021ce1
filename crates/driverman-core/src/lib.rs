//! Installs WebDriver binaries described by a driver catalog.
//!
//! The [`pipeline`] ties the other crates together: each request is resolved against the
//! catalog, downloaded into the cache, extracted and handed to the [`install::Installer`],
//! which records a [`marker::VersionMarker`] so unchanged drivers are skipped on the next run.

pub mod error;
pub mod install;
pub mod marker;
pub mod pipeline;

pub use error::{DrivermanError, ErrorContext, Result, Stage};
