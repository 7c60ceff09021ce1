//! Driver catalog handling for driverman.
//!
//! This crate models the entries of a driver catalog, compares driver versions, describes the
//! host the drivers are installed on and turns a partial [`Query`] into exactly one
//! [`CatalogEntry`].
//!
//! # Example
//!
//! ```
//! use driverman_registry::{Bit, Platform, Query, Repository, StaticEnvironment};
//!
//! let repo = Repository::from_json(
//!     r#"{"drivers": [
//!         {"name": "chromedriver", "platform": "linux", "bit": "64", "version": "2.9", "url": "https://example.com/a.zip"},
//!         {"name": "chromedriver", "platform": "linux", "bit": "64", "version": "70.0.3538.16", "url": "https://example.com/b.zip"}
//!     ]}"#,
//! )
//! .unwrap();
//!
//! let host = StaticEnvironment::new(Platform::Linux, Bit::B64);
//! let entry = repo.resolve(&Query::new("chromedriver"), &host).unwrap();
//! assert_eq!(entry.version.as_deref(), Some("70.0.3538.16"));
//! assert_eq!(entry.id(), "chromedriver-linux-64bit");
//! ```

pub mod entry;
pub mod environment;
pub mod error;
pub mod repository;
pub mod version;

pub use entry::{Architecture, Bit, CatalogEntry, Platform, Query};
pub use environment::{HostEnvironment, StaticEnvironment, SystemEnvironment};
pub use error::{ErrorContext, RegistryError, Result};
pub use repository::Repository;
pub use version::compare_versions;
