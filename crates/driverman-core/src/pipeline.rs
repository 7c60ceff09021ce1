//! The per-request install flow: resolve, download, extract, install.

use std::{
    cell::OnceCell,
    path::{Path, PathBuf},
    sync::Arc,
};

use driverman_config::{config::Config, driver::DriverSpec, error::ConfigError};
use driverman_dl::{
    archive::extract,
    cache::DownloadCache,
    download::Download,
    error::ArchiveError,
    http_client::{ClientConfig, HttpClient, ProxySettings},
    types::{Progress, RetryPolicy},
};
use driverman_registry::{CatalogEntry, HostEnvironment, Query, RegistryError, Repository};
use driverman_utils::fs::safe_remove;
use tracing::{debug, info, warn};

use crate::{
    error::{DrivermanError, Result},
    install::Installer,
};

const DOWNLOADS_DIR: &str = "downloads";
const EXTRACT_DIR: &str = "extract";

/// Callback receiving download progress together with the id of the driver being fetched.
pub type ProgressHandler = Arc<dyn Fn(&str, Progress) + Send + Sync>;

/// Result of processing one driver.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub entry: CatalogEntry,
    pub path: PathBuf,
    /// False when the installed copy was already current.
    pub installed: bool,
}

/// Builds the HTTP client described by the `[download]` and `[proxy]` settings.
pub fn build_client(config: &Config) -> Result<HttpClient> {
    let settings = config.download_settings();
    let proxy = config.proxy.as_ref().map(|p| {
        ProxySettings {
            url: p.url.clone(),
            username: p.username.clone(),
            password: p.password.clone(),
        }
    });

    ClientConfig {
        proxy,
        connect_timeout: Some(settings.connect_timeout),
        read_timeout: Some(settings.read_timeout),
        ..Default::default()
    }
    .build()
    .map_err(|err| {
        ConfigError::InvalidValue {
            field: "proxy.url",
            reason: err.to_string(),
        }
        .into()
    })
}

/// Installs every driver requested by `config`.
///
/// See [`Pipeline::run`].
pub fn run(
    config: &Config,
    env: &dyn HostEnvironment,
    client: &HttpClient,
) -> Result<Vec<InstallReport>> {
    Pipeline::new(config, env, client).run()
}

pub struct Pipeline<'a> {
    config: &'a Config,
    env: &'a dyn HostEnvironment,
    client: &'a HttpClient,
    progress: Option<ProgressHandler>,
    repository: OnceCell<Repository>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, env: &'a dyn HostEnvironment, client: &'a HttpClient) -> Self {
        Self {
            config,
            env,
            client,
            progress: None,
            repository: OnceCell::new(),
        }
    }

    pub fn progress(mut self, handler: ProgressHandler) -> Self {
        self.progress = Some(handler);
        self
    }

    /// Resolves and installs the configured drivers one after the other: each request is
    /// installed before the next one is resolved, and the first failure stops the run.
    /// Without configured drivers the newest build of every catalog driver available for the
    /// host is installed. Nothing happens when `skip` is set.
    pub fn run(&self) -> Result<Vec<InstallReport>> {
        if self.config.skip() {
            info!("skipping driver installation");
            return Ok(Vec::new());
        }

        let specs = &self.config.drivers;
        if specs.is_empty() {
            info!("no drivers configured, installing the latest of every driver");
            let entries = self.repository()?.latest_for_platform(self.env);
            return entries.iter().map(|entry| self.install_entry(entry)).collect();
        }

        let mut reports = Vec::with_capacity(specs.len());
        for spec in specs {
            let entry = self.resolve(spec)?;
            reports.push(self.install_entry(&entry)?);
        }
        Ok(reports)
    }

    /// Turns one configured request into a catalog entry. The catalog is loaded on the
    /// first request that needs it and reused afterwards.
    pub fn resolve(&self, spec: &DriverSpec) -> Result<CatalogEntry> {
        let query = Query::try_from(spec)
            .map_err(|source| DrivermanError::resolve(spec.name.trim(), source))?;

        let entry = if query.url.as_deref().is_some_and(|u| !u.trim().is_empty()) {
            query.to_entry()
        } else {
            self.repository()?
                .resolve(&query, self.env)
                .map_err(|source| DrivermanError::resolve(query.to_string(), source))?
        };
        debug!("{} resolved to {}", query, entry.url);
        Ok(entry)
    }

    fn repository(&self) -> Result<&Repository> {
        if let Some(repository) = self.repository.get() {
            return Ok(repository);
        }
        let repository = self.load_repository()?;
        Ok(self.repository.get_or_init(|| repository))
    }

    pub fn load_repository(&self) -> Result<Repository> {
        Repository::load(self.config.get_repository_url(), self.client).map_err(|source| {
            DrivermanError::Catalog {
                source,
            }
        })
    }

    /// Downloads, extracts and installs one resolved entry unless it is already current.
    pub fn install_entry(&self, entry: &CatalogEntry) -> Result<InstallReport> {
        let id = entry.id();
        let installer = Installer::new(self.config.get_install_dir()?);

        if !installer.needs_installation(entry)? {
            info!("{} {} is up to date", id, entry.version.as_deref().unwrap_or_default());
            let path = installer
                .installed_path(entry)
                .unwrap_or_else(|| installer.install_dir().join(entry.file_name()));
            return Ok(InstallReport {
                entry: entry.clone(),
                path,
                installed: false,
            });
        }

        if entry.url.trim().is_empty() {
            return Err(DrivermanError::InvalidRequest {
                driver: id,
                source: RegistryError::InvalidRequest {
                    reason: "no download url".into(),
                },
            });
        }
        let pattern = entry.file_pattern().map_err(|source| {
            DrivermanError::InvalidRequest {
                driver: id.clone(),
                source,
            }
        })?;

        let temp_dir = self.config.get_temp_dir()?;
        let cache = DownloadCache::new(temp_dir.join(DOWNLOADS_DIR));
        let cache_key = entry.cache_key();
        let archive = cache
            .fetch(&cache_key, self.download(entry, &id), self.client)
            .map_err(|source| {
                DrivermanError::DownloadFailed {
                    driver: id.clone(),
                    source,
                }
            })?;

        let extract_dir = temp_dir.join(EXTRACT_DIR).join(&id);
        let extract_err = |source: ArchiveError| {
            DrivermanError::ExtractionFailed {
                driver: id.clone(),
                source,
            }
        };
        safe_remove(&extract_dir).map_err(|e| extract_err(e.into()))?;
        extract(&archive, &extract_dir, pattern.as_ref()).map_err(extract_err)?;

        let path = installer.install(entry, &extract_dir)?;

        if !self.config.keep_downloaded() {
            self.cleanup(&cache, &cache_key, &extract_dir);
        }

        Ok(InstallReport {
            entry: entry.clone(),
            path,
            installed: true,
        })
    }

    fn download(&self, entry: &CatalogEntry, id: &str) -> Download {
        let settings = self.config.download_settings();
        let download = Download::new(entry.url.trim())
            .retry(RetryPolicy::new(settings.attempts, settings.retry_delay));

        match &self.progress {
            Some(handler) => {
                let handler = handler.clone();
                let id = id.to_string();
                download.progress(move |p| handler(&id, p))
            }
            None => download,
        }
    }

    fn cleanup(&self, cache: &DownloadCache, cache_key: &str, extract_dir: &Path) {
        if let Err(err) = cache.remove(cache_key) {
            warn!("failed to remove cached download: {}", err);
        }
        if let Err(err) = safe_remove(extract_dir) {
            warn!("failed to remove {}: {}", extract_dir.display(), err);
        }
    }
}
