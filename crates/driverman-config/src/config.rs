use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use driverman_utils::path::{resolve_path, xdg_config_home, xdg_data_home};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    driver::DriverSpec,
    error::{ConfigError, Result},
};

pub const DEFAULT_REPOSITORY_URL: &str = "https://raw.githubusercontent.com/webdriverextensions/webdriverextensions-maven-plugin-repository/master/repository-3.0.json";

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30 * 60;

/// Application's configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Location of the driver catalog. May be an http(s) URL, a `file://` URL or a path.
    /// Default: the public webdriverextensions repository
    pub repository_url: Option<String>,

    /// Directory the drivers are installed into.
    /// Default: $XDG_DATA_HOME/driverman/drivers
    pub install_dir: Option<String>,

    /// Scratch directory for downloads and extraction.
    /// Default: <system temp>/driverman
    pub temp_dir: Option<String>,

    /// Keep downloaded archives in the temp directory after installing.
    /// Default: false
    pub keep_downloaded: Option<bool>,

    /// Do nothing at all.
    /// Default: false
    pub skip: Option<bool>,

    pub download: Option<DownloadConfig>,

    pub proxy: Option<ProxyConfig>,

    /// Drivers to install. When empty the latest driver of every kind available for
    /// the current platform is installed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drivers: Vec<DriverSpec>,
}

/// Network behaviour of the downloader.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Total number of attempts per download.
    /// Default: 3
    pub attempts: Option<u32>,

    /// Pause between attempts, in seconds.
    /// Default: 5
    pub retry_delay_secs: Option<u64>,

    /// Default: 30
    pub connect_timeout_secs: Option<u64>,

    /// Maximum time to wait for data, in seconds.
    /// Default: 1800
    pub read_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Proxy address, e.g. `http://proxy.local:3128`.
    pub url: String,

    /// Sent only after the proxy asks for authentication.
    pub username: Option<String>,

    pub password: Option<String>,
}

/// Fully defaulted download settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DownloadSettings {
    pub attempts: u32,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

/// Path of the configuration file: `$DRIVERMAN_CONFIG` or
/// `$XDG_CONFIG_HOME/driverman/config.toml`.
pub fn default_config_path() -> PathBuf {
    match std::env::var("DRIVERMAN_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("driverman").join("config.toml"),
    }
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            repository_url: Some(DEFAULT_REPOSITORY_URL.to_string()),
            install_dir: Some(format!(
                "{}/driverman/drivers",
                xdg_data_home().display()
            )),
            temp_dir: Some(
                std::env::temp_dir()
                    .join("driverman")
                    .to_string_lossy()
                    .into_owned(),
            ),
            keep_downloaded: Some(false),
            skip: Some(false),
            download: Some(DownloadConfig {
                attempts: Some(DEFAULT_ATTEMPTS),
                retry_delay_secs: Some(DEFAULT_RETRY_DELAY_SECS),
                connect_timeout_secs: Some(DEFAULT_CONNECT_TIMEOUT_SECS),
                read_timeout_secs: Some(DEFAULT_READ_TIMEOUT_SECS),
            }),
            proxy: None,
            drivers: Vec::new(),
        }
    }

    /// Loads the configuration from `path`, or from [`default_config_path`] when `None`.
    /// If the configuration file is not found, it uses the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);

        let config = match fs::read_to_string(&config_path) {
            Ok(content) => {
                debug!("loading configuration from {}", config_path.display());
                Self::from_toml(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "no configuration at {}, using defaults",
                    config_path.display()
                );
                Self::default_config()
            }
            Err(err) => {
                return Err(ConfigError::IoError {
                    path: config_path,
                    source: err,
                })
            }
        };

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<()> {
        if let Some(0) = self.download.as_ref().and_then(|d| d.attempts) {
            return Err(ConfigError::InvalidValue {
                field: "download.attempts",
                reason: "at least one attempt is required".into(),
            });
        }

        if let Some(spec) = self.drivers.iter().find(|d| d.name.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "drivers.name",
                reason: format!("driver entry without a name: {spec:?}"),
            });
        }

        if let Some(proxy) = &self.proxy {
            if proxy.url.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "proxy.url",
                    reason: "must not be empty".into(),
                });
            }
        }

        Ok(())
    }

    pub fn get_repository_url(&self) -> &str {
        self.repository_url
            .as_deref()
            .unwrap_or(DEFAULT_REPOSITORY_URL)
    }

    pub fn get_install_dir(&self) -> Result<PathBuf> {
        match &self.install_dir {
            Some(dir) => Ok(resolve_path(dir)?),
            None => Ok(xdg_data_home().join("driverman").join("drivers")),
        }
    }

    pub fn get_temp_dir(&self) -> Result<PathBuf> {
        match &self.temp_dir {
            Some(dir) => Ok(resolve_path(dir)?),
            None => Ok(std::env::temp_dir().join("driverman")),
        }
    }

    pub fn keep_downloaded(&self) -> bool {
        self.keep_downloaded.unwrap_or(false)
    }

    pub fn skip(&self) -> bool {
        self.skip.unwrap_or(false)
    }

    pub fn download_settings(&self) -> DownloadSettings {
        let download = self.download.clone().unwrap_or_default();
        DownloadSettings {
            attempts: download.attempts.unwrap_or(DEFAULT_ATTEMPTS).max(1),
            retry_delay: Duration::from_secs(
                download.retry_delay_secs.unwrap_or(DEFAULT_RETRY_DELAY_SECS),
            ),
            connect_timeout: Duration::from_secs(
                download
                    .connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            read_timeout: Duration::from_secs(
                download
                    .read_timeout_secs
                    .unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
            ),
        }
    }
}
