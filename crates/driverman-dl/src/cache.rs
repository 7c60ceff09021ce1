use std::{
    fs,
    path::{Path, PathBuf},
};

use driverman_utils::fs::{list_dir, safe_remove};
use tracing::{debug, trace};

use crate::{download::Download, error::DownloadError, http_client::HttpClient};

/// Written next to a cached download once it has been fully received.
pub const COMPLETE_MARKER: &str = ".download-complete";

/// On-disk cache of downloaded driver artifacts.
///
/// Each key owns one directory below the cache root holding the downloaded file and a
/// [`COMPLETE_MARKER`]. A directory without the marker is a leftover from an interrupted
/// download and is never served.
#[derive(Debug, Clone)]
pub struct DownloadCache {
    root: PathBuf,
}

impl DownloadCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the cached download for `key`.
    pub fn entry_dir(&self, key: &str) -> PathBuf {
        self.root.join(sanitize_key(key))
    }

    /// Returns the cached file for `key` if a complete download exists.
    pub fn cached_file(&self, key: &str) -> Option<PathBuf> {
        let dir = self.entry_dir(key);
        if !dir.join(COMPLETE_MARKER).is_file() {
            return None;
        }

        let mut files: Vec<PathBuf> = list_dir(&dir)
            .ok()?
            .into_iter()
            .filter(|p| p.file_name().is_some_and(|n| n != COMPLETE_MARKER))
            .collect();

        match files.len() {
            1 if files[0].is_file() => files.pop(),
            _ => None,
        }
    }

    /// Returns the cached file for `key`, downloading it first when no complete copy exists.
    pub fn fetch(
        &self,
        key: &str,
        download: Download,
        client: &HttpClient,
    ) -> Result<PathBuf, DownloadError> {
        if let Some(path) = self.cached_file(key) {
            debug!("using cached download {}", path.display());
            return Ok(path);
        }

        let dir = self.entry_dir(key);
        trace!("clearing cache entry {}", dir.display());
        safe_remove(&dir)?;

        let path = download.output_dir(&dir).execute(client)?;

        let marker = dir.join(COMPLETE_MARKER);
        fs::write(&marker, b"").map_err(|source| {
            DownloadError::Io {
                action: format!("writing {}", marker.display()),
                source,
            }
        })?;

        Ok(path)
    }

    /// Drops the cache entry for `key`.
    pub fn remove(&self, key: &str) -> Result<(), DownloadError> {
        Ok(safe_remove(self.entry_dir(key))?)
    }
}

fn sanitize_key(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        format!("_{sanitized}")
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;
    use crate::{http_client::ClientConfig, types::RetryPolicy};

    #[test]
    fn test_sanitize_key() {
        assert_eq!(
            sanitize_key("chromedriver-linux-64-2.9"),
            "chromedriver-linux-64-2.9"
        );
        assert_eq!(sanitize_key("a/b\\c d"), "a_b_c_d");
        assert_eq!(sanitize_key(".."), "_..");
        assert_eq!(sanitize_key(""), "_");
    }

    #[test]
    fn test_fetch_hits_network_once() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/chromedriver_linux64.zip")
            .with_status(200)
            .with_body("driver")
            .expect(1)
            .create();
        let dir = tempdir().unwrap();
        let cache = DownloadCache::new(dir.path());
        let client = ClientConfig::default().build().unwrap();
        let url = format!("{}/chromedriver_linux64.zip", server.url());

        let first = cache
            .fetch("chromedriver-linux-64-2.9", Download::new(&url), &client)
            .unwrap();
        let second = cache
            .fetch("chromedriver-linux-64-2.9", Download::new(&url), &client)
            .unwrap();

        assert_eq!(first, second);
        assert!(cache
            .entry_dir("chromedriver-linux-64-2.9")
            .join(COMPLETE_MARKER)
            .is_file());
        mock.assert();
    }

    #[test]
    fn test_incomplete_entry_is_not_served() {
        let dir = tempdir().unwrap();
        let cache = DownloadCache::new(dir.path());
        let entry = cache.entry_dir("geckodriver-linux-64-0.30.0");
        fs::create_dir_all(&entry).unwrap();
        fs::write(entry.join("geckodriver.tar.gz"), b"trunc").unwrap();

        assert!(cache.cached_file("geckodriver-linux-64-0.30.0").is_none());
    }

    #[test]
    fn test_incomplete_entry_is_replaced() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/geckodriver.tar.gz")
            .with_status(200)
            .with_body("full")
            .create();
        let dir = tempdir().unwrap();
        let cache = DownloadCache::new(dir.path());
        let client = ClientConfig::default().build().unwrap();
        let entry = cache.entry_dir("gecko");
        fs::create_dir_all(&entry).unwrap();
        fs::write(entry.join("stale.part"), b"x").unwrap();

        let path = cache
            .fetch(
                "gecko",
                Download::new(format!("{}/geckodriver.tar.gz", server.url())),
                &client,
            )
            .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "full");
        assert!(!entry.join("stale.part").exists());
        assert_eq!(cache.cached_file("gecko"), Some(path));
    }

    #[test]
    fn test_failed_fetch_leaves_no_marker() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/gone.zip").with_status(500).create();
        let dir = tempdir().unwrap();
        let cache = DownloadCache::new(dir.path());
        let client = ClientConfig::default().build().unwrap();

        let result = cache.fetch(
            "gone",
            Download::new(format!("{}/gone.zip", server.url()))
                .retry(RetryPolicy::new(1, Duration::ZERO)),
            &client,
        );

        assert!(result.is_err());
        assert!(!cache.entry_dir("gone").join(COMPLETE_MARKER).exists());
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let cache = DownloadCache::new(dir.path());
        let entry = cache.entry_dir("x");
        fs::create_dir_all(&entry).unwrap();

        cache.remove("x").unwrap();
        assert!(!entry.exists());
        cache.remove("x").unwrap();
    }
}
