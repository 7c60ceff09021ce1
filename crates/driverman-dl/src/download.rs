use std::{
    fs::File,
    io::{Read as _, Write as _},
    path::{Path, PathBuf},
    thread::sleep,
};

use driverman_utils::fs::{ensure_dir_exists, safe_remove};
use tracing::{debug, warn};
use ureq::{
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH},
        Response,
    },
    Body,
};
use url::Url;

use crate::{
    error::DownloadError,
    http_client::HttpClient,
    types::{Progress, RetryPolicy},
    utils::{filename_from_header, filename_from_url},
};

const FALLBACK_FILENAME: &str = "download";

pub struct Download {
    pub url: String,
    pub output_dir: PathBuf,
    pub retry: RetryPolicy,
    pub on_progress: Option<Box<dyn Fn(Progress) + Send + Sync>>,
}

impl Download {
    /// Creates a new `Download` for the given URL writing into the current directory with the
    /// default [`RetryPolicy`].
    ///
    /// # Examples
    ///
    /// ```
    /// use driverman_dl::download::Download;
    ///
    /// let dl = Download::new("https://example.com/chromedriver_linux64.zip")
    ///     .output_dir("/tmp/driverman");
    /// assert_eq!(dl.retry.attempts, 3);
    /// ```
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            output_dir: PathBuf::from("."),
            retry: RetryPolicy::default(),
            on_progress: None,
        }
    }

    /// Sets the directory the downloaded file is written into. The file name is taken from
    /// the `Content-Disposition` header, then from the URL.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Registers a progress callback invoked with `Progress::Starting`, `Progress::Chunk` and
    /// `Progress::Complete` during each attempt.
    pub fn progress<F>(mut self, on_progress: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    /// Performs the download and returns the path of the written file.
    ///
    /// Every failure (transport error, non-2xx status, local write error) consumes one attempt
    /// from the retry budget; attempts are separated by the policy's fixed delay. Once the
    /// budget is spent the last failure is returned wrapped in
    /// [`DownloadError::RetriesExhausted`].
    pub fn execute(&self, client: &HttpClient) -> Result<PathBuf, DownloadError> {
        Url::parse(&self.url).map_err(|source| {
            DownloadError::InvalidUrl {
                url: self.url.clone(),
                source,
            }
        })?;
        ensure_dir_exists(&self.output_dir)?;

        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(client) {
                Ok(path) => return Ok(path),
                Err(err) if attempt < attempts => {
                    warn!(
                        "download of {} failed (attempt {}/{}): {}",
                        self.url, attempt, attempts, err
                    );
                    sleep(self.retry.delay);
                    attempt += 1;
                }
                Err(err) => {
                    return Err(DownloadError::RetriesExhausted {
                        url: self.url.clone(),
                        attempts,
                        status: err.status(),
                        last: Box::new(err),
                    });
                }
            }
        }
    }

    fn attempt(&self, client: &HttpClient) -> Result<PathBuf, DownloadError> {
        debug!("GET {}", self.url);
        let resp = client.get(&self.url)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::HttpError {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let filename = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(filename_from_header)
            .or_else(|| filename_from_url(&self.url))
            .unwrap_or_else(|| FALLBACK_FILENAME.to_string());
        let path = self.output_dir.join(filename);

        if let Err(err) = self.write_body(resp, &path) {
            if let Err(remove_err) = safe_remove(&path) {
                warn!("failed to remove partial download {}: {}", path.display(), remove_err);
            }
            return Err(err);
        }
        Ok(path)
    }

    fn write_body(&self, resp: Response<Body>, path: &Path) -> Result<(), DownloadError> {
        let total = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|h| h.to_str().ok())
            .and_then(|len| len.parse::<u64>().ok())
            .unwrap_or(0);

        if let Some(ref cb) = self.on_progress {
            cb(Progress::Starting {
                total,
            });
        }

        let io_err = |action: &str| {
            let action = format!("{action} {}", path.display());
            move |source: std::io::Error| {
                DownloadError::Io {
                    action,
                    source,
                }
            }
        };

        let mut file = File::create(path).map_err(io_err("creating"))?;
        let mut reader = resp.into_body().into_reader();
        let mut buffer = [0u8; 8192];
        let mut downloaded = 0u64;

        loop {
            let n = reader.read(&mut buffer).map_err(io_err("downloading into"))?;
            if n == 0 {
                break;
            }

            file.write_all(&buffer[..n])
                .map_err(io_err("writing"))?;
            downloaded += n as u64;

            if let Some(ref cb) = self.on_progress {
                cb(Progress::Chunk {
                    current: downloaded,
                    total,
                });
            }
        }

        file.flush().map_err(io_err("flushing"))?;

        if let Some(ref cb) = self.on_progress {
            cb(Progress::Complete {
                total: downloaded,
            });
        }

        Ok(())
    }
}
