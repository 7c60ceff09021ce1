//! Catalog loading and query resolution.

use std::{fs, path::PathBuf};

use driverman_dl::{error::DownloadError, http_client::HttpClient};
use serde::Deserialize;
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    entry::{non_blank, Architecture, Bit, CatalogEntry, Platform, Query},
    environment::HostEnvironment,
    error::{ErrorContext, RegistryError, Result},
    version::{compare_versions, newest_first},
};

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    List(Vec<CatalogEntry>),
    Wrapped { drivers: Vec<CatalogEntry> },
}

/// A loaded driver catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    entries: Vec<CatalogEntry>,
}

impl Repository {
    /// Loads a catalog from an `http(s)://` URL, a `file://` URL or a filesystem path.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::CatalogFetch`] if the server answers with a non-success status
    /// * [`RegistryError::EmptyCatalog`] if the document lists no drivers
    /// * [`RegistryError::JsonError`] if the document is not a catalog
    pub fn load(source: &str, client: &HttpClient) -> Result<Self> {
        let content = if source.starts_with("http://") || source.starts_with("https://") {
            debug!("fetching catalog from {}", source);
            let resp = client.get(source)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(RegistryError::CatalogFetch {
                    url: source.to_string(),
                    status: status.as_u16(),
                });
            }
            resp.into_body()
                .read_to_string()
                .map_err(DownloadError::from)?
        } else {
            let path = local_path(source)?;
            debug!("reading catalog from {}", path.display());
            fs::read_to_string(&path)
                .with_context(|| format!("reading catalog {}", path.display()))?
        };

        Self::from_json(&content).map_err(|err| {
            match err {
                RegistryError::EmptyCatalog { .. } => {
                    RegistryError::EmptyCatalog {
                        source_name: source.to_string(),
                    }
                }
                other => other,
            }
        })
    }

    /// Parses a catalog document: either a JSON array of entries or an object with a
    /// `drivers` array. Entries without a name are dropped.
    pub fn from_json(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Err(RegistryError::EmptyCatalog {
                source_name: "<inline>".into(),
            });
        }

        let entries = match serde_json::from_str(content)? {
            CatalogDocument::List(entries) => entries,
            CatalogDocument::Wrapped { drivers } => drivers,
        };

        let before = entries.len();
        let entries: Vec<_> = entries
            .into_iter()
            .filter(|e| !e.name.trim().is_empty())
            .collect();
        if entries.len() != before {
            warn!("ignored {} catalog entries without a name", before - entries.len());
        }

        Self::from_entries(entries)
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(RegistryError::EmptyCatalog {
                source_name: "<inline>".into(),
            });
        }
        Ok(Self {
            entries,
        })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Resolves `query` to exactly one catalog entry.
    ///
    /// A query carrying a URL is returned as is. Explicit platform, bit and version values
    /// must match at least one entry verbatim. Unset platform and bit come from `env`, an
    /// unset version becomes the newest available one. A 64-bit query that finds nothing
    /// falls back to the 32-bit build. Among the remaining candidates the preferred
    /// architecture wins, then the newest version.
    pub fn resolve(&self, query: &Query, env: &dyn HostEnvironment) -> Result<CatalogEntry> {
        let name = query.name.trim();
        if name.is_empty() {
            return Err(RegistryError::InvalidRequest {
                reason: "driver name is blank".into(),
            });
        }

        if non_blank(query.url.as_deref()).is_some() {
            debug!("{} has an explicit url, skipping catalog lookup", name);
            return Ok(query.to_entry());
        }

        let version = non_blank(query.version.as_deref());
        let explicit = query.platform.is_some() || query.bit.is_some() || version.is_some();
        if explicit && !self.entries.iter().any(|e| matches_explicit(e, query)) {
            return Err(RegistryError::NotFound {
                query: query.to_string(),
            });
        }

        let platform = query.platform.unwrap_or_else(|| env.platform());
        let bit = query.bit.unwrap_or_else(|| env.default_bit(name));
        let arch = query.arch.unwrap_or_else(|| env.architecture());

        let found = self.select(name, platform, bit, version, arch).or_else(|| {
            (bit == Bit::B64)
                .then(|| {
                    debug!("no 64-bit {} for {}, trying 32-bit", name, platform);
                    self.select(name, platform, Bit::B32, version, arch)
                })
                .flatten()
        });

        let Some(found) = found else {
            let mut resolved = query.clone();
            resolved.platform = Some(platform);
            resolved.bit = Some(bit);
            return Err(RegistryError::NotFound {
                query: resolved.to_string(),
            });
        };

        let mut entry = found.clone();
        if let Some(custom) = non_blank(query.custom_file_name.as_deref()) {
            entry.custom_file_name = Some(custom.to_string());
        }
        if let Some(pattern) = non_blank(query.file_match_inside.as_deref()) {
            entry.file_match_inside = Some(pattern.to_string());
        }

        trace!("resolved {} to {:?}", query, entry);
        Ok(entry)
    }

    /// The newest build of every driver in the catalog that exists for the host. Drivers
    /// without a build for the host are left out.
    pub fn latest_for_platform(&self, env: &dyn HostEnvironment) -> Vec<CatalogEntry> {
        let mut names: Vec<&str> = Vec::new();
        for entry in &self.entries {
            let name = entry.name.trim();
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name);
            }
        }

        let mut latest: Vec<CatalogEntry> = names
            .into_iter()
            .filter_map(|name| {
                match self.resolve(&Query::new(name), env) {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        trace!("skipping {}: {}", name, err);
                        None
                    }
                }
            })
            .collect();

        latest.sort_by(|a, b| {
            a.id()
                .cmp(&b.id())
                .then_with(|| newest_first(a.version.as_deref(), b.version.as_deref()))
        });
        latest
    }

    fn select(
        &self,
        name: &str,
        platform: Platform,
        bit: Bit,
        version: Option<&str>,
        arch: Architecture,
    ) -> Option<&CatalogEntry> {
        let same_build =
            |e: &&CatalogEntry| matches_name(e, name) && e.platform == Some(platform) && e.bit == Some(bit);

        let version = match version {
            Some(v) => Some(v.to_string()),
            None => {
                self.entries
                    .iter()
                    .filter(same_build)
                    .filter_map(|e| non_blank(e.version.as_deref()))
                    .max_by(|a, b| compare_versions(a, b))
                    .map(String::from)
            }
        };

        let mut candidates: Vec<&CatalogEntry> = self
            .entries
            .iter()
            .filter(same_build)
            .filter(|e| {
                version
                    .as_deref()
                    .is_none_or(|v| matches_version(e, v))
            })
            .collect();

        candidates.sort_by(|a, b| {
            arch_rank(a.architecture, arch)
                .cmp(&arch_rank(b.architecture, arch))
                .then_with(|| newest_first(a.version.as_deref(), b.version.as_deref()))
        });
        candidates.into_iter().next()
    }
}

fn matches_name(entry: &CatalogEntry, name: &str) -> bool {
    entry.name.trim().eq_ignore_ascii_case(name)
}

fn matches_version(entry: &CatalogEntry, version: &str) -> bool {
    non_blank(entry.version.as_deref()).is_some_and(|v| v.eq_ignore_ascii_case(version))
}

/// Whether `entry` satisfies every key the query sets explicitly. An explicit 64-bit request
/// is also satisfied by a 32-bit build since resolution falls back to it.
fn matches_explicit(entry: &CatalogEntry, query: &Query) -> bool {
    let bit_ok = match query.bit {
        None => true,
        Some(Bit::B64) => entry.bit.is_some(),
        Some(bit) => entry.bit == Some(bit),
    };

    matches_name(entry, query.name.trim())
        && query.platform.is_none_or(|p| entry.platform == Some(p))
        && bit_ok
        && non_blank(query.version.as_deref()).is_none_or(|v| matches_version(entry, v))
}

fn arch_rank(arch: Architecture, preferred: Architecture) -> (bool, Architecture) {
    (arch != preferred, arch)
}

fn local_path(source: &str) -> Result<PathBuf> {
    if source.starts_with("file:") {
        let url = Url::parse(source).map_err(|err| {
            RegistryError::InvalidRequest {
                reason: format!("invalid catalog url `{source}`: {err}"),
            }
        })?;
        return url.to_file_path().map_err(|()| {
            RegistryError::InvalidRequest {
                reason: format!("catalog url `{source}` is not a local file"),
            }
        });
    }
    Ok(PathBuf::from(source))
}
