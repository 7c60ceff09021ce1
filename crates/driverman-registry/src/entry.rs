//! Catalog entries and queries.

use std::{fmt, str::FromStr};

use driverman_config::driver::DriverSpec;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{RegistryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Mac,
    Linux,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Mac => "mac",
            Self::Linux => "linux",
        }
    }
}

impl FromStr for Platform {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" => Ok(Self::Windows),
            "mac" => Ok(Self::Mac),
            "linux" => Ok(Self::Linux),
            other => {
                Err(RegistryError::InvalidRequest {
                    reason: format!("unknown platform `{other}`, expected windows, mac or linux"),
                })
            }
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bit {
    #[serde(rename = "32")]
    B32,
    #[serde(rename = "64")]
    B64,
}

impl Bit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::B32 => "32",
            Self::B64 => "64",
        }
    }
}

impl FromStr for Bit {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "32" => Ok(Self::B32),
            "64" => Ok(Self::B64),
            other => {
                Err(RegistryError::InvalidRequest {
                    reason: format!("unknown bit `{other}`, expected 32 or 64"),
                })
            }
        }
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architecture of a driver build. The declaration order is the ranking order used when
/// several builds only differ in architecture.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X86,
    Amd64,
    Arm64,
    Ia64,
    #[default]
    Unknown,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::Ia64 => "ia64",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::Unknown
    }
}

impl FromStr for Architecture {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x86" | "i386" | "i686" => Ok(Self::X86),
            "amd64" | "x86_64" | "x64" => Ok(Self::Amd64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "ia64" => Ok(Self::Ia64),
            "unknown" | "" => Ok(Self::Unknown),
            other => {
                Err(RegistryError::InvalidRequest {
                    reason: format!("unknown architecture `{other}`"),
                })
            }
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fetchable driver build as listed in a catalog.
///
/// The serialized form doubles as the version marker written next to an installed driver, so
/// the field order here is part of the on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub name: String,

    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub platform: Option<Platform>,

    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub bit: Option<Bit>,

    #[serde(
        default,
        alias = "arch",
        deserialize_with = "lenient_architecture",
        skip_serializing_if = "Architecture::is_unknown"
    )]
    pub architecture: Architecture,

    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,

    #[serde(default)]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_match_inside: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_file_name: Option<String>,
}

impl CatalogEntry {
    /// Install identity: `customFileName` when set, otherwise
    /// `name[-platform][-<bit>bit]`. Version and architecture are not part of it, so a newer
    /// build installs over the previous one.
    pub fn id(&self) -> String {
        if let Some(custom) = non_blank(self.custom_file_name.as_deref()) {
            return custom.to_string();
        }

        let mut id = self.name.trim().to_string();
        if let Some(platform) = self.platform {
            id.push('-');
            id.push_str(platform.as_str());
        }
        if let Some(bit) = self.bit {
            id.push('-');
            id.push_str(bit.as_str());
            id.push_str("bit");
        }
        id
    }

    /// File name of an installed single-file driver.
    pub fn file_name(&self) -> String {
        match self.platform {
            Some(Platform::Windows) => format!("{}.exe", self.id()),
            _ => self.id(),
        }
    }

    /// Key of the download cache entry. Independent of the URL.
    pub fn cache_key(&self) -> String {
        let mut key = self.name.trim().to_string();
        for part in [
            self.platform.map(|p| p.as_str()),
            self.bit.map(|b| b.as_str()),
            non_blank(self.version.as_deref()),
        ]
        .into_iter()
        .flatten()
        {
            key.push('-');
            key.push_str(part);
        }
        key
    }

    /// Canonical serialization stored in the version marker.
    pub fn to_marker(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Compiles `fileMatchInside`. The pattern has to match the whole in-archive path.
    pub fn file_pattern(&self) -> Result<Option<Regex>> {
        let Some(pattern) = non_blank(self.file_match_inside.as_deref()) else {
            return Ok(None);
        };

        Regex::new(&format!("^(?:{pattern})$"))
            .map(Some)
            .map_err(|source| {
                RegistryError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                }
            })
    }
}

/// What the caller wants installed. Only `name` is required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub name: String,
    pub platform: Option<Platform>,
    pub bit: Option<Bit>,
    pub arch: Option<Architecture>,
    pub version: Option<String>,
    pub url: Option<String>,
    pub file_match_inside: Option<String>,
    pub custom_file_name: Option<String>,
}

impl Query {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn bit(mut self, bit: Bit) -> Self {
        self.bit = Some(bit);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Turns a query that already names its download location into an entry as is.
    pub fn to_entry(&self) -> CatalogEntry {
        CatalogEntry {
            name: self.name.trim().to_string(),
            platform: self.platform,
            bit: self.bit,
            architecture: self.arch.unwrap_or_default(),
            version: self.version.clone(),
            url: self.url.clone().unwrap_or_default(),
            file_match_inside: self.file_match_inside.clone(),
            custom_file_name: self.custom_file_name.clone(),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(platform) = self.platform {
            write!(f, " platform={platform}")?;
        }
        if let Some(bit) = self.bit {
            write!(f, " bit={bit}")?;
        }
        if let Some(arch) = self.arch {
            write!(f, " arch={arch}")?;
        }
        if let Some(version) = non_blank(self.version.as_deref()) {
            write!(f, " version={version}")?;
        }
        Ok(())
    }
}

impl TryFrom<&DriverSpec> for Query {
    type Error = RegistryError;

    fn try_from(spec: &DriverSpec) -> Result<Self> {
        fn parse<T: FromStr<Err = RegistryError>>(value: Option<&str>) -> Result<Option<T>> {
            non_blank(value).map(str::parse::<T>).transpose()
        }

        Ok(Self {
            name: spec.name.trim().to_string(),
            platform: parse(spec.platform.as_deref())?,
            bit: parse(spec.bit.as_deref())?,
            arch: parse(spec.arch.as_deref())?,
            version: non_blank(spec.version.as_deref()).map(String::from),
            url: non_blank(spec.url.as_deref()).map(String::from),
            file_match_inside: non_blank(spec.file_match_inside.as_deref()).map(String::from),
            custom_file_name: non_blank(spec.custom_file_name.as_deref()).map(String::from),
        })
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

impl StringOrNumber {
    fn into_string(self) -> String {
        match self {
            Self::String(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<StringOrNumber> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(StringOrNumber::into_string)
        .filter(|s| !s.trim().is_empty()))
}

/// Unrecognized values are treated as unset rather than failing the whole catalog.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw = string_or_number(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

fn lenient_architecture<'de, D>(deserializer: D) -> std::result::Result<Architecture, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}
