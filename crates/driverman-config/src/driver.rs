use serde::{Deserialize, Serialize};

/// A single install request as written in the configuration file or given on the command line.
///
/// Every field except `name` is optional; unset fields are filled in during resolution.
/// Values are kept as plain strings here and validated when the request is turned into a
/// catalog query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DriverSpec {
    /// Artifact name as listed in the catalog, e.g. `chromedriver`.
    pub name: String,

    /// One of `windows`, `mac` or `linux`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// `32` or `64`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit: Option<String>,

    /// One of `x86`, `amd64`, `arm64` or `ia64`. Only used for ranking candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Direct download location. When set the catalog is not consulted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Regular expression selecting the archive entries to install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_match_inside: Option<String>,

    /// Overrides the installed file or directory name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_file_name: Option<String>,
}

impl DriverSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}
