//! Manifest document: the server-hosted list of candidate firmware builds.
//!
//! ```json
//! { "Configurations": [
//!     { "Board": "ESP32S3_DEV", "Device": "24:6F:28:0A:B1:FF", "Config": "beta",
//!       "Version": "1.2.0", "URL": "https://ota.example.com/fw-1.2.0.bin" }
//! ] }
//! ```
//!
//! `Board`, `Device`, `Config` and `Version` are optional; absent, `null` and
//! `""` all mean "matches anything". An absent or `null` `URL` reads as `""`
//! and only becomes an error if that entry is selected. A `null`
//! `Configurations` is an empty list.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Upper bound on the manifest body we are willing to buffer
pub const MAX_MANIFEST_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "Configurations", default, deserialize_with = "null_as_default")]
    pub profiles: Vec<ManifestProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestProfile {
    #[serde(rename = "Board", default, skip_serializing_if = "Option::is_none")]
    pub board: Option<String>,
    #[serde(rename = "Device", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(rename = "Config", default, skip_serializing_if = "Option::is_none")]
    pub config_tag: Option<String>,
    #[serde(rename = "Version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "URL", default, deserialize_with = "null_as_default")]
    pub binary_url: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl ManifestProfile {
    pub fn new(binary_url: impl Into<String>) -> Self {
        Self {
            binary_url: binary_url.into(),
            ..Default::default()
        }
    }

    pub fn board(mut self, board: impl Into<String>) -> Self {
        self.board = Some(board.into());
        self
    }

    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn config(mut self, config_tag: impl Into<String>) -> Self {
        self.config_tag = Some(config_tag.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Version string, `""` when unspecified
    pub fn version_str(&self) -> &str {
        self.version.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    TooLarge { limit: usize },
    Malformed(String),
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { limit } => write!(f, "manifest exceeds {} bytes", limit),
            Self::Malformed(reason) => write!(f, "manifest is not valid JSON: {}", reason),
        }
    }
}

impl std::error::Error for ManifestError {}

impl Manifest {
    pub fn parse(data: &[u8]) -> Result<Self, ManifestError> {
        if data.len() > MAX_MANIFEST_SIZE {
            return Err(ManifestError::TooLarge { limit: MAX_MANIFEST_SIZE });
        }
        serde_json::from_slice(data).map_err(|e| ManifestError::Malformed(e.to_string()))
    }
}

impl From<Vec<ManifestProfile>> for Manifest {
    fn from(profiles: Vec<ManifestProfile>) -> Self {
        Self { profiles }
    }
}
