// Who this device is, as far as manifest matching is concerned

use core::fmt::Write;

use anyhow::Result;

/// Board name baked in at build time (see build.rs)
pub const BUILD_BOARD: &str = env!("OTA_PULL_BOARD");

/// Identity of the running device for one update attempt.
///
/// Built once at startup and passed by value; matching never looks up
/// defaults on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub board: String,
    pub device_id: String,
    pub config_tag: String,
    pub current_version: String,
}

impl DeviceIdentity {
    pub fn builder() -> IdentityBuilder {
        IdentityBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentityBuilder {
    board: Option<String>,
    device_id: Option<String>,
    config_tag: Option<String>,
    current_version: Option<String>,
}

impl IdentityBuilder {
    /// Override the build-time board name
    pub fn board(mut self, board: impl Into<String>) -> Self {
        self.board = Some(board.into());
        self
    }

    /// Override the hardware-derived device id (station MAC)
    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn config_tag(mut self, config_tag: impl Into<String>) -> Self {
        self.config_tag = Some(config_tag.into());
        self
    }

    pub fn current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = Some(version.into());
        self
    }

    /// Resolve defaults, reading the station MAC only when no device id was given.
    pub fn build(self) -> Result<DeviceIdentity> {
        if non_empty(&self.device_id).is_some() {
            return Ok(self.finish(String::new()));
        }
        let mac = crate::system::station_mac()?;
        Ok(self.build_with_mac(mac))
    }

    /// Resolve defaults using `mac` as the fallback device id
    pub fn build_with_mac(self, mac: [u8; 6]) -> DeviceIdentity {
        self.finish(format_mac(&mac).to_string())
    }

    fn finish(self, fallback_device: String) -> DeviceIdentity {
        // Empty overrides behave like unset ones
        DeviceIdentity {
            board: non_empty(&self.board).unwrap_or(BUILD_BOARD).to_string(),
            device_id: non_empty(&self.device_id)
                .map(str::to_string)
                .unwrap_or(fallback_device),
            config_tag: self.config_tag.unwrap_or_default(),
            current_version: self.current_version.unwrap_or_default(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Format a MAC the way device ids appear in manifests: `AA:BB:CC:DD:EE:FF`
pub fn format_mac(mac: &[u8; 6]) -> heapless::String<17> {
    let mut out = heapless::String::new();
    // Six hex pairs and five colons fill the 17 bytes exactly
    let written = write!(
        out,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
    debug_assert!(written.is_ok());
    out
}
