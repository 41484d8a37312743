use anyhow::Result;
use serde::{Deserialize, Serialize};

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};

use crate::identity::{DeviceIdentity, IdentityBuilder};

#[cfg(target_os = "espidf")]
const CONFIG_NAMESPACE: &str = "ota_pull";
#[cfg(target_os = "espidf")]
const CONFIG_KEY: &str = "config";

/// What to do once a manifest entry qualifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateAction {
    /// Report that an update exists, touch nothing
    DontDoUpdate,
    /// Install the image but keep running the old one until the next boot
    UpdateButNoBoot,
    /// Install and restart straight away
    UpdateAndBoot,
}

/// Per-attempt update policy, fixed before the attempt starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePolicy {
    pub allow_downgrades: bool,
    pub dry_run: bool,
    pub reboot_after_update: bool,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self::from_action(UpdateAction::UpdateAndBoot)
    }
}

impl UpdatePolicy {
    pub fn from_action(action: UpdateAction) -> Self {
        Self {
            allow_downgrades: false,
            dry_run: action == UpdateAction::DontDoUpdate,
            reboot_after_update: action == UpdateAction::UpdateAndBoot,
        }
    }

    pub fn with_downgrades(mut self, allow: bool) -> Self {
        self.allow_downgrades = allow;
        self
    }

    pub fn action(&self) -> UpdateAction {
        if self.dry_run {
            UpdateAction::DontDoUpdate
        } else if self.reboot_after_update {
            UpdateAction::UpdateAndBoot
        } else {
            UpdateAction::UpdateButNoBoot
        }
    }
}

/// Settings for periodic update checks, persisted across boots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtaPullConfig {
    pub manifest_url: String,

    // Identity overrides; empty means "use the built-in default"
    pub board: String,
    pub device_id: String,
    pub config_tag: String,

    pub policy: UpdatePolicy,
    pub check_interval_hours: u32,
}

impl Default for OtaPullConfig {
    fn default() -> Self {
        Self {
            manifest_url: String::new(),
            board: String::new(),
            device_id: String::new(),
            config_tag: String::new(),
            policy: UpdatePolicy::default(),
            check_interval_hours: 24,
        }
    }
}

impl OtaPullConfig {
    /// Identity builder pre-loaded with the configured overrides
    pub fn identity_builder(&self, current_version: &str) -> IdentityBuilder {
        DeviceIdentity::builder()
            .board(self.board.as_str())
            .device_id(self.device_id.as_str())
            .config_tag(self.config_tag.as_str())
            .current_version(current_version)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    #[cfg(target_os = "espidf")]
    pub fn save(&self) -> Result<()> {
        save_to_nvs(self)?;
        log::info!("OTA configuration saved to NVS");
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
pub fn load_or_default() -> Result<OtaPullConfig> {
    match load_from_nvs() {
        Ok(config) => {
            log::info!("Loaded OTA configuration from NVS");
            Ok(config)
        }
        Err(e) => {
            log::warn!("Failed to load OTA config from NVS: {:?}, using defaults", e);
            Ok(OtaPullConfig::default())
        }
    }
}

#[cfg(target_os = "espidf")]
fn load_from_nvs() -> Result<OtaPullConfig> {
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs = EspNvs::new(nvs_partition, CONFIG_NAMESPACE, true)?;

    let mut buf = vec![0u8; 1024];
    let data = nvs
        .get_blob(CONFIG_KEY, &mut buf)?
        .ok_or_else(|| anyhow::anyhow!("OTA config not found in NVS"))?;

    OtaPullConfig::from_json(data)
}

#[cfg(target_os = "espidf")]
fn save_to_nvs(config: &OtaPullConfig) -> Result<()> {
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let mut nvs = EspNvs::new(nvs_partition, CONFIG_NAMESPACE, false)?;

    nvs.set_blob(CONFIG_KEY, &config.to_json()?)?;

    Ok(())
}
