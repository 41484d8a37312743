//! Pull-based OTA firmware updates for ESP32.
//!
//! A device periodically fetches a JSON manifest listing firmware builds,
//! picks the first entry meant for it whose version qualifies, and streams
//! that image into the next OTA partition.
//!
//! Everything except `ota::manager`, `network::esp_http` and the NVS parts
//! of `config` is hardware-independent and runs in host tests.
//!
//! ```ignore
//! use esp32_ota_pull::{config, DeviceIdentity, OtaManager, OtaPull, EspTransport, TransportTrust};
//!
//! let identity = DeviceIdentity::builder().current_version("1.4.0").build()?;
//! let mut ota = OtaPull::builder(EspTransport::new(), identity)
//!     .trust(TransportTrust::new().use_certificate_bundle())
//!     .on_progress(|done, total| log::info!("{done}/{total:?}"))
//!     .build();
//! let outcome = ota.check_for_update("https://ota.example.com/manifest.json", &mut OtaManager::new()?);
//! esp32_ota_pull::restart_if_requested(outcome);
//! ```

pub mod config;
pub mod identity;
pub mod logging;
pub mod manifest;
pub mod matcher;
pub mod network;
pub mod orchestrator;
pub mod ota;
pub mod outcome;
pub mod system;
pub mod trust;
pub mod version;

pub use config::{OtaPullConfig, UpdateAction, UpdatePolicy};
pub use identity::DeviceIdentity;
pub use manifest::{Manifest, ManifestProfile};
pub use matcher::{match_profile, MatchReport, MatchResult};
pub use network::{ByteStream, HttpResponse, Transport};
pub use orchestrator::{restart_if_requested, OtaPull, OtaPullBuilder};
pub use ota::{FlashUpdate, FlashUpdateSink, TransferOutcome};
pub use outcome::UpdateOutcome;
pub use trust::{TransportHandle, TransportTrust};
pub use version::{Lexicographic, Semantic, VersionComparator};

#[cfg(target_os = "espidf")]
pub use network::EspTransport;
#[cfg(target_os = "espidf")]
pub use ota::OtaManager;
