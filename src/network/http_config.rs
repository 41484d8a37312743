use core::time::Duration;

use anyhow::{bail, Result};
#[cfg(target_os = "espidf")]
use esp_idf_svc::http::client::{Configuration, FollowRedirectsPolicy};
#[cfg(target_os = "espidf")]
use esp_idf_svc::tls::X509;

use crate::trust::{PeerVerification, TransportHandle};

/// HTTP client receive buffer
pub const BUFFER_SIZE: usize = 4096;

/// Manifest documents are small; give up quickly
pub const MANIFEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-read timeout while streaming a firmware image
pub const FIRMWARE_TIMEOUT: Duration = Duration::from_secs(60);

/// esp-tls refuses to skip server verification unless the firmware is built
/// with `CONFIG_ESP_TLS_INSECURE` and `CONFIG_ESP_TLS_SKIP_SERVER_CERT_VERIFY`
pub const SKIP_VERIFY_SUPPORTED: bool = cfg!(esp_idf_esp_tls_skip_server_cert_verify);

/// Reject a handle the TLS stack cannot honour before opening a connection
pub fn ensure_supported(handle: &TransportHandle, skip_verify_supported: bool) -> Result<()> {
    if let TransportHandle::Tls(tls) = handle {
        if matches!(tls.verification, PeerVerification::SkipVerification) && !skip_verify_supported {
            bail!(
                "insecure TLS requested but the firmware lacks \
                 CONFIG_ESP_TLS_INSECURE and CONFIG_ESP_TLS_SKIP_SERVER_CERT_VERIFY"
            );
        }
    }
    Ok(())
}

/// PEM material in the `'static`, NUL-terminated form the ESP-IDF client wants
#[cfg(target_os = "espidf")]
pub struct StaticPems {
    pub server_ca: Option<&'static [u8]>,
    pub client_cert: Option<&'static [u8]>,
    pub client_key: Option<&'static [u8]>,
}

/// Build the HTTP client configuration for one request
#[cfg(target_os = "espidf")]
pub fn create_client_config(handle: &TransportHandle, pems: &StaticPems, timeout: Duration) -> Configuration {
    let mut config = Configuration {
        buffer_size: Some(BUFFER_SIZE),
        timeout: Some(timeout),
        follow_redirects_policy: FollowRedirectsPolicy::FollowAll,
        ..Default::default()
    };

    let TransportHandle::Tls(tls) = handle else {
        return config;
    };

    match tls.verification {
        PeerVerification::Anchor(_) => {
            config.server_certificate = pems.server_ca.map(X509::pem_until_nul);
        }
        PeerVerification::CertificateBundle => {
            config.crt_bundle_attach = Some(esp_idf_svc::sys::esp_crt_bundle_attach);
        }
        // No CA and no bundle; `ensure_supported` has already checked the build
        PeerVerification::SkipVerification => {}
    }

    if tls.client_identity.is_some() {
        config.client_certificate = pems.client_cert.map(X509::pem_until_nul);
        config.private_key = pems.client_key.map(X509::pem_until_nul);
    }

    config
}
