//! How the HTTP transport establishes trust with an HTTPS endpoint.
//!
//! `TransportTrust` is configured once, before any request. `configure`
//! turns it into a `TransportHandle` describing exactly what the transport
//! has to install for a given target. No I/O happens here.

use core::fmt;

use log::{debug, warn};

/// How the server's certificate chain is checked
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServerTrust {
    /// Nothing chosen yet. HTTPS requests are refused in this state.
    #[default]
    Unset,
    /// PEM root CA installed as the only trust anchor
    Anchored(String),
    /// The ESP-IDF built-in root certificate bundle
    CertificateBundle,
    /// Skip peer verification entirely. Explicit opt-in only.
    Insecure,
}

/// Client certificate and key for mutual TLS
#[derive(Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub certificate: String,
    pub private_key: String,
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("certificate", &format_args!("<{} bytes>", self.certificate.len()))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportTrust {
    server: ServerTrust,
    client_identity: Option<ClientIdentity>,
}

impl TransportTrust {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a PEM root CA. Leaves insecure mode.
    pub fn set_root_ca(mut self, root_ca: impl Into<String>) -> Self {
        self.server = ServerTrust::Anchored(root_ca.into());
        self
    }

    /// Trust whatever the firmware's certificate bundle trusts
    pub fn use_certificate_bundle(mut self) -> Self {
        self.server = ServerTrust::CertificateBundle;
        self
    }

    /// Skip certificate verification. NOT for production.
    ///
    /// Enabling drops any pinned CA; disabling only leaves the insecure
    /// mode, so a root CA or bundle has to be chosen again afterwards.
    ///
    /// On ESP-IDF the firmware must be built with `CONFIG_ESP_TLS_INSECURE`
    /// and `CONFIG_ESP_TLS_SKIP_SERVER_CERT_VERIFY`; otherwise every HTTPS
    /// request is refused before connecting and the check ends in `HttpFailed`.
    pub fn set_insecure(mut self, insecure: bool) -> Self {
        if insecure {
            self.server = ServerTrust::Insecure;
        } else if self.server == ServerTrust::Insecure {
            self.server = ServerTrust::Unset;
        }
        self
    }

    /// Present a client certificate, on top of whatever server trust is active
    pub fn set_client_certificate(
        mut self,
        certificate: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        self.client_identity = Some(ClientIdentity {
            certificate: certificate.into(),
            private_key: private_key.into(),
        });
        self
    }

    pub fn server(&self) -> &ServerTrust {
        &self.server
    }

    pub fn client_identity(&self) -> Option<&ClientIdentity> {
        self.client_identity.as_ref()
    }
}

/// What the transport must do for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportHandle {
    /// Plain HTTP, nothing to configure
    Plain,
    Tls(TlsSettings),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub verification: PeerVerification,
    pub client_identity: Option<ClientIdentity>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerVerification {
    Anchor(String),
    CertificateBundle,
    SkipVerification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustError {
    /// HTTPS target but no trust mode was chosen
    NoTrustAnchor,
}

impl fmt::Display for TrustError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTrustAnchor => write!(
                f,
                "HTTPS endpoint but no root CA, certificate bundle or explicit insecure mode configured"
            ),
        }
    }
}

impl std::error::Error for TrustError {}

/// True for `https://` URLs (scheme is case-insensitive)
pub fn is_encrypted(url: &str) -> bool {
    url.get(..8)
        .map(|scheme| scheme.eq_ignore_ascii_case("https://"))
        .unwrap_or(false)
}

/// Decide the transport's trust setup for a target.
///
/// Plain targets ignore `trust` entirely. Encrypted targets without a
/// chosen mode fail closed.
pub fn configure(trust: &TransportTrust, target_is_encrypted: bool) -> Result<TransportHandle, TrustError> {
    if !target_is_encrypted {
        return Ok(TransportHandle::Plain);
    }

    let verification = match &trust.server {
        ServerTrust::Unset => return Err(TrustError::NoTrustAnchor),
        ServerTrust::Anchored(ca) => {
            debug!("HTTPS: using provided root CA certificate");
            PeerVerification::Anchor(ca.clone())
        }
        ServerTrust::CertificateBundle => {
            debug!("HTTPS: using built-in certificate bundle");
            PeerVerification::CertificateBundle
        }
        ServerTrust::Insecure => {
            warn!("HTTPS: certificate verification DISABLED (insecure mode)");
            PeerVerification::SkipVerification
        }
    };

    if trust.client_identity.is_some() {
        debug!("HTTPS: using client certificate authentication");
    }

    Ok(TransportHandle::Tls(TlsSettings {
        verification,
        client_identity: trust.client_identity.clone(),
    }))
}

/// `configure` for a concrete URL
pub fn configure_for_url(trust: &TransportTrust, url: &str) -> Result<TransportHandle, TrustError> {
    configure(trust, is_encrypted(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CA: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

    #[test]
    fn test_plain_target_skips_trust() {
        let trust = TransportTrust::new().set_insecure(true);
        assert_eq!(configure(&trust, false), Ok(TransportHandle::Plain));
        assert_eq!(
            configure_for_url(&TransportTrust::new(), "http://ota.local/m.json"),
            Ok(TransportHandle::Plain)
        );
    }

    #[test]
    fn test_unset_trust_fails_closed() {
        assert_eq!(
            configure(&TransportTrust::new(), true),
            Err(TrustError::NoTrustAnchor)
        );
    }

    #[test]
    fn test_insecure_clears_ca() {
        let trust = TransportTrust::new().set_root_ca(CA).set_insecure(true);
        assert_eq!(trust.server(), &ServerTrust::Insecure);

        let handle = configure(&trust, true).unwrap();
        match handle {
            TransportHandle::Tls(tls) => {
                assert_eq!(tls.verification, PeerVerification::SkipVerification)
            }
            other => panic!("unexpected handle {:?}", other),
        }
    }

    #[test]
    fn test_root_ca_leaves_insecure() {
        let trust = TransportTrust::new().set_insecure(true).set_root_ca(CA);
        assert_eq!(trust.server(), &ServerTrust::Anchored(CA.to_string()));
    }

    #[test]
    fn test_disabling_insecure_keeps_ca() {
        let trust = TransportTrust::new().set_root_ca(CA).set_insecure(false);
        assert_eq!(trust.server(), &ServerTrust::Anchored(CA.to_string()));

        let trust = TransportTrust::new().set_insecure(true).set_insecure(false);
        assert_eq!(trust.server(), &ServerTrust::Unset);
    }

    #[test]
    fn test_client_identity_added_to_any_mode() {
        let trust = TransportTrust::new()
            .use_certificate_bundle()
            .set_client_certificate("CERT", "KEY");
        let handle = configure_for_url(&trust, "HTTPS://ota.example.com/fw.bin").unwrap();
        assert_eq!(
            handle,
            TransportHandle::Tls(TlsSettings {
                verification: PeerVerification::CertificateBundle,
                client_identity: Some(ClientIdentity {
                    certificate: "CERT".into(),
                    private_key: "KEY".into(),
                }),
            })
        );
    }

    #[test]
    fn test_client_identity_debug_is_redacted() {
        let trust = TransportTrust::new().set_client_certificate("CERT", "SECRET");
        let dbg = format!("{:?}", trust);
        assert!(!dbg.contains("SECRET"));
    }

    #[test]
    fn test_is_encrypted() {
        assert!(is_encrypted("https://a"));
        assert!(!is_encrypted("http://a"));
        assert!(!is_encrypted("http"));
    }
}
