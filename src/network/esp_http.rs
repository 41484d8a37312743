// Transport backed by the ESP-IDF HTTP client

use core::time::Duration;

use anyhow::{Context, Result};
use embedded_svc::http::Method;
use esp_idf_svc::http::client::EspHttpConnection;
use esp_idf_svc::io::Read;

use super::http_config::{create_client_config, ensure_supported, StaticPems, SKIP_VERIFY_SUPPORTED};
use super::transport::{ByteStream, HttpResponse, Transport};
use crate::trust::{PeerVerification, TransportHandle};

/// Opens a fresh connection per request so every request gets the TLS
/// setup its handle asks for.
#[derive(Default)]
pub struct EspTransport {
    // The client keeps raw pointers to PEM data, so it has to live forever.
    // Identical PEMs are leaked only once.
    pems: Vec<&'static [u8]>,
}

impl EspTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn static_pem(&mut self, pem: &str) -> &'static [u8] {
        let wanted = pem.trim_end_matches('\0').as_bytes();
        if let Some(existing) = self.pems.iter().copied().find(|p| &p[..p.len() - 1] == wanted) {
            return existing;
        }
        let mut owned = wanted.to_vec();
        owned.push(0);
        let leaked: &'static [u8] = Box::leak(owned.into_boxed_slice());
        self.pems.push(leaked);
        leaked
    }

    fn pems_for(&mut self, handle: &TransportHandle) -> StaticPems {
        let mut pems = StaticPems {
            server_ca: None,
            client_cert: None,
            client_key: None,
        };
        if let TransportHandle::Tls(tls) = handle {
            if let PeerVerification::Anchor(ca) = &tls.verification {
                pems.server_ca = Some(self.static_pem(ca));
            }
            if let Some(identity) = &tls.client_identity {
                pems.client_cert = Some(self.static_pem(&identity.certificate));
                pems.client_key = Some(self.static_pem(&identity.private_key));
            }
        }
        pems
    }
}

impl Transport for EspTransport {
    type Body = EspBody;

    fn get(&mut self, url: &str, handle: &TransportHandle, timeout: Duration) -> Result<HttpResponse<EspBody>> {
        ensure_supported(handle, SKIP_VERIFY_SUPPORTED)?;
        let pems = self.pems_for(handle);
        let config = create_client_config(handle, &pems, timeout);

        let mut conn = EspHttpConnection::new(&config).context("failed to create HTTP connection")?;
        conn.initiate_request(Method::Get, url, &[("Accept", "*/*")])
            .context("failed to send request")?;
        conn.initiate_response().context("no response")?;

        let status = conn.status();
        let content_length = conn
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        log::debug!("GET {} -> {} ({:?} bytes)", url, status, content_length);

        Ok(HttpResponse {
            status,
            content_length,
            body: EspBody { conn },
        })
    }
}

pub struct EspBody {
    conn: EspHttpConnection,
}

impl ByteStream for EspBody {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(Read::read(&mut self.conn, buf)?)
    }
}
