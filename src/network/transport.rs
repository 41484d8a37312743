// Minimal blocking HTTP GET surface the update engine needs from a transport

use core::time::Duration;

use anyhow::Result;

use crate::trust::TransportHandle;

/// A source of response bytes.
///
/// `read` blocks until at least one byte is available and returns how many
/// were placed in `buf`; `Ok(0)` means the connection is closed.
pub trait ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl<T: ByteStream + ?Sized> ByteStream for &mut T {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }
}

impl<T: ByteStream + ?Sized> ByteStream for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }
}

pub struct HttpResponse<B> {
    pub status: u16,
    /// `Content-Length`, when the server sent one
    pub content_length: Option<u64>,
    pub body: B,
}

impl<B> HttpResponse<B> {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests with the trust setup decided by `trust::configure`.
///
/// An `Err` means no status line was obtained at all (DNS, connect, TLS
/// handshake...). Any status the server did send comes back as `Ok`.
pub trait Transport {
    type Body: ByteStream;

    fn get(
        &mut self,
        url: &str,
        handle: &TransportHandle,
        timeout: Duration,
    ) -> Result<HttpResponse<Self::Body>>;
}

/// Read a whole body into memory, refusing anything over `limit` bytes.
///
/// Returns `Ok(None)` when the body is too large.
pub fn read_body<S: ByteStream + ?Sized>(body: &mut S, limit: usize) -> Result<Option<Vec<u8>>> {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let bytes_read = body.read(&mut buf)?;
        if bytes_read == 0 {
            break;
        }
        if data.len() + bytes_read > limit {
            return Ok(None);
        }
        data.extend_from_slice(&buf[..bytes_read]);
    }
    Ok(Some(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Chunks(Vec<Vec<u8>>);

    impl ByteStream for Chunks {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            if self.0.is_empty() {
                return Ok(0);
            }
            let chunk = self.0.remove(0);
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_read_body_collects_chunks() {
        let mut body = Chunks(vec![b"{\"a\"".to_vec(), b":1}".to_vec()]);
        assert_eq!(read_body(&mut body, 64).unwrap(), Some(b"{\"a\":1}".to_vec()));
    }

    #[test]
    fn test_read_body_limit() {
        let mut body = Chunks(vec![vec![b'x'; 10], vec![b'y'; 10]]);
        assert_eq!(read_body(&mut body, 15).unwrap(), None);
    }

    #[test]
    fn test_success_range() {
        let response = |status| HttpResponse { status, content_length: None, body: () };
        assert!(response(200).is_success());
        assert!(response(204).is_success());
        assert!(!response(304).is_success());
        assert!(!response(404).is_success());
    }
}
