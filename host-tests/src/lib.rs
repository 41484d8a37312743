//! Host-side fakes for the OTA pull engine.
//! These run on the development machine, not on the ESP32.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use esp32_ota_pull::{
    ByteStream, FlashUpdate, FlashUpdateSink, HttpResponse, Manifest, ManifestProfile,
    Transport, TransportHandle,
};

/// How a fake endpoint answers
#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
    /// Announced Content-Length; `None` omits the header
    pub content_length: Option<u64>,
    /// Largest read the body will satisfy
    pub max_read: usize,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self {
            status: 200,
            content_length: Some(body.len() as u64),
            body,
            max_read: usize::MAX,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            content_length: Some(0),
            max_read: usize::MAX,
        }
    }

    /// Announce `length` but only deliver the body actually given
    pub fn announce(mut self, length: Option<u64>) -> Self {
        self.content_length = length;
        self
    }

    pub fn trickle(mut self, max_read: usize) -> Self {
        self.max_read = max_read;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub handle: TransportHandle,
}

/// Transport answering from a fixed route table. Unknown URLs fail like a
/// refused connection.
#[derive(Default, Clone)]
pub struct FakeTransport {
    routes: HashMap<String, Route>,
    log: Rc<RefCell<Vec<Request>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, route: Route) -> Self {
        self.routes.insert(url.to_string(), route);
        self
    }

    pub fn manifest(self, url: &str, profiles: Vec<ManifestProfile>) -> Self {
        let json = serde_json::to_vec(&Manifest::from(profiles)).unwrap_or_default();
        self.route(url, Route::ok(json))
    }

    /// Shared view of every request issued so far
    pub fn requests(&self) -> Rc<RefCell<Vec<Request>>> {
        self.log.clone()
    }
}

impl Transport for FakeTransport {
    type Body = FakeBody;

    fn get(&mut self, url: &str, handle: &TransportHandle, _timeout: Duration) -> Result<HttpResponse<FakeBody>> {
        self.log.borrow_mut().push(Request {
            url: url.to_string(),
            handle: handle.clone(),
        });
        let route = self
            .routes
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused: {}", url))?;
        Ok(HttpResponse {
            status: route.status,
            content_length: route.content_length,
            body: FakeBody {
                data: route.body,
                pos: 0,
                max_read: route.max_read,
            },
        })
    }
}

pub struct FakeBody {
    data: Vec<u8>,
    pos: usize,
    max_read: usize,
}

impl ByteStream for FakeBody {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.max_read).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// What happened to the fake flash
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlashState {
    pub begun: usize,
    pub image: Vec<u8>,
    pub committed: bool,
    pub aborted: bool,
    pub write_sizes: Vec<usize>,
}

/// Flash sink kept in memory, with knobs for the failure modes
#[derive(Debug, Default)]
pub struct FakeFlash {
    pub state: FlashState,
    pub no_partition: bool,
    /// Accept at most this many bytes in total
    pub capacity: Option<usize>,
}

impl FakeFlash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_partition() -> Self {
        Self {
            no_partition: true,
            ..Self::default()
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }
}

pub struct FakeFlashUpdate<'a> {
    flash: &'a mut FakeFlash,
}

impl FlashUpdateSink for FakeFlash {
    type Update<'a> = FakeFlashUpdate<'a>;

    fn begin(&mut self) -> Result<FakeFlashUpdate<'_>> {
        if self.no_partition {
            bail!("no OTA partition available");
        }
        self.state.begun += 1;
        self.state.image.clear();
        Ok(FakeFlashUpdate { flash: self })
    }
}

impl FlashUpdate for FakeFlashUpdate<'_> {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let state = &mut self.flash.state;
        state.write_sizes.push(data.len());
        let room = self
            .flash
            .capacity
            .map_or(data.len(), |cap| cap.saturating_sub(state.image.len()));
        let accepted = data.len().min(room);
        state.image.extend_from_slice(&data[..accepted]);
        Ok(accepted)
    }

    fn complete(self) -> Result<()> {
        self.flash.state.committed = true;
        Ok(())
    }

    fn abort(self) -> Result<()> {
        self.flash.state.aborted = true;
        Ok(())
    }
}

/// Deterministic firmware-looking bytes
pub fn firmware_image(len: usize) -> Vec<u8> {
    let mut image: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
    if let Some(first) = image.first_mut() {
        // ESP image magic byte
        *first = 0xE9;
    }
    image
}
