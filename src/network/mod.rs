pub mod http_config;
pub mod transport;

#[cfg(target_os = "espidf")]
pub mod esp_http;

pub use transport::{read_body, ByteStream, HttpResponse, Transport};

#[cfg(target_os = "espidf")]
pub use esp_http::EspTransport;
