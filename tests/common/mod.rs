//! Shared helpers for talking to a harness server from a probe.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Error type used by test probes. Any harness error converts into it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A minimal, well-formed GET request.
pub const GET_REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost\r\nAccept: */*\r\n\r\n";

/// Upper bound for any single raw exchange.
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// `http://localhost:50231/` → `localhost:50231`.
#[allow(clippy::missing_panics_doc)]
pub fn authority(base_url: &str) -> &str {
    base_url
        .strip_prefix("http://")
        .and_then(|rest| rest.strip_suffix('/'))
        .expect("base URL should look like http://host:port/")
}

/// `http://localhost:50231/` → `50231`.
#[allow(clippy::missing_panics_doc)]
pub fn port_of(base_url: &str) -> u16 {
    authority(base_url)
        .rsplit(':')
        .next()
        .and_then(|port| port.parse().ok())
        .expect("base URL should end in a port")
}

/// Sends [`GET_REQUEST`] and reads until the server closes the connection.
pub async fn raw_get(base_url: &str) -> Result<String, BoxError> {
    let exchange = async {
        let mut stream = TcpStream::connect(authority(base_url)).await?;
        stream.write_all(GET_REQUEST).await?;
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await?;
        Ok::<_, BoxError>(String::from_utf8_lossy(&raw).into_owned())
    };
    tokio::time::timeout(IO_TIMEOUT, exchange).await?
}

/// Whether something is still accepting connections on `port`.
pub async fn is_listening(port: u16) -> bool {
    TcpStream::connect(("127.0.0.1", port)).await.is_ok()
}

/// Whether `port` can be bound right now.
pub fn is_bindable(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}
