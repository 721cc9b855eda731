//! Working out the URL a phone should open.
//!
//! The QR code has to carry an address that other devices on the LAN can reach.
//! [`RouteProbe`] asks the OS which local address it would use for traffic
//! leaving through the default route, which is the interface on the default
//! gateway's subnet. When that fails the URL falls back to `localhost` so the
//! service still starts.

use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

pub const UPLOAD_PAGE_PATH: &str = "/";
pub const DOWNLOAD_PAGE_PATH: &str = "/download-page";
pub const FALLBACK_HOST: &str = "localhost";

/// source of the machine's LAN-facing address
pub trait LanAddressSource: Send + Sync {
    fn discover(&self) -> io::Result<IpAddr>;
}

/// picks the local address of the default route
///
/// Connecting a UDP socket sends nothing; it only makes the kernel choose a
/// route and bind the socket to that route's source address.
#[derive(Debug, Clone, Copy)]
pub struct RouteProbe {
    target: (Ipv4Addr, u16),
}

impl Default for RouteProbe {
    fn default() -> Self {
        Self {
            target: (Ipv4Addr::new(8, 8, 8, 8), 80),
        }
    }
}

impl LanAddressSource for RouteProbe {
    fn discover(&self) -> io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(self.target)?;
        Ok(socket.local_addr()?.ip())
    }
}

/// always reports the same address
#[derive(Debug, Clone, Copy)]
pub struct Fixed(pub IpAddr);

impl LanAddressSource for Fixed {
    fn discover(&self) -> io::Result<IpAddr> {
        Ok(self.0)
    }
}

/// discovered LAN IPv4 address, or `localhost`
pub fn advertised_host(source: &dyn LanAddressSource) -> String {
    match source.discover() {
        Ok(IpAddr::V4(ip)) if !ip.is_unspecified() && !ip.is_loopback() => ip.to_string(),
        Ok(other) => {
            tracing::warn!("No usable LAN IPv4 address (got {}), using {}", other, FALLBACK_HOST);
            FALLBACK_HOST.to_string()
        }
        Err(e) => {
            tracing::warn!("LAN address discovery failed: {}, using {}", e, FALLBACK_HOST);
            FALLBACK_HOST.to_string()
        }
    }
}

/// URL encoded into the QR code
///
/// Points at the download list when there is something to download and at the
/// upload page otherwise. Computed once per server start.
pub fn session_url(host: &str, port: u16, catalog_is_empty: bool) -> String {
    if catalog_is_empty {
        format!("http://{}:{}", host, port)
    } else {
        format!("http://{}:{}{}", host, port, DOWNLOAD_PAGE_PATH)
    }
}
