//! Listen address parsing.

use std::net::{AddrParseError, Ipv4Addr, SocketAddr};

/// Parse `host:port`, or `:port` meaning every IPv4 interface.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, AddrParseError> {
    match addr.strip_prefix(':') {
        Some(port) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            format!("{}:{port}", Ipv4Addr::UNSPECIFIED).parse()
        }
        _ => addr.parse(),
    }
}
