//! IP and MAC literal parsing.

use std::net::IpAddr;

use crate::netlink::Error;

/// Error type for address literals.
#[derive(Debug, thiserror::Error)]
pub enum AddrError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid prefix length: {0}")]
    InvalidPrefix(String),

    #[error("invalid MAC address: {0}")]
    InvalidMac(String),
}

impl From<AddrError> for Error {
    fn from(err: AddrError) -> Self {
        Error::ParseFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AddrError>;

/// Parse an IP address with optional prefix length (CIDR notation).
///
/// Without a prefix the host length of the family is used (32 or 128).
pub fn parse_prefix(s: &str) -> Result<(IpAddr, u8)> {
    let (addr_str, prefix_str) = match s.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (s, None),
    };

    let addr: IpAddr = addr_str
        .trim()
        .parse()
        .map_err(|_| AddrError::InvalidAddress(s.to_string()))?;
    let max_prefix = if addr.is_ipv4() { 32 } else { 128 };

    let prefix = match prefix_str {
        Some(p) => p
            .parse::<u8>()
            .map_err(|_| AddrError::InvalidPrefix(p.to_string()))?,
        None => max_prefix,
    };

    if prefix > max_prefix {
        return Err(AddrError::InvalidPrefix(format!(
            "{} exceeds maximum {} for address family",
            prefix, max_prefix
        )));
    }

    Ok((addr, prefix))
}

/// Parse a MAC address (`aa:bb:cc:dd:ee:ff`).
pub fn parse_mac(s: &str) -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = s.split(':');

    for byte in mac.iter_mut() {
        let part = parts
            .next()
            .filter(|p| (1..=2).contains(&p.len()))
            .ok_or_else(|| AddrError::InvalidMac(s.to_string()))?;
        *byte = u8::from_str_radix(part, 16).map_err(|_| AddrError::InvalidMac(s.to_string()))?;
    }

    if parts.next().is_some() {
        return Err(AddrError::InvalidMac(s.to_string()));
    }

    Ok(mac)
}

/// Format a hardware address as colon-separated hex.
pub fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
