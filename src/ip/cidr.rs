//! CIDR and address parsing, and the linear ordinal encoding of addresses.
//!
//! IPv4 addresses map onto `u32` ordinals and IPv6 onto `u128`; both are
//! widened to `u128` so ranges of either family share one representation.
//! String forms produced here are canonical (no leading zeros, compressed
//! lower-case IPv6), which keeps stored set membership stable.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

use super::types::AddressFamily;
use crate::error::{IpamError, Result};

/// Parse CIDR text into its network, truncated to the network base.
///
/// A bare address without a prefix is taken as a host route (`/32` or `/128`).
///
/// ```
/// use ipam::ip::cidr::parse_cidr;
///
/// assert_eq!(parse_cidr("1.1.1.1/24").unwrap().to_string(), "1.1.1.0/24");
/// assert_eq!(parse_cidr("10.0.0.7").unwrap().to_string(), "10.0.0.7/32");
/// assert!(parse_cidr("1.1.1.").is_err());
/// assert!(parse_cidr("10.0.0.0/33").is_err());
/// ```
pub fn parse_cidr(text: &str) -> Result<IpNet> {
    if text.is_empty() {
        return Err(IpamError::invalid_format(text));
    }

    let network = if text.contains('/') {
        text.parse::<IpNet>()
            .map_err(|_| IpamError::invalid_format(text))?
    } else {
        IpNet::from(parse_address(text)?)
    };

    Ok(network.trunc())
}

/// Parse a single address literal
pub fn parse_address(text: &str) -> Result<IpAddr> {
    text.parse::<IpAddr>()
        .map_err(|_| IpamError::invalid_format(text))
}

/// Linear ordinal of an address within its family
pub fn ordinal(address: IpAddr) -> u128 {
    match address {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// Inverse of [`ordinal`]; IPv4 ordinals must fit in 32 bits
pub fn address_at(family: AddressFamily, ordinal: u128) -> IpAddr {
    match family {
        AddressFamily::V4 => IpAddr::V4(Ipv4Addr::from(ordinal as u32)),
        AddressFamily::V6 => IpAddr::V6(Ipv6Addr::from(ordinal)),
    }
}
