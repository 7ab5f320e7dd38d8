//! Core IPAM types: subnet identifiers, records and allocation results.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::cidr::ordinal;
use crate::error::IpamError;

/// Address family of a subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(network: &IpNet) -> Self {
        match network {
            IpNet::V4(_) => AddressFamily::V4,
            IpNet::V6(_) => AddressFamily::V6,
        }
    }

    /// Numeric family tag, 4 or 6
    pub fn number(self) -> u8 {
        match self {
            AddressFamily::V4 => 4,
            AddressFamily::V6 => 6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl FromStr for AddressFamily {
    type Err = IpamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "4" => Ok(AddressFamily::V4),
            "6" => Ok(AddressFamily::V6),
            _ => Err(IpamError::invalid_format(s)),
        }
    }
}

impl Serialize for AddressFamily {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AddressFamily {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Opaque, monotonically assigned subnet identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubnetId(u64);

impl SubnetId {
    /// The first identifier ever handed out, used as the default pool
    pub const FIRST: SubnetId = SubnetId(1);

    pub const fn new(raw: u64) -> Self {
        SubnetId(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Store section holding the subnet record
    pub(crate) fn record_section(self) -> String {
        self.0.to_string()
    }

    /// Store section holding the subnet's allocation entries
    pub(crate) fn pool_section(self) -> String {
        format!("pool/{}", self.0)
    }
}

impl fmt::Display for SubnetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubnetId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(SubnetId)
    }
}

impl Serialize for SubnetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SubnetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Inclusive range of address ordinals within one family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub first: u128,
    pub last: u128,
}

impl AddressRange {
    pub fn of(network: &IpNet) -> Self {
        AddressRange {
            first: ordinal(network.network()),
            last: ordinal(network.broadcast()),
        }
    }

    pub fn intersects(&self, other: &AddressRange) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    pub fn contains(&self, ordinal: u128) -> bool {
        self.first <= ordinal && ordinal <= self.last
    }
}

/// A registered subnet, serialized as `{"id", "family", "cidr"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetRecord {
    pub id: SubnetId,
    pub family: AddressFamily,
    pub cidr: IpNet,
}

impl SubnetRecord {
    pub fn range(&self) -> AddressRange {
        AddressRange::of(&self.cidr)
    }
}

/// Result of a successful allocation, serialized as `{"subnet_id", "address"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedAddress {
    pub subnet_id: SubnetId,
    pub address: IpAddr,
}

/// One allocated address together with the time it was handed out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationEntry {
    pub address: IpAddr,
    /// Informational only, allocations never expire
    pub allocated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subnet_record_wire_shape() {
        let record = SubnetRecord {
            id: SubnetId::new(1),
            family: AddressFamily::V4,
            cidr: "1.1.1.0/24".parse().unwrap(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": "1", "family": "4", "cidr": "1.1.1.0/24"})
        );

        let back: SubnetRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_allocated_address_wire_shape() {
        let allocated = AllocatedAddress {
            subnet_id: SubnetId::new(7),
            address: "2001:db8::1".parse().unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&allocated).unwrap(),
            serde_json::json!({"subnet_id": "7", "address": "2001:db8::1"})
        );
    }

    #[test]
    fn test_family_parsing() {
        assert_eq!("4".parse::<AddressFamily>().unwrap(), AddressFamily::V4);
        assert_eq!("6".parse::<AddressFamily>().unwrap(), AddressFamily::V6);
        assert!(matches!(
            "5".parse::<AddressFamily>(),
            Err(IpamError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_range_intersection() {
        let a = AddressRange { first: 0, last: 255 };
        let adjacent = AddressRange { first: 256, last: 511 };
        let inside = AddressRange { first: 128, last: 130 };
        assert!(!a.intersects(&adjacent));
        assert!(a.intersects(&inside));
        assert!(inside.intersects(&a));
        assert!(a.contains(255));
        assert!(!a.contains(256));
    }

    #[test]
    fn test_sections() {
        let id = SubnetId::new(12);
        assert_eq!(id.record_section(), "12");
        assert_eq!(id.pool_section(), "pool/12");
        assert!("abc".parse::<SubnetId>().is_err());
    }
}
