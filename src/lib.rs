//! # IPAM - IP address management core
//!
//! This library tracks a registry of non-overlapping IP subnets and manages a
//! pool of individually allocatable addresses for each of them.
//!
//! ## Overview
//!
//! Callers register subnets in CIDR notation, list and query them, and
//! allocate or release single addresses from a subnet's range. The library
//! guarantees that:
//!
//! - **No overlap**: two subnets of the same address family never share an address
//! - **Stable ids**: subnet identifiers start at 1 and are never reused
//! - **No duplicates**: an address is never handed out twice, nor outside its subnet
//! - **First fit**: the lowest free address of a subnet is always allocated first
//!
//! ## Architecture
//!
//! - `store`: the record store trait plus in-memory and INI file adapters
//! - `ip`: CIDR parsing, overlap detection, id generation, the subnet
//!   registry and the allocation pool
//! - `service`: the string-typed [`Ipam`] facade used by front ends
//! - `config` / `config_loader`: YAML configuration
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use ipam::{Ipam, store::MemoryStore};
//!
//! let ipam = Ipam::new(Arc::new(MemoryStore::new()));
//!
//! let subnet = ipam.register_subnet("192.168.0.1/30")?;
//! assert_eq!(subnet.cidr.to_string(), "192.168.0.0/30");
//!
//! let first = ipam.allocate_address(Some("1"))?;
//! assert_eq!(first.address.to_string(), "192.168.0.0");
//!
//! ipam.deallocate_address(Some("1"), Some("192.168.0.0"))?;
//! # Ok::<(), ipam::IpamError>(())
//! ```
//!
//! ## Concurrency
//!
//! The store only promises single-key atomicity. Registration and deletion
//! run inside one registry-wide critical section; allocation and release run
//! inside a critical section per subnet. Reads take no scope lock. The INI
//! file store also hands out a lease backed by a file lock, which extends
//! those sections to every process sharing the file.
//!
//! ## Error Handling
//!
//! Library operations return [`IpamError`]. The `ipam` binary reports errors
//! through `color_eyre`.

pub mod config;
pub mod config_loader;
pub mod error;
pub mod ip;
pub mod service;
pub mod store;

pub use error::{IpamError, Result};
pub use ip::{AddressFamily, AllocatedAddress, SubnetId, SubnetRecord};
pub use service::Ipam;
