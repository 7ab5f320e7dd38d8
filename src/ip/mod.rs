//! Subnet registration and address allocation.
//!
//! This module holds the invariant-carrying part of the crate: admitting
//! subnets without overlap, handing out identifiers that are never reused,
//! and allocating addresses from a subnet's range without ever issuing a
//! duplicate or out-of-range address.

pub mod allocator;
pub mod cidr;
pub mod id_generator;
pub mod locks;
pub mod overlap;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use allocator::AllocationPool;
pub use id_generator::IdGenerator;
pub use locks::ScopeLocks;
pub use registry::SubnetRegistry;
pub use types::{
    AddressFamily, AddressRange, AllocatedAddress, AllocationEntry, SubnetId, SubnetRecord,
};
