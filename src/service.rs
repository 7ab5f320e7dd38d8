//! String-typed IPAM surface for transport layers.
//!
//! [`Ipam`] wires a [`SubnetRegistry`] and an [`AllocationPool`] over one
//! record store and accepts identifiers and filters as the raw text a request
//! carries. A subnet id that is not a number names no subnet: lookups report
//! `NotFound`, pool operations report `NoSuchPool`.

use std::sync::Arc;

use crate::error::{IpamError, Result};
use crate::ip::{
    AddressFamily, AllocatedAddress, AllocationEntry, AllocationPool, ScopeLocks, SubnetId,
    SubnetRecord, SubnetRegistry,
};
use crate::store::RecordStore;

pub struct Ipam {
    registry: Arc<SubnetRegistry>,
    pool: AllocationPool,
}

impl Ipam {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        let locks = Arc::new(ScopeLocks::new());
        let registry = Arc::new(SubnetRegistry::new(Arc::clone(&store), Arc::clone(&locks)));
        let pool = AllocationPool::new(store, Arc::clone(&registry), locks);
        Self { registry, pool }
    }

    /// Subnet used by allocate/deallocate when the caller names none
    pub fn with_default_subnet(mut self, subnet: SubnetId) -> Self {
        self.pool = self.pool.with_default_subnet(subnet);
        self
    }

    pub fn registry(&self) -> &SubnetRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &AllocationPool {
        &self.pool
    }

    pub fn register_subnet(&self, cidr_text: &str) -> Result<SubnetRecord> {
        self.registry.register(cidr_text)
    }

    pub fn list_subnets(&self, family_filter: Option<&str>) -> Result<Vec<SubnetRecord>> {
        let family = family_filter
            .map(str::parse::<AddressFamily>)
            .transpose()?;
        self.registry.list(family)
    }

    pub fn get_subnet(&self, id: &str) -> Result<SubnetRecord> {
        self.registry.get(lookup_id(id)?)
    }

    pub fn delete_subnet(&self, id: &str) -> Result<()> {
        self.registry.delete(lookup_id(id)?)
    }

    pub fn allocate_address(&self, subnet_id: Option<&str>) -> Result<AllocatedAddress> {
        let subnet = subnet_id.map(pool_id).transpose()?;
        self.pool.allocate(subnet)
    }

    pub fn deallocate_address(&self, subnet_id: Option<&str>, address: Option<&str>) -> Result<()> {
        if address.map_or(true, str::is_empty) {
            return Err(IpamError::MissingAddress);
        }
        let subnet = subnet_id.map(pool_id).transpose()?;
        self.pool.deallocate(subnet, address)
    }

    /// Allocated addresses of a subnet in canonical text form
    pub fn list_allocations(&self, subnet_id: &str) -> Result<Vec<String>> {
        let allocations = self.pool.list_allocations(pool_id(subnet_id)?)?;
        Ok(allocations.iter().map(|a| a.to_string()).collect())
    }

    /// Allocated addresses of a subnet with their allocation times
    pub fn allocation_entries(&self, subnet_id: &str) -> Result<Vec<AllocationEntry>> {
        self.pool.entries(pool_id(subnet_id)?)
    }
}

fn lookup_id(id: &str) -> Result<SubnetId> {
    id.parse()
        .map_err(|_| IpamError::NotFound { id: id.to_string() })
}

fn pool_id(id: &str) -> Result<SubnetId> {
    id.parse()
        .map_err(|_| IpamError::NoSuchPool { id: id.to_string() })
}
