//! Per-subnet address allocation.
//!
//! Each subnet's pool lives in the store section `pool/<id>`, one key per
//! allocated address (canonical text) with the allocation time as value.
//! Allocation is first-fit: the subnet's range is scanned upwards from the
//! network address and the lowest free address wins. Network and broadcast
//! addresses are allocatable like any other.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::cidr::{address_at, ordinal, parse_address};
use super::locks::ScopeLocks;
use super::registry::SubnetRegistry;
use super::types::{AllocatedAddress, AllocationEntry, SubnetId};
use crate::error::{IpamError, Result};
use crate::store::RecordStore;

/// Address pools of all registered subnets
pub struct AllocationPool {
    store: Arc<dyn RecordStore>,
    registry: Arc<SubnetRegistry>,
    locks: Arc<ScopeLocks>,
    default_subnet: SubnetId,
}

impl AllocationPool {
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: Arc<SubnetRegistry>,
        locks: Arc<ScopeLocks>,
    ) -> Self {
        Self {
            store,
            registry,
            locks,
            default_subnet: SubnetId::FIRST,
        }
    }

    /// Use `subnet` whenever a caller omits the subnet id
    pub fn with_default_subnet(mut self, subnet: SubnetId) -> Self {
        self.default_subnet = subnet;
        self
    }

    pub fn default_subnet(&self) -> SubnetId {
        self.default_subnet
    }

    /// Hand out the lowest free address of the subnet
    pub fn allocate(&self, subnet: Option<SubnetId>) -> Result<AllocatedAddress> {
        let id = subnet.unwrap_or(self.default_subnet);

        self.locks.with_pool(id, || -> Result<AllocatedAddress> {
            let _lease = self.store.lease()?;
            let record = self
                .registry
                .find(id)?
                .ok_or_else(|| IpamError::NoSuchPool { id: id.to_string() })?;

            let taken: HashSet<u128> = self
                .read_pool(id)?
                .into_keys()
                .map(ordinal)
                .collect();
            let range = record.range();
            debug!(
                "Scanning {} for a free address ({} allocated)",
                record.cidr,
                taken.len()
            );

            let Some(free) = (range.first..=range.last).find(|o| !taken.contains(o)) else {
                return Err(IpamError::PoolExhausted {
                    id: id.to_string(),
                    cidr: record.cidr.to_string(),
                });
            };
            let address = address_at(record.family, free);

            self.store.set(
                &id.pool_section(),
                &address.to_string(),
                &Utc::now().to_rfc3339(),
            )?;
            info!("Allocated {} from subnet {} ({})", address, id, record.cidr);

            Ok(AllocatedAddress {
                subnet_id: id,
                address,
            })
        })
    }

    /// Release an address. Releasing an address that is not allocated, or
    /// one of a subnet that does not exist, succeeds without effect.
    pub fn deallocate(&self, subnet: Option<SubnetId>, address: Option<&str>) -> Result<()> {
        let text = address
            .filter(|a| !a.is_empty())
            .ok_or(IpamError::MissingAddress)?;
        let address = parse_address(text)?;
        let id = subnet.unwrap_or(self.default_subnet);

        self.locks.with_pool(id, || -> Result<()> {
            self.store
                .remove(&id.pool_section(), &address.to_string())?;
            info!("Released {} in subnet {}", address, id);
            Ok(())
        })
    }

    /// Currently allocated addresses of a subnet
    pub fn list_allocations(&self, subnet: SubnetId) -> Result<BTreeSet<IpAddr>> {
        self.require(subnet)?;
        Ok(self.read_pool(subnet)?.into_keys().collect())
    }

    /// Allocated addresses with their allocation time, ascending by address
    pub fn entries(&self, subnet: SubnetId) -> Result<Vec<AllocationEntry>> {
        self.require(subnet)?;
        Ok(self
            .read_pool(subnet)?
            .into_iter()
            .map(|(address, stamp)| AllocationEntry {
                address,
                allocated_at: DateTime::parse_from_rfc3339(&stamp)
                    .map(|t| t.with_timezone(&Utc))
                    .ok(),
            })
            .collect())
    }

    fn require(&self, subnet: SubnetId) -> Result<()> {
        match self.registry.find(subnet)? {
            Some(_) => Ok(()),
            None => Err(IpamError::NoSuchPool {
                id: subnet.to_string(),
            }),
        }
    }

    /// Stored pool entries keyed by address; unparsable keys are skipped
    fn read_pool(&self, subnet: SubnetId) -> Result<BTreeMap<IpAddr, String>> {
        let section = subnet.pool_section();
        let mut entries = BTreeMap::new();
        for line in self.store.list_lines(Some(section.as_str()))? {
            match line.key.parse::<IpAddr>() {
                Ok(address) => {
                    entries.insert(address, line.value);
                }
                Err(_) => warn!("Ignoring malformed allocation {:?} in {}", line.key, section),
            }
        }
        Ok(entries)
    }
}
