//! Scope locks serializing read-modify-write sequences against the store.
//!
//! The registry scope covers "read overlap set + assign id + write" and subnet
//! deletion. Each subnet has its own pool scope covering "read allocation set +
//! scan + write". When both are needed the registry scope is taken first.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::types::SubnetId;

/// Pool lock of one subnet and the number of callers holding or awaiting it
#[derive(Debug, Default)]
struct PoolSlot {
    lock: Arc<Mutex<()>>,
    users: usize,
}

#[derive(Debug, Default)]
pub struct ScopeLocks {
    registry: Mutex<()>,
    pools: Mutex<HashMap<SubnetId, PoolSlot>>,
}

/// Registration in a pool slot, released on drop
struct PoolUse<'a> {
    locks: &'a ScopeLocks,
    subnet: SubnetId,
    lock: Arc<Mutex<()>>,
}

impl Drop for PoolUse<'_> {
    fn drop(&mut self) {
        let mut pools = self.locks.pools.lock();
        if let Some(slot) = pools.get_mut(&self.subnet) {
            slot.users -= 1;
            if slot.users == 0 {
                pools.remove(&self.subnet);
            }
        }
    }
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the registry scope
    pub fn with_registry<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.registry.lock();
        f()
    }

    /// Run `f` while holding the pool scope of `subnet`. The slot only lives
    /// while someone holds or waits for it.
    pub fn with_pool<R>(&self, subnet: SubnetId, f: impl FnOnce() -> R) -> R {
        let slot = self.enter_pool(subnet);
        let _guard = slot.lock.lock();
        f()
    }

    fn enter_pool(&self, subnet: SubnetId) -> PoolUse<'_> {
        let mut pools = self.pools.lock();
        let slot = pools.entry(subnet).or_default();
        slot.users += 1;
        PoolUse {
            locks: self,
            subnet,
            lock: Arc::clone(&slot.lock),
        }
    }

    /// Number of subnets with a live pool slot
    #[cfg(test)]
    pub(crate) fn pool_slots(&self) -> usize {
        self.pools.lock().len()
    }
}
