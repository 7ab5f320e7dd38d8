//! Subnet registry.
//!
//! Owns the set of registered subnets and the id counter. Admission of a new
//! subnet runs inside the registry scope and under a store lease, so no two
//! concurrent registrations can share an id or admit mutually overlapping
//! ranges, even when they come from different processes sharing one store.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};

use super::cidr::parse_cidr;
use super::id_generator::IdGenerator;
use super::locks::ScopeLocks;
use super::overlap::first_conflict;
use super::types::{AddressFamily, AddressRange, SubnetId, SubnetRecord};
use crate::error::{IpamError, Result};
use crate::store::RecordStore;

const FAMILY_KEY: &str = "family";
const CIDR_KEY: &str = "cidr";

/// Registry of non-overlapping subnets
pub struct SubnetRegistry {
    store: Arc<dyn RecordStore>,
    ids: IdGenerator,
    locks: Arc<ScopeLocks>,
}

impl SubnetRegistry {
    pub fn new(store: Arc<dyn RecordStore>, locks: Arc<ScopeLocks>) -> Self {
        Self {
            ids: IdGenerator::new(Arc::clone(&store)),
            store,
            locks,
        }
    }

    /// Admit a new subnet.
    ///
    /// The CIDR is canonicalized to its network base before the overlap check,
    /// so `1.1.1.1/24` is stored as `1.1.1.0/24`.
    pub fn register(&self, cidr_text: &str) -> Result<SubnetRecord> {
        let cidr = parse_cidr(cidr_text)?;
        let family = AddressFamily::of(&cidr);
        let candidate = AddressRange::of(&cidr);

        self.locks.with_registry(|| -> Result<SubnetRecord> {
            let _lease = self.store.lease()?;
            let raw = self.read_raw()?;
            // every numeric section counts, complete or not
            let floor = raw.keys().next_back().map_or(1, |id| id.get() + 1);
            let existing = decode_all(raw, None);
            let same_family: Vec<&SubnetRecord> =
                existing.iter().filter(|r| r.family == family).collect();

            if let Some(clash) = first_conflict(&candidate, &same_family, |r| r.range()) {
                debug!("Rejecting {}: overlaps subnet {} ({})", cidr, clash.id, clash.cidr);
                return Err(IpamError::OverlapConflict {
                    cidr: cidr.to_string(),
                    existing_id: clash.id.to_string(),
                    existing_cidr: clash.cidr.to_string(),
                });
            }

            let id = self.ids.next(floor)?;
            let record = SubnetRecord { id, family, cidr };

            if let Err(e) = self.save(&record) {
                self.discard(id);
                return Err(e.into());
            }
            if let Err(e) = self.ids.advance(id) {
                warn!("Failed to advance id counter past {}, withdrawing subnet {}", id, cidr);
                self.discard(id);
                return Err(e.into());
            }

            info!("Registered subnet {} as id {} (family {})", record.cidr, id, family);
            Ok(record)
        })
    }

    /// Exact lookup by identifier
    pub fn get(&self, id: SubnetId) -> Result<SubnetRecord> {
        self.find(id)?
            .ok_or_else(|| IpamError::NotFound { id: id.to_string() })
    }

    /// Lookup that reports absence as `None` rather than an error
    pub fn find(&self, id: SubnetId) -> Result<Option<SubnetRecord>> {
        let section = id.record_section();
        let Some(cidr) = self.store.get(&section, CIDR_KEY)? else {
            return Ok(None);
        };
        let family = self.store.get(&section, FAMILY_KEY)?;
        Ok(decode_record(id, family.as_deref(), Some(cidr.as_str())))
    }

    /// All registered subnets in ascending id order, optionally of one family
    pub fn list(&self, family: Option<AddressFamily>) -> Result<Vec<SubnetRecord>> {
        Ok(decode_all(self.read_raw()?, family))
    }

    /// Stored attributes of every subnet section, keyed by id
    fn read_raw(&self) -> Result<BTreeMap<SubnetId, RawRecord>> {
        let mut raw: BTreeMap<SubnetId, RawRecord> = BTreeMap::new();
        for line in self.store.list_lines(None)? {
            // counter and pool sections are not subnet ids
            let Ok(id) = line.section.parse::<SubnetId>() else {
                continue;
            };
            let entry = raw.entry(id).or_default();
            match line.key.as_str() {
                FAMILY_KEY => entry.0 = Some(line.value),
                CIDR_KEY => entry.1 = Some(line.value),
                _ => {}
            }
        }

        Ok(raw)
    }

    /// Remove a subnet together with every allocation entry of its pool
    pub fn delete(&self, id: SubnetId) -> Result<()> {
        self.locks.with_registry(|| -> Result<()> {
            self.locks.with_pool(id, || -> Result<()> {
                let _lease = self.store.lease()?;
                let record = self.get(id)?;
                // pool first: a failure here leaves the subnet intact
                self.store.delete(&id.pool_section())?;
                self.store.delete(&id.record_section())?;

                info!("Deleted subnet {} ({}) and its allocations", id, record.cidr);
                Ok(())
            })
        })
    }

    fn save(&self, record: &SubnetRecord) -> Result<()> {
        let section = record.id.record_section();
        self.store
            .set(&section, FAMILY_KEY, &record.family.to_string())?;
        self.store
            .set(&section, CIDR_KEY, &record.cidr.to_string())?;
        Ok(())
    }

    /// Best-effort removal of a half-registered subnet
    fn discard(&self, id: SubnetId) {
        if let Err(e) = self.store.delete(&id.record_section()) {
            warn!("Could not withdraw subnet record {}: {}", id, e);
        }
    }
}

/// Stored `(family, cidr)` attributes of one subnet section
type RawRecord = (Option<String>, Option<String>);

fn decode_all(raw: BTreeMap<SubnetId, RawRecord>, family: Option<AddressFamily>) -> Vec<SubnetRecord> {
    raw.into_iter()
        .filter_map(|(id, (fam, cidr))| decode_record(id, fam.as_deref(), cidr.as_deref()))
        .filter(|record| family.map_or(true, |f| record.family == f))
        .collect()
}

/// Rebuild a record from stored attributes; incomplete or malformed entries
/// (e.g. a registration still being written) are skipped
fn decode_record(id: SubnetId, family: Option<&str>, cidr: Option<&str>) -> Option<SubnetRecord> {
    let (Some(family), Some(cidr)) = (family, cidr) else {
        debug!("Skipping incomplete subnet record {}", id);
        return None;
    };

    let Ok(cidr) = parse_cidr(cidr) else {
        warn!("Skipping subnet record {} with malformed cidr {:?}", id, cidr);
        return None;
    };
    let actual = AddressFamily::of(&cidr);
    if family.parse::<AddressFamily>().ok() != Some(actual) {
        warn!(
            "Subnet record {} claims family {:?} but {} is family {}",
            id, family, cidr, actual
        );
    }

    Some(SubnetRecord {
        id,
        family: actual,
        cidr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::id_generator::{COUNTER_KEY, COUNTER_SECTION};
    use crate::store::{MemoryStore, StoreError, StoreLine};

    fn registry() -> (Arc<MemoryStore>, SubnetRegistry) {
        let store = Arc::new(MemoryStore::new());
        let registry = SubnetRegistry::new(store.clone(), Arc::new(ScopeLocks::new()));
        (store, registry)
    }

    #[test]
    fn test_register_family4() {
        let (_, registry) = registry();
        let record = registry.register("1.1.1.1/24").unwrap();
        assert_eq!(record.id, SubnetId::new(1));
        assert_eq!(record.family, AddressFamily::V4);
        assert_eq!(record.cidr.to_string(), "1.1.1.0/24");
    }

    #[test]
    fn test_register_family6() {
        let (_, registry) = registry();
        let record = registry.register("2001:eb8::/64").unwrap();
        assert_eq!(record.family, AddressFamily::V6);
        assert_eq!(record.cidr.to_string(), "2001:eb8::/64");
    }

    #[test]
    fn test_invalid_cidr_leaves_store_untouched() {
        let (store, registry) = registry();
        for bad in ["", "1.1.1.", "2001:tb8::", "10.0.0.0/40"] {
            assert!(matches!(
                registry.register(bad),
                Err(IpamError::InvalidFormat { .. })
            ));
        }
        assert!(store.list_lines(None).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_is_overlap() {
        let (_, registry) = registry();
        registry.register("1.1.1.1/24").unwrap();
        match registry.register("1.1.1.1/24") {
            Err(IpamError::OverlapConflict { existing_id, existing_cidr, .. }) => {
                assert_eq!(existing_id, "1");
                assert_eq!(existing_cidr, "1.1.1.0/24");
            }
            other => panic!("expected overlap, got {:?}", other),
        }
    }

    #[test]
    fn test_contained_subnet_is_overlap() {
        let (_, registry) = registry();
        registry.register("1.1.1.0/24").unwrap();
        registry.register("10.0.0.0/8").unwrap();
        assert!(matches!(
            registry.register("1.1.1.128/25"),
            Err(IpamError::OverlapConflict { .. })
        ));
        // adjacent is fine
        registry.register("1.1.2.0/24").unwrap();
    }

    #[test]
    fn test_families_are_checked_separately() {
        let (_, registry) = registry();
        registry.register("0.0.0.0/0").unwrap();
        // covers the same ordinals, but a different family
        registry.register("::/96").unwrap();
    }

    #[test]
    fn test_list_orders_by_numeric_id_and_filters() {
        let (_, registry) = registry();
        for i in 0..11 {
            registry.register(&format!("10.{}.0.0/16", i)).unwrap();
        }
        registry.register("2001:db8::/32").unwrap();

        let ids: Vec<u64> = registry.list(None).unwrap().iter().map(|r| r.id.get()).collect();
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());

        let v6 = registry.list(Some(AddressFamily::V6)).unwrap();
        assert_eq!(v6.len(), 1);
        assert_eq!(v6[0].id, SubnetId::new(12));
        assert_eq!(registry.list(Some(AddressFamily::V4)).unwrap().len(), 11);
    }

    #[test]
    fn test_ids_keep_increasing_after_delete() {
        let (_, registry) = registry();
        let a = registry.register("10.0.0.0/24").unwrap();
        let b = registry.register("10.0.1.0/24").unwrap();
        registry.delete(b.id).unwrap();
        registry.delete(a.id).unwrap();
        let c = registry.register("10.0.1.0/24").unwrap();
        assert_eq!(c.id, SubnetId::new(3));
    }

    #[test]
    fn test_get_and_delete_unknown() {
        let (_, registry) = registry();
        assert!(matches!(
            registry.get(SubnetId::new(9)),
            Err(IpamError::NotFound { .. })
        ));
        assert!(matches!(
            registry.delete(SubnetId::new(9)),
            Err(IpamError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_cascades_to_pool() {
        let (store, registry) = registry();
        let record = registry.register("10.0.0.0/30").unwrap();
        store.set(&record.id.pool_section(), "10.0.0.0", "t").unwrap();

        registry.delete(record.id).unwrap();
        assert!(store.list_lines(Some(record.id.pool_section().as_str())).unwrap().is_empty());
        assert!(registry.find(record.id).unwrap().is_none());
        // the range is free again
        registry.register("10.0.0.0/30").unwrap();
    }

    #[test]
    fn test_lagging_counter_never_reuses_ids() {
        let (store, registry) = registry();
        registry.register("10.0.0.0/24").unwrap();
        registry.register("10.0.1.0/24").unwrap();
        store.set(COUNTER_SECTION, COUNTER_KEY, "1").unwrap();

        let record = registry.register("10.0.2.0/24").unwrap();
        assert_eq!(record.id, SubnetId::new(3));
    }

    #[test]
    fn test_incomplete_records_are_skipped() {
        let (store, registry) = registry();
        store.set("4", FAMILY_KEY, "4").unwrap();
        store.set("5", CIDR_KEY, "not a cidr").unwrap();
        store.set("5", FAMILY_KEY, "4").unwrap();
        assert!(registry.list(None).unwrap().is_empty());
        // ids still move past them
        assert_eq!(registry.register("10.0.0.0/8").unwrap().id, SubnetId::new(6));
    }

    /// Store whose counter writes always fail
    struct CounterlessStore(MemoryStore);

    impl RecordStore for CounterlessStore {
        fn get(&self, section: &str, key: &str) -> std::result::Result<Option<String>, StoreError> {
            self.0.get(section, key)
        }
        fn set(&self, section: &str, key: &str, value: &str) -> std::result::Result<(), StoreError> {
            if section == COUNTER_SECTION {
                return Err(StoreError::Unavailable("counter is read-only".to_string()));
            }
            self.0.set(section, key, value)
        }
        fn delete(&self, section: &str) -> std::result::Result<(), StoreError> {
            self.0.delete(section)
        }
        fn remove(&self, section: &str, key: &str) -> std::result::Result<(), StoreError> {
            self.0.remove(section, key)
        }
        fn list_lines(&self, section: Option<&str>) -> std::result::Result<Vec<StoreLine>, StoreError> {
            self.0.list_lines(section)
        }
    }

    #[test]
    fn test_failed_counter_write_withdraws_record() {
        let store = Arc::new(CounterlessStore(MemoryStore::new()));
        let registry = SubnetRegistry::new(store.clone(), Arc::new(ScopeLocks::new()));

        assert!(matches!(
            registry.register("10.0.0.0/8"),
            Err(IpamError::Store(StoreError::Unavailable(_)))
        ));
        assert!(store.list_lines(None).unwrap().is_empty());
        assert!(registry.list(None).unwrap().is_empty());
    }
}
