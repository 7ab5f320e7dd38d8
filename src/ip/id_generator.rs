//! Subnet identifier generation backed by the `[globals] next_id` counter.

use std::sync::Arc;

use log::{debug, warn};

use super::types::SubnetId;
use crate::store::{RecordStore, StoreError};

pub const COUNTER_SECTION: &str = "globals";
pub const COUNTER_KEY: &str = "next_id";

/// Hands out identifiers that are never reused.
///
/// Callers must hold the registry scope between [`IdGenerator::next`] and
/// [`IdGenerator::advance`].
pub struct IdGenerator {
    store: Arc<dyn RecordStore>,
}

impl IdGenerator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Persisted counter value; a missing or unparsable counter starts at 1
    pub fn current(&self) -> Result<u64, StoreError> {
        let raw = self.store.get(COUNTER_SECTION, COUNTER_KEY)?;
        let value = match raw.as_deref().map(str::trim) {
            None => 1,
            Some(text) => match text.parse::<u64>() {
                Ok(0) | Err(_) => {
                    warn!("Ignoring unreadable subnet id counter {:?}, starting from 1", text);
                    1
                }
                Ok(n) => n,
            },
        };
        Ok(value)
    }

    /// Identifier for the next subnet, never below `floor`.
    ///
    /// `floor` is one past the highest id already stored, so a counter that
    /// lags behind the records can not cause an id to be handed out twice.
    pub fn next(&self, floor: u64) -> Result<SubnetId, StoreError> {
        let counter = self.current()?;
        if counter < floor {
            warn!("Subnet id counter {} lags behind stored records, using {}", counter, floor);
        }
        Ok(SubnetId::new(counter.max(floor)))
    }

    /// Persist the counter as one past `assigned`
    pub fn advance(&self, assigned: SubnetId) -> Result<(), StoreError> {
        let next = assigned.get() + 1;
        debug!("Advancing subnet id counter to {}", next);
        self.store
            .set(COUNTER_SECTION, COUNTER_KEY, &next.to_string())
    }
}
