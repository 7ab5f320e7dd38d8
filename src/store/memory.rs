//! Process-local record store.

use parking_lot::RwLock;

use super::{remove_key, sections_to_lines, RecordStore, Sections, StoreError, StoreLine};

/// Record store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    sections: RwLock<Sections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, section: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .sections
            .read()
            .get(section)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn set(&self, section: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.sections
            .write()
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, section: &str) -> Result<(), StoreError> {
        self.sections.write().remove(section);
        Ok(())
    }

    fn remove(&self, section: &str, key: &str) -> Result<(), StoreError> {
        remove_key(&mut self.sections.write(), section, key);
        Ok(())
    }

    fn list_lines(&self, section: Option<&str>) -> Result<Vec<StoreLine>, StoreError> {
        Ok(sections_to_lines(&self.sections.read(), section))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("globals", "next_id").unwrap(), None);

        store.set("globals", "next_id", "4").unwrap();
        assert_eq!(store.get("globals", "next_id").unwrap().as_deref(), Some("4"));

        store.delete("globals").unwrap();
        assert_eq!(store.get("globals", "next_id").unwrap(), None);
        // deleting again is fine
        store.delete("globals").unwrap();
    }

    #[test]
    fn test_remove_single_key() {
        let store = MemoryStore::new();
        store.set("pool/1", "10.0.0.0", "t0").unwrap();
        store.set("pool/1", "10.0.0.1", "t1").unwrap();

        store.remove("pool/1", "10.0.0.0").unwrap();
        store.remove("pool/1", "10.0.0.9").unwrap();

        let lines = store.list_lines(Some("pool/1")).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].key, "10.0.0.1");
    }
}
