use std::collections::HashMap;

use super::errors::{ContainerError, ContainerResult};
use super::Container;

/// In-memory container with monotonically increasing ids.
///
/// Ids are never reused, even after removal.
#[derive(Debug, Default)]
pub struct MemoryContainer {
    records: HashMap<u64, Vec<u8>>,
    next_id: u64,
    closed: bool,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            next_id: 1,
            closed: false,
        }
    }

    /// Total bytes held by live records
    pub fn stored_bytes(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    fn ensure_open(&self) -> ContainerResult<()> {
        if self.closed {
            return Err(ContainerError::closed());
        }
        Ok(())
    }
}

impl Container for MemoryContainer {
    type Id = u64;

    fn insert(&mut self, bytes: &[u8]) -> ContainerResult<u64> {
        self.ensure_open()?;
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        self.records.insert(id, bytes.to_vec());
        Ok(id)
    }

    fn get(&self, id: &u64) -> ContainerResult<Vec<u8>> {
        self.ensure_open()?;
        self.records
            .get(id)
            .cloned()
            .ok_or_else(|| ContainerError::not_found(id))
    }

    fn update(&mut self, id: &u64, bytes: &[u8]) -> ContainerResult<()> {
        self.ensure_open()?;
        match self.records.get_mut(id) {
            Some(slot) => {
                *slot = bytes.to_vec();
                Ok(())
            }
            None => Err(ContainerError::not_found(id)),
        }
    }

    fn remove(&mut self, id: &u64) -> ContainerResult<()> {
        self.ensure_open()?;
        self.records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ContainerError::not_found(id))
    }

    fn size(&self) -> usize {
        self.records.len()
    }

    fn ids(&self) -> Vec<u64> {
        self.records.keys().copied().collect()
    }

    fn close(&mut self) -> ContainerResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerErrorCode;

    #[test]
    fn test_insert_get_update_remove() {
        let mut c = MemoryContainer::new();
        let a = c.insert(b"first").unwrap();
        let b = c.insert(b"second").unwrap();
        assert_ne!(a, b);
        assert_eq!(c.size(), 2);

        c.update(&a, b"changed").unwrap();
        assert_eq!(c.get(&a).unwrap(), b"changed");

        c.remove(&b).unwrap();
        assert_eq!(c.size(), 1);
        assert_eq!(
            c.get(&b).unwrap_err().code(),
            ContainerErrorCode::XtreeContainerNotFound
        );
    }

    #[test]
    fn test_ids_not_reused() {
        let mut c = MemoryContainer::new();
        let a = c.insert(b"x").unwrap();
        c.remove(&a).unwrap();
        let b = c.insert(b"y").unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_default_never_hands_out_zero() {
        let mut c = MemoryContainer::default();
        assert_eq!(c.insert(b"x").unwrap(), 1);
    }

    #[test]
    fn test_closed_container_rejects_calls() {
        let mut c = MemoryContainer::new();
        let id = c.insert(b"x").unwrap();
        c.close().unwrap();
        assert_eq!(
            c.get(&id).unwrap_err().code(),
            ContainerErrorCode::XtreeContainerClosed
        );
        assert!(c.insert(b"y").is_err());
    }

    #[test]
    fn test_update_missing() {
        let mut c = MemoryContainer::new();
        assert!(c.update(&9, b"x").is_err());
        assert!(c.remove(&9).is_err());
    }
}
