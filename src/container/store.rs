//! Record store
//!
//! Sits between the tree engine and a `Container`: encodes and decodes
//! records, refuses any write larger than the page capacity, maintains the
//! cross-record parent links and feeds the metrics registry.
//!
//! Engine operations run inside a journal (`begin` .. `commit`/`rollback`).
//! While one is open, removals are deferred to `commit`, and `rollback`
//! restores every overwritten record and drops every inserted one, so a
//! failed operation leaves the container as it found it.

use std::collections::HashSet;
use std::sync::Arc;

use super::Container;
use crate::codec::{self, Record, RecordId};
use crate::error::{EngineError, EngineResult};
use crate::node::Node;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

pub struct RecordStore<C: Container> {
    container: C,
    capacity: usize,
    metrics: Arc<MetricsRegistry>,
    journal: Option<Journal<C::Id>>,
}

/// Undo information of the open operation
struct Journal<I> {
    inserted: Vec<I>,
    /// First stored version of every record the operation overwrote
    overwritten: Vec<(I, Vec<u8>)>,
    touched: HashSet<I>,
    removed: Vec<I>,
}

impl<I: RecordId> Journal<I> {
    fn new() -> Self {
        Self {
            inserted: Vec::new(),
            overwritten: Vec::new(),
            touched: HashSet::new(),
            removed: Vec::new(),
        }
    }
}

impl<C: Container> RecordStore<C> {
    pub fn new(container: C, capacity: usize, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            container,
            capacity,
            metrics,
            journal: None,
        }
    }

    /// Page capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut C {
        &mut self.container
    }

    pub fn into_container(self) -> C {
        self.container
    }

    /// Fetches and decodes a record
    pub fn load(&self, id: &C::Id) -> EngineResult<Record<C::Id>> {
        let bytes = self.container.get(id)?;
        self.metrics.record_read();
        codec::decode(&bytes).map_err(|e| {
            log_event_with_fields(
                Event::FormatCorruption,
                &[("record_id", id.to_string().as_str()), ("reason", e.to_string().as_str())],
            );
            e
        })
    }

    /// Opens a journal; every write until `commit` or `rollback` is undoable
    pub fn begin(&mut self) {
        self.journal = Some(Journal::new());
    }

    pub fn in_journal(&self) -> bool {
        self.journal.is_some()
    }

    /// Closes the journal and applies the deferred removals
    pub fn commit(&mut self) -> EngineResult<()> {
        if let Some(journal) = self.journal.take() {
            for id in journal.removed {
                self.remove_now(&id)?;
            }
        }
        Ok(())
    }

    /// Undoes every write made since `begin`.
    ///
    /// Returns the number of records restored or dropped.
    pub fn rollback(&mut self) -> EngineResult<usize> {
        let journal = match self.journal.take() {
            Some(journal) => journal,
            None => return Ok(0),
        };
        let undone = journal.overwritten.len() + journal.inserted.len();
        for (id, bytes) in journal.overwritten.iter().rev() {
            self.container.update(id, bytes)?;
        }
        for id in journal.inserted.iter().rev() {
            self.container.remove(id)?;
        }
        Ok(undone)
    }

    /// Encodes and stores a new record
    pub fn insert(&mut self, record: &Record<C::Id>) -> EngineResult<C::Id> {
        let bytes = self.encode_checked(record)?;
        let id = self.container.insert(&bytes)?;
        self.metrics.record_inserted(bytes.len());
        if let Some(journal) = self.journal.as_mut() {
            journal.touched.insert(id.clone());
            journal.inserted.push(id.clone());
        }
        Ok(id)
    }

    /// Encodes and replaces the record stored under `id`
    pub fn update(&mut self, id: &C::Id, record: &Record<C::Id>) -> EngineResult<()> {
        let bytes = self.encode_checked(record)?;
        if let Some(journal) = self.journal.as_mut() {
            if !journal.touched.contains(id) {
                let before = self.container.get(id)?;
                journal.touched.insert(id.clone());
                journal.overwritten.push((id.clone(), before));
            }
        }
        self.container.update(id, &bytes)?;
        self.metrics.record_updated(bytes.len());
        Ok(())
    }

    /// Removes a record; inside a journal the removal waits for `commit`
    pub fn remove(&mut self, id: &C::Id) -> EngineResult<()> {
        match self.journal.as_mut() {
            Some(journal) => {
                journal.removed.push(id.clone());
                Ok(())
            }
            None => self.remove_now(id),
        }
    }

    fn remove_now(&mut self, id: &C::Id) -> EngineResult<()> {
        self.container.remove(id)?;
        self.metrics.record_removed();
        Ok(())
    }

    /// Points every record referenced by a proxy inside `node` back at `parent`.
    ///
    /// Records whose link is already correct are left untouched.
    pub fn relink(&mut self, parent: &C::Id, node: &Node<C::Id>) -> EngineResult<()> {
        let mut targets = Vec::new();
        node.for_each_proxy(&mut |proxy| {
            if let Some(id) = proxy.child_id() {
                targets.push(id.clone());
            }
        });

        for target in targets {
            self.set_parent(&target, Some(parent.clone()))?;
        }
        Ok(())
    }

    /// Rewrites the parent link of one record if it differs
    pub fn set_parent(&mut self, id: &C::Id, parent: Option<C::Id>) -> EngineResult<()> {
        let mut record = self.load(id)?;
        if record.parent_id != parent {
            record.parent_id = parent;
            self.update(id, &record)?;
        }
        Ok(())
    }

    fn encode_checked(&self, record: &Record<C::Id>) -> EngineResult<Vec<u8>> {
        let size = codec::encoded_size(record);
        if size > self.capacity {
            return Err(EngineError::CapacityViolation {
                size,
                capacity: self.capacity,
                reason: "record does not fit into one page".to_string(),
            });
        }
        codec::encode(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MemoryContainer;
    use crate::node::Markup;

    fn store(capacity: usize) -> RecordStore<MemoryContainer> {
        RecordStore::new(
            MemoryContainer::new(),
            capacity,
            Arc::new(MetricsRegistry::new()),
        )
    }

    #[test]
    fn test_insert_and_load() {
        let mut s = store(256);
        let record = Record::orphan(Node::element("doc"));
        let id = s.insert(&record).unwrap();
        assert_eq!(s.load(&id).unwrap(), record);

        let snapshot = s.metrics().snapshot();
        assert_eq!(snapshot.records_inserted, 1);
        assert_eq!(snapshot.records_read, 1);
    }

    #[test]
    fn test_capacity_enforced() {
        let mut s = store(16);
        let record = Record::orphan(Node::text("a literal longer than sixteen bytes"));
        let err = s.insert(&record).unwrap_err();
        assert!(matches!(err, EngineError::CapacityViolation { capacity: 16, .. }));
        assert_eq!(s.container().size(), 0);
    }

    #[test]
    fn test_relink_updates_children() {
        let mut s = store(256);
        let child = s.insert(&Record::orphan(Node::element("c"))).unwrap();
        let parent_node: Node<u64> = Markup::element("p").with_child(Node::proxy(child)).into();
        let parent = s.insert(&Record::orphan(parent_node.clone())).unwrap();

        s.relink(&parent, &parent_node).unwrap();
        assert_eq!(s.load(&child).unwrap().parent_id, Some(parent));

        // second relink is a no-op
        let updates = s.metrics().snapshot().records_updated;
        s.relink(&parent, &parent_node).unwrap();
        assert_eq!(s.metrics().snapshot().records_updated, updates);
    }

    #[test]
    fn test_rollback_restores_container() {
        let mut s = store(256);
        let kept = s.insert(&Record::orphan(Node::element("kept"))).unwrap();
        let doomed = s.insert(&Record::orphan(Node::element("doomed"))).unwrap();

        s.begin();
        s.update(&kept, &Record::orphan(Node::element("changed"))).unwrap();
        s.update(&kept, &Record::orphan(Node::element("changed again"))).unwrap();
        s.insert(&Record::orphan(Node::element("new"))).unwrap();
        s.remove(&doomed).unwrap();
        assert_eq!(s.rollback().unwrap(), 2);

        assert!(!s.in_journal());
        assert_eq!(s.container().size(), 2);
        assert_eq!(s.load(&kept).unwrap().root, Node::element("kept"));
        assert_eq!(s.load(&doomed).unwrap().root, Node::element("doomed"));
    }

    #[test]
    fn test_commit_applies_deferred_removals() {
        let mut s = store(256);
        let id = s.insert(&Record::orphan(Node::element("a"))).unwrap();

        s.begin();
        s.remove(&id).unwrap();
        assert!(s.load(&id).is_ok());
        s.commit().unwrap();

        assert_eq!(s.container().size(), 0);
        assert_eq!(s.metrics().snapshot().records_removed, 1);
    }

    #[test]
    fn test_corrupt_record_reported() {
        let mut s = store(256);
        let id = s.container_mut().insert(&[0, 99, 0, 0, 0xFF, 0xFF]).unwrap();
        let err = s.load(&id).unwrap_err();
        assert!(matches!(err, EngineError::FormatCorruption(_)));
    }
}
