//! Page-fit splitter
//!
//! Fragments a node whose record would exceed the page capacity. The node's
//! children are packed, in order, into runs; every run is persisted as one
//! group record and replaced by a proxy. A group with several members is
//! rooted by a `Scaffold`; a single member becomes the record root itself,
//! and a lone proxy is reused without writing anything. Packing repeats over
//! the resulting proxies until the node fits.
//!
//! Children that do not fit into a page even alone are split first, so
//! fragmentation proceeds bottom-up. Leaves that are too large cannot be
//! fragmented and raise `CapacityViolation`.
//!
//! Groups are written without a parent link; the caller relinks them once
//! the split node has been stored.

mod first_fit;
mod ratio;

use serde::{Deserialize, Serialize};

use crate::codec::{self, linked_size, subtree_size, Record, RecordId, NODE_HEADER_LEN};
use crate::container::{Container, RecordStore};
use crate::error::{EngineError, EngineResult};
use crate::node::{Node, Scaffold};
use crate::observability::{log_event_with_fields, Event, ObservationScope, Severity};

/// How children are divided into groups
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Greedy packing in document order
    #[default]
    FirstFit,
    /// Recursive bisection at `left = ratio * right`
    Ratio { ratio: f64 },
}

/// Bytes a group record spends before its first member
pub(crate) fn group_overhead<I: RecordId>() -> usize {
    codec::parent_header_size::<I>(true) + NODE_HEADER_LEN
}

#[derive(Debug, Clone)]
pub struct Splitter {
    capacity: usize,
    policy: SplitPolicy,
}

impl Splitter {
    pub fn new(capacity: usize, policy: SplitPolicy) -> Self {
        Self { capacity, policy }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> SplitPolicy {
        self.policy
    }

    /// Whether `node` can be stored as a linked record root
    pub fn fits<I: RecordId>(&self, node: &Node<I>) -> bool {
        linked_size(node) <= self.capacity
    }

    /// Splits `node` in place until it fits into one page.
    ///
    /// A node that already fits is left untouched.
    pub fn split<C: Container>(
        &self,
        node: &mut Node<C::Id>,
        store: &mut RecordStore<C>,
    ) -> EngineResult<()> {
        let size = linked_size(node);
        if size <= self.capacity {
            return Ok(());
        }
        if node.children().is_empty() {
            return Err(self.violation(
                size,
                format!("{:?} node without children cannot be split", node.kind()),
            ));
        }

        store.metrics().increment_splits();
        let size_field = size.to_string();
        let scope =
            ObservationScope::at(Severity::Trace, "SPLIT", &[("size", size_field.as_str())]);
        match self.split_rounds(node, store) {
            Ok(groups) => {
                scope.complete_with_fields(&[("groups", groups.to_string().as_str())]);
                Ok(())
            }
            Err(e) => {
                scope.fail(&e.to_string(), e.is_fatal());
                Err(e)
            }
        }
    }

    fn split_rounds<C: Container>(
        &self,
        node: &mut Node<C::Id>,
        store: &mut RecordStore<C>,
    ) -> EngineResult<usize> {
        let mut groups = 0;
        loop {
            if let Some(children) = node.children_mut() {
                for child in children.iter_mut() {
                    if !self.fits(child) {
                        self.split(child, store)?;
                    }
                }
            }
            if self.fits(node) {
                return Ok(groups);
            }

            let before = node.children().len();
            let all_proxies = node.children().iter().all(|c| matches!(c, Node::Proxy(_)));

            let children = node.take_children();
            let sizes: Vec<usize> = children.iter().map(subtree_size).collect();
            let runs = match self.policy {
                SplitPolicy::FirstFit => first_fit::pack(children, &sizes, self.capacity),
                SplitPolicy::Ratio { ratio } => {
                    ratio::pack(children, &sizes, self.capacity, ratio)
                }
            };

            let mut proxies = Vec::with_capacity(runs.len());
            for run in runs {
                proxies.push(self.persist(run, store, &mut groups)?);
            }
            let after = proxies.len();
            if let Some(slot) = node.children_mut() {
                *slot = proxies;
            }

            let size = linked_size(node);
            if size <= self.capacity {
                return Ok(groups);
            }
            if all_proxies && after >= before {
                return Err(self.violation(
                    size,
                    format!("{} proxies cannot be grouped any further", after),
                ));
            }
        }
    }

    /// Writes one run as a record and returns the proxy that replaces it.
    fn persist<C: Container>(
        &self,
        mut run: Vec<Node<C::Id>>,
        store: &mut RecordStore<C>,
        groups: &mut usize,
    ) -> EngineResult<Node<C::Id>> {
        let root = if run.len() > 1 {
            Node::Scaffold(Scaffold::from_children(run))
        } else {
            match run.pop() {
                Some(Node::Proxy(p)) => return Ok(Node::Proxy(p)),
                Some(node) => node,
                None => return Err(EngineError::invalid_node("empty group")),
            }
        };

        let record = Record::orphan(root);
        let id = store.insert(&record)?;
        store.relink(&id, &record.root)?;

        *groups += 1;
        store.metrics().increment_groups();
        log_event_with_fields(
            Event::GroupPersisted,
            &[
                ("members", record.root.children().len().max(1).to_string().as_str()),
                ("record_id", id.to_string().as_str()),
            ],
        );
        Ok(Node::proxy(id))
    }

    fn violation(&self, size: usize, reason: String) -> EngineError {
        EngineError::CapacityViolation {
            size,
            capacity: self.capacity,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MemoryContainer;
    use crate::node::Markup;
    use crate::observability::MetricsRegistry;
    use std::sync::Arc;

    fn store(capacity: usize) -> RecordStore<MemoryContainer> {
        RecordStore::new(
            MemoryContainer::new(),
            capacity,
            Arc::new(MetricsRegistry::new()),
        )
    }

    /// `<item>` with an 80-byte text: 12 + 88 = 100 encoded bytes
    fn item(i: usize) -> Node<u64> {
        Markup::element("item")
            .with_child(Node::text(format!("{:0>80}", i)))
            .into()
    }

    fn wide_root(n: usize) -> Node<u64> {
        let mut root = Markup::element("root");
        for i in 0..n {
            root.push(item(i));
        }
        root.into()
    }

    #[test]
    fn test_item_size() {
        assert_eq!(subtree_size(&item(0)), 100);
    }

    #[test]
    fn test_fitting_node_untouched() {
        let mut s = store(4096);
        let mut node = wide_root(3);
        let before = node.clone();
        Splitter::new(4096, SplitPolicy::FirstFit)
            .split(&mut node, &mut s)
            .unwrap();
        assert_eq!(node, before);
        assert_eq!(s.container().size(), 0);
    }

    #[test]
    fn test_first_fit_groups() {
        let mut s = store(350);
        let mut node = wide_root(10);
        Splitter::new(350, SplitPolicy::FirstFit)
            .split(&mut node, &mut s)
            .unwrap();

        assert_eq!(node.children().len(), 4);
        assert!(node.children().iter().all(|c| c.as_proxy().is_some()));
        assert!(linked_size(&node) <= 350);
        // three scaffold groups and one lone item
        assert_eq!(s.container().size(), 4);
        assert_eq!(s.metrics().snapshot().groups_created, 4);

        let mut scaffolds = 0;
        for child in node.children() {
            let id = child.as_proxy().unwrap().child_id().unwrap();
            let record = s.load(id).unwrap();
            if let Node::Scaffold(g) = &record.root {
                assert_eq!(g.len(), 3);
                scaffolds += 1;
            } else {
                assert_eq!(record.root, item(9));
            }
        }
        assert_eq!(scaffolds, 3);
    }

    #[test]
    fn test_split_is_idempotent() {
        let mut s = store(350);
        let splitter = Splitter::new(350, SplitPolicy::FirstFit);
        let mut node = wide_root(10);
        splitter.split(&mut node, &mut s).unwrap();
        let once = node.clone();
        let records = s.container().size();

        splitter.split(&mut node, &mut s).unwrap();
        assert_eq!(node, once);
        assert_eq!(s.container().size(), records);
    }

    #[test]
    fn test_second_round_groups_proxies() {
        // 40 items need more proxies than one page holds
        let mut s = store(200);
        let mut node = wide_root(40);
        Splitter::new(200, SplitPolicy::FirstFit)
            .split(&mut node, &mut s)
            .unwrap();
        assert!(linked_size(&node) <= 200);

        // every stored record fits, and the logical content is all there
        let mut items = 0;
        let mut pending: Vec<u64> = node
            .children()
            .iter()
            .filter_map(|c| c.as_proxy().and_then(|p| p.child_id().copied()))
            .collect();
        while let Some(id) = pending.pop() {
            let record = s.load(&id).unwrap();
            assert!(linked_size(&record.root) <= 200);
            items += record.root.logical_count() / 2;
            record
                .root
                .for_each_proxy(&mut |p| pending.push(*p.child_id().unwrap()));
        }
        assert_eq!(items, 40);
    }

    #[test]
    fn test_nested_child_split_first() {
        let mut inner = Markup::element("inner");
        for i in 0..6 {
            inner.push(item(i));
        }
        let mut node: Node<u64> = Markup::element("outer").with_child(inner).into();

        let mut s = store(350);
        Splitter::new(350, SplitPolicy::FirstFit)
            .split(&mut node, &mut s)
            .unwrap();
        // only the inner element was fragmented; it stays inline
        assert!(linked_size(&node) <= 350);
        assert_eq!(node.logical_count(), 2);
        let inner = &node.children()[0];
        assert_eq!(inner.as_markup().unwrap().tag(), "inner");
        assert_eq!(inner.children().len(), 2);
        assert_eq!(s.container().size(), 2);
    }

    #[test]
    fn test_ratio_policy() {
        let mut s = store(350);
        let mut node = wide_root(8);
        Splitter::new(350, SplitPolicy::Ratio { ratio: 1.0 })
            .split(&mut node, &mut s)
            .unwrap();
        // halves of 400 bytes, then quarters of 200
        assert_eq!(node.children().len(), 4);
        assert!(linked_size(&node) <= 350);
    }

    #[test]
    fn test_oversized_literal() {
        let mut s = store(64);
        let mut node: Node<u64> = Markup::element("a")
            .with_child(Node::text("x".repeat(100)))
            .into();
        let err = Splitter::new(64, SplitPolicy::FirstFit)
            .split(&mut node, &mut s)
            .unwrap_err();
        assert!(matches!(err, EngineError::CapacityViolation { capacity: 64, .. }));
    }

    #[test]
    fn test_unreducible_fan_out() {
        let mut s = store(96);
        let tag = "t".repeat(70);
        let mut node: Node<u64> = Markup::element(tag).with_child(Node::text("x".repeat(10))).into();
        let err = Splitter::new(96, SplitPolicy::FirstFit)
            .split(&mut node, &mut s)
            .unwrap_err();
        assert!(err.to_string().contains("cannot be grouped"));
    }

    #[test]
    fn test_policy_serde() {
        let policy: SplitPolicy = serde_json::from_str(r#"{"strategy":"ratio","ratio":0.5}"#).unwrap();
        assert_eq!(policy, SplitPolicy::Ratio { ratio: 0.5 });
        let policy: SplitPolicy = serde_json::from_str(r#"{"strategy":"first_fit"}"#).unwrap();
        assert_eq!(policy, SplitPolicy::FirstFit);
    }
}
