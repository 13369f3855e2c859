//! Tree engine
//!
//! `EXTree` stores one document as a tree of page-sized records. Each
//! record holds a contiguous fragment of the document; a `Proxy` stands in
//! for a fragment stored in another record, and a `Scaffold` roots a record
//! that groups several siblings.
//!
//! # Invariants
//!
//! - every stored record encodes to at most `max_object_size` bytes
//! - every proxy points at a live record whose parent link names the
//!   record holding the proxy; the root record has no parent link
//! - every record is reachable from the root exactly once
//! - `node_count` equals the number of markup and literal nodes reachable
//!
//! # Error codes
//!
//! - XTREE_LOCATION_NOT_FOUND: the location resolves to no element
//! - XTREE_INVALID_NODE: the operation does not fit the tree's state
//! - XTREE_CAPACITY_VIOLATION: a leaf is larger than one page
//! - XTREE_INCONSISTENT: stored structure disagrees with itself

mod check;
mod export;
pub mod location;
mod manifest;
mod query;

pub use check::{ConsistencyReport, TreeQuality};
pub use location::{Location, Step};
pub use manifest::{TreeManifest, MANIFEST_FILE_NAME};
pub use query::{Query, QueryMatch};

use std::path::Path;
use std::sync::Arc;

use crate::codec::{encode, encoded_size, Record};
use crate::config::EngineConfig;
use crate::container::{Container, FileContainer, RecordStore};
use crate::error::{EngineError, EngineResult};
use crate::node::{Literal, LiteralKind, Markup, Node};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::split::Splitter;

pub struct EXTree<C: Container> {
    store: RecordStore<C>,
    splitter: Splitter,
    config: EngineConfig,
    root_id: Option<C::Id>,
    node_count: usize,
}

impl<C: Container> EXTree<C> {
    /// Creates an empty tree over `container`
    pub fn new(container: C, config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let tree = Self::assemble(container, config);
        log_event_with_fields(
            Event::TreeCreated,
            &[("max_object_size", config.max_object_size.to_string().as_str())],
        );
        Ok(tree)
    }

    /// Reattaches to a document already stored in `container`.
    ///
    /// The node count is recomputed by walking every record.
    pub fn open(container: C, config: &EngineConfig, root_id: Option<C::Id>) -> EngineResult<Self> {
        config.validate()?;
        let mut tree = Self::assemble(container, config);
        if let Some(id) = root_id {
            let record = tree.store.load(&id)?;
            if record.parent_id.is_some() {
                return Err(EngineError::Inconsistent(format!(
                    "record {} has a parent link and cannot be the root",
                    id
                )));
            }
            tree.root_id = Some(id);
            tree.node_count = tree.count_nodes()?;
        }
        log_event_with_fields(
            Event::TreeOpened,
            &[
                ("node_count", tree.node_count.to_string().as_str()),
                (
                    "root_id",
                    tree.root_id
                        .as_ref()
                        .map(|id| id.to_string())
                        .unwrap_or_default()
                        .as_str(),
                ),
            ],
        );
        Ok(tree)
    }

    fn assemble(container: C, config: &EngineConfig) -> Self {
        let capacity = config.max_object_size;
        Self {
            store: RecordStore::new(container, capacity, Arc::new(MetricsRegistry::new())),
            splitter: Splitter::new(capacity, config.split),
            config: config.clone(),
            root_id: None,
            node_count: 0,
        }
    }

    pub fn root_id(&self) -> Option<&C::Id> {
        self.root_id.as_ref()
    }

    /// Number of markup and literal nodes in the document
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn is_empty(&self) -> bool {
        self.root_id.is_none()
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        self.store.metrics()
    }

    pub fn container(&self) -> &C {
        self.store.container()
    }

    pub fn into_container(self) -> C {
        self.store.into_container()
    }

    /// Closes the underlying container
    pub fn close(&mut self) -> EngineResult<()> {
        self.store.container_mut().close()?;
        Ok(())
    }

    pub(crate) fn store(&self) -> &RecordStore<C> {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut RecordStore<C> {
        &mut self.store
    }

    pub(crate) fn splitter(&self) -> &Splitter {
        &self.splitter
    }

    /// Installs a document built outside the engine
    pub(crate) fn commit_root(&mut self, root_id: C::Id, node_count: usize) {
        self.root_id = Some(root_id);
        self.node_count = node_count;
    }

    // ==================
    // Insertion
    // ==================

    /// Appends element `tag` below the first element at `location`.
    ///
    /// On an empty tree `/` creates the document element.
    pub fn insert_markup(&mut self, location: &str, tag: &str) -> EngineResult<()> {
        let location = Location::parse(location)?;
        if !location.is_root() {
            return self.append(&location, Node::element(tag));
        }
        check_name(tag)?;
        if self.root_id.is_some() {
            return Err(EngineError::invalid_node("document element already exists"));
        }

        self.apply(|tree| {
            let record = Record::orphan(Node::element(tag));
            let id = tree.store.insert(&record)?;
            tree.root_id = Some(id);
            tree.node_count = 1;
            Ok(())
        })?;
        log_event_with_fields(Event::NodeInserted, &[("location", "/"), ("tag", tag)]);
        Ok(())
    }

    /// Appends a string literal below the first element at `location`
    pub fn insert_literal(&mut self, location: &str, value: &str) -> EngineResult<()> {
        self.append_at(location, Node::text(value))
    }

    pub fn insert_typed_literal(
        &mut self,
        location: &str,
        kind: LiteralKind,
        bytes: &[u8],
    ) -> EngineResult<()> {
        let literal = Literal::new(kind, bytes.to_vec());
        literal.value()?;
        self.append_at(location, literal.into())
    }

    /// Appends attribute `name="value"` to the first element at `location`
    pub fn insert_attribute(&mut self, location: &str, name: &str, value: &str) -> EngineResult<()> {
        self.append_at(location, Markup::attribute(name, value).into())
    }

    fn append_at(&mut self, location: &str, node: Node<C::Id>) -> EngineResult<()> {
        let location = Location::parse(location)?;
        if location.is_root() {
            return Err(EngineError::invalid_node(format!(
                "{:?} node needs an enclosing element",
                node.kind()
            )));
        }
        self.append(&location, node)
    }

    fn append(&mut self, location: &Location, node: Node<C::Id>) -> EngineResult<()> {
        if let Some(markup) = node.as_markup() {
            check_name(markup.tag())?;
        }
        // reject unencodable nodes before anything is written
        encode(&Record::orphan(node.clone()))?;

        let target = self.resolve(location)?;
        let (id, path) = (target.record_id().clone(), target.path().to_vec());
        let added = node.logical_count();
        self.apply(|tree| {
            let mut record = tree.store.load(&id)?;
            record
                .root
                .descendant_mut(&path)
                .ok_or_else(|| {
                    EngineError::Inconsistent(format!("record {} lost the node at {:?}", id, path))
                })?
                .push_child(node)?;
            tree.store_record(id.clone(), record, false)
        })?;

        self.node_count += added;
        log_event_with_fields(
            Event::NodeInserted,
            &[("location", target.location.to_string().as_str())],
        );
        Ok(())
    }

    /// Runs one mutation inside a store journal.
    ///
    /// On failure every record the mutation wrote is restored, records it
    /// created are dropped and the root and node count are put back.
    fn apply<T>(&mut self, op: impl FnOnce(&mut Self) -> EngineResult<T>) -> EngineResult<T> {
        let (root_id, node_count) = (self.root_id.clone(), self.node_count);
        self.store.begin();
        match op(self) {
            Ok(value) => {
                self.store.commit()?;
                Ok(value)
            }
            Err(e) => {
                self.root_id = root_id;
                self.node_count = node_count;
                self.roll_back(&e);
                Err(e)
            }
        }
    }

    /// Undoes every record write since `begin`, after `cause` failed
    pub(crate) fn roll_back(&mut self, cause: &EngineError) {
        match self.store.rollback() {
            Ok(undone) => log_event_with_fields(
                Event::OperationRolledBack,
                &[
                    ("reason", cause.to_string().as_str()),
                    ("records", undone.to_string().as_str()),
                ],
            ),
            Err(undo) => log_event_with_fields(
                Event::RollbackFailed,
                &[
                    ("reason", cause.to_string().as_str()),
                    ("rollback_error", undo.to_string().as_str()),
                ],
            ),
        }
    }

    /// First element at `location`
    fn resolve(&self, location: &Location) -> EngineResult<QueryMatch<C::Id>> {
        match self.query_location(location).next() {
            Some(found) => found,
            None => Err(EngineError::LocationNotFound(location.to_string())),
        }
    }

    /// Writes `record` back under `id`, restructuring it if it overflows.
    ///
    /// `relink` asks for the parent links of every proxied record to be
    /// refreshed, which is needed whenever proxies moved into this record.
    fn store_record(&mut self, id: C::Id, mut record: Record<C::Id>, relink: bool) -> EngineResult<()> {
        if encoded_size(&record) <= self.capacity() {
            self.store.update(&id, &record)?;
            if relink {
                self.store.relink(&id, &record.root)?;
            }
            return Ok(());
        }

        self.splitter.split(&mut record.root, &mut self.store)?;
        match record.parent_id.clone() {
            None => {
                self.store.update(&id, &record)?;
                self.store.relink(&id, &record.root)
            }
            Some(parent_id) => self.promote(id, parent_id, record.root),
        }
    }

    /// Moves a split record root into its parent record, in place of the
    /// proxy that pointed at it, and frees the record.
    fn promote(&mut self, id: C::Id, parent_id: C::Id, separator: Node<C::Id>) -> EngineResult<()> {
        let mut parent = self.store.load(&parent_id)?;
        let slot = find_proxy(&parent.root, &id).ok_or_else(|| {
            EngineError::Inconsistent(format!(
                "record {} holds no proxy to its child {}",
                parent_id, id
            ))
        })?;
        let (index, holder) = split_slot(&mut parent.root, &slot, &parent_id)?;

        match separator {
            Node::Scaffold(group) => {
                holder.splice(index..=index, group.into_children());
            }
            node => holder[index] = node,
        }

        self.store.metrics().increment_promotions();
        log_event_with_fields(
            Event::RecordPromoted,
            &[
                ("into", parent_id.to_string().as_str()),
                ("record_id", id.to_string().as_str()),
            ],
        );
        self.store_record(parent_id, parent, true)?;
        self.store.remove(&id)
    }

    // ==================
    // Removal
    // ==================

    /// Removes the element at `location` with its whole subtree.
    ///
    /// When the location matches several elements, the first one in
    /// document order is removed. Removing the document element empties
    /// the tree.
    pub fn remove_markup(&mut self, location: &str) -> EngineResult<()> {
        let location = Location::parse(location)?;
        let target = self.resolve(&location)?;
        let id = target.record_id().clone();
        let path = target.path().to_vec();

        if Some(&id) == self.root_id.as_ref() && path.is_empty() {
            return self.clear();
        }

        let removed = self.apply(|tree| {
            let mut record = tree.store.load(&id)?;
            match path.split_last() {
                None => {
                    // the element roots its own record
                    let count = tree.free_subtree(&record.root)?;
                    tree.store.remove(&id)?;
                    let parent_id = record.parent_id.ok_or_else(|| {
                        EngineError::Inconsistent(format!("record {} has no parent link", id))
                    })?;
                    tree.detach(parent_id, &id)?;
                    Ok(count)
                }
                Some((&last, parent_path)) => {
                    let node = record
                        .root
                        .descendant_mut(parent_path)
                        .and_then(|parent| parent.remove_child(last))
                        .ok_or_else(|| {
                            EngineError::Inconsistent(format!(
                                "record {} lost the node at {:?}",
                                id, path
                            ))
                        })?;
                    let count = tree.free_subtree(&node)?;
                    tree.shrink(id.clone(), record)?;
                    Ok(count)
                }
            }
        })?;

        self.node_count = self.node_count.saturating_sub(removed);
        log_event_with_fields(
            Event::SubtreeRemoved,
            &[
                ("location", target.location.to_string().as_str()),
                ("nodes", removed.to_string().as_str()),
            ],
        );
        Ok(())
    }

    /// Removes every record, leaving the tree empty
    pub fn clear(&mut self) -> EngineResult<()> {
        self.apply(|tree| {
            if let Some(id) = tree.root_id.take() {
                let record = tree.store.load(&id)?;
                tree.free_subtree(&record.root)?;
                tree.store.remove(&id)?;
            }
            tree.node_count = 0;
            Ok(())
        })?;
        log_event_with_fields(Event::TreeCleared, &[]);
        Ok(())
    }

    /// Frees every record reachable through proxies below `node`.
    ///
    /// Returns the number of logical nodes removed, `node` itself included.
    fn free_subtree(&mut self, node: &Node<C::Id>) -> EngineResult<usize> {
        let mut count = match node {
            Node::Markup(_) | Node::Literal(_) => 1,
            Node::Scaffold(_) => 0,
            Node::Proxy(proxy) => {
                let id = match proxy.child_id() {
                    Some(id) => id.clone(),
                    None => return Ok(0),
                };
                let record = self.store.load(&id)?;
                let count = self.free_subtree(&record.root)?;
                self.store.remove(&id)?;
                return Ok(count);
            }
        };
        for child in node.children() {
            count += self.free_subtree(child)?;
        }
        Ok(count)
    }

    /// Drops the proxy to `child` from record `parent_id`
    fn detach(&mut self, parent_id: C::Id, child: &C::Id) -> EngineResult<()> {
        let mut parent = self.store.load(&parent_id)?;
        let slot = find_proxy(&parent.root, child).ok_or_else(|| {
            EngineError::Inconsistent(format!(
                "record {} holds no proxy to its child {}",
                parent_id, child
            ))
        })?;
        let (index, holder) = split_slot(&mut parent.root, &slot, &parent_id)?;
        holder.remove(index);
        self.shrink(parent_id, parent)
    }

    /// Stores a record that lost a child.
    ///
    /// An emptied group record is deleted together with its proxy; a group
    /// left with one member is collapsed.
    fn shrink(&mut self, id: C::Id, mut record: Record<C::Id>) -> EngineResult<()> {
        let group = match &mut record.root {
            Node::Scaffold(group) if group.len() <= 1 => group,
            _ => return self.store_record(id, record, false),
        };
        let parent_id = record.parent_id.clone().ok_or_else(|| {
            EngineError::Inconsistent(format!("group record {} has no parent link", id))
        })?;

        self.store.metrics().increment_collapses();
        log_event_with_fields(
            Event::GroupCollapsed,
            &[
                ("members", group.len().to_string().as_str()),
                ("record_id", id.to_string().as_str()),
            ],
        );

        match group.pop() {
            None => {
                self.store.remove(&id)?;
                self.detach(parent_id, &id)
            }
            Some(Node::Proxy(proxy)) => {
                let mut parent = self.store.load(&parent_id)?;
                let slot = find_proxy(&parent.root, &id).ok_or_else(|| {
                    EngineError::Inconsistent(format!(
                        "record {} holds no proxy to its child {}",
                        parent_id, id
                    ))
                })?;
                let target = proxy.child_id().cloned();
                let (index, holder) = split_slot(&mut parent.root, &slot, &parent_id)?;
                holder[index] = Node::Proxy(proxy);
                self.store.update(&parent_id, &parent)?;
                self.store.remove(&id)?;
                match target {
                    Some(target) => self.store.set_parent(&target, Some(parent_id)),
                    None => Ok(()),
                }
            }
            Some(member) => {
                record.root = member;
                self.store.update(&id, &record)
            }
        }
    }

    // ==================
    // Reading
    // ==================

    /// Lazily iterates over every element at `location`
    pub fn query(&self, location: &str) -> EngineResult<Query<'_, C>> {
        Ok(self.query_location(&Location::parse(location)?))
    }

    pub fn query_location(&self, location: &Location) -> Query<'_, C> {
        Query::new(self, location)
    }

    /// The logical document with every proxy replaced by its content
    pub fn document(&self) -> EngineResult<Option<Node<C::Id>>> {
        let id = match &self.root_id {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        let mut out = Vec::new();
        self.materialize_into(Node::proxy(id), &mut out)?;
        Ok(out.pop())
    }

    /// Resolves `node` into logical nodes appended to `out`
    pub(crate) fn materialize_into(&self, node: Node<C::Id>, out: &mut Vec<Node<C::Id>>) -> EngineResult<()> {
        match node {
            Node::Proxy(proxy) => {
                let id = proxy
                    .child_id()
                    .ok_or_else(|| EngineError::Inconsistent("unresolved proxy".to_string()))?;
                let record = self.store.load(id)?;
                self.materialize_into(record.root, out)
            }
            Node::Scaffold(group) => {
                for child in group.into_children() {
                    self.materialize_into(child, out)?;
                }
                Ok(())
            }
            Node::Markup(mut markup) => {
                let children = std::mem::take(markup.children_mut());
                for child in children {
                    self.materialize_into(child, markup.children_mut())?;
                }
                out.push(Node::Markup(markup));
                Ok(())
            }
            literal @ Node::Literal(_) => {
                out.push(literal);
                Ok(())
            }
        }
    }

    fn count_nodes(&self) -> EngineResult<usize> {
        let mut count = 0;
        let mut pending: Vec<C::Id> = self.root_id.iter().cloned().collect();
        while let Some(id) = pending.pop() {
            let record = self.store.load(&id)?;
            count += record.root.logical_count();
            record.root.for_each_proxy(&mut |p| {
                if let Some(child) = p.child_id() {
                    pending.push(child.clone());
                }
            });
        }
        Ok(count)
    }
}

impl EXTree<FileContainer> {
    /// Opens the tree stored under `data_dir`, starting empty if the
    /// directory holds no manifest yet
    pub fn open_dir(data_dir: &Path, config: &EngineConfig) -> EngineResult<Self> {
        let container = FileContainer::open(data_dir, config.sync_writes)?;
        match TreeManifest::load(data_dir)? {
            Some(manifest) => {
                manifest.check_capacity(config.max_object_size)?;
                let tree = Self::open(container, config, manifest.root_id)?;
                if tree.node_count != manifest.node_count {
                    return Err(EngineError::Inconsistent(format!(
                        "manifest records {} nodes, store holds {}",
                        manifest.node_count, tree.node_count
                    )));
                }
                Ok(tree)
            }
            None => Self::new(container, config),
        }
    }

    /// Writes the manifest that `open_dir` reads back
    pub fn save_manifest(&self, data_dir: &Path) -> EngineResult<()> {
        TreeManifest {
            root_id: self.root_id,
            node_count: self.node_count,
            max_object_size: self.capacity(),
        }
        .save(data_dir)
    }
}

/// Rejects tag and attribute names that are not XML names
pub(crate) fn check_name(name: &str) -> EngineResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_alphabetic() || first == '_' || first == ':')
                && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.'))
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(EngineError::invalid_node(format!("'{}' is not a valid name", name)))
    }
}

/// Path to the proxy pointing at `id` inside `node`
fn find_proxy<I: PartialEq>(node: &Node<I>, id: &I) -> Option<Vec<usize>> {
    if let Node::Proxy(proxy) = node {
        return (proxy.child_id() == Some(id)).then(Vec::new);
    }
    for (i, child) in node.children().iter().enumerate() {
        if let Some(mut path) = find_proxy(child, id) {
            path.insert(0, i);
            return Some(path);
        }
    }
    None
}

/// Child list holding the node at `slot`, and its index there
fn split_slot<'n, I: std::fmt::Display>(
    root: &'n mut Node<I>,
    slot: &[usize],
    record: &I,
) -> EngineResult<(usize, &'n mut Vec<Node<I>>)> {
    let inconsistent = || EngineError::Inconsistent(format!("record {} is rooted by a proxy", record));
    let (&index, holder_path) = slot.split_last().ok_or_else(inconsistent)?;
    let holder = root
        .descendant_mut(holder_path)
        .and_then(Node::children_mut)
        .ok_or_else(inconsistent)?;
    Ok((index, holder))
}
