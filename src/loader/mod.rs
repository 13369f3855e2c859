//! Bulk loader
//!
//! Builds a document from a stream of start/characters/end events without
//! going through location resolution. Open elements live on an explicit
//! stack; an element is fragmented as soon as it closes, if its record would
//! not fit, and only then attached to its parent. The document element's
//! record is written by `finish`.
//!
//! The whole load runs in one store journal. A failed split aborts the load
//! and drops every group record it wrote; a loader dropped before `finish`
//! succeeds does the same.
//!
//! ```ignore
//! let mut loader = BulkLoader::new(&mut tree)?;
//! loader.start_element("doc", &[("lang", "en")])?;
//! loader.characters("hello")?;
//! loader.end_element()?;
//! let root = loader.finish()?;
//! ```

use serde::{Deserialize, Serialize};

use crate::codec::Record;
use crate::container::Container;
use crate::error::{EngineError, EngineResult};
use crate::node::{Markup, Node};
use crate::observability::ObservationScope;
use crate::tree::{check_name, EXTree};

/// One parser event.
///
/// Serialized one per line as
/// `{"event":"start","name":"doc","attributes":[["lang","en"]]}`,
/// `{"event":"characters","text":"hello"}` and `{"event":"end"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoadEvent {
    Start {
        name: String,
        #[serde(default)]
        attributes: Vec<(String, String)>,
    },
    Characters {
        text: String,
    },
    End,
}

impl LoadEvent {
    pub fn start(name: impl Into<String>) -> Self {
        LoadEvent::Start {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        LoadEvent::Characters { text: text.into() }
    }
}

pub struct BulkLoader<'t, C: Container> {
    tree: &'t mut EXTree<C>,
    stack: Vec<Node<C::Id>>,
    document: Option<Node<C::Id>>,
    nodes: usize,
    aborted: bool,
}

impl<'t, C: Container> BulkLoader<'t, C> {
    /// Starts loading into `tree`, which must be empty
    pub fn new(tree: &'t mut EXTree<C>) -> EngineResult<Self> {
        if !tree.is_empty() {
            return Err(EngineError::invalid_node(
                "bulk loading requires an empty tree",
            ));
        }
        tree.store_mut().begin();
        Ok(Self {
            tree,
            stack: Vec::new(),
            document: None,
            nodes: 0,
            aborted: false,
        })
    }

    fn ensure_active(&self) -> EngineResult<()> {
        if self.aborted {
            return Err(EngineError::invalid_node("bulk load was aborted"));
        }
        Ok(())
    }

    /// Drops everything written so far; later calls fail
    fn abort(&mut self, cause: &EngineError) {
        self.aborted = true;
        self.stack.clear();
        self.document = None;
        self.tree.roll_back(cause);
    }

    pub fn start_element(&mut self, name: &str, attributes: &[(&str, &str)]) -> EngineResult<()> {
        self.ensure_active()?;
        check_name(name)?;
        for (attr, _) in attributes {
            check_name(attr)?;
        }
        if self.document.is_some() {
            return Err(EngineError::invalid_node(format!(
                "element <{}> after the document element",
                name
            )));
        }
        let mut element = Markup::element(name);
        for (attr, value) in attributes {
            element.push(Markup::attribute(*attr, *value).into());
        }
        self.nodes += 1 + 2 * attributes.len();
        self.stack.push(element.into());
        Ok(())
    }

    /// Adds a text literal to the open element.
    ///
    /// Whitespace outside the document element is ignored.
    pub fn characters(&mut self, text: &str) -> EngineResult<()> {
        self.ensure_active()?;
        if text.is_empty() {
            return Ok(());
        }
        match self.stack.last_mut() {
            Some(open) => {
                open.push_child(Node::text(text))?;
                self.nodes += 1;
                Ok(())
            }
            None if text.trim().is_empty() => Ok(()),
            None => Err(EngineError::invalid_node(
                "text outside the document element",
            )),
        }
    }

    /// Closes the innermost open element
    pub fn end_element(&mut self) -> EngineResult<()> {
        self.ensure_active()?;
        let mut node = self
            .stack
            .pop()
            .ok_or_else(|| EngineError::invalid_node("end of element without a start"))?;

        let splitter = self.tree.splitter().clone();
        if let Err(e) = splitter.split(&mut node, self.tree.store_mut()) {
            self.abort(&e);
            return Err(e);
        }

        match self.stack.last_mut() {
            Some(parent) => parent.push_child(node),
            None => {
                self.document = Some(node);
                Ok(())
            }
        }
    }

    pub fn feed(&mut self, event: LoadEvent) -> EngineResult<()> {
        match event {
            LoadEvent::Start { name, attributes } => {
                let attributes: Vec<(&str, &str)> = attributes
                    .iter()
                    .map(|(n, v)| (n.as_str(), v.as_str()))
                    .collect();
                self.start_element(&name, &attributes)
            }
            LoadEvent::Characters { text } => self.characters(&text),
            LoadEvent::End => self.end_element(),
        }
    }

    /// Writes the root record and hands the document to the tree
    pub fn finish(mut self) -> EngineResult<C::Id> {
        self.ensure_active()?;
        if let Some(open) = self.stack.last() {
            let tag = open.as_markup().map(|m| m.tag().to_string()).unwrap_or_default();
            return Err(EngineError::invalid_node(format!("element <{}> is not closed", tag)));
        }
        let document = self
            .document
            .take()
            .ok_or_else(|| EngineError::invalid_node("no document element"))?;

        let nodes_field = self.nodes.to_string();
        let scope = ObservationScope::with_fields("BULK_LOAD", &[("nodes", nodes_field.as_str())]);

        let record = Record::orphan(document);
        let store = self.tree.store_mut();
        let result = store
            .insert(&record)
            .and_then(|id| store.relink(&id, &record.root).map(|_| id))
            .and_then(|id| store.commit().map(|_| id));
        match result {
            Ok(id) => {
                self.tree.commit_root(id.clone(), self.nodes);
                scope.complete_with_fields(&[("root_id", id.to_string().as_str())]);
                Ok(id)
            }
            Err(e) => {
                scope.fail(&e.to_string(), e.is_fatal());
                self.abort(&e);
                Err(e)
            }
        }
    }
}

impl<C: Container> Drop for BulkLoader<'_, C> {
    fn drop(&mut self) {
        if self.tree.store().in_journal() {
            self.abort(&EngineError::invalid_node("bulk load was not finished"));
        }
    }
}

impl<C: Container> EXTree<C> {
    /// Loads a whole document from `events` into this empty tree
    pub fn bulk_load<E>(&mut self, events: E) -> EngineResult<C::Id>
    where
        E: IntoIterator<Item = LoadEvent>,
    {
        let mut loader = BulkLoader::new(self)?;
        for event in events {
            loader.feed(event)?;
        }
        loader.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encoded_size;
    use crate::config::EngineConfig;
    use crate::container::MemoryContainer;

    fn tree(capacity: usize) -> EXTree<MemoryContainer> {
        EXTree::new(MemoryContainer::new(), &EngineConfig::with_capacity(capacity)).unwrap()
    }

    #[test]
    fn test_load_small_document() {
        let mut t = tree(4096);
        let mut loader = BulkLoader::new(&mut t).unwrap();
        loader.start_element("doc", &[("lang", "en")]).unwrap();
        loader.characters("hello").unwrap();
        loader.end_element().unwrap();
        let root = loader.finish().unwrap();

        assert_eq!(t.root_id(), Some(&root));
        assert_eq!(t.node_count(), 4);
        assert_eq!(t.container().size(), 1);
        assert_eq!(t.export_string(false).unwrap(), "<doc lang=\"en\">hello</doc>");
    }

    #[test]
    fn test_load_large_document_fits_pages() {
        let mut events = vec![LoadEvent::start("catalog")];
        for i in 0..200 {
            events.push(LoadEvent::Start {
                name: "book".to_string(),
                attributes: vec![("isbn".to_string(), format!("{:06}", i))],
            });
            events.push(LoadEvent::start("title"));
            events.push(LoadEvent::text(format!("Title number {}", i)));
            events.push(LoadEvent::End);
            events.push(LoadEvent::End);
        }
        events.push(LoadEvent::End);

        let mut t = tree(256);
        t.bulk_load(events).unwrap();
        assert_eq!(t.node_count(), 1 + 200 * 5);

        let report = t.check_consistency().unwrap();
        assert!(report.is_consistent(), "{:?}", report.violations);
        for id in t.container().ids() {
            let record = t.store().load(&id).unwrap();
            assert!(encoded_size(&record) <= 256);
        }
        assert_eq!(t.query("/catalog/book").unwrap().count(), 200);
    }

    #[test]
    fn test_unbalanced_events() {
        let mut t = tree(4096);
        let mut loader = BulkLoader::new(&mut t).unwrap();
        assert!(loader.end_element().is_err());
        loader.start_element("a", &[]).unwrap();
        assert!(loader.finish().is_err());
        assert!(t.is_empty());
    }

    #[test]
    fn test_content_outside_document() {
        let mut t = tree(4096);
        let mut loader = BulkLoader::new(&mut t).unwrap();
        loader.characters("\n  ").unwrap();
        assert!(loader.characters("stray").is_err());
        loader.start_element("a", &[]).unwrap();
        loader.end_element().unwrap();
        assert!(loader.start_element("b", &[]).is_err());
    }

    #[test]
    fn test_event_json() {
        let event: LoadEvent =
            serde_json::from_str(r#"{"event":"start","name":"doc","attributes":[["a","1"]]}"#).unwrap();
        assert_eq!(
            event,
            LoadEvent::Start {
                name: "doc".to_string(),
                attributes: vec![("a".to_string(), "1".to_string())],
            }
        );
        let event: LoadEvent = serde_json::from_str(r#"{"event":"start","name":"p"}"#).unwrap();
        assert_eq!(event, LoadEvent::start("p"));
        let event: LoadEvent = serde_json::from_str(r#"{"event":"characters","text":"hi"}"#).unwrap();
        assert_eq!(event, LoadEvent::text("hi"));
        let event: LoadEvent = serde_json::from_str(r#"{"event":"end"}"#).unwrap();
        assert_eq!(event, LoadEvent::End);
    }

    #[test]
    fn test_failed_split_drops_written_groups() {
        let mut t = tree(128);
        let mut loader = BulkLoader::new(&mut t).unwrap();
        loader.start_element("doc", &[]).unwrap();
        loader.start_element("list", &[]).unwrap();
        for i in 0..20 {
            loader.start_element("entry", &[]).unwrap();
            loader.characters(&format!("entry number {}", i)).unwrap();
            loader.end_element().unwrap();
        }
        loader.end_element().unwrap();
        loader.start_element("blob", &[]).unwrap();
        loader.characters(&"z".repeat(200)).unwrap();

        assert!(loader.end_element().is_err());
        assert!(loader.start_element("more", &[]).is_err());
        assert!(loader.finish().is_err());

        assert!(t.metrics().snapshot().records_inserted > 0);
        assert_eq!(t.container().size(), 0);
        assert!(t.is_empty());
        assert!(t.check_consistency().unwrap().is_consistent());
    }

    #[test]
    fn test_abandoned_load_is_rolled_back() {
        let mut t = tree(128);
        let mut loader = BulkLoader::new(&mut t).unwrap();
        loader.start_element("doc", &[]).unwrap();
        for _ in 0..20 {
            loader.start_element("entry", &[("k", "value")]).unwrap();
            loader.end_element().unwrap();
        }
        drop(loader);

        assert_eq!(t.container().size(), 0);
        assert!(!t.store().in_journal());
        t.insert_markup("/", "doc").unwrap();
        assert_eq!(t.container().size(), 1);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut t = tree(4096);
        let mut loader = BulkLoader::new(&mut t).unwrap();
        assert!(loader.start_element("", &[]).is_err());
        assert!(loader.start_element("9lives", &[]).is_err());
        assert!(loader.start_element("doc", &[("bad name", "v")]).is_err());
        loader.start_element("doc", &[("ok", "v")]).unwrap();
        loader.end_element().unwrap();
        loader.finish().unwrap();
        assert_eq!(t.node_count(), 3);
    }

    #[test]
    fn test_rejects_populated_tree() {
        let mut t = tree(4096);
        t.insert_markup("/", "doc").unwrap();
        assert!(BulkLoader::new(&mut t).is_err());
    }
}
