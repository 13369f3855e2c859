//! In-memory node model
//!
//! A document is a tree of four node variants:
//!
//! - `Markup`: an element or, with `is_attribute`, an attribute owning one literal
//! - `Literal`: a typed byte payload, always a leaf
//! - `Proxy`: a typed reference to another physical record
//! - `Scaffold`: a grouping node that only the splitter creates
//!
//! Nodes own their children exclusively. Equality and hashing are
//! structural; the per-record internal ids used by the codec are never
//! stored on the nodes.

mod literal;

pub use literal::{Literal, LiteralKind, LiteralValue};

use crate::error::{EngineError, EngineResult};

/// Element or attribute node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Markup<I> {
    tag: String,
    is_attribute: bool,
    children: Vec<Node<I>>,
}

impl<I> Markup<I> {
    /// Creates a childless markup node
    pub fn new(tag: impl Into<String>, is_attribute: bool) -> Self {
        Self {
            tag: tag.into(),
            is_attribute,
            children: Vec::new(),
        }
    }

    pub fn element(tag: impl Into<String>) -> Self {
        Self::new(tag, false)
    }

    /// Creates an attribute holding a single string literal
    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag: name.into(),
            is_attribute: true,
            children: vec![Node::Literal(Literal::text(value))],
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_attribute(&self) -> bool {
        self.is_attribute
    }

    pub fn children(&self) -> &[Node<I>] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Node<I>> {
        &mut self.children
    }

    pub fn push(&mut self, child: Node<I>) {
        self.children.push(child);
    }

    /// Builder-style append
    pub fn with_child(mut self, child: impl Into<Node<I>>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Value of an inline attribute's literal, if this is an attribute
    pub fn attribute_value(&self) -> Option<String> {
        if !self.is_attribute {
            return None;
        }
        match self.children.first() {
            Some(Node::Literal(lit)) => lit.as_text(),
            _ => None,
        }
    }
}

/// Reference to another physical record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Proxy<I> {
    child_id: Option<I>,
}

impl<I> Proxy<I> {
    pub fn to(id: I) -> Self {
        Self { child_id: Some(id) }
    }

    /// A proxy whose target has not been materialized yet
    pub fn unresolved() -> Self {
        Self { child_id: None }
    }

    pub fn child_id(&self) -> Option<&I> {
        self.child_id.as_ref()
    }

    pub fn set_child_id(&mut self, id: Option<I>) {
        self.child_id = id;
    }
}

/// Grouping node used while packing children into pages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scaffold<I> {
    children: Vec<Node<I>>,
}

impl<I> Default for Scaffold<I> {
    fn default() -> Self {
        Self {
            children: Vec::new(),
        }
    }
}

impl<I> Scaffold<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_children(children: Vec<Node<I>>) -> Self {
        Self { children }
    }

    pub fn children(&self) -> &[Node<I>] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Node<I>> {
        &mut self.children
    }

    pub fn push(&mut self, child: Node<I>) {
        self.children.push(child);
    }

    pub fn pop(&mut self) -> Option<Node<I>> {
        self.children.pop()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn into_children(self) -> Vec<Node<I>> {
        self.children
    }
}

/// Discriminant of a node, matching the codec's type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Markup,
    Literal,
    Proxy,
    Scaffold,
}

/// A tree element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node<I> {
    Markup(Markup<I>),
    Literal(Literal),
    Proxy(Proxy<I>),
    Scaffold(Scaffold<I>),
}

impl<I> Node<I> {
    pub fn element(tag: impl Into<String>) -> Self {
        Node::Markup(Markup::element(tag))
    }

    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Node::Markup(Markup::attribute(name, value))
    }

    pub fn text(content: impl Into<String>) -> Self {
        Node::Literal(Literal::text(content))
    }

    pub fn proxy(id: I) -> Self {
        Node::Proxy(Proxy::to(id))
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Markup(_) => NodeKind::Markup,
            Node::Literal(_) => NodeKind::Literal,
            Node::Proxy(_) => NodeKind::Proxy,
            Node::Scaffold(_) => NodeKind::Scaffold,
        }
    }

    /// Children in declared order; leaves have none
    pub fn children(&self) -> &[Node<I>] {
        match self {
            Node::Markup(m) => &m.children,
            Node::Scaffold(s) => &s.children,
            Node::Literal(_) | Node::Proxy(_) => &[],
        }
    }

    /// Mutable child list, `None` for leaf variants
    pub fn children_mut(&mut self) -> Option<&mut Vec<Node<I>>> {
        match self {
            Node::Markup(m) => Some(&mut m.children),
            Node::Scaffold(s) => Some(&mut s.children),
            Node::Literal(_) | Node::Proxy(_) => None,
        }
    }

    /// Appends a child; literals and proxies cannot own children.
    pub fn push_child(&mut self, child: Node<I>) -> EngineResult<()> {
        match self.children_mut() {
            Some(children) => {
                children.push(child);
                Ok(())
            }
            None => Err(EngineError::invalid_node(format!(
                "{:?} node cannot have children",
                self.kind()
            ))),
        }
    }

    /// Removes and returns the child at `index`
    pub fn remove_child(&mut self, index: usize) -> Option<Node<I>> {
        let children = self.children_mut()?;
        if index < children.len() {
            Some(children.remove(index))
        } else {
            None
        }
    }

    /// Takes the child list, leaving the node childless
    pub fn take_children(&mut self) -> Vec<Node<I>> {
        self.children_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn as_markup(&self) -> Option<&Markup<I>> {
        match self {
            Node::Markup(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Node::Literal(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Proxy<I>> {
        match self {
            Node::Proxy(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, Node::Markup(m) if !m.is_attribute)
    }

    /// Whether the node can hold children
    pub fn is_container(&self) -> bool {
        matches!(self, Node::Markup(_) | Node::Scaffold(_))
    }

    /// Number of logical nodes stored inline (markup and literals).
    ///
    /// Proxies and scaffolds are structure, not content, and are not counted.
    pub fn logical_count(&self) -> usize {
        let own = match self {
            Node::Markup(_) | Node::Literal(_) => 1,
            Node::Proxy(_) | Node::Scaffold(_) => 0,
        };
        own + self
            .children()
            .iter()
            .map(Node::logical_count)
            .sum::<usize>()
    }

    /// Calls `f` for every proxy stored inline below (and including) this node
    pub fn for_each_proxy(&self, f: &mut impl FnMut(&Proxy<I>)) {
        match self {
            Node::Proxy(p) => f(p),
            _ => {
                for child in self.children() {
                    child.for_each_proxy(f);
                }
            }
        }
    }

    /// Follows a path of child indices
    pub fn descendant(&self, path: &[usize]) -> Option<&Node<I>> {
        let mut node = self;
        for &i in path {
            node = node.children().get(i)?;
        }
        Some(node)
    }

    pub fn descendant_mut(&mut self, path: &[usize]) -> Option<&mut Node<I>> {
        let mut node = self;
        for &i in path {
            node = node.children_mut()?.get_mut(i)?;
        }
        Some(node)
    }
}

impl<I> From<Markup<I>> for Node<I> {
    fn from(m: Markup<I>) -> Self {
        Node::Markup(m)
    }
}

impl<I> From<Literal> for Node<I> {
    fn from(l: Literal) -> Self {
        Node::Literal(l)
    }
}

impl<I> From<Proxy<I>> for Node<I> {
    fn from(p: Proxy<I>) -> Self {
        Node::Proxy(p)
    }
}

impl<I> From<Scaffold<I>> for Node<I> {
    fn from(s: Scaffold<I>) -> Self {
        Node::Scaffold(s)
    }
}
