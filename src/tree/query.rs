//! Lazy location query
//!
//! Walks the logical tree depth-first in document order, expanding proxies
//! and scaffolds in place so that sibling positions are counted across
//! record boundaries. A record is loaded only when the walk reaches the proxy
//! that points at it.
//!
//! Every frame carries the set of steps its nodes are still matched against,
//! so a descendant step keeps searching below an element that matched it.
//! A match nested inside another match is returned too, after its ancestor,
//! in document order.

use std::collections::{HashMap, VecDeque};

use super::location::{Location, Step};
use super::EXTree;
use crate::container::Container;
use crate::error::{EngineError, EngineResult};
use crate::node::Node;

/// One element matched by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch<I> {
    /// Absolute location with an explicit index on every step
    pub location: Location,
    /// The matched element as stored, proxies included
    pub node: Node<I>,
    record: I,
    path: Vec<usize>,
}

impl<I> QueryMatch<I> {
    /// Record that physically holds the matched element
    pub fn record_id(&self) -> &I {
        &self.record
    }

    /// Child-index path from that record's root to the element
    pub fn path(&self) -> &[usize] {
        &self.path
    }
}

/// A node waiting to be visited, with where it physically lives
struct Pending<I> {
    node: Node<I>,
    record: I,
    path: Vec<usize>,
}

struct Frame<I> {
    pending: VecDeque<Pending<I>>,
    /// Steps the nodes of this frame are matched against
    steps: Vec<usize>,
    seen: HashMap<String, usize>,
    location: Vec<(String, usize)>,
}

pub struct Query<'t, C: Container> {
    tree: &'t EXTree<C>,
    steps: Vec<Step>,
    stack: Vec<Frame<C::Id>>,
    failed: bool,
}

impl<'t, C: Container> Query<'t, C> {
    pub(crate) fn new(tree: &'t EXTree<C>, location: &Location) -> Self {
        let mut query = Self {
            tree,
            steps: location.steps().to_vec(),
            stack: Vec::new(),
            failed: false,
        };
        query.restart();
        query
    }

    /// Rewinds to the beginning; records are read again as the walk proceeds
    pub fn restart(&mut self) {
        self.stack.clear();
        self.failed = false;
        if self.steps.is_empty() {
            return;
        }
        if let Some(root) = self.tree.root_id() {
            let mut pending = VecDeque::new();
            pending.push_back(Pending {
                node: Node::proxy(root.clone()),
                record: root.clone(),
                path: Vec::new(),
            });
            self.stack.push(Frame {
                pending,
                steps: vec![0],
                seen: HashMap::new(),
                location: Vec::new(),
            });
        }
    }

    fn expand(&mut self, id: &C::Id) -> EngineResult<()> {
        let record = self.tree.store().load(id)?;
        let frame = match self.stack.last_mut() {
            Some(frame) => frame,
            None => return Ok(()),
        };
        match record.root {
            Node::Scaffold(group) => {
                for (i, child) in group.into_children().into_iter().enumerate().rev() {
                    frame.pending.push_front(Pending {
                        node: child,
                        record: id.clone(),
                        path: vec![i],
                    });
                }
            }
            root => frame.pending.push_front(Pending {
                node: root,
                record: id.clone(),
                path: Vec::new(),
            }),
        }
        Ok(())
    }

    fn advance(&mut self) -> EngineResult<Option<QueryMatch<C::Id>>> {
        loop {
            let frame = match self.stack.last_mut() {
                Some(frame) => frame,
                None => return Ok(None),
            };
            let Pending { node, record, path } = match frame.pending.pop_front() {
                Some(p) => p,
                None => {
                    self.stack.pop();
                    continue;
                }
            };

            let mut markup = match node {
                Node::Proxy(proxy) => {
                    let id = proxy.child_id().cloned().ok_or_else(|| {
                        EngineError::Inconsistent(format!(
                            "unresolved proxy in record {}",
                            record
                        ))
                    })?;
                    self.expand(&id)?;
                    continue;
                }
                Node::Scaffold(group) => {
                    for (i, child) in group.into_children().into_iter().enumerate().rev() {
                        let mut child_path = path.clone();
                        child_path.push(i);
                        frame.pending.push_front(Pending {
                            node: child,
                            record: record.clone(),
                            path: child_path,
                        });
                    }
                    continue;
                }
                Node::Literal(_) => continue,
                Node::Markup(m) if m.is_attribute() => continue,
                Node::Markup(m) => m,
            };

            let position = {
                let count = frame.seen.entry(markup.tag().to_string()).or_insert(0);
                *count += 1;
                *count
            };
            let mut location = frame.location.clone();
            location.push((markup.tag().to_string(), position));

            let mut matched = false;
            let mut next_steps = Vec::new();
            for &s in &frame.steps {
                let step = &self.steps[s];
                if step.matches(markup.tag(), position) {
                    if s + 1 == self.steps.len() {
                        matched = true;
                    } else {
                        add_step(&mut next_steps, s + 1);
                    }
                }
                if step.descendant {
                    add_step(&mut next_steps, s);
                }
            }

            if matched {
                if !next_steps.is_empty() {
                    let children = markup.children().to_vec();
                    self.stack
                        .push(child_frame(children, &record, &path, next_steps, location.clone()));
                }
                let location = Location::from_steps(
                    location
                        .into_iter()
                        .map(|(tag, i)| Step::child(tag, Some(i)))
                        .collect(),
                );
                return Ok(Some(QueryMatch {
                    location,
                    node: Node::Markup(markup),
                    record,
                    path,
                }));
            }
            if next_steps.is_empty() {
                continue;
            }

            let children = std::mem::take(markup.children_mut());
            self.stack
                .push(child_frame(children, &record, &path, next_steps, location));
        }
    }
}

fn add_step(steps: &mut Vec<usize>, step: usize) {
    if !steps.contains(&step) {
        steps.push(step);
    }
}

/// Frame over the children of an element at `path` in `record`
fn child_frame<I: Clone>(
    children: Vec<Node<I>>,
    record: &I,
    path: &[usize],
    steps: Vec<usize>,
    location: Vec<(String, usize)>,
) -> Frame<I> {
    let pending = children
        .into_iter()
        .enumerate()
        .map(|(i, child)| {
            let mut child_path = path.to_vec();
            child_path.push(i);
            Pending {
                node: child,
                record: record.clone(),
                path: child_path,
            }
        })
        .collect();
    Frame {
        pending,
        steps,
        seen: HashMap::new(),
        location,
    }
}

impl<'t, C: Container> Iterator for Query<'t, C> {
    type Item = EngineResult<QueryMatch<C::Id>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(Some(m)) => Some(Ok(m)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                self.stack.clear();
                Some(Err(e))
            }
        }
    }
}

