//! Structural checks and shape statistics

use std::collections::HashSet;

use serde::Serialize;

use super::EXTree;
use crate::codec::encoded_size;
use crate::container::{Container, ContainerErrorCode};
use crate::error::{EngineError, EngineResult};
use crate::node::Node;
use crate::observability::{log_event_with_fields, Event};

/// Outcome of `EXTree::check_consistency`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsistencyReport {
    /// Records reached from the root
    pub records: usize,
    /// Logical nodes counted across those records
    pub nodes: usize,
    /// Live records nothing points at
    pub unreachable: usize,
    pub violations: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }

    /// Turns the first violation into an error
    pub fn into_result(self) -> EngineResult<()> {
        match self.violations.into_iter().next() {
            Some(first) => Err(EngineError::Inconsistent(first)),
            None => Ok(()),
        }
    }
}

/// Shape statistics of a stored tree
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TreeQuality {
    pub records: usize,
    /// Longest chain of records from the root, the root record counting 1
    pub record_depth: usize,
    /// Longest chain of elements in the logical document
    pub tree_height: usize,
    pub element_nodes: usize,
    pub attribute_nodes: usize,
    pub literal_nodes: usize,
    pub proxy_nodes: usize,
    pub scaffold_records: usize,
    pub single_child_scaffolds: usize,
    pub proxy_rooted_records: usize,
    pub literal_rooted_records: usize,
    /// Non-root records using less than half a page
    pub underfilled_records: usize,
    pub stored_bytes: usize,
    /// `stored_bytes` over the capacity of all records
    pub fill_ratio: f64,
}

impl<C: Container> EXTree<C> {
    /// Verifies every structural invariant of the stored tree.
    ///
    /// Violations are collected into the report; only container failures
    /// other than missing records abort the check.
    pub fn check_consistency(&self) -> EngineResult<ConsistencyReport> {
        let mut report = ConsistencyReport::default();
        let mut visited = HashSet::new();
        let mut pending: Vec<(C::Id, Option<C::Id>)> =
            self.root_id().map(|id| (id.clone(), None)).into_iter().collect();

        while let Some((id, expected_parent)) = pending.pop() {
            if !visited.insert(id.clone()) {
                report
                    .violations
                    .push(format!("record {} is reachable more than once", id));
                continue;
            }

            let record = match self.store().load(&id) {
                Ok(record) => record,
                Err(EngineError::Container(e))
                    if matches!(e.code(), ContainerErrorCode::XtreeContainerNotFound) =>
                {
                    report
                        .violations
                        .push(format!("proxy points at missing record {}", id));
                    continue;
                }
                Err(EngineError::FormatCorruption(reason)) => {
                    report
                        .violations
                        .push(format!("record {} cannot be decoded: {}", id, reason));
                    continue;
                }
                Err(e) => return Err(e),
            };
            report.records += 1;

            let size = encoded_size(&record);
            if size > self.capacity() {
                report.violations.push(format!(
                    "record {} takes {} bytes, capacity is {}",
                    id,
                    size,
                    self.capacity()
                ));
            }
            if record.parent_id != expected_parent {
                report.violations.push(format!(
                    "record {} links to parent {:?}, expected {:?}",
                    id, record.parent_id, expected_parent
                ));
            }
            if expected_parent.is_none() && !record.root.is_element() {
                report.violations.push(format!(
                    "root record {} is rooted by a {:?} node",
                    id,
                    record.root.kind()
                ));
            }
            if let Node::Scaffold(group) = &record.root {
                if group.is_empty() {
                    report.violations.push(format!("group record {} is empty", id));
                }
            }
            if record.root.children().iter().any(has_scaffold) {
                report
                    .violations
                    .push(format!("record {} holds a scaffold below its root", id));
            }

            report.nodes += record.root.logical_count();
            record.root.for_each_proxy(&mut |proxy| match proxy.child_id() {
                Some(child) => pending.push((child.clone(), Some(id.clone()))),
                None => report
                    .violations
                    .push(format!("record {} holds an unresolved proxy", id)),
            });
        }

        if report.nodes != self.node_count() {
            report.violations.push(format!(
                "node count is {}, stored records hold {}",
                self.node_count(),
                report.nodes
            ));
        }

        report.unreachable = self
            .container()
            .ids()
            .iter()
            .filter(|id| !visited.contains(*id))
            .count();
        if report.unreachable > 0 {
            report.violations.push(format!(
                "{} records are not reachable from the root",
                report.unreachable
            ));
        }

        if report.is_consistent() {
            log_event_with_fields(
                Event::ConsistencyOk,
                &[("records", report.records.to_string().as_str())],
            );
        } else {
            log_event_with_fields(
                Event::ConsistencyViolation,
                &[
                    ("first", report.violations[0].as_str()),
                    ("violations", report.violations.len().to_string().as_str()),
                ],
            );
        }
        Ok(report)
    }

    /// Collects shape statistics by walking every record once
    pub fn quality(&self) -> EngineResult<TreeQuality> {
        let mut q = TreeQuality::default();
        let root = match self.root_id() {
            Some(id) => id.clone(),
            None => return Ok(q),
        };

        // (record, record depth, element depth of the proxy holding it)
        let mut pending = vec![(root, 1usize, 0usize)];
        while let Some((id, depth, height)) = pending.pop() {
            let record = self.store().load(&id)?;
            let size = encoded_size(&record);

            q.records += 1;
            q.record_depth = q.record_depth.max(depth);
            q.stored_bytes += size;
            if record.parent_id.is_some() && size * 2 < self.capacity() {
                q.underfilled_records += 1;
            }
            match &record.root {
                Node::Scaffold(group) => {
                    q.scaffold_records += 1;
                    if group.len() == 1 {
                        q.single_child_scaffolds += 1;
                    }
                }
                Node::Proxy(_) => q.proxy_rooted_records += 1,
                Node::Literal(_) => q.literal_rooted_records += 1,
                Node::Markup(_) => {}
            }

            let mut children = Vec::new();
            tally(&record.root, height, &mut q, &mut children);
            pending.extend(
                children
                    .into_iter()
                    .map(|(child, height)| (child, depth + 1, height)),
            );
        }

        q.fill_ratio = q.stored_bytes as f64 / (q.records * self.capacity()) as f64;
        Ok(q)
    }
}

fn has_scaffold<I>(node: &Node<I>) -> bool {
    matches!(node, Node::Scaffold(_)) || node.children().iter().any(has_scaffold)
}

fn tally<I: Clone>(node: &Node<I>, height: usize, q: &mut TreeQuality, proxies: &mut Vec<(I, usize)>) {
    let height = match node {
        Node::Markup(m) if m.is_attribute() => {
            q.attribute_nodes += 1;
            height
        }
        Node::Markup(_) => {
            q.element_nodes += 1;
            q.tree_height = q.tree_height.max(height + 1);
            height + 1
        }
        Node::Literal(_) => {
            q.literal_nodes += 1;
            height
        }
        Node::Proxy(p) => {
            q.proxy_nodes += 1;
            if let Some(id) = p.child_id() {
                proxies.push((id.clone(), height));
            }
            height
        }
        Node::Scaffold(_) => height,
    };
    for child in node.children() {
        tally(child, height, q, proxies);
    }
}
