//! Subtree codec
//!
//! Serializes one physical record: a root node plus every descendant stored
//! inline with it. Proxies are leaves here; the records they point at are
//! encoded separately.
//!
//! ```text
//! record := parent_flag(u8) [parent_id]? node+
//! node   := type_tag(u8) internal_id(i16 BE) internal_parent_id(i16 BE) payload
//!
//! Markup   (1): name_len(u16 BE) name attribute_flag(u8)
//! Literal  (2): kind(u8) content_len(u16 BE) content
//! Proxy    (3): present(u8) [child_id]?
//! Scaffold (4): -
//! ```
//!
//! Internal ids are dense pre-order indices assigned during each `encode`
//! call; the record root has internal parent id `-1`. They only exist in the
//! byte stream and are used by `decode` to rebuild parent/child edges.

mod id;

pub use id::RecordId;

use crate::error::{EngineError, EngineResult};
use crate::node::{Literal, LiteralKind, Markup, Node, Proxy, Scaffold};

pub const TAG_MARKUP: u8 = 1;
pub const TAG_LITERAL: u8 = 2;
pub const TAG_PROXY: u8 = 3;
pub const TAG_SCAFFOLD: u8 = 4;

/// tag + internal id + internal parent id
pub const NODE_HEADER_LEN: usize = 1 + 2 + 2;

const NO_PARENT: i16 = -1;
const MAX_NODES_PER_RECORD: usize = i16::MAX as usize + 1;

/// One physical record: a root node and its inline descendants.
///
/// `parent_id` is the id of the record holding the proxy that points here;
/// the document root record has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<I> {
    pub parent_id: Option<I>,
    pub root: Node<I>,
}

impl<I> Record<I> {
    pub fn new(parent_id: Option<I>, root: Node<I>) -> Self {
        Self { parent_id, root }
    }

    pub fn orphan(root: Node<I>) -> Self {
        Self {
            parent_id: None,
            root,
        }
    }
}

/// Size of a single node's header and payload, children excluded.
pub fn node_size<I: RecordId>(node: &Node<I>) -> usize {
    NODE_HEADER_LEN
        + match node {
            Node::Markup(m) => 2 + m.tag().len() + 1,
            Node::Literal(l) => 1 + 2 + l.content().map_or(0, <[u8]>::len),
            Node::Proxy(p) => 1 + if p.child_id().is_some() { I::ENCODED_LEN } else { 0 },
            Node::Scaffold(_) => 0,
        }
}

/// Size of a node and all of its inline descendants.
pub fn subtree_size<I: RecordId>(node: &Node<I>) -> usize {
    node_size(node) + node.children().iter().map(subtree_size).sum::<usize>()
}

/// Exact number of bytes `encode` produces for `record`.
pub fn encoded_size<I: RecordId>(record: &Record<I>) -> usize {
    parent_header_size::<I>(record.parent_id.is_some()) + subtree_size(&record.root)
}

/// Size of `node` stored as a record root that carries a parent link.
///
/// Records are budgeted with this size even while their parent is not known
/// yet, so setting the link later never pushes a record over capacity.
pub fn linked_size<I: RecordId>(node: &Node<I>) -> usize {
    parent_header_size::<I>(true) + subtree_size(node)
}

/// Bytes taken by the parent flag and optional parent id.
pub fn parent_header_size<I: RecordId>(linked: bool) -> usize {
    1 + if linked { I::ENCODED_LEN } else { 0 }
}

/// Serializes a record.
pub fn encode<I: RecordId>(record: &Record<I>) -> EngineResult<Vec<u8>> {
    let mut out = Vec::with_capacity(encoded_size(record));
    match &record.parent_id {
        Some(id) => {
            out.push(1);
            id.write_to(&mut out);
        }
        None => out.push(0),
    }

    let mut next_id = 0usize;
    write_node(&record.root, NO_PARENT, &mut next_id, &mut out, true)?;
    Ok(out)
}

fn write_node<I: RecordId>(
    node: &Node<I>,
    parent: i16,
    next_id: &mut usize,
    out: &mut Vec<u8>,
    is_root: bool,
) -> EngineResult<()> {
    if *next_id >= MAX_NODES_PER_RECORD {
        return Err(EngineError::invalid_node(format!(
            "record holds more than {} nodes",
            MAX_NODES_PER_RECORD
        )));
    }
    let id = *next_id as i16;
    *next_id += 1;

    match node {
        Node::Markup(m) => {
            let name = m.tag().as_bytes();
            let name_len = checked_len(name.len(), "tag name")?;
            write_header(out, TAG_MARKUP, id, parent);
            out.extend_from_slice(&name_len.to_be_bytes());
            out.extend_from_slice(name);
            out.push(u8::from(m.is_attribute()));
        }
        Node::Literal(l) => {
            let content = l
                .content()
                .ok_or_else(|| EngineError::invalid_node("literal content required"))?;
            let content_len = checked_len(content.len(), "literal content")?;
            write_header(out, TAG_LITERAL, id, parent);
            out.push(l.kind().as_byte());
            out.extend_from_slice(&content_len.to_be_bytes());
            out.extend_from_slice(content);
        }
        Node::Proxy(p) => {
            write_header(out, TAG_PROXY, id, parent);
            match p.child_id() {
                Some(child) => {
                    out.push(1);
                    child.write_to(out);
                }
                None => out.push(0),
            }
        }
        Node::Scaffold(_) => {
            if !is_root {
                return Err(EngineError::invalid_node(
                    "scaffold node must be a record root",
                ));
            }
            write_header(out, TAG_SCAFFOLD, id, parent);
        }
    }

    for child in node.children() {
        write_node(child, id, next_id, out, false)?;
    }
    Ok(())
}

fn write_header(out: &mut Vec<u8>, tag: u8, id: i16, parent: i16) {
    out.push(tag);
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&parent.to_be_bytes());
}

fn checked_len(len: usize, what: &str) -> EngineResult<u16> {
    u16::try_from(len).map_err(|_| {
        EngineError::invalid_node(format!("{} of {} bytes exceeds 65535", what, len))
    })
}

/// Deserializes a record produced by `encode`.
pub fn decode<I: RecordId>(bytes: &[u8]) -> EngineResult<Record<I>> {
    let mut reader = ByteReader::new(bytes);

    let parent_id = match reader.u8()? {
        0 => None,
        1 => {
            let raw = reader.take(I::ENCODED_LEN)?;
            Some(I::read_from(raw).ok_or_else(|| {
                EngineError::corruption("parent id could not be decoded")
            })?)
        }
        other => {
            return Err(EngineError::corruption(format!(
                "invalid parent flag {}",
                other
            )))
        }
    };

    // Flat pre-order arena; edges are resolved against the open-ancestor stack.
    let mut nodes: Vec<Node<I>> = Vec::new();
    let mut kids: Vec<Vec<usize>> = Vec::new();
    let mut open: Vec<(i16, usize)> = Vec::new();

    while !reader.is_empty() {
        let offset = reader.position();
        let tag = reader.u8()?;
        let internal_id = reader.i16()?;
        let internal_parent = reader.i16()?;
        let index = nodes.len();

        if internal_id < 0 || internal_id as usize != index {
            return Err(EngineError::corruption(format!(
                "unexpected internal id {} at byte {} (expected {})",
                internal_id, offset, index
            )));
        }

        let node = read_payload::<I>(&mut reader, tag, offset)?;

        if index == 0 {
            if internal_parent != NO_PARENT {
                return Err(EngineError::corruption(format!(
                    "record root has internal parent {}",
                    internal_parent
                )));
            }
        } else {
            if matches!(node, Node::Scaffold(_)) {
                return Err(EngineError::corruption(format!(
                    "scaffold below the record root at byte {}",
                    offset
                )));
            }
            loop {
                match open.last() {
                    Some(&(id, slot)) if id == internal_parent => {
                        kids[slot].push(index);
                        break;
                    }
                    Some(_) => {
                        open.pop();
                    }
                    None => {
                        return Err(EngineError::corruption(format!(
                            "no ancestor with internal id {} for node {}",
                            internal_parent, internal_id
                        )))
                    }
                }
            }
        }

        if node.is_container() {
            open.push((internal_id, index));
        }
        nodes.push(node);
        kids.push(Vec::new());
    }

    if nodes.is_empty() {
        return Err(EngineError::corruption("record holds no nodes"));
    }

    let mut slots: Vec<Option<Node<I>>> = nodes.into_iter().map(Some).collect();
    let root = assemble(0, &mut slots, &kids)?;
    Ok(Record { parent_id, root })
}

fn read_payload<I: RecordId>(
    reader: &mut ByteReader<'_>,
    tag: u8,
    offset: usize,
) -> EngineResult<Node<I>> {
    let node = match tag {
        TAG_MARKUP => {
            let len = reader.u16()? as usize;
            let name = std::str::from_utf8(reader.take(len)?)
                .map_err(|e| EngineError::corruption(format!("tag name is not UTF-8: {}", e)))?
                .to_string();
            let node = match reader.u8()? {
                0 => Markup::new(name, false),
                1 => Markup::new(name, true),
                other => {
                    return Err(EngineError::corruption(format!(
                        "invalid attribute flag {} at byte {}",
                        other, offset
                    )))
                }
            };
            Node::Markup(node)
        }
        TAG_LITERAL => {
            let kind_byte = reader.u8()?;
            let kind = LiteralKind::from_byte(kind_byte).ok_or_else(|| {
                EngineError::corruption(format!(
                    "unknown literal kind {} at byte {}",
                    kind_byte, offset
                ))
            })?;
            let len = reader.u16()? as usize;
            Node::Literal(Literal::new(kind, reader.take(len)?.to_vec()))
        }
        TAG_PROXY => match reader.u8()? {
            0 => Node::Proxy(Proxy::unresolved()),
            1 => {
                let raw = reader.take(I::ENCODED_LEN)?;
                let id = I::read_from(raw)
                    .ok_or_else(|| EngineError::corruption("proxy id could not be decoded"))?;
                Node::Proxy(Proxy::to(id))
            }
            other => {
                return Err(EngineError::corruption(format!(
                    "invalid proxy presence flag {} at byte {}",
                    other, offset
                )))
            }
        },
        TAG_SCAFFOLD => Node::Scaffold(Scaffold::new()),
        other => {
            return Err(EngineError::corruption(format!(
                "unknown node tag {} at byte {}",
                other, offset
            )))
        }
    };
    Ok(node)
}

fn assemble<I>(
    index: usize,
    slots: &mut [Option<Node<I>>],
    kids: &[Vec<usize>],
) -> EngineResult<Node<I>> {
    let mut node = slots[index]
        .take()
        .ok_or_else(|| EngineError::corruption("node referenced twice"))?;
    for &child in &kids[index] {
        let child = assemble(child, slots, kids)?;
        node.push_child(child)?;
    }
    Ok(node)
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, len: usize) -> EngineResult<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(EngineError::corruption(format!(
                "record truncated: needed {} bytes at byte {}, {} available",
                len,
                self.pos,
                self.bytes.len() - self.pos
            ))),
        }
    }

    fn u8(&mut self) -> EngineResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> EngineResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> EngineResult<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }
}
