//! XML export
//!
//! The logical form is the document as a reader sees it. The physical form
//! keeps the storage structure visible: every proxied record is wrapped in
//! `<PROXY id="..">`, group records in `<SCAFFOLD>`, and attributes are
//! written as `<ATTRIBUTE name="..">` elements since a split may have moved
//! them away from their owner's start tag.

use std::io::Write;

use super::EXTree;
use crate::container::Container;
use crate::error::{EngineError, EngineResult};
use crate::node::{Literal, LiteralKind, Markup, Node};

impl<C: Container> EXTree<C> {
    /// Writes the document as XML; an empty tree writes nothing
    pub fn export<W: Write>(&self, writer: &mut W, include_physical_artifacts: bool) -> EngineResult<()> {
        let root = match self.root_id() {
            Some(id) => id.clone(),
            None => return Ok(()),
        };

        if include_physical_artifacts {
            self.write_physical(writer, &Node::proxy(root))?;
        } else if let Some(document) = self.document()? {
            write_logical(writer, &document)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn export_string(&self, include_physical_artifacts: bool) -> EngineResult<String> {
        let mut out = Vec::new();
        self.export(&mut out, include_physical_artifacts)?;
        String::from_utf8(out).map_err(|e| EngineError::invalid_node(e.to_string()))
    }

    fn write_physical<W: Write>(&self, w: &mut W, node: &Node<C::Id>) -> EngineResult<()> {
        match node {
            Node::Proxy(proxy) => {
                let id = proxy
                    .child_id()
                    .ok_or_else(|| EngineError::Inconsistent("unresolved proxy".to_string()))?;
                let record = self.store().load(id)?;
                write!(w, "<PROXY id=\"{}\">", id)?;
                self.write_physical(w, &record.root)?;
                write!(w, "</PROXY>")?;
            }
            Node::Scaffold(group) => {
                write!(w, "<SCAFFOLD>")?;
                for child in group.children() {
                    self.write_physical(w, child)?;
                }
                write!(w, "</SCAFFOLD>")?;
            }
            Node::Markup(m) if m.is_attribute() => {
                write!(w, "<ATTRIBUTE name=\"{}\">", escape(m.tag()))?;
                for child in m.children() {
                    self.write_physical(w, child)?;
                }
                write!(w, "</ATTRIBUTE>")?;
            }
            Node::Markup(m) => {
                if m.children().is_empty() {
                    write!(w, "<{}/>", m.tag())?;
                } else {
                    write!(w, "<{}>", m.tag())?;
                    for child in m.children() {
                        self.write_physical(w, child)?;
                    }
                    write!(w, "</{}>", m.tag())?;
                }
            }
            Node::Literal(lit) => write_literal(w, lit)?,
        }
        Ok(())
    }
}

/// Writes a materialized node; attributes go into the start tag
fn write_logical<I, W: Write>(w: &mut W, node: &Node<I>) -> EngineResult<()> {
    match node {
        Node::Markup(m) if !m.is_attribute() => write_element(w, m),
        Node::Literal(lit) => write_literal(w, lit),
        other => Err(EngineError::Inconsistent(format!(
            "{:?} node in a materialized document",
            other.kind()
        ))),
    }
}

fn write_element<I, W: Write>(w: &mut W, m: &Markup<I>) -> EngineResult<()> {
    write!(w, "<{}", m.tag())?;
    let mut content = Vec::new();
    for child in m.children() {
        match child {
            Node::Markup(attr) if attr.is_attribute() => {
                write!(w, " {}=\"{}\"", attr.tag(), escape(&attribute_text(attr)))?;
            }
            other => content.push(other),
        }
    }

    if content.is_empty() {
        write!(w, "/>")?;
        return Ok(());
    }
    write!(w, ">")?;
    for child in content {
        write_logical(w, child)?;
    }
    write!(w, "</{}>", m.tag())?;
    Ok(())
}

fn attribute_text<I>(attr: &Markup<I>) -> String {
    attr.children()
        .iter()
        .filter_map(|c| c.as_literal().map(literal_text))
        .collect()
}

fn write_literal<W: Write>(w: &mut W, lit: &Literal) -> EngineResult<()> {
    write!(w, "{}", escape(&literal_text(lit)))?;
    Ok(())
}

/// Text form of a literal; a byte literal prints as its number
fn literal_text(lit: &Literal) -> String {
    match (lit.kind(), lit.content()) {
        (LiteralKind::Byte, Some([b])) => b.to_string(),
        _ => lit.as_text().unwrap_or_default(),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::container::MemoryContainer;

    fn tree(capacity: usize) -> EXTree<MemoryContainer> {
        EXTree::new(MemoryContainer::new(), &EngineConfig::with_capacity(capacity)).unwrap()
    }

    #[test]
    fn test_logical_export() {
        let mut t = tree(4096);
        t.insert_markup("/", "doc").unwrap();
        t.insert_attribute("/doc", "id", "a\"b").unwrap();
        t.insert_markup("/doc", "p").unwrap();
        t.insert_literal("/doc/p", "1 < 2 & 3").unwrap();
        t.insert_markup("/doc", "br").unwrap();

        assert_eq!(
            t.export_string(false).unwrap(),
            "<doc id=\"a&quot;b\"><p>1 &lt; 2 &amp; 3</p><br/></doc>"
        );
    }

    #[test]
    fn test_typed_literal_export() {
        let mut t = tree(4096);
        t.insert_markup("/", "n").unwrap();
        t.insert_typed_literal("/n", LiteralKind::Integer, b"42").unwrap();
        t.insert_typed_literal("/n", LiteralKind::Byte, &[7]).unwrap();
        assert_eq!(t.export_string(false).unwrap(), "<n>427</n>");
    }

    #[test]
    fn test_empty_tree_exports_nothing() {
        assert_eq!(tree(4096).export_string(true).unwrap(), "");
    }

    #[test]
    fn test_physical_export_shows_records() {
        let mut t = tree(128);
        t.insert_markup("/", "doc").unwrap();
        for _ in 0..12 {
            t.insert_markup("/doc", "item").unwrap();
        }
        let root = *t.root_id().unwrap();

        let physical = t.export_string(true).unwrap();
        assert!(physical.starts_with(&format!("<PROXY id=\"{}\"><doc>", root)));
        assert!(physical.contains("<SCAFFOLD>"));
        assert_eq!(physical.matches("<item/>").count(), 12);

        let logical = t.export_string(false).unwrap();
        assert_eq!(logical, format!("<doc>{}</doc>", "<item/>".repeat(12)));
    }
}
