//! Small arena DOM built from SAX events.
//!
//! Meant for the small package parts (relationships, content types, document
//! properties). Worksheets and shared strings are always streamed.

use super::error::Result;
use super::escape::unescape;
use super::sax::{Attr, HandlerResult, SaxHandler, SaxOptions, SaxReader, local_name};

/// Index of a node inside its [`XmlDocument`].
pub type NodeId = usize;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Qualified name as written (`dc:title`).
    pub name: String,
    /// Attributes in source order, values unescaped.
    pub attributes: Vec<(String, String)>,
    /// Unescaped direct character data.
    pub text: String,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl XmlNode {
    #[inline]
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct XmlDocument {
    nodes: Vec<XmlNode>,
}

impl XmlDocument {
    pub fn parse(input: &[u8]) -> Result<Self> {
        let mut builder = Builder::default();
        SaxReader::new(SaxOptions::default()).parse_bytes(input, &mut builder)?;
        Ok(XmlDocument {
            nodes: builder.nodes,
        })
    }

    /// The root element. Always present after a successful parse.
    pub fn root(&self) -> Option<NodeId> {
        if self.nodes.is_empty() { None } else { Some(0) }
    }

    pub fn node(&self, id: NodeId) -> &XmlNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &XmlNode> + '_ {
        self.nodes[id].children.iter().map(move |&c| &self.nodes[c])
    }

    /// First child whose local name matches.
    pub fn child(&self, id: NodeId, local: &str) -> Option<NodeId> {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].local_name() == local)
    }

    /// Text of the first child with the given local name.
    pub fn child_text(&self, id: NodeId, local: &str) -> Option<&str> {
        self.child(id, local).map(|c| self.nodes[c].text.as_str())
    }

    /// All descendants (depth-first, document order) with the given local name.
    pub fn descendants<'a>(&'a self, id: NodeId, local: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        std::iter::from_fn(move || {
            while let Some(next) = stack.pop() {
                stack.extend(self.nodes[next].children.iter().rev().copied());
                if self.nodes[next].local_name() == local {
                    return Some(next);
                }
            }
            None
        })
    }
}

#[derive(Default)]
struct Builder {
    nodes: Vec<XmlNode>,
    open: Vec<NodeId>,
}

impl SaxHandler for Builder {
    fn start_element(&mut self, name: &str, attrs: &[Attr<'_>], _depth: usize) -> HandlerResult {
        let id = self.nodes.len();
        let parent = self.open.last().copied();
        self.nodes.push(XmlNode {
            name: name.to_string(),
            attributes: attrs
                .iter()
                .map(|a| (a.name.to_string(), a.unescaped().into_owned()))
                .collect(),
            text: String::new(),
            children: Vec::new(),
            parent,
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        self.open.push(id);
        Ok(())
    }

    fn end_element(&mut self, _name: &str, _depth: usize) -> HandlerResult {
        self.open.pop();
        Ok(())
    }

    fn text(&mut self, text: &str, _depth: usize) -> HandlerResult {
        if let Some(&id) = self.open.last() {
            self.nodes[id].text = unescape(text).into_owned();
        }
        Ok(())
    }
}
