//! Lenient markup parser producing an arena tree with byte-offset spans.
//!
//! The parser understands as much HTML as templates need: elements with
//! ordered attributes, text, comments, void and raw-text elements and
//! `<template>` content fragments. It does not decode entities or apply
//! HTML5 implied end tags.

use crate::selector::SelectorTarget;
use crate::types::Span;
use thiserror::Error;

/// Elements that never have children or an end tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is kept as raw text.
pub const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Errors raised while parsing markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MarkupError {
    /// A comment is missing its `-->`.
    #[error("unterminated comment starting at offset {offset}")]
    UnterminatedComment {
        /// Offset of the `<!--`.
        offset: usize,
    },

    /// A start or end tag is missing its `>` or has an unterminated quoted value.
    #[error("unterminated tag starting at offset {offset}")]
    UnterminatedTag {
        /// Offset of the `<`.
        offset: usize,
    },
}

/// Index of a node in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One attribute of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Lower-case name.
    pub name: String,
    /// Raw value, empty if the attribute has none.
    pub value: String,
    /// Span of the whole attribute, name through closing quote.
    pub span: Span,
    /// Span of the value without quotes, absent if there is no value.
    pub value_span: Option<Span>,
}

/// Element payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    /// Lower-case tag name.
    pub tag_name: String,
    /// Attributes in source order. Duplicates after the first are dropped.
    pub attrs: Vec<Attribute>,
    /// Span of the start tag.
    pub start_tag: Span,
    /// Span of the end tag, if present.
    pub end_tag: Option<Span>,
    /// Span from the start tag to the end of the element.
    pub span: Span,
    /// Content fragment of a `<template>` element.
    pub content: Option<NodeId>,
}

impl ElementData {
    /// Finds an attribute by lower-case name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attrs.iter().find(|a| a.name == name)
    }
}

/// Node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Document root or template content.
    Fragment,
    /// An element.
    Element(ElementData),
    /// A text run.
    Text {
        /// Raw text.
        text: String,
        /// Span of the text.
        span: Span,
    },
    /// A comment, including bogus `<!...>` and `<?...>` constructs.
    Comment {
        /// Text between the delimiters.
        data: String,
        /// Span including the delimiters.
        span: Span,
    },
}

/// A node with its links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Parent node, absent for the root.
    pub parent: Option<NodeId>,
    /// Children in document order.
    pub children: Vec<NodeId>,
    /// Payload.
    pub kind: NodeKind,
}

/// Parsed markup document.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Default for Tree {
    /// An empty document.
    fn default() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Fragment,
            }],
        }
    }
}

impl Tree {
    /// Parses `source` into a tree.
    ///
    /// # Errors
    ///
    /// Returns an error for an unterminated comment or tag.
    pub fn parse(source: &str) -> Result<Self, MarkupError> {
        Parser::new(source).run()
    }

    /// The root fragment.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Returns a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Returns the element view of a node, if it is an element.
    #[must_use]
    pub fn element(&self, id: NodeId) -> Option<Element<'_>> {
        matches!(self.node(id).kind, NodeKind::Element(_)).then_some(Element { tree: self, id })
    }

    /// Children of a node, or the content of a template element.
    fn descend(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Element(ElementData {
                content: Some(content),
                ..
            }) => &self.node(*content).children,
            _ => &self.node(id).children,
        }
    }

    /// Visits elements depth-first in document order.
    ///
    /// Returning `false` from `visit` skips the element's subtree. The
    /// content of `<template>` elements is visited in place of children.
    pub fn traverse_elements<'a>(&'a self, mut visit: impl FnMut(Element<'a>) -> bool) {
        let mut stack: Vec<NodeId> = self.descend(self.root()).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(element) = self.element(id) else {
                continue;
            };
            if visit(element) {
                stack.extend(self.descend(id).iter().rev().copied());
            }
        }
    }

    /// Visits every node depth-first in document order, including template content.
    pub fn traverse_nodes<'a>(&'a self, mut visit: impl FnMut(NodeId, &'a Node)) {
        let mut stack: Vec<NodeId> = self.descend(self.root()).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            visit(id, self.node(id));
            stack.extend(self.descend(id).iter().rev().copied());
        }
    }

    /// Comments in document order as `(span, data)`.
    #[must_use]
    pub fn comments(&self) -> Vec<(Span, &str)> {
        let mut comments = Vec::new();
        self.traverse_nodes(|_, node| {
            if let NodeKind::Comment { data, span } = &node.kind {
                comments.push((*span, data.as_str()));
            }
        });
        comments
    }
}

/// An element node borrowed from its tree.
#[derive(Debug, Clone, Copy)]
pub struct Element<'a> {
    tree: &'a Tree,
    id: NodeId,
}

impl<'a> Element<'a> {
    /// Node id of this element.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Element payload.
    #[must_use]
    pub fn data(&self) -> &'a ElementData {
        match &self.tree.node(self.id).kind {
            NodeKind::Element(data) => data,
            _ => unreachable!("element view over a non-element node"),
        }
    }

    /// Lower-case tag name.
    #[must_use]
    pub fn name(&self) -> &'a str {
        &self.data().tag_name
    }

    /// Finds an attribute by lower-case name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&'a Attribute> {
        self.data().attr(name)
    }

    /// Parent element; `None` at the root or directly inside template content.
    #[must_use]
    pub fn parent(&self) -> Option<Element<'a>> {
        let parent = self.tree.node(self.id).parent?;
        self.tree.element(parent)
    }

    /// Child elements, using template content for `<template>`.
    pub fn child_elements(&self) -> impl Iterator<Item = Element<'a>> + 'a {
        let tree = self.tree;
        tree.descend(self.id)
            .iter()
            .filter_map(move |&id| tree.element(id))
    }

    /// Child nodes, using template content for `<template>`.
    #[must_use]
    pub fn child_nodes(&self) -> &'a [NodeId] {
        self.tree.descend(self.id)
    }

    /// The tree this element belongs to.
    #[must_use]
    pub const fn tree(&self) -> &'a Tree {
        self.tree
    }
}

impl SelectorTarget for Element<'_> {
    fn tag_name(&self) -> &str {
        self.name()
    }

    fn parent_element(&self) -> Option<Self> {
        self.parent()
    }
}

struct Parser<'s> {
    source: &'s str,
    bytes: &'s [u8],
    pos: usize,
    nodes: Vec<Node>,
    /// Open elements, innermost last.
    open: Vec<NodeId>,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Fragment,
            }],
            open: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Tree, MarkupError> {
        while self.pos < self.bytes.len() {
            if self.starts_with("<!--") {
                self.comment()?;
            } else if self.starts_with("</") && self.byte_at(self.pos + 2).is_some_and(is_name_start) {
                self.end_tag()?;
            } else if self.starts_with("<!") || self.starts_with("<?") {
                self.bogus_comment()?;
            } else if self.starts_with("<") && self.byte_at(self.pos + 1).is_some_and(is_name_start) {
                self.start_tag()?;
            } else {
                self.text();
            }
        }

        let len = self.source.len();
        for id in std::mem::take(&mut self.open) {
            if let NodeKind::Element(data) = &mut self.nodes[id.0].kind {
                data.span.end = len;
            }
        }
        Ok(Tree { nodes: self.nodes })
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.bytes[self.pos..].starts_with(prefix.as_bytes())
    }

    fn byte_at(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }

    fn find(&self, from: usize, needle: &str) -> Option<usize> {
        self.source.get(from..)?.find(needle).map(|i| i + from)
    }

    /// Node that receives new children.
    fn insertion_parent(&self) -> NodeId {
        let Some(&top) = self.open.last() else {
            return NodeId(0);
        };
        match &self.nodes[top.0].kind {
            NodeKind::Element(ElementData {
                content: Some(content),
                ..
            }) => *content,
            _ => top,
        }
    }

    fn append(&mut self, kind: NodeKind) -> NodeId {
        let parent = self.insertion_parent();
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    fn comment(&mut self) -> Result<(), MarkupError> {
        let start = self.pos;
        let end = self
            .find(start + 4, "-->")
            .ok_or(MarkupError::UnterminatedComment { offset: start })?;
        self.append(NodeKind::Comment {
            data: self.source[start + 4..end].to_string(),
            span: Span::new(start, end + 3),
        });
        self.pos = end + 3;
        Ok(())
    }

    fn bogus_comment(&mut self) -> Result<(), MarkupError> {
        let start = self.pos;
        let end = self
            .find(start + 2, ">")
            .ok_or(MarkupError::UnterminatedComment { offset: start })?;
        self.append(NodeKind::Comment {
            data: self.source[start + 2..end].to_string(),
            span: Span::new(start, end + 1),
        });
        self.pos = end + 1;
        Ok(())
    }

    fn text(&mut self) {
        let start = self.pos;
        let mut end = start + 1;
        while end < self.bytes.len() {
            if self.bytes[end] == b'<' {
                let next = self.byte_at(end + 1);
                if next.is_some_and(|b| is_name_start(b) || b == b'/' || b == b'!' || b == b'?') {
                    break;
                }
            }
            end += 1;
        }
        self.push_text(start, end);
        self.pos = end;
    }

    fn push_text(&mut self, start: usize, end: usize) {
        if start < end {
            self.append(NodeKind::Text {
                text: self.source[start..end].to_string(),
                span: Span::new(start, end),
            });
        }
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while self
            .byte_at(self.pos)
            .is_some_and(|b| !b.is_ascii_whitespace() && b != b'/' && b != b'>' && b != b'=')
        {
            self.pos += 1;
        }
        self.source[start..self.pos].to_ascii_lowercase()
    }

    fn skip_whitespace(&mut self) {
        while self.byte_at(self.pos).is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn end_tag(&mut self) -> Result<(), MarkupError> {
        let start = self.pos;
        self.pos += 2;
        let name = self.read_name();
        let gt = self
            .find(self.pos, ">")
            .ok_or(MarkupError::UnterminatedTag { offset: start })?;
        self.pos = gt + 1;

        let matching = self.open.iter().rposition(|id| {
            matches!(&self.nodes[id.0].kind, NodeKind::Element(data) if data.tag_name == name)
        });
        let Some(index) = matching else {
            return Ok(());
        };
        for id in self.open.split_off(index + 1) {
            if let NodeKind::Element(data) = &mut self.nodes[id.0].kind {
                data.span.end = start;
            }
        }
        if let Some(id) = self.open.pop() {
            if let NodeKind::Element(data) = &mut self.nodes[id.0].kind {
                data.end_tag = Some(Span::new(start, self.pos));
                data.span.end = self.pos;
            }
        }
        Ok(())
    }

    fn start_tag(&mut self) -> Result<(), MarkupError> {
        let start = self.pos;
        self.pos += 1;
        let tag_name = self.read_name();
        let unterminated = MarkupError::UnterminatedTag { offset: start };
        let mut attrs: Vec<Attribute> = Vec::new();

        loop {
            self.skip_whitespace();
            match self.byte_at(self.pos) {
                None => return Err(unterminated),
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') => {
                    // Self-closing slash; ignored for non-void elements.
                    self.pos += 1;
                    continue;
                }
                Some(_) => {}
            }

            let attr_start = self.pos;
            let name = self.read_name();
            if name.is_empty() {
                // Stray `=`.
                self.pos += 1;
                continue;
            }
            let mut attr_end = self.pos;
            let mut value = String::new();
            let mut value_span = None;

            let after_name = self.pos;
            self.skip_whitespace();
            if self.byte_at(self.pos) == Some(b'=') {
                self.pos += 1;
                self.skip_whitespace();
                match self.byte_at(self.pos) {
                    Some(quote @ (b'"' | b'\'')) => {
                        let value_start = self.pos + 1;
                        let close = self.bytes[value_start..]
                            .iter()
                            .position(|&b| b == quote)
                            .map(|i| i + value_start)
                            .ok_or(unterminated)?;
                        value = self.source[value_start..close].to_string();
                        value_span = Some(Span::new(value_start, close));
                        self.pos = close + 1;
                    }
                    Some(_) => {
                        let value_start = self.pos;
                        while self
                            .byte_at(self.pos)
                            .is_some_and(|b| !b.is_ascii_whitespace() && b != b'>')
                        {
                            self.pos += 1;
                        }
                        value = self.source[value_start..self.pos].to_string();
                        value_span = Some(Span::new(value_start, self.pos));
                    }
                    None => return Err(unterminated),
                }
                attr_end = self.pos;
            } else {
                self.pos = after_name;
            }

            if !attrs.iter().any(|a| a.name == name) {
                attrs.push(Attribute {
                    name,
                    value,
                    span: Span::new(attr_start, attr_end),
                    value_span,
                });
            }
        }

        let start_tag = Span::new(start, self.pos);
        let is_template = tag_name == "template";
        let is_void = VOID_ELEMENTS.contains(&tag_name.as_str());
        let is_raw_text = RAW_TEXT_ELEMENTS.contains(&tag_name.as_str());
        let id = self.append(NodeKind::Element(ElementData {
            tag_name,
            attrs,
            start_tag,
            end_tag: None,
            span: start_tag,
            content: None,
        }));

        if is_template {
            let content = NodeId(self.nodes.len());
            self.nodes.push(Node {
                parent: Some(id),
                children: Vec::new(),
                kind: NodeKind::Fragment,
            });
            if let NodeKind::Element(data) = &mut self.nodes[id.0].kind {
                data.content = Some(content);
            }
        }

        if is_void {
            return Ok(());
        }
        self.open.push(id);
        if is_raw_text {
            self.raw_text(id)?;
        }
        Ok(())
    }

    /// Consumes raw text content and the matching end tag.
    fn raw_text(&mut self, id: NodeId) -> Result<(), MarkupError> {
        let NodeKind::Element(data) = &self.nodes[id.0].kind else {
            return Ok(());
        };
        let closing = format!("</{}", data.tag_name);
        let content_start = self.pos;
        let lower = self.source[content_start..].to_ascii_lowercase();
        let Some(close) = lower.find(&closing).map(|i| i + content_start) else {
            self.push_text(content_start, self.source.len());
            self.pos = self.source.len();
            return Ok(());
        };
        self.push_text(content_start, close);
        self.pos = close;
        self.end_tag()
    }
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic()
}
