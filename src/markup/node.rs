use crate::markup::position::{Position, Range};
use crate::markup::{escape, parser, Flavor, ParseIssue};

/// Index of a node in its [`Document`]. Ids increase in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a node is. Every variant carries a source range through [`Node`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element(Element),
    Text,
    Comment,
    /// Doctype, processing instruction or other `<!...>`/`<?...>` markup.
    Declaration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub(crate) data: NodeData,
    pub(crate) range: Range,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl Node {
    pub fn data(&self) -> &NodeData {
        &self.data
    }

    /// For elements this is the start tag; for everything else the whole node.
    pub fn source_range(&self) -> Range {
        self.range
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn as_element(&self) -> Option<&Element> {
        match &self.data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub(crate) name: String,
    pub(crate) attributes: Vec<Attribute>,
    pub(crate) end_tag: Option<Range>,
    pub(crate) self_closing: bool,
    /// False when the start tag ran into the end of input without `>`.
    pub(crate) terminated: bool,
}

impl Element {
    /// Tag name; lowercased for HTML documents.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn end_tag(&self) -> Option<Range> {
        self.end_tag
    }
}

/// An attribute of a start tag with the source ranges of its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub(crate) name: String,
    pub(crate) name_range: Range,
    pub(crate) value: Option<String>,
    pub(crate) value_range: Range,
    pub(crate) quote: Option<char>,
}

impl Attribute {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_range(&self) -> Range {
        self.name_range
    }

    /// Entity-decoded value, `None` for a bare attribute such as `<script defer>`.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn has_declared_value(&self) -> bool {
        self.value.is_some()
    }

    /// Covers the value characters (inside the quotes when quoted).
    ///
    /// Bare and empty values have no characters to cover; their range is
    /// collapsed onto the end of the name.
    pub fn value_range(&self) -> Range {
        self.value_range
    }

    pub fn quote(&self) -> Option<char> {
        self.quote
    }
}

/// A parsed markup document that remembers where everything came from.
#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) source: String,
    pub(crate) flavor: Flavor,
    pub(crate) had_bom: bool,
    pub(crate) nodes: Vec<Node>,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) issues: Vec<ParseIssue>,
}

impl Document {
    /// The parsed text (without a leading byte-order mark).
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    /// Whether the input started with U+FEFF, which offsets do not include.
    pub fn had_bom(&self) -> bool {
        self.had_bom
    }

    pub fn issues(&self) -> &[ParseIssue] {
        &self.issues
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level nodes.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        let node = self.node(id);
        let element = node.as_element()?;
        Some(ElementRef {
            document: self,
            id,
            node,
            element,
        })
    }

    /// All element ids in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_element())
            .map(|(index, _)| NodeId(index))
    }

    /// Children of `parent`, or the top-level nodes when `parent` is `None`.
    pub fn child_ids(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            Some(id) => &self.node(id).children,
            None => &self.roots,
        }
    }

    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Element siblings of `id` (including `id` itself) in document order.
    pub fn element_siblings(&self, id: NodeId) -> Vec<NodeId> {
        self.child_ids(self.node(id).parent)
            .iter()
            .copied()
            .filter(|sibling| self.node(*sibling).is_element())
            .collect()
    }

    /// Every node below `id` in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.node(id).children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            result.push(next);
            stack.extend(self.node(next).children.iter().rev().copied());
        }
        result
    }

    /// First element with the given `id` attribute.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.elements()
            .find(|candidate| self.node(*candidate).as_element().and_then(|e| e.attribute("id")) == Some(id))
    }

    /// Elements whose tag name equals `name`, ignoring ASCII case.
    pub fn elements_by_tag<'a>(&'a self, name: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.elements().filter(move |id| {
            self.node(*id)
                .as_element()
                .is_some_and(|e| e.name.eq_ignore_ascii_case(name))
        })
    }

    /// Where a node ends in the source, including an element's content and
    /// end tag. Implicitly closed elements end with their last descendant.
    pub fn outer_end(&self, id: NodeId) -> Position {
        let node = self.node(id);
        if let NodeData::Element(element) = &node.data {
            if element.self_closing {
                return node.range.end;
            }
            if let Some(end_tag) = element.end_tag {
                return end_tag.end;
            }
            if let Some(last) = node.children.last() {
                return self.outer_end(*last);
            }
        }
        node.range.end
    }

    /// The raw source text of a node (start tag only for elements).
    pub fn raw_text(&self, id: NodeId) -> &str {
        &self.source[self.node(id).range.span()]
    }

    /// Concatenated, entity-decoded text of all text nodes below `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let node = self.node(id);
        if matches!(node.data, NodeData::Text) {
            return self.text_value(id);
        }
        self.descendants(id)
            .into_iter()
            .filter(|d| matches!(self.node(*d).data, NodeData::Text))
            .map(|d| self.text_value(d))
            .collect()
    }

    fn text_value(&self, id: NodeId) -> String {
        let raw = self.raw_text(id);
        if parser::is_cdata(raw) {
            let inner = &raw["<![CDATA[".len()..];
            return inner.strip_suffix("]]>").unwrap_or(inner).to_owned();
        }
        if self.is_raw_text_content(id) {
            return raw.to_owned();
        }
        escape::unescape(raw).into_owned()
    }

    /// Script and style bodies in HTML are not entity-decoded.
    fn is_raw_text_content(&self, id: NodeId) -> bool {
        self.flavor == Flavor::Html
            && self
                .node(id)
                .parent
                .and_then(|parent| self.node(parent).as_element())
                .is_some_and(|e| matches!(e.name(), "script" | "style"))
    }
}

impl Element {
    /// Value of the first attribute called `name` (bare attributes yield `""`).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value().unwrap_or(""))
    }
}

/// Borrowed view of an element together with its node and document.
#[derive(Debug, Clone, Copy)]
pub struct ElementRef<'a> {
    document: &'a Document,
    id: NodeId,
    node: &'a Node,
    element: &'a Element,
}

impl<'a> ElementRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    pub fn name(&self) -> &'a str {
        &self.element.name
    }

    pub fn attributes(&self) -> &'a [Attribute] {
        &self.element.attributes
    }

    /// The start tag, `<` through `>`.
    pub fn source_range(&self) -> Range {
        self.node.range
    }

    /// The end tag; the start tag again for a self-closed element; `None`
    /// when the element was closed implicitly.
    pub fn end_source_range(&self) -> Option<Range> {
        if self.element.self_closing {
            Some(self.node.range)
        } else {
            self.element.end_tag
        }
    }

    pub fn is_self_closed(&self) -> bool {
        self.end_source_range() == Some(self.source_range())
    }

    pub fn children(&self) -> &'a [NodeId] {
        &self.node.children
    }

    /// Offset of the start tag's closing delimiter: the `/>` of a self-closed
    /// tag, the `>` of a terminated tag, or the end of a tag cut off by the end
    /// of input.
    pub fn closing_delimiter_offset(&self) -> usize {
        let end = self.node.range.end.offset;
        if self.element.self_closing {
            end - 2
        } else if self.element.terminated {
            end - 1
        } else {
            end
        }
    }

    /// First attribute called `name`, compared as the document's flavor requires.
    pub fn find_attribute(&self, name: &str) -> Option<(usize, &'a Attribute)> {
        let flavor = self.document.flavor;
        self.element
            .attributes
            .iter()
            .enumerate()
            .find(|(_, attribute)| flavor.names_match(&attribute.name, name))
    }
}
