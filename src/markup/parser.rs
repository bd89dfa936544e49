//! Tolerant HTML/XML parser that records source ranges.
//!
//! Recovery rules:
//! - an end tag closes the nearest open element with the same name and
//!   implicitly closes everything opened after it; stray end tags are ignored,
//! - elements still open at end of input have no end tag,
//! - unterminated comments, tags and quoted values run to end of input.

use crate::markup::escape;
use crate::markup::node::{Attribute, Document, Element, Node, NodeData, NodeId};
use crate::markup::position::{LineIndex, Position, Range};
use crate::markup::{Flavor, ParseIssue};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

const CDATA_OPEN: &str = "<![CDATA[";

pub(crate) fn parse(text: &str, flavor: Flavor) -> Document {
    let (source, had_bom) = match text.strip_prefix('\u{feff}') {
        Some(rest) => (rest, true),
        None => (text, false),
    };

    let mut parser = Parser::new(source, flavor);
    parser.run();
    log::trace!(
        "parsed {} nodes with {} issues",
        parser.nodes.len(),
        parser.issues.len()
    );

    Document {
        source: source.to_owned(),
        flavor,
        had_bom,
        nodes: parser.nodes,
        roots: parser.roots,
        issues: parser.issues,
    }
}

/// Whether raw text node content is a CDATA section.
pub(crate) fn is_cdata(raw: &str) -> bool {
    raw.starts_with(CDATA_OPEN)
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    flavor: Flavor,
    lines: LineIndex,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    open: Vec<NodeId>,
    issues: Vec<ParseIssue>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, flavor: Flavor) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            flavor,
            lines: LineIndex::new(src),
            nodes: Vec::new(),
            roots: Vec::new(),
            open: Vec::new(),
            issues: Vec::new(),
        }
    }

    fn run(&mut self) {
        while self.pos < self.bytes.len() {
            if self.starts_with("<!--") {
                self.comment();
            } else if self.flavor == Flavor::Xml && self.starts_with(CDATA_OPEN) {
                self.cdata();
            } else if self.starts_with("</") && self.is_alpha_at(self.pos + 2) {
                self.end_tag();
            } else if self.starts_with("<!") || self.starts_with("<?") {
                self.declaration();
            } else if self.bytes[self.pos] == b'<' && self.is_alpha_at(self.pos + 1) {
                self.start_tag();
            } else {
                self.text();
            }
        }
        self.finish();
    }

    fn finish(&mut self) {
        if self.flavor == Flavor::Xml {
            for id in std::mem::take(&mut self.open) {
                let node = &self.nodes[id.0];
                let message = format!("element <{}> is never closed", element_name(node));
                self.issues.push(ParseIssue {
                    position: node.range.start,
                    message,
                });
            }
        }
        self.open.clear();
    }

    // ── Leaves ──

    fn text(&mut self) {
        let start = self.pos;
        // A '<' that starts no markup is ordinary text.
        let from = if self.bytes[start] == b'<' {
            start + 1
        } else {
            start
        };
        let end = self.find_from(from, "<").unwrap_or(self.bytes.len());
        self.pos = end;
        self.push_text(start, end, self.current_parent());
    }

    fn comment(&mut self) {
        let start = self.pos;
        let end = match self.find_from(start + 4, "-->") {
            Some(close) => close + 3,
            None => {
                self.issue(start, "unterminated comment");
                self.bytes.len()
            }
        };
        self.pos = end;
        let range = self.range(start, end);
        self.push_node(NodeData::Comment, range, self.current_parent());
    }

    fn cdata(&mut self) {
        let start = self.pos;
        let end = match self.find_from(start + CDATA_OPEN.len(), "]]>") {
            Some(close) => close + 3,
            None => {
                self.issue(start, "unterminated CDATA section");
                self.bytes.len()
            }
        };
        self.pos = end;
        let range = self.range(start, end);
        self.push_node(NodeData::Text, range, self.current_parent());
    }

    fn declaration(&mut self) {
        let start = self.pos;
        let close = if self.starts_with("<?") { "?>" } else { ">" };
        let end = match self.find_from(start + 2, close) {
            Some(found) => found + close.len(),
            None => {
                self.issue(start, "unterminated declaration");
                self.bytes.len()
            }
        };
        self.pos = end;
        let range = self.range(start, end);
        self.push_node(NodeData::Declaration, range, self.current_parent());
    }

    // ── Tags ──

    fn start_tag(&mut self) {
        let start = self.pos;
        self.pos += 1;
        let raw = self.read_tag_name();
        let name = self.normalize(raw);

        let mut attributes: Vec<Attribute> = Vec::new();
        let mut self_closing = false;
        let mut terminated = false;
        loop {
            self.skip_whitespace();
            if self.pos >= self.bytes.len() {
                self.issue(start, &format!("unterminated start tag <{name}>"));
                break;
            }
            if self.starts_with("/>") {
                self.pos += 2;
                self_closing = true;
                terminated = true;
                break;
            }
            match self.bytes[self.pos] {
                b'>' => {
                    self.pos += 1;
                    terminated = true;
                    break;
                }
                b'/' => self.pos += 1,
                _ => {
                    let attribute = self.attribute();
                    if attributes.iter().any(|a| a.name == attribute.name) {
                        let message = format!("duplicate attribute '{}'", attribute.name);
                        self.issue(attribute.name_range.start.offset, &message);
                    }
                    attributes.push(attribute);
                }
            }
        }

        let range = self.range(start, self.pos);
        let is_html = self.flavor == Flavor::Html;
        let is_void = is_html && VOID_ELEMENTS.contains(&name.as_str());
        let is_raw_text = is_html && RAW_TEXT_ELEMENTS.contains(&name.as_str());
        let element = Element {
            name: name.clone(),
            attributes,
            end_tag: None,
            self_closing,
            terminated,
        };
        let id = self.push_node(NodeData::Element(element), range, self.current_parent());

        if self_closing || !terminated || is_void {
            return;
        }
        if is_raw_text {
            self.raw_text(id, &name);
        } else {
            self.open.push(id);
        }
    }

    fn attribute(&mut self) -> Attribute {
        let name_start = self.pos;
        // The first character is taken whatever it is, so `=` or a quote in
        // name position cannot stall the tokenizer.
        self.pos += self.src[self.pos..].chars().next().map_or(1, char::len_utf8);
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || matches!(b, b'/' | b'>' | b'=') {
                break;
            }
            self.pos += 1;
        }
        let name_end = self.pos;
        let name = self.normalize(&self.src[name_start..name_end]);
        let name_range = self.range(name_start, name_end);

        self.skip_whitespace();
        if self.peek() != Some(b'=') {
            self.pos = name_end;
            return Attribute {
                name,
                name_range,
                value: None,
                value_range: Range::collapsed(name_range.end),
                quote: None,
            };
        }
        self.pos += 1;
        self.skip_whitespace();

        let (value_start, value_end, quote) = match self.peek() {
            Some(q @ (b'"' | b'\'')) => {
                let value_start = self.pos + 1;
                match self.find_from(value_start, if q == b'"' { "\"" } else { "'" }) {
                    Some(close) => {
                        self.pos = close + 1;
                        (value_start, close, Some(q as char))
                    }
                    None => {
                        self.issue(name_start, "unterminated attribute value");
                        self.pos = self.bytes.len();
                        (value_start, self.bytes.len(), Some(q as char))
                    }
                }
            }
            _ => {
                let value_start = self.pos;
                while let Some(b) = self.peek() {
                    if b.is_ascii_whitespace() || b == b'>' || self.starts_with("/>") {
                        break;
                    }
                    self.pos += 1;
                }
                (value_start, self.pos, None)
            }
        };

        let raw = &self.src[value_start..value_end];
        let value_range = if value_start == value_end {
            Range::collapsed(name_range.end)
        } else {
            self.range(value_start, value_end)
        };
        Attribute {
            name,
            name_range,
            value: Some(escape::unescape(raw).into_owned()),
            value_range,
            quote,
        }
    }

    fn raw_text(&mut self, id: NodeId, name: &str) {
        let content_start = self.pos;
        match self.find_raw_text_close(name) {
            Some(close) => {
                self.push_text(content_start, close, Some(id));
                self.pos = close;
                let (_, end_tag) = self.read_end_tag();
                self.set_end_tag(id, end_tag);
            }
            None => {
                self.push_text(content_start, self.bytes.len(), Some(id));
                self.pos = self.bytes.len();
                self.issue(content_start, &format!("<{name}> is never closed"));
            }
        }
    }

    fn find_raw_text_close(&self, name: &str) -> Option<usize> {
        let mut from = self.pos;
        while let Some(at) = self.find_from(from, "</") {
            let name_start = at + 2;
            let name_end = name_start + name.len();
            let name_matches = self
                .bytes
                .get(name_start..name_end)
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name.as_bytes()));
            let boundary = matches!(
                self.bytes.get(name_end),
                None | Some(b' ' | b'\t' | b'\n' | b'\r' | b'\x0c' | b'/' | b'>')
            );
            if name_matches && boundary {
                return Some(at);
            }
            from = name_start;
        }
        None
    }

    fn end_tag(&mut self) {
        let (name, range) = self.read_end_tag();
        let matching = self
            .open
            .iter()
            .rposition(|id| element_name(&self.nodes[id.0]) == name);
        let Some(index) = matching else {
            self.issue(range.start.offset, &format!("unexpected end tag </{name}>"));
            return;
        };

        if self.flavor == Flavor::Xml {
            for implicit in self.open[index + 1..].to_vec() {
                let message = format!(
                    "element <{}> closed implicitly by </{name}>",
                    element_name(&self.nodes[implicit.0])
                );
                self.issue(range.start.offset, &message);
            }
        }
        self.open.truncate(index + 1);
        if let Some(id) = self.open.pop() {
            self.set_end_tag(id, range);
        }
    }

    fn read_end_tag(&mut self) -> (String, Range) {
        let start = self.pos;
        self.pos += 2;
        let raw = self.read_tag_name();
        let name = self.normalize(raw);
        match self.find_from(self.pos, ">") {
            Some(close) => self.pos = close + 1,
            None => {
                self.issue(start, &format!("unterminated end tag </{name}>"));
                self.pos = self.bytes.len();
            }
        }
        (name, self.range(start, self.pos))
    }

    fn read_tag_name(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || matches!(b, b'/' | b'>') {
                break;
            }
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    // ── Tree building ──

    fn current_parent(&self) -> Option<NodeId> {
        self.open.last().copied()
    }

    fn push_node(&mut self, data: NodeData, range: Range, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            range,
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Adds a text node, extending the previous sibling when it is adjacent text.
    fn push_text(&mut self, start: usize, end: usize, parent: Option<NodeId>) {
        if start == end {
            return;
        }
        let siblings = match parent {
            Some(parent) => &self.nodes[parent.0].children,
            None => &self.roots,
        };
        if let Some(last) = siblings.last().copied() {
            let node = &self.nodes[last.0];
            let adjacent = matches!(node.data, NodeData::Text)
                && node.range.end.offset == start
                && !is_cdata(&self.src[node.range.span()]);
            if adjacent {
                let end = self.position(end);
                self.nodes[last.0].range.end = end;
                return;
            }
        }
        let range = self.range(start, end);
        self.push_node(NodeData::Text, range, parent);
    }

    fn set_end_tag(&mut self, id: NodeId, range: Range) {
        if let NodeData::Element(element) = &mut self.nodes[id.0].data {
            element.end_tag = Some(range);
        }
    }

    // ── Cursor helpers ──

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.bytes[self.pos..].starts_with(prefix.as_bytes())
    }

    fn is_alpha_at(&self, offset: usize) -> bool {
        self.bytes.get(offset).is_some_and(u8::is_ascii_alphabetic)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn find_from(&self, from: usize, needle: &str) -> Option<usize> {
        self.src.get(from..)?.find(needle).map(|i| from + i)
    }

    fn normalize(&self, name: &str) -> String {
        match self.flavor {
            Flavor::Html => name.to_ascii_lowercase(),
            Flavor::Xml => name.to_owned(),
        }
    }

    fn position(&self, offset: usize) -> Position {
        self.lines.position(self.src, offset)
    }

    fn range(&self, start: usize, end: usize) -> Range {
        Range::new(self.position(start), self.position(end))
    }

    fn issue(&mut self, offset: usize, message: &str) {
        let position = self.position(offset);
        self.issues.push(ParseIssue {
            position,
            message: message.to_owned(),
        });
    }
}

fn element_name(node: &Node) -> &str {
    node.as_element().map_or("", |e| e.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element<'d>(doc: &'d Document, name: &str) -> crate::markup::ElementRef<'d> {
        let id = doc.elements_by_tag(name).next().expect("element present");
        doc.element(id).unwrap()
    }

    #[test]
    fn test_quoted_attribute_ranges() {
        let html = "<script src='foobar'></script>";
        let doc = parse(html, Flavor::Html);
        let script = first_element(&doc, "script");

        assert_eq!(script.source_range().span(), 0..21);
        assert_eq!(script.end_source_range().unwrap().span(), 21..30);
        assert!(!script.is_self_closed());

        let src = &script.attributes()[0];
        assert_eq!(src.name(), "src");
        assert_eq!(src.name_range().span(), 8..11);
        assert_eq!(src.value_range().span(), 13..19);
        assert_eq!(src.value(), Some("foobar"));
        assert_eq!(src.quote(), Some('\''));
        assert_eq!(&html[src.value_range().span()], "foobar");
    }

    #[test]
    fn test_empty_value_collapses_onto_name() {
        let doc = parse("<script src  =  ''></script>", Flavor::Html);
        let src = &first_element(&doc, "script").attributes()[0];
        assert!(src.has_declared_value());
        assert_eq!(src.value(), Some(""));
        assert_eq!(src.value_range().span(), 11..11);
        assert_eq!(src.name_range().end, src.value_range().start);
    }

    #[test]
    fn test_bare_attribute() {
        let doc = parse("<script src name=x></script>", Flavor::Html);
        let script = first_element(&doc, "script");
        let src = &script.attributes()[0];
        assert!(!src.has_declared_value());
        assert_eq!(src.value_range().span(), 11..11);

        let name = &script.attributes()[1];
        assert_eq!(name.value(), Some("x"));
        assert_eq!(name.quote(), None);
        assert_eq!(name.value_range().span(), 17..18);
    }

    #[test]
    fn test_self_closed_element() {
        let doc = parse("<div><span/></div>", Flavor::Html);
        let span = first_element(&doc, "span");
        assert!(span.is_self_closed());
        assert_eq!(span.source_range().span(), 5..12);
        assert_eq!(span.closing_delimiter_offset(), 10);

        let div = first_element(&doc, "div");
        assert!(!div.is_self_closed());
        assert_eq!(div.children(), &[span.id()]);
    }

    #[test]
    fn test_unquoted_value_stops_before_self_closing_slash() {
        let doc = parse("<script src name=x/>", Flavor::Html);
        let script = first_element(&doc, "script");
        assert!(script.is_self_closed());
        assert_eq!(script.attributes()[1].value(), Some("x"));
    }

    #[test]
    fn test_void_elements_have_no_children() {
        let doc = parse("<p><br>text</p>", Flavor::Html);
        let br = first_element(&doc, "br");
        assert!(br.children().is_empty());
        assert_eq!(br.end_source_range(), None);

        let p = first_element(&doc, "p");
        assert_eq!(p.children().len(), 2);
    }

    #[test]
    fn test_script_content_is_raw_text() {
        let html = "<script>if (a<b && c>d) { x('</div>'); }</script><p></p>";
        let doc = parse(html, Flavor::Html);
        let script = first_element(&doc, "script");
        assert_eq!(script.children().len(), 1);
        let text = doc.node(script.children()[0]);
        assert!(matches!(text.data(), NodeData::Text));
        assert_eq!(
            &html[text.source_range().span()],
            "if (a<b && c>d) { x('</div>'); }"
        );
        assert!(doc.elements_by_tag("p").next().is_some());
        assert!(doc.elements_by_tag("b").next().is_none());
    }

    #[test]
    fn test_xml_parses_script_content_as_markup() {
        let doc = parse("<script><b/></script>", Flavor::Xml);
        assert!(doc.elements_by_tag("b").next().is_some());
    }

    #[test]
    fn test_implicitly_closed_elements() {
        let html = "<div><p>one<p>two</div>";
        let doc = parse(html, Flavor::Html);
        let div = first_element(&doc, "div");
        assert_eq!(div.end_source_range().unwrap().span(), 17..23);

        let p = doc.element(div.children()[0]).unwrap();
        assert_eq!(p.end_source_range(), None);
        assert_eq!(doc.outer_end(p.id()).offset, 17);
    }

    #[test]
    fn test_stray_end_tag_is_reported() {
        let doc = parse("<div></span></div>", Flavor::Html);
        assert_eq!(doc.issues().len(), 1);
        assert!(doc.issues()[0].message.contains("</span>"));
        let div = first_element(&doc, "div");
        assert!(div.end_source_range().is_some());
    }

    #[test]
    fn test_html_names_are_lowercased() {
        let doc = parse("<SCRIPT SRC='a'></SCRIPT>", Flavor::Html);
        let script = first_element(&doc, "script");
        assert_eq!(script.name(), "script");
        assert_eq!(script.attributes()[0].name(), "src");
        assert!(script.end_source_range().is_some());
    }

    #[test]
    fn test_xml_names_keep_case() {
        let doc = parse("<Script SRC='a'></Script>", Flavor::Xml);
        let script = first_element(&doc, "script");
        assert_eq!(script.name(), "Script");
        assert_eq!(script.attributes()[0].name(), "SRC");
    }

    #[test]
    fn test_xml_reports_unclosed_elements() {
        let doc = parse("<root><child>", Flavor::Xml);
        assert_eq!(doc.issues().len(), 2);
    }

    #[test]
    fn test_comments_and_declarations() {
        let doc = parse("<!DOCTYPE html><!-- note --><html></html>", Flavor::Html);
        let kinds: Vec<_> = doc.roots().iter().map(|id| doc.node(*id).data().clone()).collect();
        assert!(matches!(kinds[0], NodeData::Declaration));
        assert!(matches!(kinds[1], NodeData::Comment));
        assert!(matches!(kinds[2], NodeData::Element(_)));
    }

    #[test]
    fn test_xml_prolog_and_cdata() {
        let xml = "<?xml version=\"1.0\"?><root><![CDATA[a<b]]></root>";
        let doc = parse(xml, Flavor::Xml);
        assert!(matches!(doc.node(doc.roots()[0]).data(), NodeData::Declaration));
        let root = first_element(&doc, "root");
        assert_eq!(doc.text_content(root.id()), "a<b");
    }

    #[test]
    fn test_byte_order_mark_is_skipped() {
        let doc = parse("\u{feff}<script src='a'/>", Flavor::Html);
        assert!(doc.had_bom());
        let script = first_element(&doc, "script");
        assert_eq!(script.source_range().start.offset, 0);
        assert_eq!(script.attributes()[0].value_range().span(), 13..14);
    }

    #[test]
    fn test_entities_in_values_are_decoded() {
        let doc = parse("<a href=\"x?a=1&amp;b=2\"></a>", Flavor::Html);
        let a = first_element(&doc, "a");
        assert_eq!(a.attributes()[0].value(), Some("x?a=1&b=2"));
    }

    #[test]
    fn test_positions_carry_lines() {
        let doc = parse("<html>\n  <script></script>\n</html>", Flavor::Html);
        let script = first_element(&doc, "script");
        assert_eq!(script.source_range().start.line, 2);
        assert_eq!(script.source_range().start.column, 3);
    }

    #[test]
    fn test_stray_less_than_is_text() {
        let doc = parse("<p>1 < 2</p>", Flavor::Html);
        let p = first_element(&doc, "p");
        assert_eq!(p.children().len(), 1);
        assert_eq!(doc.text_content(p.id()), "1 < 2");
    }

    #[test]
    fn test_unterminated_tag() {
        let doc = parse("<script src='a'", Flavor::Html);
        let script = first_element(&doc, "script");
        assert_eq!(script.closing_delimiter_offset(), 15);
        assert!(!doc.issues().is_empty());
    }

    #[test]
    fn test_multibyte_text_and_attribute_names() {
        let doc = parse("<p données=\"海\">猫</p>", Flavor::Html);
        let p = first_element(&doc, "p");
        assert_eq!(p.attributes()[0].name(), "données");
        assert_eq!(p.attributes()[0].value(), Some("海"));
        assert_eq!(doc.text_content(p.id()), "猫");
    }
}
