//! CSS selector subset evaluated against a source-range [`Document`].
//!
//! Supported: type, universal, `#id`, `.class`, attribute selectors with the
//! `= ~= |= ^= $= *=` operators and an `i` flag, the descendant, `>`, `+` and
//! `~` combinators, selector lists, and the tree-structural pseudo-classes
//! plus `:not()`.

use crate::markup::{Document, NodeData, NodeId};
use crate::select::errors::ParseError;

/// A comma-separated list of complex selectors.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList {
    selectors: Vec<ComplexSelector>,
}

/// Compound selectors joined by combinators, stored left to right.
#[derive(Debug, Clone, PartialEq)]
struct ComplexSelector {
    parts: Vec<CompoundSelector>,
    /// `combinators[i]` joins `parts[i]` and `parts[i + 1]`.
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompoundSelector {
    components: Vec<SelectorComponent>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectorComponent {
    Universal,
    Type(String),
    Id(String),
    Class(String),
    Attribute(AttributeSelector),
    PseudoClass(PseudoClass),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSelector {
    pub name: String,
    pub matcher: Option<AttributeMatcher>,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeMatcher {
    /// `[attr=value]`
    Exact(String),
    /// `[attr~=value]`, whitespace-separated word
    Contains(String),
    /// `[attr|=value]`, exact or followed by `-`
    DashMatch(String),
    /// `[attr^=value]`
    Prefix(String),
    /// `[attr$=value]`
    Suffix(String),
    /// `[attr*=value]`
    Substring(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PseudoClass {
    Root,
    Empty,
    FirstChild,
    LastChild,
    OnlyChild,
    FirstOfType,
    LastOfType,
    OnlyOfType,
    NthChild(NthExpression),
    NthLastChild(NthExpression),
    NthOfType(NthExpression),
    NthLastOfType(NthExpression),
    Not(Vec<CompoundSelector>),
}

/// `An+B` expression of the `:nth-*` pseudo-classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NthExpression {
    pub a: i32,
    pub b: i32,
}

impl NthExpression {
    pub fn new(a: i32, b: i32) -> Self {
        Self { a, b }
    }

    /// Parse `odd`, `even`, `3`, `2n`, `2n+1`, `-n+3`.
    pub fn parse(s: &str) -> Option<Self> {
        let s: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match s.as_str() {
            "odd" => return Some(Self::new(2, 1)),
            "even" => return Some(Self::new(2, 0)),
            _ => {}
        }
        if let Ok(n) = s.parse::<i32>() {
            return Some(Self::new(0, n));
        }

        let n_pos = s.find('n')?;
        let a = match &s[..n_pos] {
            "" | "+" => 1,
            "-" => -1,
            a => a.parse().ok()?,
        };
        let rest = &s[n_pos + 1..];
        let b = if rest.is_empty() {
            0
        } else if rest.starts_with('+') || rest.starts_with('-') {
            rest.parse().ok()?
        } else {
            return None;
        };
        Some(Self::new(a, b))
    }

    /// Whether the 1-based index `n` is selected.
    ///
    /// Works in `i64` so extreme coefficients cannot overflow.
    pub fn matches(&self, n: i32) -> bool {
        let (a, b, n) = (i64::from(self.a), i64::from(self.b), i64::from(n));
        if a == 0 {
            return n == b;
        }
        let diff = n - b;
        if a > 0 {
            diff >= 0 && diff % a == 0
        } else {
            diff <= 0 && diff % a == 0
        }
    }
}

impl AttributeSelector {
    /// Check an attribute value; `None` means the attribute is absent.
    pub fn matches(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return false;
        };
        let Some(matcher) = &self.matcher else {
            return true;
        };

        let fold = |s: &str| {
            if self.case_insensitive {
                s.to_lowercase()
            } else {
                s.to_owned()
            }
        };
        let value = fold(value);
        match matcher {
            AttributeMatcher::Exact(expected) => value == fold(expected),
            AttributeMatcher::Contains(expected) => {
                let expected = fold(expected);
                !expected.is_empty()
                    && !expected.contains(char::is_whitespace)
                    && value.split_whitespace().any(|word| word == expected)
            }
            AttributeMatcher::DashMatch(expected) => {
                let expected = fold(expected);
                value == expected || value.starts_with(&format!("{expected}-"))
            }
            AttributeMatcher::Prefix(expected) => {
                !expected.is_empty() && value.starts_with(&fold(expected))
            }
            AttributeMatcher::Suffix(expected) => {
                !expected.is_empty() && value.ends_with(&fold(expected))
            }
            AttributeMatcher::Substring(expected) => {
                !expected.is_empty() && value.contains(&fold(expected))
            }
        }
    }
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut parser = Parser {
            input,
            pos: 0,
            depth: 0,
        };
        let list = parser.selector_list()?;
        parser.skip_whitespace();
        if let Some(c) = parser.peek() {
            return Err(parser.error(format!("unexpected '{c}'")));
        }
        Ok(list)
    }

    /// All matching elements in document order.
    pub fn select(&self, document: &Document) -> Vec<NodeId> {
        document
            .elements()
            .filter(|id| self.matches(document, *id))
            .collect()
    }

    pub fn matches(&self, document: &Document, id: NodeId) -> bool {
        self.selectors
            .iter()
            .any(|selector| selector.matches_at(document, id, selector.parts.len() - 1))
    }
}

impl ComplexSelector {
    /// Match `parts[..=index]` with `parts[index]` anchored at `id`.
    fn matches_at(&self, document: &Document, id: NodeId, index: usize) -> bool {
        if !self.parts[index].matches(document, id) {
            return false;
        }
        if index == 0 {
            return true;
        }

        let previous = index - 1;
        match self.combinators[previous] {
            Combinator::Child => document
                .parent_element(id)
                .is_some_and(|parent| self.matches_at(document, parent, previous)),
            Combinator::Descendant => {
                let mut ancestor = document.parent_element(id);
                while let Some(candidate) = ancestor {
                    if self.matches_at(document, candidate, previous) {
                        return true;
                    }
                    ancestor = document.parent_element(candidate);
                }
                false
            }
            Combinator::NextSibling => preceding_siblings(document, id)
                .last()
                .is_some_and(|sibling| self.matches_at(document, *sibling, previous)),
            Combinator::SubsequentSibling => preceding_siblings(document, id)
                .iter()
                .any(|sibling| self.matches_at(document, *sibling, previous)),
        }
    }
}

impl CompoundSelector {
    pub fn matches(&self, document: &Document, id: NodeId) -> bool {
        self.components
            .iter()
            .all(|component| component.matches(document, id))
    }
}

impl SelectorComponent {
    fn matches(&self, document: &Document, id: NodeId) -> bool {
        let Some(element) = document.element(id) else {
            return false;
        };
        let flavor = document.flavor();
        let attribute = |name: &str| {
            element
                .find_attribute(name)
                .map(|(_, attribute)| attribute.value().unwrap_or(""))
        };

        match self {
            SelectorComponent::Universal => true,
            SelectorComponent::Type(name) => flavor.names_match(element.name(), name),
            SelectorComponent::Id(expected) => attribute("id") == Some(expected.as_str()),
            SelectorComponent::Class(class) => attribute("class")
                .is_some_and(|classes| classes.split_whitespace().any(|c| c == class)),
            SelectorComponent::Attribute(selector) => selector.matches(attribute(&selector.name)),
            SelectorComponent::PseudoClass(pseudo) => pseudo.matches(document, id),
        }
    }
}

impl PseudoClass {
    fn matches(&self, document: &Document, id: NodeId) -> bool {
        match self {
            PseudoClass::Root => document.parent_element(id).is_none(),
            PseudoClass::Empty => document.node(id).children().iter().all(|child| {
                matches!(
                    document.node(*child).data(),
                    NodeData::Comment | NodeData::Declaration
                )
            }),
            PseudoClass::Not(compounds) => !compounds.iter().any(|c| c.matches(document, id)),
            structural => {
                let siblings = document.element_siblings(id);
                let (index, count) = position_in(&siblings, id);
                let of_type = same_type(document, &siblings, id);
                let (type_index, type_count) = position_in(&of_type, id);
                match structural {
                    PseudoClass::FirstChild => index == 1,
                    PseudoClass::LastChild => index == count,
                    PseudoClass::OnlyChild => count == 1,
                    PseudoClass::FirstOfType => type_index == 1,
                    PseudoClass::LastOfType => type_index == type_count,
                    PseudoClass::OnlyOfType => type_count == 1,
                    PseudoClass::NthChild(expr) => expr.matches(index),
                    PseudoClass::NthLastChild(expr) => expr.matches(count - index + 1),
                    PseudoClass::NthOfType(expr) => expr.matches(type_index),
                    PseudoClass::NthLastOfType(expr) => expr.matches(type_count - type_index + 1),
                    PseudoClass::Root | PseudoClass::Empty | PseudoClass::Not(_) => false,
                }
            }
        }
    }
}

fn preceding_siblings(document: &Document, id: NodeId) -> Vec<NodeId> {
    document
        .element_siblings(id)
        .into_iter()
        .take_while(|sibling| *sibling != id)
        .collect()
}

fn same_type(document: &Document, siblings: &[NodeId], id: NodeId) -> Vec<NodeId> {
    let name = document.element(id).map_or("", |e| e.name());
    siblings
        .iter()
        .copied()
        .filter(|sibling| {
            document
                .element(*sibling)
                .is_some_and(|e| document.flavor().names_match(e.name(), name))
        })
        .collect()
}

/// 1-based index of `id` in `ids` and the length of `ids`.
fn position_in(ids: &[NodeId], id: NodeId) -> (i32, i32) {
    let index = ids.iter().position(|candidate| *candidate == id).map_or(0, |i| i + 1);
    (index as i32, ids.len() as i32)
}

// ── Parsing ──

/// Deepest `:not()` nesting accepted.
const MAX_NESTING: usize = 32;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn selector_list(&mut self) -> Result<SelectorList, ParseError> {
        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            selectors.push(self.complex_selector()?);
            self.skip_whitespace();
            if !self.eat(',') {
                break;
            }
        }
        Ok(SelectorList { selectors })
    }

    fn complex_selector(&mut self) -> Result<ComplexSelector, ParseError> {
        let mut parts = vec![self.compound_selector()?];
        let mut combinators = Vec::new();
        loop {
            let had_whitespace = self.skip_whitespace();
            let combinator = match self.peek() {
                Some('>') => Combinator::Child,
                Some('+') => Combinator::NextSibling,
                Some('~') => Combinator::SubsequentSibling,
                Some(',' | ')') | None => break,
                Some(_) if had_whitespace => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected '{c}'"))),
            };
            if combinator != Combinator::Descendant {
                self.bump();
                self.skip_whitespace();
            }
            combinators.push(combinator);
            parts.push(self.compound_selector()?);
        }
        Ok(ComplexSelector { parts, combinators })
    }

    fn compound_selector(&mut self) -> Result<CompoundSelector, ParseError> {
        let mut components = Vec::new();
        if self.eat('*') {
            components.push(SelectorComponent::Universal);
        } else if self.peek().is_some_and(is_ident_start) {
            components.push(SelectorComponent::Type(self.identifier()?));
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    components.push(SelectorComponent::Id(self.identifier()?));
                }
                Some('.') => {
                    self.bump();
                    components.push(SelectorComponent::Class(self.identifier()?));
                }
                Some('[') => {
                    self.bump();
                    components.push(SelectorComponent::Attribute(self.attribute_selector()?));
                }
                Some(':') => {
                    self.bump();
                    components.push(SelectorComponent::PseudoClass(self.pseudo_class()?));
                }
                _ => break,
            }
        }

        if components.is_empty() {
            return Err(match self.peek() {
                Some(c) => self.error(format!("expected a selector, found '{c}'")),
                None => self.error("expected a selector"),
            });
        }
        Ok(CompoundSelector { components })
    }

    fn attribute_selector(&mut self) -> Result<AttributeSelector, ParseError> {
        self.skip_whitespace();
        let name = self.identifier()?;
        self.skip_whitespace();

        if self.eat(']') {
            return Ok(AttributeSelector {
                name,
                matcher: None,
                case_insensitive: false,
            });
        }

        let operator = match self.peek() {
            Some('=') => '=',
            Some(op @ ('~' | '|' | '^' | '$' | '*')) => {
                self.bump();
                if self.peek() != Some('=') {
                    return Err(self.error(format!("expected '=' after '{op}'")));
                }
                op
            }
            _ => return Err(self.error("expected an attribute operator or ']'")),
        };
        self.bump();
        self.skip_whitespace();

        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => self.string(quote)?,
            _ => self.identifier()?,
        };
        self.skip_whitespace();

        let mut case_insensitive = false;
        if let Some(flag @ ('i' | 'I' | 's' | 'S')) = self.peek() {
            self.bump();
            case_insensitive = flag.eq_ignore_ascii_case(&'i');
            self.skip_whitespace();
        }
        if !self.eat(']') {
            return Err(self.error("expected ']'"));
        }

        let matcher = match operator {
            '=' => AttributeMatcher::Exact(value),
            '~' => AttributeMatcher::Contains(value),
            '|' => AttributeMatcher::DashMatch(value),
            '^' => AttributeMatcher::Prefix(value),
            '$' => AttributeMatcher::Suffix(value),
            _ => AttributeMatcher::Substring(value),
        };
        Ok(AttributeSelector {
            name,
            matcher: Some(matcher),
            case_insensitive,
        })
    }

    fn pseudo_class(&mut self) -> Result<PseudoClass, ParseError> {
        if self.peek() == Some(':') {
            return Err(self.error("pseudo-elements are not supported"));
        }
        let start = self.pos;
        let name = self.identifier()?.to_ascii_lowercase();

        let simple = match name.as_str() {
            "root" => Some(PseudoClass::Root),
            "empty" => Some(PseudoClass::Empty),
            "first-child" => Some(PseudoClass::FirstChild),
            "last-child" => Some(PseudoClass::LastChild),
            "only-child" => Some(PseudoClass::OnlyChild),
            "first-of-type" => Some(PseudoClass::FirstOfType),
            "last-of-type" => Some(PseudoClass::LastOfType),
            "only-of-type" => Some(PseudoClass::OnlyOfType),
            _ => None,
        };
        if let Some(pseudo) = simple {
            return Ok(pseudo);
        }

        if !self.eat('(') {
            return Err(ParseError::new(start, format!("unsupported pseudo-class ':{name}'")));
        }
        let pseudo = match name.as_str() {
            "not" => {
                if self.depth >= MAX_NESTING {
                    return Err(ParseError::new(start, format!(":not() nested deeper than {MAX_NESTING} levels")));
                }
                self.depth += 1;
                let mut compounds = Vec::new();
                loop {
                    self.skip_whitespace();
                    compounds.push(self.compound_selector()?);
                    self.skip_whitespace();
                    if !self.eat(',') {
                        break;
                    }
                }
                self.depth -= 1;
                PseudoClass::Not(compounds)
            }
            "nth-child" | "nth-last-child" | "nth-of-type" | "nth-last-of-type" => {
                let argument_start = self.pos;
                let argument_end = self.input[self.pos..]
                    .find(')')
                    .map_or(self.input.len(), |i| self.pos + i);
                let argument = &self.input[argument_start..argument_end];
                let expr = NthExpression::parse(argument).ok_or_else(|| {
                    ParseError::new(argument_start, format!("invalid An+B expression '{argument}'"))
                })?;
                self.pos = argument_end;
                match name.as_str() {
                    "nth-child" => PseudoClass::NthChild(expr),
                    "nth-last-child" => PseudoClass::NthLastChild(expr),
                    "nth-of-type" => PseudoClass::NthOfType(expr),
                    _ => PseudoClass::NthLastOfType(expr),
                }
            }
            _ => return Err(ParseError::new(start, format!("unsupported pseudo-class ':{name}()'"))),
        };
        if !self.eat(')') {
            return Err(self.error("expected ')'"));
        }
        Ok(pseudo)
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.bump();
                match self.peek() {
                    Some(escaped) => {
                        ident.push(escaped);
                        self.bump();
                    }
                    None => return Err(self.error("dangling escape")),
                }
            } else if is_ident_char(c) {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if ident.is_empty() {
            return Err(self.error("expected an identifier"));
        }
        Ok(ident)
    }

    fn string(&mut self, quote: char) -> Result<String, ParseError> {
        let start = self.pos;
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(value);
                }
                Some('\\') => {
                    self.bump();
                    if let Some(escaped) = self.peek() {
                        value.push(escaped);
                        self.bump();
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
                None => return Err(ParseError::new(start, "unterminated string")),
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        self.pos > start
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.pos, message)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '-' || c == '\\' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}
