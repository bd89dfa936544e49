//! XPath 1.0 subset evaluated against a source-range [`Document`].
//!
//! Location paths with the child, descendant, descendant-or-self, self,
//! parent, ancestor, ancestor-or-self, following-sibling, preceding-sibling
//! and attribute axes; predicates; boolean, comparison, arithmetic and union
//! operators; and a small core function library.

use crate::markup::{Document, NodeData, NodeId};
use crate::select::errors::{ParseError, SelectorError};

/// A parsed XPath expression.
#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens,
            index: 0,
            end: input.len(),
            depth: 0,
        };
        let expr = parser.or_expr()?;
        if let Some((offset, token)) = parser.tokens.get(parser.index) {
            return Err(ParseError::new(*offset, format!("unexpected {token:?}")));
        }
        Ok(Self {
            source: input.to_owned(),
            expr,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluate from the document root and keep the element nodes of the
    /// result, in document order.
    pub fn select(&self, document: &Document) -> Result<Vec<NodeId>, SelectorError> {
        let evaluator = Evaluator { document };
        let root = Context {
            node: XNode::Root,
            position: 1,
            size: 1,
        };
        let value = evaluator
            .eval(&self.expr, root)
            .map_err(|message| self.evaluation_error(message))?;
        match value {
            Value::Nodes(nodes) => Ok(nodes
                .into_iter()
                .filter_map(|node| match node {
                    XNode::Node(id) if document.node(id).is_element() => Some(id),
                    _ => None,
                })
                .collect()),
            other => Err(self.evaluation_error(format!(
                "expression returns a {} instead of nodes",
                other.type_name()
            ))),
        }
    }

    fn evaluation_error(&self, message: String) -> SelectorError {
        SelectorError::XPathEvaluation {
            expression: self.source.clone(),
            message,
        }
    }
}

// ── Syntax tree ──

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Path {
        start: Option<Box<Expr>>,
        absolute: bool,
        steps: Vec<Step>,
    },
    Filter(Box<Expr>, Vec<Expr>),
    Literal(String),
    Number(f64),
    Function(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    Any,
    Node,
    Text,
    Comment,
}

const FUNCTIONS: &[&str] = &[
    "last",
    "position",
    "count",
    "contains",
    "starts-with",
    "not",
    "string",
    "normalize-space",
    "name",
    "local-name",
    "concat",
    "true",
    "false",
];

// ── Lexer ──

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Dot,
    DotDot,
    Comma,
    Pipe,
    ColonColon,
    Star,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Name(String),
    Literal(String),
    Number(f64),
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let mut lexer = Lexer { input, pos: 0 };
    let mut tokens = Vec::new();
    loop {
        while lexer.peek().is_some_and(char::is_whitespace) {
            lexer.bump();
        }
        let offset = lexer.pos;
        let Some(c) = lexer.peek() else {
            break;
        };
        let token = match c {
            '/' => {
                lexer.bump();
                if lexer.eat('/') {
                    Token::DoubleSlash
                } else {
                    Token::Slash
                }
            }
            '.' => {
                lexer.bump();
                if lexer.eat('.') {
                    Token::DotDot
                } else if lexer.peek().is_some_and(|c| c.is_ascii_digit()) {
                    lexer.pos = offset;
                    lexer.number()
                } else {
                    Token::Dot
                }
            }
            ':' => {
                lexer.bump();
                if !lexer.eat(':') {
                    return Err(ParseError::new(offset, "unexpected ':'"));
                }
                Token::ColonColon
            }
            '!' => {
                lexer.bump();
                if !lexer.eat('=') {
                    return Err(ParseError::new(offset, "expected '!='"));
                }
                Token::NotEq
            }
            '<' => {
                lexer.bump();
                if lexer.eat('=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                lexer.bump();
                if lexer.eat('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '"' | '\'' => lexer.literal(c)?,
            c if c.is_ascii_digit() => lexer.number(),
            c if is_name_start(c) => Token::Name(lexer.name()),
            single => {
                let token = match single {
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '@' => Token::At,
                    ',' => Token::Comma,
                    '|' => Token::Pipe,
                    '*' => Token::Star,
                    '=' => Token::Eq,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    other => return Err(ParseError::new(offset, format!("unexpected '{other}'"))),
                };
                lexer.bump();
                token
            }
        };
        tokens.push((offset, token));
    }
    Ok(tokens)
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.input[self.pos..].chars().nth(1)
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

    fn number(&mut self) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.eat('.') {
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        Token::Number(self.input[start..self.pos].parse().unwrap_or(f64::NAN))
    }

    fn literal(&mut self, quote: char) -> Result<Token, ParseError> {
        let start = self.pos;
        self.bump();
        let content_start = self.pos;
        match self.input[content_start..].find(quote) {
            Some(len) => {
                self.pos = content_start + len + 1;
                Ok(Token::Literal(self.input[content_start..content_start + len].to_owned()))
            }
            None => Err(ParseError::new(start, "unterminated string literal")),
        }
    }

    fn name(&mut self) -> String {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(c) if is_name_char(c) => self.bump(),
                // a prefixed name, not an axis separator
                Some(':') if self.peek_second().is_some_and(is_name_start) => self.bump(),
                _ => break,
            }
        }
        self.input[start..self.pos].to_owned()
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || !c.is_ascii()
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.') || !c.is_ascii()
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "node" | "text" | "comment")
}

// ── Parser ──

/// Deepest nesting of parentheses, predicates, function arguments and
/// negations accepted in one expression.
const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<(usize, Token)>,
    index: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(_, token)| token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.index + ahead).map(|(_, token)| token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.index)
            .map_or(self.end, |(offset, _)| *offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|(_, token)| token.clone());
        self.index += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ParseError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn is_operator_name(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == name)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.offset(), message)
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("expression nested deeper than {MAX_NESTING} levels")));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_expr()?;
        while self.is_operator_name("or") {
            self.index += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.equality_expr()?;
        while self.is_operator_name("and") {
            self.index += 1;
            let right = self.equality_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.relational_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CompareOp::Eq,
                Some(Token::NotEq) => CompareOp::NotEq,
                _ => return Ok(left),
            };
            self.index += 1;
            let right = self.relational_expr()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn relational_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                _ => return Ok(left),
            };
            self.index += 1;
            let right = self.additive_expr()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn additive_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.index += 1;
            let right = self.multiplicative_expr()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Name(n)) if n == "div" => ArithOp::Div,
                Some(Token::Name(n)) if n == "mod" => ArithOp::Mod,
                _ => return Ok(left),
            };
            self.index += 1;
            let right = self.unary_expr()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Negate(Box::new(self.nested(Self::unary_expr)?)));
        }
        self.union_expr()
    }

    fn union_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.path_expr()?;
        while self.eat(&Token::Pipe) {
            let right = self.path_expr()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn path_expr(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Slash) => {
                self.index += 1;
                let steps = if self.starts_step() {
                    self.relative_steps()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path {
                    start: None,
                    absolute: true,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                self.index += 1;
                let mut steps = vec![descendant_or_self()];
                steps.extend(self.relative_steps()?);
                Ok(Expr::Path {
                    start: None,
                    absolute: true,
                    steps,
                })
            }
            _ if self.starts_primary() => {
                let primary = self.primary_expr()?;
                let predicates = self.predicates()?;
                let filter = if predicates.is_empty() {
                    primary
                } else {
                    Expr::Filter(Box::new(primary), predicates)
                };
                if !matches!(self.peek(), Some(Token::Slash | Token::DoubleSlash)) {
                    return Ok(filter);
                }
                let mut steps = Vec::new();
                self.continue_steps(&mut steps)?;
                Ok(Expr::Path {
                    start: Some(Box::new(filter)),
                    absolute: false,
                    steps,
                })
            }
            _ => Ok(Expr::Path {
                start: None,
                absolute: false,
                steps: self.relative_steps()?,
            }),
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DotDot | Token::At | Token::Star | Token::Name(_))
        )
    }

    fn starts_primary(&self) -> bool {
        match self.peek() {
            Some(Token::Literal(_) | Token::Number(_) | Token::LParen) => true,
            Some(Token::Name(name)) => {
                !is_node_type(name) && self.peek_at(1) == Some(&Token::LParen)
            }
            _ => false,
        }
    }

    fn relative_steps(&mut self) -> Result<Vec<Step>, ParseError> {
        let mut steps = vec![self.step()?];
        self.continue_steps(&mut steps)?;
        Ok(steps)
    }

    fn continue_steps(&mut self, steps: &mut Vec<Step>) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(Token::Slash) => self.index += 1,
                Some(Token::DoubleSlash) => {
                    self.index += 1;
                    steps.push(descendant_or_self());
                }
                _ => return Ok(()),
            }
            steps.push(self.step()?);
        }
    }

    fn step(&mut self) -> Result<Step, ParseError> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::ColonColon)) = (self.peek(), self.peek_at(1)) {
            let axis = Axis::from_name(name)
                .ok_or_else(|| self.error(format!("unsupported axis '{name}'")))?;
            self.index += 2;
            axis
        } else {
            Axis::Child
        };

        let test = match self.advance() {
            Some(Token::Star) => NodeTest::Any,
            Some(Token::Name(name)) if is_node_type(&name) && self.peek() == Some(&Token::LParen) => {
                self.index += 1;
                self.expect(Token::RParen, "')'")?;
                match name.as_str() {
                    "node" => NodeTest::Node,
                    "text" => NodeTest::Text,
                    _ => NodeTest::Comment,
                }
            }
            Some(Token::Name(name)) => NodeTest::Name(name),
            _ => {
                self.index -= 1;
                return Err(self.error("expected a node test"));
            }
        };

        Ok(Step {
            axis,
            test,
            predicates: self.predicates()?,
        })
    }

    fn predicates(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.nested(Self::or_expr)?);
            self.expect(Token::RBracket, "']'")?;
        }
        Ok(predicates)
    }

    fn primary_expr(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Literal(value)) => Ok(Expr::Literal(value)),
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::LParen) => {
                let expr = self.nested(Self::or_expr)?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Some(Token::Name(name)) => {
                if !FUNCTIONS.contains(&name.as_str()) {
                    return Err(ParseError::new(offset, format!("unknown function '{name}'")));
                }
                self.expect(Token::LParen, "'('")?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.nested(Self::or_expr)?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(Token::Comma, "',' or ')'")?;
                    }
                }
                Ok(Expr::Function(name, args))
            }
            _ => Err(ParseError::new(offset, "expected an expression")),
        }
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}

// ── Evaluation ──

/// A node in the XPath data model: the document root, a parsed node, or an
/// attribute (owner element, attribute index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum XNode {
    Root,
    Node(NodeId),
    Attribute(NodeId, usize),
}

impl XNode {
    /// Attributes sort after their element and before its children, which
    /// always have larger ids.
    fn order_key(self) -> (usize, usize, usize) {
        match self {
            XNode::Root => (0, 0, 0),
            XNode::Node(id) => (1, id.index(), 0),
            XNode::Attribute(id, index) => (1, id.index(), index + 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Nodes(Vec<XNode>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Nodes(_) => "node-set",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Context {
    node: XNode,
    position: usize,
    size: usize,
}

struct Evaluator<'d> {
    document: &'d Document,
}

type EvalResult<T> = Result<T, String>;

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr, ctx: Context) -> EvalResult<Value> {
        match expr {
            Expr::Or(left, right) => Ok(Value::Boolean(
                self.eval_boolean(left, ctx)? || self.eval_boolean(right, ctx)?,
            )),
            Expr::And(left, right) => Ok(Value::Boolean(
                self.eval_boolean(left, ctx)? && self.eval_boolean(right, ctx)?,
            )),
            Expr::Compare(op, left, right) => {
                let left = self.eval(left, ctx)?;
                let right = self.eval(right, ctx)?;
                Ok(Value::Boolean(self.compare(*op, &left, &right)))
            }
            Expr::Arith(op, left, right) => {
                let left = self.number(&self.eval(left, ctx)?);
                let right = self.number(&self.eval(right, ctx)?);
                Ok(Value::Number(match op {
                    ArithOp::Add => left + right,
                    ArithOp::Sub => left - right,
                    ArithOp::Mul => left * right,
                    ArithOp::Div => left / right,
                    ArithOp::Mod => left % right,
                }))
            }
            Expr::Negate(inner) => Ok(Value::Number(-self.number(&self.eval(inner, ctx)?))),
            Expr::Union(left, right) => {
                let mut nodes = self.eval_nodes(left, ctx)?;
                nodes.extend(self.eval_nodes(right, ctx)?);
                Ok(Value::Nodes(document_order(nodes)))
            }
            Expr::Path {
                start,
                absolute,
                steps,
            } => {
                let mut nodes = match start {
                    Some(start) => self.eval_nodes(start, ctx)?,
                    None if *absolute => vec![XNode::Root],
                    None => vec![ctx.node],
                };
                for step in steps {
                    nodes = self.step(&nodes, step)?;
                }
                Ok(Value::Nodes(nodes))
            }
            Expr::Filter(primary, predicates) => {
                let mut nodes = document_order(self.eval_nodes(primary, ctx)?);
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                Ok(Value::Nodes(nodes))
            }
            Expr::Literal(value) => Ok(Value::String(value.clone())),
            Expr::Number(value) => Ok(Value::Number(*value)),
            Expr::Function(name, args) => self.function(name, args, ctx),
        }
    }

    fn eval_boolean(&self, expr: &Expr, ctx: Context) -> EvalResult<bool> {
        Ok(self.boolean(&self.eval(expr, ctx)?))
    }

    fn eval_nodes(&self, expr: &Expr, ctx: Context) -> EvalResult<Vec<XNode>> {
        match self.eval(expr, ctx)? {
            Value::Nodes(nodes) => Ok(nodes),
            other => Err(format!("expected a node-set, found a {}", other.type_name())),
        }
    }

    fn step(&self, nodes: &[XNode], step: &Step) -> EvalResult<Vec<XNode>> {
        let mut result = Vec::new();
        for node in nodes {
            let mut candidates: Vec<XNode> = self
                .axis(*node, step.axis)
                .into_iter()
                .filter(|candidate| self.node_test(*candidate, step))
                .collect();
            for predicate in &step.predicates {
                candidates = self.filter(candidates, predicate)?;
            }
            result.extend(candidates);
        }
        Ok(document_order(result))
    }

    /// Keep the nodes for which `predicate` holds; `candidates` is in axis
    /// order, which gives positional predicates their proximity position.
    fn filter(&self, candidates: Vec<XNode>, predicate: &Expr) -> EvalResult<Vec<XNode>> {
        let size = candidates.len();
        let mut kept = Vec::new();
        for (index, node) in candidates.into_iter().enumerate() {
            let ctx = Context {
                node,
                position: index + 1,
                size,
            };
            let keep = match self.eval(predicate, ctx)? {
                Value::Number(n) => n == (index + 1) as f64,
                other => self.boolean(&other),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    fn axis(&self, node: XNode, axis: Axis) -> Vec<XNode> {
        match axis {
            Axis::Child => self.children(node),
            Axis::Descendant => self.descendants(node),
            Axis::DescendantOrSelf => {
                let mut nodes = vec![node];
                nodes.extend(self.descendants(node));
                nodes
            }
            Axis::SelfAxis => vec![node],
            Axis::Parent => self.parent(node).into_iter().collect(),
            Axis::Ancestor => self.ancestors(node),
            Axis::AncestorOrSelf => {
                let mut nodes = vec![node];
                nodes.extend(self.ancestors(node));
                nodes
            }
            Axis::FollowingSibling => {
                let (siblings, index) = self.siblings(node);
                siblings.into_iter().skip(index + 1).collect()
            }
            Axis::PrecedingSibling => {
                let (siblings, index) = self.siblings(node);
                siblings.into_iter().take(index).rev().collect()
            }
            Axis::Attribute => match node {
                XNode::Node(id) => self.document.element(id).map_or_else(Vec::new, |element| {
                    (0..element.attributes().len())
                        .map(|index| XNode::Attribute(id, index))
                        .collect()
                }),
                _ => Vec::new(),
            },
        }
    }

    fn children(&self, node: XNode) -> Vec<XNode> {
        match node {
            XNode::Root => self.document.roots().iter().map(|id| XNode::Node(*id)).collect(),
            XNode::Node(id) => self
                .document
                .node(id)
                .children()
                .iter()
                .map(|child| XNode::Node(*child))
                .collect(),
            XNode::Attribute(..) => Vec::new(),
        }
    }

    fn descendants(&self, node: XNode) -> Vec<XNode> {
        match node {
            XNode::Root => (0..self.document.len()).map(|i| XNode::Node(NodeId(i))).collect(),
            XNode::Node(id) => self
                .document
                .descendants(id)
                .into_iter()
                .map(XNode::Node)
                .collect(),
            XNode::Attribute(..) => Vec::new(),
        }
    }

    fn parent(&self, node: XNode) -> Option<XNode> {
        match node {
            XNode::Root => None,
            XNode::Node(id) => Some(self.document.node(id).parent().map_or(XNode::Root, XNode::Node)),
            XNode::Attribute(owner, _) => Some(XNode::Node(owner)),
        }
    }

    /// Nearest first.
    fn ancestors(&self, node: XNode) -> Vec<XNode> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(node);
        while let Some(ancestor) = current {
            ancestors.push(ancestor);
            current = self.parent(ancestor);
        }
        ancestors
    }

    fn siblings(&self, node: XNode) -> (Vec<XNode>, usize) {
        let XNode::Node(id) = node else {
            return (Vec::new(), 0);
        };
        let siblings = self.document.child_ids(self.document.node(id).parent());
        let index = siblings.iter().position(|s| *s == id).unwrap_or(0);
        (siblings.iter().map(|s| XNode::Node(*s)).collect(), index)
    }

    fn node_test(&self, node: XNode, step: &Step) -> bool {
        let flavor = self.document.flavor();
        match (&step.test, node) {
            (NodeTest::Node, _) => true,
            (NodeTest::Text, XNode::Node(id)) => {
                matches!(self.document.node(id).data(), NodeData::Text)
            }
            (NodeTest::Comment, XNode::Node(id)) => {
                matches!(self.document.node(id).data(), NodeData::Comment)
            }
            (NodeTest::Any, XNode::Attribute(..)) => step.axis == Axis::Attribute,
            (NodeTest::Any, XNode::Node(id)) => self.document.node(id).is_element(),
            (NodeTest::Name(name), XNode::Attribute(owner, index)) => self
                .attribute(owner, index)
                .is_some_and(|attribute| flavor.names_match(attribute.name(), name)),
            (NodeTest::Name(name), XNode::Node(id)) => self
                .document
                .element(id)
                .is_some_and(|element| flavor.names_match(element.name(), name)),
            _ => false,
        }
    }

    fn attribute(&self, owner: NodeId, index: usize) -> Option<&crate::markup::Attribute> {
        self.document.element(owner)?.attributes().get(index)
    }

    fn string_value(&self, node: XNode) -> String {
        match node {
            XNode::Root => self
                .document
                .roots()
                .iter()
                .filter(|id| !matches!(self.document.node(**id).data(), NodeData::Comment | NodeData::Declaration))
                .map(|id| self.document.text_content(*id))
                .collect(),
            XNode::Node(id) => match self.document.node(id).data() {
                NodeData::Element(_) | NodeData::Text => self.document.text_content(id),
                NodeData::Comment => {
                    let raw = self.document.raw_text(id);
                    let inner = raw.strip_prefix("<!--").unwrap_or(raw);
                    inner.strip_suffix("-->").unwrap_or(inner).to_owned()
                }
                NodeData::Declaration => self.document.raw_text(id).to_owned(),
            },
            XNode::Attribute(owner, index) => self
                .attribute(owner, index)
                .and_then(|attribute| attribute.value())
                .unwrap_or("")
                .to_owned(),
        }
    }

    fn node_name(&self, node: XNode) -> String {
        match node {
            XNode::Node(id) => self
                .document
                .element(id)
                .map_or_else(String::new, |element| element.name().to_owned()),
            XNode::Attribute(owner, index) => self
                .attribute(owner, index)
                .map_or_else(String::new, |attribute| attribute.name().to_owned()),
            XNode::Root => String::new(),
        }
    }

    // ── Conversions ──

    fn string(&self, value: &Value) -> String {
        match value {
            Value::Nodes(nodes) => nodes
                .first()
                .map_or_else(String::new, |node| self.string_value(*node)),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
        }
    }

    fn number(&self, value: &Value) -> f64 {
        match value {
            Value::Number(n) => *n,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            other => parse_number(&self.string(other)),
        }
    }

    fn boolean(&self, value: &Value) -> bool {
        match value {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
        }
    }

    fn compare(&self, op: CompareOp, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Nodes(_), Value::Boolean(_)) | (Value::Boolean(_), Value::Nodes(_)) => self
                .compare_atoms(
                    op,
                    &Value::Boolean(self.boolean(left)),
                    &Value::Boolean(self.boolean(right)),
                ),
            (Value::Nodes(a), Value::Nodes(b)) => a.iter().any(|x| {
                let x = Value::String(self.string_value(*x));
                b.iter()
                    .any(|y| self.compare_atoms(op, &x, &Value::String(self.string_value(*y))))
            }),
            (Value::Nodes(nodes), other) => nodes
                .iter()
                .any(|node| self.compare_atoms(op, &self.node_as(*node, other), other)),
            (other, Value::Nodes(nodes)) => nodes
                .iter()
                .any(|node| self.compare_atoms(op, other, &self.node_as(*node, other))),
            _ => self.compare_atoms(op, left, right),
        }
    }

    /// A node's string value, as a number when compared with a number.
    fn node_as(&self, node: XNode, other: &Value) -> Value {
        let string = self.string_value(node);
        match other {
            Value::Number(_) => Value::Number(parse_number(&string)),
            _ => Value::String(string),
        }
    }

    fn compare_atoms(&self, op: CompareOp, left: &Value, right: &Value) -> bool {
        match op {
            CompareOp::Eq | CompareOp::NotEq => {
                let equal = if matches!(left, Value::Boolean(_)) || matches!(right, Value::Boolean(_)) {
                    self.boolean(left) == self.boolean(right)
                } else if matches!(left, Value::Number(_)) || matches!(right, Value::Number(_)) {
                    self.number(left) == self.number(right)
                } else {
                    self.string(left) == self.string(right)
                };
                equal == (op == CompareOp::Eq)
            }
            CompareOp::Lt => self.number(left) < self.number(right),
            CompareOp::Le => self.number(left) <= self.number(right),
            CompareOp::Gt => self.number(left) > self.number(right),
            CompareOp::Ge => self.number(left) >= self.number(right),
        }
    }

    // ── Functions ──

    fn function(&self, name: &str, args: &[Expr], ctx: Context) -> EvalResult<Value> {
        let arity = |min: usize, max: usize| {
            if args.len() < min || args.len() > max {
                Err(format!("{name}() takes {} arguments, got {}", arity_text(min, max), args.len()))
            } else {
                Ok(())
            }
        };
        let string_arg = |index: usize| -> EvalResult<String> {
            match args.get(index) {
                Some(arg) => Ok(self.string(&self.eval(arg, ctx)?)),
                None => Ok(self.string_value(ctx.node)),
            }
        };
        let node_arg = |index: usize| -> EvalResult<Option<XNode>> {
            match args.get(index) {
                Some(arg) => Ok(self.eval_nodes(arg, ctx)?.first().copied()),
                None => Ok(Some(ctx.node)),
            }
        };

        let value = match name {
            "last" => {
                arity(0, 0)?;
                Value::Number(ctx.size as f64)
            }
            "position" => {
                arity(0, 0)?;
                Value::Number(ctx.position as f64)
            }
            "count" => {
                arity(1, 1)?;
                Value::Number(self.eval_nodes(&args[0], ctx)?.len() as f64)
            }
            "contains" => {
                arity(2, 2)?;
                Value::Boolean(string_arg(0)?.contains(&string_arg(1)?))
            }
            "starts-with" => {
                arity(2, 2)?;
                Value::Boolean(string_arg(0)?.starts_with(&string_arg(1)?))
            }
            "not" => {
                arity(1, 1)?;
                Value::Boolean(!self.eval_boolean(&args[0], ctx)?)
            }
            "string" => {
                arity(0, 1)?;
                Value::String(string_arg(0)?)
            }
            "normalize-space" => {
                arity(0, 1)?;
                Value::String(string_arg(0)?.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            "name" | "local-name" => {
                arity(0, 1)?;
                let full = node_arg(0)?.map_or_else(String::new, |node| self.node_name(node));
                if name == "local-name" {
                    let local = full.rsplit(':').next().unwrap_or("");
                    Value::String(local.to_owned())
                } else {
                    Value::String(full)
                }
            }
            "concat" => {
                if args.len() < 2 {
                    return Err(format!("concat() takes at least 2 arguments, got {}", args.len()));
                }
                let mut joined = String::new();
                for index in 0..args.len() {
                    joined.push_str(&string_arg(index)?);
                }
                Value::String(joined)
            }
            "true" => {
                arity(0, 0)?;
                Value::Boolean(true)
            }
            "false" => {
                arity(0, 0)?;
                Value::Boolean(false)
            }
            other => return Err(format!("unknown function '{other}'")),
        };
        Ok(value)
    }
}

fn arity_text(min: usize, max: usize) -> String {
    if min == max {
        min.to_string()
    } else {
        format!("{min} to {max}")
    }
}

fn document_order(mut nodes: Vec<XNode>) -> Vec<XNode> {
    nodes.sort_by_key(|node| node.order_key());
    nodes.dedup();
    nodes
}

/// XPath number syntax: optional minus, digits, optional fraction.
fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let valid = !digits.is_empty()
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1;
    if valid {
        trimmed.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
