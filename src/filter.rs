//! LDAP-style service filters (RFC 1960 subset used by OSGi).
//!
//! A parsed [`LdapFilter`] is the concrete implementation of the [`Filter`]
//! predicate the registry, listeners and configuration admin consult.

use std::fmt;
use std::str::FromStr;

use crate::error::{OsgiError, OsgiResult};
use crate::properties::{Properties, PropertyValue};

/// Predicate over a property map.
pub trait Filter: Send + Sync + fmt::Debug {
    /// Returns true when the properties satisfy the predicate.
    fn matches(&self, properties: &Properties) -> bool;
}

/// Parsed LDAP filter expression.
///
/// # Examples
///
/// ```rust
/// use osgi_mock::{properties, Filter, LdapFilter};
///
/// let filter = LdapFilter::parse("(&(objectClass=com.example.Greeter)(!(lang=fr)))").unwrap();
/// let props = properties! { "objectClass" => vec!["com.example.Greeter"], "lang" => "en" };
/// assert!(filter.matches(&props));
/// assert!(!filter.matches(&properties! { "lang" => "fr" }));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LdapFilter {
    source: String,
    node: Node,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Present(String),
    Compare { attr: String, op: Op, value: String },
    Substring { attr: String, parts: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Equal,
    Approx,
    GreaterEq,
    LessEq,
}

impl LdapFilter {
    /// Parses a filter string.
    pub fn parse(source: &str) -> OsgiResult<Self> {
        let mut parser = Parser {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
        };
        parser.skip_ws();
        let node = parser.filter()?;
        parser.skip_ws();
        if parser.pos < parser.chars.len() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(Self {
            source: source.to_string(),
            node,
        })
    }

    /// The original filter string.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Filter for LdapFilter {
    fn matches(&self, properties: &Properties) -> bool {
        self.node.eval(properties)
    }
}

impl FromStr for LdapFilter {
    type Err = OsgiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LdapFilter::parse(s)
    }
}

impl fmt::Display for LdapFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parses an optional filter string, treating `None` as "match everything".
pub(crate) fn parse_optional(filter: Option<&str>) -> OsgiResult<Option<LdapFilter>> {
    filter.map(LdapFilter::parse).transpose()
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> OsgiResult<()> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(&format!("expected '{}' but found '{}'", expected, c))),
            None => Err(self.error(&format!("expected '{}' but reached end", expected))),
        }
    }

    fn error(&self, detail: &str) -> OsgiError {
        let offset = self
            .chars
            .get(self.pos)
            .map(|(i, _)| *i)
            .unwrap_or(self.source.len());
        OsgiError::InvalidSyntax {
            filter: self.source.to_string(),
            detail: format!("{} at offset {}", detail, offset),
        }
    }

    fn filter(&mut self) -> OsgiResult<Node> {
        self.expect('(')?;
        self.skip_ws();
        let node = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Node::And(self.filter_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Node::Or(self.filter_list()?)
            }
            Some('!') => {
                self.pos += 1;
                self.skip_ws();
                Node::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unterminated filter")),
        };
        self.skip_ws();
        self.expect(')')?;
        Ok(node)
    }

    fn filter_list(&mut self) -> OsgiResult<Vec<Node>> {
        let mut nodes = Vec::new();
        self.skip_ws();
        while self.peek() == Some('(') {
            nodes.push(self.filter()?);
            self.skip_ws();
        }
        if nodes.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(nodes)
    }

    fn item(&mut self) -> OsgiResult<Node> {
        let mut attr = String::new();
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '<' | '>' | '~' | '(' | ')') {
                break;
            }
            attr.push(c);
            self.pos += 1;
        }
        let attr = attr.trim().to_string();
        if attr.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let op = match self.bump() {
            Some('=') => Op::Equal,
            Some('~') => {
                self.expect('=')?;
                Op::Approx
            }
            Some('>') => {
                self.expect('=')?;
                Op::GreaterEq
            }
            Some('<') => {
                self.expect('=')?;
                Op::LessEq
            }
            _ => return Err(self.error("invalid operator")),
        };

        let (parts, has_wildcard) = self.value()?;
        if op == Op::Equal && has_wildcard {
            if parts.len() == 2 && parts.iter().all(String::is_empty) {
                return Ok(Node::Present(attr));
            }
            return Ok(Node::Substring { attr, parts });
        }
        Ok(Node::Compare {
            attr,
            op,
            value: parts.concat(),
        })
    }

    /// Reads a value up to the closing parenthesis, splitting on unescaped
    /// `*`. Returns the literal segments and whether a wildcard occurred.
    /// Unescaped whitespace before the closing parenthesis is dropped.
    fn value(&mut self) -> OsgiResult<(Vec<String>, bool)> {
        let mut parts = vec![String::new()];
        let mut wildcard = false;
        // length of the last segment up to its final escaped character
        let mut escaped_len = 0;
        loop {
            match self.peek() {
                Some(')') => {
                    if let Some(p) = parts.last_mut() {
                        let end = p.trim_end().len().max(escaped_len);
                        p.truncate(end);
                    }
                    break;
                }
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('\\') => {
                    self.pos += 1;
                    let c = self.bump().ok_or_else(|| self.error("dangling escape"))?;
                    if let Some(p) = parts.last_mut() {
                        p.push(c);
                        escaped_len = p.len();
                    }
                }
                Some('*') => {
                    self.pos += 1;
                    wildcard = true;
                    escaped_len = 0;
                    parts.push(String::new());
                }
                Some(c) => {
                    self.pos += 1;
                    if let Some(p) = parts.last_mut() {
                        p.push(c);
                    }
                }
                None => return Err(self.error("unterminated value")),
            }
        }
        Ok((parts, wildcard))
    }
}

impl Node {
    fn eval(&self, properties: &Properties) -> bool {
        match self {
            Node::And(nodes) => nodes.iter().all(|n| n.eval(properties)),
            Node::Or(nodes) => nodes.iter().any(|n| n.eval(properties)),
            Node::Not(node) => !node.eval(properties),
            Node::Present(attr) => lookup(properties, attr).is_some(),
            Node::Compare { attr, op, value } => lookup(properties, attr)
                .map(|v| compare(v, *op, value))
                .unwrap_or(false),
            Node::Substring { attr, parts } => lookup(properties, attr)
                .map(|v| substring(v, parts))
                .unwrap_or(false),
        }
    }
}

/// Attribute names match case-insensitively.
fn lookup<'p>(properties: &'p Properties, attr: &str) -> Option<&'p PropertyValue> {
    properties
        .get(attr)
        .or_else(|| {
            properties
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(attr))
                .map(|(_, v)| v)
        })
}

fn compare(actual: &PropertyValue, op: Op, expected: &str) -> bool {
    match actual {
        PropertyValue::Array(values) => values.iter().any(|v| compare(v, op, expected)),
        PropertyValue::String(s) => match op {
            Op::Equal => s == expected,
            Op::Approx => normalize(s) == normalize(expected),
            Op::GreaterEq => s.as_str() >= expected,
            Op::LessEq => s.as_str() <= expected,
        },
        PropertyValue::Integer(i) => match expected.trim().parse::<i64>() {
            Ok(e) => match op {
                Op::Equal | Op::Approx => *i == e,
                Op::GreaterEq => *i >= e,
                Op::LessEq => *i <= e,
            },
            Err(_) => false,
        },
        PropertyValue::Float(f) => match expected.trim().parse::<f64>() {
            Ok(e) => match op {
                Op::Equal | Op::Approx => *f == e,
                Op::GreaterEq => *f >= e,
                Op::LessEq => *f <= e,
            },
            Err(_) => false,
        },
        PropertyValue::Boolean(b) => match op {
            Op::Equal | Op::Approx => expected.trim().eq_ignore_ascii_case(if *b { "true" } else { "false" }),
            Op::GreaterEq | Op::LessEq => false,
        },
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn substring(actual: &PropertyValue, parts: &[String]) -> bool {
    match actual {
        PropertyValue::Array(values) => values.iter().any(|v| substring(v, parts)),
        PropertyValue::String(s) => substring_match(s, parts),
        other => substring_match(&other.to_string(), parts),
    }
}

fn substring_match(s: &str, parts: &[String]) -> bool {
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return false,
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return s == first,
    };
    if !s.starts_with(first.as_str()) {
        return false;
    }
    let mut remaining = &s[first.len()..];
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}
