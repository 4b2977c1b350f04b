//! Minimal tag/text markup reader for annotated utterances.
//!
//! Grammar: text runs and elements (`<name attr="v">...</name>` or
//! `<name attr='v'/>`), nested freely. The five predefined character
//! references and numeric references are decoded; nothing else of XML is
//! supported.

use crate::{ParseError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse a fragment as if wrapped in an implicit root element.
pub fn parse_fragment(text: &str) -> Result<Vec<Node>> {
    Cursor { src: text, pos: 0 }.nodes(None)
}

/// Every text run in document order.
pub fn text_runs(nodes: &[Node]) -> Vec<&str> {
    let mut runs = Vec::new();
    collect_runs(nodes, &mut runs);
    runs
}

fn collect_runs<'a>(nodes: &'a [Node], runs: &mut Vec<&'a str>) {
    for node in nodes {
        match node {
            Node::Text(t) => runs.push(t),
            Node::Element(el) => collect_runs(&el.children, runs),
        }
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
        self.pos > start
    }

    fn name(&mut self) -> Result<String> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => self.pos += c.len_utf8(),
            _ => return Err(ParseError::malformed(start, "expected a tag or attribute name")),
        }
        while let Some(c) = self.peek() {
            if !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.')) {
                break;
            }
            self.pos += c.len_utf8();
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn nodes(&mut self, open: Option<(&str, usize)>) -> Result<Vec<Node>> {
        let mut out = Vec::new();
        loop {
            if self.pos >= self.src.len() {
                return match open {
                    Some((name, at)) => Err(ParseError::malformed(at, format!("unclosed <{name}>"))),
                    None => Ok(out),
                };
            }
            if self.rest().starts_with("</") {
                let at = self.pos;
                let Some((name, _)) = open else {
                    return Err(ParseError::malformed(at, "closing tag without opening tag"));
                };
                self.pos += 2;
                let closing = self.name()?;
                self.skip_ws();
                if !self.eat(">") {
                    return Err(ParseError::malformed(self.pos, "expected `>`"));
                }
                if closing != name {
                    return Err(ParseError::malformed(
                        at,
                        format!("</{closing}> does not close <{name}>"),
                    ));
                }
                return Ok(out);
            }
            if self.peek() == Some('<') {
                out.push(Node::Element(self.element()?));
            } else {
                out.push(Node::Text(self.text()?));
            }
        }
    }

    fn element(&mut self) -> Result<Element> {
        let at = self.pos;
        self.pos += 1;
        let name = self.name()?;
        let mut attributes: Vec<(String, String)> = Vec::new();
        loop {
            let spaced = self.skip_ws();
            if self.eat("/>") {
                return Ok(Element {
                    name,
                    attributes,
                    children: Vec::new(),
                });
            }
            if self.eat(">") {
                let children = self.nodes(Some((name.as_str(), at)))?;
                return Ok(Element {
                    name,
                    attributes,
                    children,
                });
            }
            if self.pos >= self.src.len() {
                return Err(ParseError::malformed(at, format!("unterminated <{name}>")));
            }
            if !spaced {
                return Err(ParseError::malformed(self.pos, "expected whitespace before attribute"));
            }
            let key_at = self.pos;
            let (key, value) = self.attribute()?;
            if attributes.iter().any(|(k, _)| *k == key) {
                return Err(ParseError::malformed(key_at, format!("duplicate attribute `{key}`")));
            }
            attributes.push((key, value));
        }
    }

    fn attribute(&mut self) -> Result<(String, String)> {
        let key = self.name()?;
        self.skip_ws();
        if !self.eat("=") {
            return Err(ParseError::malformed(self.pos, format!("expected `=` after `{key}`")));
        }
        self.skip_ws();
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(ParseError::malformed(self.pos, "attribute value must be quoted")),
        };
        self.pos += 1;
        let start = self.pos;
        let Some(len) = self.rest().find(quote) else {
            return Err(ParseError::malformed(start, "unterminated attribute value"));
        };
        let raw = &self.rest()[..len];
        if raw.contains('<') {
            return Err(ParseError::malformed(start, "`<` inside attribute value"));
        }
        let value = decode(raw, start)?;
        self.pos += len + 1;
        Ok((key, value))
    }

    fn text(&mut self) -> Result<String> {
        let start = self.pos;
        let len = self.rest().find('<').unwrap_or(self.rest().len());
        let raw = &self.rest()[..len];
        self.pos += len;
        decode(raw, start)
    }
}

fn decode(raw: &str, offset: usize) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut at = offset;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        let tail = &rest[i..];
        let Some(end) = tail.find(';') else {
            return Err(ParseError::malformed(at + i, "unterminated character reference"));
        };
        let reference = &tail[1..end];
        let ch = match reference {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => numeric_reference(reference).ok_or_else(|| {
                ParseError::malformed(at + i, format!("unknown character reference &{reference};"))
            })?,
        };
        out.push(ch);
        let consumed = i + end + 1;
        rest = &rest[consumed..];
        at += consumed;
    }
    out.push_str(rest);
    Ok(out)
}

fn numeric_reference(reference: &str) -> Option<char> {
    let code = if let Some(hex) = reference.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        reference.strip_prefix('#')?.parse().ok()?
    };
    char::from_u32(code)
}
