use thiserror::Error;
use tracing::debug;

use crate::lexer::{canonicalize, hex_escape_width, is_ignorable, named_escape};
use crate::node::{NodeId, SourcePosition, Tree};
use crate::value::Value;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    #[error("unexpected character `{ch}`")]
    UnexpectedCharacter { ch: char },
    #[error("quote `{quote}` must start a token")]
    UnexpectedQuote { quote: char },
    #[error("`,` outside of a list")]
    StrayComma,
    #[error("unmatched `)`")]
    UnmatchedClose,
    #[error("missing `)`")]
    MissingClose,
    #[error("missing closing `{quote}`")]
    UnterminatedString { quote: char },
    #[error("escape does not resolve")]
    DanglingEscape,
    #[error("escape names invalid code point {value:#x}")]
    InvalidCodePoint { value: u32 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind} at {position}")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub offset: usize,
    pub position: SourcePosition,
}

/// Parses one S-expression. Blank input yields a single `nil` leaf.
pub fn parse(source: &str) -> Result<Tree, SyntaxError> {
    let tree = Parser::new(source).run()?;
    debug!(nodes = tree.len(), "parsed source");
    Ok(tree)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Expression,
    AfterList,
    AfterString,
    Escape,
    InString,
    StringEscape,
    StringOctal { value: u32, digits: u32 },
    StringHex { letter: char, width: usize },
}

enum Flow {
    Next,
    Again,
}

/// Character-level state machine building a [`Tree`] directly, without a token stream.
pub struct Parser<'a> {
    source: &'a str,
    tree: Option<Tree>,
    stack: Vec<NodeId>,
    buffer: String,
    hex_digits: String,
    token_start: Option<usize>,
    quote: Option<char>,
    added_child: bool,
    in_comment: bool,
    mode: Mode,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tree: None,
            stack: Vec::new(),
            buffer: String::new(),
            hex_digits: String::new(),
            token_start: None,
            quote: None,
            added_child: false,
            in_comment: false,
            mode: Mode::Expression,
        }
    }

    pub fn run(mut self) -> Result<Tree, SyntaxError> {
        let chars: Vec<(usize, char)> = self.source.char_indices().collect();
        let mut index = 0;
        while let Some(&(offset, ch)) = chars.get(index) {
            match self.step(offset, ch)? {
                Flow::Next => index += 1,
                Flow::Again => {}
            }
        }
        self.finish()
    }

    fn step(&mut self, offset: usize, ch: char) -> Result<Flow, SyntaxError> {
        if self.in_comment {
            if ch == '\n' {
                self.in_comment = false;
            }
            return Ok(Flow::Next);
        }
        match self.mode {
            Mode::Expression => self.expression(offset, ch),
            Mode::AfterList => match ch {
                ';' => {
                    self.in_comment = true;
                    Ok(Flow::Next)
                }
                ',' => {
                    if self.stack.is_empty() {
                        return Err(self.error(SyntaxErrorKind::StrayComma, offset));
                    }
                    self.mode = Mode::Expression;
                    self.added_child = true;
                    Ok(Flow::Next)
                }
                ')' => {
                    self.mode = Mode::Expression;
                    self.added_child = false;
                    Ok(Flow::Again)
                }
                _ if is_ignorable(ch) => Ok(Flow::Next),
                _ => Err(self.error(SyntaxErrorKind::UnexpectedCharacter { ch }, offset)),
            },
            Mode::AfterString => match ch {
                '(' | ',' | ')' => {
                    self.mode = Mode::Expression;
                    Ok(Flow::Again)
                }
                ';' => {
                    self.in_comment = true;
                    Ok(Flow::Next)
                }
                _ if is_ignorable(ch) => Ok(Flow::Next),
                _ => Err(self.error(SyntaxErrorKind::UnexpectedCharacter { ch }, offset)),
            },
            Mode::Escape => {
                self.push_token_char(offset, ch);
                self.mode = Mode::Expression;
                Ok(Flow::Next)
            }
            Mode::InString => {
                if ch == '\\' {
                    self.mode = Mode::StringEscape;
                } else if Some(ch) == self.quote {
                    self.mode = Mode::AfterString;
                } else {
                    self.buffer.push(ch);
                }
                Ok(Flow::Next)
            }
            Mode::StringEscape => {
                self.mode = Mode::InString;
                if let Some(control) = named_escape(ch) {
                    self.buffer.push(control);
                } else if let Some(value) = ch.to_digit(8) {
                    self.mode = Mode::StringOctal { value, digits: 1 };
                } else if let Some(width) = hex_escape_width(ch) {
                    self.hex_digits.clear();
                    self.mode = Mode::StringHex { letter: ch, width };
                } else {
                    self.buffer.push(ch);
                }
                Ok(Flow::Next)
            }
            Mode::StringOctal { value, digits } => match ch.to_digit(8) {
                Some(digit) if digits < 3 => {
                    let value = value * 8 + digit;
                    if digits + 1 == 3 {
                        self.push_code_point(value, offset)?;
                        self.mode = Mode::InString;
                    } else {
                        self.mode = Mode::StringOctal { value, digits: digits + 1 };
                    }
                    Ok(Flow::Next)
                }
                _ => {
                    self.push_code_point(value, offset)?;
                    self.mode = Mode::InString;
                    Ok(Flow::Again)
                }
            },
            Mode::StringHex { letter, width } => {
                if ch.is_ascii_hexdigit() {
                    self.hex_digits.push(ch);
                    if self.hex_digits.len() == width {
                        let value = u32::from_str_radix(&self.hex_digits, 16)
                            .map_err(|_| self.error(SyntaxErrorKind::DanglingEscape, offset))?;
                        self.push_code_point(value, offset)?;
                        self.mode = Mode::InString;
                    }
                    Ok(Flow::Next)
                } else {
                    // Incomplete escape: keep the letter and digits as written.
                    self.buffer.push(letter);
                    let digits = std::mem::take(&mut self.hex_digits);
                    self.buffer.push_str(&digits);
                    self.mode = Mode::InString;
                    Ok(Flow::Again)
                }
            }
        }
    }

    fn expression(&mut self, offset: usize, ch: char) -> Result<Flow, SyntaxError> {
        match ch {
            ';' => self.in_comment = true,
            '\\' => self.mode = Mode::Escape,
            '"' | '\'' => {
                if self.token_start.is_some() || self.quote.is_some() {
                    return Err(self.error(SyntaxErrorKind::UnexpectedQuote { quote: ch }, offset));
                }
                self.buffer.clear();
                self.token_start = Some(offset);
                self.quote = Some(ch);
                self.mode = Mode::InString;
            }
            '(' => {
                if self.stack.is_empty() && self.tree.is_some() {
                    return Err(self.error(SyntaxErrorKind::UnexpectedCharacter { ch }, offset));
                }
                let node = self.make_node(offset, false);
                if let Some(node) = node {
                    self.attach(node);
                    self.stack.push(node);
                }
                self.added_child = false;
            }
            ',' => {
                if self.stack.is_empty() {
                    return Err(self.error(SyntaxErrorKind::StrayComma, offset));
                }
                if let Some(node) = self.make_node(offset, false) {
                    self.attach(node);
                }
                self.added_child = true;
            }
            ')' => {
                if self.stack.is_empty() {
                    return Err(self.error(SyntaxErrorKind::UnmatchedClose, offset));
                }
                if let Some(node) = self.make_node(offset, !self.added_child) {
                    self.attach(node);
                }
                self.stack.pop();
                self.mode = Mode::AfterList;
            }
            _ => self.push_token_char(offset, ch),
        }
        Ok(Flow::Next)
    }

    fn push_token_char(&mut self, offset: usize, ch: char) {
        if self.token_start.is_none() && !is_ignorable(ch) {
            self.token_start = Some(offset);
        }
        self.buffer.push(ch);
    }

    fn push_code_point(&mut self, value: u32, offset: usize) -> Result<(), SyntaxError> {
        let ch = char::from_u32(value)
            .ok_or_else(|| self.error(SyntaxErrorKind::InvalidCodePoint { value }, offset))?;
        self.buffer.push(ch);
        Ok(())
    }

    /// Turns the buffered token into a node. Returns `None` for an empty bare
    /// token when `skip_empty` is set.
    fn make_node(&mut self, offset: usize, skip_empty: bool) -> Option<NodeId> {
        let text = std::mem::take(&mut self.buffer);
        let start = self.token_start.take().unwrap_or(offset);
        let tag = if self.quote.take().is_some() {
            Value::String(text)
        } else {
            let trimmed = text.trim_matches(is_ignorable);
            if trimmed.is_empty() {
                if skip_empty {
                    return None;
                }
                Value::Null
            } else {
                canonicalize(trimmed)
            }
        };
        Some(match self.tree.as_mut() {
            Some(tree) => tree.create_at(tag, Some(start)),
            None => {
                let tree = Tree::with_root_at(tag, Some(start));
                let root = tree.root();
                self.tree = Some(tree);
                root
            }
        })
    }

    fn attach(&mut self, node: NodeId) {
        if let (Some(tree), Some(&parent)) = (self.tree.as_mut(), self.stack.last()) {
            tree.attach_fresh(parent, node);
        }
    }

    fn finish(mut self) -> Result<Tree, SyntaxError> {
        let end = self.source.len();
        match self.mode {
            Mode::Escape => return Err(self.error(SyntaxErrorKind::DanglingEscape, end)),
            Mode::InString
            | Mode::StringEscape
            | Mode::StringOctal { .. }
            | Mode::StringHex { .. } => {
                let quote = self.quote.unwrap_or('"');
                let start = self.token_start.unwrap_or(end);
                return Err(self.error(SyntaxErrorKind::UnterminatedString { quote }, start));
            }
            Mode::Expression | Mode::AfterList | Mode::AfterString => {}
        }
        if !self.stack.is_empty() {
            return Err(self.error(SyntaxErrorKind::MissingClose, end));
        }
        if self.tree.is_none() {
            self.make_node(end, true);
        } else if self.token_start.is_some() || self.quote.is_some() {
            let start = self.token_start.unwrap_or(end);
            let ch = self.source[start..].chars().next().unwrap_or(' ');
            return Err(self.error(SyntaxErrorKind::UnexpectedCharacter { ch }, start));
        }
        Ok(self.tree.unwrap_or_else(|| Tree::new(Value::Null)))
    }

    fn error(&self, kind: SyntaxErrorKind, offset: usize) -> SyntaxError {
        SyntaxError {
            kind,
            offset,
            position: SourcePosition::locate(self.source, offset),
        }
    }
}
