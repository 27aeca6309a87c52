//! S-expression reader and writer used for KiCad symbol libraries and schematics.
//!
//! Atoms keep their exact source text: numbers are never reinterpreted on
//! parse, so a library can be read and re-emitted without drift.

use std::fmt;

/// An S-expression value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Sexpr {
    /// Unquoted atom (`pin`, `passive`, `2.54`)
    Symbol(String),
    /// Quoted atom (`"VCC"`)
    String(String),
    List(Vec<Sexpr>),
}

impl Sexpr {
    pub fn symbol(s: impl Into<String>) -> Self {
        Sexpr::Symbol(s.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Sexpr::String(s.into())
    }

    pub fn list(items: Vec<Sexpr>) -> Self {
        Sexpr::List(items)
    }

    /// Build `(tag child...)`.
    pub fn node(tag: &str, children: Vec<Sexpr>) -> Self {
        let mut items = Vec::with_capacity(children.len() + 1);
        items.push(Sexpr::symbol(tag));
        items.extend(children);
        Sexpr::List(items)
    }

    /// A numeric atom written the way KiCad writes coordinates.
    pub fn number(value: f64) -> Self {
        Sexpr::Symbol(format_number(value))
    }

    /// `yes` / `no` flag atom.
    pub fn yes_no(value: bool) -> Self {
        Sexpr::symbol(if value { "yes" } else { "no" })
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Sexpr::Symbol(s) | Sexpr::String(s) => Some(s),
            Sexpr::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sexpr]> {
        match self {
            Sexpr::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Sexpr>> {
        match self {
            Sexpr::List(items) => Some(items),
            _ => None,
        }
    }

    /// The head atom of a list, e.g. `pin` for `(pin input line ...)`.
    pub fn tag(&self) -> Option<&str> {
        self.as_list()?.first()?.as_atom()
    }

    pub fn is_tagged(&self, tag: &str) -> bool {
        self.tag() == Some(tag)
    }

    /// First direct child list whose head is `tag`.
    pub fn find(&self, tag: &str) -> Option<&Sexpr> {
        self.as_list()?.iter().skip(1).find(|item| item.is_tagged(tag))
    }

    /// All direct child lists whose head is `tag`, in document order.
    pub fn find_all<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Sexpr> + 'a {
        self.as_list()
            .unwrap_or(&[])
            .iter()
            .skip(1)
            .filter(move |item| item.is_tagged(tag))
    }

    /// Atom at position `index` of a list (0 is the tag).
    pub fn atom_at(&self, index: usize) -> Option<&str> {
        self.as_list()?.get(index)?.as_atom()
    }

    /// Atom at position `index` parsed as a float.
    pub fn f64_at(&self, index: usize) -> Option<f64> {
        self.atom_at(index)?.parse::<f64>().ok()
    }

    /// True when a bare flag atom such as `hide` appears among the children.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.as_list()
            .unwrap_or(&[])
            .iter()
            .skip(1)
            .any(|item| matches!(item, Sexpr::Symbol(s) if s == flag))
    }
}

/// Render a coordinate with at most four decimals, no trailing zeros and no
/// negative zero.
pub fn format_number(value: f64) -> String {
    let mut text = format!("{value:.4}");
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

/// Errors produced while reading S-expression text. Offsets are byte offsets
/// into the input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected end of input at byte {offset}")]
    UnexpectedEof { offset: usize },
    #[error("expected '{expected}' but found '{found}' at byte {offset}")]
    UnexpectedChar {
        found: char,
        expected: char,
        offset: usize,
    },
    #[error("list opened at byte {offset} is never closed")]
    UnclosedList { offset: usize },
    #[error("string starting at byte {offset} is not terminated")]
    UnterminatedString { offset: usize },
    #[error("unbalanced ')' at byte {offset}")]
    UnbalancedClose { offset: usize },
    #[error("unexpected trailing input at byte {offset}")]
    TrailingInput { offset: usize },
}

/// Streaming parser over the characters of one input string.
pub struct Parser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Parser {
            input,
            chars: input.char_indices().peekable(),
            pos: 0,
        }
    }

    /// Parse the next expression.
    pub fn parse(&mut self) -> Result<Sexpr, ParseError> {
        self.skip_trivia();
        match self.peek() {
            None => Err(ParseError::UnexpectedEof { offset: self.pos }),
            Some('(') => self.parse_list(),
            Some(')') => Err(ParseError::UnbalancedClose { offset: self.pos }),
            Some('"') => self.parse_string(),
            Some(_) => Ok(self.parse_symbol()),
        }
    }

    /// Parse every expression until the end of input.
    pub fn parse_all(&mut self) -> Result<Vec<Sexpr>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek().is_none() {
                return Ok(out);
            }
            out.push(self.parse()?);
        }
    }

    fn parse_list(&mut self) -> Result<Sexpr, ParseError> {
        let open = self.pos;
        self.expect('(')?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return Err(ParseError::UnclosedList { offset: open }),
                Some(')') => {
                    self.bump();
                    break;
                }
                Some(_) => items.push(self.parse()?),
            }
            if items.len() % 5000 == 0 {
                log::trace!("{} items read in list opened at byte {open}", items.len());
            }
        }
        Ok(Sexpr::List(items))
    }

    fn parse_symbol(&mut self) -> Sexpr {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || matches!(ch, '(' | ')' | '"') {
                break;
            }
            self.bump();
        }
        Sexpr::Symbol(self.input[start..self.pos].to_string())
    }

    fn parse_string(&mut self) -> Result<Sexpr, ParseError> {
        let start = self.pos;
        self.expect('"')?;
        let mut text = String::new();
        loop {
            let Some(ch) = self.peek() else {
                return Err(ParseError::UnterminatedString { offset: start });
            };
            self.bump();
            match ch {
                '"' => return Ok(Sexpr::String(text)),
                '\\' => {
                    let Some(escaped) = self.peek() else {
                        return Err(ParseError::UnterminatedString { offset: start });
                    };
                    self.bump();
                    text.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    });
                }
                other => text.push(other),
            }
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
            } else if ch == ';' {
                while let Some(c) = self.peek() {
                    self.bump();
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn bump(&mut self) {
        if let Some((pos, ch)) = self.chars.next() {
            self.pos = pos + ch.len_utf8();
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        match self.peek() {
            Some(ch) if ch == expected => {
                self.bump();
                Ok(())
            }
            Some(found) => Err(ParseError::UnexpectedChar {
                found,
                expected,
                offset: self.pos,
            }),
            None => Err(ParseError::UnexpectedEof { offset: self.pos }),
        }
    }
}

/// Parse exactly one expression; anything but whitespace or comments after it
/// is an error.
pub fn parse(input: &str) -> Result<Sexpr, ParseError> {
    log::trace!("parsing {} bytes of s-expression text", input.len());
    let mut parser = Parser::new(input);
    let expr = parser.parse()?;
    parser.skip_trivia();
    if parser.peek().is_some() {
        return Err(ParseError::TrailingInput { offset: parser.pos });
    }
    Ok(expr)
}

/// Parse a sequence of top-level expressions.
pub fn parse_all(input: &str) -> Result<Vec<Sexpr>, ParseError> {
    Parser::new(input).parse_all()
}

/// Pretty-print with two-space indentation. Short forms such as `(at 1 2 0)`
/// stay on one line.
pub fn format_sexpr(sexpr: &Sexpr, indent_level: usize) -> String {
    let mut out = String::new();
    write_sexpr(&mut out, sexpr, indent_level);
    out
}

fn write_sexpr(out: &mut String, sexpr: &Sexpr, level: usize) {
    match sexpr {
        Sexpr::Symbol(s) => out.push_str(s),
        Sexpr::String(s) => {
            out.push('"');
            out.push_str(&escape_string(s));
            out.push('"');
        }
        Sexpr::List(items) if is_inline(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_sexpr(out, item, level);
            }
            out.push(')');
        }
        Sexpr::List(items) => {
            out.push('(');
            // Leading atoms share the opening line: (symbol "R" ...
            let head = items.iter().take_while(|item| item.as_atom().is_some()).count();
            for (i, item) in items[..head].iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_sexpr(out, item, level);
            }
            for item in &items[head..] {
                out.push('\n');
                out.push_str(&"  ".repeat(level + 1));
                write_sexpr(out, item, level + 1);
            }
            out.push('\n');
            out.push_str(&"  ".repeat(level));
            out.push(')');
        }
    }
}

fn escape_string(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn is_inline(items: &[Sexpr]) -> bool {
    let Some(Sexpr::Symbol(head)) = items.first() else {
        return items.iter().all(|item| item.as_atom().is_some());
    };
    match head.as_str() {
        "at" | "xy" | "size" | "length" | "width" | "type" | "shape" | "diameter" | "color"
        | "justify" | "uuid" | "lib_id" | "unit" | "reference" | "page" | "path" | "paper"
        | "title" | "date" | "rev" | "company" | "comment" | "in_bom" | "on_board" | "dnp"
        | "exclude_from_sim" | "fields_autoplaced" | "version" | "generator" | "offset"
        | "pin_numbers" | "thickness" | "mirror" | "hide" | "number" | "name" => {
            items.iter().skip(1).all(|item| item.as_atom().is_some())
        }
        "font" => items.len() <= 3,
        "pts" => items.len() <= 3,
        _ => items.len() <= 3 && items.iter().all(|item| item.as_atom().is_some()),
    }
}

impl fmt::Display for Sexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_sexpr(self, 0))
    }
}
