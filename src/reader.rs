//! The language's token table and the bracketed-expression tree.
//!
//! [`read`] runs the shared [`Lexer`] over source text and returns the
//! top-level [`SExpr`] nodes. Brackets `()`, `[]` and `{}` are
//! interchangeable but each opening bracket must be closed by its own kind.
//!
//! Numeric literals follow the usual decimal, `0x`, `0o` and `0b` forms with
//! `_` digit separators. A literal is a real when it carries a fraction or an
//! exponent (`.`/`e` for decimal, `.`/`p` for hexadecimal), otherwise an integer.

use std::sync::LazyLock;

use crate::lexer::Lexer;
use crate::{Error, MAX_PARSE_DEPTH};

/// A node of the bracketed-expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum SExpr {
    /// A bracketed sequence, remembering which bracket opened it
    Array { open: char, items: Vec<SExpr> },
    Symbol(String),
    Integer(i64),
    Real(f64),
    String(String),
}

impl SExpr {
    /// Shorthand for a `{...}` array
    pub fn braces(items: Vec<SExpr>) -> Self {
        SExpr::Array { open: '{', items }
    }

    pub fn symbol(name: &str) -> Self {
        SExpr::Symbol(name.to_owned())
    }

    /// True for the symbol `name`
    pub fn is_symbol(&self, name: &str) -> bool {
        matches!(self, SExpr::Symbol(s) if s == name)
    }
}

fn closing(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

impl std::fmt::Display for SExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SExpr::Array { open, items } => {
                write!(f, "{open}")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "{}", closing(*open))
            }
            SExpr::Symbol(s) => write!(f, "{s}"),
            SExpr::Integer(n) => write!(f, "{n}"),
            SExpr::Real(r) => write!(f, "{r:?}"),
            SExpr::String(s) => write!(f, "{}", escape_string(s)),
        }
    }
}

/// Quote `s`, escaping exactly the characters the reader decodes.
pub(crate) fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Lexing state: the finished top-level nodes and the stack of open arrays.
#[derive(Debug, Default)]
pub struct ReadState {
    top: Vec<SExpr>,
    open: Vec<(char, Vec<SExpr>)>,
}

impl ReadState {
    fn push(&mut self, node: SExpr) {
        match self.open.last_mut() {
            Some((_, items)) => items.push(node),
            None => self.top.push(node),
        }
    }

    fn finish(self) -> Result<Vec<SExpr>, Error> {
        match self.open.len() {
            0 => Ok(self.top),
            n => Err(Error::UnmatchedParentheses(format!(
                "{n} bracket(s) left open"
            ))),
        }
    }
}

fn open_bracket(token: &str, state: &mut ReadState) -> Result<(), Error> {
    if state.open.len() >= MAX_PARSE_DEPTH {
        return Err(Error::TooDeeplyNested(MAX_PARSE_DEPTH));
    }
    let open = token.chars().next().unwrap_or('{');
    state.open.push((open, Vec::new()));
    Ok(())
}

fn close_bracket(token: &str, state: &mut ReadState) -> Result<(), Error> {
    let close = token.chars().next().unwrap_or('}');
    let Some((open, items)) = state.open.pop() else {
        return Err(Error::UnmatchedParentheses(format!("unexpected '{close}'")));
    };
    if closing(open) != close {
        return Err(Error::UnmatchedParentheses(format!(
            "'{open}' closed by '{close}'"
        )));
    }
    state.push(SExpr::Array { open, items });
    Ok(())
}

fn numeric_literal(token: &str, state: &mut ReadState) -> Result<(), Error> {
    let node = decode_number(token)?;
    state.push(node);
    Ok(())
}

fn string_literal(token: &str, state: &mut ReadState) -> Result<(), Error> {
    let inner = token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token);
    let decoded = decode_string(inner)?;
    state.push(SExpr::String(decoded));
    Ok(())
}

fn symbol(token: &str, state: &mut ReadState) -> Result<(), Error> {
    state.push(SExpr::symbol(token));
    Ok(())
}

fn out_of_range(token: &str) -> Error {
    Error::InvalidInput(format!("Numeric literal out of range: {token}"))
}

/// Decode a token matched by the `numeric-literal` pattern.
pub(crate) fn decode_number(token: &str) -> Result<SExpr, Error> {
    let (sign, body) = match token.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", token),
    };
    let digits: String = body.chars().filter(|c| *c != '_').collect();

    let radix_int = |rest: &str, radix: u32| {
        i64::from_str_radix(&format!("{sign}{rest}"), radix)
            .map(SExpr::Integer)
            .map_err(|_| out_of_range(token))
    };

    if let Some(hex) = digits.strip_prefix("0x") {
        if hex.contains(['.', 'p', 'P']) {
            let value = decode_hex_real(hex)
                .filter(|value| value.is_finite())
                .ok_or_else(|| out_of_range(token))?;
            return Ok(SExpr::Real(if sign.is_empty() { value } else { -value }));
        }
        return radix_int(hex, 16);
    }
    if let Some(octal) = digits.strip_prefix("0o") {
        return radix_int(octal, 8);
    }
    if let Some(binary) = digits.strip_prefix("0b") {
        return radix_int(binary, 2);
    }

    if digits.contains(['.', 'e', 'E']) {
        format!("{sign}{digits}")
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(SExpr::Real)
            .ok_or_else(|| out_of_range(token))
    } else {
        radix_int(&digits, 10)
    }
}

/// `mantissa[.fraction]p[+-]exponent`, all hex digits except the exponent
fn decode_hex_real(hex: &str) -> Option<f64> {
    let (mantissa, exponent) = match hex.find(['p', 'P']) {
        Some(at) => (&hex[..at], hex[at + 1..].parse::<i32>().ok()?),
        None => (hex, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    let mut value = 0.0_f64;
    for c in whole.chars().chain(fraction.chars()) {
        value = value * 16.0 + f64::from(c.to_digit(16)?);
    }
    let scale = i32::try_from(fraction.len()).ok()?.checked_mul(4)?;
    Some(value * 2.0_f64.powi(exponent.checked_sub(scale)?))
}

/// Resolve backslash escapes in the body of a string literal.
pub(crate) fn decode_string(body: &str) -> Result<String, Error> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => return Err(Error::InvalidEscape(format!("\\{other}"))),
            None => return Err(Error::InvalidEscape("\\".into())),
        }
    }
    Ok(out)
}

/// Pattern definitions of the language, in no particular order
const LANGUAGE_PATTERNS: &[(&str, &str)] = &[
    // Brackets
    ("open-bracket", r"[(\[{]"),
    ("close-bracket", r"[)\]}]"),
    // Identifiers
    (
        "id-head",
        concat!(
            r"[A-Za-z_\x{A8}\x{AA}\x{AD}\x{AF}\x{B2}-\x{B5}\x{B7}-\x{BA}",
            r"\x{BC}-\x{BE}\x{C0}-\x{D6}\x{D8}-\x{F6}\x{F8}-\x{FF}",
            r"\x{100}-\x{2FF}\x{370}-\x{167F}\x{1681}-\x{180D}\x{180F}-\x{1DBF}",
            r"\x{1E00}-\x{1FFF}\x{200B}-\x{200D}\x{202A}-\x{202E}\x{203F}-\x{2040}",
            r"\x{2054}\x{2060}-\x{206F}\x{2070}-\x{20CF}\x{2100}-\x{218F}",
            r"\x{2460}-\x{24FF}\x{2776}-\x{2793}\x{2C00}-\x{2DFF}\x{2E80}-\x{2FFF}",
            r"\x{3004}-\x{3007}\x{3021}-\x{302F}\x{3031}-\x{303F}\x{3040}-\x{D7FF}",
            r"\x{F900}-\x{FD3D}\x{FD40}-\x{FDCF}\x{FDF0}-\x{FE1F}\x{FE30}-\x{FE44}",
            r"\x{FE47}-\x{FFFD}\x{10000}-\x{EFFFD}]"
        ),
    ),
    (
        "id-character",
        r"{id-head}|[0-9\-?!\x{300}-\x{36F}\x{1DC0}-\x{1DFF}\x{20D0}-\x{20FF}\x{FE20}-\x{FE2F}]",
    ),
    ("id", "{id-head}{id-character}*"),
    // Numbers
    ("sign", "[-+]"),
    ("decimal-digit", "[0-9]"),
    ("decimal-literal", "{decimal-digit}({decimal-digit}|_)*"),
    ("hexadecimal-digit", "[0-9A-Fa-f]"),
    ("hexadecimal-digits", "{hexadecimal-digit}({hexadecimal-digit}|_)*"),
    ("hexadecimal-literal", "0x{hexadecimal-digits}"),
    ("octal-literal", "0o[0-7]([0-7]|_)*"),
    ("binary-literal", "0b[01]([01]|_)*"),
    ("decimal-fraction", r"\.{decimal-literal}"),
    ("decimal-exponent", "[eE]{sign}?{decimal-literal}"),
    ("hexadecimal-fraction", r"\.{hexadecimal-digits}"),
    ("hexadecimal-exponent", "[pP]{sign}?{decimal-literal}"),
    (
        "hexadecimal-real",
        "{hexadecimal-literal}{hexadecimal-fraction}?{hexadecimal-exponent}",
    ),
    (
        "decimal-number",
        "{decimal-literal}{decimal-fraction}?{decimal-exponent}?",
    ),
    (
        "numeric-literal",
        "-?({hexadecimal-real}|{hexadecimal-literal}|{octal-literal}|{binary-literal}|{decimal-number})",
    ),
    // Strings
    ("string-delimiter", "\""),
    ("escaped-character", r"\\."),
    ("quoted-text-item", r#"{escaped-character}|[^"\\\n\r]"#),
    ("string-literal", "{string-delimiter}{quoted-text-item}*{string-delimiter}"),
    // Operators
    (
        "operator-head",
        concat!(
            r"[:/=\-+!*%<>&|\^~?\x{A1}-\x{A7}\x{A9}-\x{AB}\x{AC}-\x{AE}",
            r"\x{B0}-\x{B1}\x{B6}\x{BB}\x{BF}\x{D7}\x{F7}\x{2016}-\x{2017}",
            r"\x{2020}-\x{2027}\x{2030}-\x{203E}\x{2041}-\x{2053}\x{2055}-\x{205E}",
            r"\x{2119}-\x{23FF}\x{2500}-\x{2775}\x{2794}-\x{2BFF}\x{2E00}-\x{2E7F}",
            r"\x{3001}-\x{3003}\x{3008}-\x{3020}\x{3030}]"
        ),
    ),
    (
        "operator-body",
        r"{operator-head}|[\x{300}-\x{36F}\x{1DC0}-\x{1DFF}\x{20D0}-\x{20FF}\x{FE00}-\x{FE0F}\x{FE20}-\x{FE2F}\x{E0100}-\x{E01EF}]",
    ),
    ("operator", "{operator-head}{operator-body}*"),
];

type Reader = Lexer<ReadState>;

fn language_reader() -> Reader {
    let mut reader = Reader::new();
    for (name, raw) in LANGUAGE_PATTERNS {
        reader.define(name, raw);
    }
    // Registration order is match priority
    reader.associate("open-bracket", open_bracket);
    reader.associate("close-bracket", close_bracket);
    reader.associate("numeric-literal", numeric_literal);
    reader.associate("string-literal", string_literal);
    reader.associate("id", symbol);
    reader.associate("operator", symbol);
    reader
}

static READER: LazyLock<Reader> = LazyLock::new(language_reader);

/// Read every top-level node of `text`.
pub fn read(text: &str) -> Result<Vec<SExpr>, Error> {
    let mut state = ReadState::default();
    READER.lex(text, &mut state)?;
    state.finish()
}

/// Read at most one top-level node; `None` for blank input.
pub fn read_one(text: &str) -> Result<Option<SExpr>, Error> {
    let mut nodes = read(text)?;
    match nodes.len() {
        0 => Ok(None),
        1 => Ok(nodes.pop()),
        _ => Err(Error::InvalidInput(
            "Expected only one top level expression.".into(),
        )),
    }
}
