//! Named sub-pattern composition.
//!
//! A [`PatternSet`] holds raw regular-expression text under unique names. Raw
//! patterns may refer to other patterns with a `{name}` placeholder; expansion
//! substitutes each placeholder with the referenced pattern's own expansion,
//! wrapped in a non-capturing group, so that a lexical grammar can be written
//! as a family of small readable definitions:
//!
//! ```
//! use dxuq::pattern::PatternSet;
//!
//! let mut patterns = PatternSet::new();
//! patterns.define("digit", "[0-9]");
//! patterns.define("hex-alpha", "[a-fA-F]");
//! patterns.define("hex", "0[xX]({digit}|{hex-alpha})+");
//!
//! assert_eq!(patterns.expand("hex").unwrap(), "0[xX]((?:[0-9])|(?:[a-fA-F]))+");
//! assert!(patterns.matches("hex", "0xBEEF").unwrap());
//! ```
//!
//! Placeholder names follow `[A-Za-z_-][A-Za-z0-9_-]*`, so regex repetition
//! counts such as `{2,4}` are never mistaken for references. A backslash
//! escapes the following character, which keeps `\{name}` literal, and the
//! braces of `\x{..}`, `\u{..}` and `\p{..}` escapes are left to the regex engine.
//!
//! Definitions may appear in any order; references are resolved at expansion
//! time. Expansion fails on undefined or self-referencing names.

use std::collections::HashMap;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take, take_till1, take_while, take_while_m_n},
    character::complete::{char, one_of},
    combinator::{map, recognize},
    multi::many0,
    sequence::{delimited, pair},
};
use regex::Regex;

/// Errors raised while expanding or compiling patterns.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("Unknown subpattern: {0}")]
    UndefinedSubpattern(String),
    #[error("Subpattern refers to itself: {0}")]
    RecursiveSubpattern(String),
    #[error("Invalid regular expression for {name}: {message}")]
    InvalidPattern { name: String, message: String },
    #[error("Pattern {0} matches the empty string and cannot produce tokens")]
    MatchesEmpty(String),
    #[error("No patterns are associated with actions")]
    NoRegisteredActions,
}

/// One piece of a raw pattern: literal regex text or a reference by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A named raw pattern, pre-split into literal text and placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    name: String,
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn new(name: &str, raw: &str) -> Self {
        Pattern {
            name: name.to_owned(),
            raw: raw.to_owned(),
            segments: split_segments(raw),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pattern text before placeholder expansion
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names referenced by this pattern, in order of appearance
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Pattern: {}: \"{}\">", self.name, self.raw)
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// `{name}`
fn placeholder(input: &str) -> IResult<&str, &str> {
    delimited(
        char('{'),
        recognize(pair(
            take_while_m_n(1, 1, is_name_start),
            take_while(is_name_char),
        )),
        char('}'),
    )
    .parse(input)
}

/// A backslash and what it escapes, including braced forms such as `\x{FF}`
/// or `\p{Greek}`
fn escaped(input: &str) -> IResult<&str, &str> {
    let braced = recognize(pair(
        one_of("xuUpP"),
        delimited(char('{'), take_till1(|c: char| c == '}'), char('}')),
    ));
    recognize(pair(char('\\'), alt((braced, take(1usize))))).parse(input)
}

fn segment(input: &str) -> IResult<&str, Segment> {
    alt((
        map(placeholder, |name: &str| Segment::Placeholder(name.to_owned())),
        map(escaped, |text: &str| Segment::Literal(text.to_owned())),
        map(take_till1(|c: char| c == '{' || c == '\\'), |text: &str| {
            Segment::Literal(text.to_owned())
        }),
        // A brace that does not open a placeholder, or a trailing backslash
        map(take(1usize), |text: &str| Segment::Literal(text.to_owned())),
    ))
    .parse(input)
}

/// Split raw pattern text into literal runs and placeholders.
///
/// Every character is accepted by one of the segment parsers, so this never
/// fails; adjacent literal runs are merged.
fn split_segments(raw: &str) -> Vec<Segment> {
    let parsed = match many0(segment).parse(raw) {
        Ok((_, segments)) => segments,
        Err(_) => vec![Segment::Literal(raw.to_owned())],
    };

    let mut merged: Vec<Segment> = Vec::with_capacity(parsed.len());
    for segment in parsed {
        match (merged.last_mut(), segment) {
            (Some(Segment::Literal(previous)), Segment::Literal(text)) => previous.push_str(&text),
            (_, segment) => merged.push(segment),
        }
    }
    merged
}

/// A collection of named, mutually-referencing patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: HashMap<String, Pattern>,
}

impl PatternSet {
    pub fn new() -> Self {
        PatternSet::default()
    }

    /// Register (or replace) the pattern `name`.
    pub fn define(&mut self, name: &str, raw: &str) -> &Pattern {
        let pattern = Pattern::new(name, raw);
        self.patterns.insert(name.to_owned(), pattern);
        &self.patterns[name]
    }

    pub fn get(&self, name: &str) -> Option<&Pattern> {
        self.patterns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.patterns.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Fully expand `name`, replacing every placeholder recursively.
    pub fn expand(&self, name: &str) -> Result<String, PatternError> {
        let mut memo = HashMap::new();
        let mut in_progress = Vec::new();
        self.expand_memoized(name, &mut memo, &mut in_progress)
    }

    fn expand_memoized<'a>(
        &'a self,
        name: &'a str,
        memo: &mut HashMap<&'a str, String>,
        in_progress: &mut Vec<&'a str>,
    ) -> Result<String, PatternError> {
        if let Some(done) = memo.get(name) {
            return Ok(done.clone());
        }
        if in_progress.contains(&name) {
            return Err(PatternError::RecursiveSubpattern(name.to_owned()));
        }
        let pattern = self
            .patterns
            .get(name)
            .ok_or_else(|| PatternError::UndefinedSubpattern(name.to_owned()))?;

        in_progress.push(name);
        let mut expanded = String::with_capacity(pattern.raw.len());
        for segment in &pattern.segments {
            match segment {
                Segment::Literal(text) => expanded.push_str(text),
                Segment::Placeholder(reference) => {
                    let sub = self.expand_memoized(reference, memo, in_progress)?;
                    expanded.push_str("(?:");
                    expanded.push_str(&sub);
                    expanded.push(')');
                }
            }
        }
        in_progress.pop();

        memo.insert(name, expanded.clone());
        Ok(expanded)
    }

    /// Expand and compile `name` into a matcher that searches anywhere in the input.
    pub fn compile(&self, name: &str) -> Result<Regex, PatternError> {
        let expanded = self.expand(name)?;
        compile_regex(name, &expanded)
    }

    /// True when the whole of `text` matches the pattern `name`.
    pub fn matches(&self, name: &str, text: &str) -> Result<bool, PatternError> {
        let expanded = self.expand(name)?;
        let anchored = compile_regex(name, &format!("^(?:{expanded})$"))?;
        Ok(anchored.is_match(text))
    }
}

pub(crate) fn compile_regex(name: &str, expression: &str) -> Result<Regex, PatternError> {
    Regex::new(expression).map_err(|e| PatternError::InvalidPattern {
        name: name.to_owned(),
        message: e.to_string(),
    })
}
