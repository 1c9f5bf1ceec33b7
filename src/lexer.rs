//! Action-driven tokenizer.
//!
//! A [`Lexer`] owns a [`PatternSet`] and an ordered table of actions keyed by
//! pattern name. Lexing alternates every action-bearing pattern, in
//! registration order, into one combined regular expression and scans the
//! input left to right. Each match is dispatched to the action of the pattern
//! that produced it, together with a caller-supplied state value that the
//! actions build their output in.
//!
//! Ordering is priority: when two patterns could match at the same position,
//! the one associated first wins. Text between matches must be whitespace;
//! anything else is reported as [`Error::UnknownText`].

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace};

use crate::Error;
use crate::pattern::{PatternError, PatternSet, compile_regex};

/// Callback invoked with the matched text and the lexing state.
pub type Action<S> = Box<dyn Fn(&str, &mut S) -> Result<(), Error> + Send + Sync>;

pub struct Lexer<S> {
    patterns: PatternSet,
    actions: Vec<(String, Action<S>)>,
    combined: OnceLock<Combined>,
}

/// The combined automaton and, per action, the index of its capture group
#[derive(Debug)]
struct Combined {
    regex: Regex,
    groups: Vec<usize>,
}

impl<S> Default for Lexer<S> {
    fn default() -> Self {
        Lexer {
            patterns: PatternSet::new(),
            actions: Vec::new(),
            combined: OnceLock::new(),
        }
    }
}

impl<S> std::fmt::Debug for Lexer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.actions.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("Lexer")
            .field("patterns", &self.patterns.len())
            .field("actions", &names)
            .finish()
    }
}

/// Capture group name of the `index`th action pattern in the combined expression
fn group_name(index: usize) -> String {
    format!("tok{index}")
}

impl<S> Lexer<S> {
    pub fn new() -> Self {
        Lexer::default()
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Define a named pattern (see [`PatternSet::define`]).
    pub fn define(&mut self, name: &str, raw: &str) {
        self.patterns.define(name, raw);
        self.combined = OnceLock::new();
    }

    /// Attach `action` to the pattern `name`.
    ///
    /// Re-associating a name replaces its action but keeps its first priority.
    pub fn associate<F>(&mut self, name: &str, action: F)
    where
        F: Fn(&str, &mut S) -> Result<(), Error> + Send + Sync + 'static,
    {
        let action: Action<S> = Box::new(action);
        match self.actions.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => entry.1 = action,
            None => self.actions.push((name.to_owned(), action)),
        }
        self.combined = OnceLock::new();
    }

    /// Names with actions, in priority order
    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|(name, _)| name.as_str())
    }

    fn build_combined(&self) -> Result<Combined, PatternError> {
        if self.actions.is_empty() {
            return Err(PatternError::NoRegisteredActions);
        }

        let mut alternatives = Vec::with_capacity(self.actions.len());
        for (index, (name, _)) in self.actions.iter().enumerate() {
            let expanded = self.patterns.expand(name)?;
            // A token pattern that can match nothing would stall the scan
            if compile_regex(name, &expanded)?.is_match("") {
                return Err(PatternError::MatchesEmpty(name.clone()));
            }
            alternatives.push(format!("(?P<{}>{expanded})", group_name(index)));
        }

        let regex = compile_regex("<combined>", &alternatives.join("|"))?;
        // Inner groups of the expansions shift the outer group indices
        let groups = (0..self.actions.len())
            .map(|index| {
                let name = group_name(index);
                regex
                    .capture_names()
                    .position(|group| group == Some(name.as_str()))
                    .ok_or_else(|| PatternError::InvalidPattern {
                        name: "<combined>".to_owned(),
                        message: format!("missing capture group {name}"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(actions = self.actions.len(), "compiled combined lexer expression");
        Ok(Combined { regex, groups })
    }

    fn compiled(&self) -> Result<&Combined, Error> {
        if let Some(combined) = self.combined.get() {
            return Ok(combined);
        }
        let combined = self.build_combined()?;
        Ok(self.combined.get_or_init(|| combined))
    }

    /// The combined automaton, built on first use.
    pub fn combined(&self) -> Result<&Regex, Error> {
        Ok(&self.compiled()?.regex)
    }

    /// Scan `text`, invoking the matching action for every token in order.
    pub fn lex(&self, text: &str, state: &mut S) -> Result<(), Error> {
        let Combined { regex, groups } = self.compiled()?;
        let mut last_end = 0;

        for captures in regex.captures_iter(text) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            check_gap(&text[last_end..whole.start()])?;

            let fired = self
                .actions
                .iter()
                .zip(groups)
                .find(|(_, group)| captures.get(**group).is_some_and(|m| !m.is_empty()))
                .map(|((name, action), _)| (name, action));

            if let Some((name, action)) = fired {
                trace!(pattern = %name, token = whole.as_str(), "lexed token");
                action(whole.as_str(), state)?;
            }
            last_end = whole.end();
        }

        check_gap(&text[last_end..])
    }
}

/// Text the automaton skipped over must be whitespace.
fn check_gap(gap: &str) -> Result<(), Error> {
    let leftover = gap.trim();
    if leftover.is_empty() {
        Ok(())
    } else {
        Err(Error::UnknownText(leftover.to_owned()))
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    /// Records (pattern, token) pairs in order.
    type Seen = Vec<(&'static str, String)>;

    fn hex_keyword_lexer() -> Lexer<Seen> {
        let mut lexer = Lexer::new();
        lexer.define("hexdigit", "[0-9]");
        lexer.define("hexalpha", "[a-fA-F]");
        lexer.define("hextail", "({hexdigit}|{hexalpha})+");
        lexer.define("hex", "0[xX]{hextail}");
        lexer.define("alpha", "[a-zA-Z]");
        lexer.define("keyword", "{alpha}+");
        lexer.associate("hex", |token, seen: &mut Seen| {
            seen.push(("hex", token.to_owned()));
            Ok(())
        });
        lexer.associate("keyword", |token, seen: &mut Seen| {
            seen.push(("keyword", token.to_owned()));
            Ok(())
        });
        lexer
    }

    #[test]
    fn test_dispatches_in_order() {
        let lexer = hex_keyword_lexer();
        let mut seen = Seen::new();
        lexer.lex("value 0xDEADBEEF other", &mut seen).unwrap();
        assert_eq!(
            seen,
            vec![
                ("keyword", "value".to_owned()),
                ("hex", "0xDEADBEEF".to_owned()),
                ("keyword", "other".to_owned()),
            ]
        );
    }

    #[test]
    fn test_unknown_text() {
        let lexer = hex_keyword_lexer();
        let cases = vec![
            ("value _ 0xDEADBEEF", "_"),
            ("% value", "%"),
            ("value 0xBEEF  ##  ", "##"),
            ("42", "42"),
        ];
        for (i, (input, leftover)) in cases.into_iter().enumerate() {
            let mut seen = Seen::new();
            assert_eq!(
                lexer.lex(input, &mut seen),
                Err(Error::UnknownText(leftover.to_owned())),
                "Unknown text test #{}",
                i + 1
            );
        }
    }

    #[test]
    fn test_whitespace_only_input() {
        let lexer = hex_keyword_lexer();
        let mut seen = Seen::new();
        lexer.lex("", &mut seen).unwrap();
        lexer.lex(" \n\t ", &mut seen).unwrap();
        assert!(seen.is_empty());
    }

    #[test]
    fn test_registration_order_is_priority() {
        let mut lexer: Lexer<Seen> = Lexer::new();
        lexer.define("word", "[a-z]+");
        lexer.define("keyword", "let|in");
        lexer.associate("keyword", |token, seen: &mut Seen| {
            seen.push(("keyword", token.to_owned()));
            Ok(())
        });
        lexer.associate("word", |token, seen: &mut Seen| {
            seen.push(("word", token.to_owned()));
            Ok(())
        });

        let mut seen = Seen::new();
        lexer.lex("let x", &mut seen).unwrap();
        assert_eq!(
            seen,
            vec![("keyword", "let".to_owned()), ("word", "x".to_owned())]
        );
        assert_eq!(lexer.action_names().collect::<Vec<_>>(), vec!["keyword", "word"]);
    }

    #[test]
    fn test_action_errors_abort() {
        let mut lexer: Lexer<Seen> = Lexer::new();
        lexer.define("word", "[a-z]+");
        lexer.associate("word", |token, seen: &mut Seen| {
            if token == "stop" {
                return Err(Error::InvalidInput("stopped".into()));
            }
            seen.push(("word", token.to_owned()));
            Ok(())
        });

        let mut seen = Seen::new();
        assert_eq!(
            lexer.lex("go stop never", &mut seen),
            Err(Error::InvalidInput("stopped".into()))
        );
        assert_eq!(seen, vec![("word", "go".to_owned())]);
    }

    #[test]
    fn test_combined_build_errors() {
        let lexer: Lexer<Seen> = Lexer::new();
        assert_eq!(
            lexer.lex("x", &mut Seen::new()),
            Err(Error::PatternCompilation(PatternError::NoRegisteredActions))
        );

        let mut lexer: Lexer<Seen> = Lexer::new();
        lexer.define("maybe", "[-]?");
        lexer.associate("maybe", |_, _: &mut Seen| Ok(()));
        assert_eq!(
            lexer.lex("x", &mut Seen::new()),
            Err(Error::PatternCompilation(PatternError::MatchesEmpty(
                "maybe".into()
            )))
        );

        let mut lexer: Lexer<Seen> = Lexer::new();
        lexer.define("word", "{letters}");
        lexer.associate("word", |_, _: &mut Seen| Ok(()));
        assert_eq!(
            lexer.lex("x", &mut Seen::new()),
            Err(Error::PatternCompilation(PatternError::UndefinedSubpattern(
                "letters".into()
            )))
        );
    }

    #[test]
    fn test_inner_capture_groups_do_not_confuse_dispatch() {
        let mut lexer: Lexer<Seen> = Lexer::new();
        lexer.define("num", "([0-9])+");
        lexer.define("word", "(([a-z]))+");
        lexer.associate("num", |token, seen: &mut Seen| {
            seen.push(("num", token.to_owned()));
            Ok(())
        });
        lexer.associate("word", |token, seen: &mut Seen| {
            seen.push(("word", token.to_owned()));
            Ok(())
        });

        // Outer groups are located once, past each expansion's inner groups
        assert_eq!(lexer.compiled().unwrap().groups, vec![1, 3]);

        let mut seen = Seen::new();
        lexer.lex("ab 12 c", &mut seen).unwrap();
        assert_eq!(
            seen,
            vec![
                ("word", "ab".to_owned()),
                ("num", "12".to_owned()),
                ("word", "c".to_owned()),
            ]
        );
    }
}
