//! This module defines the typed expression tree produced by the parser, the
//! reserved-symbol rules that govern which names may be bound, and the
//! canonical unparser. [`Expr`]'s `Display` is the unparsed source form, so
//! `parse(s)?.to_string() == s` for any canonical program text `s`.

use std::collections::HashSet;
use std::rc::Rc;

use crate::Error;
use crate::builtinops::find_op;
use crate::value::{INTEGER_BOUND, Value};

/// Syntax keywords that can never name a variable
pub const PROTECTED_SYMBOLS: &[&str] = &["fn", "let", "in", "var", ":="];

pub fn is_protected(name: &str) -> bool {
    PROTECTED_SYMBOLS.contains(&name)
}

/// A name that is neither reserved syntax nor a primitive operator
pub fn is_valid_name(name: &str) -> bool {
    !is_protected(name) && find_op(name).is_none()
}

/// Parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Identifier(String),
    Application {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },
    /// `{fn {params...} body}`; the body is shared with every closure built from it
    Lambda {
        params: Vec<String>,
        body: Rc<Expr>,
    },
    /// `{let {name = expr}... in body}`
    Let {
        bindings: Vec<(String, Expr)>,
        body: Box<Expr>,
    },
    /// `{name := expr}`
    Assignment {
        name: String,
        value: Box<Expr>,
    },
}

/// Reject reserved names used where a binding name is expected
pub(crate) fn check_name(name: &str) -> Result<(), Error> {
    if is_protected(name) {
        Err(Error::InvalidInput(format!("Symbol {name} is protected.")))
    } else {
        Ok(())
    }
}

/// Fail with DuplicateParameter unless every name is distinct
pub(crate) fn check_distinct(names: &[&str]) -> Result<(), Error> {
    let mut seen = HashSet::new();
    if names.iter().all(|name| seen.insert(name)) {
        Ok(())
    } else {
        Err(Error::DuplicateParameter(names.join(" ")))
    }
}

impl Expr {
    /// An identifier reference; reserved names are rejected
    pub fn identifier(name: &str) -> Result<Self, Error> {
        check_name(name)?;
        Ok(Expr::Identifier(name.to_owned()))
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn application(function: Expr, arguments: Vec<Expr>) -> Self {
        Expr::Application {
            function: Box::new(function),
            arguments,
        }
    }

    pub fn lambda(params: Vec<String>, body: Expr) -> Result<Self, Error> {
        for param in &params {
            check_name(param)?;
        }
        check_distinct(&params.iter().map(String::as_str).collect::<Vec<_>>())?;
        Ok(Expr::Lambda {
            params,
            body: Rc::new(body),
        })
    }

    pub fn let_in(bindings: Vec<(String, Expr)>, body: Expr) -> Result<Self, Error> {
        for (name, _) in &bindings {
            check_name(name)?;
        }
        check_distinct(&bindings.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>())?;
        Ok(Expr::Let {
            bindings,
            body: Box::new(body),
        })
    }

    pub fn assignment(name: &str, value: Expr) -> Result<Self, Error> {
        check_name(name)?;
        Ok(Expr::Assignment {
            name: name.to_owned(),
            value: Box::new(value),
        })
    }

    /// Canonical source text
    pub fn unparse(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Integral reals past the i64 range would read back as overflowing integers
            Expr::Literal(Value::Real(r)) if r.abs() >= INTEGER_BOUND => write!(f, "{r:e}"),
            Expr::Literal(value) => write!(f, "{}", value.serialize()),
            Expr::Identifier(name) => write!(f, "{name}"),
            Expr::Application {
                function,
                arguments,
            } => {
                write!(f, "{{{function}")?;
                for argument in arguments {
                    write!(f, " {argument}")?;
                }
                write!(f, "}}")
            }
            Expr::Lambda { params, body } => {
                write!(f, "{{fn {{{}}} {body}}}", params.join(" "))
            }
            Expr::Let { bindings, body } => {
                write!(f, "{{let")?;
                for (name, init) in bindings {
                    write!(f, " {{{name} = {init}}}")?;
                }
                write!(f, " in {body}}}")
            }
            Expr::Assignment { name, value } => write!(f, "{{{name} := {value}}}"),
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn id(name: &str) -> Expr {
        Expr::identifier(name).unwrap()
    }

    #[test]
    fn test_name_rules() {
        let test_cases = vec![
            ("x", true, false),
            ("%", true, false),
            ("fn", false, true),
            ("let", false, true),
            ("in", false, true),
            ("var", false, true),
            (":=", false, true),
            ("+", false, false),
            ("if", false, false),
            ("aset!", false, false),
        ];
        for (i, (name, valid, protected)) in test_cases.into_iter().enumerate() {
            assert_eq!(is_valid_name(name), valid, "Valid-name test #{}: {name}", i + 1);
            assert_eq!(is_protected(name), protected, "Protected test #{}: {name}", i + 1);
        }
    }

    #[test]
    fn test_constructors_reject_bad_names() {
        assert_eq!(
            Expr::identifier("fn"),
            Err(Error::InvalidInput("Symbol fn is protected.".into()))
        );
        assert_eq!(
            Expr::lambda(vec!["x".into(), "y".into(), "x".into()], id("x")),
            Err(Error::DuplicateParameter("x y x".into()))
        );
        assert_eq!(
            Expr::lambda(vec!["in".into()], id("x")),
            Err(Error::InvalidInput("Symbol in is protected.".into()))
        );
        assert_eq!(
            Expr::let_in(
                vec![("a".into(), Expr::literal(1)), ("a".into(), Expr::literal(2))],
                id("a")
            ),
            Err(Error::DuplicateParameter("a a".into()))
        );
        assert_eq!(
            Expr::assignment(":=", Expr::literal(1)),
            Err(Error::InvalidInput("Symbol := is protected.".into()))
        );
        // Shadowing a primitive is allowed
        assert!(Expr::lambda(vec!["+".into()], id("+")).is_ok());
    }

    #[test]
    fn test_unparse() {
        let test_cases = vec![
            (Expr::literal(10), "10"),
            (Expr::literal(2.5), "2.5"),
            (Expr::literal("hi"), "\"hi\""),
            (Expr::Literal(Value::Null), "null"),
            (id("x"), "x"),
            (
                Expr::application(id("f"), vec![id("a"), Expr::literal(1)]),
                "{f a 1}",
            ),
            (Expr::application(id("f"), vec![]), "{f}"),
            (
                Expr::lambda(
                    vec!["x".into(), "y".into()],
                    Expr::application(id("+"), vec![id("x"), id("y")]),
                )
                .unwrap(),
                "{fn {x y} {+ x y}}",
            ),
            (Expr::lambda(vec![], Expr::literal(1)).unwrap(), "{fn {} 1}"),
            (
                Expr::assignment("x", Expr::literal(10)).unwrap(),
                "{x := 10}",
            ),
            (
                Expr::let_in(
                    vec![("x".into(), Expr::literal(1)), ("y".into(), id("x"))],
                    id("y"),
                )
                .unwrap(),
                "{let {x = 1} {y = x} in y}",
            ),
        ];

        for (i, (expr, expected)) in test_cases.into_iter().enumerate() {
            assert_eq!(expr.unparse(), expected, "Unparse test #{}", i + 1);
        }
    }
}
