//! Bracketed-expression tree to [`Expr`].
//!
//! Array nodes are matched structurally, first match wins:
//!
//! 1. `{name := expr}` is an assignment
//! 2. `{fn {params...} body}` is a lambda
//! 3. `{let {name = expr}... in body}` is a let
//! 4. any other non-empty array is an application
//!
//! A malformed `fn`/`let` therefore reaches rule 4 and fails when the
//! reserved keyword is rejected as an identifier.

use crate::Error;
use crate::ast::{Expr, check_name};
use crate::reader::{SExpr, read, read_one};
use crate::value::Value;

/// Parse exactly one expression; blank input is the `null` literal.
pub fn parse(text: &str) -> Result<Expr, Error> {
    match read_one(text)? {
        Some(node) => parse_sexpr(&node),
        None => Ok(Expr::Literal(Value::Null)),
    }
}

/// Parse every top-level expression of `text`, in order.
pub fn parse_program(text: &str) -> Result<Vec<Expr>, Error> {
    read(text)?.iter().map(parse_sexpr).collect()
}

pub fn parse_sexpr(node: &SExpr) -> Result<Expr, Error> {
    match node {
        SExpr::Integer(n) => Ok(Expr::Literal(Value::Integer(*n))),
        SExpr::Real(r) => Ok(Expr::Literal(Value::Real(*r))),
        SExpr::String(s) => Ok(Expr::Literal(Value::String(s.clone()))),
        SExpr::Symbol(name) => Expr::identifier(name),
        SExpr::Array { items, .. } => parse_array(items),
    }
}

fn parse_array(items: &[SExpr]) -> Result<Expr, Error> {
    if let [SExpr::Symbol(name), op, value] = items
        && op.is_symbol(":=")
    {
        return Expr::assignment(name, parse_sexpr(value)?);
    }

    if let [keyword, SExpr::Array { items: params, .. }, body] = items
        && keyword.is_symbol("fn")
        && let Some(params) = symbol_names(params)
    {
        return Expr::lambda(params, parse_sexpr(body)?);
    }

    if items.len() >= 4
        && items[0].is_symbol("let")
        && let Some(in_index) = items.iter().position(|item| item.is_symbol("in"))
        && items.len() == in_index + 2
    {
        let bindings = items[1..in_index]
            .iter()
            .map(parse_let_binding)
            .collect::<Result<Vec<_>, _>>()?;
        return Expr::let_in(bindings, parse_sexpr(&items[in_index + 1])?);
    }

    match items.split_first() {
        Some((function, arguments)) => Ok(Expr::application(
            parse_sexpr(function)?,
            arguments.iter().map(parse_sexpr).collect::<Result<_, _>>()?,
        )),
        None => Err(Error::UnknownToken("{}".into())),
    }
}

/// Names of an all-symbol parameter list
fn symbol_names(items: &[SExpr]) -> Option<Vec<String>> {
    items
        .iter()
        .map(|item| match item {
            SExpr::Symbol(name) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// `{name = expr}`
fn parse_let_binding(node: &SExpr) -> Result<(String, Expr), Error> {
    if let SExpr::Array { items, .. } = node
        && let [SExpr::Symbol(name), eq, init] = items.as_slice()
        && eq.is_symbol("=")
    {
        check_name(name)?;
        return Ok((name.clone(), parse_sexpr(init)?));
    }
    Err(Error::InvalidInput(format!("Bad let syntax: {node}")))
}
