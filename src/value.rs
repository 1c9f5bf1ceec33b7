//! Runtime values.
//!
//! [`Value`] is the closed set of things an expression can evaluate to.
//! Arrays are handles: a [`Value::Array`] holds only a storage [`Location`],
//! and every copy of the handle sees the same boxed contents.
//!
//! Equality (`PartialEq`) is the language's `equal?`: reals and integers
//! compare numerically, arrays and primitives by identity, closures never.

use std::rc::Rc;

use crate::Error;
use crate::ast::Expr;
use crate::environment::{Environment, Location, Storage};
use crate::reader::escape_string;

/// A user function together with the environment it was created in
#[derive(Clone)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Rc<Expr>,
    pub env: Environment,
}

impl std::fmt::Debug for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The captured environment is omitted; it usually contains this closure
        write!(f, "Closure(params={:?}, body={})", self.params, self.body)
    }
}

#[derive(Clone)]
pub enum Value {
    Real(f64),
    /// Integers stay distinct from reals until an operation coerces them
    Integer(i64),
    Boolean(bool),
    String(String),
    /// Result of statement-like forms such as `:=` and `print`
    Void,
    Null,
    Closure(Rc<Closure>),
    /// A built-in operator, resolved by name at application time
    Primitive(&'static str),
    Array(Location),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Real(r) => write!(f, "Real({r:?})"),
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Boolean(b) => write!(f, "Boolean({b})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Void => write!(f, "Void"),
            Value::Null => write!(f, "Null"),
            Value::Closure(closure) => write!(f, "{closure:?}"),
            Value::Primitive(name) => write!(f, "Primitive({name})"),
            Value::Array(location) => write!(f, "Array(@{location})"),
        }
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl Value {
    /// Type name used in diagnostics
    pub fn value_type(&self) -> &'static str {
        match self {
            Value::Real(_) => "Real",
            Value::Integer(_) => "Int",
            Value::Boolean(_) => "Bool",
            Value::String(_) => "String",
            Value::Void => "Void",
            Value::Null => "Null",
            Value::Closure(_) => "Closure",
            Value::Primitive(_) => "Primitive",
            Value::Array(_) => "Array",
        }
    }

    /// Canonical machine-readable form
    pub fn serialize(&self) -> String {
        match self {
            Value::Real(r) => serialize_real(*r),
            Value::Integer(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::String(s) => escape_string(s),
            Value::Void => "void".to_owned(),
            Value::Null => "null".to_owned(),
            Value::Closure(_) => "#<procedure>".to_owned(),
            Value::Primitive(_) => "#<primop>".to_owned(),
            Value::Array(_) => "#<array>".to_owned(),
        }
    }

    /// Human-facing form, dereferencing arrays through `storage`
    pub fn printable(&self, storage: &Storage) -> String {
        self.printable_within(storage, &mut Vec::new())
    }

    fn printable_within(&self, storage: &Storage, visiting: &mut Vec<Location>) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Closure(closure) => {
                format!("{{fn {{{}}} {}}}", closure.params.join(" "), closure.body)
            }
            Value::Primitive(name) => format!("{{{name} ...}}"),
            Value::Array(location) => {
                let Some(contents) = storage.array(*location) else {
                    return self.serialize();
                };
                if visiting.contains(location) {
                    return self.serialize();
                }
                visiting.push(*location);
                let mut out = String::from("{array");
                for item in contents.iter() {
                    out.push(' ');
                    out.push_str(&item.printable_within(storage, visiting));
                }
                out.push('}');
                visiting.pop();
                out
            }
            other => other.serialize(),
        }
    }

    pub fn real(&self) -> Result<f64, Error> {
        match self {
            Value::Real(r) => Ok(*r),
            Value::Integer(n) => Ok(*n as f64),
            other => Err(Error::NotANumber(format!(
                "Expected a Real, got a {}.",
                other.value_type()
            ))),
        }
    }

    /// Integers, or reals with no fractional part inside the `i64` range
    pub fn integer(&self) -> Result<i64, Error> {
        match self {
            Value::Integer(n) => Ok(*n),
            Value::Real(r) if r.fract() == 0.0 && (-INTEGER_BOUND..INTEGER_BOUND).contains(r) => {
                Ok(*r as i64)
            }
            Value::Real(r) => Err(Error::NotAnInteger(format!(
                "Value isn't an integer: {r}"
            ))),
            other => Err(Error::NotAnInteger(format!(
                "Expected an Int, got a {}.",
                other.value_type()
            ))),
        }
    }

    pub fn boolean(&self) -> Result<bool, Error> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(Error::NotABoolean(format!(
                "Expected a Bool, got a {}.",
                other.value_type()
            ))),
        }
    }

    pub fn string(&self) -> Result<&str, Error> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(Error::NotAString(format!(
                "Expected a String, got a {}.",
                other.value_type()
            ))),
        }
    }

    /// The storage location of an array handle
    pub fn array(&self) -> Result<Location, Error> {
        match self {
            Value::Array(location) => Ok(*location),
            other => Err(Error::NotAnArray(format!(
                "Expected an Array, got a {}.",
                other.value_type()
            ))),
        }
    }
}

/// 2^63: reals in `[-2^63, 2^63)` convert to `i64` exactly when integral
pub(crate) const INTEGER_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Integral reals print without a fractional part
fn serialize_real(r: f64) -> String {
    if r == 0.0 {
        // Covers -0.0
        "0".to_owned()
    } else {
        // f64's Display never uses exponents and drops a zero fraction
        r.to_string()
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(r), Value::Integer(n)) | (Value::Integer(n), Value::Real(r)) => {
                *r == *n as f64
            }
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Void, Value::Void) | (Value::Null, Value::Null) => true,
            (Value::Primitive(a), Value::Primitive(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            // Closures never equal anything, themselves included
            (Value::Closure(_), _) | (_, Value::Closure(_)) => false,
            _ => false,
        }
    }
}
