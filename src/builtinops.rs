//! Built-in operations registry.
//!
//! Every primitive is defined once here with its arity and evaluation
//! strategy. The root environment binds each one by name to a
//! [`Value::Primitive`], so primitives can be passed around, shadowed and
//! rebound like any other value; application resolves the name back to its
//! [`BuiltinOp`] through [`find_op`].
//!
//! ```text
//! {+ 1 2}                 ; 3, always a Real
//! {equal? 1 1.0}          ; true, numeric kinds compare by value
//! {and false {/ 1 0}}     ; false, the right operand is never evaluated
//! {let {a = {array 1 2}} in {begin {aset! a 0 5} {aref a 0}}}   ; 5
//! ```
//!
//! ## Evaluation strategies
//!
//! - **Value**: arguments are evaluated left to right first (e.g. `+`, `print`)
//! - **Value with environment**: as above, but the operation also returns the
//!   environment evaluation continues in
//! - **Expression**: the operation receives its argument expressions unevaluated
//!   and decides what to evaluate (`if`, `and`, `or`)
//!
//! ## Strictness
//!
//! - Arithmetic accepts integers and reals and always produces a real
//! - No truthiness: conditions and logical operands must be booleans
//! - Array and string indices must be integral and in range
//! - Argument counts are checked against [`Arity`] before any argument is evaluated

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;

use crate::ast::Expr;
use crate::environment::Environment;
use crate::evaluator::{Depth, eval_and, eval_if, eval_or};
use crate::value::Value;
use crate::{Error, MAX_ARRAY_LENGTH};

/// Accepted argument counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn validate(&self, got: usize) -> Result<(), Error> {
        match *self {
            Arity::Exact(expected) if got != expected => Err(Error::arity_error(expected, got)),
            Arity::AtLeast(expected) if got < expected => Err(Error::arity_error(expected, got)),
            _ => Ok(()),
        }
    }
}

/// Implementation of a built-in, by evaluation strategy
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Pure function of evaluated arguments
    Value(fn(&[Value], &Environment) -> Result<Value, Error>),
    /// Function of evaluated arguments that may hand back a different environment
    ValueWithEnv(fn(Vec<Value>, &Environment) -> Result<(Value, Environment), Error>),
    /// Receives unevaluated argument expressions and the current evaluation depth
    Expression(fn(&[Expr], &Environment, Depth) -> Result<(Value, Environment), Error>),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Value(_) => write!(f, "Value(<fn>)"),
            OpKind::ValueWithEnv(_) => write!(f, "ValueWithEnv(<fn>)"),
            OpKind::Expression(_) => write!(f, "Expression(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The name the root environment binds this operation to
    pub id: &'static str,
    pub op_kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    /// True when arguments are passed unevaluated
    pub fn is_expression_form(&self) -> bool {
        matches!(self.op_kind, OpKind::Expression(_))
    }

    pub fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(arg_count)
    }
}

//
// Builtin Function Implementations
//

macro_rules! arithmetic {
    ($name:ident, $op:tt) => {
        fn $name(args: &[Value], _env: &Environment) -> Result<Value, Error> {
            match args {
                [a, b] => Ok(Value::Real(a.real()? $op b.real()?)),
                _ => Err(Error::arity_error(2, args.len())),
            }
        }
    };
}

arithmetic!(builtin_add, +);
arithmetic!(builtin_sub, -);
arithmetic!(builtin_mul, *);

fn builtin_div(args: &[Value], _env: &Environment) -> Result<Value, Error> {
    match args {
        [a, b] => {
            let divisor = b.real()?;
            if divisor == 0.0 {
                return Err(Error::DivideByZero);
            }
            Ok(Value::Real(a.real()? / divisor))
        }
        _ => Err(Error::arity_error(2, args.len())),
    }
}

macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(args: &[Value], _env: &Environment) -> Result<Value, Error> {
            match args {
                [a, b] => Ok(Value::Boolean(a.real()? $op b.real()?)),
                _ => Err(Error::arity_error(2, args.len())),
            }
        }
    };
}

numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_ge, >=);
numeric_comparison!(builtin_gt, >);

fn builtin_not(args: &[Value], _env: &Environment) -> Result<Value, Error> {
    match args {
        [b] => Ok(Value::Boolean(!b.boolean()?)),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn builtin_xor(args: &[Value], _env: &Environment) -> Result<Value, Error> {
    match args {
        [a, b] => Ok(Value::Boolean(a.boolean()? ^ b.boolean()?)),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn builtin_equal(args: &[Value], _env: &Environment) -> Result<Value, Error> {
    match args {
        [a, b] => Ok(Value::Boolean(a == b)),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn builtin_print(args: &[Value], env: &Environment) -> Result<Value, Error> {
    for arg in args {
        env.output().write_str(&arg.printable(env.storage()))?;
    }
    Ok(Value::Void)
}

fn builtin_begin(args: &[Value], _env: &Environment) -> Result<Value, Error> {
    Ok(args.last().cloned().unwrap_or(Value::Void))
}

fn builtin_new_array(args: &[Value], env: &Environment) -> Result<Value, Error> {
    match args {
        [count, fill] => {
            let count = count.integer()?;
            let length = usize::try_from(count)
                .ok()
                .filter(|length| *length >= 1)
                .ok_or_else(|| {
                    Error::InvalidArgumentCount(format!(
                        "new-array needs a positive element count, got {count}"
                    ))
                })?;
            if length > MAX_ARRAY_LENGTH {
                return Err(Error::InvalidArgumentCount(format!(
                    "new-array count {count} exceeds the maximum of {MAX_ARRAY_LENGTH}"
                )));
            }
            let mut contents = Vec::new();
            contents.try_reserve_exact(length).map_err(|_| {
                Error::InvalidArgumentCount(format!("new-array cannot allocate {count} elements"))
            })?;
            contents.resize(length, fill.clone());
            Ok(Value::Array(env.storage().allocate_array(contents)))
        }
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn builtin_array(args: &[Value], env: &Environment) -> Result<Value, Error> {
    if args.is_empty() {
        return Err(Error::InvalidArgumentCount(
            "array needs at least one element".to_owned(),
        ));
    }
    Ok(Value::Array(env.storage().allocate_array(args.to_vec())))
}

/// Contents of the array `handle` and the checked position `index` within it
fn array_slot(
    handle: &Value,
    index: &Value,
    env: &Environment,
) -> Result<(Rc<[Value]>, usize), Error> {
    let location = handle.array()?;
    let contents = env
        .storage()
        .array(location)
        .ok_or_else(|| Error::NotAnArray(format!("No array stored at location {location}")))?;
    let index = index.integer()?;
    match usize::try_from(index) {
        Ok(position) if position < contents.len() => Ok((contents, position)),
        _ => Err(Error::Range(format!(
            "Index {index} out of range for array of length {}",
            contents.len()
        ))),
    }
}

fn builtin_aref(args: &[Value], env: &Environment) -> Result<Value, Error> {
    match args {
        [handle, index] => {
            let (contents, position) = array_slot(handle, index, env)?;
            Ok(contents[position].clone())
        }
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn builtin_aset(args: &[Value], env: &Environment) -> Result<Value, Error> {
    match args {
        [handle, index, value] => {
            let (contents, position) = array_slot(handle, index, env)?;
            let mut updated = contents.to_vec();
            updated[position] = value.clone();
            env.storage().replace_array(handle.array()?, updated);
            Ok(Value::Void)
        }
        _ => Err(Error::arity_error(3, args.len())),
    }
}

fn builtin_substring(args: &[Value], _env: &Environment) -> Result<Value, Error> {
    match args {
        [string, start, end] => {
            let string = string.string()?;
            let (start, end) = (start.integer()?, end.integer()?);
            let length = string.chars().count();
            let in_range = |n: i64| usize::try_from(n).ok().filter(|n| *n <= length);
            match (in_range(start), in_range(end)) {
                (Some(from), Some(to)) if from <= to => Ok(Value::String(
                    string.chars().skip(from).take(to - from).collect(),
                )),
                _ => Err(Error::Range(format!(
                    "Substring range {start}..{end} invalid for string of length {length}"
                ))),
            }
        }
        _ => Err(Error::arity_error(3, args.len())),
    }
}

fn value(
    id: &'static str,
    f: fn(&[Value], &Environment) -> Result<Value, Error>,
    arity: Arity,
) -> BuiltinOp {
    BuiltinOp {
        id,
        op_kind: OpKind::Value(f),
        arity,
    }
}

fn expression(
    id: &'static str,
    f: fn(&[Expr], &Environment, Depth) -> Result<(Value, Environment), Error>,
    arity: Arity,
) -> BuiltinOp {
    BuiltinOp {
        id,
        op_kind: OpKind::Expression(f),
        arity,
    }
}

/// Global registry of all built-in operations, in root-binding order.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    vec![
        // Arithmetic
        value("+", builtin_add, Arity::Exact(2)),
        value("-", builtin_sub, Arity::Exact(2)),
        value("*", builtin_mul, Arity::Exact(2)),
        value("/", builtin_div, Arity::Exact(2)),
        // Comparison
        value("<=", builtin_le, Arity::Exact(2)),
        value("<", builtin_lt, Arity::Exact(2)),
        value(">=", builtin_ge, Arity::Exact(2)),
        value(">", builtin_gt, Arity::Exact(2)),
        // Logic
        value("not", builtin_not, Arity::Exact(1)),
        expression("and", eval_and, Arity::Exact(2)),
        expression("or", eval_or, Arity::Exact(2)),
        value("xor", builtin_xor, Arity::Exact(2)),
        value("equal?", builtin_equal, Arity::Exact(2)),
        // Control
        expression("if", eval_if, Arity::Exact(3)),
        value("print", builtin_print, Arity::Any),
        value("begin", builtin_begin, Arity::Any),
        // Arrays
        value("new-array", builtin_new_array, Arity::Exact(2)),
        value("array", builtin_array, Arity::Any),
        value("aref", builtin_aref, Arity::Exact(2)),
        value("aset!", builtin_aset, Arity::Exact(3)),
        // Strings
        value("substring", builtin_substring, Arity::Exact(3)),
    ]
});

/// Lazy static map from id to BuiltinOp (private - use find_op)
static BUILTIN_BY_ID: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// All builtin operations, in registration order
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by name
pub fn find_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_ID.get(id).copied()
}
