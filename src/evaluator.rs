//! Tree-walking evaluation.
//!
//! Every evaluation step takes an [`Environment`] and hands back the value
//! together with the environment evaluation continues in. Only assignment to a
//! name that is not yet bound changes that environment; the change then flows
//! to whatever is evaluated next in the same sequence (later arguments of the
//! same application, later expressions of a program).
//!
//! Recursion is bounded by [`EvalConfig::max_depth`] nested closure calls;
//! exceeding it fails with [`Error::EvalDepthExceeded`]. Syntactic nesting is
//! already bounded by the reader, so other forms are not counted.

use std::rc::Rc;

use tracing::trace;

use crate::ast::Expr;
use crate::builtinops::{BuiltinOp, OpKind, find_op};
use crate::environment::Environment;
use crate::parser::{parse, parse_program};
use crate::value::{Closure, Value};
use crate::{Error, MAX_EVAL_DEPTH};

/// Evaluation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Most closure calls that may be in progress at once
    pub max_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// Closure calls in progress, with the limit they run under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Depth {
    level: usize,
    limit: usize,
}

impl Depth {
    fn new(config: &EvalConfig) -> Self {
        Depth {
            level: 0,
            limit: config.max_depth,
        }
    }

    /// One closure call further in
    pub fn deeper(self) -> Self {
        Depth {
            level: self.level + 1,
            ..self
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }
}

/// Evaluate `expr` in `env` with the default [`EvalConfig`]
pub fn evaluate(expr: &Expr, env: &Environment) -> Result<(Value, Environment), Error> {
    evaluate_with_config(expr, env, &EvalConfig::default())
}

pub fn evaluate_with_config(
    expr: &Expr,
    env: &Environment,
    config: &EvalConfig,
) -> Result<(Value, Environment), Error> {
    eval_with_depth_tracking(expr, env, Depth::new(config))
}

/// Evaluate an expression with depth tracking to prevent stack overflow
pub(crate) fn eval_with_depth_tracking(
    expr: &Expr,
    env: &Environment,
    depth: Depth,
) -> Result<(Value, Environment), Error> {
    match expr {
        Expr::Literal(value) => Ok((value.clone(), env.clone())),

        Expr::Identifier(name) => Ok((env.lookup(name)?, env.clone())),

        // Closures capture the binding list as it is now; storage stays shared
        Expr::Lambda { params, body } => {
            let closure = Closure {
                params: params.clone(),
                body: Rc::clone(body),
                env: env.clone(),
            };
            Ok((Value::Closure(Rc::new(closure)), env.clone()))
        }

        Expr::Assignment { name, value } => {
            let (value, env) = eval_with_depth_tracking(value, env, depth)?;
            if env.contains(name) {
                env.update(name, value)?;
                Ok((Value::Void, env))
            } else {
                let env = env.extend([(name.clone(), value)]);
                Ok((Value::Void, env))
            }
        }

        Expr::Let { bindings, body } => {
            let mut local = env.clone();
            for (name, init) in bindings {
                let (value, next) = eval_with_depth_tracking(init, &local, depth)?;
                local = next.extend([(name.clone(), value)]);
            }
            let (value, _) = eval_with_depth_tracking(body, &local, depth)?;
            Ok((value, env.clone()))
        }

        Expr::Application {
            function,
            arguments,
        } => eval_application(function, arguments, env, depth),
    }
}

/// Helper function to evaluate argument expressions left to right, threading
/// the environment from one argument to the next
fn eval_args(
    arguments: &[Expr],
    env: &Environment,
    depth: Depth,
) -> Result<(Vec<Value>, Environment), Error> {
    let mut env = env.clone();
    let mut values = Vec::with_capacity(arguments.len());
    for argument in arguments {
        let (value, next) = eval_with_depth_tracking(argument, &env, depth)?;
        values.push(value);
        env = next;
    }
    Ok((values, env))
}

fn eval_application(
    function: &Expr,
    arguments: &[Expr],
    env: &Environment,
    depth: Depth,
) -> Result<(Value, Environment), Error> {
    let (callee, env) = eval_with_depth_tracking(function, env, depth)?;
    match callee {
        Value::Closure(closure) => apply_closure(&closure, function, arguments, &env, depth),
        Value::Primitive(name) => {
            let op = find_op(name).ok_or_else(|| Error::UnknownPrimitive(name.to_owned()))?;
            apply_op(op, arguments, &env, depth)
        }
        _ => Err(Error::NotAFunction(function.to_string())),
    }
}

/// Call a closure; the caller continues in its own environment
fn apply_closure(
    closure: &Closure,
    function: &Expr,
    arguments: &[Expr],
    env: &Environment,
    depth: Depth,
) -> Result<(Value, Environment), Error> {
    if closure.params.len() != arguments.len() {
        return Err(Error::arity_error_with_expr(
            closure.params.len(),
            arguments.len(),
            function.to_string(),
        ));
    }
    let (args, env) = eval_args(arguments, env, depth)?;
    if depth.level >= depth.limit {
        return Err(Error::EvalDepthExceeded(depth.limit));
    }
    trace!(callee = %function, params = ?closure.params, level = depth.level, "apply closure");

    let local = closure.env.extend(closure.params.iter().cloned().zip(args));
    let (value, _) = eval_with_depth_tracking(&closure.body, &local, depth.deeper())?;
    Ok((value, env))
}

/// Apply a builtin operation according to its evaluation strategy
pub(crate) fn apply_op(
    op: &BuiltinOp,
    arguments: &[Expr],
    env: &Environment,
    depth: Depth,
) -> Result<(Value, Environment), Error> {
    op.validate_arity(arguments.len())
        .map_err(|err| add_context(err, op.id))?;
    trace!(op = op.id, argc = arguments.len(), level = depth.level, "apply primitive");

    match op.op_kind {
        OpKind::Value(f) => {
            let (args, env) = eval_args(arguments, env, depth)?;
            let value = f(&args, &env)?;
            Ok((value, env))
        }
        OpKind::ValueWithEnv(f) => {
            let (args, env) = eval_args(arguments, env, depth)?;
            f(args, &env)
        }
        // Expression forms evaluate (or skip) their own operands
        OpKind::Expression(f) => f(arguments, env, depth),
    }
}

/// Helper function to name the callee in arity errors
fn add_context(error: Error, callee: &str) -> Error {
    match error {
        Error::ArityMismatch {
            expected,
            got,
            expression: None,
        } => Error::arity_error_with_expr(expected, got, callee.to_owned()),
        other => other,
    }
}

/// `{if condition then else}`: only the selected branch is evaluated
pub(crate) fn eval_if(
    args: &[Expr],
    env: &Environment,
    depth: Depth,
) -> Result<(Value, Environment), Error> {
    match args {
        [condition, then_expr, else_expr] => {
            let (condition, _) = eval_with_depth_tracking(condition, env, depth)?;
            let branch = if condition.boolean()? {
                then_expr
            } else {
                else_expr
            };
            // The branch runs where the `if` was entered, not where the condition left off
            eval_with_depth_tracking(branch, env, depth)
        }
        _ => Err(Error::arity_error(3, args.len())),
    }
}

macro_rules! boolean_logic_op {
    ($name:ident, $short_circuit:literal) => {
        pub(crate) fn $name(
            args: &[Expr],
            env: &Environment,
            depth: Depth,
        ) -> Result<(Value, Environment), Error> {
            match args {
                [left, right] => {
                    let (left, env) = eval_with_depth_tracking(left, env, depth)?;
                    if left.boolean()? == $short_circuit {
                        return Ok((Value::Boolean($short_circuit), env));
                    }
                    let (right, env) = eval_with_depth_tracking(right, &env, depth)?;
                    Ok((Value::Boolean(right.boolean()?), env))
                }
                _ => Err(Error::arity_error(2, args.len())),
            }
        }
    };
}

// Generate short-circuiting boolean forms
boolean_logic_op!(eval_and, false);
boolean_logic_op!(eval_or, true);

/// Parse and evaluate one expression, returning its serialized value
pub fn run(text: &str, env: &Environment) -> Result<String, Error> {
    run_with_config(text, env, &EvalConfig::default())
}

pub fn run_with_config(text: &str, env: &Environment, config: &EvalConfig) -> Result<String, Error> {
    let expr = parse(text)?;
    let (value, _) = evaluate_with_config(&expr, env, config)?;
    Ok(value.serialize())
}

/// Evaluate every top-level expression of `text` in order, each in the
/// environment the previous one produced. Returns the serialized results.
pub fn run_program(text: &str, env: &Environment) -> Result<Vec<String>, Error> {
    let program = parse_program(text)?;
    let mut env = env.clone();
    let mut results = Vec::with_capacity(program.len());
    for expr in &program {
        let (value, next) = evaluate(expr, &env)?;
        results.push(value.serialize());
        env = next;
    }
    Ok(results)
}

/// [`run`] against a fresh root environment
pub fn interpret(text: &str) -> Result<String, Error> {
    run(text, &Environment::root())
}
