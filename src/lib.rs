//! DXUQ - a small interpreted expression language
//!
//! This crate implements the complete execution pipeline of the language:
//! a regex-composition lexer, a bracketed-expression reader, a parser into a
//! typed AST, and a tree-walking evaluator over an environment/store model.
//!
//! ```text
//! {let {fact = "bogus"}
//!  in
//!  {begin
//!    {fact := {fn {n} {if {<= n 0} 1 {* n {fact {- n 1}}}}}}
//!    {fact 12}}}
//! ```
//!
//! ## Pipeline
//!
//! source text → [`reader`] (driving [`lexer`] and [`pattern`]) → [`reader::SExpr`] tree
//! → [`parser`] → [`ast::Expr`] → [`evaluator`] (consulting [`environment`] and
//! [`builtinops`]) → [`value::Value`], serialized to text.
//!
//! ## Binding model
//!
//! Names never map directly to values. An [`Environment`] is an immutable list
//! of `(name, location)` bindings sharing one mutable [`Storage`]. Extending an
//! environment prepends bindings and allocates fresh locations; assignment writes
//! through an existing location. Closures snapshot the binding list but share
//! the storage, so `:=` on a captured variable is visible inside the closure
//! while later bindings in the caller are not.
//!
//! ## Modules
//!
//! - `pattern`: named sub-pattern composition into regular expressions
//! - `lexer`: action-driven tokenizer over a combined pattern automaton
//! - `reader`: the language's token table and the bracketed-expression tree
//! - `parser` / `ast`: typed expressions and their canonical unparsed form
//! - `value` / `environment`: runtime values, bindings and storage
//! - `builtinops`: the primitive operator registry
//! - `evaluator`: expression evaluation and the `run*` conveniences

use crate::pattern::PatternError;

/// Maximum bracket nesting accepted by the reader
/// Parsing recurses once per nesting level, so this also bounds parser recursion
pub const MAX_PARSE_DEPTH: usize = 64;

/// Largest element count `new-array` accepts
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;

/// Default maximum number of nested closure calls
/// Deep user recursion fails with [`Error::EvalDepthExceeded`] instead of
/// exhausting the host stack; this leaves headroom on an 8 MiB stack in debug
/// builds. Override per call with [`evaluator::EvalConfig`].
pub const MAX_EVAL_DEPTH: usize = 500;

/// Error types for the whole pipeline
///
/// Every error aborts the current `read`/`parse`/`evaluate` call and propagates
/// to the top-level caller. Nothing in this crate recovers locally.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    // Pattern engine
    #[error("PatternError: {0}")]
    PatternCompilation(#[from] PatternError),

    // Lexing
    #[error("Unknown text in input: \"{0}\"")]
    UnknownText(String),
    #[error("Unmatched parentheses: {0}")]
    UnmatchedParentheses(String),
    #[error("Unknown escape in string: {0}")]
    InvalidEscape(String),
    #[error("Expression too deeply nested (max depth: {0})")]
    TooDeeplyNested(usize),

    // Parsing
    #[error("Unknown token in input: {0}")]
    UnknownToken(String),
    #[error("Duplicate parameter names: {0}")]
    DuplicateParameter(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Binding
    #[error("Undefined symbol: {0}")]
    UndefinedSymbol(String),

    // Application
    #[error("Not a function: {0}")]
    NotAFunction(String),
    #[error("{}", format_arity(*expected, *got, expression.as_deref()))]
    ArityMismatch {
        expected: usize,
        got: usize,
        expression: Option<String>,
    },
    #[error("Unknown primitive: {0}")]
    UnknownPrimitive(String),
    #[error("Evaluation depth limit exceeded (max: {0})")]
    EvalDepthExceeded(usize),

    // Primitive evaluation
    #[error("Division by zero")]
    DivideByZero,
    #[error("RangeError: {0}")]
    Range(String),
    #[error("Invalid argument count: {0}")]
    InvalidArgumentCount(String),
    #[error("Not a number: {0}")]
    NotANumber(String),
    #[error("Not an integer: {0}")]
    NotAnInteger(String),
    #[error("Not a boolean: {0}")]
    NotABoolean(String),
    #[error("Not a string: {0}")]
    NotAString(String),
    #[error("Not an array: {0}")]
    NotAnArray(String),
    #[error("Output error: {0}")]
    Output(String),
}

fn format_arity(expected: usize, got: usize, expression: Option<&str>) -> String {
    match expression {
        Some(expr) => {
            format!("ArityError: {expr}: expected {expected} arguments, got {got}")
        }
        None => format!("ArityError: function expected {expected} arguments but got {got}"),
    }
}

impl Error {
    /// Create an ArityMismatch without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityMismatch {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityMismatch naming the callee
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityMismatch {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

pub mod ast;
pub mod builtinops;
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod pattern;
pub mod reader;
pub mod value;

pub use ast::Expr;
pub use environment::{Environment, Location, Storage};
pub use evaluator::{EvalConfig, evaluate, interpret, run, run_program};
pub use parser::{parse, parse_program};
pub use value::Value;
