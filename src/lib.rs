//! tramlisp - a small Scheme-like interpreter with proper tail calls
//!
//! This crate reads S-expressions, expands a fixed set of special forms and
//! evaluates the result against a chain of lexical scopes. It supports
//! closures, conditionals, mutation, quoting and unbounded tail recursion.
//!
//! ```scheme
//! (define sum
//!   (lambda (n)
//!     (define iter
//!       (lambda (i acc)
//!         (cond ((= i 0) acc)
//!               (else (iter (- i 1) (+ acc i))))))
//!     (iter n 0)))
//! (sum 10000)         ; => 50005000, in constant host stack
//! ```
//!
//! ## Strict Typing
//!
//! - Integers are 64-bit and wrap on overflow
//! - `cond` tests must produce booleans (no "truthiness")
//! - Arithmetic only accepts integers, boolean operators only booleans
//! - Procedures check their argument count on every call
//!
//! ## Modules
//!
//! - `scheme`: S-expression reader
//! - `syntax`: special-form expansion into typed expression nodes
//! - `evaluator`: evaluation engine, environments and the call-stack trampoline
//! - `builtinops`: builtin procedures
//! - `value`: runtime values and their printed form

use std::fmt;
use thiserror::Error;

/// Maximum parsing depth to prevent stack overflow on deeply nested input
pub const MAX_PARSE_DEPTH: usize = 64;

/// Default limit on live (non-tail) procedure frames.
///
/// Tail calls rewrite the current frame and never count towards this limit.
/// Each live frame costs several host stack frames; this default reaches the
/// limit before overflowing an 8 MiB host stack, even in debug builds. Raise
/// it only together with a larger thread stack.
pub const MAX_CALL_DEPTH: usize = 200;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, stray parens)
    InvalidSyntax,
    /// Input ended before the expression was complete
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
}

/// A structured error describing a reader failure.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Snippet of the input around the failure (max 20 chars)
    pub context: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Create a ParseError with a context snippet taken from `input` at `offset`
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 20;

        let snippet: String = input
            .get(offset..)
            .unwrap_or_default()
            .chars()
            .take(MAX_CONTEXT)
            .collect();
        let snippet = snippet.replace('\n', "\\n").replace('\r', "");

        ParseError {
            kind,
            message: message.into(),
            context: (!snippet.is_empty()).then_some(snippet),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, " near '{context}'")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(ParseError),

    /// Malformed special form, rejected by the syntax expander
    #[error("{form}: bad syntax, usage: '{usage}'")]
    Syntax {
        form: &'static str,
        usage: &'static str,
    },

    #[error("identifier '{0}' is not bound for any value")]
    Unbound(String),

    #[error("{procedure}: type mismatch, expected {expected}, got {got}")]
    TypeMismatch {
        procedure: String,
        expected: &'static str,
        got: String,
    },

    #[error("{procedure}: arity mismatch, expected {expected} arguments, got {got}")]
    ArityMismatch {
        procedure: String,
        expected: String,
        got: usize,
    },

    #[error("not a procedure: {0}")]
    NotProcedure(String),

    #[error("missing procedure expression in ()")]
    MissingProcedure,

    #[error("condition must be boolean, got {0}")]
    ConditionType(String),

    #[error("{0}: division by zero")]
    DivisionByZero(&'static str),

    #[error("call depth limit exceeded (max: {0} frames)")]
    CallDepthExceeded(usize),

    #[error("cannot quote expression: {0}")]
    Unquotable(String),
}

impl Error {
    /// Create a TypeMismatch for the value `got` passed to `procedure`
    pub fn type_mismatch(
        procedure: impl Into<String>,
        expected: &'static str,
        got: &value::Value,
    ) -> Self {
        Error::TypeMismatch {
            procedure: procedure.into(),
            expected,
            got: got.type_name().to_owned(),
        }
    }

    /// Create an ArityMismatch with a rendered expectation such as "2" or "at least 1"
    pub fn arity_mismatch(
        procedure: impl Into<String>,
        expected: impl fmt::Display,
        got: usize,
    ) -> Self {
        Error::ArityMismatch {
            procedure: procedure.into(),
            expected: expected.to_string(),
            got,
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err)
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod intern;
pub mod scheme;
pub mod syntax;
pub mod value;

pub use evaluator::{EvalConfig, Evaluator};
pub use value::Value;
