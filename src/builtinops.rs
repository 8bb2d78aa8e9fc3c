//! Built-in procedure registry.
//!
//! Every builtin is an ordinary procedure: its arguments are evaluated before
//! the call, and it can be stored, passed and called like any closure.
//!
//! ```scheme
//! (+ 1 2 3)              ; => 6
//! (< 1 2 3)              ; => true, comparisons chain pairwise
//! (&& true (! false))    ; => true
//! (car (cons 1 (list)))  ; => 1
//! ```
//!
//! ## Strict typing
//!
//! - Arithmetic and comparisons accept only integers
//! - `&&`, `||` and `!` accept only booleans (no truthiness)
//! - Integer arithmetic wraps on overflow; division by zero is an error
//! - Argument counts are validated against each builtin's [`Arity`]
//!
//! ## Adding new operations
//!
//! 1. Implement `fn(&[Value]) -> Result<Value, Error>`
//! 2. Add a [`BuiltinOp`] entry to `BUILTIN_OPS` with its name and arity
//! 3. Add table tests covering edge cases and error conditions

use crate::Error;
use crate::ast::NumberType;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Signature shared by every builtin
pub type BuiltinFn = fn(&[Value]) -> Result<Value, Error>;

/// Accepted argument counts for a builtin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    /// Check `got` arguments against this arity on behalf of `procedure`
    pub fn validate(self, procedure: &str, got: usize) -> Result<(), Error> {
        let ok = match self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::arity_mismatch(procedure, self, got))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Definition of a built-in procedure
#[derive(Debug)]
pub struct BuiltinOp {
    /// Identifier the procedure is bound to in the root scope
    pub name: &'static str,
    func: BuiltinFn,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Names are unique within the registry
        self.name == other.name
    }
}

impl BuiltinOp {
    /// Validate the argument count, then run the procedure
    pub fn call(&self, args: &[Value]) -> Result<Value, Error> {
        self.arity.validate(self.name, args.len())?;
        (self.func)(args)
    }
}

//
// Argument conversion
//

fn to_ints(procedure: &str, args: &[Value]) -> Result<Vec<NumberType>, Error> {
    args.iter()
        .map(|arg| match arg {
            Value::Int(n) => Ok(*n),
            other => Err(Error::type_mismatch(procedure, "integer", other)),
        })
        .collect()
}

fn to_bools(procedure: &str, args: &[Value]) -> Result<Vec<bool>, Error> {
    args.iter()
        .map(|arg| match arg {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::type_mismatch(procedure, "boolean", other)),
        })
        .collect()
}

//
// Builtin Function Implementations
//

// Macro to generate chained numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let nums = to_ints($op_str, args)?;
            // All adjacent pairs must satisfy the comparison
            Ok(Value::Bool(nums.windows(2).all(|pair| pair[0] $op pair[1])))
        }
    };
}

numeric_comparison!(builtin_eq, ==, "=");
numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_le, <=, "<=");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_ge, >=, ">=");

fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    let nums = to_ints("+", args)?;
    Ok(Value::Int(nums.into_iter().fold(0, NumberType::wrapping_add)))
}

fn builtin_sub(args: &[Value]) -> Result<Value, Error> {
    match to_ints("-", args)?.as_slice() {
        [] => Err(Error::arity_mismatch("-", Arity::AtLeast(1), 0)),
        [n] => Ok(Value::Int(n.wrapping_neg())),
        [first, rest @ ..] => Ok(Value::Int(
            rest.iter().fold(*first, |acc, n| acc.wrapping_sub(*n)),
        )),
    }
}

fn builtin_mul(args: &[Value]) -> Result<Value, Error> {
    let nums = to_ints("*", args)?;
    Ok(Value::Int(nums.into_iter().fold(1, NumberType::wrapping_mul)))
}

fn checked_div(procedure: &'static str, a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if b == 0 {
        return Err(Error::DivisionByZero(procedure));
    }
    // MIN / -1 wraps like the rest of the arithmetic
    Ok(a.wrapping_div(b))
}

fn builtin_div(args: &[Value]) -> Result<Value, Error> {
    match to_ints("/", args)?.as_slice() {
        [] => Err(Error::arity_mismatch("/", Arity::AtLeast(1), 0)),
        [n] => checked_div("/", 1, *n).map(Value::Int),
        [first, rest @ ..] => rest
            .iter()
            .try_fold(*first, |acc, n| checked_div("/", acc, *n))
            .map(Value::Int),
    }
}

fn builtin_rem(args: &[Value]) -> Result<Value, Error> {
    match to_ints("%", args)?.as_slice() {
        [_, 0] => Err(Error::DivisionByZero("%")),
        [a, b] => Ok(Value::Int(a.wrapping_rem(*b))),
        other => Err(Error::arity_mismatch("%", Arity::Exact(2), other.len())),
    }
}

fn builtin_and(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(to_bools("&&", args)?.into_iter().all(|b| b)))
}

fn builtin_or(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(to_bools("||", args)?.into_iter().any(|b| b)))
}

fn builtin_not(args: &[Value]) -> Result<Value, Error> {
    match to_bools("!", args)?.as_slice() {
        [b] => Ok(Value::Bool(!b)),
        other => Err(Error::arity_mismatch("!", Arity::Exact(1), other.len())),
    }
}

fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    match args {
        [first, second] => Ok(Value::cons(first.clone(), second.clone())),
        _ => Err(Error::arity_mismatch("cons", Arity::Exact(2), args.len())),
    }
}

fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Pair(pair)] => Ok(pair.first.clone()),
        [other] => Err(Error::type_mismatch("car", "pair", other)),
        _ => Err(Error::arity_mismatch("car", Arity::Exact(1), args.len())),
    }
}

fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Pair(pair)] => Ok(pair.second.clone()),
        [other] => Err(Error::type_mismatch("cdr", "pair", other)),
        _ => Err(Error::arity_mismatch("cdr", Arity::Exact(1), args.len())),
    }
}

fn builtin_list(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::list(args.iter().cloned()))
}

fn builtin_null(args: &[Value]) -> Result<Value, Error> {
    match args {
        [value] => Ok(Value::Bool(value.is_nil())),
        _ => Err(Error::arity_mismatch("null?", Arity::Exact(1), args.len())),
    }
}

fn builtin_is_eq(args: &[Value]) -> Result<Value, Error> {
    match args {
        [a, b] => Ok(Value::Bool(a.is_eq(b))),
        _ => Err(Error::arity_mismatch("eq?", Arity::Exact(2), args.len())),
    }
}

fn builtin_is_equal(args: &[Value]) -> Result<Value, Error> {
    match args {
        [a, b] => Ok(Value::Bool(a.is_equal(b))),
        _ => Err(Error::arity_mismatch("equal?", Arity::Exact(2), args.len())),
    }
}

/// Global registry of all built-in procedures.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    vec![
        // Arithmetic operations
        BuiltinOp {
            name: "+",
            func: builtin_add,
            arity: Arity::Any,
        },
        BuiltinOp {
            name: "-",
            func: builtin_sub,
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            name: "*",
            func: builtin_mul,
            arity: Arity::Any,
        },
        BuiltinOp {
            name: "/",
            func: builtin_div,
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            name: "%",
            func: builtin_rem,
            arity: Arity::Exact(2),
        },
        // Comparison operations
        BuiltinOp {
            name: "=",
            func: builtin_eq,
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            name: "<",
            func: builtin_lt,
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            name: "<=",
            func: builtin_le,
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            name: ">",
            func: builtin_gt,
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            name: ">=",
            func: builtin_ge,
            arity: Arity::AtLeast(1),
        },
        // Logical operations
        BuiltinOp {
            name: "&&",
            func: builtin_and,
            arity: Arity::Any,
        },
        BuiltinOp {
            name: "||",
            func: builtin_or,
            arity: Arity::Any,
        },
        BuiltinOp {
            name: "!",
            func: builtin_not,
            arity: Arity::Exact(1),
        },
        // List operations
        BuiltinOp {
            name: "cons",
            func: builtin_cons,
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            name: "car",
            func: builtin_car,
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            name: "cdr",
            func: builtin_cdr,
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            name: "list",
            func: builtin_list,
            arity: Arity::Any,
        },
        BuiltinOp {
            name: "null?",
            func: builtin_null,
            arity: Arity::Exact(1),
        },
        // Equality
        BuiltinOp {
            name: "eq?",
            func: builtin_is_eq,
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            name: "equal?",
            func: builtin_is_equal,
            arity: Arity::Exact(2),
        },
    ]
});

/// Lazy static map from name to BuiltinOp (private - use find_builtin)
static BUILTIN_BY_NAME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| {
        let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
        ops.iter().map(|op| (op.name, op)).collect()
    });

/// Get all builtin procedures (used to seed the root scope)
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin procedure by name
pub fn find_builtin(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_NAME.get(name).copied()
}
