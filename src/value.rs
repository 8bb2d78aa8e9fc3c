//! Runtime values produced by evaluation.
//!
//! Lists are singly linked chains of shared [`Pair`]s terminated by
//! [`Value::Nil`]. Procedures come in two flavours: builtins from the static
//! registry in [`crate::builtinops`] and closures ([`Procedure`]) that keep a
//! shared reference to the scope they were created in.
//!
//! The `Display` implementation is the REPL printer.

use crate::ast::{Lambda, NumberType};
use crate::builtinops::BuiltinOp;
use crate::evaluator::Env;
use crate::intern::Symbol;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum Value {
    /// Empty list, also the result of `define`, `set!` and an unmatched `cond`
    Nil,
    Bool(bool),
    /// 64-bit integer, arithmetic wraps
    Int(NumberType),
    Symbol(Symbol),
    Pair(Rc<Pair>),
    Builtin(&'static BuiltinOp),
    Proc(Rc<Procedure>),
}

/// A cons cell
pub struct Pair {
    pub first: Value,
    pub second: Value,
}

/// A user procedure: the lambda it was built from plus its defining scope
pub struct Procedure {
    name: OnceCell<Symbol>,
    pub lambda: Rc<Lambda>,
    pub env: Env,
}

impl Procedure {
    pub fn new(lambda: Rc<Lambda>, env: Env) -> Self {
        Procedure {
            name: OnceCell::new(),
            lambda,
            env,
        }
    }

    pub fn name(&self) -> Option<Symbol> {
        self.name.get().copied()
    }

    /// Name an anonymous procedure; a procedure keeps the first name it is given
    pub fn adopt_name(&self, name: Symbol) {
        let _ = self.name.set(name);
    }
}

// Long lists would otherwise be dropped recursively, one host frame per cell.
impl Drop for Pair {
    fn drop(&mut self) {
        let mut next = std::mem::replace(&mut self.second, Value::Nil);
        while let Value::Pair(rc) = next {
            match Rc::try_unwrap(rc) {
                Ok(mut pair) => next = std::mem::replace(&mut pair.second, Value::Nil),
                Err(_) => break,
            }
        }
    }
}

impl Value {
    pub fn cons(first: Value, second: Value) -> Value {
        Value::Pair(Rc::new(Pair { first, second }))
    }

    /// Build a proper list by right-folding onto Nil
    pub fn list<I>(items: I) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(Value::Nil, |tail, item| Value::cons(item, tail))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Symbol(_) => "symbol",
            Value::Pair(_) => "pair",
            Value::Builtin(_) | Value::Proc(_) => "procedure",
        }
    }

    /// `eq?`: identity for pairs and closures, value equality for atoms
    pub fn is_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Proc(a), Value::Proc(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `equal?`: structural equality, walking pairs
    pub fn is_equal(&self, other: &Value) -> bool {
        let (mut a, mut b) = (self, other);
        loop {
            match (a, b) {
                (Value::Pair(x), Value::Pair(y)) => {
                    if Rc::ptr_eq(x, y) {
                        return true;
                    }
                    if !x.first.is_equal(&y.first) {
                        return false;
                    }
                    a = &x.second;
                    b = &y.second;
                }
                _ => return a.is_eq(b),
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Int(n as NumberType)
            }
        }
    };
}

impl_from_integer!(i32);
impl_from_integer!(NumberType);

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::list(items.into_iter().map(Into::into))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Pair(pair) => write!(f, "Pair({:?}, {:?})", pair.first, pair.second),
            Value::Builtin(op) => write!(f, "Builtin({})", op.name),
            // Closures may live in the scope they capture, so the scope is not printed
            Value::Proc(proc) => match proc.name() {
                Some(name) => write!(f, "Proc({name})"),
                None => write!(f, "Proc(<anonymous>)"),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Pair(pair) => {
                write!(f, "({}", pair.first)?;
                let mut rest = &pair.second;
                loop {
                    match rest {
                        Value::Nil => break,
                        Value::Pair(next) => {
                            write!(f, " {}", next.first)?;
                            rest = &next.second;
                        }
                        tail => {
                            write!(f, " . {tail}")?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::Builtin(op) => write!(f, "<procedure {}>", op.name),
            Value::Proc(proc) => match proc.name() {
                Some(name) => write!(f, "<procedure {name}>"),
                None => write!(f, "<procedure>"),
            },
        }
    }
}

/// Helper for creating symbol values
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(crate::intern::intern(name.as_ref()))
}
