//! This module defines the expression tree consumed by the evaluator.
//!
//! The reader produces "raw" trees made only of literals, identifiers and
//! lists. The syntax expander then rewrites lists headed by a keyword into the
//! typed special-form variants ([`Expr::Define`], [`Expr::Lambda`], ...).
//! Helper constructors such as [`ident`], [`int`] and [`list`] keep tree
//! construction in code and tests short.

use crate::intern::{Symbol, intern};
use std::fmt;
use std::rc::Rc;

/// Type alias for integer literals and values
pub type NumberType = i64;

/// Allowed non-alphanumeric characters in identifiers
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$%&|";

/// Check if a string is a valid identifier
/// Valid: non-empty, no leading digit, no "-digit"/"+digit" prefix,
/// alphanumeric + SYMBOL_SPECIAL_CHARS
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() {
                return false;
            }

            if (first_char == '-' || first_char == '+')
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            name.chars()
                .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
        }
    }
}

/// Core expression type
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Bool(bool),
    Int(NumberType),
    /// Identifier (interned)
    Ident(Symbol),
    /// Application, or a raw list not yet expanded
    List(Vec<Expr>),
    /// Wraps one unevaluated sub-expression
    Quote(Box<Expr>),
    Define { ident: Symbol, value: Box<Expr> },
    Set { ident: Symbol, value: Box<Expr> },
    /// Shared so that closures capture the code without copying it
    Lambda(Rc<Lambda>),
    Cond(Vec<Branch>),
}

/// Parameters and body of a `lambda` expression
#[derive(Debug, PartialEq)]
pub struct Lambda {
    pub params: Vec<Symbol>,
    pub body: Vec<Expr>,
}

/// Test of a `cond` branch
#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    Test(Expr),
    Else,
}

/// One `cond` branch: a guard plus a non-empty body
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub guard: Guard,
    pub body: Vec<Expr>,
}

impl Expr {
    /// The identifier name if this is an identifier
    pub fn as_ident(&self) -> Option<Symbol> {
        match self {
            Expr::Ident(sym) => Some(*sym),
            _ => None,
        }
    }
}

/// Helper for creating identifiers - accepts &str and String
pub fn ident<S: AsRef<str>>(name: S) -> Expr {
    Expr::Ident(intern(name.as_ref()))
}

pub fn int(n: NumberType) -> Expr {
    Expr::Int(n)
}

pub fn boolean(b: bool) -> Expr {
    Expr::Bool(b)
}

/// Helper for creating raw lists
pub fn list<I: IntoIterator<Item = Expr>>(items: I) -> Expr {
    Expr::List(items.into_iter().collect())
}

/// Helper for creating quote nodes
pub fn quote(expr: Expr) -> Expr {
    Expr::Quote(Box::new(expr))
}

fn write_seq(f: &mut fmt::Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{expr}")?;
    }
    Ok(())
}

/// Renders the tree back as source text; special forms print in their
/// surface syntax so that re-reading the output yields an equivalent tree.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Int(n) => write!(f, "{n}"),
            Expr::Ident(sym) => write!(f, "{sym}"),
            Expr::List(items) => {
                write!(f, "(")?;
                write_seq(f, items)?;
                write!(f, ")")
            }
            Expr::Quote(expr) => write!(f, "(quote {expr})"),
            Expr::Define { ident, value } => write!(f, "(define {ident} {value})"),
            Expr::Set { ident, value } => write!(f, "(set! {ident} {value})"),
            Expr::Lambda(lambda) => {
                write!(f, "(lambda (")?;
                for (i, param) in lambda.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") ")?;
                write_seq(f, &lambda.body)?;
                write!(f, ")")
            }
            Expr::Cond(branches) => {
                write!(f, "(cond")?;
                for branch in branches {
                    match &branch.guard {
                        Guard::Test(test) => write!(f, " ({test} ")?,
                        Guard::Else => write!(f, " (else ")?,
                    }
                    write_seq(f, &branch.body)?;
                    write!(f, ")")?;
                }
                write!(f, ")")
            }
        }
    }
}
