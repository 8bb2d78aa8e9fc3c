//! Special-form expansion.
//!
//! [`expand`] rewrites raw lists headed by one of the [`KEYWORDS`] into the
//! typed [`Expr`] variants the evaluator dispatches on. Malformed forms are
//! rejected here with [`Error::Syntax`], so the evaluator never re-checks
//! their shape.

use crate::Error;
use crate::ast::{Branch, Expr, Guard, Lambda};
use crate::intern::Symbol;
use std::collections::HashSet;
use std::rc::Rc;

/// Identifiers that introduce special forms
pub const KEYWORDS: &[&str] = &["define", "set!", "lambda", "cond", "quote"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Define,
    Set,
    Lambda,
    Cond,
    Quote,
}

impl Keyword {
    fn from_symbol(sym: Symbol) -> Option<Self> {
        sym.with_name(|name| match name {
            "define" => Some(Keyword::Define),
            "set!" => Some(Keyword::Set),
            "lambda" => Some(Keyword::Lambda),
            "cond" => Some(Keyword::Cond),
            "quote" => Some(Keyword::Quote),
            _ => None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Keyword::Define => "define",
            Keyword::Set => "set!",
            Keyword::Lambda => "lambda",
            Keyword::Cond => "cond",
            Keyword::Quote => "quote",
        }
    }

    fn usage(self) -> &'static str {
        match self {
            Keyword::Define => "(define <id> <value>)",
            Keyword::Set => "(set! <id> <value>)",
            Keyword::Lambda => "(lambda (<id> ...) <body> ...)",
            Keyword::Cond => "(cond (<condition> <body> ...) ...)",
            Keyword::Quote => "(quote <datum>)",
        }
    }

    fn bad_syntax(self) -> Error {
        Error::Syntax {
            form: self.name(),
            usage: self.usage(),
        }
    }
}

/// Check if an identifier names a special form
pub fn is_keyword(sym: Symbol) -> bool {
    Keyword::from_symbol(sym).is_some()
}

/// An identifier usable as a variable name
fn variable(expr: &Expr, form: Keyword) -> Result<Symbol, Error> {
    match expr.as_ident() {
        Some(sym) if !is_keyword(sym) => Ok(sym),
        _ => Err(form.bad_syntax()),
    }
}

/// Expand every special form in `expr`.
///
/// Quoted data is left as read. Typed nodes are walked again, so expanding an
/// already expanded tree returns an equal tree.
pub fn expand(expr: &Expr) -> Result<Expr, Error> {
    match expr {
        Expr::Bool(_) | Expr::Int(_) | Expr::Quote(_) => Ok(expr.clone()),
        Expr::Ident(sym) => match Keyword::from_symbol(*sym) {
            Some(keyword) => Err(keyword.bad_syntax()),
            None => Ok(expr.clone()),
        },
        Expr::List(items) => {
            let head_keyword = items
                .first()
                .and_then(Expr::as_ident)
                .and_then(Keyword::from_symbol);
            match head_keyword {
                Some(keyword) => expand_form(keyword, &items[1..]),
                None => Ok(Expr::List(expand_all(items)?)),
            }
        }
        Expr::Define { ident, value } => Ok(Expr::Define {
            ident: *ident,
            value: Box::new(expand_value(value, Keyword::Define)?),
        }),
        Expr::Set { ident, value } => Ok(Expr::Set {
            ident: *ident,
            value: Box::new(expand_value(value, Keyword::Set)?),
        }),
        Expr::Lambda(lambda) => Ok(Expr::Lambda(Rc::new(Lambda {
            params: lambda.params.clone(),
            body: expand_all(&lambda.body)?,
        }))),
        Expr::Cond(branches) => branches
            .iter()
            .map(|branch| {
                let guard = match &branch.guard {
                    Guard::Test(test) => Guard::Test(expand(test)?),
                    Guard::Else => Guard::Else,
                };
                Ok(Branch {
                    guard,
                    body: expand_all(&branch.body)?,
                })
            })
            .collect::<Result<_, Error>>()
            .map(Expr::Cond),
    }
}

fn expand_all(exprs: &[Expr]) -> Result<Vec<Expr>, Error> {
    exprs.iter().map(expand).collect()
}

/// Expand the value of a `define` or `set!`; a nested definition has no value
fn expand_value(value: &Expr, form: Keyword) -> Result<Expr, Error> {
    match expand(value)? {
        Expr::Define { .. } => Err(form.bad_syntax()),
        expanded => Ok(expanded),
    }
}

/// Build the typed node for `(keyword args...)`
fn expand_form(keyword: Keyword, args: &[Expr]) -> Result<Expr, Error> {
    match keyword {
        Keyword::Quote => match args {
            [datum] => Ok(Expr::Quote(Box::new(datum.clone()))),
            _ => Err(keyword.bad_syntax()),
        },
        Keyword::Define | Keyword::Set => {
            let [name, value] = args else {
                return Err(keyword.bad_syntax());
            };
            let ident = variable(name, keyword)?;
            let value = Box::new(expand_value(value, keyword)?);
            Ok(if keyword == Keyword::Define {
                Expr::Define { ident, value }
            } else {
                Expr::Set { ident, value }
            })
        }
        Keyword::Lambda => {
            let [Expr::List(param_list), body @ ..] = args else {
                return Err(keyword.bad_syntax());
            };
            if body.is_empty() {
                return Err(keyword.bad_syntax());
            }

            let mut seen = HashSet::new();
            let params = param_list
                .iter()
                .map(|param| {
                    let sym = variable(param, keyword)?;
                    if seen.insert(sym) {
                        Ok(sym)
                    } else {
                        Err(keyword.bad_syntax())
                    }
                })
                .collect::<Result<Vec<_>, Error>>()?;

            Ok(Expr::Lambda(Rc::new(Lambda {
                params,
                body: expand_all(body)?,
            })))
        }
        Keyword::Cond => {
            let mut branches = Vec::with_capacity(args.len());
            for (i, clause) in args.iter().enumerate() {
                let Expr::List(parts) = clause else {
                    return Err(keyword.bad_syntax());
                };
                let [head, body @ ..] = parts.as_slice() else {
                    return Err(keyword.bad_syntax());
                };
                if body.is_empty() {
                    return Err(keyword.bad_syntax());
                }

                let is_else = head
                    .as_ident()
                    .is_some_and(|sym| sym.with_name(|name| name == "else"));
                let guard = if is_else {
                    // else only in the final clause
                    if i + 1 != args.len() {
                        return Err(keyword.bad_syntax());
                    }
                    Guard::Else
                } else {
                    Guard::Test(expand(head)?)
                };

                branches.push(Branch {
                    guard,
                    body: expand_all(body)?,
                });
            }
            Ok(Expr::Cond(branches))
        }
    }
}
