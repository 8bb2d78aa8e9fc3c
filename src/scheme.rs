//! S-expression reader.
//!
//! Turns source text into raw [`Expr`] trees made of literals, identifiers
//! and lists. Special forms are not recognised here; `'x` is read as the
//! plain list `(quote x)` and left for [`crate::syntax::expand`].

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0, multispace1, not_line_ending, satisfy},
    combinator::{cut, not, opt, recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::{pair, preceded, terminated},
};

use crate::ast::{Expr, NumberType, SYMBOL_SPECIAL_CHARS, is_valid_symbol};
use crate::intern::intern;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Reader options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Treat `;` as the start of a comment running to end of line
    pub handle_comments: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
        }
    }
}

/// Characters that may continue an atom; an atom must not be followed by one
fn is_atom_char(c: char) -> bool {
    c.is_alphanumeric() || c == '#' || SYMBOL_SPECIAL_CHARS.contains(c)
}

/// Convert nom parsing errors to structured parse errors
fn parse_error_from_nom(source: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = source.len().saturating_sub(e.input.len());
            match e.code {
                ErrorKind::TooLarge => ParseError::with_context(
                    ParseErrorKind::TooDeeplyNested,
                    format!("expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                    source,
                    position,
                ),
                _ if e.input.trim_start().is_empty() => {
                    ParseError::new(ParseErrorKind::Incomplete, "unexpected end of input")
                }
                _ => ParseError::with_context(
                    ParseErrorKind::InvalidSyntax,
                    format!("invalid syntax at position {position}"),
                    source,
                    position,
                ),
            }
        }
        nom::Err::Incomplete(_) => ParseError::new(ParseErrorKind::Incomplete, "incomplete input"),
    }
}

/// Skip whitespace and, if enabled, comments
fn parse_trivia(input: &str, config: ParseConfig) -> IResult<&str, ()> {
    if config.handle_comments {
        value(
            (),
            many0(alt((multispace1, preceded(char(';'), not_line_ending)))),
        )
        .parse(input)
    } else {
        value((), multispace0).parse(input)
    }
}

/// Parse a decimal integer
fn parse_number(input: &str) -> IResult<&str, Expr> {
    let (rest, number_str) = recognize(pair(
        opt(char('-')),
        take_while1(|c: char| c.is_ascii_digit()),
    ))
    .parse(input)?;

    match number_str.parse::<NumberType>() {
        Ok(n) => Ok((rest, Expr::Int(n))),
        // Out of range for NumberType
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Digit,
        ))),
    }
}

/// Parse a boolean (#t or #f)
fn parse_bool(input: &str) -> IResult<&str, Expr> {
    alt((
        value(Expr::Bool(true), tag("#t")),
        value(Expr::Bool(false), tag("#f")),
    ))
    .parse(input)
}

/// Parse an identifier; `true` and `false` read as booleans
fn parse_symbol(input: &str) -> IResult<&str, Expr> {
    let (remaining, candidate) =
        take_while1(|c: char| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
            .parse(input)?;

    match candidate {
        "true" => Ok((remaining, Expr::Bool(true))),
        "false" => Ok((remaining, Expr::Bool(false))),
        _ if is_valid_symbol(candidate) => Ok((remaining, Expr::Ident(intern(candidate)))),
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Alpha,
        ))),
    }
}

/// Parse an atom, which must end at a delimiter
fn parse_atom(input: &str) -> IResult<&str, Expr> {
    terminated(
        alt((parse_number, parse_bool, parse_symbol)),
        not(satisfy(is_atom_char)),
    )
    .parse(input)
}

/// Parse a parenthesised list
fn parse_list(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Expr> {
    let (mut input, _) = char('(').parse(input)?;
    let mut elements = Vec::new();

    loop {
        let (rest, _) = parse_trivia(input, config)?;
        if let Ok((rest, _)) = char::<_, nom::error::Error<&str>>(')').parse(rest) {
            return Ok((rest, Expr::List(elements)));
        }
        // Past the open paren, any failure is final
        let (rest, element) = cut(|input| parse_datum(input, config, depth + 1)).parse(rest)?;
        elements.push(element);
        input = rest;
    }
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Expr> {
    let (input, _) = char('\'').parse(input)?;
    let (input, _) = parse_trivia(input, config)?;
    let (input, datum) = cut(|input| parse_datum(input, config, depth + 1)).parse(input)?;
    Ok((input, Expr::List(vec![Expr::Ident(intern("quote")), datum])))
}

/// Parse one expression starting exactly at `input`
fn parse_datum(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Expr> {
    if depth >= MAX_PARSE_DEPTH {
        // Failure stops `alt` from trying other branches
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    alt((
        |input| parse_quote(input, config, depth),
        |input| parse_list(input, config, depth),
        parse_atom,
    ))
    .parse(input)
}

/// Reads successive expressions from a source text.
///
/// `next_expr` returns `Ok(None)` once only whitespace and comments remain.
/// After a parse error the reader is exhausted.
pub struct Reader<'a> {
    source: &'a str,
    rest: &'a str,
    config: ParseConfig,
}

impl<'a> Reader<'a> {
    pub fn new(source: &'a str, config: ParseConfig) -> Self {
        Reader {
            source,
            rest: source,
            config,
        }
    }

    /// Byte offset of the unread input
    pub fn offset(&self) -> usize {
        self.source.len() - self.rest.len()
    }

    fn skip_trivia(&mut self) -> Result<(), Error> {
        match parse_trivia(self.rest, self.config) {
            Ok((rest, ())) => {
                self.rest = rest;
                Ok(())
            }
            Err(e) => {
                self.rest = "";
                Err(parse_error_from_nom(self.source, e).into())
            }
        }
    }

    pub fn next_expr(&mut self) -> Result<Option<Expr>, Error> {
        self.skip_trivia()?;
        if self.rest.is_empty() {
            return Ok(None);
        }
        match parse_datum(self.rest, self.config, 0) {
            Ok((rest, expr)) => {
                self.rest = rest;
                Ok(Some(expr))
            }
            Err(e) => {
                self.rest = "";
                Err(parse_error_from_nom(self.source, e).into())
            }
        }
    }
}

impl Iterator for Reader<'_> {
    type Item = Result<Expr, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_expr().transpose()
    }
}

/// Parse exactly one expression; anything but trivia after it is an error.
pub fn parse_scheme(input: &str) -> Result<Expr, Error> {
    parse_scheme_with(input, ParseConfig::default())
}

pub fn parse_scheme_with(input: &str, config: ParseConfig) -> Result<Expr, Error> {
    let mut reader = Reader::new(input, config);
    let Some(expr) = reader.next_expr()? else {
        return Err(ParseError::new(ParseErrorKind::Incomplete, "no expression found").into());
    };

    reader.skip_trivia()?;
    if !reader.rest.is_empty() {
        return Err(ParseError::with_context(
            ParseErrorKind::TrailingContent,
            "unexpected content after expression",
            input,
            reader.offset(),
        )
        .into());
    }
    Ok(expr)
}
