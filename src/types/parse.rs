//! Type expression parser
//!
//! Two passes: the grammar below produces a raw, unresolved tree; names are
//! then resolved against the caller's kind lookup.
//!
//! ```text
//! type     := name generics? suffix*
//! name     := [A-Za-z_][A-Za-z0-9_.]*
//! generics := '<' type (',' type)* '>'
//! suffix   := '?' | '[' ']'
//! ```

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, multispace0},
    combinator::{all_consuming, cut, map, opt, recognize, value},
    error::{context, ContextError, ParseError as NomParseError, VerboseError, VerboseErrorKind},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::{
    PrimitiveKind, TypeDescriptor, TypeKind, TypeParseError, COLLECTION, ENUMERABLE, HASH_SET,
    LIST, LIST_CONTRACT, READ_ONLY_LIST,
};

const NAME: &str = "type name";
const GENERICS: &str = "generic arguments";
const ARRAY_RANK: &str = "array brackets";

// ============================================================================
// Public API
// ============================================================================

/// Parse and resolve a type expression.
pub(super) fn parse_type_expr(
    expr: &str,
    kind_of: &dyn Fn(&str) -> Option<TypeKind>,
) -> Result<TypeDescriptor, TypeParseError> {
    let raw = match all_consuming(delimited(
        multispace0::<_, VerboseError<&str>>,
        type_expr,
        multispace0,
    ))(expr)
    {
        Ok((_, raw)) => raw,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => return Err(syntax_error(expr, e)),
        Err(nom::Err::Incomplete(_)) => {
            return Err(TypeParseError::Trailing {
                expr: expr.to_string(),
                pos: expr.len(),
            })
        }
    };
    raw.resolve(kind_of)
}

/// Map the innermost labelled failure onto [`TypeParseError`].
fn syntax_error(expr: &str, e: VerboseError<&str>) -> TypeParseError {
    let pos = e
        .errors
        .first()
        .map(|(rest, _)| expr.len() - rest.len())
        .unwrap_or(0);
    let label = e.errors.iter().find_map(|(_, kind)| match kind {
        VerboseErrorKind::Context(label) => Some(*label),
        _ => None,
    });
    let expr = expr.to_string();
    match label {
        Some(NAME) => TypeParseError::ExpectedName { expr, pos },
        Some(GENERICS) => TypeParseError::UnclosedGeneric(expr),
        _ => TypeParseError::Trailing { expr, pos },
    }
}

// ============================================================================
// Raw tree
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suffix {
    Nullable,
    Array,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RawType<'a> {
    name: &'a str,
    args: Vec<RawType<'a>>,
    suffixes: Vec<Suffix>,
}

impl RawType<'_> {
    fn resolve(
        &self,
        kind_of: &dyn Fn(&str) -> Option<TypeKind>,
    ) -> Result<TypeDescriptor, TypeParseError> {
        let name = collection_alias(self.name).unwrap_or(self.name);
        let args = self
            .args
            .iter()
            .map(|arg| arg.resolve(kind_of))
            .collect::<Result<Vec<_>, _>>()?;

        let mut ty = match PrimitiveKind::from_name(name) {
            Some(kind) if args.is_empty() => TypeDescriptor::primitive(kind),
            _ => {
                let kind =
                    kind_of(name).ok_or_else(|| TypeParseError::UnknownType(name.to_string()))?;
                TypeDescriptor::generic(name, kind, args)
            }
        };
        for suffix in &self.suffixes {
            match suffix {
                Suffix::Nullable => ty.nullable = true,
                Suffix::Array => ty = TypeDescriptor::array_of(ty),
            }
        }
        Ok(ty)
    }
}

/// Short names accepted for the built-in generic collection shapes.
fn collection_alias(name: &str) -> Option<&'static str> {
    Some(match name {
        "IEnumerable" => ENUMERABLE,
        "ICollection" => COLLECTION,
        "IList" => LIST_CONTRACT,
        "IReadOnlyList" => READ_ONLY_LIST,
        "List" => LIST,
        "HashSet" => HASH_SET,
        _ => return None,
    })
}

// ============================================================================
// Internal Parsers
// ============================================================================

fn type_expr<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RawType<'a>, E> {
    map(
        tuple((
            preceded(multispace0, type_name),
            opt(generic_args),
            many0(suffix),
        )),
        |(name, args, suffixes)| RawType {
            name,
            args: args.unwrap_or_default(),
            suffixes,
        },
    )(input)
}

fn type_name<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, &'a str, E> {
    context(
        NAME,
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_"), tag(".")))),
        )),
    )(input)
}

fn generic_args<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Vec<RawType<'a>>, E> {
    context(
        GENERICS,
        preceded(
            symbol('<'),
            cut(terminated(
                separated_list1(symbol(','), type_expr),
                symbol('>'),
            )),
        ),
    )(input)
}

fn suffix<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Suffix, E> {
    alt((
        value(Suffix::Nullable, symbol('?')),
        value(
            Suffix::Array,
            pair(symbol('['), cut(context(ARRAY_RANK, symbol(']')))),
        ),
    ))(input)
}

/// A single punctuation character with optional leading whitespace.
fn symbol<'a, E: NomParseError<&'a str>>(c: char) -> impl FnMut(&'a str) -> IResult<&'a str, char, E> {
    preceded(multispace0, char(c))
}
