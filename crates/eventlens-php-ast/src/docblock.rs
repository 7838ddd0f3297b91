// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Documentation comment parsing.
//!
//! Extracts `@var`, `@param` and `@return` tags from `/** ... */` comments and
//! parses their type expressions.
//!
//! ## Grammar
//!
//! ```text
//! <union>        := <intersection> ("|" <intersection>)*
//! <intersection> := <postfix> ("&" <postfix>)*
//! <postfix>      := <prefix> ("[]")*
//! <prefix>       := "?" <postfix> | "(" <union> ")" | <atom>
//! <atom>         := <name> ["<" <union> ("," <union>)* ">"] [<shape> | <signature>]
//!                 | <quoted string> | <number>
//! ```
//!
//! Array shapes (`array{id: int}`) and callable signatures
//! (`callable(int): void`) are accepted and reduced to their base name.
//! Tool-prefixed tags (`@psalm-var`, `@phpstan-return`) count as their plain
//! counterparts.

use eventlens_core::types::{native_type_name, Type, TypeCollection};
use thiserror::Error;
use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, delimited, opt, preceded, repeat, separated};
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::token::{take_till, take_while};
use winnow::ModalResult;

/// Error type for doc type parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocTypeError {
    /// Invalid type expression.
    #[error("invalid doc type '{input}': {message}")]
    InvalidType { input: String, message: String },
}

// ============================================================================
// Doc Types
// ============================================================================

/// A parsed documentation type expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocType {
    /// A plain (class or native) name as written.
    Named(String),
    /// `?T`
    Nullable(Box<DocType>),
    /// `A|B`
    Union(Vec<DocType>),
    /// `A&B`
    Intersection(Vec<DocType>),
    /// `T[]`
    Array(Box<DocType>),
    /// `Base<A, B>`
    Generic { base: String, args: Vec<DocType> },
}

/// Base names whose generic arguments describe array keys and values.
const ARRAY_LIKE: &[&str] = &[
    "array",
    "list",
    "iterable",
    "non-empty-array",
    "non-empty-list",
];

/// Names that denote strings whatever their arguments.
const STRING_LIKE: &[&str] = &[
    "class-string",
    "non-empty-string",
    "numeric-string",
    "callable-string",
];

/// Names that denote ints whatever their arguments.
const INT_LIKE: &[&str] = &["positive-int", "negative-int", "non-negative-int", "int-mask"];

impl DocType {
    /// Top-level alternatives (`A|B|?C` -> `[A, B, ?C]`).
    pub fn alternatives(&self) -> Vec<&DocType> {
        match self {
            DocType::Union(items) => items.iter().flat_map(DocType::alternatives).collect(),
            other => vec![other],
        }
    }

    /// Lower into a type collection, resolving names with `resolve`.
    ///
    /// `resolve` receives names exactly as written (including `self`,
    /// `static` and `$this`) and maps them to types.
    pub fn lower(&self, resolve: &mut dyn FnMut(&str) -> Type) -> TypeCollection {
        match self {
            DocType::Named(name) => lower_name(name, resolve),
            DocType::Nullable(inner) => {
                let mut types = inner.lower(resolve);
                types.add(Type::null());
                types
            }
            DocType::Union(items) | DocType::Intersection(items) => {
                let mut types = TypeCollection::new();
                for item in items {
                    types.extend(&item.lower(resolve));
                }
                types
            }
            DocType::Array(inner) => inner
                .lower(resolve)
                .iter()
                .cloned()
                .map(Type::array_of)
                .collect(),
            DocType::Generic { base, args } => lower_generic(base, args, resolve),
        }
    }
}

fn lower_name(name: &str, resolve: &mut dyn FnMut(&str) -> Type) -> TypeCollection {
    let lower = name.to_ascii_lowercase();
    if STRING_LIKE.contains(&lower.as_str()) || lower == "literal-string" {
        TypeCollection::singleton(Type::named("string"))
    } else if INT_LIKE.contains(&lower.as_str()) {
        TypeCollection::singleton(Type::named("int"))
    } else if lower == "array-key" {
        [Type::named("int"), Type::named("string")].into_iter().collect()
    } else if ARRAY_LIKE.contains(&lower.as_str()) {
        TypeCollection::singleton(Type::named("array"))
    } else if let Some(native) = native_type_name(name) {
        TypeCollection::singleton(Type::named(native))
    } else {
        TypeCollection::singleton(resolve(name))
    }
}

fn lower_generic(
    base: &str,
    args: &[DocType],
    resolve: &mut dyn FnMut(&str) -> Type,
) -> TypeCollection {
    let lower = base.to_ascii_lowercase();
    if STRING_LIKE.contains(&lower.as_str()) {
        return TypeCollection::singleton(Type::named("string"));
    }
    if INT_LIKE.contains(&lower.as_str()) || lower == "int" {
        return TypeCollection::singleton(Type::named("int"));
    }
    let Some(element_arg) = args.last() else {
        return lower_name(base, resolve);
    };
    let elements = element_arg.lower(resolve);
    let keys = if args.len() >= 2 {
        Some(args[0].lower(resolve))
    } else {
        None
    };

    let mut out = TypeCollection::new();
    if ARRAY_LIKE.contains(&lower.as_str()) {
        for element in elements.iter() {
            match &keys {
                Some(keys) => {
                    for key in keys.iter() {
                        out.add(Type::map_of(key.clone(), element.clone()));
                    }
                }
                None => {
                    out.add(Type::array_of(element.clone()));
                }
            }
        }
        return out;
    }

    let base_type = resolve(base);
    for element in elements.iter() {
        match &keys {
            Some(keys) => {
                for key in keys.iter() {
                    out.add(Type::generic(
                        base_type.clone(),
                        Some(key.clone()),
                        element.clone(),
                    ));
                }
            }
            None => {
                out.add(Type::generic(base_type.clone(), None, element.clone()));
            }
        }
    }
    out
}

/// Parse a complete type expression.
pub fn parse_doc_type(input: &str) -> Result<DocType, DocTypeError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DocTypeError::InvalidType {
            input: input.to_string(),
            message: "empty type".to_string(),
        });
    }
    parse_union
        .parse(input)
        .map_err(|e| DocTypeError::InvalidType {
            input: input.to_string(),
            message: format!("{:?}", e),
        })
}

// ============================================================================
// Doc Blocks
// ============================================================================

/// Kind of a recognized tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocTagKind {
    Var,
    Param,
    Return,
}

/// One recognized tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocTag {
    pub kind: DocTagKind,
    pub ty: DocType,
    /// Variable name without `$`, when the tag names one.
    pub variable: Option<String>,
}

/// Parsed documentation comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocBlock {
    pub tags: Vec<DocTag>,
}

impl DocBlock {
    /// Parse a `/** ... */` comment. Unrecognized tags and unparsable types
    /// are skipped.
    pub fn parse(text: &str) -> Self {
        let body = text
            .trim()
            .trim_start_matches("/**")
            .trim_end_matches("*/");
        let mut tags = Vec::new();
        for raw_line in body.lines() {
            let line = raw_line.trim().trim_start_matches('*').trim();
            let Some(rest) = line.strip_prefix('@') else {
                continue;
            };
            match parse_tag_line(rest) {
                Some(tag) => tags.push(tag),
                None => tracing::trace!(line, "skipped doc tag"),
            }
        }
        DocBlock { tags }
    }

    /// Type of `@var`, for `variable` (or an unnamed `@var` tag).
    pub fn var_type(&self, variable: Option<&str>) -> Option<&DocType> {
        let vars = || self.tags.iter().filter(|t| t.kind == DocTagKind::Var);
        match variable {
            Some(name) => vars()
                .find(|t| t.variable.as_deref() == Some(name))
                .or_else(|| vars().find(|t| t.variable.is_none()))
                .map(|t| &t.ty),
            None => vars().next().map(|t| &t.ty),
        }
    }

    /// `@var` tags that name a variable.
    pub fn named_vars(&self) -> impl Iterator<Item = (&str, &DocType)> {
        self.tags.iter().filter_map(|t| match (&t.kind, &t.variable) {
            (DocTagKind::Var, Some(name)) => Some((name.as_str(), &t.ty)),
            _ => None,
        })
    }

    /// Type of `@param` for parameter `name`.
    pub fn param_type(&self, name: &str) -> Option<&DocType> {
        self.tags
            .iter()
            .find(|t| t.kind == DocTagKind::Param && t.variable.as_deref() == Some(name))
            .map(|t| &t.ty)
    }

    /// Type of `@return`.
    pub fn return_type(&self) -> Option<&DocType> {
        self.tags
            .iter()
            .find(|t| t.kind == DocTagKind::Return)
            .map(|t| &t.ty)
    }
}

fn parse_tag_line(line: &str) -> Option<DocTag> {
    let (name, rest) = line
        .split_once(char::is_whitespace)
        .unwrap_or((line, ""));
    let name = name
        .strip_prefix("psalm-")
        .or_else(|| name.strip_prefix("phpstan-"))
        .unwrap_or(name);
    let kind = match name {
        "var" => DocTagKind::Var,
        "param" => DocTagKind::Param,
        "return" => DocTagKind::Return,
        _ => return None,
    };

    let mut input = rest.trim_start();
    // `@var $x Foo` puts the variable first.
    if input.starts_with('$') && kind == DocTagKind::Var {
        let variable = parse_variable.parse_next(&mut input).ok()?;
        input = input.trim_start();
        let ty = parse_union.parse_next(&mut input).ok()?;
        return Some(DocTag {
            kind,
            ty,
            variable: Some(variable),
        });
    }

    let ty = parse_union.parse_next(&mut input).ok()?;
    let variable = preceded(multispace0, parse_variable)
        .parse_next(&mut input)
        .ok();
    Some(DocTag { kind, ty, variable })
}

// ============================================================================
// Parser implementation using winnow
// ============================================================================

/// Parse a union (lowest precedence).
fn parse_union(input: &mut &str) -> ModalResult<DocType> {
    let first = parse_intersection(input)?;
    let rest: Vec<DocType> = repeat(
        0..,
        preceded((multispace0, '|', multispace0), parse_intersection),
    )
    .parse_next(input)?;

    if rest.is_empty() {
        Ok(first)
    } else {
        let mut all = vec![first];
        all.extend(rest);
        Ok(DocType::Union(all))
    }
}

/// Parse an intersection.
fn parse_intersection(input: &mut &str) -> ModalResult<DocType> {
    let first = parse_postfix(input)?;
    let rest: Vec<DocType> = repeat(0.., preceded(('&', multispace0), parse_postfix))
        .parse_next(input)?;

    if rest.is_empty() {
        Ok(first)
    } else {
        let mut all = vec![first];
        all.extend(rest);
        Ok(DocType::Intersection(all))
    }
}

/// Parse a prefix followed by any number of `[]`.
fn parse_postfix(input: &mut &str) -> ModalResult<DocType> {
    let mut ty = parse_prefix(input)?;
    let dims: Vec<&str> = repeat(0.., "[]").parse_next(input)?;
    for _ in dims {
        ty = DocType::Array(Box::new(ty));
    }
    Ok(ty)
}

/// Parse `?T`, `(T)` or an atom.
fn parse_prefix(input: &mut &str) -> ModalResult<DocType> {
    alt((
        preceded('?', parse_postfix).map(|t| DocType::Nullable(Box::new(t))),
        delimited(('(', multispace0), parse_union, (multispace0, ')')),
        parse_atom,
    ))
    .parse_next(input)
}

/// Parse a name with optional generic arguments, or a literal type.
fn parse_atom(input: &mut &str) -> ModalResult<DocType> {
    alt((
        delimited('\'', take_till(0.., |c| c == '\''), '\'')
            .map(|_| DocType::Named("string".into())),
        delimited('"', take_till(0.., |c| c == '"'), '"').map(|_| DocType::Named("string".into())),
        preceded(opt('-'), digit1).map(|_| DocType::Named("int".into())),
        parse_named,
    ))
    .parse_next(input)
}

fn parse_named(input: &mut &str) -> ModalResult<DocType> {
    let name = parse_name(input)?;
    let args: Option<Vec<DocType>> = opt(delimited(
        ('<', multispace0),
        separated(1.., parse_union, (multispace0, ',', multispace0)),
        (multispace0, '>'),
    ))
    .parse_next(input)?;

    // Shapes and callable signatures only narrow the base name.
    if input.starts_with('{') {
        skip_balanced(input, '{', '}')?;
    } else if input.starts_with('(') && is_callable_name(&name) {
        skip_balanced(input, '(', ')')?;
        let _: Option<DocType> =
            opt(preceded((multispace0, ':', multispace0), parse_postfix)).parse_next(input)?;
    }

    Ok(match args {
        Some(args) => DocType::Generic { base: name, args },
        None => DocType::Named(name),
    })
}

fn is_callable_name(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().trim_start_matches('\\'),
        "callable" | "closure"
    )
}

/// Parse a (possibly qualified) name, `$this` included.
fn parse_name(input: &mut &str) -> ModalResult<String> {
    alt((
        "$this".map(|s: &str| s.to_string()),
        (
            take_while(1, |c: char| c.is_alphabetic() || c == '_' || c == '\\'),
            take_while(0.., |c: char| {
                c.is_alphanumeric() || c == '_' || c == '\\' || c == '-'
            }),
        )
            .map(|(head, tail): (&str, &str)| format!("{}{}", head, tail)),
    ))
    .parse_next(input)
}

/// Parse `$name`, `...$name` or `&$name`, returning the name without `$`.
fn parse_variable(input: &mut &str) -> ModalResult<String> {
    let _ = opt(alt(("...", "&"))).parse_next(input)?;
    preceded(
        '$',
        take_while(1.., |c: char| c.is_alphanumeric() || c == '_'),
    )
    .map(|s: &str| s.to_string())
    .parse_next(input)
}

/// Consume a balanced `open ... close` group.
fn skip_balanced(input: &mut &str, open: char, close: char) -> ModalResult<()> {
    let mut depth = 0usize;
    for (idx, c) in input.char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                *input = &input[idx + c.len_utf8()..];
                return Ok(());
            }
        }
    }
    Err(ErrMode::from_input(input))
}
