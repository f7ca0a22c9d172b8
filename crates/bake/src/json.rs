//! JSON encoding of bake files
//!
//! The JSON form mirrors the block syntax:
//! ```json
//! {
//!   "FOO": "abc",
//!   "variable": { "BAR": { "default": "def" } },
//!   "target": { "app": { "args": { "v1": "pre-${FOO}-${BAR}" } } }
//! }
//! ```
//! Block collections may also be written as arrays of label objects, and each label may map to an
//! array of bodies (`{"target": [{"app": [{...}]}]}`).
//!
//! Strings are templates. A string consisting of a single `${...}` interpolation evaluates to the
//! interpolated value itself, see [crate::eval].
use crate::documents::{parse_error, BlockKind, Item, RawAttribute, RawBlock};
use crate::error::{ErrorKind, Location, Position, Range, Result};
use hcl::expr::{Expression, ObjectKey, TemplateExpr};
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::str::FromStr;

pub(crate) fn parse(text: &str, file: &str) -> Result<Vec<Item>> {
    let location = Location::new(file.to_string(), None);

    let root: Json = serde_json::from_str(text).map_err(|err| {
        let position = Position {
            line: err.line(),
            column: err.column(),
        };
        crate::Error::new(ErrorKind::Parse(err.to_string())).at(Some(&Location::new(
            file.to_string(),
            Some(Range {
                start: position,
                end: position,
            }),
        )))
    })?;

    let Json::Object(root) = root else {
        return Err(parse_error(
            "top-level JSON value must be an object".to_string(),
            &location,
        ));
    };

    let mut items = vec![];
    for (key, value) in root {
        match BlockKind::from_ident(&key) {
            Some(kind) => collection(kind, value, &location, &mut items)?,
            None => items.push(Item::Attribute(RawAttribute {
                expr: expression(value, &location)?,
                key,
                location: location.clone(),
            })),
        }
    }

    Ok(items)
}

/// `{"NAME": BODY, ...}` or `[{"NAME": BODY}, ...]`
fn collection(
    kind: BlockKind,
    value: Json,
    location: &Location,
    items: &mut Vec<Item>,
) -> Result<()> {
    match value {
        Json::Object(labels) => {
            for (name, body) in labels {
                bodies(kind, name, body, location, items)?;
            }
            Ok(())
        }
        Json::Array(elements) => {
            for element in elements {
                let Json::Object(_) = element else {
                    return Err(parse_error(
                        format!("{} collection entries must be objects", kind.as_str()),
                        location,
                    ));
                };
                collection(kind, element, location, items)?;
            }
            Ok(())
        }
        _ => Err(parse_error(
            format!("{} must be an object or an array of objects", kind.as_str()),
            location,
        )),
    }
}

/// `{...}` or `[{...}, ...]`
fn bodies(
    kind: BlockKind,
    name: String,
    value: Json,
    location: &Location,
    items: &mut Vec<Item>,
) -> Result<()> {
    match value {
        Json::Object(body) => {
            let mut attributes = IndexMap::new();
            for (key, value) in body {
                attributes.insert(
                    key.clone(),
                    RawAttribute {
                        expr: expression(value, location)?,
                        key,
                        location: location.clone(),
                    },
                );
            }

            items.push(Item::Block(RawBlock {
                kind,
                name,
                attributes,
                location: location.clone(),
            }));
            Ok(())
        }
        Json::Array(elements) => {
            for element in elements {
                bodies(kind, name.clone(), element, location, items)?;
            }
            Ok(())
        }
        _ => Err(parse_error(
            format!("body of {} {name:?} must be an object", kind.as_str()),
            location,
        )),
    }
}

fn expression(value: Json, location: &Location) -> Result<Expression> {
    Ok(match value {
        Json::Null => Expression::Null,
        Json::Bool(b) => Expression::Bool(b),
        Json::Number(n) => {
            let number = if let Some(int) = n.as_i64() {
                hcl::Number::from(int)
            } else if let Some(uint) = n.as_u64() {
                hcl::Number::from(uint)
            } else {
                n.as_f64()
                    .and_then(hcl::Number::from_f64)
                    .ok_or_else(|| parse_error(format!("invalid number {n}"), location))?
            };
            Expression::Number(number)
        }
        Json::String(s) => string_expression(s, location)?,
        Json::Array(elements) => Expression::Array(
            elements
                .into_iter()
                .map(|element| expression(element, location))
                .collect::<Result<_>>()?,
        ),
        Json::Object(object) => Expression::Object(
            object
                .into_iter()
                .map(|(key, value)| {
                    Ok((
                        ObjectKey::Expression(Expression::String(key)),
                        expression(value, location)?,
                    ))
                })
                .collect::<Result<_>>()?,
        ),
    })
}

fn string_expression(s: String, location: &Location) -> Result<Expression> {
    if !s.contains("${") && !s.contains("%{") {
        return Ok(Expression::String(s));
    }

    // validate now so a broken template is reported as a parse error of this file
    hcl::Template::from_str(&s)
        .map_err(|err| parse_error(format!("invalid template {s:?}: {err}"), location))?;

    Ok(Expression::TemplateExpr(Box::new(TemplateExpr::QuotedString(s))))
}
