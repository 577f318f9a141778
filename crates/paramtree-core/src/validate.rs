//! Leaf value validation against a declared type and restriction set.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// Validity state of a tree node.
///
/// Only leaves are ever `Invalid`; branches are either `Valid` or `Unset`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Validity {
    /// Not yet answered, disabled, or incomplete below this node.
    #[default]
    Unset,
    Valid,
    /// Rejected value together with the message shown next to the leaf.
    Invalid(String),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Validity::Invalid(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Validity::Invalid(message) => Some(message),
            _ => None,
        }
    }

    fn invalid<S: Into<String>>(message: S) -> Self {
        Validity::Invalid(message.into())
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validity::Unset => write!(f, "unset"),
            Validity::Valid => write!(f, "valid"),
            Validity::Invalid(message) => write!(f, "invalid: {message}"),
        }
    }
}

/// Primitive value types a leaf can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Double,
    Float,
    Integer,
    PositiveInteger,
    Boolean,
    String,
    File,
    /// Whitespace separated integers.
    IntegerList,
    /// Whitespace separated numbers.
    RealList,
    /// Whitespace separated words.
    StringList,
}

impl ValueType {
    /// Map a declared type name (`xs:double`, `integerList`, ...) to a type.
    pub fn from_decl(name: &str) -> Option<Self> {
        let bare = name.strip_prefix("xs:").unwrap_or(name);
        let value_type = match bare {
            "double" => ValueType::Double,
            "float" => ValueType::Float,
            "integer" => ValueType::Integer,
            "positiveInteger" => ValueType::PositiveInteger,
            "boolean" => ValueType::Boolean,
            "string" => ValueType::String,
            "file" => ValueType::File,
            "integerList" => ValueType::IntegerList,
            "realList" => ValueType::RealList,
            "stringList" => ValueType::StringList,
            _ => return None,
        };
        Some(value_type)
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            ValueType::IntegerList | ValueType::RealList | ValueType::StringList
        )
    }
}

/// Restriction facets attached to a leaf, kept in declaration order.
///
/// Restriction data is only interpreted while validating; data that cannot be
/// interpreted makes the leaf invalid rather than failing the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestrictionSet {
    entries: Vec<(String, Value)>,
    malformed: Option<String>,
}

impl RestrictionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a facet such as `xs:maxInclusive`.
    pub fn with<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    /// Read a flat JSON object of facets.
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<Map<String, Value>>(raw) {
            Ok(map) => Self {
                entries: map.into_iter().collect(),
                malformed: None,
            },
            Err(err) => Self {
                entries: Vec::new(),
                malformed: Some(format!("unreadable restrictions: {err}")),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.malformed.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }
}

/// Restriction data that could not be interpreted.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
struct RestrictionError(String);

/// Validate a raw leaf value.
///
/// Empty input is `Unset`, never `Invalid`. Restrictions are only checked once
/// the type check passed; every failing restriction overwrites the verdict,
/// so the last failure in declaration order supplies the message.
pub fn validate_leaf(
    raw: &str,
    value_type: ValueType,
    restrictions: Option<&RestrictionSet>,
) -> Validity {
    match evaluate(raw, value_type, restrictions) {
        Ok(validity) => validity,
        Err(err) => Validity::invalid(format!(
            "A problem occurred validating this parameter: {err}"
        )),
    }
}

fn evaluate(
    raw: &str,
    value_type: ValueType,
    restrictions: Option<&RestrictionSet>,
) -> Result<Validity, RestrictionError> {
    if raw.is_empty() {
        return Ok(Validity::Unset);
    }
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let verdict = check_type(raw, &tokens, value_type);
    if !verdict.is_valid() {
        return Ok(verdict);
    }
    let Some(restrictions) = restrictions else {
        return Ok(verdict);
    };
    if let Some(reason) = &restrictions.malformed {
        return Err(RestrictionError(reason.clone()));
    }

    let mut verdict = Validity::Valid;
    for (key, bound) in restrictions.iter() {
        if let Some(message) = check_restriction(raw, &tokens, value_type, key, bound)? {
            verdict = Validity::invalid(message);
        }
    }
    Ok(verdict)
}

fn check_type(raw: &str, tokens: &[&str], value_type: ValueType) -> Validity {
    match value_type {
        ValueType::Double => expect(
            parse_number(raw).is_some(),
            "A double value is required for this parameter.",
        ),
        ValueType::Float => expect(
            parse_number(raw).is_some(),
            "A floating point value is required for this parameter.",
        ),
        ValueType::Integer => expect(
            is_integer(raw),
            "An integer value is required for this parameter.",
        ),
        ValueType::PositiveInteger => {
            // The digit check already excludes signs; the numeric check is kept alongside it.
            let digits = raw.bytes().all(|b| b.is_ascii_digit());
            let positive = parse_number(raw).map_or(false, |value| value > 0.0);
            expect(
                digits && positive,
                "A positive integer value is required for this parameter.",
            )
        }
        ValueType::Boolean => expect(
            raw == "true" || raw == "false",
            r#"A boolean value ("true" or "false") is required for this parameter."#,
        ),
        ValueType::String | ValueType::File => Validity::Valid,
        ValueType::IntegerList | ValueType::RealList | ValueType::StringList => {
            check_list(tokens, value_type)
        }
    }
}

fn check_list(tokens: &[&str], value_type: ValueType) -> Validity {
    if tokens.is_empty() {
        return Validity::Unset;
    }
    let failing = match value_type {
        ValueType::IntegerList => tokens
            .iter()
            .find(|token| !is_integer(token))
            .map(|_| "The items in the list must be integers."),
        ValueType::RealList => tokens
            .iter()
            .find(|token| parse_number(token).is_none())
            .map(|_| "The items in the list must be numbers."),
        _ => None,
    };
    match failing {
        Some(message) => Validity::invalid(message),
        None => Validity::Valid,
    }
}

fn check_restriction(
    raw: &str,
    tokens: &[&str],
    value_type: ValueType,
    key: &str,
    bound: &Value,
) -> Result<Option<String>, RestrictionError> {
    let message = match key {
        "xs:minExclusive" | "xs:maxExclusive" | "xs:minInclusive" | "xs:maxInclusive" => {
            let limit = numeric_bound(key, bound)?;
            // Non-numeric values are not compared against numeric bounds.
            let Some(value) = parse_number(raw) else {
                return Ok(None);
            };
            let (failed, relation) = match key {
                "xs:minExclusive" => (value <= limit, "greater than"),
                "xs:maxExclusive" => (value >= limit, "less than"),
                "xs:minInclusive" => (value < limit, "greater than or equal to"),
                _ => (value > limit, "less than or equal to"),
            };
            failed.then(|| {
                format!(
                    "A value {relation} {} is required for this parameter",
                    display_bound(bound)
                )
            })
        }
        "xs:enumeration" => {
            let allowed = string_list(key, bound)?;
            (!allowed.iter().any(|item| item == raw)).then(|| {
                format!(
                    "This property must have a value from the list: {}",
                    allowed.join(",")
                )
            })
        }
        "xs:filetype" => {
            let allowed = string_list(key, bound)?;
            let extension = raw.rsplit('.').next().unwrap_or_default().to_lowercase();
            let found = !extension.is_empty()
                && allowed
                    .iter()
                    .any(|item| item.to_lowercase() == extension);
            (!found).then(|| {
                format!(
                    "The filename must have an extension from the list: {}",
                    allowed.join(",")
                )
            })
        }
        "xs:length" | "xs:minlength" if value_type.is_list() => {
            let limit = numeric_bound(key, bound)?;
            let count = tokens.len() as f64;
            if key == "xs:length" {
                (count != limit).then(|| {
                    format!(
                        "There must be exactly {} items in the list.",
                        display_bound(bound)
                    )
                })
            } else {
                (count < limit).then(|| {
                    format!(
                        "There must be at least {} items in the list.",
                        display_bound(bound)
                    )
                })
            }
        }
        _ => None,
    };
    Ok(message)
}

/// Parse a trimmed decimal number, rejecting infinities and NaN.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// A value is an integer when it is numeric and has no fractional part.
pub fn is_integer(raw: &str) -> bool {
    parse_number(raw).map_or(false, |value| value.fract() == 0.0)
}

fn expect(ok: bool, message: &str) -> Validity {
    if ok {
        Validity::Valid
    } else {
        Validity::invalid(message)
    }
}

fn numeric_bound(key: &str, bound: &Value) -> Result<f64, RestrictionError> {
    let number = match bound {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_number(text),
        _ => None,
    };
    number.ok_or_else(|| RestrictionError(format!("{key} bound {bound} is not numeric")))
}

fn string_list(key: &str, bound: &Value) -> Result<Vec<String>, RestrictionError> {
    match bound {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => Ok(text.clone()),
                Value::Number(number) => Ok(number.to_string()),
                other => Err(RestrictionError(format!(
                    "{key} entry {other} is not a literal"
                ))),
            })
            .collect(),
        Value::String(text) => Ok(vec![text.clone()]),
        other => Err(RestrictionError(format!("{key} expects a list, got {other}"))),
    }
}

fn display_bound(bound: &Value) -> String {
    match bound {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
