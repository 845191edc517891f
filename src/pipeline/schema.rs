use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::error::ApiError;

/// Declared field type, with coercion rules for values arriving as query
/// strings.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Non-empty text up to `max_len` characters
    Text { max_len: usize },
    /// URL-safe slug: lowercase letters, digits and hyphens only
    Slug { max_len: usize },
    /// Integer within an inclusive range; numeric strings are coerced
    Int { min: i64, max: i64 },
    /// One of a fixed set of lowercase tokens
    Enum(&'static [&'static str]),
    /// Boolean; "true"/"false" strings are coerced
    Bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// A declared payload shape. Validation returns a new object holding only
/// the declared fields, coerced; undeclared fields are dropped. All field
/// failures are collected into one structured error.
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub fields: &'static [Field],
}

impl Shape {
    pub fn validate(&self, payload: &Value) -> Result<Value, ApiError> {
        let empty = Map::new();
        let object = match payload {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(ApiError::bad_request("Request payload must be a JSON object"));
            }
        };

        let mut output = Map::new();
        let mut field_errors: HashMap<String, String> = HashMap::new();

        for field in self.fields {
            match object.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        field_errors
                            .insert(field.name.to_string(), "This field is required".to_string());
                    }
                }
                Some(value) => match coerce(value, field.kind) {
                    Ok(coerced) => {
                        output.insert(field.name.to_string(), coerced);
                    }
                    Err(msg) => {
                        field_errors.insert(field.name.to_string(), msg);
                    }
                },
            }
        }

        if field_errors.is_empty() {
            Ok(Value::Object(output))
        } else {
            Err(ApiError::validation_error("Invalid input", field_errors))
        }
    }
}

fn coerce(value: &Value, kind: FieldKind) -> Result<Value, String> {
    match kind {
        FieldKind::Text { max_len } => {
            let text = value.as_str().ok_or_else(|| "Must be a string".to_string())?;
            if text.trim().is_empty() {
                return Err("Must not be empty".to_string());
            }
            if text.chars().count() > max_len {
                return Err(format!("Must be at most {} characters", max_len));
            }
            Ok(Value::String(text.to_string()))
        }
        FieldKind::Slug { max_len } => {
            let slug = value.as_str().ok_or_else(|| "Must be a string".to_string())?;
            if slug.is_empty() {
                return Err("Must not be empty".to_string());
            }
            if slug.chars().count() > max_len {
                return Err(format!("Must be at most {} characters", max_len));
            }
            if !slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            {
                return Err(
                    "Must contain only lowercase letters, digits and hyphens".to_string()
                );
            }
            Ok(Value::String(slug.to_string()))
        }
        FieldKind::Int { min, max } => {
            let n = match value {
                Value::Number(n) => n.as_i64().ok_or_else(|| "Must be an integer".to_string())?,
                Value::String(s) => {
                    s.trim().parse::<i64>().map_err(|_| "Must be an integer".to_string())?
                }
                _ => return Err("Must be an integer".to_string()),
            };
            if n < min || n > max {
                return Err(format!("Must be between {} and {}", min, max));
            }
            Ok(json!(n))
        }
        FieldKind::Enum(allowed) => {
            let token = value.as_str().ok_or_else(|| "Must be a string".to_string())?;
            if allowed.contains(&token) {
                Ok(Value::String(token.to_string()))
            } else {
                Err(format!("Must be one of: {}", allowed.join(", ")))
            }
        }
        FieldKind::Bool => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err("Must be a boolean".to_string()),
            },
            _ => Err("Must be a boolean".to_string()),
        },
    }
}
