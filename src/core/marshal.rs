//! Type-directed conversion between raw JSON trees and typed documents.
//!
//! [`to_typed`] and [`to_raw`] are the load-time and save-time halves of
//! every bound-document access; no other module performs coercion.

use crate::core::error::VaultError;
use crate::core::schema::{Document, Shape};
use serde_json::Value;

/// Rebuilds a typed document from a raw JSON tree.
///
/// The tree is conformance-checked against `D::shape()` before any
/// construction happens, so a mismatch never yields a partial value.
pub fn to_typed<D: Document>(raw: &Value) -> Result<D, VaultError> {
    conform(raw, &D::shape(), "$")?;
    serde_json::from_value(raw.clone())
        .map_err(|err| VaultError::SchemaMismatch(format!("$: {}", err)))
}

/// Lowers a typed document (or sequence of documents) back to its raw
/// JSON tree. Primitives pass through unchanged.
pub fn to_raw<D: Document>(doc: &D) -> Result<Value, VaultError> {
    serde_json::to_value(doc)
        .map_err(|err| VaultError::SchemaMismatch(format!("$: {}", err)))
}

/// Recursive shape check, reporting the first offending location in
/// `$.field[index]` form.
pub fn conform(value: &Value, shape: &Shape, at: &str) -> Result<(), VaultError> {
    match shape {
        Shape::Bool if value.is_boolean() => Ok(()),
        Shape::Int if value.is_i64() || value.is_u64() => Ok(()),
        Shape::Float if value.is_f64() => Ok(()),
        Shape::Str if value.is_string() => Ok(()),
        Shape::Optional(inner) => {
            if value.is_null() {
                Ok(())
            } else {
                conform(value, inner, at)
            }
        }
        Shape::Seq(elem) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    conform(item, elem, &format!("{}[{}]", at, i))?;
                }
                Ok(())
            }
            None => Err(mismatch(at, shape, value)),
        },
        Shape::Node(node) => match value.as_object() {
            Some(map) => {
                for field in &node.fields {
                    match map.get(field.name) {
                        Some(inner) => {
                            conform(inner, &field.shape, &format!("{}.{}", at, field.name))?
                        }
                        None => {
                            return Err(VaultError::SchemaMismatch(format!(
                                "{}: missing declared field `{}` of `{}`",
                                at, field.name, node.name
                            )));
                        }
                    }
                }
                for key in map.keys() {
                    if !node.fields.iter().any(|f| f.name == key) {
                        return Err(VaultError::SchemaMismatch(format!(
                            "{}: field `{}` is not declared by `{}`",
                            at, key, node.name
                        )));
                    }
                }
                Ok(())
            }
            None => Err(mismatch(at, shape, value)),
        },
        _ => Err(mismatch(at, shape, value)),
    }
}

fn mismatch(at: &str, shape: &Shape, value: &Value) -> VaultError {
    VaultError::SchemaMismatch(format!(
        "{}: expected {}, found {}",
        at,
        shape.describe(),
        found(value)
    ))
}

fn found(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
