//! Policy document model and shape validation
//!
//! A policy document is a key-value record declaring typed variables,
//! constants, named invariants, and guarded actions. [`validate_document`]
//! checks the minimum shape over raw JSON before deserialization so that a
//! malformed document fails with one message naming the offending field.

use crate::facts::Scalar;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Document-shape error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("{0} must be a string")]
    NotAString(&'static str),

    #[error("{0} must be a mapping")]
    NotAMapping(&'static str),

    #[error("{0} must be a sequence")]
    NotASequence(&'static str),

    #[error("{0} must be a boolean")]
    NotABoolean(&'static str),

    #[error("{list}[{index}] missing key: {key}")]
    MissingKey { list: &'static str, index: usize, key: &'static str },

    #[error("{list}[{index}].{key} must be a string")]
    KeyNotAString { list: &'static str, index: usize, key: &'static str },

    #[error("entity list {0} must contain only strings")]
    EntityNotAString(&'static str),

    #[error("constant `{0}` must be a primitive value")]
    ConstantNotPrimitive(String),

    #[error("invalid policy JSON: {0}")]
    Json(String),
}

/// Declared variable names, grouped by type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(rename = "Reals", default, skip_serializing_if = "Vec::is_empty")]
    pub reals: Vec<String>,

    #[serde(rename = "Ints", default, skip_serializing_if = "Vec::is_empty")]
    pub ints: Vec<String>,

    #[serde(rename = "Bools", default, skip_serializing_if = "Vec::is_empty")]
    pub bools: Vec<String>,
}

/// A named boolean assertion that must hold in any accepted decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invariant {
    pub name: String,
    #[serde(rename = "assert")]
    pub assertion: String,
}

/// A named action choice with a guard expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDef {
    pub name: String,
    pub guard: String,
}

/// A declarative policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Unique version identifier
    pub id: String,

    #[serde(default)]
    pub entities: Entities,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constants: BTreeMap<String, Scalar>,

    pub invariants: Vec<Invariant>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionDef>,

    #[serde(default)]
    pub one_hot_actions: bool,
}

impl PolicyDocument {
    /// Parse and shape-validate a policy document from JSON text
    pub fn from_json_str(text: &str) -> Result<Self, DocumentError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| DocumentError::Json(e.to_string()))?;
        Self::from_value(value)
    }

    /// Shape-validate and deserialize a policy document from a JSON value
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        validate_document(&value)?;
        serde_json::from_value(value).map_err(|e| DocumentError::Json(e.to_string()))
    }
}

/// Validate the minimum shape of a policy document before any parsing.
///
/// Required fields: `id`, `entities`, `invariants`. Each invariant and action
/// must carry both of its required keys. Fails with one message naming the
/// missing or ill-typed field.
pub fn validate_document(doc: &Value) -> Result<(), DocumentError> {
    let obj = match doc.as_object() {
        Some(obj) => obj,
        None => return Err(DocumentError::NotAMapping("policy document")),
    };

    for field in ["id", "entities", "invariants"] {
        if !obj.contains_key(field) {
            return Err(DocumentError::MissingField(field));
        }
    }

    if !obj["id"].is_string() {
        return Err(DocumentError::NotAString("id"));
    }

    let entities = match obj["entities"].as_object() {
        Some(entities) => entities,
        None => return Err(DocumentError::NotAMapping("entities")),
    };
    for (group, path) in [
        ("Reals", "entities.Reals"),
        ("Ints", "entities.Ints"),
        ("Bools", "entities.Bools"),
    ] {
        if let Some(names) = entities.get(group) {
            let names = match names.as_array() {
                Some(names) => names,
                None => return Err(DocumentError::NotASequence(path)),
            };
            if names.iter().any(|n| !n.is_string()) {
                return Err(DocumentError::EntityNotAString(path));
            }
        }
    }

    if let Some(constants) = obj.get("constants") {
        let constants = match constants.as_object() {
            Some(constants) => constants,
            None => return Err(DocumentError::NotAMapping("constants")),
        };
        for (name, value) in constants {
            if value.is_object() || value.is_array() || value.is_null() {
                return Err(DocumentError::ConstantNotPrimitive(name.clone()));
            }
        }
    }

    validate_named_list(obj, "invariants", "assert", true)?;
    validate_named_list(obj, "actions", "guard", false)?;

    if let Some(one_hot) = obj.get("one_hot_actions") {
        if !one_hot.is_boolean() {
            return Err(DocumentError::NotABoolean("one_hot_actions"));
        }
    }

    Ok(())
}

fn validate_named_list(
    obj: &serde_json::Map<String, Value>,
    list: &'static str,
    body_key: &'static str,
    required: bool,
) -> Result<(), DocumentError> {
    let items = match obj.get(list) {
        Some(items) => items,
        None if required => return Err(DocumentError::MissingField(list)),
        None => return Ok(()),
    };

    let items = match items.as_array() {
        Some(items) => items,
        None => return Err(DocumentError::NotASequence(list)),
    };

    for (index, item) in items.iter().enumerate() {
        let entry = match item.as_object() {
            Some(entry) => entry,
            None => return Err(DocumentError::NotAMapping(list)),
        };
        for key in ["name", body_key] {
            match entry.get(key) {
                None => return Err(DocumentError::MissingKey { list, index, key }),
                Some(v) if !v.is_string() => {
                    return Err(DocumentError::KeyNotAString { list, index, key })
                },
                Some(_) => {},
            }
        }
    }

    Ok(())
}
