//! Record validation seam.
//!
//! The repository hands every record it is about to write to a
//! [`SchemaValidator`], which may coerce, strip, or reject it. Key fields and
//! timestamps are owned by the repository and restored after validation.

use std::fmt;

use serde_json::{Map, Value};

use dynaquery_model::marshal::json_kind;

use crate::error::DataError;

/// Validates a record before it is written.
pub trait SchemaValidator: Send + Sync + fmt::Debug {
    /// Returns the record to persist, or why it is invalid.
    ///
    /// # Errors
    ///
    /// Implementations return [`DataError::Schema`] for invalid records.
    fn validate(&self, record: Map<String, Value>) -> Result<Map<String, Value>, DataError>;
}

/// Accepts every record unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughValidator;

impl SchemaValidator for PassthroughValidator {
    fn validate(&self, record: Map<String, Value>) -> Result<Map<String, Value>, DataError> {
        Ok(record)
    }
}

/// JSON kind a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any value.
    Any,
    /// A string.
    String,
    /// A number.
    Number,
    /// A boolean.
    Boolean,
    /// An array.
    Array,
    /// An object.
    Object,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    /// Field name.
    pub name: String,
    /// Expected kind; `null` is always accepted for optional fields.
    pub kind: FieldKind,
    /// Must be present and non-null.
    pub required: bool,
}

/// Validates records against a flat list of declared fields.
///
/// Undeclared fields are stripped unless `allow_unknown` is set.
#[derive(Debug, Clone, Default)]
pub struct FieldListValidator {
    rules: Vec<FieldRule>,
    allow_unknown: bool,
}

impl FieldListValidator {
    /// Creates an empty validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a required field.
    #[must_use]
    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.rules.push(FieldRule {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Declares an optional field.
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.rules.push(FieldRule {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    /// Keeps undeclared fields instead of stripping them.
    #[must_use]
    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }
}

impl SchemaValidator for FieldListValidator {
    fn validate(&self, mut record: Map<String, Value>) -> Result<Map<String, Value>, DataError> {
        let mut details = Vec::new();
        for rule in &self.rules {
            match record.get(&rule.name) {
                None | Some(Value::Null) if rule.required => {
                    details.push(format!("\"{}\" is required", rule.name));
                }
                Some(value) if !value.is_null() && !rule.kind.accepts(value) => {
                    details.push(format!(
                        "\"{}\" must be a {}, got {}",
                        rule.name,
                        rule.kind.as_str(),
                        json_kind(value)
                    ));
                }
                _ => {}
            }
        }
        if !details.is_empty() {
            return Err(DataError::Schema {
                message: details.join("; "),
                details,
            });
        }

        if !self.allow_unknown {
            record.retain(|field, _| self.rules.iter().any(|rule| rule.name == *field));
        }
        Ok(record)
    }
}

/// Checks that every labelled value is a non-blank string.
///
/// # Errors
///
/// Returns [`DataError::Validation`] listing every missing label, e.g.
/// `"Id is required; PartitionKey is required."`.
pub fn require_strings(values: &[(&str, &str)]) -> Result<(), DataError> {
    let missing: Vec<String> = values
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(label, _)| format!("{label} is required"))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DataError::validation(format!("{}.", missing.join("; "))))
    }
}
