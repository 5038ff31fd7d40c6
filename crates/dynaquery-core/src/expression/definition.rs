//! Query definition tree.
//!
//! A definition is a JSON object whose keys are either field names or one of
//! the group tags `$and` / `$or`:
//!
//! ```json
//! {
//!   "status": "active",
//!   "amount": { "$gte": 100, "$lte": 500 },
//!   "$or": [{ "category": "A" }, { "category": "B" }]
//! }
//! ```
//!
//! Bare fields and `$and` members are conjoined. Every field of every `$or`
//! member is one disjunct, so `{ "$or": [{ "a": 1, "b": 2 }] }` reads as
//! `a = 1 OR b = 2`.

use serde_json::{Map, Value};

use dynaquery_model::marshal::json_kind;

use super::ExpressionError;
use super::ast::ConditionOp;

const AND_TAG: &str = "$and";
const OR_TAG: &str = "$or";

/// One `operator: operand` pair inside an operator object.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorClause {
    /// The `$tag` as written; may be unrecognized.
    pub tag: String,
    /// The operand, as native JSON.
    pub operand: Value,
}

impl OperatorClause {
    /// Creates a clause for a known operator.
    #[must_use]
    pub fn new(op: ConditionOp, operand: Value) -> Self {
        Self {
            tag: op.tag().to_owned(),
            operand,
        }
    }
}

/// The right-hand side of a field leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCondition {
    /// `{ field: value }`, implicit equality.
    Equals(Value),
    /// `{ field: { "$op": operand, ... } }`, conjoined when there are several.
    Operators(Vec<OperatorClause>),
}

/// A single field and its condition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLeaf {
    /// Attribute name.
    pub field: String,
    /// What the attribute must satisfy.
    pub condition: FieldCondition,
}

impl FieldLeaf {
    /// `field = value`.
    #[must_use]
    pub fn equals(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            condition: FieldCondition::Equals(value),
        }
    }

    /// `field` under a single operator.
    #[must_use]
    pub fn op(field: impl Into<String>, op: ConditionOp, operand: Value) -> Self {
        Self {
            field: field.into(),
            condition: FieldCondition::Operators(vec![OperatorClause::new(op, operand)]),
        }
    }

    /// `field` under several operators, conjoined.
    #[must_use]
    pub fn ops(field: impl Into<String>, clauses: Vec<OperatorClause>) -> Self {
        Self {
            field: field.into(),
            condition: FieldCondition::Operators(clauses),
        }
    }

    /// The operator tags this leaf uses; equality leaves report `$eq`.
    pub fn tags(&self) -> Vec<&str> {
        match &self.condition {
            FieldCondition::Equals(_) => vec![ConditionOp::Eq.tag()],
            FieldCondition::Operators(clauses) => clauses.iter().map(|c| c.tag.as_str()).collect(),
        }
    }

    fn parse(field: &str, value: &Value) -> Self {
        match value {
            Value::Object(operators) => Self::ops(
                field,
                operators
                    .iter()
                    .map(|(tag, operand)| OperatorClause {
                        tag: tag.clone(),
                        operand: operand.clone(),
                    })
                    .collect(),
            ),
            other => Self::equals(field, other.clone()),
        }
    }
}

/// A parsed query definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDefinition {
    /// Top-level bare fields.
    pub leaves: Vec<FieldLeaf>,
    /// `$and` members; every leaf of every member is conjoined.
    pub and_group: Vec<Vec<FieldLeaf>>,
    /// `$or` members; every leaf of every member is one disjunct.
    pub or_group: Vec<Vec<FieldLeaf>>,
}

impl QueryDefinition {
    /// An empty definition, which matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a definition from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::InvalidDefinition`] when `value` is not an
    /// object, a group is not an array of objects, or a top-level key is an
    /// unknown `$` tag.
    pub fn from_json(value: &Value) -> Result<Self, ExpressionError> {
        let Value::Object(map) = value else {
            return Err(ExpressionError::invalid_definition(format!(
                "expected an object, got {}",
                json_kind(value)
            )));
        };

        let mut definition = Self::default();
        for (key, value) in map {
            match key.as_str() {
                AND_TAG => definition.and_group = parse_group(AND_TAG, value)?,
                OR_TAG => definition.or_group = parse_group(OR_TAG, value)?,
                tag if tag.starts_with('$') => {
                    return Err(ExpressionError::invalid_definition(format!(
                        "unknown group tag {tag}"
                    )));
                }
                field => definition.leaves.push(FieldLeaf::parse(field, value)),
            }
        }
        Ok(definition)
    }

    /// Adds `field = value` to the top level.
    #[must_use]
    pub fn equals(mut self, field: impl Into<String>, value: Value) -> Self {
        self.leaves.push(FieldLeaf::equals(field, value));
        self
    }

    /// Adds `field <op> operand` to the top level.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, op: ConditionOp, operand: Value) -> Self {
        self.leaves.push(FieldLeaf::op(field, op, operand));
        self
    }

    /// Appends a member to the `$and` group.
    #[must_use]
    pub fn and(mut self, member: Vec<FieldLeaf>) -> Self {
        self.and_group.push(member);
        self
    }

    /// Appends a member to the `$or` group.
    #[must_use]
    pub fn or(mut self, member: Vec<FieldLeaf>) -> Self {
        self.or_group.push(member);
        self
    }

    /// Returns `true` if the definition has no conditions at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
            && self.and_group.iter().all(Vec::is_empty)
            && self.or_group.iter().all(Vec::is_empty)
    }

    /// Every leaf in the definition, top level first.
    pub fn all_leaves(&self) -> impl Iterator<Item = &FieldLeaf> {
        self.leaves
            .iter()
            .chain(self.and_group.iter().flatten())
            .chain(self.or_group.iter().flatten())
    }
}

impl TryFrom<&Value> for QueryDefinition {
    type Error = ExpressionError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Self::from_json(value)
    }
}

impl TryFrom<Value> for QueryDefinition {
    type Error = ExpressionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

fn parse_group(tag: &str, value: &Value) -> Result<Vec<Vec<FieldLeaf>>, ExpressionError> {
    let Value::Array(members) = value else {
        return Err(ExpressionError::invalid_definition(format!(
            "{tag} expects an array, got {}",
            json_kind(value)
        )));
    };
    members
        .iter()
        .map(|member| match member {
            Value::Object(fields) => Ok(parse_leaves(fields)),
            other => Err(ExpressionError::invalid_definition(format!(
                "{tag} members must be objects, got {}",
                json_kind(other)
            ))),
        })
        .collect()
}

fn parse_leaves(fields: &Map<String, Value>) -> Vec<FieldLeaf> {
    fields
        .iter()
        .map(|(field, value)| FieldLeaf::parse(field, value))
        .collect()
}
