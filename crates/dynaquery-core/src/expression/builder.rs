//! Query expression builder.
//!
//! Walks a [`QueryDefinition`], compiles every leaf through the
//! [`ConditionCompiler`], and composes the fragments into a single
//! expression:
//!
//! - bare leaves and `$and` members are joined with `" AND "`;
//! - every leaf of every `$or` member is joined with `" OR "`;
//! - when both sides exist the result is `"(AND-side) AND (OR-side)"`.

use tracing::debug;

use dynaquery_model::types::{ExpressionAttributeNames, ExpressionAttributeValues};

use super::ExpressionError;
use super::alias::AliasGenerator;
use super::ast::ConditionOp;
use super::condition::{ConditionCompiler, Fragment};
use super::definition::{FieldCondition, FieldLeaf, QueryDefinition};

// ---------------------------------------------------------------------------
// Compiled output
// ---------------------------------------------------------------------------

/// The result of compiling one query definition.
///
/// The attribute maps are `None` rather than empty so callers never send an
/// empty map to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledQuery {
    /// The condition expression; empty when the definition matched everything.
    pub expression: String,
    /// `#alias` to attribute name.
    pub attribute_names: Option<ExpressionAttributeNames>,
    /// `:alias` to attribute value.
    pub attribute_values: Option<ExpressionAttributeValues>,
    /// Comma-separated name aliases, when a projection was requested.
    pub projection_expression: Option<String>,
}

impl CompiledQuery {
    /// The expression for use as a filter, or `None` when it is empty.
    #[must_use]
    pub fn filter_expression(&self) -> Option<&str> {
        (!self.expression.is_empty()).then_some(self.expression.as_str())
    }

    /// The expression for use as a key condition, or `None` when it is empty.
    #[must_use]
    pub fn key_condition_expression(&self) -> Option<&str> {
        self.filter_expression()
    }

    /// Returns `true` if there is neither a condition nor a projection.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expression.is_empty() && self.projection_expression.is_none()
    }
}

/// Every expression a single query or scan request carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadExpressions {
    /// `KeyConditionExpression`; queries only.
    pub key_condition_expression: Option<String>,
    /// `FilterExpression`.
    pub filter_expression: Option<String>,
    /// `ProjectionExpression`.
    pub projection_expression: Option<String>,
    /// Merged `ExpressionAttributeNames`.
    pub attribute_names: Option<ExpressionAttributeNames>,
    /// Merged `ExpressionAttributeValues`.
    pub attribute_values: Option<ExpressionAttributeValues>,
}

impl ReadExpressions {
    /// Uses `compiled` as the key condition.
    #[must_use]
    pub fn key_condition(compiled: CompiledQuery) -> Self {
        Self {
            key_condition_expression: compiled.key_condition_expression().map(str::to_owned),
            filter_expression: None,
            projection_expression: compiled.projection_expression,
            attribute_names: compiled.attribute_names,
            attribute_values: compiled.attribute_values,
        }
    }

    /// Uses `compiled` as the filter.
    #[must_use]
    pub fn filter(compiled: CompiledQuery) -> Self {
        Self::default().with_filter(compiled)
    }

    /// Adds `compiled` as the filter, merging its attribute maps.
    ///
    /// Both compiles must draw from the same [`AliasGenerator`] (one
    /// [`QueryCompiler`]) so their aliases cannot collide. A projection in
    /// `compiled` is kept only if none was set before.
    #[must_use]
    pub fn with_filter(mut self, compiled: CompiledQuery) -> Self {
        if let Some(expression) = compiled.filter_expression() {
            self.filter_expression = Some(expression.to_owned());
        }
        if self.projection_expression.is_none() {
            self.projection_expression = compiled.projection_expression;
        }
        self.attribute_names = merge_maps(self.attribute_names, compiled.attribute_names);
        self.attribute_values = merge_maps(self.attribute_values, compiled.attribute_values);
        self
    }
}

fn merge_maps<V>(
    left: Option<std::collections::HashMap<String, V>>,
    right: Option<std::collections::HashMap<String, V>>,
) -> Option<std::collections::HashMap<String, V>> {
    match (left, right) {
        (Some(mut left), Some(right)) => {
            left.extend(right);
            Some(left)
        }
        (left, None) => left,
        (None, right) => right,
    }
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

/// Compiles query definitions with one shared alias space.
///
/// Reuse one compiler for every expression of a single request (key
/// condition, filter, projection); use a fresh one per request.
#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    aliases: AliasGenerator,
    strict: bool,
}

impl QueryCompiler {
    /// Creates a compiler with a random alias suffix.
    #[must_use]
    pub fn new(strict: bool) -> Self {
        Self::with_aliases(AliasGenerator::new(), strict)
    }

    /// Creates a compiler over an existing alias generator.
    #[must_use]
    pub fn with_aliases(aliases: AliasGenerator, strict: bool) -> Self {
        Self { aliases, strict }
    }

    /// Compiles `definition`, with an optional projection.
    ///
    /// # Errors
    ///
    /// Returns an [`ExpressionError`] for malformed operands, unknown
    /// operators in strict mode, or a field left without any condition.
    pub fn compile(
        &mut self,
        definition: &QueryDefinition,
        projection: Option<&[String]>,
    ) -> Result<CompiledQuery, ExpressionError> {
        let mut conditions = ConditionCompiler::new(&mut self.aliases, self.strict);

        let and_side = definition
            .leaves
            .iter()
            .chain(definition.and_group.iter().flatten())
            .map(|leaf| compile_leaf(&mut conditions, leaf))
            .collect::<Result<Vec<_>, _>>()?;

        // Operators on one field stay conjoined inside its fragment.
        let or_side = definition
            .or_group
            .iter()
            .flatten()
            .map(|leaf| compile_leaf(&mut conditions, leaf))
            .collect::<Result<Vec<_>, _>>()?;

        let expression = combine(&and_side, &or_side);
        let mut names = ExpressionAttributeNames::new();
        let mut values = ExpressionAttributeValues::new();
        for fragment in and_side.into_iter().chain(or_side) {
            names.extend(fragment.names);
            values.extend(fragment.values);
        }

        let projection_expression = projection.filter(|f| !f.is_empty()).map(|fields| {
            fields
                .iter()
                .map(|field| {
                    let alias = self.aliases.name();
                    names.insert(alias.clone(), field.clone());
                    alias
                })
                .collect::<Vec<_>>()
                .join(", ")
        });

        debug!(
            expression = %expression,
            names = names.len(),
            values = values.len(),
            "compiled query definition"
        );

        Ok(CompiledQuery {
            expression,
            attribute_names: (!names.is_empty()).then_some(names),
            attribute_values: (!values.is_empty()).then_some(values),
            projection_expression,
        })
    }

    /// Compiles a key condition, allowing only operators the store accepts
    /// in key position.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::NotAKeyOperator`] for any other operator,
    /// including unknown tags, plus everything [`Self::compile`] returns.
    pub fn compile_key_condition(
        &mut self,
        definition: &QueryDefinition,
        projection: Option<&[String]>,
    ) -> Result<CompiledQuery, ExpressionError> {
        validate_key_condition(definition)?;
        self.compile(definition, projection)
    }
}

/// Compiles `definition` with a fresh alias space.
///
/// # Errors
///
/// See [`QueryCompiler::compile`].
///
/// # Examples
///
/// ```
/// use dynaquery_core::expression::{QueryDefinition, compile_query};
/// use serde_json::json;
///
/// let definition = QueryDefinition::from_json(&json!({
///     "status": "active",
///     "amount": { "$gte": 100 },
/// }))
/// .unwrap();
/// let compiled = compile_query(&definition, None, false).unwrap();
/// assert_eq!(compiled.expression.matches(" AND ").count(), 1);
/// assert_eq!(compiled.attribute_names.unwrap().len(), 2);
/// ```
pub fn compile_query(
    definition: &QueryDefinition,
    projection: Option<&[String]>,
    strict: bool,
) -> Result<CompiledQuery, ExpressionError> {
    QueryCompiler::new(strict).compile(definition, projection)
}

/// Checks that every leaf uses only key-condition operators.
pub fn validate_key_condition(definition: &QueryDefinition) -> Result<(), ExpressionError> {
    for leaf in definition.all_leaves() {
        for tag in leaf.tags() {
            let allowed = ConditionOp::from_tag(tag).is_some_and(|op| op.is_key_condition());
            if !allowed {
                return Err(ExpressionError::NotAKeyOperator {
                    field: leaf.field.clone(),
                    operator: tag.to_owned(),
                });
            }
        }
    }
    Ok(())
}

fn compile_leaf(
    conditions: &mut ConditionCompiler<'_>,
    leaf: &FieldLeaf,
) -> Result<Fragment, ExpressionError> {
    let fragments = match &leaf.condition {
        FieldCondition::Equals(value) => vec![conditions.equals(&leaf.field, value)],
        FieldCondition::Operators(clauses) => {
            let mut fragments = Vec::with_capacity(clauses.len());
            for clause in clauses {
                fragments.extend(conditions.compile_tag(&leaf.field, &clause.tag, &clause.operand)?);
            }
            fragments
        }
    };
    if fragments.is_empty() {
        return Err(ExpressionError::EmptyCondition {
            field: leaf.field.clone(),
        });
    }
    Ok(Fragment::all(fragments))
}

fn combine(and_side: &[Fragment], or_side: &[Fragment]) -> String {
    let join = |fragments: &[Fragment], sep: &str| {
        fragments
            .iter()
            .map(Fragment::expression)
            .collect::<Vec<_>>()
            .join(sep)
    };
    match (and_side.is_empty(), or_side.is_empty()) {
        (true, true) => String::new(),
        (false, true) => join(and_side, " AND "),
        (true, false) => join(or_side, " OR "),
        (false, false) => format!(
            "({}) AND ({})",
            join(and_side, " AND "),
            join(or_side, " OR ")
        ),
    }
}
