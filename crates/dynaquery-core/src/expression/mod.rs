//! Query-expression compiler.
//!
//! Turns a declarative [`QueryDefinition`] into the store's expression syntax:
//! placeholder-indirected condition strings plus the `#name` and `:value`
//! maps that back them.
//!
//! - [`ast`]: the condition tree and its rendering.
//! - [`alias`]: collision-free placeholder generation.
//! - [`condition`]: one field + one operator to one [`Fragment`].
//! - [`definition`]: the query definition tree and its JSON parser.
//! - [`builder`]: composes fragments into a [`CompiledQuery`].

pub mod alias;
pub mod ast;
pub mod builder;
pub mod condition;
pub mod definition;

pub use alias::AliasGenerator;
pub use ast::{Condition, ConditionOp};
pub use builder::{
    CompiledQuery, QueryCompiler, ReadExpressions, compile_query, validate_key_condition,
};
pub use condition::{ConditionCompiler, Fragment};
pub use definition::{FieldCondition, FieldLeaf, OperatorClause, QueryDefinition};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while compiling a query definition.
///
/// All of these are caller errors detected before any store call.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    /// The definition is not shaped like a query definition.
    #[error("Invalid query definition: {message}")]
    InvalidDefinition {
        /// Explanation.
        message: String,
    },
    /// An operator tag is not recognized (strict mode only).
    #[error("Unknown operator {operator} on field {field}")]
    UnknownOperator {
        /// The field the operator was applied to.
        field: String,
        /// The unrecognized tag.
        operator: String,
    },
    /// `$between` was not given exactly two ordered bounds.
    #[error("Invalid $between on field {field}: {message}")]
    InvalidBetween {
        /// The field.
        field: String,
        /// Explanation.
        message: String,
    },
    /// An operator received an operand it cannot use.
    #[error("Invalid operand for {operator} on field {field}: {message}")]
    InvalidOperand {
        /// The field.
        field: String,
        /// The operator tag.
        operator: String,
        /// Explanation.
        message: String,
    },
    /// A field leaf produced no condition at all.
    #[error("Field {field} has no usable condition")]
    EmptyCondition {
        /// The field.
        field: String,
    },
    /// An operator is not allowed in a key condition.
    #[error("Operator {operator} is not allowed in a key condition on field {field}")]
    NotAKeyOperator {
        /// The field.
        field: String,
        /// The operator tag.
        operator: String,
    },
}

impl ExpressionError {
    pub(crate) fn invalid_definition(message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_operand(
        field: &str,
        operator: ConditionOp,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidOperand {
            field: field.to_owned(),
            operator: operator.tag().to_owned(),
            message: message.into(),
        }
    }
}
