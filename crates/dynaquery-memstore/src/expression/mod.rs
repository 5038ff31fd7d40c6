//! The store's expression language.
//!
//! Expression strings are tokenized and parsed into an [`Expr`] tree by
//! recursive descent, then evaluated against one item at a time.

pub mod ast;
pub mod evaluator;
pub mod parser;

pub use ast::{AttributePath, CompareOp, Expr, Operand, PathElement};
pub use evaluator::{EvalContext, check_placeholders};
pub use parser::{ExpressionError, parse_condition, parse_projection};
