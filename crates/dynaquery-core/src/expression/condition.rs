//! Condition compiler: one field, one operator, one fragment.

use serde_json::{Number, Value};
use tracing::debug;

use dynaquery_model::marshal::{json_kind, to_attribute_value};
use dynaquery_model::types::{ExpressionAttributeNames, ExpressionAttributeValues};

use super::ExpressionError;
use super::alias::AliasGenerator;
use super::ast::{Condition, ConditionOp, FunctionName};

/// A compiled condition together with the placeholder bindings it uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    /// The condition tree; `None` only for the empty fragment.
    pub condition: Option<Condition>,
    /// `#alias` to attribute name.
    pub names: ExpressionAttributeNames,
    /// `:alias` to attribute value.
    pub values: ExpressionAttributeValues,
}

impl Fragment {
    /// Renders the condition in store syntax.
    #[must_use]
    pub fn expression(&self) -> String {
        self.condition
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    /// Conjoins several fragments, merging their bindings.
    #[must_use]
    pub fn all(fragments: Vec<Fragment>) -> Self {
        Self::combine(fragments, Condition::all)
    }

    /// Disjoins several fragments, merging their bindings.
    #[must_use]
    pub fn any(fragments: Vec<Fragment>) -> Self {
        Self::combine(fragments, Condition::any)
    }

    fn combine(fragments: Vec<Fragment>, join: fn(Vec<Condition>) -> Condition) -> Self {
        let mut merged = Self::default();
        let mut conditions = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            merged.names.extend(fragment.names);
            merged.values.extend(fragment.values);
            conditions.extend(fragment.condition);
        }
        if !conditions.is_empty() {
            merged.condition = Some(join(conditions));
        }
        merged
    }
}

/// Compiles field-level operators into [`Fragment`]s.
///
/// Every call draws fresh aliases from the shared [`AliasGenerator`], so
/// compiling the same field twice (e.g. `$gte` and `$lte`) never collides.
#[derive(Debug)]
pub struct ConditionCompiler<'a> {
    aliases: &'a mut AliasGenerator,
    strict: bool,
}

impl<'a> ConditionCompiler<'a> {
    /// Creates a compiler. With `strict`, unknown operator tags are errors.
    pub fn new(aliases: &'a mut AliasGenerator, strict: bool) -> Self {
        Self { aliases, strict }
    }

    /// Compiles `field = operand`.
    pub fn equals(&mut self, field: &str, operand: &Value) -> Fragment {
        self.compare(field, ConditionOp::Eq, operand)
    }

    /// Compiles an operator given by its `$tag`.
    ///
    /// Returns `Ok(None)` for an unknown tag in permissive mode.
    pub fn compile_tag(
        &mut self,
        field: &str,
        tag: &str,
        operand: &Value,
    ) -> Result<Option<Fragment>, ExpressionError> {
        match ConditionOp::from_tag(tag) {
            Some(op) => self.compile(field, op, operand).map(Some),
            None if self.strict => Err(ExpressionError::UnknownOperator {
                field: field.to_owned(),
                operator: tag.to_owned(),
            }),
            None => {
                debug!(field, operator = tag, "ignoring unknown operator");
                Ok(None)
            }
        }
    }

    /// Compiles one operator applied to `field`.
    pub fn compile(
        &mut self,
        field: &str,
        op: ConditionOp,
        operand: &Value,
    ) -> Result<Fragment, ExpressionError> {
        match op {
            ConditionOp::Eq
            | ConditionOp::NotEq
            | ConditionOp::Lt
            | ConditionOp::Lte
            | ConditionOp::Gt
            | ConditionOp::Gte => Ok(self.compare(field, op, operand)),
            ConditionOp::Between => self.between(field, operand),
            ConditionOp::BeginsWith => {
                if !operand.is_string() {
                    return Err(ExpressionError::invalid_operand(
                        field,
                        op,
                        format!("expected a string prefix, got {}", json_kind(operand)),
                    ));
                }
                Ok(self.function(field, FunctionName::BeginsWith, Some(operand)))
            }
            ConditionOp::Contains => Ok(self.function(field, FunctionName::Contains, Some(operand))),
            ConditionOp::NotContains => {
                let mut fragment = self.function(field, FunctionName::Contains, Some(operand));
                fragment.condition = fragment.condition.map(|c| Condition::Not(Box::new(c)));
                Ok(fragment)
            }
            ConditionOp::In => self.one_of(field, operand),
            ConditionOp::Exists => Ok(self.function(field, FunctionName::AttributeExists, None)),
            ConditionOp::NotExists => {
                Ok(self.function(field, FunctionName::AttributeNotExists, None))
            }
        }
    }

    fn bind_name(&mut self, fragment: &mut Fragment, field: &str) -> String {
        let alias = self.aliases.name();
        fragment.names.insert(alias.clone(), field.to_owned());
        alias
    }

    fn bind_value(&mut self, fragment: &mut Fragment, operand: &Value) -> String {
        let alias = self.aliases.value();
        fragment
            .values
            .insert(alias.clone(), to_attribute_value(operand));
        alias
    }

    fn compare(&mut self, field: &str, op: ConditionOp, operand: &Value) -> Fragment {
        let mut fragment = Fragment::default();
        let name = self.bind_name(&mut fragment, field);
        let value = self.bind_value(&mut fragment, operand);
        fragment.condition = op.comparator().map(|op| Condition::Compare { name, op, value });
        fragment
    }

    fn function(&mut self, field: &str, func: FunctionName, operand: Option<&Value>) -> Fragment {
        let mut fragment = Fragment::default();
        let name = self.bind_name(&mut fragment, field);
        let value = operand.map(|v| self.bind_value(&mut fragment, v));
        fragment.condition = Some(Condition::Function { func, name, value });
        fragment
    }

    fn between(&mut self, field: &str, operand: &Value) -> Result<Fragment, ExpressionError> {
        let bounds = match operand {
            Value::Array(bounds) if bounds.len() == 2 => bounds,
            Value::Array(bounds) => {
                return Err(ExpressionError::InvalidBetween {
                    field: field.to_owned(),
                    message: format!("expected exactly two bounds, got {}", bounds.len()),
                });
            }
            other => {
                return Err(ExpressionError::InvalidBetween {
                    field: field.to_owned(),
                    message: format!("expected a [from, to] array, got {}", json_kind(other)),
                });
            }
        };
        check_ordered(field, &bounds[0], &bounds[1])?;

        let mut fragment = Fragment::default();
        let name = self.bind_name(&mut fragment, field);
        let low = self.bind_value(&mut fragment, &bounds[0]);
        let high = self.bind_value(&mut fragment, &bounds[1]);
        fragment.condition = Some(Condition::Between { name, low, high });
        Ok(fragment)
    }

    fn one_of(&mut self, field: &str, operand: &Value) -> Result<Fragment, ExpressionError> {
        let candidates = match operand {
            Value::Array(items) if !items.is_empty() => items,
            Value::Array(_) => {
                return Err(ExpressionError::invalid_operand(
                    field,
                    ConditionOp::In,
                    "the candidate list is empty",
                ));
            }
            other => {
                return Err(ExpressionError::invalid_operand(
                    field,
                    ConditionOp::In,
                    format!("expected an array, got {}", json_kind(other)),
                ));
            }
        };

        let mut fragment = Fragment::default();
        let name = self.bind_name(&mut fragment, field);
        let checks = candidates
            .iter()
            .map(|candidate| Condition::Compare {
                name: name.clone(),
                op: super::ast::CompareOp::Eq,
                value: self.bind_value(&mut fragment, candidate),
            })
            .collect();
        fragment.condition = Some(Condition::any(checks));
        Ok(fragment)
    }
}

/// Integers beyond 2^53 lose precision as `f64`.
fn exact_integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Both bounds must be the same scalar kind with `from <= to`.
fn check_ordered(field: &str, from: &Value, to: &Value) -> Result<(), ExpressionError> {
    let ordered = match (from, to) {
        (Value::Number(a), Value::Number(b)) => match (exact_integer(a), exact_integer(b)) {
            (Some(a), Some(b)) => a <= b,
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a <= b,
                _ => false,
            },
        },
        (Value::String(a), Value::String(b)) => a.as_bytes() <= b.as_bytes(),
        _ => {
            return Err(ExpressionError::InvalidBetween {
                field: field.to_owned(),
                message: format!(
                    "bounds must both be numbers or both be strings, got {} and {}",
                    json_kind(from),
                    json_kind(to)
                ),
            });
        }
    };
    if ordered {
        Ok(())
    } else {
        Err(ExpressionError::InvalidBetween {
            field: field.to_owned(),
            message: format!("lower bound {from} is greater than upper bound {to}"),
        })
    }
}
