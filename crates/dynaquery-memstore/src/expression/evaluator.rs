//! Evaluates parsed expressions against a stored item.

use std::cmp::Ordering;
use std::collections::HashMap;

use dynaquery_model::AttributeValue;
use dynaquery_model::types::{ExpressionAttributeNames, ExpressionAttributeValues, Item};

use super::ast::{AttributePath, CompareOp, Expr, FunctionName, LogicalOp, Operand, PathElement};
use super::parser::ExpressionError;

/// An item bound to the placeholder maps of one request.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    /// Item under test.
    pub item: &'a Item,
    /// `#name` substitutions.
    pub names: &'a ExpressionAttributeNames,
    /// `:value` substitutions.
    pub values: &'a ExpressionAttributeValues,
}

impl<'a> EvalContext<'a> {
    /// Binds `item` to the request's placeholder maps.
    #[must_use]
    pub fn new(
        item: &'a Item,
        names: &'a ExpressionAttributeNames,
        values: &'a ExpressionAttributeValues,
    ) -> Self {
        Self {
            item,
            names,
            values,
        }
    }

    /// Evaluates `expr` to a boolean.
    ///
    /// Comparisons involving a missing attribute are false; comparisons across
    /// types are false except `<>`.
    ///
    /// # Errors
    ///
    /// Returns an error for unresolved placeholders or misused functions.
    pub fn evaluate(&self, expr: &Expr) -> Result<bool, ExpressionError> {
        match expr {
            Expr::Compare { left, op, right } => {
                let (Some(l), Some(r)) = (self.operand(left)?, self.operand(right)?) else {
                    return Ok(false);
                };
                Ok(compare(&l, &r, *op))
            }
            Expr::Between { value, low, high } => {
                let (Some(v), Some(lo), Some(hi)) =
                    (self.operand(value)?, self.operand(low)?, self.operand(high)?)
                else {
                    return Ok(false);
                };
                Ok(compare(&v, &lo, CompareOp::Ge) && compare(&v, &hi, CompareOp::Le))
            }
            Expr::In { value, list } => {
                let Some(v) = self.operand(value)? else {
                    return Ok(false);
                };
                for candidate in list {
                    if self
                        .operand(candidate)?
                        .is_some_and(|c| compare(&v, &c, CompareOp::Eq))
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expr::Logical {
                op: LogicalOp::And,
                left,
                right,
            } => Ok(self.evaluate(left)? && self.evaluate(right)?),
            Expr::Logical {
                op: LogicalOp::Or,
                left,
                right,
            } => Ok(self.evaluate(left)? || self.evaluate(right)?),
            Expr::Not(inner) => Ok(!self.evaluate(inner)?),
            Expr::Function { name, args } => self.function(*name, args),
        }
    }

    fn function(&self, name: FunctionName, args: &[Operand]) -> Result<bool, ExpressionError> {
        let [target, rest @ ..] = args else {
            return Err(invalid(name, "missing arguments"));
        };
        let Operand::Path(path) = target else {
            return Err(invalid(name, "first argument must be an attribute path"));
        };
        let attr = self.path(path);
        let arg = match rest.first() {
            Some(operand) => self.operand(operand)?,
            None => None,
        };

        match name {
            FunctionName::AttributeExists => Ok(attr.is_some()),
            FunctionName::AttributeNotExists => Ok(attr.is_none()),
            FunctionName::AttributeType => match arg {
                Some(AttributeValue::S(expected)) => {
                    Ok(attr.is_some_and(|v| v.type_descriptor() == expected))
                }
                _ => Err(invalid(name, "type must be a string")),
            },
            FunctionName::BeginsWith => match (attr, arg) {
                (Some(AttributeValue::S(s)), Some(AttributeValue::S(prefix))) => {
                    Ok(s.starts_with(prefix.as_str()))
                }
                (Some(AttributeValue::B(b)), Some(AttributeValue::B(prefix))) => {
                    Ok(b.starts_with(&prefix))
                }
                _ => Ok(false),
            },
            FunctionName::Contains => Ok(match (attr, arg) {
                (Some(AttributeValue::S(s)), Some(AttributeValue::S(sub))) => {
                    s.contains(sub.as_str())
                }
                (Some(AttributeValue::Ss(set)), Some(AttributeValue::S(v)))
                | (Some(AttributeValue::Ns(set)), Some(AttributeValue::N(v))) => set.contains(&v),
                (Some(AttributeValue::Bs(set)), Some(AttributeValue::B(v))) => set.contains(&v),
                (Some(AttributeValue::L(list)), Some(v)) => list.contains(&v),
                _ => false,
            }),
        }
    }

    /// Resolves an operand; `None` means the attribute is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::UnresolvedValue`] for unknown `:value`s.
    pub fn operand(&self, operand: &Operand) -> Result<Option<AttributeValue>, ExpressionError> {
        match operand {
            Operand::Path(path) => Ok(self.path(path).cloned()),
            Operand::Value(name) => self
                .values
                .get(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| ExpressionError::UnresolvedValue { name: name.clone() }),
            Operand::Size(path) => Ok(self.path(path).map(|v| AttributeValue::n(size_of(v)))),
        }
    }

    /// Walks `path` into the item, substituting `#name` placeholders.
    #[must_use]
    pub fn path(&self, path: &AttributePath) -> Option<&'a AttributeValue> {
        let mut current: Option<&'a AttributeValue> = None;
        for (i, element) in path.elements.iter().enumerate() {
            current = match element {
                PathElement::Attribute(name) => {
                    let name = resolve_name(name, self.names)?;
                    if i == 0 {
                        self.item.get(name)
                    } else {
                        current?.as_m()?.get(name)
                    }
                }
                PathElement::Index(idx) => current?.as_l()?.get(*idx),
            };
        }
        current
    }

    /// Keeps only the top-level attributes named by `paths`.
    ///
    /// Nested paths keep their whole top-level attribute.
    #[must_use]
    pub fn project(&self, paths: &[AttributePath]) -> Item {
        let mut out = HashMap::new();
        for path in paths {
            let Some(PathElement::Attribute(head)) = path.elements.first() else {
                continue;
            };
            let Some(name) = resolve_name(head, self.names) else {
                continue;
            };
            if let Some(value) = self.item.get(name) {
                out.insert(name.to_owned(), value.clone());
            }
        }
        out
    }
}

/// Checks that every placeholder `expr` references is defined.
///
/// # Errors
///
/// Returns the first unresolved name or value.
pub fn check_placeholders(
    expr: &Expr,
    names: &ExpressionAttributeNames,
    values: &ExpressionAttributeValues,
) -> Result<(), ExpressionError> {
    let check_path = |path: &AttributePath| -> Result<(), ExpressionError> {
        for element in &path.elements {
            if let PathElement::Attribute(name) = element {
                if resolve_name(name, names).is_none() {
                    return Err(ExpressionError::UnresolvedName { name: name.clone() });
                }
            }
        }
        Ok(())
    };
    let check = |operand: &Operand| -> Result<(), ExpressionError> {
        match operand {
            Operand::Path(path) | Operand::Size(path) => check_path(path),
            Operand::Value(name) if values.contains_key(name) => Ok(()),
            Operand::Value(name) => Err(ExpressionError::UnresolvedValue { name: name.clone() }),
        }
    };
    match expr {
        Expr::Compare { left, right, .. } => {
            check(left)?;
            check(right)
        }
        Expr::Between { value, low, high } => [value, low, high].into_iter().try_for_each(check),
        Expr::In { value, list } => std::iter::once(value).chain(list).try_for_each(check),
        Expr::Logical { left, right, .. } => {
            check_placeholders(left, names, values)?;
            check_placeholders(right, names, values)
        }
        Expr::Not(inner) => check_placeholders(inner, names, values),
        Expr::Function { args, .. } => args.iter().try_for_each(check),
    }
}

/// Resolves a path element to an attribute name.
///
/// Returns `None` for an undefined `#name` placeholder.
pub(crate) fn resolve_name<'n>(name: &'n str, names: &'n ExpressionAttributeNames) -> Option<&'n str> {
    if name.starts_with('#') {
        names.get(name).map(String::as_str)
    } else {
        Some(name)
    }
}

fn invalid(name: FunctionName, message: &str) -> ExpressionError {
    ExpressionError::InvalidOperand {
        function: name.as_str().to_owned(),
        message: message.to_owned(),
    }
}

/// Compares two values; mismatched types only satisfy `<>`.
fn compare(left: &AttributeValue, right: &AttributeValue, op: CompareOp) -> bool {
    let ordering = match (left, right) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            match (a.parse::<f64>(), b.parse::<f64>()) {
                (Ok(a), Ok(b)) => a.partial_cmp(&b),
                _ => None,
            }
        }
        (AttributeValue::B(a), AttributeValue::B(b)) => Some(a.as_ref().cmp(b.as_ref())),
        (AttributeValue::Bool(a), AttributeValue::Bool(b)) => {
            return matches!(op, CompareOp::Eq if a == b) || matches!(op, CompareOp::Ne if a != b);
        }
        (a, b) => {
            return match op {
                CompareOp::Eq => a == b,
                CompareOp::Ne => a != b,
                _ => false,
            };
        }
    };
    let Some(ordering) = ordering else {
        return matches!(op, CompareOp::Ne);
    };
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

fn size_of(value: &AttributeValue) -> usize {
    match value {
        AttributeValue::S(s) => s.len(),
        AttributeValue::N(n) => n.len(),
        AttributeValue::B(b) => b.len(),
        AttributeValue::Ss(v) | AttributeValue::Ns(v) => v.len(),
        AttributeValue::Bs(v) => v.len(),
        AttributeValue::Bool(_) | AttributeValue::Null(_) => 1,
        AttributeValue::L(v) => v.len(),
        AttributeValue::M(m) => m.len(),
    }
}
