//! Condition tree produced by the compiler.
//!
//! Every node refers to attributes and values only through placeholder
//! aliases (`#n0abc`, `:v1abc`); rendering a node with `Display` yields the
//! store's expression syntax.

use std::fmt;

// ---------------------------------------------------------------------------
// Operator tags
// ---------------------------------------------------------------------------

/// Field-level operators accepted in a query definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOp {
    /// `$eq`
    Eq,
    /// `$notEq`
    NotEq,
    /// `$lt`
    Lt,
    /// `$lte`
    Lte,
    /// `$gt`
    Gt,
    /// `$gte`
    Gte,
    /// `$between`, inclusive on both ends.
    Between,
    /// `$beginsWith`
    BeginsWith,
    /// `$contains`
    Contains,
    /// `$notContains`
    NotContains,
    /// `$in`, OR-ed equality against each list element.
    In,
    /// `$exists`
    Exists,
    /// `$notExists`
    NotExists,
}

impl ConditionOp {
    /// All operators, in tag order.
    pub const ALL: [Self; 13] = [
        Self::Eq,
        Self::NotEq,
        Self::Lt,
        Self::Lte,
        Self::Gt,
        Self::Gte,
        Self::Between,
        Self::BeginsWith,
        Self::Contains,
        Self::NotContains,
        Self::In,
        Self::Exists,
        Self::NotExists,
    ];

    /// Looks up an operator by its `$tag`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.tag() == tag)
    }

    /// The `$tag` used in query definitions.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::NotEq => "$notEq",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Between => "$between",
            Self::BeginsWith => "$beginsWith",
            Self::Contains => "$contains",
            Self::NotContains => "$notContains",
            Self::In => "$in",
            Self::Exists => "$exists",
            Self::NotExists => "$notExists",
        }
    }

    /// The binary comparator for the plain comparison operators.
    #[must_use]
    pub fn comparator(&self) -> Option<CompareOp> {
        match self {
            Self::Eq => Some(CompareOp::Eq),
            Self::NotEq => Some(CompareOp::Ne),
            Self::Lt => Some(CompareOp::Lt),
            Self::Lte => Some(CompareOp::Le),
            Self::Gt => Some(CompareOp::Gt),
            Self::Gte => Some(CompareOp::Ge),
            _ => None,
        }
    }

    /// Returns `true` if the store accepts this operator on a sort key in a
    /// key condition.
    #[must_use]
    pub fn is_key_condition(&self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::Lt
                | Self::Lte
                | Self::Gt
                | Self::Gte
                | Self::Between
                | Self::BeginsWith
        )
    }
}

impl fmt::Display for ConditionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        })
    }
}

/// Condition functions the compiler emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionName {
    /// `attribute_exists(path)`
    AttributeExists,
    /// `attribute_not_exists(path)`
    AttributeNotExists,
    /// `begins_with(path, prefix)`
    BeginsWith,
    /// `contains(path, operand)`
    Contains,
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AttributeExists => "attribute_exists",
            Self::AttributeNotExists => "attribute_not_exists",
            Self::BeginsWith => "begins_with",
            Self::Contains => "contains",
        })
    }
}

// ---------------------------------------------------------------------------
// Condition tree
// ---------------------------------------------------------------------------

/// A compiled condition over placeholder aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `name op :value`
    Compare {
        /// Name alias.
        name: String,
        /// Comparator.
        op: CompareOp,
        /// Value alias.
        value: String,
    },
    /// `name between :low and :high`
    Between {
        /// Name alias.
        name: String,
        /// Lower bound alias.
        low: String,
        /// Upper bound alias.
        high: String,
    },
    /// `func(name)` or `func(name, :value)`
    Function {
        /// The function.
        func: FunctionName,
        /// Name alias.
        name: String,
        /// Second argument alias, if the function takes one.
        value: Option<String>,
    },
    /// `NOT inner`
    Not(Box<Condition>),
    /// Conjunction; parenthesized when it has more than one member.
    All(Vec<Condition>),
    /// Disjunction; parenthesized when it has more than one member.
    Any(Vec<Condition>),
}

impl Condition {
    /// Wraps `members` in a conjunction, collapsing a single member.
    #[must_use]
    pub fn all(mut members: Vec<Condition>) -> Self {
        if members.len() == 1 {
            members.remove(0)
        } else {
            Self::All(members)
        }
    }

    /// Wraps `members` in a disjunction, collapsing a single member.
    #[must_use]
    pub fn any(mut members: Vec<Condition>) -> Self {
        if members.len() == 1 {
            members.remove(0)
        } else {
            Self::Any(members)
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, members: &[Condition], sep: &str) -> fmt::Result {
    if members.len() == 1 {
        return write!(f, "{}", members[0]);
    }
    f.write_str("(")?;
    for (i, member) in members.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{member}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { name, op, value } => write!(f, "{name} {op} {value}"),
            Self::Between { name, low, high } => write!(f, "{name} between {low} and {high}"),
            Self::Function {
                func,
                name,
                value: Some(value),
            } => write!(f, "{func}({name}, {value})"),
            Self::Function {
                func,
                name,
                value: None,
            } => write!(f, "{func}({name})"),
            Self::Not(inner) => write!(f, "NOT {inner}"),
            Self::All(members) => write_joined(f, members, " AND "),
            Self::Any(members) => write_joined(f, members, " OR "),
        }
    }
}
