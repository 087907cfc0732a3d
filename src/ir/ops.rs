//! Operator, aggregate, subquery and interval vocabularies.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};
use crate::types::DataType;

/// Operator kinds carried by [`Node::Operator`](crate::ir::Node::Operator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorKind {
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<=`
    Lte,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    And,
    Or,
    Not,
    /// Membership in a list, parameter or subquery.
    In,
    Like,
    Ilike,
    IsNil,
    /// First non-null of two operands.
    Coalesce,
    /// `datetime_add(base, count, unit)`; operands are `[base, interval]`.
    DatetimeAdd,
    /// `date_add(base, count, unit)`; operands are `[base, interval]`.
    DateAdd,
    /// `from_now(count, unit)`; operands are `[interval]`.
    FromNow,
    /// `ago(count, unit)`; operands are `[interval]`.
    Ago,
}

impl OperatorKind {
    /// Returns the surface name of this operator.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::Eq => "==",
            OperatorKind::NotEq => "!=",
            OperatorKind::Lte => "<=",
            OperatorKind::Gte => ">=",
            OperatorKind::Lt => "<",
            OperatorKind::Gt => ">",
            OperatorKind::Add => "+",
            OperatorKind::Sub => "-",
            OperatorKind::Mul => "*",
            OperatorKind::Div => "/",
            OperatorKind::And => "and",
            OperatorKind::Or => "or",
            OperatorKind::Not => "not",
            OperatorKind::In => "in",
            OperatorKind::Like => "like",
            OperatorKind::Ilike => "ilike",
            OperatorKind::IsNil => "is_nil",
            OperatorKind::Coalesce => "coalesce",
            OperatorKind::DatetimeAdd => "datetime_add",
            OperatorKind::DateAdd => "date_add",
            OperatorKind::FromNow => "from_now",
            OperatorKind::Ago => "ago",
        }
    }

    /// Number of operands the node must carry.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            OperatorKind::Not | OperatorKind::IsNil | OperatorKind::FromNow | OperatorKind::Ago => 1,
            _ => 2,
        }
    }

    /// Returns whether this is one of the six comparisons.
    #[must_use]
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            OperatorKind::Eq
                | OperatorKind::NotEq
                | OperatorKind::Lte
                | OperatorKind::Gte
                | OperatorKind::Lt
                | OperatorKind::Gt
        )
    }

    /// Returns whether this is `+ - * /`.
    #[must_use]
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            OperatorKind::Add | OperatorKind::Sub | OperatorKind::Mul | OperatorKind::Div
        )
    }

    /// Returns whether the result is a boolean.
    #[must_use]
    pub fn is_predicate(&self) -> bool {
        self.is_comparison()
            || matches!(
                self,
                OperatorKind::And
                    | OperatorKind::Or
                    | OperatorKind::Not
                    | OperatorKind::In
                    | OperatorKind::Like
                    | OperatorKind::Ilike
                    | OperatorKind::IsNil
            )
    }

    /// Returns whether the operator takes an interval operand.
    #[must_use]
    pub fn is_date_arithmetic(&self) -> bool {
        matches!(
            self,
            OperatorKind::DatetimeAdd
                | OperatorKind::DateAdd
                | OperatorKind::FromNow
                | OperatorKind::Ago
        )
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKind {
    /// `count()`, counting rows.
    Count0,
    /// `count(expr)`, counting non-null values.
    Count1,
    Avg,
    Sum,
    Min,
    Max,
}

impl AggregateKind {
    /// Returns the name of this aggregate function.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            AggregateKind::Count0 | AggregateKind::Count1 => "count",
            AggregateKind::Avg => "avg",
            AggregateKind::Sum => "sum",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
        }
    }

    /// Number of arguments the aggregate takes.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            AggregateKind::Count0 => 0,
            _ => 1,
        }
    }

    /// Returns the output type given the argument type, if known.
    #[must_use]
    pub fn output_type(&self, input: Option<DataType>) -> Option<DataType> {
        match self {
            AggregateKind::Count0 | AggregateKind::Count1 => Some(DataType::Integer),
            AggregateKind::Avg => Some(DataType::Decimal),
            AggregateKind::Sum | AggregateKind::Min | AggregateKind::Max => input,
        }
    }
}

/// How a subquery is used as an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubqueryKind {
    Any,
    All,
    Exists,
}

impl SubqueryKind {
    /// Returns the surface name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SubqueryKind::Any => "any",
            SubqueryKind::All => "all",
            SubqueryKind::Exists => "exists",
        }
    }
}

/// The fixed interval-unit vocabulary for datetime arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    Microsecond,
}

impl IntervalUnit {
    /// Every unit, largest first.
    pub const ALL: [IntervalUnit; 9] = [
        IntervalUnit::Year,
        IntervalUnit::Month,
        IntervalUnit::Week,
        IntervalUnit::Day,
        IntervalUnit::Hour,
        IntervalUnit::Minute,
        IntervalUnit::Second,
        IntervalUnit::Millisecond,
        IntervalUnit::Microsecond,
    ];

    /// Returns the unit name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            IntervalUnit::Year => "year",
            IntervalUnit::Month => "month",
            IntervalUnit::Week => "week",
            IntervalUnit::Day => "day",
            IntervalUnit::Hour => "hour",
            IntervalUnit::Minute => "minute",
            IntervalUnit::Second => "second",
            IntervalUnit::Millisecond => "millisecond",
            IntervalUnit::Microsecond => "microsecond",
        }
    }

    /// Parses a unit name.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Interval`] if `name` is not in the fixed set.
    pub fn parse(name: &str) -> Result<Self> {
        IntervalUnit::ALL
            .into_iter()
            .find(|u| u.name() == name)
            .ok_or_else(|| CompileError::Interval {
                unit: name.to_string(),
            })
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
