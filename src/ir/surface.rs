//! Surface call table.
//!
//! Front ends that speak in calls (`count/2`, `datetime_add/3`, ...) go
//! through [`call`], which maps a name/arity pair onto a [`Node`]. The
//! mapping is fixed; anything outside it is [`CompileError::UnknownCall`].

use std::collections::BTreeMap;

use crate::error::{CompileError, Result};
use crate::types::Value;

use super::node::{
    ArgKind, FieldName, FieldRef, FieldSet, Node, PathElem, SourceRef, TypeRef, ValuesTable,
    ValuesTypes,
};
use super::ops::{AggregateKind, IntervalUnit, OperatorKind, SubqueryKind};
use super::query::Query;

/// One argument of a surface call.
#[derive(Debug, Clone)]
pub enum CallArg {
    /// Any expression.
    Expr(Node),
    /// Bare name (`:distinct`, `:title`).
    Atom(String),
    /// String literal where the call expects text (fragment text, raw field
    /// names, interval units).
    Text(String),
    Fields(FieldSet),
    Source(SourceRef),
    Path(Vec<PathElem>),
    Query(Query),
    Type(TypeRef),
    /// Fragment argument built with [`fragment_arg`].
    Fragment(ArgKind),
    Rows(Vec<BTreeMap<String, Value>>),
    Types(ValuesTypes),
}

impl From<Node> for CallArg {
    fn from(node: Node) -> Self {
        CallArg::Expr(node)
    }
}

/// Wraps a node as `identifier/1`, `constant/1` or `splice/1`.
///
/// # Errors
///
/// Returns [`CompileError::UnknownCall`] for any other name.
pub fn fragment_arg(name: &str, node: Node) -> Result<ArgKind> {
    match name {
        "identifier" => Ok(ArgKind::Identifier(node)),
        "constant" => Ok(ArgKind::Constant(node)),
        "splice" => Ok(ArgKind::Splice(node)),
        _ => Err(CompileError::UnknownCall {
            name: name.to_string(),
            arity: 1,
        }),
    }
}

/// Builds the node for the surface call `name(args...)`.
///
/// # Errors
///
/// Returns [`CompileError::UnknownCall`] when the name/arity pair is not in
/// the table, [`CompileError::Interval`] for an interval unit outside the
/// fixed set, and [`CompileError::InvalidExpression`] when an argument has
/// the wrong shape.
pub fn call(name: &str, args: Vec<CallArg>) -> Result<Node> {
    let arity = args.len();
    let mut args = args.into_iter();
    let mut next = move || {
        args.next()
            .ok_or_else(|| CompileError::invalid(format!("{name}/{arity}: missing argument")))
    };

    if let Some(kind) = binary_operator(name) {
        if arity != 2 {
            return Err(unknown(name, arity));
        }
        let left = expr(name, next()?)?;
        let right = match next()? {
            CallArg::Query(q) if kind == OperatorKind::In => Node::subquery(q, SubqueryKind::Any),
            other => expr(name, other)?,
        };
        return Ok(Node::op(kind, vec![left, right]));
    }

    match (name, arity) {
        ("not", 1) => Ok(Node::op(OperatorKind::Not, vec![expr(name, next()?)?])),
        ("is_nil", 1) => Ok(Node::op(OperatorKind::IsNil, vec![expr(name, next()?)?])),
        ("exists" | "any" | "all", 1) => {
            let kind = match name {
                "exists" => SubqueryKind::Exists,
                "any" => SubqueryKind::Any,
                _ => SubqueryKind::All,
            };
            match next()? {
                CallArg::Query(q) => Ok(Node::subquery(q, kind)),
                other => Err(shape(name, "a subquery", &other)),
            }
        }
        ("count", 0) => Ok(Node::aggregate(AggregateKind::Count0, vec![])),
        ("count", 1) => Ok(Node::aggregate(
            AggregateKind::Count1,
            vec![expr(name, next()?)?],
        )),
        ("count", 2) => {
            let value = expr(name, next()?)?;
            match next()? {
                CallArg::Atom(a) if a == "distinct" => {
                    let mut node = Node::aggregate(AggregateKind::Count1, vec![value]);
                    if let Node::Aggregate(agg) = &mut node {
                        agg.distinct = true;
                    }
                    Ok(node)
                }
                other => Err(shape(name, ":distinct", &other)),
            }
        }
        ("avg" | "sum" | "min" | "max", 1) => {
            let kind = match name {
                "avg" => AggregateKind::Avg,
                "sum" => AggregateKind::Sum,
                "min" => AggregateKind::Min,
                _ => AggregateKind::Max,
            };
            Ok(Node::aggregate(kind, vec![expr(name, next()?)?]))
        }
        ("coalesce", 2) => {
            let left = expr(name, next()?)?;
            let right = expr(name, next()?)?;
            Ok(Node::op(OperatorKind::Coalesce, vec![left, right]))
        }
        ("filter", 2) => {
            let target = expr(name, next()?)?;
            let condition = expr(name, next()?)?;
            match target {
                Node::Aggregate(mut agg) => {
                    agg.filter = Some(Box::new(condition));
                    Ok(Node::Aggregate(agg))
                }
                other => Err(CompileError::invalid(format!(
                    "filter/2 expects an aggregate, got {}",
                    other.kind_name()
                ))),
            }
        }
        ("datetime_add" | "date_add", 3) => {
            let kind = if name == "datetime_add" {
                OperatorKind::DatetimeAdd
            } else {
                OperatorKind::DateAdd
            };
            let base = expr(name, next()?)?;
            let count = expr(name, next()?)?;
            let unit = interval_unit(name, next()?)?;
            Ok(Node::op(kind, vec![base, Node::interval(count, unit)]))
        }
        ("from_now" | "ago", 2) => {
            let kind = if name == "from_now" {
                OperatorKind::FromNow
            } else {
                OperatorKind::Ago
            };
            let count = expr(name, next()?)?;
            let unit = interval_unit(name, next()?)?;
            Ok(Node::op(kind, vec![Node::interval(count, unit)]))
        }
        ("fragment", n) if n >= 1 => {
            let text = match next()? {
                CallArg::Text(t) => t,
                other => return Err(shape(name, "fragment text", &other)),
            };
            let mut fragment_args = Vec::with_capacity(n - 1);
            for _ in 1..n {
                fragment_args.push(match next()? {
                    CallArg::Fragment(arg) => arg,
                    other => ArgKind::Parameter(expr(name, other)?),
                });
            }
            Ok(Node::fragment(text, fragment_args))
        }
        ("identifier" | "constant" | "splice", 1) => Err(CompileError::invalid(format!(
            "{name}/1 is only valid as a fragment argument"
        ))),
        ("values", 2) => {
            let rows = match next()? {
                CallArg::Rows(rows) => rows,
                other => return Err(shape(name, "a list of rows", &other)),
            };
            let types = match next()? {
                CallArg::Types(types) => types,
                CallArg::Atom(schema) => ValuesTypes::Schema(schema),
                other => return Err(shape(name, "a type map", &other)),
            };
            Ok(Node::ValuesTable(ValuesTable::new(rows, types)))
        }
        ("field", 2) => {
            let source = source(name, next()?)?;
            let field = match next()? {
                CallArg::Atom(a) => FieldName::Schema(a),
                CallArg::Text(t) => FieldName::Raw(t),
                other => return Err(shape(name, "a field name", &other)),
            };
            Ok(Node::Field(FieldRef::on(source, field)))
        }
        ("struct" | "map", 2) => {
            let source = source(name, next()?)?;
            let set = match next()? {
                CallArg::Fields(set) => set,
                other => return Err(shape(name, "a field list", &other)),
            };
            Ok(if name == "struct" {
                Node::struct_select(source, set)
            } else {
                Node::map_select(source, set)
            })
        }
        ("merge", 2) => {
            let left = expr(name, next()?)?;
            let right = expr(name, next()?)?;
            Ok(Node::merge(left, right))
        }
        ("json_extract_path", 2) => {
            let field = expr(name, next()?)?;
            match next()? {
                CallArg::Path(path) => Ok(Node::json_path(field, path)),
                other => Err(shape(name, "a path", &other)),
            }
        }
        ("type", 2) => {
            let value = expr(name, next()?)?;
            let target = match next()? {
                CallArg::Type(t) => t,
                CallArg::Atom(a) => TypeRef::Builtin(a),
                CallArg::Expr(Node::Field(f)) => TypeRef::ColumnType(f),
                other => return Err(shape(name, "a type", &other)),
            };
            Ok(Node::cast(value, target))
        }
        ("as", 1) => Ok(Node::binding(atom(name, next()?)?)),
        ("parent_as", 1) => Ok(Node::parent_binding(atom(name, next()?)?)),
        ("selected_as", 1) => Ok(Node::alias_ref(atom(name, next()?)?)),
        ("selected_as", 2) => {
            let value = expr(name, next()?)?;
            Ok(Node::alias(value, atom(name, next()?)?))
        }
        _ => Err(unknown(name, arity)),
    }
}

fn binary_operator(name: &str) -> Option<OperatorKind> {
    Some(match name {
        "==" => OperatorKind::Eq,
        "!=" => OperatorKind::NotEq,
        "<=" => OperatorKind::Lte,
        ">=" => OperatorKind::Gte,
        "<" => OperatorKind::Lt,
        ">" => OperatorKind::Gt,
        "+" => OperatorKind::Add,
        "-" => OperatorKind::Sub,
        "*" => OperatorKind::Mul,
        "/" => OperatorKind::Div,
        "and" => OperatorKind::And,
        "or" => OperatorKind::Or,
        "in" => OperatorKind::In,
        "like" => OperatorKind::Like,
        "ilike" => OperatorKind::Ilike,
        _ => return None,
    })
}

fn unknown(name: &str, arity: usize) -> CompileError {
    CompileError::UnknownCall {
        name: name.to_string(),
        arity,
    }
}

fn shape(name: &str, expected: &str, got: &CallArg) -> CompileError {
    CompileError::invalid(format!("{name}: expected {expected}, got {}", arg_name(got)))
}

fn arg_name(arg: &CallArg) -> &'static str {
    match arg {
        CallArg::Expr(n) => n.kind_name(),
        CallArg::Atom(_) => "atom",
        CallArg::Text(_) => "text",
        CallArg::Fields(_) => "field list",
        CallArg::Source(_) => "source",
        CallArg::Path(_) => "path",
        CallArg::Query(_) => "query",
        CallArg::Type(_) => "type",
        CallArg::Fragment(_) => "fragment argument",
        CallArg::Rows(_) => "rows",
        CallArg::Types(_) => "type map",
    }
}

fn expr(name: &str, arg: CallArg) -> Result<Node> {
    match arg {
        CallArg::Expr(node) => Ok(node),
        CallArg::Query(q) => Ok(Node::subquery(q, SubqueryKind::Any)),
        CallArg::Fragment(_) => Err(CompileError::invalid(format!(
            "{name}: identifier/constant/splice are only valid as fragment arguments"
        ))),
        other => Err(shape(name, "an expression", &other)),
    }
}

fn atom(name: &str, arg: CallArg) -> Result<String> {
    match arg {
        CallArg::Atom(a) => Ok(a),
        other => Err(shape(name, "an atom", &other)),
    }
}

fn source(name: &str, arg: CallArg) -> Result<SourceRef> {
    match arg {
        CallArg::Source(s) => Ok(s),
        CallArg::Expr(Node::BindingRef(b)) => Ok(SourceRef::Binding(b.name)),
        CallArg::Expr(Node::ParentBindingRef(b)) => Ok(SourceRef::ParentBinding(b.name)),
        other => Err(shape(name, "a source", &other)),
    }
}

fn interval_unit(name: &str, arg: CallArg) -> Result<IntervalUnit> {
    match arg {
        CallArg::Text(unit) | CallArg::Atom(unit) => IntervalUnit::parse(&unit),
        other => Err(shape(name, "an interval unit", &other)),
    }
}
