//! Expression node definitions.
//!
//! A [`Node`] tree is both the compiler's input and its output: the
//! compile stages fill in the resolution slots (`resolved`, `slot`,
//! `index`, `data_type`) and normalize projections, but never change the
//! node vocabulary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{DataType, ResolvedType, TypeDescriptor, Value};

use super::ops::{AggregateKind, IntervalUnit, OperatorKind, SubqueryKind};
use super::query::Query;

/// How a field reference or projection names its source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceRef {
    /// Positional binding in the current query (0 = `from`).
    Position(usize),
    /// Named binding (`as`), searched through every enclosing query.
    Binding(String),
    /// Named binding of the immediately enclosing query (`parent_as`).
    ParentBinding(String),
}

/// Location of a resolved source: `level` queries outward, at `position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingSlot {
    /// 0 = current query, 1 = enclosing query, ...
    pub level: usize,
    /// Source position inside that query.
    pub position: usize,
}

/// Field name form. Schema names go through schema metadata, raw names do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldName {
    Schema(String),
    Raw(String),
}

impl FieldName {
    /// Returns the name as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            FieldName::Schema(s) | FieldName::Raw(s) => s,
        }
    }
}

/// Result of resolving a field reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedField {
    pub slot: BindingSlot,
    /// Name the backend emits.
    pub storage_name: String,
    /// Declared type; `None` when the backend decides (raw or schemaless).
    pub data_type: Option<DataType>,
}

/// Reference to a field of a bound source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    pub source: SourceRef,
    pub name: FieldName,
    pub resolved: Option<ResolvedField>,
}

impl FieldRef {
    /// Schema field of a positional source.
    #[must_use]
    pub fn new(position: usize, name: impl Into<String>) -> Self {
        FieldRef {
            source: SourceRef::Position(position),
            name: FieldName::Schema(name.into()),
            resolved: None,
        }
    }

    /// Field of an arbitrary source.
    #[must_use]
    pub fn on(source: SourceRef, name: FieldName) -> Self {
        FieldRef {
            source,
            name,
            resolved: None,
        }
    }
}

/// Reference to a whole named binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingRef {
    pub name: String,
    pub slot: Option<BindingSlot>,
}

/// An interpolated runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub value: Value,
    /// Position in the bound-parameter list, assigned at compile.
    pub index: Option<usize>,
    /// Type enforced at the binding boundary.
    pub data_type: Option<ResolvedType>,
    /// Set for `splice(...)` arguments; expands to one placeholder per element.
    pub splice: bool,
}

impl Param {
    /// Creates an untyped parameter.
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        Param {
            value: value.into(),
            index: None,
            data_type: None,
            splice: false,
        }
    }
}

/// Aggregate call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub kind: AggregateKind,
    pub args: Vec<Node>,
    pub distinct: bool,
    pub filter: Option<Box<Node>>,
}

/// Fragment argument, tagged with how it reaches the generated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgKind {
    /// Compiled as an ordinary expression; parameters inside are bound.
    Parameter(Node),
    /// Embedded inline as a quoted identifier.
    Identifier(Node),
    /// Embedded inline as a literal constant.
    Constant(Node),
    /// Runtime list expanded into one placeholder per element.
    Splice(Node),
}

impl ArgKind {
    /// Returns the wrapped node.
    #[must_use]
    pub fn node(&self) -> &Node {
        match self {
            ArgKind::Parameter(n) | ArgKind::Identifier(n) | ArgKind::Constant(n) | ArgKind::Splice(n) => n,
        }
    }

    /// Returns the wrapped node mutably.
    pub fn node_mut(&mut self) -> &mut Node {
        match self {
            ArgKind::Parameter(n) | ArgKind::Identifier(n) | ArgKind::Constant(n) | ArgKind::Splice(n) => n,
        }
    }

    /// Returns whether the argument is embedded into the text.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self, ArgKind::Identifier(_) | ArgKind::Constant(_))
    }
}

/// Raw backend text with positional placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Text as written, escapes included.
    pub text: String,
    /// Literal segments between placeholders, escapes removed. Empty until
    /// processed; afterwards `parts.len() == args.len() + 1`.
    pub parts: Vec<String>,
    pub args: Vec<ArgKind>,
}

/// Cast target as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeRef {
    /// Builtin type name, e.g. `"integer"`.
    Builtin(String),
    /// Type of the referenced field.
    ColumnType(FieldRef),
    /// Opaque descriptor.
    Parameterized(TypeDescriptor),
}

impl TypeRef {
    /// Builtin target by name.
    #[must_use]
    pub fn builtin(name: impl Into<String>) -> Self {
        TypeRef::Builtin(name.into())
    }
}

/// Explicit type annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cast {
    pub value: Box<Node>,
    pub target: TypeRef,
    pub resolved: Option<ResolvedType>,
}

/// Where a values table gets its field types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValuesTypes {
    Map(BTreeMap<String, TypeRef>),
    /// Field types of a named schema.
    Schema(String),
}

/// Inline constant-row table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuesTable {
    pub rows: Vec<BTreeMap<String, Value>>,
    pub types: ValuesTypes,
    /// Types of the row fields, filled in by validation.
    pub resolved: BTreeMap<String, ResolvedType>,
    /// Index of the first bound parameter; values are bound row-major.
    pub first_param: Option<usize>,
}

impl ValuesTable {
    /// Creates an unvalidated values table.
    #[must_use]
    pub fn new(rows: Vec<BTreeMap<String, Value>>, types: ValuesTypes) -> Self {
        ValuesTable {
            rows,
            types,
            resolved: BTreeMap::new(),
            first_param: None,
        }
    }

    /// Field names of the table in binding order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.rows
            .first()
            .map(|row| row.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// Struct vs. map projection semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionKind {
    Struct,
    Map,
}

/// Ordered field set of a projection, with nested association selections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    pub fields: Vec<String>,
    pub nested: Vec<NestedSelect>,
}

impl FieldSet {
    /// Creates a flat field set.
    #[must_use]
    pub fn of<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        FieldSet {
            fields: fields.into_iter().map(Into::into).collect(),
            nested: Vec::new(),
        }
    }

    /// Adds a nested association selection.
    #[must_use]
    pub fn with_nested(mut self, assoc: impl Into<String>, kind: ProjectionKind, set: FieldSet) -> Self {
        self.nested.push(NestedSelect {
            assoc: assoc.into(),
            kind,
            set,
        });
        self
    }
}

/// Projection of an association inside a [`FieldSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedSelect {
    pub assoc: String,
    pub kind: ProjectionKind,
    pub set: FieldSet,
}

/// Field-filtered reshaping of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub source: SourceRef,
    pub set: FieldSet,
    pub slot: Option<BindingSlot>,
}

/// One step of a JSON path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathElem {
    Key(String),
    Index(i64),
    /// Computed at runtime.
    Dynamic(Node),
}

/// Count and unit for datetime arithmetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalValue {
    pub count: Box<Node>,
    pub unit: IntervalUnit,
}

/// Query expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Constant embedded in the query.
    Literal(Value),
    /// Interpolated runtime value.
    Param(Param),
    Field(FieldRef),
    BindingRef(BindingRef),
    ParentBindingRef(BindingRef),
    Operator {
        kind: OperatorKind,
        operands: Vec<Node>,
    },
    Aggregate(Aggregate),
    Fragment(Fragment),
    Cast(Cast),
    Subquery {
        query: Box<Query>,
        kind: SubqueryKind,
    },
    ValuesTable(ValuesTable),
    StructSelect(Projection),
    MapSelect(Projection),
    Merge(Box<Node>, Box<Node>),
    /// `selected_as(value, name)`.
    Alias {
        value: Box<Node>,
        name: String,
    },
    /// `selected_as(name)`.
    AliasRef(String),
    JsonPath {
        field: Box<Node>,
        path: Vec<PathElem>,
    },
    Interval(IntervalValue),
    /// Positional projection container.
    Tuple(Vec<Node>),
    /// Keyed projection container.
    Map(Vec<(String, Node)>),
}

impl Node {
    /// Literal constant.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Node::Literal(value.into())
    }

    /// Interpolated parameter (`^value`).
    #[must_use]
    pub fn param(value: impl Into<Value>) -> Self {
        Node::Param(Param::new(value))
    }

    /// Schema field of a positional source.
    #[must_use]
    pub fn field(position: usize, name: impl Into<String>) -> Self {
        Node::Field(FieldRef::new(position, name))
    }

    /// Raw (string-named) field of a positional source.
    #[must_use]
    pub fn raw_field(position: usize, name: impl Into<String>) -> Self {
        Node::Field(FieldRef::on(
            SourceRef::Position(position),
            FieldName::Raw(name.into()),
        ))
    }

    /// Schema field of a named binding.
    #[must_use]
    pub fn binding_field(binding: impl Into<String>, name: impl Into<String>) -> Self {
        Node::Field(FieldRef::on(
            SourceRef::Binding(binding.into()),
            FieldName::Schema(name.into()),
        ))
    }

    /// Schema field of the enclosing query's named binding.
    #[must_use]
    pub fn parent_field(binding: impl Into<String>, name: impl Into<String>) -> Self {
        Node::Field(FieldRef::on(
            SourceRef::ParentBinding(binding.into()),
            FieldName::Schema(name.into()),
        ))
    }

    /// `as(name)`.
    #[must_use]
    pub fn binding(name: impl Into<String>) -> Self {
        Node::BindingRef(BindingRef {
            name: name.into(),
            slot: None,
        })
    }

    /// `parent_as(name)`.
    #[must_use]
    pub fn parent_binding(name: impl Into<String>) -> Self {
        Node::ParentBindingRef(BindingRef {
            name: name.into(),
            slot: None,
        })
    }

    /// Operator application.
    #[must_use]
    pub fn op(kind: OperatorKind, operands: Vec<Node>) -> Self {
        Node::Operator { kind, operands }
    }

    /// `left == right`.
    #[must_use]
    pub fn equals(left: Node, right: Node) -> Self {
        Node::op(OperatorKind::Eq, vec![left, right])
    }

    /// `left and right`.
    #[must_use]
    pub fn and(left: Node, right: Node) -> Self {
        Node::op(OperatorKind::And, vec![left, right])
    }

    /// Aggregate call without distinct or filter.
    #[must_use]
    pub fn aggregate(kind: AggregateKind, args: Vec<Node>) -> Self {
        Node::Aggregate(Aggregate {
            kind,
            args,
            distinct: false,
            filter: None,
        })
    }

    /// Unprocessed fragment.
    #[must_use]
    pub fn fragment(text: impl Into<String>, args: Vec<ArgKind>) -> Self {
        Node::Fragment(Fragment {
            text: text.into(),
            parts: Vec::new(),
            args,
        })
    }

    /// `type(value, target)`.
    #[must_use]
    pub fn cast(value: Node, target: TypeRef) -> Self {
        Node::Cast(Cast {
            value: Box::new(value),
            target,
            resolved: None,
        })
    }

    /// Subquery used as an expression.
    #[must_use]
    pub fn subquery(query: Query, kind: SubqueryKind) -> Self {
        Node::Subquery {
            query: Box::new(query),
            kind,
        }
    }

    /// `struct(source, fields)`.
    #[must_use]
    pub fn struct_select(source: SourceRef, set: FieldSet) -> Self {
        Node::StructSelect(Projection {
            source,
            set,
            slot: None,
        })
    }

    /// `map(source, fields)`.
    #[must_use]
    pub fn map_select(source: SourceRef, set: FieldSet) -> Self {
        Node::MapSelect(Projection {
            source,
            set,
            slot: None,
        })
    }

    /// `merge(left, right)`.
    #[must_use]
    pub fn merge(left: Node, right: Node) -> Self {
        Node::Merge(Box::new(left), Box::new(right))
    }

    /// `selected_as(value, name)`.
    #[must_use]
    pub fn alias(value: Node, name: impl Into<String>) -> Self {
        Node::Alias {
            value: Box::new(value),
            name: name.into(),
        }
    }

    /// `selected_as(name)`.
    #[must_use]
    pub fn alias_ref(name: impl Into<String>) -> Self {
        Node::AliasRef(name.into())
    }

    /// `json_extract_path(field, path)`.
    #[must_use]
    pub fn json_path(field: Node, path: Vec<PathElem>) -> Self {
        Node::JsonPath {
            field: Box::new(field),
            path,
        }
    }

    /// Interval of `count` units.
    #[must_use]
    pub fn interval(count: Node, unit: IntervalUnit) -> Self {
        Node::Interval(IntervalValue {
            count: Box::new(count),
            unit,
        })
    }

    /// Short name of the node variant, for diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Literal(_) => "literal",
            Node::Param(_) => "parameter",
            Node::Field(_) => "field",
            Node::BindingRef(_) => "as",
            Node::ParentBindingRef(_) => "parent_as",
            Node::Operator { .. } => "operator",
            Node::Aggregate(_) => "aggregate",
            Node::Fragment(_) => "fragment",
            Node::Cast(_) => "type",
            Node::Subquery { .. } => "subquery",
            Node::ValuesTable(_) => "values",
            Node::StructSelect(_) => "struct",
            Node::MapSelect(_) => "map",
            Node::Merge(..) => "merge",
            Node::Alias { .. } => "selected_as/2",
            Node::AliasRef(_) => "selected_as/1",
            Node::JsonPath { .. } => "json_extract_path",
            Node::Interval(_) => "interval",
            Node::Tuple(_) => "tuple",
            Node::Map(_) => "map literal",
        }
    }

    /// Statically known result type, if any.
    ///
    /// Meaningful once the node has been compiled; before that, field and
    /// cast types are unknown.
    #[must_use]
    pub fn data_type(&self) -> Option<ResolvedType> {
        match self {
            Node::Literal(v) => v.data_type().map(ResolvedType::Builtin),
            Node::Param(p) => p
                .data_type
                .clone()
                .or_else(|| p.value.data_type().map(ResolvedType::Builtin)),
            Node::Field(f) => f
                .resolved
                .as_ref()
                .and_then(|r| r.data_type)
                .map(ResolvedType::Builtin),
            Node::Operator { kind, operands } => operator_type(*kind, operands),
            Node::Aggregate(agg) => {
                let input = agg.args.first().and_then(Node::data_type).and_then(|t| match t {
                    ResolvedType::Builtin(b) => Some(b),
                    _ => None,
                });
                agg.kind.output_type(input).map(ResolvedType::Builtin)
            }
            Node::Cast(cast) => cast.resolved.clone(),
            Node::Alias { value, .. } => value.data_type(),
            Node::Subquery {
                kind: SubqueryKind::Exists,
                ..
            } => Some(ResolvedType::Builtin(DataType::Boolean)),
            _ => None,
        }
    }
}

fn operator_type(kind: OperatorKind, operands: &[Node]) -> Option<ResolvedType> {
    if kind.is_predicate() {
        return Some(ResolvedType::Builtin(DataType::Boolean));
    }
    match kind {
        OperatorKind::Coalesce => operands.iter().find_map(Node::data_type),
        OperatorKind::DateAdd => Some(ResolvedType::Builtin(DataType::Date)),
        OperatorKind::FromNow | OperatorKind::Ago => {
            Some(ResolvedType::Builtin(DataType::UtcDatetime))
        }
        _ => operands.first().and_then(Node::data_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates_are_boolean() {
        let node = Node::equals(Node::field(0, "id"), Node::param(1i64));
        assert_eq!(
            node.data_type(),
            Some(ResolvedType::Builtin(DataType::Boolean))
        );
    }

    #[test]
    fn test_count_is_integer() {
        let node = Node::aggregate(AggregateKind::Count0, vec![]);
        assert_eq!(
            node.data_type(),
            Some(ResolvedType::Builtin(DataType::Integer))
        );
    }

    #[test]
    fn test_field_set_builder() {
        let set = FieldSet::of(["id", "title"]).with_nested(
            "comments",
            ProjectionKind::Map,
            FieldSet::of(["body"]),
        );
        assert_eq!(set.fields, vec!["id", "title"]);
        assert_eq!(set.nested[0].assoc, "comments");
    }
}
