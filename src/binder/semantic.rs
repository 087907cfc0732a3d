//! Semantic binding of a query tree.
//!
//! The binder walks a [`Query`] in place: it resolves sources, named
//! bindings and field references against the scope stack, runs the
//! fragment, cast and values stages on the nodes it meets, assigns
//! parameter indices and finally normalizes the outermost projection.

use std::sync::Arc;

use tracing::debug;

use crate::catalog::{Catalog, SchemaDef};
use crate::compiler::{cast, fragment, merge, values, CastError, CompilerConfig};
use crate::error::{CompileError, Result};
use crate::ir::{
    ArgKind, FieldName, FieldRef, FieldSet, Node, Param, PathElem, Projection, Query,
    ResolvedField, Source, SourceKind, TypeRef, ValuesTable,
};
use crate::types::{DataType, ResolvedType, Value};

use super::alias::{AliasError, AliasTable};
use super::scope::{QueryScope, ScopeStack, SourceShape};

/// Errors that can occur during binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// `as(name)` matched no enclosing query.
    UnknownBinding(String),
    /// `parent_as(name)` used outside a subquery, or the enclosing query
    /// has no such binding.
    NoParentBinding(String),
    /// Positional source the current query does not have.
    UnknownSource(usize),
    /// Schema not registered in the catalog.
    UnknownSchema(String),
    /// Field missing from a schema-backed or values source.
    UnknownField { source: String, field: String },
    /// Association missing from a schema.
    UnknownAssociation { schema: String, assoc: String },
    /// Two sources of one query share an `as` name.
    DuplicateBinding(String),
    /// Subqueries nested deeper than the configured limit.
    NestingTooDeep { depth: usize },
}

impl std::fmt::Display for BindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindError::UnknownBinding(name) => write!(f, "unknown binding `{name}`"),
            BindError::NoParentBinding(name) => write!(f, "no parent binding `{name}`"),
            BindError::UnknownSource(position) => {
                write!(f, "unknown source at position {position}")
            }
            BindError::UnknownSchema(name) => write!(f, "unknown schema `{name}`"),
            BindError::UnknownField { source, field } => {
                write!(f, "unknown field `{field}` on `{source}`")
            }
            BindError::UnknownAssociation { schema, assoc } => {
                write!(f, "unknown association `{assoc}` on `{schema}`")
            }
            BindError::DuplicateBinding(name) => {
                write!(f, "binding `{name}` is defined twice in one query")
            }
            BindError::NestingTooDeep { depth } => {
                write!(f, "subqueries nested deeper than {depth} levels")
            }
        }
    }
}

impl std::error::Error for BindError {}

/// Main binder for one compile.
pub struct Binder<'a> {
    /// Schema metadata.
    catalog: &'a Catalog,
    config: &'a CompilerConfig,
    scopes: ScopeStack,
    /// Alias table of each open query, innermost last.
    aliases: Vec<AliasTable>,
    next_param: usize,
}

impl<'a> Binder<'a> {
    /// Creates a binder over `catalog`.
    #[must_use]
    pub fn new(catalog: &'a Catalog, config: &'a CompilerConfig) -> Self {
        Binder {
            catalog,
            config,
            scopes: ScopeStack::new(),
            aliases: Vec::new(),
            next_param: 0,
        }
    }

    /// Number of parameter indices assigned so far.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.next_param
    }

    /// Binds `query` and every subquery inside it.
    ///
    /// # Errors
    ///
    /// Returns the first binding, fragment, cast, alias, values or
    /// structural error found.
    pub fn bind_query(&mut self, query: &mut Query) -> Result<()> {
        if self.scopes.depth() > self.config.max_subquery_depth {
            return Err(BindError::NestingTooDeep {
                depth: self.config.max_subquery_depth,
            }
            .into());
        }

        self.scopes.push(QueryScope::new());
        self.aliases.push(AliasTable::default());
        let result = self.bind_query_body(query);
        self.aliases.pop();
        self.scopes.pop();
        result
    }

    fn bind_query_body(&mut self, query: &mut Query) -> Result<()> {
        self.declare_source(&mut query.from)?;
        for join in &mut query.joins {
            self.declare_source(&mut join.source)?;
        }

        let table = AliasTable::collect(
            query.select.as_ref(),
            self.config.allow_identical_alias_redefinition,
        )?;
        debug!(aliases = ?table.names().collect::<Vec<_>>(), "collected select aliases");
        if let Some(current) = self.aliases.last_mut() {
            *current = table;
        }

        if let Some(select) = &mut query.select {
            self.bind_projection(select)?;
        }

        self.bind_source_body(&mut query.from)?;
        for join in &mut query.joins {
            self.bind_source_body(&mut join.source)?;
            if let Some(on) = &mut join.on {
                self.bind_expr(on)?;
            }
        }

        for expr in &mut query.wheres {
            if self.config.reject_aggregates_in_where && contains_aggregate(expr) {
                return Err(CompileError::invalid(
                    "aggregates are not allowed in `where`; use `having`",
                ));
            }
            self.bind_expr(expr)?;
        }
        for expr in &mut query.group_by {
            self.bind_expr(expr)?;
        }
        for expr in &mut query.having {
            self.bind_expr(expr)?;
        }
        for term in &mut query.order_by {
            self.bind_expr(&mut term.expr)?;
        }
        for expr in [&mut query.limit, &mut query.offset].into_iter().flatten() {
            self.bind_expr(expr)?;
            cast::type_param(expr, ResolvedType::Builtin(DataType::Integer));
        }

        if let Some(select) = query.select.take() {
            query.select = Some(merge::normalize(select));
        }

        debug!(
            depth = self.scopes.depth(),
            sources = query.source_count(),
            params = self.next_param,
            "bound query"
        );
        Ok(())
    }

    /// Registers a source in the current scope.
    fn declare_source(&mut self, source: &mut Source) -> Result<()> {
        let shape = match &mut source.kind {
            SourceKind::Schema(name) => SourceShape::Schema(
                self.catalog
                    .get(name)
                    .ok_or_else(|| BindError::UnknownSchema(name.clone()))?,
            ),
            SourceKind::Table(name) => SourceShape::Schemaless(name.clone()),
            SourceKind::Values(table) => {
                self.validate_values(table)?;
                SourceShape::Values(table.resolved.clone())
            }
            SourceKind::Subquery(_) | SourceKind::Fragment(_) => SourceShape::Opaque,
        };

        let scope = self
            .scopes
            .current_mut()
            .ok_or_else(|| CompileError::invalid("source declared outside a query"))?;
        scope.add_source(source.binding.clone(), shape)?;
        Ok(())
    }

    /// Binds what a source carries: values parameters, subqueries and
    /// fragments.
    fn bind_source_body(&mut self, source: &mut Source) -> Result<()> {
        match &mut source.kind {
            SourceKind::Schema(_) | SourceKind::Table(_) => Ok(()),
            SourceKind::Values(table) => {
                self.assign_values(table);
                Ok(())
            }
            SourceKind::Subquery(query) => self.bind_query(query),
            SourceKind::Fragment(node @ Node::Fragment(_)) => self.bind_expr(node),
            SourceKind::Fragment(other) => Err(CompileError::invalid(format!(
                "fragment source must be a fragment, got {}",
                other.kind_name()
            ))),
        }
    }

    /// Binds the outermost projection, where `selected_as` may appear.
    fn bind_projection(&mut self, node: &mut Node) -> Result<()> {
        match node {
            Node::Alias { value, .. } => self.bind_expr(value),
            Node::Tuple(items) => items.iter_mut().try_for_each(|n| self.bind_projection(n)),
            Node::Map(entries) => entries
                .iter_mut()
                .try_for_each(|(_, n)| self.bind_projection(n)),
            Node::Merge(left, right) => {
                self.bind_projection(left)?;
                self.bind_projection(right)
            }
            other => self.bind_expr(other),
        }
    }

    /// Binds an expression node and everything under it.
    ///
    /// # Errors
    ///
    /// Returns the first error found in the subtree.
    pub fn bind_expr(&mut self, node: &mut Node) -> Result<()> {
        match node {
            Node::Literal(_) => Ok(()),
            Node::Param(param) => {
                self.assign_param(param);
                Ok(())
            }
            Node::Field(field) => Ok(self.bind_field(field)?),
            Node::BindingRef(binding) => {
                let (slot, _) = self.scopes.lookup_binding(&binding.name)?;
                binding.slot = Some(slot);
                Ok(())
            }
            Node::ParentBindingRef(binding) => {
                let (slot, _) = self.scopes.lookup_parent(&binding.name)?;
                binding.slot = Some(slot);
                Ok(())
            }
            Node::Operator { kind, operands } => {
                if operands.len() != kind.arity() {
                    return Err(CompileError::invalid(format!(
                        "`{}` takes {} operand(s), got {}",
                        kind.name(),
                        kind.arity(),
                        operands.len()
                    )));
                }
                if kind.is_date_arithmetic() && !matches!(operands.last(), Some(Node::Interval(_))) {
                    return Err(CompileError::invalid(format!(
                        "`{}` needs an interval operand",
                        kind.name()
                    )));
                }
                for operand in operands.iter_mut() {
                    self.bind_expr(operand)?;
                }
                cast::propagate_implicit(*kind, operands);
                Ok(())
            }
            Node::Aggregate(agg) => {
                if agg.args.len() != agg.kind.arity() {
                    return Err(CompileError::invalid(format!(
                        "`{}` takes {} argument(s), got {}",
                        agg.kind.name(),
                        agg.kind.arity(),
                        agg.args.len()
                    )));
                }
                for arg in &mut agg.args {
                    self.bind_expr(arg)?;
                }
                if let Some(filter) = &mut agg.filter {
                    self.bind_expr(filter)?;
                }
                Ok(())
            }
            Node::Fragment(frag) => {
                fragment::process(frag)?;
                for arg in &mut frag.args {
                    match arg {
                        ArgKind::Parameter(n) => self.bind_expr(n)?,
                        ArgKind::Splice(Node::Param(p)) => self.assign_param(p),
                        ArgKind::Identifier(_) | ArgKind::Constant(_) | ArgKind::Splice(_) => {}
                    }
                }
                Ok(())
            }
            Node::Cast(c) => {
                self.bind_expr(&mut c.value)?;
                cast::check_operand(&c.value)?;
                let resolved = self.resolve_type(&mut c.target)?;
                cast::attach(c, resolved);
                Ok(())
            }
            Node::Subquery { query, .. } => self.bind_query(query),
            Node::ValuesTable(table) => {
                self.validate_values(table)?;
                self.assign_values(table);
                Ok(())
            }
            Node::StructSelect(p) | Node::MapSelect(p) => self.bind_select(p),
            Node::Merge(left, right) => {
                self.bind_expr(left)?;
                self.bind_expr(right)
            }
            Node::Alias { name, .. } => Err(AliasError::NotOutermost(name.clone()).into()),
            Node::AliasRef(name) => {
                let table = self
                    .aliases
                    .last()
                    .ok_or_else(|| AliasError::Undefined(name.clone()))?;
                Ok(table.require(name)?)
            }
            Node::JsonPath { field, path } => {
                flatten_json_path(field, path);
                if !matches!(&**field, Node::Field(_)) {
                    return Err(CompileError::invalid(format!(
                        "json_extract_path needs a field, got {}",
                        field.kind_name()
                    )));
                }
                self.bind_expr(field)?;
                for elem in path.iter_mut() {
                    if let PathElem::Dynamic(n) = elem {
                        self.bind_expr(n)?;
                    }
                }
                Ok(())
            }
            Node::Interval(interval) => {
                self.bind_expr(&mut interval.count)?;
                cast::type_param(&mut interval.count, ResolvedType::Builtin(DataType::Integer));
                Ok(())
            }
            Node::Tuple(items) => items.iter_mut().try_for_each(|n| self.bind_expr(n)),
            Node::Map(entries) => entries
                .iter_mut()
                .try_for_each(|(_, n)| self.bind_expr(n)),
        }
    }

    fn assign_param(&mut self, param: &mut Param) {
        param.index = Some(self.next_param);
        self.next_param += 1;
    }

    fn assign_values(&mut self, table: &mut ValuesTable) {
        table.first_param = Some(self.next_param);
        self.next_param += values::param_count(table);
    }

    fn validate_values(&self, table: &mut ValuesTable) -> Result<()> {
        values::validate(table, self.catalog, &mut |target| self.resolve_type(target))
    }

    /// Resolves a field reference in place.
    fn bind_field(&self, field: &mut FieldRef) -> std::result::Result<(), BindError> {
        let (slot, source) = self.scopes.resolve(&field.source)?;
        let (storage_name, data_type) = match (&field.name, &source.shape) {
            (FieldName::Raw(name), _) => (name.clone(), None),
            (FieldName::Schema(name), SourceShape::Schema(schema)) => {
                let def = schema.get_field(name).ok_or_else(|| BindError::UnknownField {
                    source: schema.name.clone(),
                    field: name.clone(),
                })?;
                (def.source.clone(), Some(def.data_type))
            }
            (FieldName::Schema(name), SourceShape::Values(types)) => match types.get(name) {
                Some(ResolvedType::Builtin(t)) => (name.clone(), Some(*t)),
                Some(_) => (name.clone(), None),
                None => {
                    return Err(BindError::UnknownField {
                        source: "values".to_string(),
                        field: name.clone(),
                    })
                }
            },
            (FieldName::Schema(name), SourceShape::Schemaless(_) | SourceShape::Opaque) => {
                (name.clone(), None)
            }
        };
        field.resolved = Some(ResolvedField {
            slot,
            storage_name,
            data_type,
        });
        Ok(())
    }

    /// Resolves a cast or values type target.
    fn resolve_type(&self, target: &mut TypeRef) -> Result<ResolvedType> {
        match target {
            TypeRef::Builtin(name) => Ok(cast::resolve_builtin(name)?),
            TypeRef::Parameterized(descriptor) => Ok(ResolvedType::Parameterized(descriptor.clone())),
            TypeRef::ColumnType(field) => {
                self.bind_field(field)
                    .map_err(|e| CastError::UnresolvedType {
                        field: field.name.as_str().to_string(),
                        reason: e.to_string(),
                    })?;
                field
                    .resolved
                    .as_ref()
                    .and_then(|r| r.data_type)
                    .map(ResolvedType::Builtin)
                    .ok_or_else(|| {
                        CastError::UnresolvedType {
                            field: field.name.as_str().to_string(),
                            reason: "field has no declared type".to_string(),
                        }
                        .into()
                    })
            }
        }
    }

    /// Resolves a struct/map projection's source and checks its field set
    /// against schema metadata.
    fn bind_select(&mut self, projection: &mut Projection) -> Result<()> {
        let (slot, source) = self.scopes.resolve(&projection.source)?;
        let schema = match &source.shape {
            SourceShape::Schema(schema) => Some(Arc::clone(schema)),
            _ => None,
        };
        if let Some(schema) = schema {
            self.check_field_set(&schema, &projection.set)?;
        }
        projection.slot = Some(slot);
        Ok(())
    }

    fn check_field_set(&self, schema: &SchemaDef, set: &FieldSet) -> Result<()> {
        for field in &set.fields {
            if schema.get_field(field).is_none() {
                return Err(BindError::UnknownField {
                    source: schema.name.clone(),
                    field: field.clone(),
                }
                .into());
            }
        }

        for nested in &set.nested {
            let assoc = schema
                .get_association(&nested.assoc)
                .ok_or_else(|| BindError::UnknownAssociation {
                    schema: schema.name.clone(),
                    assoc: nested.assoc.clone(),
                })?;
            let related = self
                .catalog
                .get(&assoc.related)
                .ok_or_else(|| BindError::UnknownSchema(assoc.related.clone()))?;

            if !set.fields.contains(&assoc.owner_key) {
                debug!(
                    schema = %schema.name,
                    assoc = %assoc.name,
                    key = %assoc.owner_key,
                    "projection omits owner key needed to load association"
                );
            }
            if !nested.set.fields.contains(&assoc.related_key) {
                debug!(
                    schema = %related.name,
                    assoc = %assoc.name,
                    key = %assoc.related_key,
                    "nested projection omits related key needed to load association"
                );
            }
            self.check_field_set(&related, &nested.set)?;
        }
        Ok(())
    }
}

/// Collapses `json_extract_path(json_extract_path(f, a), b)` into
/// `json_extract_path(f, a ++ b)`.
fn flatten_json_path(field: &mut Node, path: &mut Vec<PathElem>) {
    while let Node::JsonPath {
        field: inner_field,
        path: inner_path,
    } = field
    {
        let mut combined = std::mem::take(inner_path);
        combined.append(path);
        *path = combined;
        let inner = std::mem::replace(&mut **inner_field, Node::Literal(Value::Null));
        *field = inner;
    }
}

fn contains_aggregate(node: &Node) -> bool {
    match node {
        Node::Aggregate(_) => true,
        Node::Operator { operands: items, .. } | Node::Tuple(items) => {
            items.iter().any(contains_aggregate)
        }
        Node::Fragment(f) => f.args.iter().any(|a| contains_aggregate(a.node())),
        Node::Cast(c) => contains_aggregate(&c.value),
        Node::Merge(left, right) => contains_aggregate(left) || contains_aggregate(right),
        Node::Alias { value, .. } => contains_aggregate(value),
        Node::JsonPath { field, path } => {
            contains_aggregate(field)
                || path
                    .iter()
                    .any(|p| matches!(p, PathElem::Dynamic(n) if contains_aggregate(n)))
        }
        Node::Interval(i) => contains_aggregate(&i.count),
        Node::Map(entries) => entries.iter().any(|(_, n)| contains_aggregate(n)),
        _ => false,
    }
}
