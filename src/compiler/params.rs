//! Bound-parameter collection and statement-cache keys.
//!
//! The cache key is a canonical rendering of the compiled tree. Inline
//! values (literals, `identifier`, `constant`) and splice lengths are part
//! of it; bound parameter values are not.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};
use crate::ir::{
    ArgKind, FieldName, FieldSet, Node, PathElem, Projection, Query, Source, SourceKind,
    SourceRef, TypeRef, ValuesTable,
};
use crate::types::{ResolvedType, Value};

use super::values;

/// One entry of the bound-parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParam {
    pub value: Value,
    /// Type enforced when binding, if known.
    pub data_type: Option<ResolvedType>,
    /// Expands to one placeholder per list element at execution.
    pub splice: bool,
}

/// Statement-cache key of a compiled query.
///
/// Equal keys mean the backend would generate identical text; only the
/// bound values may differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    shape: String,
    checksum: u32,
}

impl CacheKey {
    fn new(shape: String) -> Self {
        let checksum = crc32fast::hash(shape.as_bytes());
        CacheKey { shape, checksum }
    }

    /// Canonical structural rendering.
    #[must_use]
    pub fn shape(&self) -> &str {
        &self.shape
    }

    /// CRC32 of the shape.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.checksum
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.checksum)
    }
}

/// Collects the bound parameters of a compiled query and derives its
/// cache key.
///
/// # Errors
///
/// Returns [`CompileError::InvalidExpression`] if a parameter was left
/// without an index, or an index is claimed twice or never claimed.
pub fn finish(query: &Query, param_count: usize) -> Result<(Vec<BoundParam>, CacheKey)> {
    let mut walker = Walker {
        shape: String::new(),
        params: vec![None; param_count],
    };
    walker.query(query)?;

    let params = walker
        .params
        .into_iter()
        .enumerate()
        .map(|(i, p)| p.ok_or_else(|| CompileError::invalid(format!("parameter {i} was never bound"))))
        .collect::<Result<Vec<_>>>()?;
    Ok((params, CacheKey::new(walker.shape)))
}

struct Walker {
    shape: String,
    params: Vec<Option<BoundParam>>,
}

impl Walker {
    fn put(&mut self, s: &str) {
        self.shape.push_str(s);
    }

    fn claim(&mut self, index: usize, param: BoundParam) -> Result<()> {
        match self.params.get_mut(index) {
            Some(slot @ None) => {
                *slot = Some(param);
                Ok(())
            }
            Some(Some(_)) => Err(CompileError::invalid(format!(
                "parameter {index} bound twice"
            ))),
            None => Err(CompileError::invalid(format!(
                "parameter {index} out of range"
            ))),
        }
    }

    fn query(&mut self, q: &Query) -> Result<()> {
        self.put("(from ");
        self.source(&q.from)?;
        for join in &q.joins {
            let _ = write!(self.shape, " ({:?} ", join.qual);
            self.source(&join.source)?;
            if let Some(on) = &join.on {
                self.put(" on ");
                self.node(on)?;
            }
            self.put(")");
        }
        self.clause("where", &q.wheres)?;
        if let Some(select) = &q.select {
            self.put(" select ");
            self.node(select)?;
        }
        self.clause("group_by", &q.group_by)?;
        self.clause("having", &q.having)?;
        for term in &q.order_by {
            let _ = write!(self.shape, " order_by:{:?} ", term.direction);
            self.node(&term.expr)?;
        }
        if let Some(limit) = &q.limit {
            self.put(" limit ");
            self.node(limit)?;
        }
        if let Some(offset) = &q.offset {
            self.put(" offset ");
            self.node(offset)?;
        }
        if q.distinct {
            self.put(" distinct");
        }
        self.put(")");
        Ok(())
    }

    fn clause(&mut self, name: &str, exprs: &[Node]) -> Result<()> {
        for expr in exprs {
            let _ = write!(self.shape, " {name} ");
            self.node(expr)?;
        }
        Ok(())
    }

    fn source(&mut self, source: &Source) -> Result<()> {
        match &source.kind {
            SourceKind::Schema(name) => {
                let _ = write!(self.shape, "schema:{name}");
            }
            SourceKind::Table(name) => {
                let _ = write!(self.shape, "table:{name}");
            }
            SourceKind::Values(table) => self.values(table)?,
            SourceKind::Subquery(q) => self.query(q)?,
            SourceKind::Fragment(node) => self.node(node)?,
        }
        if let Some(binding) = &source.binding {
            let _ = write!(self.shape, " as:{binding}");
        }
        Ok(())
    }

    fn values(&mut self, table: &ValuesTable) -> Result<()> {
        let _ = write!(self.shape, "values[{}](", table.rows.len());
        for (field, ty) in &table.resolved {
            let _ = write!(self.shape, "{field}:{ty} ");
        }
        self.put(")");

        let Some(first) = table.first_param else {
            return Err(CompileError::invalid("values table was never bound"));
        };
        let typed: Vec<_> = values::param_values(table)
            .map(|(value, ty)| BoundParam {
                value: value.clone(),
                data_type: ty.cloned(),
                splice: false,
            })
            .collect();
        for (offset, param) in typed.into_iter().enumerate() {
            self.claim(first + offset, param)?;
        }
        Ok(())
    }

    fn source_ref(&mut self, source: &SourceRef) {
        let _ = match source {
            SourceRef::Position(i) => write!(self.shape, "&{i}"),
            SourceRef::Binding(name) => write!(self.shape, "as({name})"),
            SourceRef::ParentBinding(name) => write!(self.shape, "parent_as({name})"),
        };
    }

    fn projection(&mut self, tag: &str, p: &Projection) {
        let _ = write!(self.shape, "{tag}(");
        self.source_ref(&p.source);
        self.put(" ");
        self.field_set(&p.set);
        self.put(")");
    }

    fn field_set(&mut self, set: &FieldSet) {
        let _ = write!(self.shape, "[{}", set.fields.join(","));
        for nested in &set.nested {
            let _ = write!(self.shape, " {}:{:?}", nested.assoc, nested.kind);
            self.field_set(&nested.set);
        }
        self.put("]");
    }

    fn param(&mut self, param: &crate::ir::Param) -> Result<()> {
        let index = param
            .index
            .ok_or_else(|| CompileError::invalid("parameter without an index"))?;
        let _ = write!(self.shape, "?{index}");
        if param.splice {
            let len = param.value.as_list().map_or(1, <[Value]>::len);
            let _ = write!(self.shape, "*{len}");
        }
        if let Some(ty) = &param.data_type {
            let _ = write!(self.shape, ":{ty}");
        }
        self.claim(
            index,
            BoundParam {
                value: param.value.clone(),
                data_type: param.data_type.clone(),
                splice: param.splice,
            },
        )
    }

    fn nodes(&mut self, nodes: &[Node]) -> Result<()> {
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                self.put(", ");
            }
            self.node(node)?;
        }
        Ok(())
    }

    fn node(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Literal(v) => {
                let _ = write!(self.shape, "{v:?}");
            }
            Node::Param(p) => self.param(p)?,
            Node::Field(f) => {
                self.source_ref(&f.source);
                let _ = match &f.name {
                    FieldName::Schema(name) => write!(self.shape, ".{name}"),
                    FieldName::Raw(name) => write!(self.shape, ".\"{name}\""),
                };
            }
            Node::BindingRef(b) => {
                let _ = write!(self.shape, "as({})", b.name);
            }
            Node::ParentBindingRef(b) => {
                let _ = write!(self.shape, "parent_as({})", b.name);
            }
            Node::Operator { kind, operands } => {
                let _ = write!(self.shape, "{}(", kind.name());
                self.nodes(operands)?;
                self.put(")");
            }
            Node::Aggregate(agg) => {
                let _ = write!(self.shape, "{}(", agg.kind.name());
                if agg.distinct {
                    self.put("distinct ");
                }
                self.nodes(&agg.args)?;
                self.put(")");
                if let Some(filter) = &agg.filter {
                    self.put(" filter ");
                    self.node(filter)?;
                }
            }
            Node::Fragment(f) => {
                let _ = write!(self.shape, "fragment({:?}", f.text);
                for arg in &f.args {
                    self.put(", ");
                    match arg {
                        ArgKind::Parameter(n) => self.node(n)?,
                        ArgKind::Identifier(n) => {
                            self.put("identifier ");
                            self.node(n)?;
                        }
                        ArgKind::Constant(n) => {
                            self.put("constant ");
                            self.node(n)?;
                        }
                        ArgKind::Splice(n) => {
                            self.put("splice ");
                            self.node(n)?;
                        }
                    }
                }
                self.put(")");
            }
            Node::Cast(cast) => {
                self.put("type(");
                self.node(&cast.value)?;
                match (&cast.resolved, &cast.target) {
                    (Some(ty), _) => {
                        let _ = write!(self.shape, ", {ty})");
                    }
                    (None, TypeRef::Builtin(name)) => {
                        let _ = write!(self.shape, ", {name})");
                    }
                    (None, _) => self.put(", ?)"),
                }
            }
            Node::Subquery { query, kind } => {
                let _ = write!(self.shape, "{}", kind.name());
                self.query(query)?;
            }
            Node::ValuesTable(table) => self.values(table)?,
            Node::StructSelect(p) => self.projection("struct", p),
            Node::MapSelect(p) => self.projection("map", p),
            Node::Merge(left, right) => {
                self.put("merge(");
                self.node(left)?;
                self.put(", ");
                self.node(right)?;
                self.put(")");
            }
            Node::Alias { value, name } => {
                self.put("selected_as(");
                self.node(value)?;
                let _ = write!(self.shape, ", {name})");
            }
            Node::AliasRef(name) => {
                let _ = write!(self.shape, "selected_as({name})");
            }
            Node::JsonPath { field, path } => {
                self.put("json(");
                self.node(field)?;
                for elem in path {
                    match elem {
                        PathElem::Key(k) => {
                            let _ = write!(self.shape, " {k:?}");
                        }
                        PathElem::Index(i) => {
                            let _ = write!(self.shape, " [{i}]");
                        }
                        PathElem::Dynamic(n) => {
                            self.put(" ");
                            self.node(n)?;
                        }
                    }
                }
                self.put(")");
            }
            Node::Interval(interval) => {
                self.put("interval(");
                self.node(&interval.count)?;
                let _ = write!(self.shape, " {})", interval.unit.name());
            }
            Node::Tuple(items) => {
                self.put("{");
                self.nodes(items)?;
                self.put("}");
            }
            Node::Map(entries) => {
                self.put("%{");
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        self.put(", ");
                    }
                    let _ = write!(self.shape, "{key}: ");
                    self.node(value)?;
                }
                self.put("}");
            }
        }
        Ok(())
    }
}
