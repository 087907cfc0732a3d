//! Query containers: sources, joins and clauses.

use serde::{Deserialize, Serialize};

use super::node::{Node, ValuesTable};

/// A query (or subquery) expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Source at position 0.
    pub from: Source,
    /// Joined sources at positions 1.. in order.
    pub joins: Vec<Join>,
    pub wheres: Vec<Node>,
    /// Outermost projection.
    pub select: Option<Node>,
    pub group_by: Vec<Node>,
    pub having: Vec<Node>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Node>,
    pub offset: Option<Node>,
    pub distinct: bool,
}

impl Query {
    /// Starts a query over `source`.
    #[must_use]
    pub fn from(source: Source) -> Self {
        Query {
            from: source,
            joins: Vec::new(),
            wheres: Vec::new(),
            select: None,
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    /// Adds a join.
    #[must_use]
    pub fn join(mut self, qual: JoinQual, source: Source, on: Option<Node>) -> Self {
        self.joins.push(Join { qual, source, on });
        self
    }

    /// Adds a `where` filter (filters are AND-ed).
    #[must_use]
    pub fn filter(mut self, expr: Node) -> Self {
        self.wheres.push(expr);
        self
    }

    /// Sets the projection, replacing any previous one.
    #[must_use]
    pub fn select(mut self, expr: Node) -> Self {
        self.select = Some(expr);
        self
    }

    /// Merges `expr` into the existing projection (`select_merge`).
    #[must_use]
    pub fn select_merge(mut self, expr: Node) -> Self {
        self.select = Some(match self.select.take() {
            Some(existing) => Node::merge(existing, expr),
            None => expr,
        });
        self
    }

    /// Adds a `group_by` expression.
    #[must_use]
    pub fn group_by(mut self, expr: Node) -> Self {
        self.group_by.push(expr);
        self
    }

    /// Adds a `having` filter.
    #[must_use]
    pub fn having(mut self, expr: Node) -> Self {
        self.having.push(expr);
        self
    }

    /// Adds an `order_by` term.
    #[must_use]
    pub fn order_by(mut self, expr: Node, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy { expr, direction });
        self
    }

    /// Sets the row limit.
    #[must_use]
    pub fn limit(mut self, expr: Node) -> Self {
        self.limit = Some(expr);
        self
    }

    /// Sets the row offset.
    #[must_use]
    pub fn offset(mut self, expr: Node) -> Self {
        self.offset = Some(expr);
        self
    }

    /// Sets `distinct`.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Number of sources (from + joins).
    #[must_use]
    pub fn source_count(&self) -> usize {
        1 + self.joins.len()
    }

    /// Sources in position order.
    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        std::iter::once(&self.from).chain(self.joins.iter().map(|j| &j.source))
    }
}

/// A queryable source, optionally named with `as`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub kind: SourceKind,
    pub binding: Option<String>,
}

impl Source {
    /// Schema-backed source.
    #[must_use]
    pub fn schema(name: impl Into<String>) -> Self {
        Source {
            kind: SourceKind::Schema(name.into()),
            binding: None,
        }
    }

    /// Schemaless table source.
    #[must_use]
    pub fn table(name: impl Into<String>) -> Self {
        Source {
            kind: SourceKind::Table(name.into()),
            binding: None,
        }
    }

    /// Values-table source.
    #[must_use]
    pub fn values(table: ValuesTable) -> Self {
        Source {
            kind: SourceKind::Values(table),
            binding: None,
        }
    }

    /// Subquery source.
    #[must_use]
    pub fn subquery(query: Query) -> Self {
        Source {
            kind: SourceKind::Subquery(Box::new(query)),
            binding: None,
        }
    }

    /// Fragment source.
    #[must_use]
    pub fn fragment(fragment: Node) -> Self {
        Source {
            kind: SourceKind::Fragment(fragment),
            binding: None,
        }
    }

    /// Names the source (`as: name`).
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.binding = Some(name.into());
        self
    }
}

/// What a source reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Schema registered in the catalog.
    Schema(String),
    /// Table without schema metadata.
    Table(String),
    Values(ValuesTable),
    Subquery(Box<Query>),
    /// A [`Node::Fragment`].
    Fragment(Node),
}

/// Join qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinQual {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    InnerLateral,
    LeftLateral,
}

impl JoinQual {
    /// Returns whether the joined source may reference earlier sources.
    #[must_use]
    pub fn is_lateral(&self) -> bool {
        matches!(self, JoinQual::InnerLateral | JoinQual::LeftLateral)
    }
}

/// A joined source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub qual: JoinQual,
    pub source: Source,
    pub on: Option<Node>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// `order_by` term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub expr: Node,
    pub direction: SortDirection,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FieldSet, SourceRef};

    #[test]
    fn test_select_merge_composes() {
        let q = Query::from(Source::schema("Post"))
            .select(Node::struct_select(
                SourceRef::Position(0),
                FieldSet::of(["title"]),
            ))
            .select_merge(Node::struct_select(
                SourceRef::Position(0),
                FieldSet::of(["body"]),
            ));
        assert!(matches!(q.select, Some(Node::Merge(..))));
    }

    #[test]
    fn test_sources_in_position_order() {
        let q = Query::from(Source::schema("Post").named("post")).join(
            JoinQual::Left,
            Source::schema("Comment").named("comment"),
            None,
        );
        let names: Vec<_> = q.sources().map(|s| s.binding.as_deref()).collect();
        assert_eq!(names, vec![Some("post"), Some("comment")]);
        assert_eq!(q.source_count(), 2);
    }
}
