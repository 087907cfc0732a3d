//! Per-query scopes for source and binding resolution.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::catalog::SchemaDef;
use crate::ir::{BindingSlot, SourceRef};
use crate::types::ResolvedType;

use super::semantic::BindError;

/// What a bound source exposes to field resolution.
#[derive(Debug, Clone)]
pub enum SourceShape {
    /// Schema-backed: fields resolve through schema metadata.
    Schema(Arc<SchemaDef>),
    /// Named table without metadata.
    Schemaless(String),
    /// Values table with its resolved field types.
    Values(BTreeMap<String, ResolvedType>),
    /// Subquery or fragment; fields pass through untyped.
    Opaque,
}

/// A source registered in a query scope.
#[derive(Debug, Clone)]
pub struct BoundSource {
    /// Position in the query (0 = `from`).
    pub position: usize,
    /// `as` name, if any.
    pub name: Option<String>,
    pub shape: SourceShape,
}

/// Sources of one query.
#[derive(Debug, Default)]
pub struct QueryScope {
    sources: Vec<BoundSource>,
}

impl QueryScope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the next source.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::DuplicateBinding`] if another source of this
    /// query already uses `name`.
    pub fn add_source(&mut self, name: Option<String>, shape: SourceShape) -> Result<usize, BindError> {
        if let Some(name) = &name {
            if self.lookup(name).is_some() {
                return Err(BindError::DuplicateBinding(name.clone()));
            }
        }
        let position = self.sources.len();
        self.sources.push(BoundSource {
            position,
            name,
            shape,
        });
        Ok(position)
    }

    /// Source at `position`.
    #[must_use]
    pub fn source(&self, position: usize) -> Option<&BoundSource> {
        self.sources.get(position)
    }

    /// Source named `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&BoundSource> {
        self.sources
            .iter()
            .find(|s| s.name.as_deref() == Some(name))
    }

    /// Number of registered sources.
    pub(crate) fn len(&self) -> usize {
        self.sources.len()
    }
}

/// Stack of query scopes, innermost last.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<QueryScope>,
}

impl ScopeStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters a query.
    pub fn push(&mut self, scope: QueryScope) {
        self.frames.push(scope);
        debug!(depth = self.frames.len(), "entered query scope");
    }

    /// Leaves the innermost query.
    pub fn pop(&mut self) -> Option<QueryScope> {
        let scope = self.frames.pop();
        debug!(
            depth = self.frames.len(),
            sources = scope.as_ref().map_or(0, QueryScope::len),
            "left query scope"
        );
        scope
    }

    /// Number of open scopes.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Innermost scope.
    pub fn current_mut(&mut self) -> Option<&mut QueryScope> {
        self.frames.last_mut()
    }

    /// Resolves a source reference from the innermost scope.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::UnknownSource`] for a position the current query
    /// does not have, and the errors of [`Self::lookup_binding`] and
    /// [`Self::lookup_parent`] for named references.
    pub fn resolve(&self, source: &SourceRef) -> Result<(BindingSlot, &BoundSource), BindError> {
        match source {
            SourceRef::Position(position) => self
                .frames
                .last()
                .and_then(|scope| scope.source(*position))
                .map(|s| {
                    (
                        BindingSlot {
                            level: 0,
                            position: *position,
                        },
                        s,
                    )
                })
                .ok_or(BindError::UnknownSource(*position)),
            SourceRef::Binding(name) => self.lookup_binding(name),
            SourceRef::ParentBinding(name) => self.lookup_parent(name),
        }
    }

    /// Finds `name` in the innermost scope that defines it, walking outward
    /// through every enclosing query.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::UnknownBinding`] if no scope defines `name`.
    pub fn lookup_binding(&self, name: &str) -> Result<(BindingSlot, &BoundSource), BindError> {
        self.frames
            .iter()
            .rev()
            .enumerate()
            .find_map(|(level, scope)| {
                scope.lookup(name).map(|s| {
                    (
                        BindingSlot {
                            level,
                            position: s.position,
                        },
                        s,
                    )
                })
            })
            .ok_or_else(|| BindError::UnknownBinding(name.to_string()))
    }

    /// Finds `name` in the immediately enclosing query only.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::NoParentBinding`] when there is no enclosing
    /// query or it does not define `name`.
    pub fn lookup_parent(&self, name: &str) -> Result<(BindingSlot, &BoundSource), BindError> {
        let parent = self
            .frames
            .len()
            .checked_sub(2)
            .and_then(|i| self.frames.get(i));
        parent
            .and_then(|scope| scope.lookup(name))
            .map(|s| {
                (
                    BindingSlot {
                        level: 1,
                        position: s.position,
                    },
                    s,
                )
            })
            .ok_or_else(|| BindError::NoParentBinding(name.to_string()))
    }
}
