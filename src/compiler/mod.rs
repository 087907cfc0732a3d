//! Compiler module for turning query trees into validated IR.
//!
//! [`Compiler::compile`] runs the binder (which drives the fragment, cast,
//! values and merge stages as it meets their nodes), then collects the
//! bound parameters and derives the statement-cache key.

pub mod cast;
pub mod fragment;
pub mod merge;
pub mod params;
pub mod values;

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::binder::Binder;
use crate::catalog::Catalog;
use crate::error::Result;
use crate::ir::Query;
use crate::types::Value;

pub use cast::CastError;
pub use params::{BoundParam, CacheKey};
pub use values::ValuesError;

/// Default limit on subquery nesting.
pub const DEFAULT_MAX_SUBQUERY_DEPTH: usize = 32;

/// Configuration for the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Deepest allowed subquery nesting.
    pub max_subquery_depth: usize,
    /// Accept a second `selected_as` with the same name when its value is
    /// structurally identical to the first.
    pub allow_identical_alias_redefinition: bool,
    /// Reject aggregates in `where` filters.
    pub reject_aggregates_in_where: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_subquery_depth: DEFAULT_MAX_SUBQUERY_DEPTH,
            allow_identical_alias_redefinition: false,
            reject_aggregates_in_where: true,
        }
    }
}

impl CompilerConfig {
    /// Creates a new compiler configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the subquery nesting limit.
    #[must_use]
    pub fn with_max_subquery_depth(mut self, depth: usize) -> Self {
        self.max_subquery_depth = depth;
        self
    }

    /// Sets whether identical `selected_as` redefinitions are accepted.
    #[must_use]
    pub fn with_identical_alias_redefinition(mut self, allow: bool) -> Self {
        self.allow_identical_alias_redefinition = allow;
        self
    }

    /// Sets whether aggregates in `where` are rejected.
    #[must_use]
    pub fn with_aggregates_in_where_rejected(mut self, reject: bool) -> Self {
        self.reject_aggregates_in_where = reject;
        self
    }
}

/// Output of a successful compile.
///
/// Immutable once built; safe to share across threads for translation
/// and cache lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    /// The bound and normalized tree.
    pub query: Query,
    /// Bound parameters in index order.
    pub params: Vec<BoundParam>,
    pub cache_key: CacheKey,
}

impl CompiledQuery {
    /// Execution-time placeholder range of each bound parameter.
    ///
    /// A splice of `n` values occupies `n` consecutive placeholders and
    /// shifts every later parameter by `n - 1`.
    #[must_use]
    pub fn param_layout(&self) -> Vec<Range<usize>> {
        let mut next = 0;
        self.params
            .iter()
            .map(|param| {
                let width = placeholder_width(param);
                let range = next..next + width;
                next += width;
                range
            })
            .collect()
    }

    /// Parameter values in execution placeholder order, splices expanded.
    #[must_use]
    pub fn expanded_params(&self) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.placeholder_count());
        for param in &self.params {
            match (param.splice, param.value.as_list()) {
                (true, Some(items)) => out.extend(items.iter().cloned()),
                _ => out.push(param.value.clone()),
            }
        }
        out
    }

    /// Total number of execution-time placeholders.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.params.iter().map(placeholder_width).sum()
    }
}

fn placeholder_width(param: &BoundParam) -> usize {
    match (param.splice, param.value.as_list()) {
        (true, Some(items)) => items.len(),
        _ => 1,
    }
}

/// Query compiler over a catalog.
pub struct Compiler<'a> {
    catalog: &'a Catalog,
    config: CompilerConfig,
}

impl<'a> Compiler<'a> {
    /// Creates a compiler with the default configuration.
    #[must_use]
    pub fn new(catalog: &'a Catalog) -> Self {
        Self::with_config(catalog, CompilerConfig::default())
    }

    /// Creates a compiler with the given configuration.
    #[must_use]
    pub fn with_config(catalog: &'a Catalog, config: CompilerConfig) -> Self {
        Compiler { catalog, config }
    }

    /// Returns the compiler configuration.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compiles `query` into validated IR, its bound parameters and its
    /// cache key.
    ///
    /// # Errors
    ///
    /// Returns the first error found; no partial IR is produced.
    #[instrument(
        skip_all,
        fields(sources = query.source_count(), wheres = query.wheres.len())
    )]
    pub fn compile(&self, mut query: Query) -> Result<CompiledQuery> {
        let mut binder = Binder::new(self.catalog, &self.config);
        binder.bind_query(&mut query)?;

        let (params, cache_key) = params::finish(&query, binder.param_count())?;
        debug!(
            params = params.len(),
            checksum = cache_key.checksum(),
            "compiled query"
        );

        Ok(CompiledQuery {
            query,
            params,
            cache_key,
        })
    }
}
