//! query-core - query-expression compiler core
//!
//! Takes a tree-shaped query expression (operators, aggregates, fragments,
//! named bindings, casts, values tables, struct/map projections, alias
//! references) and produces validated, backend-agnostic IR plus the ordered
//! bound-parameter list and a statement-cache key. Text generation belongs
//! to the backend translator.

pub mod binder;
pub mod catalog;
pub mod compiler;
pub mod error;
pub mod ir;
pub mod types;

pub use catalog::{AssocDef, Cardinality, Catalog, FieldDef, SchemaDef};
pub use compiler::{BoundParam, CacheKey, CompiledQuery, Compiler, CompilerConfig};
pub use error::{CompileError, Result};
pub use ir::{Node, Query, Source};
pub use types::{DataType, ResolvedType, Value};

/// Compiles `query` against `catalog` with the default configuration.
///
/// # Errors
///
/// Returns the first compile error found.
pub fn compile(catalog: &Catalog, query: Query) -> Result<CompiledQuery> {
    Compiler::new(catalog).compile(query)
}
