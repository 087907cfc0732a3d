//! Binder module for name resolution.
//!
//! The binder resolves a query tree against the catalog:
//! - Positional sources, `as` and `parent_as` bindings through a scope stack
//! - Schema and raw field references, with storage names and types
//! - `selected_as` definitions and references through a per-query alias table
//!
//! The output is the same tree with its resolution slots filled in.

mod alias;
mod scope;
mod semantic;

pub use alias::{AliasError, AliasTable};
pub use scope::{BoundSource, QueryScope, ScopeStack, SourceShape};
pub use semantic::{BindError, Binder};
