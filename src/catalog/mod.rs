//! Catalog of schema metadata.

mod schema;

pub use schema::{AssocDef, Cardinality, Catalog, FieldDef, SchemaDef};
