//! Values-table validation.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::binder::BindError;
use crate::catalog::Catalog;
use crate::error::Result;
use crate::ir::{TypeRef, ValuesTable, ValuesTypes};
use crate::types::{ResolvedType, Value};

/// Errors raised for malformed values tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValuesError {
    /// No rows, or rows without fields.
    #[error("values list is empty")]
    Empty,
    /// A row's field set differs from the first row's.
    #[error("inconsistent fields in row {row}")]
    InconsistentFields { row: usize },
    /// A row field has no declared type.
    #[error("missing type for field `{0}`")]
    MissingType(String),
    /// A declared type names a field the rows do not have.
    #[error("unexpected type for field `{0}` absent from rows")]
    UnexpectedType(String),
    /// A literal cannot be bound to its declared type.
    #[error("value for field `{field}` in row {row} is not a valid {expected}")]
    TypeMismatch {
        row: usize,
        field: String,
        expected: String,
    },
}

/// Validates `table` and fills in `table.resolved` with the type of every
/// row field.
///
/// `resolve_type` turns a written type into a resolved one; it is supplied
/// by the binder so column-type targets resolve against the current scope.
///
/// # Errors
///
/// Returns a [`ValuesError`] for an empty table, inconsistent rows, an
/// untyped field, a type map naming fields the rows lack or an ill-typed
/// literal, [`BindError::UnknownSchema`] when
/// types come from a schema the catalog does not know, and whatever
/// `resolve_type` returns.
pub fn validate(
    table: &mut ValuesTable,
    catalog: &Catalog,
    resolve_type: &mut dyn FnMut(&mut TypeRef) -> Result<ResolvedType>,
) -> Result<()> {
    let Some(first) = table.rows.first() else {
        return Err(ValuesError::Empty.into());
    };
    if first.is_empty() {
        return Err(ValuesError::Empty.into());
    }

    for (row, fields) in table.rows.iter().enumerate().skip(1) {
        if !fields.keys().eq(first.keys()) {
            return Err(ValuesError::InconsistentFields { row }.into());
        }
    }

    let mut resolved = BTreeMap::new();
    match &mut table.types {
        ValuesTypes::Map(types) => {
            for field in first.keys() {
                let target = types
                    .get_mut(field)
                    .ok_or_else(|| ValuesError::MissingType(field.clone()))?;
                resolved.insert(field.clone(), resolve_type(target)?);
            }
            if let Some(extra) = types.keys().find(|k| !first.contains_key(*k)) {
                return Err(ValuesError::UnexpectedType(extra.clone()).into());
            }
        }
        ValuesTypes::Schema(name) => {
            let schema = catalog
                .get(name)
                .ok_or_else(|| BindError::UnknownSchema(name.clone()))?;
            for field in first.keys() {
                let def = schema
                    .get_field(field)
                    .ok_or_else(|| ValuesError::MissingType(field.clone()))?;
                resolved.insert(field.clone(), ResolvedType::Builtin(def.data_type));
            }
        }
    }

    for (row, fields) in table.rows.iter().enumerate() {
        for (field, value) in fields {
            if let Some(ResolvedType::Builtin(t)) = resolved.get(field) {
                if !t.accepts(value) {
                    return Err(ValuesError::TypeMismatch {
                        row,
                        field: field.clone(),
                        expected: t.to_string(),
                    }
                    .into());
                }
            }
        }
    }

    table.resolved = resolved;
    Ok(())
}

/// Number of bound parameters the table contributes.
#[must_use]
pub fn param_count(table: &ValuesTable) -> usize {
    table.rows.len() * table.rows.first().map_or(0, BTreeMap::len)
}

/// Row-major parameter values with their types.
pub fn param_values(table: &ValuesTable) -> impl Iterator<Item = (&Value, Option<&ResolvedType>)> {
    table.rows.iter().flat_map(move |row| {
        row.iter()
            .map(move |(field, value)| (value, table.resolved.get(field)))
    })
}
