//! Schema metadata consulted when resolving field references.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};
use crate::types::DataType;

/// Registry of the schemas a query may name as sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Schema name -> definition.
    schemas: HashMap<String, Arc<SchemaDef>>,
}

impl Catalog {
    /// Creates a new empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Catalog {
            schemas: HashMap::new(),
        }
    }

    /// Registers a schema.
    ///
    /// # Errors
    ///
    /// Returns an error if a schema with the same name already exists.
    pub fn register(&mut self, schema: SchemaDef) -> Result<()> {
        if self.schemas.contains_key(&schema.name) {
            return Err(CompileError::SchemaError(format!(
                "Schema '{}' already exists",
                schema.name
            )));
        }
        self.schemas.insert(schema.name.clone(), Arc::new(schema));
        Ok(())
    }

    /// Registers a schema, builder style.
    ///
    /// # Errors
    ///
    /// Returns an error if a schema with the same name already exists.
    pub fn with_schema(mut self, schema: SchemaDef) -> Result<Self> {
        self.register(schema)?;
        Ok(self)
    }

    /// Retrieves a schema by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<SchemaDef>> {
        self.schemas.get(name).cloned()
    }

    /// Checks if a schema exists in the catalog.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Returns all schema names.
    #[must_use]
    pub fn schema_names(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }
}

/// Definition of a schema-backed source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDef {
    /// Schema name, as used in query sources.
    pub name: String,
    /// Storage (table) name.
    pub source: String,
    /// Ordered field definitions.
    pub fields: Vec<FieldDef>,
    /// Field names forming the primary key.
    pub primary_key: Vec<String>,
    /// Associations to other schemas.
    pub associations: Vec<AssocDef>,
}

impl SchemaDef {
    /// Creates a new schema with validation.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails (no fields, duplicate names,
    /// primary key naming a missing field).
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        fields: Vec<FieldDef>,
        primary_key: Vec<String>,
    ) -> Result<Self> {
        let schema = SchemaDef {
            name: name.into(),
            source: source.into(),
            fields,
            primary_key,
            associations: Vec::new(),
        };
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(CompileError::SchemaError(format!(
                "Schema '{}' must have at least one field",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(&field.name) {
                return Err(CompileError::SchemaError(format!(
                    "Duplicate field name '{}' in schema '{}'",
                    field.name, self.name
                )));
            }
        }

        for pk in &self.primary_key {
            if !self.fields.iter().any(|f| &f.name == pk) {
                return Err(CompileError::SchemaError(format!(
                    "Primary key field '{pk}' not found in schema '{}'",
                    self.name
                )));
            }
        }

        Ok(())
    }

    /// Adds an association.
    ///
    /// # Errors
    ///
    /// Returns an error if the association name collides with a field or
    /// another association.
    pub fn with_association(mut self, assoc: AssocDef) -> Result<Self> {
        if self.get_field(&assoc.name).is_some() || self.get_association(&assoc.name).is_some() {
            return Err(CompileError::SchemaError(format!(
                "Association '{}' collides with an existing name in schema '{}'",
                assoc.name, self.name
            )));
        }
        self.associations.push(assoc);
        Ok(self)
    }

    /// Finds a field definition by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Finds an association by name.
    #[must_use]
    pub fn get_association(&self, name: &str) -> Option<&AssocDef> {
        self.associations.iter().find(|a| a.name == name)
    }
}

/// Definition of a single schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name as written in queries.
    pub name: String,
    /// Storage (column) name.
    pub source: String,
    /// Declared type.
    pub data_type: DataType,
}

impl FieldDef {
    /// Creates a field whose storage name equals its name.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        FieldDef {
            source: name.clone(),
            name,
            data_type,
        }
    }

    /// Overrides the storage name.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Association cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// `belongs_to` / `has_one`.
    One,
    /// `has_many`.
    Many,
}

/// Association from one schema to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssocDef {
    /// Association name.
    pub name: String,
    /// Related schema name.
    pub related: String,
    /// Cardinality.
    pub cardinality: Cardinality,
    /// Key on the owner side.
    pub owner_key: String,
    /// Key on the related side.
    pub related_key: String,
}

impl AssocDef {
    /// Creates a new association.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        related: impl Into<String>,
        cardinality: Cardinality,
        owner_key: impl Into<String>,
        related_key: impl Into<String>,
    ) -> Self {
        AssocDef {
            name: name.into(),
            related: related.into(),
            cardinality,
            owner_key: owner_key.into(),
            related_key: related_key.into(),
        }
    }
}
