//! `selected_as` alias table.

use thiserror::Error;

use crate::ir::Node;

/// Errors raised for `selected_as` definitions and references.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AliasError {
    #[error("duplicate alias `{0}`")]
    Duplicate(String),
    #[error("undefined alias `{0}`")]
    Undefined(String),
    #[error("alias not in outermost select: `{0}`")]
    NotOutermost(String),
}

/// Aliases defined by one query's outermost projection.
#[derive(Debug, Default)]
pub struct AliasTable {
    entries: Vec<(String, Node)>,
    allow_identical: bool,
}

impl AliasTable {
    /// Creates an empty table.
    ///
    /// With `allow_identical`, redefining a name with a structurally equal
    /// value is accepted as a no-op.
    #[must_use]
    pub fn new(allow_identical: bool) -> Self {
        AliasTable {
            entries: Vec::new(),
            allow_identical,
        }
    }

    /// Collects the aliases at the outermost positions of `select`: the
    /// projection itself, tuple elements, map values and merge operands.
    ///
    /// # Errors
    ///
    /// Returns [`AliasError::Duplicate`] when a name is defined twice.
    pub fn collect(select: Option<&Node>, allow_identical: bool) -> Result<Self, AliasError> {
        let mut table = AliasTable::new(allow_identical);
        if let Some(select) = select {
            table.walk(select)?;
        }
        Ok(table)
    }

    fn walk(&mut self, node: &Node) -> Result<(), AliasError> {
        match node {
            Node::Alias { value, name } => self.define(name, value),
            Node::Tuple(items) => items.iter().try_for_each(|n| self.walk(n)),
            Node::Map(entries) => entries.iter().try_for_each(|(_, n)| self.walk(n)),
            Node::Merge(left, right) => {
                self.walk(left)?;
                self.walk(right)
            }
            _ => Ok(()),
        }
    }

    /// Registers `name → value`.
    ///
    /// # Errors
    ///
    /// Returns [`AliasError::Duplicate`] if `name` is already defined.
    pub fn define(&mut self, name: &str, value: &Node) -> Result<(), AliasError> {
        match self.resolve(name) {
            Some(existing) if self.allow_identical && existing == value => Ok(()),
            Some(_) => Err(AliasError::Duplicate(name.to_string())),
            None => {
                self.entries.push((name.to_string(), value.clone()));
                Ok(())
            }
        }
    }

    /// Looks up the value defined for `name`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&Node> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Checks that `name` is defined.
    ///
    /// # Errors
    ///
    /// Returns [`AliasError::Undefined`] otherwise.
    pub fn require(&self, name: &str) -> Result<(), AliasError> {
        self.resolve(name)
            .map(|_| ())
            .ok_or_else(|| AliasError::Undefined(name.to_string()))
    }

    /// Defined names in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}
