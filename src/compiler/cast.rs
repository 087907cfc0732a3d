//! Type cast resolution and implicit parameter typing.

use thiserror::Error;

use crate::ir::{Cast, Node, OperatorKind};
use crate::types::{DataType, ResolvedType};

/// Errors raised while resolving a cast target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CastError {
    /// A column-type target's field reference did not resolve to a type.
    #[error("unresolved type from field `{field}`: {reason}")]
    UnresolvedType { field: String, reason: String },
    /// A builtin target name outside the recognized set.
    #[error("unknown builtin `{0}`")]
    UnknownBuiltin(String),
    /// The cast value is not something a cast may wrap.
    #[error("cannot cast a {0}; expected a parameter, aggregate, fragment, comparison or coalesce")]
    UnsupportedOperand(&'static str),
}

/// Resolves a builtin target name.
///
/// # Errors
///
/// Returns [`CastError::UnknownBuiltin`] for names outside the set.
pub fn resolve_builtin(name: &str) -> Result<ResolvedType, CastError> {
    DataType::from_name(name)
        .map(ResolvedType::Builtin)
        .ok_or_else(|| CastError::UnknownBuiltin(name.to_string()))
}

/// Checks that `value` is something a cast may wrap.
///
/// # Errors
///
/// Returns [`CastError::UnsupportedOperand`] otherwise.
pub fn check_operand(value: &Node) -> Result<(), CastError> {
    match value {
        Node::Param(_) | Node::Aggregate(_) | Node::Fragment(_) => Ok(()),
        Node::Operator { kind, .. } if kind.is_comparison() || *kind == OperatorKind::Coalesce => {
            Ok(())
        }
        other => Err(CastError::UnsupportedOperand(other.kind_name())),
    }
}

/// Attaches the resolved type to the cast and to a wrapped parameter, so
/// the backend enforces it at the binding boundary as well as on decode.
pub fn attach(cast: &mut Cast, resolved: ResolvedType) {
    if let Node::Param(param) = &mut *cast.value {
        param.data_type = Some(resolved.clone());
    }
    cast.resolved = Some(resolved);
}

/// Gives an untyped parameter the type `ty`. Typed parameters keep theirs.
pub fn type_param(node: &mut Node, ty: ResolvedType) {
    if let Node::Param(param) = node {
        if param.data_type.is_none() && !param.splice {
            param.data_type = Some(ty);
        }
    }
}

/// Propagates a field's type onto untyped parameter operands.
///
/// `field == ^x` types `^x` as the field; `field in ^list` types the list
/// as an array of the field type; `like`/`ilike` patterns are strings.
/// Runs after the operands are bound, so field types are known.
pub fn propagate_implicit(kind: OperatorKind, operands: &mut [Node]) {
    if operands.len() != 2 {
        return;
    }

    match kind {
        OperatorKind::Like | OperatorKind::Ilike => {
            type_param(&mut operands[1], ResolvedType::Builtin(DataType::String));
        }
        OperatorKind::In => {
            if let Some(ResolvedType::Builtin(t)) = field_type(&operands[0]) {
                type_param(&mut operands[1], ResolvedType::Array(t));
            }
        }
        _ if kind.is_comparison() || kind.is_arithmetic() || kind == OperatorKind::Coalesce => {
            let (left, right) = operands.split_at_mut(1);
            let (left, right) = (&mut left[0], &mut right[0]);
            if let Some(t) = field_type(left) {
                type_param(right, t);
            } else if let Some(t) = field_type(right) {
                type_param(left, t);
            }
        }
        _ => {}
    }
}

/// Type of a typed field-like operand (field, json path excluded).
fn field_type(node: &Node) -> Option<ResolvedType> {
    match node {
        Node::Field(_) | Node::Cast(_) => node.data_type(),
        _ => None,
    }
}
