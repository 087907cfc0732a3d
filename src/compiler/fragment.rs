//! Fragment placeholder processing.
//!
//! `?` is a placeholder unless written as `\?`, which yields a literal `?`
//! and is not counted. Each placeholder consumes the next argument in
//! order. Inline arguments (`identifier`, `constant`) are folded into
//! literals here; splices are turned into splice parameters. Plain
//! arguments are left for the binder to compile as expressions.

use crate::error::{CompileError, Result};
use crate::ir::{ArgKind, Fragment, Node, Param};
use crate::types::Value;

const ESCAPE: char = '\\';
const PLACEHOLDER: char = '?';

/// Splits fragment text into the literal segments around placeholders.
///
/// The result always has one more element than there are placeholders.
#[must_use]
pub fn split_placeholders(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ESCAPE if chars.peek() == Some(&PLACEHOLDER) => {
                chars.next();
                current.push(PLACEHOLDER);
            }
            PLACEHOLDER => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Counts unescaped placeholders in `text`.
#[must_use]
pub fn placeholder_count(text: &str) -> usize {
    split_placeholders(text).len() - 1
}

/// Splits the fragment text, checks arity and normalizes inline and splice
/// arguments. Idempotent on an already processed fragment.
///
/// # Errors
///
/// Returns [`CompileError::FragmentArity`] when the placeholder count
/// (an unexpanded splice counts as one) differs from the argument count,
/// and [`CompileError::InvalidFragmentArgument`] when an inline or splice
/// argument does not carry a value of the right shape.
pub fn process(fragment: &mut Fragment) -> Result<()> {
    let parts = split_placeholders(&fragment.text);
    let placeholders = parts.len() - 1;
    if placeholders != fragment.args.len() {
        return Err(CompileError::FragmentArity {
            fragment: fragment.text.clone(),
            placeholders,
            arguments: fragment.args.len(),
        });
    }
    fragment.parts = parts;

    for (index, arg) in fragment.args.iter_mut().enumerate() {
        let invalid = |reason: &str| CompileError::InvalidFragmentArgument {
            fragment: fragment.text.clone(),
            index,
            reason: reason.to_string(),
        };
        match arg {
            ArgKind::Parameter(_) => {}
            ArgKind::Identifier(node) => {
                let value = inline_value(node).ok_or_else(|| invalid("identifier needs a value"))?;
                if !matches!(value, Value::String(ref s) if !s.is_empty()) {
                    return Err(invalid("identifier must be a non-empty string"));
                }
                *node = Node::Literal(value);
            }
            ArgKind::Constant(node) => {
                let value = inline_value(node).ok_or_else(|| invalid("constant needs a value"))?;
                if !matches!(
                    value,
                    Value::String(_) | Value::Integer(_) | Value::Float(_) | Value::Decimal(_)
                ) {
                    return Err(invalid("constant must be a string or a number"));
                }
                *node = Node::Literal(value);
            }
            ArgKind::Splice(node) => {
                let value = inline_value(node).ok_or_else(|| invalid("splice needs a list"))?;
                match value.as_list() {
                    Some(items) if !items.is_empty() => {}
                    Some(_) => return Err(invalid("splice list must not be empty")),
                    None => return Err(invalid("splice must be given a list")),
                }
                let data_type = match node {
                    Node::Param(p) => p.data_type.take(),
                    _ => None,
                };
                *node = Node::Param(Param {
                    value,
                    index: None,
                    data_type,
                    splice: true,
                });
            }
        }
    }
    Ok(())
}

/// Returns the value of a literal or parameter node.
fn inline_value(node: &Node) -> Option<Value> {
    match node {
        Node::Literal(v) => Some(v.clone()),
        Node::Param(p) => Some(p.value.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str, args: Vec<ArgKind>) -> Fragment {
        match Node::fragment(text, args) {
            Node::Fragment(f) => f,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_split_counts_unescaped_only() {
        assert_eq!(split_placeholders("a ? b ? c"), vec!["a ", " b ", " c"]);
        assert_eq!(split_placeholders(r"x \? y ?"), vec!["x ? y ", ""]);
        assert_eq!(placeholder_count(r"\?\?"), 0);
        assert_eq!(placeholder_count(""), 0);
    }

    #[test]
    fn test_backslash_without_placeholder_is_kept() {
        assert_eq!(split_placeholders(r"a\b ?"), vec![r"a\b ", ""]);
    }

    #[test]
    fn test_arity_mismatch() {
        let mut f = fragment("lower(?) = ?", vec![ArgKind::Parameter(Node::field(0, "title"))]);
        let err = process(&mut f).unwrap_err();
        assert_eq!(
            err,
            CompileError::FragmentArity {
                fragment: "lower(?) = ?".into(),
                placeholders: 2,
                arguments: 1,
            }
        );
    }

    #[test]
    fn test_identifier_is_inlined() {
        let mut f = fragment(
            "? = 1",
            vec![ArgKind::Identifier(Node::param("posts"))],
        );
        process(&mut f).unwrap();
        assert_eq!(f.parts, vec!["", " = 1"]);
        assert_eq!(
            f.args[0],
            ArgKind::Identifier(Node::Literal(Value::from("posts")))
        );
    }

    #[test]
    fn test_constant_rejects_list() {
        let mut f = fragment("?", vec![ArgKind::Constant(Node::param(vec![1i64]))]);
        assert!(matches!(
            process(&mut f),
            Err(CompileError::InvalidFragmentArgument { index: 0, .. })
        ));
    }

    #[test]
    fn test_splice_becomes_single_marker() {
        let mut f = fragment(
            "? in (?)",
            vec![
                ArgKind::Parameter(Node::field(0, "id")),
                ArgKind::Splice(Node::param(vec![1i64, 2, 3])),
            ],
        );
        process(&mut f).unwrap();
        match &f.args[1] {
            ArgKind::Splice(Node::Param(p)) => {
                assert!(p.splice);
                assert_eq!(p.value.as_list().map(<[Value]>::len), Some(3));
            }
            other => panic!("unexpected splice arg: {other:?}"),
        }
    }

    #[test]
    fn test_empty_splice_rejected() {
        let mut f = fragment(
            "?",
            vec![ArgKind::Splice(Node::param(Vec::<i64>::new()))],
        );
        assert!(process(&mut f).is_err());
    }
}
