//! Field-set merging for struct/map projections.
//!
//! Within one projection position (the operands of a `merge` chain),
//! projections of the same source with the same kind collapse into a
//! single node at the position of the first one. Fields keep first-seen
//! order with unseen fields appended in the order they appear; nested
//! associations merge recursively by association name. Foreign keys are
//! never added.

use tracing::debug;

use crate::ir::{FieldSet, Node, Projection, ProjectionKind};

/// Normalizes a projection tree.
#[must_use]
pub fn normalize(node: Node) -> Node {
    match node {
        Node::Merge(..) => {
            let mut operands = Vec::new();
            flatten_merge(node, &mut operands);
            let merged = merge_operands(operands);
            fold_merge(merged)
        }
        Node::Tuple(items) => Node::Tuple(items.into_iter().map(normalize).collect()),
        Node::Map(entries) => Node::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key, normalize(value)))
                .collect(),
        ),
        Node::Alias { value, name } => Node::Alias {
            value: Box::new(normalize(*value)),
            name,
        },
        Node::StructSelect(mut p) => {
            p.set = dedupe(p.set);
            Node::StructSelect(p)
        }
        Node::MapSelect(mut p) => {
            p.set = dedupe(p.set);
            Node::MapSelect(p)
        }
        other => other,
    }
}

/// Merges `from` into `into`, keeping `into`'s order first.
pub fn merge_sets(into: &mut FieldSet, from: FieldSet) {
    for field in from.fields {
        if !into.fields.contains(&field) {
            into.fields.push(field);
        }
    }
    for nested in from.nested {
        match into.nested.iter_mut().find(|n| n.assoc == nested.assoc) {
            Some(existing) => merge_sets(&mut existing.set, nested.set),
            None => into.nested.push(nested),
        }
    }
}

fn dedupe(set: FieldSet) -> FieldSet {
    let mut out = FieldSet::default();
    merge_sets(&mut out, set);
    out
}

fn flatten_merge(node: Node, out: &mut Vec<Node>) {
    match node {
        Node::Merge(left, right) => {
            flatten_merge(*left, out);
            flatten_merge(*right, out);
        }
        other => out.push(normalize(other)),
    }
}

fn projection_parts(node: &mut Node) -> Option<(ProjectionKind, &mut Projection)> {
    match node {
        Node::StructSelect(p) => Some((ProjectionKind::Struct, p)),
        Node::MapSelect(p) => Some((ProjectionKind::Map, p)),
        _ => None,
    }
}

/// Two projections target the same source when their resolved slots match,
/// or, before resolution, when they name the source the same way.
fn same_source(a: &Projection, b: &Projection) -> bool {
    match (a.slot, b.slot) {
        (Some(x), Some(y)) => x == y,
        _ => a.source == b.source,
    }
}

fn merge_operands(operands: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(operands.len());

    for mut operand in operands {
        let Some((kind, incoming)) = projection_parts(&mut operand) else {
            out.push(operand);
            continue;
        };

        let target = out.iter_mut().find_map(|existing| match projection_parts(existing) {
            Some((k, p)) if k == kind && same_source(p, incoming) => Some(p),
            _ => None,
        });

        match target {
            Some(existing) => {
                debug!(
                    source = ?existing.source,
                    ?kind,
                    added = ?incoming.set.fields,
                    "merging repeated projection"
                );
                merge_sets(&mut existing.set, std::mem::take(&mut incoming.set));
            }
            None => out.push(operand),
        }
    }
    out
}

fn fold_merge(operands: Vec<Node>) -> Node {
    let mut iter = operands.into_iter();
    let Some(first) = iter.next() else {
        return Node::Map(Vec::new());
    };
    iter.fold(first, Node::merge)
}
