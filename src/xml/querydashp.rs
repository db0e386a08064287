//! `queryDashP` — the upsert-by-path operator used everywhere SAML documents are built
//! (spec §4.1). For each step the existing node is selected if present, otherwise an
//! element (or attribute) is created. `[0]` forces append-at-end creation; `[n]` (n>0)
//! selects-or-creates exactly `n` siblings, preserving insertion order.

use super::xpath::{parse_path, Predicate, Step};
use super::{Dom, NodeId};

/// Creates or locates the node addressed by `path` from `ctx`, optionally setting its
/// final text/attribute value, and returns the resulting node.
///
/// `before`, if given, is the sibling a *newly created* top-level element should be
/// inserted ahead of (used to keep e.g. `Issuer` ahead of a later-inserted `Signature`).
pub fn query_dash_p(
    dom: &mut Dom,
    ctx: NodeId,
    path: &str,
    value: &str,
    before: Option<NodeId>,
) -> NodeId {
    let steps = parse_path(path);
    let mut current = ctx;
    let last_index = steps.len().saturating_sub(1);

    for (i, step) in steps.iter().enumerate() {
        let is_last = i == last_index;
        match step {
            Step::Attribute(name) => {
                if !value.is_empty() {
                    dom.set_attr(current, name, value);
                }
                return current;
            }
            Step::Element { tag, predicates } => {
                current = select_or_create(dom, current, tag, predicates, before);
                if is_last && !value.is_empty() {
                    dom.set_text(current, value);
                }
            }
        }
    }

    current
}

fn select_or_create(
    dom: &mut Dom,
    parent: NodeId,
    tag: &str,
    predicates: &[Predicate],
    before: Option<NodeId>,
) -> NodeId {
    let position = predicates.iter().find_map(|p| match p {
        Predicate::Position(n) => Some(*n),
        _ => None,
    });
    let attr_preds: Vec<(&str, &str)> = predicates
        .iter()
        .filter_map(|p| match p {
            Predicate::Attr(k, v) => Some((k.as_str(), v.as_str())),
            _ => None,
        })
        .collect();

    match position {
        Some(0) => create_tagged(dom, parent, tag, &attr_preds, before),
        Some(n) => {
            ensure_n_siblings(dom, parent, tag, n, before);
            nth_tagged_child(dom, parent, tag, n).expect("just ensured")
        }
        None => {
            if let Some(existing) = find_matching_child(dom, parent, tag, &attr_preds) {
                existing
            } else {
                create_tagged(dom, parent, tag, &attr_preds, before)
            }
        }
    }
}

fn find_matching_child(
    dom: &Dom,
    parent: NodeId,
    tag: &str,
    attr_preds: &[(&str, &str)],
) -> Option<NodeId> {
    dom.element_children(parent).into_iter().find(|&c| {
        dom.tag_of(c) == Some(tag)
            && attr_preds.iter().all(|(k, v)| dom.attr(c, k) == Some(*v))
    })
}

fn nth_tagged_child(dom: &Dom, parent: NodeId, tag: &str, n: usize) -> Option<NodeId> {
    dom.element_children(parent)
        .into_iter()
        .filter(|&c| dom.tag_of(c) == Some(tag))
        .nth(n - 1)
}

fn count_tagged_children(dom: &Dom, parent: NodeId, tag: &str) -> usize {
    dom.element_children(parent)
        .iter()
        .filter(|&&c| dom.tag_of(c) == Some(tag))
        .count()
}

fn ensure_n_siblings(dom: &mut Dom, parent: NodeId, tag: &str, n: usize, before: Option<NodeId>) {
    while count_tagged_children(dom, parent, tag) < n {
        create_tagged(dom, parent, tag, &[], before);
    }
}

fn create_tagged(
    dom: &mut Dom,
    parent: NodeId,
    tag: &str,
    attr_preds: &[(&str, &str)],
    before: Option<NodeId>,
) -> NodeId {
    let new_id = dom.create_element(None, tag);
    // create_element with `None` parent avoids double-appending; we place it explicitly.
    dom.node_mut(new_id).parent = Some(parent);

    let index = before.and_then(|b| dom.children(parent).iter().position(|&c| c == b));
    dom.insert_child_at(parent, new_id, index);

    for (k, v) in attr_preds {
        dom.set_attr(new_id, k, v);
    }
    new_id
}
