//! Restricted XPath 1.0 subset (spec §4.1): `/prefix:elem` steps, positional predicates
//! `[n]`, and attribute predicates `[@a="v"]`. Shared by `query*` and `queryDashP`.

use super::{Dom, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `[n]` — 1-based position among same-tag siblings. `0` means "the append
    /// position" (only meaningful to `queryDashP`, never matches an existing node).
    Position(usize),
    /// `[@a="v"]`
    Attr(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// An element step, e.g. `samlp:AuthnRequest`, with zero or more predicates.
    Element { tag: String, predicates: Vec<Predicate> },
    /// An attribute step, e.g. `@ID`.
    Attribute(String),
}

/// Parses a restricted XPath expression into steps. Leading `/` is stripped (all
/// queries are evaluated relative to the supplied context node).
pub fn parse_path(path: &str) -> Vec<Step> {
    let trimmed = path.trim_start_matches('/');
    trimmed
        .split('/')
        .filter(|s| !s.is_empty())
        .map(parse_step)
        .collect()
}

fn parse_step(raw: &str) -> Step {
    let mut chars = raw.char_indices().peekable();
    let bracket_start = raw.find('[');
    let (name_part, pred_part) = match bracket_start {
        Some(i) => (&raw[..i], &raw[i..]),
        None => (raw, ""),
    };
    let _ = &mut chars;

    if let Some(attr) = name_part.strip_prefix('@') {
        return Step::Attribute(attr.to_string());
    }

    let predicates = parse_predicates(pred_part);
    Step::Element {
        tag: name_part.to_string(),
        predicates,
    }
}

fn parse_predicates(mut s: &str) -> Vec<Predicate> {
    let mut out = Vec::new();
    while let Some(start) = s.find('[') {
        let Some(end) = s[start..].find(']') else { break };
        let body = &s[start + 1..start + end];
        if let Some(attr_expr) = body.strip_prefix('@') {
            if let Some((name, value)) = attr_expr.split_once('=') {
                let value = value.trim_matches(|c| c == '"' || c == '\'');
                out.push(Predicate::Attr(name.to_string(), value.to_string()));
            }
        } else if let Ok(n) = body.parse::<usize>() {
            out.push(Predicate::Position(n));
        }
        s = &s[start + end + 1..];
    }
    out
}

/// Evaluates `path` from `ctx`, returning every matching node (document order).
pub fn query(dom: &Dom, ctx: NodeId, path: &str) -> Vec<NodeId> {
    let steps = parse_path(path);
    let mut frontier = vec![ctx];
    for step in &steps {
        frontier = advance(dom, &frontier, step);
    }
    frontier
}

fn advance(dom: &Dom, frontier: &[NodeId], step: &Step) -> Vec<NodeId> {
    match step {
        Step::Attribute(_) => Vec::new(), // attribute steps never yield element nodes
        Step::Element { tag, predicates } => {
            let mut out = Vec::new();
            for &parent in frontier {
                let mut position = 0usize;
                for &child in dom.element_children(parent).iter() {
                    if dom.tag_of(child) == Some(tag.as_str()) {
                        position += 1;
                        if matches_predicates(dom, child, position, predicates) {
                            out.push(child);
                        }
                    }
                }
            }
            out
        }
    }
}

fn matches_predicates(dom: &Dom, node: NodeId, position: usize, predicates: &[Predicate]) -> bool {
    predicates.iter().all(|p| match p {
        Predicate::Position(n) => *n == position,
        Predicate::Attr(name, value) => dom.attr(node, name) == Some(value.as_str()),
    })
}

/// First matching node, if any.
pub fn query1(dom: &Dom, ctx: NodeId, path: &str) -> Option<NodeId> {
    query(dom, ctx, path).into_iter().next()
}

/// Alias kept for parity with the spec's naming (`queryMulti`).
pub fn query_multi(dom: &Dom, ctx: NodeId, path: &str) -> Vec<NodeId> {
    query(dom, ctx, path)
}

/// True iff `path` (optionally an attribute step, e.g. `@ID`, or `elem/@a`) resolves to
/// a non-empty value.
pub fn query_bool(dom: &Dom, ctx: NodeId, path: &str) -> bool {
    !query_value(dom, ctx, path).unwrap_or_default().is_empty()
}

/// Numeric value of the text/attribute addressed by `path`.
pub fn query_number(dom: &Dom, ctx: NodeId, path: &str) -> Option<f64> {
    query_value(dom, ctx, path)?.trim().parse().ok()
}

/// Resolves `path` to a single string value: for an attribute-final step, the
/// attribute's value; otherwise the text content of the first matching element.
pub fn query_value(dom: &Dom, ctx: NodeId, path: &str) -> Option<String> {
    let (element_path, attr) = match path.rsplit_once("/@") {
        Some((head, attr)) => (head, Some(attr)),
        None => {
            if let Some(attr) = path.strip_prefix('@') {
                ("", Some(attr))
            } else {
                (path, None)
            }
        }
    };

    let node = if element_path.is_empty() {
        Some(ctx)
    } else {
        query1(dom, ctx, element_path)
    }?;

    match attr {
        Some(a) => dom.attr(node, a).map(|s| s.to_string()),
        None => Some(dom.text_content(node)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn positional_predicate_selects_nth_sibling() {
        let dom = parse(b"<r><i>1</i><i>2</i><i>3</i></r>").unwrap();
        let root = dom.root.unwrap();
        let n = query1(&dom, root, "i[2]").unwrap();
        assert_eq!(dom.text_content(n), "2");
    }

    #[test]
    fn attribute_predicate_filters() {
        let dom = parse(br#"<r><i k="a">1</i><i k="b">2</i></r>"#).unwrap();
        let root = dom.root.unwrap();
        let n = query1(&dom, root, r#"i[@k="b"]"#).unwrap();
        assert_eq!(dom.text_content(n), "2");
    }

    #[test]
    fn attribute_value_lookup() {
        let dom = parse(br#"<r ID="_x"/>"#).unwrap();
        let root = dom.root.unwrap();
        assert_eq!(query_value(&dom, root, "@ID").as_deref(), Some("_x"));
    }
}
