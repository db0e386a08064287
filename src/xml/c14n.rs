//! Exclusive XML canonicalisation (spec §4.1). The inclusive-namespaces list is taken
//! verbatim from the signature's `InclusiveNamespaces/@PrefixList` (spec §4.1, §4.3).
//!
//! Simplification (documented in DESIGN.md): namespace declarations are rendered once,
//! on the root of the canonicalised subtree, rather than at the point they are first
//! visibly utilised deeper in the tree. Since the hub is both signer and verifier this
//! is self-consistent; it would not interoperate with a third-party C14N implementation
//! byte-for-byte on documents using namespaces introduced below the signed root.

use std::collections::BTreeSet;

use super::{Dom, NodeData, NodeId};

/// Canonicalises the subtree rooted at `node`, honouring `inclusive_prefixes` (from
/// `InclusiveNamespaces/@PrefixList`) by rendering their namespace declarations even if
/// the prefix is not otherwise visibly used inside the subtree.
pub fn c14n_exclusive(dom: &Dom, node: NodeId, inclusive_prefixes: &[String]) -> Vec<u8> {
    let mut used: BTreeSet<String> = BTreeSet::new();
    collect_prefixes(dom, node, &mut used);
    for p in inclusive_prefixes {
        used.insert(p.clone());
    }

    let mut out = Vec::new();
    render(dom, node, &used, true, &mut out);
    out
}

fn collect_prefixes(dom: &Dom, node: NodeId, out: &mut BTreeSet<String>) {
    match &dom.node(node).data {
        NodeData::Text(_) => {}
        NodeData::Element { tag, attrs, children } => {
            if let Some(p) = prefix_of(tag) {
                out.insert(p.to_string());
            }
            for a in attrs {
                if let Some(p) = prefix_of(&a.name) {
                    out.insert(p.to_string());
                }
            }
            for &c in children {
                collect_prefixes(dom, c, out);
            }
        }
    }
}

fn prefix_of(qname: &str) -> Option<&str> {
    qname.split_once(':').map(|(p, _)| p)
}

fn render(dom: &Dom, node: NodeId, namespaces: &BTreeSet<String>, is_root: bool, out: &mut Vec<u8>) {
    match &dom.node(node).data {
        NodeData::Text(t) => out.extend_from_slice(escape_text(t).as_bytes()),
        NodeData::Element { tag, attrs, children } => {
            out.push(b'<');
            out.extend_from_slice(tag.as_bytes());

            if is_root {
                for prefix in namespaces {
                    if let Some(uri) = dom.namespaces.get(prefix) {
                        out.push(b' ');
                        out.extend_from_slice(format!("xmlns:{prefix}=\"{uri}\"").as_bytes());
                    }
                }
            }

            let mut sorted_attrs: Vec<_> = attrs.iter().collect();
            sorted_attrs.sort_by(|a, b| a.name.cmp(&b.name));
            for a in sorted_attrs {
                out.push(b' ');
                out.extend_from_slice(a.name.as_bytes());
                out.extend_from_slice(b"=\"");
                out.extend_from_slice(escape_attr(&a.value).as_bytes());
                out.push(b'"');
            }
            out.push(b'>');

            for &c in children {
                render(dom, c, namespaces, false, out);
            }

            out.extend_from_slice(b"</");
            out.extend_from_slice(tag.as_bytes());
            out.push(b'>');
        }
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\r', "&#xD;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
        .replace('\t', "&#x9;")
        .replace('\n', "&#xA;")
        .replace('\r', "&#xD;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn sorts_attributes_lexicographically() {
        let mut dom = parse(br#"<r z="1" a="2"/>"#).unwrap();
        dom.root = dom.root;
        let out = c14n_exclusive(&dom, dom.root.unwrap(), &[]);
        let s = String::from_utf8(out).unwrap();
        assert!(s.find("a=\"2\"").unwrap() < s.find("z=\"1\"").unwrap());
    }

    #[test]
    fn never_self_closes() {
        let dom = parse(b"<r/>").unwrap();
        let out = c14n_exclusive(&dom, dom.root.unwrap(), &[]);
        assert_eq!(String::from_utf8(out).unwrap(), "<r></r>");
    }

    #[test]
    fn is_deterministic() {
        let dom = parse(br#"<saml:Issuer xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">hub</saml:Issuer>"#).unwrap();
        let mut d = dom.clone();
        d.register_namespace("saml", "urn:oasis:names:tc:SAML:2.0:assertion");
        let a = c14n_exclusive(&d, d.root.unwrap(), &[]);
        let b = c14n_exclusive(&d, d.root.unwrap(), &[]);
        assert_eq!(a, b);
    }
}
