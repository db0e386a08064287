//! Attribute-name canonicalization (spec §4.6): an IdP may assert an attribute under
//! its "basic", "uri", or legacy OID `Name`, all of which must collapse to the same
//! canonical friendly name before scope enforcement or ARP filtering runs.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::AttributeSet;
use crate::xml::xpath::query_multi;
use crate::xml::{Dom, NodeId};

/// `Name` (URI or OID form) -> canonical friendly name. Grounded in the eduPerson /
/// SCHAC attribute profiles the hub's partner federations actually publish.
static CANONICAL_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("urn:oid:1.3.6.1.4.1.5923.1.1.1.6", "eduPersonPrincipalName");
    m.insert("eduPersonPrincipalName", "eduPersonPrincipalName");
    m.insert("urn:oid:1.3.6.1.4.1.5923.1.1.1.1", "eduPersonAffiliation");
    m.insert("eduPersonAffiliation", "eduPersonAffiliation");
    m.insert("urn:oid:1.3.6.1.4.1.5923.1.1.1.9", "eduPersonScopedAffiliation");
    m.insert("eduPersonScopedAffiliation", "eduPersonScopedAffiliation");
    m.insert("urn:oid:1.3.6.1.4.1.5923.1.1.1.10", "eduPersonTargetedID");
    m.insert("eduPersonTargetedID", "eduPersonTargetedID");
    m.insert("urn:oid:2.5.4.42", "givenName");
    m.insert("givenName", "givenName");
    m.insert("urn:oid:2.5.4.4", "sn");
    m.insert("sn", "sn");
    m.insert("urn:oid:2.16.840.1.113730.3.1.241", "displayName");
    m.insert("displayName", "displayName");
    m.insert("urn:oid:0.9.2342.19200300.100.1.3", "mail");
    m.insert("mail", "mail");
    m.insert("urn:oid:1.3.6.1.4.1.25178.1.2.9", "schacHomeOrganization");
    m.insert("schacHomeOrganization", "schacHomeOrganization");
    m.insert("urn:oid:1.3.6.1.4.1.25178.1.2.15", "schacPersonalUniqueID");
    m.insert("schacPersonalUniqueID", "schacPersonalUniqueID");
    m.insert("urn:oid:1.3.6.1.4.1.25178.1.0.2.3", "schacDateOfBirth");
    m.insert("schacDateOfBirth", "schacDateOfBirth");
    m
});

pub fn canonical_name(raw: &str) -> Option<&'static str> {
    CANONICAL_NAMES.get(raw).copied()
}

/// Decodes a `saml:AttributeStatement` into a canonical-named attribute bag. Attributes
/// whose `Name` is unrecognised are dropped rather than passed through verbatim — an
/// IdP cannot smuggle an attribute past canonicalization under an unknown name.
pub fn decode_attribute_statement(dom: &Dom, statement: NodeId) -> AttributeSet {
    let mut out: AttributeSet = AttributeSet::new();
    for attr in query_multi(dom, statement, "saml:Attribute") {
        let Some(raw_name) = dom.attr(attr, "Name") else { continue };
        let Some(canonical) = canonical_name(raw_name) else { continue };

        let values: Vec<String> = query_multi(dom, attr, "saml:AttributeValue")
            .into_iter()
            .map(|v| dom.text_content(v))
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            continue;
        }
        out.entry(canonical.to_string()).or_default().extend(values);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn oid_and_friendly_name_both_canonicalize() {
        assert_eq!(canonical_name("urn:oid:1.3.6.1.4.1.5923.1.1.1.6"), Some("eduPersonPrincipalName"));
        assert_eq!(canonical_name("eduPersonPrincipalName"), Some("eduPersonPrincipalName"));
        assert_eq!(canonical_name("not-a-real-attribute"), None);
    }

    #[test]
    fn decodes_statement_dropping_unknown_attributes() {
        let dom = parse(
            br#"<saml:AttributeStatement xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">
                <saml:Attribute Name="eduPersonPrincipalName"><saml:AttributeValue>user@example.org</saml:AttributeValue></saml:Attribute>
                <saml:Attribute Name="x-unknown"><saml:AttributeValue>ignored</saml:AttributeValue></saml:Attribute>
            </saml:AttributeStatement>"#,
        )
        .unwrap();
        let set = decode_attribute_statement(&dom, dom.root.unwrap());
        assert_eq!(set.get("eduPersonPrincipalName").unwrap(), &vec!["user@example.org".to_string()]);
        assert!(!set.contains_key("x-unknown"));
    }
}
