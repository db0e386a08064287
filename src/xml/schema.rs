//! Schema validation against the configured SAML-protocol XSD (spec §4.1, §4.3 step 2).
//!
//! Simplification (documented in DESIGN.md): rather than a full XSD engine, each
//! known schema URL compiles to a small structural rule (required root element,
//! required attributes, required immediate children) sufficient to reject malformed
//! protocol messages before they reach signature verification. The compiled-schema
//! cache itself — keyed by URL, write-once, read-many, tolerant of duplicate
//! concurrent compiles — follows §4.1/§5 exactly.

use moka::sync::Cache;
use once_cell::sync::Lazy;
use std::sync::Arc;

use super::{Dom, NodeId};

pub const SAML_PROTOCOL_SCHEMA: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
pub const SAML_METADATA_SCHEMA: &str = "urn:oasis:names:tc:SAML:2.0:metadata";

#[derive(Debug, Clone)]
pub struct CompiledSchema {
    pub allowed_roots: Vec<&'static str>,
    pub required_root_attrs: Vec<&'static str>,
    pub required_children: Vec<&'static str>,
}

impl CompiledSchema {
    pub fn validate(&self, dom: &Dom, root: NodeId) -> Vec<String> {
        let mut errors = Vec::new();

        match dom.tag_of(root) {
            Some(tag) if self.allowed_roots.iter().any(|r| *r == local_name(tag)) => {}
            Some(tag) => errors.push(format!("unexpected root element: {tag}")),
            None => errors.push("root is not an element".to_string()),
        }

        for attr in &self.required_root_attrs {
            if dom.attr(root, attr).is_none() {
                errors.push(format!("missing required attribute: @{attr}"));
            }
        }

        for child in &self.required_children {
            let found = dom
                .element_children(root)
                .iter()
                .any(|&c| dom.tag_of(c).map(local_name) == Some(*child));
            if !found {
                errors.push(format!("missing required child element: {child}"));
            }
        }

        errors
    }
}

fn local_name(tag: &str) -> &str {
    tag.rsplit_once(':').map(|(_, l)| l).unwrap_or(tag)
}

fn compile(schema_url: &str) -> Arc<CompiledSchema> {
    let schema = match schema_url {
        SAML_PROTOCOL_SCHEMA => CompiledSchema {
            allowed_roots: vec![
                "AuthnRequest",
                "Response",
                "LogoutRequest",
                "LogoutResponse",
            ],
            required_root_attrs: vec!["ID", "Version", "IssueInstant"],
            required_children: vec!["Issuer"],
        },
        SAML_METADATA_SCHEMA => CompiledSchema {
            allowed_roots: vec!["EntityDescriptor", "EntitiesDescriptor"],
            required_root_attrs: vec!["entityID"],
            required_children: vec![],
        },
        _ => CompiledSchema {
            allowed_roots: vec![],
            required_root_attrs: vec![],
            required_children: vec![],
        },
    };
    Arc::new(schema)
}

/// Write-once, read-many compiled-schema cache keyed by schema URL (spec §5). Extra
/// concurrent compiles of the same key are tolerated — the last writer wins.
pub struct SchemaCache {
    cache: Cache<String, Arc<CompiledSchema>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::new(64),
        }
    }

    pub fn get(&self, schema_url: &str) -> Arc<CompiledSchema> {
        if let Some(s) = self.cache.get(schema_url) {
            return s;
        }
        let compiled = compile(schema_url);
        self.cache.insert(schema_url.to_string(), compiled.clone());
        compiled
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Global cache instance, matching the "cache of compiled schemas" resource in spec §5.
pub static SCHEMA_CACHE: Lazy<SchemaCache> = Lazy::new(SchemaCache::new);

pub fn validate(dom: &Dom, root: NodeId, schema_url: &str) -> Vec<String> {
    SCHEMA_CACHE.get(schema_url).validate(dom, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn accepts_well_formed_authn_request() {
        let dom = parse(
            br#"<samlp:AuthnRequest ID="_1" Version="2.0" IssueInstant="2026-01-01T00:00:00Z"><saml:Issuer>sp</saml:Issuer></samlp:AuthnRequest>"#,
        )
        .unwrap();
        let errs = validate(&dom, dom.root.unwrap(), SAML_PROTOCOL_SCHEMA);
        assert!(errs.is_empty(), "{errs:?}");
    }

    #[test]
    fn rejects_missing_issuer() {
        let dom = parse(br#"<samlp:Response ID="_1" Version="2.0" IssueInstant="2026-01-01T00:00:00Z"/>"#).unwrap();
        let errs = validate(&dom, dom.root.unwrap(), SAML_PROTOCOL_SCHEMA);
        assert!(errs.iter().any(|e| e.contains("Issuer")));
    }
}
