//! Attribute release pipeline (spec §4.6, component C6): canonicalize what the IdP
//! asserted, enforce scope, derive hub-computed attributes, filter through the
//! relying party's Attribute Release Policy, and gate on user consent.

pub mod arp;
pub mod canon;
pub mod consent;
pub mod derive;
pub mod scope;

use std::collections::BTreeMap;

use crate::common::error::HubError;

/// Multi-valued attribute bag keyed by canonical attribute name, ordered for
/// deterministic output.
pub type AttributeSet = BTreeMap<String, Vec<String>>;

/// Attributes the hub always requires before it will assert a subject to an SP
/// (spec §4.6 edge case: "required attribute missing").
pub const REQUIRED_ATTRIBUTES: &[&str] = &["eduPersonPrincipalName", "schacHomeOrganization"];

/// Attributes that must carry at most one value (spec §4.6 edge case: "singular
/// multivalued").
pub const SINGULAR_ATTRIBUTES: &[&str] = &[
    "eduPersonPrincipalName",
    "schacHomeOrganization",
    "displayName",
    "eduPersonTargetedID",
];

pub fn check_required_and_singular(attrs: &AttributeSet) -> Result<(), HubError> {
    for name in REQUIRED_ATTRIBUTES {
        match attrs.get(*name) {
            Some(v) if !v.is_empty() => {}
            _ => return Err(HubError::policy(format!("required attribute missing: {name}"))),
        }
    }
    for name in SINGULAR_ATTRIBUTES {
        if let Some(v) = attrs.get(*name) {
            if v.len() > 1 {
                return Err(HubError::policy(format!("attribute must be singular: {name}")));
            }
        }
    }
    Ok(())
}

/// Runs the full pipeline: canonicalize → scope-enforce → derive → ARP-filter. Consent
/// is a separate, caller-driven step (see `consent`) since it may require a round trip
/// to the browser.
pub fn build_release_set(
    raw: AttributeSet,
    idp_scope: Option<&str>,
    home_organization: &str,
    arp: &arp::Arp,
) -> Result<AttributeSet, HubError> {
    let scoped = scope::enforce_scope(raw, idp_scope)?;
    let derived = derive::derive_attributes(scoped, home_organization);
    check_required_and_singular(&derived)?;
    Ok(arp::apply(&derived, arp))
}

/// The scope an IdP is authoritative for, derived from its own `eduPersonPrincipalName`
/// assertion when present, else falling back to the entityID's host. A per-SP/per-IdP
/// ARP configuration format was not specified; [`arp::default_arp`] stands in until one
/// is added (see DESIGN.md).
pub fn derive_idp_scope(raw: &AttributeSet, idp_entity_id: &str) -> Option<String> {
    if let Some(eppn) = raw.get("eduPersonPrincipalName").and_then(|v| v.first()) {
        if let Some((_, scope)) = eppn.rsplit_once('@') {
            return Some(scope.to_string());
        }
    }
    url::Url::parse(idp_entity_id).ok().and_then(|u| u.host_str().map(str::to_string))
}
