//! Discovery state (spec §4.7): choosing which external IdP a given SP's request is
//! mediated to, when the SP itself didn't name one.

use std::sync::Arc;

use crate::common::error::HubError;
use crate::metadata::{feds_intersect, Entity, MetadataStore, SetName};

/// Resolves the IdP to mediate to: the SP-requested `idp_entity_id` if given and
/// federation-authorized, otherwise a configured default for single-IdP deployments, or
/// an error asking the caller to render a discovery page (spec §4.7 edge case).
///
/// `authorized` is a coarse, set-level gate (is this pair of sets allowed to talk at
/// all); the actual authorization is the entity-level federation intersection between
/// `sp` and the resolved IdP (spec §4.4) — an entity with no `feds` never intersects.
pub fn resolve_idp(
    store: &MetadataStore,
    sp: &Entity,
    sp_set: SetName,
    requested_idp_entity_id: Option<&str>,
    default_idp_entity_id: Option<&str>,
) -> Result<Arc<Entity>, HubError> {
    let idp_set = sp_set.reverse_partner();

    let chosen = requested_idp_entity_id.or(default_idp_entity_id);
    let Some(entity_id) = chosen else {
        return Err(HubError::policy("no idp selected and no default configured"));
    };

    if !store.authorized(idp_set, sp_set) {
        return Err(HubError::policy("federation intersection is empty for this sp/idp pair"));
    }

    let idp = store.find_by_entity_id(idp_set, entity_id)?;

    if !feds_intersect(&idp.feds, &sp.feds) {
        return Err(HubError::policy("federation intersection is empty for this sp/idp pair"));
    }

    Ok(idp)
}
