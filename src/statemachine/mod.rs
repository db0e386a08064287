//! Request/Response state machine (spec §4.7, component C7): SSO, ACS and discovery
//! states, plus the virtual-entity remapping (`map2IdP`/`map2SP`) that lets the hub
//! present itself as a distinct "Birk" mirror SP to each external IdP, and a distinct
//! "Krib" mirror IdP to each external SP, while remaining one hub internally.

pub mod acs;
pub mod discovery;
pub mod sso;

/// The hub's virtual-entity prefixes (spec §4.7). A request arriving addressed to
/// `{BIRK_PREFIX}{real_idp_entity_id}` is understood as "mediate to this external IdP,
/// presenting the hub as a mirror SP"; symmetrically for `KRIB_PREFIX`.
pub const BIRK_PREFIX: &str = "https://wayf.example.org/birk.php/";
pub const KRIB_PREFIX: &str = "https://wayf.example.org/krib.php/";

/// Maps a real IdP entityID to the hub's virtual mirror-SP entityID presented to that
/// IdP (spec §4.7).
pub fn map_to_idp(real_idp_entity_id: &str) -> String {
    format!("{BIRK_PREFIX}{real_idp_entity_id}")
}

/// Maps a real SP entityID to the hub's virtual mirror-IdP entityID presented to that
/// SP (spec §4.7).
pub fn map_to_sp(real_sp_entity_id: &str) -> String {
    format!("{KRIB_PREFIX}{real_sp_entity_id}")
}

/// Recovers the real entity ID a virtual Birk/Krib entityID mirrors, if any.
pub fn unmap_virtual_entity_id(virtual_entity_id: &str) -> Option<&str> {
    virtual_entity_id
        .strip_prefix(BIRK_PREFIX)
        .or_else(|| virtual_entity_id.strip_prefix(KRIB_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_mapping_round_trips() {
        let real = "https://idp.example.org/md";
        let virt = map_to_idp(real);
        assert_eq!(unmap_virtual_entity_id(&virt), Some(real));
    }
}
