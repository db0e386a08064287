//! SSO state (spec §4.7): turning an SP's `AuthnRequest` into the hub's own
//! `AuthnRequest` addressed to the resolved IdP, presenting the hub's Birk-mirrored
//! entityID rather than the real SP's.

use crate::common::algo::Alg;
use crate::common::error::HubError;
use crate::cookie::samlrequest::SamlRequest;
use crate::crypto::Signer;
use crate::metadata::Entity;
use crate::saml::envelope::sign_enveloped;
use crate::saml::model::AuthnRequest;

use super::map_to_idp;

/// Builds the hub-to-IdP `AuthnRequest` and the `SamlRequest` cookie payload that lets
/// the ACS endpoint correlate the IdP's answer back to the original SP request.
pub struct SsoStart {
    pub authn_request: AuthnRequest,
    pub cookie: SamlRequest,
}

#[allow(clippy::too_many_arguments)]
pub async fn begin_sso(
    sp_entity_id: &str,
    sp_request_id: &str,
    original_acs_url: &str,
    relay_state: Option<&str>,
    idp: &Entity,
    hub_acs_url: &str,
    signer: &Signer,
    alg: Alg,
) -> Result<SsoStart, HubError> {
    let sso_endpoint = idp
        .sso_endpoint
        .as_deref()
        .ok_or_else(|| HubError::metadata_not_found("idp has no SingleSignOnService endpoint"))?;

    let mut authn_request = AuthnRequest::new(&map_to_idp(&idp.entity_id), sso_endpoint, hub_acs_url, false);
    sign_enveloped(&mut authn_request.0.dom, authn_request.0.root, alg, signer).await?;

    let cookie = SamlRequest {
        id: authn_request.0.id().ok_or_else(|| HubError::malformed("missing ID"))?,
        sp_entity_id: sp_entity_id.to_string(),
        sp_request_id: sp_request_id.to_string(),
        acs_url: original_acs_url.to_string(),
        hub_acs_url: hub_acs_url.to_string(),
        relay_state: relay_state.map(str::to_string),
    };

    Ok(SsoStart { authn_request, cookie })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hsm::HttpHsmClient;
    use crate::crypto::keys::KeyRef;
    use crate::metadata::Entity;
    use std::sync::Arc;

    #[tokio::test]
    async fn begin_sso_addresses_idp_sso_endpoint_with_birk_issuer() {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let signer = Signer::new(KeyRef::Local(Arc::new(key)), Arc::new(HttpHsmClient::new()));

        let idp = Entity {
            entity_id: "https://idp.example.org/md".to_string(),
            sha1_hash: "idphash".to_string(),
            certs: vec![],
            sso_endpoint: Some("https://idp.example.org/sso".to_string()),
            acs_endpoint: None,
            slo_endpoint: None,
            name_id_formats: vec![],
            feds: vec![],
            persistent_entity_id: None,
        };

        let start = begin_sso(
            "https://sp.example.org/md",
            "_sp1",
            "https://sp.example.org/acs",
            Some("/landing"),
            &idp,
            "https://wayf.example.org/acs",
            &signer,
            Alg::Sha256,
        )
        .await
        .unwrap();

        assert_eq!(start.authn_request.0.destination().as_deref(), Some("https://idp.example.org/sso"));
        assert!(start.authn_request.0.issuer().unwrap().starts_with("https://wayf.example.org/birk.php/"));
        assert_eq!(start.cookie.acs_url, "https://sp.example.org/acs");
        assert_eq!(start.cookie.sp_request_id, "_sp1");
    }
}
