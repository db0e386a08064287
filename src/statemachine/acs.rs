//! ACS state (spec §4.7): receiving the IdP's `Response`, running the attribute
//! pipeline, and producing the hub's own `Response` to the original SP.

use chrono::Utc;

use crate::attributes::{self, arp::Arp, canon, AttributeSet};
use crate::common::algo::Alg;
use crate::common::error::{HubError, StatusReason};
use crate::common::time::{not_before_ok, not_on_or_after_ok, parse_instant};
use crate::crypto::Signer;
use crate::metadata::Entity;
use crate::saml::encrypt::decrypt_assertion;
use crate::saml::envelope::{sign_enveloped, verify_enveloped};
use crate::saml::model::{
    assertion_attribute_statement, assertion_audience, assertion_issuer, assertion_name_id, assertion_not_before,
    assertion_not_on_or_after, assertion_subject_confirmation_in_response_to, assertion_subject_confirmation_recipient,
    Response,
};
use crate::xml::xpath::query_value;
use crate::xml::{Dom, NodeId};

use super::map_to_sp;

/// Verifies the IdP's `Response` (signature, status, timing, audience) and returns the
/// decoded attribute set plus the subject's NameID.
///
/// A `Response` may be signed at the top level, at the `Assertion` level, or both (spec
/// §4.3). When only the assertion is signed, the validated view is the signed assertion
/// plus the wrapper's untrusted `Issuer`/`Status`/`Destination` — the step-8 equality
/// checks below exist precisely to keep that untrusted wrapper honest.
pub async fn receive_idp_response(
    response: &Response,
    idp: &Entity,
    hub_entity_id: &str,
    advertised_acs_url: &str,
    signer_for_decrypt: Option<&Signer>,
) -> Result<(String, AttributeSet), HubError> {
    if !response.is_success() {
        return Err(HubError::UpstreamStatus(StatusReason::Responder));
    }

    let plaintext_assertions = response.assertions();
    let encrypted_assertions = response.encrypted_assertions();
    if plaintext_assertions.len() + encrypted_assertions.len() != 1 {
        return Err(HubError::malformed("response must contain exactly one assertion"));
    }

    let (assertion_dom, assertion_root): (Dom, NodeId) = if let Some(&wrapper) = encrypted_assertions.first() {
        let signer = signer_for_decrypt.ok_or_else(|| HubError::crypto("decrypt"))?;
        let plaintext = decrypt_assertion(&response.0.dom, wrapper, signer).await?;
        let assertion_doc = crate::xml::parse(&plaintext)?;
        let root = assertion_doc.root.ok_or_else(|| HubError::malformed("empty assertion"))?;
        (assertion_doc, root)
    } else {
        (response.0.dom.clone(), plaintext_assertions[0])
    };

    let response_signed = verify_enveloped(&response.0.dom, response.0.root, &idp.certs).is_ok();
    let assertion_signed = verify_enveloped(&assertion_dom, assertion_root, &idp.certs).is_ok();
    if !response_signed && !assertion_signed {
        return Err(HubError::crypto("verify"));
    }

    match (response.0.issuer(), assertion_issuer(&assertion_dom, assertion_root)) {
        (Some(a), Some(b)) if a == b => {}
        _ => return Err(HubError::policy("Response Issuer does not match Assertion Issuer")),
    }

    let recipient = assertion_subject_confirmation_recipient(&assertion_dom, assertion_root)
        .ok_or_else(|| HubError::malformed("assertion has no SubjectConfirmationData/@Recipient"))?;
    let destination = response
        .0
        .destination()
        .ok_or_else(|| HubError::malformed("response has no Destination"))?;
    if recipient != destination || destination != advertised_acs_url {
        return Err(HubError::policy(
            "SubjectConfirmationData Recipient, Response Destination, and advertised ACS URL must all match",
        ));
    }

    match (
        response.0.in_response_to(),
        assertion_subject_confirmation_in_response_to(&assertion_dom, assertion_root),
    ) {
        (Some(a), Some(b)) if a == b => {}
        _ => return Err(HubError::policy("Response InResponseTo does not match Assertion SubjectConfirmationData/@InResponseTo")),
    }

    let now = Utc::now();
    if let Some(not_before) = assertion_not_before(&assertion_dom, assertion_root) {
        let ts = parse_instant(&not_before).map_err(|_| HubError::malformed("bad NotBefore"))?;
        if !not_before_ok(now, ts) {
            return Err(HubError::Timing);
        }
    }
    if let Some(not_on_or_after) = assertion_not_on_or_after(&assertion_dom, assertion_root) {
        let ts = parse_instant(&not_on_or_after).map_err(|_| HubError::malformed("bad NotOnOrAfter"))?;
        if !not_on_or_after_ok(now, ts) {
            return Err(HubError::Timing);
        }
    }
    if let Some(audience) = assertion_audience(&assertion_dom, assertion_root) {
        if audience != hub_entity_id {
            return Err(HubError::policy("audience restriction does not name this hub"));
        }
    }

    let name_id = assertion_name_id(&assertion_dom, assertion_root)
        .ok_or_else(|| HubError::malformed("assertion has no NameID"))?;

    let attribute_statement = assertion_attribute_statement(&assertion_dom, assertion_root)
        .map(|stmt| canon::decode_attribute_statement(&assertion_dom, stmt))
        .unwrap_or_default();

    Ok((name_id, attribute_statement))
}

/// Builds the signed `Response` the hub sends to the original SP, having already run
/// the attribute pipeline.
pub async fn build_sp_response(
    sp_entity_id: &str,
    sp_acs_url: &str,
    in_response_to: &str,
    name_id: &str,
    released: &AttributeSet,
    signer: &Signer,
    alg: Alg,
) -> Result<Response, HubError> {
    let issuer = map_to_sp(sp_entity_id);
    let mut response = Response::new_success(&issuer, sp_acs_url, in_response_to);

    let assertion = response
        .0
        .dom
        .create_element(Some(response.0.root), "saml:Assertion");
    response.0.dom.set_attr(assertion, "ID", &crate::saml::model::fresh_id());
    response.0.dom.set_attr(assertion, "Version", "2.0");
    crate::xml::querydashp::query_dash_p(&mut response.0.dom, assertion, "saml:Issuer", &issuer, None);
    crate::xml::querydashp::query_dash_p(&mut response.0.dom, assertion, "saml:Subject/saml:NameID", name_id, None);

    let statement = crate::xml::querydashp::query_dash_p(&mut response.0.dom, assertion, "saml:AttributeStatement", "", None);
    for (name, values) in released {
        for value in values {
            let attr = response.0.dom.create_element(Some(statement), "saml:Attribute");
            response.0.dom.set_attr(attr, "Name", name);
            crate::xml::querydashp::query_dash_p(&mut response.0.dom, attr, "saml:AttributeValue", value, None);
        }
    }

    sign_enveloped(&mut response.0.dom, assertion, alg, signer).await?;
    sign_enveloped(&mut response.0.dom, response.0.root, alg, signer).await?;

    let _ = query_value(&response.0.dom, response.0.root, "saml:Issuer");
    Ok(response)
}

/// Runs the release-set pipeline from decoded IdP attributes down to what the SP's ARP
/// permits; `check_required_and_singular` runs inside [`attributes::build_release_set`].
pub fn release_to_sp(
    idp_attributes: AttributeSet,
    idp_scope: Option<&str>,
    home_organization: &str,
    sp_arp: &Arp,
) -> Result<AttributeSet, HubError> {
    attributes::build_release_set(idp_attributes, idp_scope, home_organization, sp_arp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::arp::{Arp, ValuePattern};
    use crate::crypto::hsm::HttpHsmClient;
    use crate::crypto::keys::KeyRef;
    use std::sync::Arc;

    #[tokio::test]
    async fn builds_signed_response_with_released_attributes() {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = rsa::RsaPublicKey::from(&key);
        let signer = Signer::new(KeyRef::Local(Arc::new(key)), Arc::new(HttpHsmClient::new()));

        let mut released = AttributeSet::new();
        released.insert("mail".to_string(), vec!["user@example.org".to_string()]);

        let response = build_sp_response(
            "https://sp.example.org/md",
            "https://sp.example.org/acs",
            "_req1",
            "user-1",
            &released,
            &signer,
            Alg::Sha256,
        )
        .await
        .unwrap();

        assert!(verify_enveloped(&response.0.dom, response.0.root, &[public]).is_ok());
    }

    #[test]
    fn release_to_sp_applies_arp() {
        let mut idp_attrs = AttributeSet::new();
        idp_attrs.insert("eduPersonPrincipalName".to_string(), vec!["user@example.org".to_string()]);
        idp_attrs.insert("mail".to_string(), vec!["user@example.org".to_string()]);

        let arp = Arp::new().allow("eduPersonPrincipalName", ValuePattern::Any);
        let out = release_to_sp(idp_attrs, Some("example.org"), "example.org", &arp).unwrap();
        assert!(out.contains_key("eduPersonPrincipalName"));
        assert!(!out.contains_key("mail"));
    }

    /// Builds an assertion-only-signed `Response` (the wrapper's `Issuer`/`Destination`
    /// are left untrusted) with a given Recipient/InResponseTo on the assertion's own
    /// `SubjectConfirmationData`, matching the IdP's own `Issuer`/audience.
    async fn signed_assertion_only_response(signer: &Signer, recipient: &str, assertion_in_response_to: &str) -> (Response, String, String) {
        let idp_entity_id = "https://idp.example.org/md";
        let hub_audience = super::super::map_to_idp(idp_entity_id);
        let mut response = Response::new_success(idp_entity_id, "https://wayf.example.org/acs", "_hubreq1");

        let assertion = response.0.dom.create_element(Some(response.0.root), "saml:Assertion");
        response.0.dom.set_attr(assertion, "ID", &crate::saml::model::fresh_id());
        response.0.dom.set_attr(assertion, "Version", "2.0");
        crate::xml::querydashp::query_dash_p(&mut response.0.dom, assertion, "saml:Issuer", idp_entity_id, None);
        crate::xml::querydashp::query_dash_p(&mut response.0.dom, assertion, "saml:Subject/saml:NameID", "user-1", None);
        crate::xml::querydashp::query_dash_p(
            &mut response.0.dom,
            assertion,
            "saml:Subject/saml:SubjectConfirmation/saml:SubjectConfirmationData/@Recipient",
            recipient,
            None,
        );
        crate::xml::querydashp::query_dash_p(
            &mut response.0.dom,
            assertion,
            "saml:Subject/saml:SubjectConfirmation/saml:SubjectConfirmationData/@InResponseTo",
            assertion_in_response_to,
            None,
        );
        crate::xml::querydashp::query_dash_p(
            &mut response.0.dom,
            assertion,
            "saml:Conditions/saml:AudienceRestriction/saml:Audience",
            &hub_audience,
            None,
        );

        sign_enveloped(&mut response.0.dom, assertion, Alg::Sha256, signer).await.unwrap();
        (response, idp_entity_id.to_string(), hub_audience)
    }

    fn test_idp(entity_id: &str, certs: Vec<rsa::RsaPublicKey>) -> Entity {
        Entity {
            entity_id: entity_id.to_string(),
            sha1_hash: "idphash".to_string(),
            certs,
            sso_endpoint: None,
            acs_endpoint: None,
            slo_endpoint: None,
            name_id_formats: vec![],
            feds: vec![],
            persistent_entity_id: None,
        }
    }

    #[tokio::test]
    async fn assertion_only_signature_is_accepted_with_valid_correlation() {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = rsa::RsaPublicKey::from(&key);
        let signer = Signer::new(KeyRef::Local(Arc::new(key)), Arc::new(HttpHsmClient::new()));

        let (response, idp_entity_id, hub_audience) =
            signed_assertion_only_response(&signer, "https://wayf.example.org/acs", "_hubreq1").await;
        let idp = test_idp(&idp_entity_id, vec![public]);

        let (name_id, _attrs) = receive_idp_response(&response, &idp, &hub_audience, "https://wayf.example.org/acs", None)
            .await
            .unwrap();
        assert_eq!(name_id, "user-1");
    }

    #[tokio::test]
    async fn rejects_recipient_not_matching_advertised_acs_url() {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = rsa::RsaPublicKey::from(&key);
        let signer = Signer::new(KeyRef::Local(Arc::new(key)), Arc::new(HttpHsmClient::new()));

        let (response, idp_entity_id, hub_audience) =
            signed_assertion_only_response(&signer, "https://attacker.example.org/acs", "_hubreq1").await;
        let idp = test_idp(&idp_entity_id, vec![public]);

        let err = receive_idp_response(&response, &idp, &hub_audience, "https://wayf.example.org/acs", None)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::PolicyDenied(_)));
    }

    #[tokio::test]
    async fn rejects_in_response_to_mismatch_between_response_and_assertion() {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = rsa::RsaPublicKey::from(&key);
        let signer = Signer::new(KeyRef::Local(Arc::new(key)), Arc::new(HttpHsmClient::new()));

        let (response, idp_entity_id, hub_audience) =
            signed_assertion_only_response(&signer, "https://wayf.example.org/acs", "_otherreq").await;
        let idp = test_idp(&idp_entity_id, vec![public]);

        let err = receive_idp_response(&response, &idp, &hub_audience, "https://wayf.example.org/acs", None)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::PolicyDenied(_)));
    }

    #[tokio::test]
    async fn rejects_response_with_more_than_one_assertion() {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = rsa::RsaPublicKey::from(&key);
        let signer = Signer::new(KeyRef::Local(Arc::new(key)), Arc::new(HttpHsmClient::new()));

        let (mut response, idp_entity_id, hub_audience) =
            signed_assertion_only_response(&signer, "https://wayf.example.org/acs", "_hubreq1").await;
        let extra = response.0.dom.create_element(Some(response.0.root), "saml:Assertion");
        response.0.dom.set_attr(extra, "ID", &crate::saml::model::fresh_id());
        let idp = test_idp(&idp_entity_id, vec![public]);

        let err = receive_idp_response(&response, &idp, &hub_audience, "https://wayf.example.org/acs", None)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Malformed(_)));
    }

    #[tokio::test]
    async fn rejects_unsigned_response_and_assertion() {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = rsa::RsaPublicKey::from(&key);

        let idp_entity_id = "https://idp.example.org/md";
        let hub_audience = super::super::map_to_idp(idp_entity_id);
        let mut response = Response::new_success(idp_entity_id, "https://wayf.example.org/acs", "_hubreq1");
        let assertion = response.0.dom.create_element(Some(response.0.root), "saml:Assertion");
        response.0.dom.set_attr(assertion, "ID", &crate::saml::model::fresh_id());
        crate::xml::querydashp::query_dash_p(&mut response.0.dom, assertion, "saml:Issuer", idp_entity_id, None);
        crate::xml::querydashp::query_dash_p(&mut response.0.dom, assertion, "saml:Subject/saml:NameID", "user-1", None);

        let idp = test_idp(idp_entity_id, vec![public]);
        let err = receive_idp_response(&response, &idp, &hub_audience, "https://wayf.example.org/acs", None)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Crypto { .. }));
    }
}
