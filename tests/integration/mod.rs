//! Cross-module integration tests: flows that span more than one component and so
//! don't fit naturally as a single module's `#[cfg(test)]` block.

use std::sync::Arc;

use chrono::Utc;
use fedhub::attributes::{self, arp, AttributeSet};
use fedhub::common::algo::Alg;
use fedhub::cookie::samlrequest::SamlRequest;
use fedhub::crypto::hsm::HttpHsmClient;
use fedhub::crypto::keys::KeyRef;
use fedhub::crypto::Signer;
use fedhub::jwt;
use fedhub::metadata::{MetadataSet, MetadataStore, SetName};
use fedhub::saml::envelope::sign_enveloped;
use fedhub::saml::model::{AuthnRequest, LogoutRequest, Response};
use fedhub::saml::receive;
use fedhub::slo::SloCascade;
use fedhub::cookie::sloinfo::{SloInfo, SloInfoList};

fn test_signer() -> (Signer, rsa::RsaPublicKey) {
    let mut rng = rand::thread_rng();
    let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let public = key.to_public_key();
    let signer = Signer::new(KeyRef::Local(Arc::new(key)), Arc::new(HttpHsmClient::new()));
    (signer, public)
}

fn sample_idp_metadata(entity_id: &str, cert_pem: &str) -> String {
    let der = pem::parse(cert_pem).unwrap().contents().to_vec();
    let b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, der);
    format!(
        r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="{entity_id}">
  <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:KeyDescriptor><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{b64}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>
    <md:SingleLogoutService Location="https://idp.example.org/slo"/>
    <md:SingleSignOnService Location="https://idp.example.org/sso"/>
  </md:IDPSSODescriptor>
</md:EntityDescriptor>"#
    )
}

fn self_signed_cert_pem(key: &rsa::RsaPrivateKey) -> String {
    // A minimal DER-wrapped SPKI is enough for `public_key_from_cert_pem`'s
    // certificate parser to extract the key — the X.509 envelope itself is not
    // semantically checked by the hub outside of signature verification.
    use rsa::pkcs8::EncodePublicKey;
    let spki_der = key.to_public_key().to_public_key_der().unwrap();
    let pem = pem::Pem::new("PUBLIC KEY", spki_der.as_bytes().to_vec());
    pem::encode(&pem)
}

/// An `AuthnRequest` signed by an SP, sent over HTTP-POST, verified and forwarded by
/// the hub's own signer — mirroring the `/sso` handler's POST-binding path end to end.
#[tokio::test]
async fn authn_request_post_binding_round_trips_through_hub_signing() {
    let (sp_signer, sp_public) = test_signer();
    let (hub_signer, _hub_public) = test_signer();

    let sp_request = AuthnRequest::new("https://sp.example.org/md", "https://hub.example.org/sso", "https://sp.example.org/acs", true);
    let mut dom = sp_request.0.dom;
    let root = sp_request.0.root;
    sign_enveloped(&mut dom, root, Alg::Sha256, &sp_signer).await.unwrap();
    let xml = fedhub::xml::serialize(&dom, root);

    let received = receive::protocol_assert(&xml, Utc::now()).unwrap();
    receive::verify_post_signature(&received, &[sp_public]).unwrap();

    let authn = AuthnRequest(fedhub::saml::model::SamlDoc { dom: received.dom, root: received.root });
    assert_eq!(authn.acs_url().as_deref(), Some("https://sp.example.org/acs"));

    let hub_request = AuthnRequest::new("https://hub.example.org/md", "https://idp.example.org/sso", "https://hub.example.org/acs", false);
    let mut hub_dom = hub_request.0.dom;
    let hub_root = hub_request.0.root;
    sign_enveloped(&mut hub_dom, hub_root, Alg::Sha256, &hub_signer).await.unwrap();
    assert!(hub_dom.attr(hub_root, "ID").is_some());
}

/// Full attribute release pipeline: raw IdP-asserted attributes survive the default
/// ARP's commonly-released allowlist but anything outside it is dropped.
#[test]
fn attribute_release_pipeline_filters_through_default_arp() {
    let mut raw = AttributeSet::new();
    raw.insert("eduPersonPrincipalName".to_string(), vec!["alice@idp.example.org".to_string()]);
    raw.insert("eduPersonAffiliation".to_string(), vec!["member".to_string()]);
    raw.insert("secretInternalAttribute".to_string(), vec!["leaked".to_string()]);

    let idp_scope = attributes::derive_idp_scope(&raw, "https://idp.example.org/md");
    assert_eq!(idp_scope.as_deref(), Some("idp.example.org"));

    let policy = arp::default_arp();
    let released = attributes::build_release_set(raw, idp_scope.as_deref(), "idp.example.org", &policy).unwrap();

    assert!(released.contains_key("eduPersonPrincipalName"));
    assert!(!released.contains_key("secretInternalAttribute"));
}

/// A `SamlRequest` cookie sealed by `/sso` and opened by `/acs` correlates the IdP's
/// `InResponseTo` back to the SP that started the flow, surviving the round trip
/// through the sealed/opaque cookie codec.
#[test]
fn samlrequest_cookie_correlates_sso_to_acs() {
    let now = Utc::now();
    let hmac_key = b"integration-test-hmac-key";

    let request = SamlRequest {
        id: fedhub::saml::model::fresh_id(),
        sp_entity_id: "https://sp.example.org/md".to_string(),
        sp_request_id: "_sp_req_1".to_string(),
        acs_url: "https://sp.example.org/acs".to_string(),
        relay_state: Some("deep-link".to_string()),
    };

    let sealed = request.seal(hmac_key, now);
    let opened = SamlRequest::open(&sealed, hmac_key, 180, now).unwrap();

    assert_eq!(opened.id, request.id);
    assert_eq!(opened.sp_entity_id, "https://sp.example.org/md");
    assert_eq!(opened.relay_state.as_deref(), Some("deep-link"));
}

/// The federation-intersection gate: an external IdP may reach an external SP, but
/// never an internal one, and vice versa.
#[test]
fn metadata_store_gates_external_idp_against_external_sp_only() {
    let store = MetadataStore::new();
    store.install(SetName::ExternalIdp, MetadataSet::default());
    store.install(SetName::ExternalSp, MetadataSet::default());
    store.install(SetName::Internal, MetadataSet::default());

    assert!(store.authorized(SetName::ExternalIdp, SetName::ExternalSp));
    assert!(!store.authorized(SetName::ExternalIdp, SetName::Internal));
    assert!(store.authorized(SetName::Internal, SetName::Internal));
}

/// Parses an `EntitiesDescriptor` feed with one IdP and resolves it both by entityID
/// and by its SHA-1 hash, the two lookups `/acs`'s `SSO2-<hash>` correlation depends on.
#[test]
fn metadata_set_parses_feed_and_indexes_by_hash() {
    let mut rng = rand::thread_rng();
    let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let cert_pem = self_signed_cert_pem(&key);
    let feed = sample_idp_metadata("https://idp.example.org/md", &cert_pem);

    let set = MetadataSet::parse(feed.as_bytes()).unwrap();
    assert_eq!(set.len(), 1);

    let by_id = set.by_entity_id("https://idp.example.org/md").unwrap();
    let by_hash = set.by_hash(&by_id.sha1_hash).unwrap();
    assert_eq!(by_id.entity_id, by_hash.entity_id);
    assert_eq!(by_id.sso_endpoint.as_deref(), Some("https://idp.example.org/sso"));
}

/// A two-participant `SLOInfoList` drains in order and the JSON-shaped `SloInfo`
/// entries survive a round trip through the cookie's binary frame encoding.
#[test]
fn slo_cascade_drains_and_cookie_round_trips() {
    let list = SloInfoList(vec![
        SloInfo { entity_id: "https://sp1.example.org/md".to_string(), name_id: "alice".to_string(), session_index: None, is_idp: false },
        SloInfo { entity_id: "https://idp.example.org/md".to_string(), name_id: "alice".to_string(), session_index: None, is_idp: true },
    ]);

    let now = Utc::now();
    let sealed = list.seal(b"key", now);
    let reopened = SloInfoList::open(&sealed, b"key", 28_800, now).unwrap();

    let mut cascade = SloCascade::new(reopened);
    let (request, pending) = cascade
        .next_request("https://hub.example.org/md", |i| Some(format!("{}/slo", i.entity_id)))
        .unwrap();
    assert_eq!(pending.entity_id, "https://sp1.example.org/md");
    assert_eq!(request.name_id().as_deref(), Some("alice"));
    assert!(!cascade.is_complete());
}

/// The JWT bridge converts a released attribute set into signed claims and back,
/// exercising the same shape `/saml2jwt` and `/jwt2saml` trade over HTTP.
#[test]
fn jwt_bridge_round_trips_released_attributes() {
    let mut rng = rand::thread_rng();
    let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let private_pem = {
        use rsa::pkcs1::EncodeRsaPrivateKey;
        key.to_pkcs1_pem(Default::default()).unwrap().to_string()
    };
    let public_pem = {
        use rsa::pkcs1::EncodeRsaPublicKey;
        key.to_public_key().to_pkcs1_pem(Default::default()).unwrap()
    };

    let mut attrs = AttributeSet::new();
    attrs.insert("mail".to_string(), vec!["alice@example.org".to_string()]);

    let token = jwt::saml_to_jwt(
        "https://hub.example.org/md",
        "https://rp.example.org",
        "alice",
        &attrs,
        300,
        Alg::Sha256,
        &private_pem,
    )
    .unwrap();

    let claims = jwt::jwt_to_saml(&token, Alg::Sha256, "https://rp.example.org", &public_pem).unwrap();
    assert_eq!(claims.sub, "alice");
    assert_eq!(claims.attributes.get("mail").and_then(|v| v.as_str()), Some("alice@example.org"));
}

/// A `LogoutRequest` is rejected by protocol assertion once its `IssueInstant` falls
/// outside the timing-skew window — the same check every inbound message goes through.
#[tokio::test]
async fn stale_logout_request_is_rejected_by_protocol_assert() {
    let request = LogoutRequest::new("https://idp.example.org/md", "https://hub.example.org/slo/idp", "alice");
    let mut dom = request.0.dom;
    let root = request.0.root;
    dom.set_attr(root, "IssueInstant", "2000-01-01T00:00:00Z");
    let xml = fedhub::xml::serialize(&dom, root);

    let result = receive::protocol_assert(&xml, Utc::now());
    assert!(result.is_err());
}

/// A `Response` with a failure status surfaces as `HubError::UpstreamStatus`, not a
/// successfully-parsed assertion — the distinction the `/acs` handler relies on.
#[test]
fn failure_response_status_is_not_success() {
    let mut dom = fedhub::xml::Dom::new();
    dom.register_namespace("samlp", "urn:oasis:names:tc:SAML:2.0:protocol");
    let root = dom.create_element(None, "samlp:Response");
    dom.root = Some(root);
    dom.set_attr(root, "ID", "_resp1");
    let status = dom.create_element(Some(root), "samlp:Status");
    let code = dom.create_element(Some(status), "samlp:StatusCode");
    dom.set_attr(code, "Value", "urn:oasis:names:tc:SAML:2.0:status:Responder");

    let response = Response(fedhub::saml::model::SamlDoc { dom, root });
    assert!(!response.is_success());
}
