//! Envelope (enveloped `ds:Signature`) generation and verification (spec §4.3).
//!
//! Signature placement follows the per-protocol rule table: `AuthnRequest` and
//! `LogoutRequest`/`LogoutResponse` are signed as a direct child of the root, after
//! `Issuer`; a `Response`'s assertions are signed individually as well as (optionally)
//! the `Response` itself.

use crate::common::algo::{self, Alg};
use crate::common::error::HubError;
use crate::crypto::{self, Signer};
use crate::xml::c14n::c14n_exclusive;
use crate::xml::querydashp::query_dash_p;
use crate::xml::xpath::{query1, query_value};
use crate::xml::{Dom, NodeId};
use rsa::RsaPublicKey;

const DS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Computes the digest and signature over `target`'s canonical form and inserts a
/// `ds:Signature` as the first child after `saml:Issuer` (or at the front if no Issuer
/// is present, e.g. inside an `Assertion`).
pub async fn sign_enveloped(
    dom: &mut Dom,
    target: NodeId,
    alg: Alg,
    signer: &Signer,
) -> Result<(), HubError> {
    dom.register_namespace("ds", DS);

    let canonical = c14n_exclusive(dom, target, &[]);
    let entry = algo::entry_for_shorthand(alg.shorthand()).ok_or_else(|| HubError::crypto("signing"))?;

    let digest = crypto::hash(alg, &canonical);
    let digest_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &digest);

    let sig_id = insert_signature_skeleton(dom, target, entry.digest_uri, entry.signature_uri, &digest_b64);

    // The `ds:SignedInfo` element is itself canonicalised and signed (spec §4.3).
    let signed_info = query1(dom, sig_id, "ds:SignedInfo")
        .ok_or_else(|| HubError::crypto("signing"))?;
    let signed_info_canonical = c14n_exclusive(dom, signed_info, &[]);
    let signed_info_digest = crypto::hash(alg, &signed_info_canonical);
    let raw_sig = signer.sign(alg, &signed_info_digest).await?;
    let sig_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &raw_sig);
    query_dash_p(dom, sig_id, "ds:SignatureValue", &sig_b64, None);

    Ok(())
}

fn insert_signature_skeleton(
    dom: &mut Dom,
    target: NodeId,
    digest_uri: &str,
    signature_uri: &str,
    digest_b64: &str,
) -> NodeId {
    let issuer = query1(dom, target, "saml:Issuer");
    let sig = dom.create_element(None, "ds:Signature");
    dom.node_mut(sig).parent = Some(target);
    let index = issuer.and_then(|i| dom.children(target).iter().position(|&c| c == i).map(|p| p + 1));
    dom.insert_child_at(target, sig, index);

    let signed_info = dom.create_element(Some(sig), "ds:SignedInfo");
    let canon_method = dom.create_element(Some(signed_info), "ds:CanonicalizationMethod");
    dom.set_attr(canon_method, "Algorithm", "http://www.w3.org/2001/10/xml-exc-c14n#");
    let sig_method = dom.create_element(Some(signed_info), "ds:SignatureMethod");
    dom.set_attr(sig_method, "Algorithm", signature_uri);

    let reference = dom.create_element(Some(signed_info), "ds:Reference");
    let uri = dom.attr(target, "ID").map(|id| format!("#{id}")).unwrap_or_default();
    dom.set_attr(reference, "URI", &uri);
    let digest_method = dom.create_element(Some(reference), "ds:DigestMethod");
    dom.set_attr(digest_method, "Algorithm", digest_uri);
    query_dash_p(dom, reference, "ds:DigestValue", digest_b64, None);

    dom.create_element(Some(sig), "ds:SignatureValue");
    sig
}

/// Verifies an enveloped signature against the candidate certificates (signing-key
/// rollover, spec §4.3). Returns the verified node's `ds:Signature` digest/sig algorithm
/// on success, purely for logging — the caller never branches on which sub-check passed.
pub fn verify_enveloped(dom: &Dom, target: NodeId, candidates: &[RsaPublicKey]) -> Result<(), HubError> {
    let sig = query1(dom, target, "ds:Signature").ok_or_else(|| HubError::crypto("verify"))?;
    let signed_info = query1(dom, sig, "ds:SignedInfo").ok_or_else(|| HubError::crypto("verify"))?;

    let reference_uri = query_value(dom, signed_info, "ds:Reference/@URI").unwrap_or_default();
    let target_id = dom.attr(target, "ID").unwrap_or_default();
    if reference_uri != format!("#{target_id}") {
        return Err(HubError::crypto("verify"));
    }

    let digest_uri = query_value(dom, signed_info, "ds:Reference/ds:DigestMethod/@Algorithm")
        .ok_or_else(|| HubError::crypto("verify"))?;
    let signature_uri = query_value(dom, signed_info, "ds:SignatureMethod/@Algorithm")
        .ok_or_else(|| HubError::crypto("verify"))?;
    let entry = algo::entry_for_uri(&digest_uri).ok_or_else(|| HubError::crypto("verify"))?;
    if algo::entry_for_uri(&signature_uri).map(|e| e.alg) != Some(entry.alg) {
        return Err(HubError::crypto("verify"));
    }
    if !algo::is_allowed_for_ingress(entry.alg) {
        return Err(HubError::crypto("verify"));
    }

    // Recompute the target digest over a copy of the subtree with the Signature
    // removed, matching how the signature was originally produced over the
    // not-yet-signed document.
    let mut scratch = dom.clone();
    let target_copy = scratch.copy_node(target, None);
    if let Some(sig_copy) = query1(&scratch, target_copy, "ds:Signature") {
        scratch.remove_child(target_copy, sig_copy);
    }
    let canonical = c14n_exclusive(&scratch, target_copy, &[]);
    let expected_digest = crypto::hash(entry.alg, &canonical);

    let claimed_digest_b64 = query_value(dom, signed_info, "ds:Reference/ds:DigestValue")
        .ok_or_else(|| HubError::crypto("verify"))?;
    let claimed_digest = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, claimed_digest_b64)
        .map_err(|_| HubError::crypto("verify"))?;
    if claimed_digest != expected_digest {
        return Err(HubError::crypto("verify"));
    }

    let signed_info_canonical = c14n_exclusive(dom, signed_info, &[]);
    let signed_info_digest = crypto::hash(entry.alg, &signed_info_canonical);
    let sig_value_b64 = query_value(dom, sig, "ds:SignatureValue").ok_or_else(|| HubError::crypto("verify"))?;
    let sig_value = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, sig_value_b64)
        .map_err(|_| HubError::crypto("verify"))?;

    if crypto::verify_pkcs1v15(candidates, entry.alg, &signed_info_digest, &sig_value) {
        Ok(())
    } else {
        Err(HubError::crypto("verify"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hsm::HttpHsmClient;
    use crate::crypto::keys::KeyRef;
    use std::sync::Arc;

    fn test_signer() -> (Signer, RsaPublicKey) {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = key.to_public_key();
        let signer = Signer::new(KeyRef::Local(Arc::new(key)), Arc::new(HttpHsmClient::new()));
        (signer, public)
    }

    #[tokio::test]
    async fn sign_then_verify_round_trips() {
        let (signer, public) = test_signer();
        let mut dom = Dom::new();
        dom.register_namespace("saml", "urn:oasis:names:tc:SAML:2.0:assertion");
        let root = dom.create_element(None, "samlp:AuthnRequest");
        dom.root = Some(root);
        dom.set_attr(root, "ID", "_req1");
        query_dash_p(&mut dom, root, "saml:Issuer", "https://hub/md", None);

        sign_enveloped(&mut dom, root, Alg::Sha256, &signer).await.unwrap();
        assert!(verify_enveloped(&dom, root, &[public]).is_ok());
    }

    #[tokio::test]
    async fn tampering_after_signing_fails_verification() {
        let (signer, public) = test_signer();
        let mut dom = Dom::new();
        dom.register_namespace("saml", "urn:oasis:names:tc:SAML:2.0:assertion");
        let root = dom.create_element(None, "samlp:AuthnRequest");
        dom.root = Some(root);
        dom.set_attr(root, "ID", "_req1");
        query_dash_p(&mut dom, root, "saml:Issuer", "https://hub/md", None);

        sign_enveloped(&mut dom, root, Alg::Sha256, &signer).await.unwrap();
        dom.set_attr(root, "ID", "_tampered");
        assert!(verify_enveloped(&dom, root, &[public]).is_err());
    }

    #[tokio::test]
    async fn reference_uri_names_the_signed_elements_id() {
        let (signer, _public) = test_signer();
        let mut dom = Dom::new();
        dom.register_namespace("saml", "urn:oasis:names:tc:SAML:2.0:assertion");
        let root = dom.create_element(None, "samlp:AuthnRequest");
        dom.root = Some(root);
        dom.set_attr(root, "ID", "_req1");
        query_dash_p(&mut dom, root, "saml:Issuer", "https://hub/md", None);

        sign_enveloped(&mut dom, root, Alg::Sha256, &signer).await.unwrap();
        let sig = query1(&dom, root, "ds:Signature").unwrap();
        let signed_info = query1(&dom, sig, "ds:SignedInfo").unwrap();
        let uri = query_value(&dom, signed_info, "ds:Reference/@URI").unwrap();
        assert_eq!(uri, "#_req1");
    }
}
