//! The inbound message pipeline (spec §4.3): decode, schema-validate, protocol-assert,
//! verify the signature, and check timing — in that order, with the HTTP-Redirect
//! binding's raw-query-parameter signature checked *before* the payload is inflated and
//! parsed (the detached signature covers the still-encoded parameters, not the XML).

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rsa::RsaPublicKey;
use std::io::{Read, Write};

use crate::common::algo::{self, Alg};
use crate::common::error::HubError;
use crate::common::time::{issue_instant_ok, parse_instant};
use crate::saml::envelope::verify_enveloped;
use crate::xml::schema::{self, SAML_PROTOCOL_SCHEMA};
use crate::xml::{parse, Dom, NodeId};

/// HTTP-Redirect binding query parameters carrying a detached signature (spec §4.3).
pub struct RedirectParams<'a> {
    pub saml_param_name: &'static str, // "SAMLRequest" or "SAMLResponse"
    pub saml_message: &'a str,
    pub relay_state: Option<&'a str>,
    pub sig_alg: Option<&'a str>,
    pub signature: Option<&'a str>,
}

/// Decodes the `SAMLRequest`/`SAMLResponse` parameter of the HTTP-Redirect binding:
/// base64, then raw DEFLATE (spec §4.3).
pub fn decode_redirect(saml_message: &str) -> Result<Vec<u8>, HubError> {
    let compressed = STANDARD
        .decode(saml_message)
        .map_err(|_| HubError::malformed("base64 decode"))?;
    let mut decoder = DeflateDecoder::new(&compressed[..]);
    let mut xml = Vec::new();
    decoder
        .read_to_end(&mut xml)
        .map_err(|_| HubError::malformed("inflate"))?;
    Ok(xml)
}

/// Encodes a message for the HTTP-Redirect binding: raw DEFLATE, then base64.
pub fn encode_redirect(xml: &[u8]) -> Result<String, HubError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml)
        .map_err(|_| HubError::malformed("deflate"))?;
    let compressed = encoder.finish().map_err(|_| HubError::malformed("deflate"))?;
    Ok(STANDARD.encode(compressed))
}

/// Decodes the `SAMLRequest`/`SAMLResponse` parameter of the HTTP-POST binding: base64
/// only, no compression (spec §4.3).
pub fn decode_post(saml_message: &str) -> Result<Vec<u8>, HubError> {
    STANDARD
        .decode(saml_message)
        .map_err(|_| HubError::malformed("base64 decode"))
}

/// Verifies the detached signature over the raw (still base64-encoded) HTTP-Redirect
/// query parameters, in the exact order `SAMLRequest`/`SAMLResponse` (+`RelayState`) +
/// `SigAlg` are concatenated per the SAML binding spec, before anything is inflated.
pub fn verify_redirect_signature(params: &RedirectParams, candidates: &[RsaPublicKey]) -> Result<(), HubError> {
    let (sig_alg, signature) = match (params.sig_alg, params.signature) {
        (Some(a), Some(s)) => (a, s),
        _ => return Err(HubError::crypto("verify")),
    };

    let mut signed_content = format!("{}={}", params.saml_param_name, urlencoding::encode(params.saml_message));
    if let Some(rs) = params.relay_state {
        signed_content.push_str(&format!("&RelayState={}", urlencoding::encode(rs)));
    }
    signed_content.push_str(&format!("&SigAlg={}", urlencoding::encode(sig_alg)));

    let entry = algo::entry_for_uri(sig_alg).ok_or_else(|| HubError::crypto("verify"))?;
    if !algo::is_allowed_for_ingress(entry.alg) {
        return Err(HubError::crypto("verify"));
    }

    let sig_bytes = STANDARD
        .decode(signature)
        .map_err(|_| HubError::crypto("verify"))?;
    let digest = crate::crypto::hash(entry.alg, signed_content.as_bytes());

    if crate::crypto::verify_pkcs1v15(candidates, entry.alg, &digest, &sig_bytes) {
        Ok(())
    } else {
        Err(HubError::crypto("verify"))
    }
}

/// The outcome of running a parsed message through the shared receive pipeline: the
/// document plus the already-validated root, ready for message-type-specific handling.
pub struct Received {
    pub dom: Dom,
    pub root: NodeId,
}

/// Schema-validates and protocol-asserts an already-decoded (and, for HTTP-POST,
/// envelope-signature-verified) message: required `ID`/`Version`/`IssueInstant`, and the
/// ±90s IssueInstant timing window (spec §4.3).
pub fn protocol_assert(bytes: &[u8], now: chrono::DateTime<chrono::Utc>) -> Result<Received, HubError> {
    let dom = parse(bytes)?;
    let root = dom.root.ok_or_else(|| HubError::malformed("empty document"))?;

    let errs = schema::validate(&dom, root, SAML_PROTOCOL_SCHEMA);
    if !errs.is_empty() {
        return Err(HubError::malformed(errs.join("; ")));
    }

    if dom.attr(root, "Version") != Some("2.0") {
        return Err(HubError::malformed("unsupported SAML version"));
    }

    let issue_instant = dom
        .attr(root, "IssueInstant")
        .ok_or_else(|| HubError::malformed("missing IssueInstant"))?;
    let ts = parse_instant(issue_instant).map_err(|_| HubError::malformed("bad IssueInstant"))?;
    if !issue_instant_ok(now, ts) {
        return Err(HubError::Timing);
    }

    Ok(Received { dom, root })
}

/// Verifies the enveloped signature on an already protocol-asserted HTTP-POST message
/// (spec §4.3 — for HTTP-Redirect the detached query-parameter signature is checked
/// instead, via [`verify_redirect_signature`], before the message is even decoded).
pub fn verify_post_signature(received: &Received, candidates: &[RsaPublicKey]) -> Result<(), HubError> {
    verify_enveloped(&received.dom, received.root, candidates)
}

/// Confirms the chosen signature algorithm is on the ingress allow-list (spec §6); used
/// by both binding paths before trusting a verification result.
pub fn allowed_alg(alg: Alg) -> bool {
    algo::is_allowed_for_ingress(alg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_round_trips_deflate_and_base64() {
        let xml = br#"<samlp:AuthnRequest ID="_1" Version="2.0" IssueInstant="2026-01-01T00:00:00Z"/>"#;
        let encoded = encode_redirect(xml).unwrap();
        let decoded = decode_redirect(&encoded).unwrap();
        assert_eq!(decoded, xml);
    }

    #[test]
    fn protocol_assert_rejects_stale_issue_instant() {
        let xml = br#"<samlp:AuthnRequest ID="_1" Version="2.0" IssueInstant="2000-01-01T00:00:00Z"><saml:Issuer>sp</saml:Issuer></samlp:AuthnRequest>"#;
        let err = protocol_assert(xml, chrono::Utc::now()).unwrap_err();
        assert!(matches!(err, HubError::Timing));
    }

    #[test]
    fn protocol_assert_accepts_fresh_message() {
        let now = chrono::Utc::now();
        let xml = format!(
            r#"<samlp:AuthnRequest ID="_1" Version="2.0" IssueInstant="{}"><saml:Issuer>sp</saml:Issuer></samlp:AuthnRequest>"#,
            crate::common::time::format_instant(now)
        );
        assert!(protocol_assert(xml.as_bytes(), now).is_ok());
    }
}
