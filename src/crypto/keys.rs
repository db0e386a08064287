//! PEM/X.509 key and certificate loading (spec §4.2).

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use x509_cert::der::{Encode, DecodePem};
use x509_cert::Certificate;
use zeroize::Zeroizing;

use crate::common::error::HubError;

/// Where a private key lives — either loaded locally, or delegated to the HSM
/// component via an `hsm:<label>:<endpoint>` URI (spec §4.2).
#[derive(Clone)]
pub enum KeyRef {
    Local(std::sync::Arc<RsaPrivateKey>),
    Hsm { label: String, endpoint: String },
}

impl std::fmt::Debug for KeyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyRef::Local(_) => write!(f, "KeyRef::Local(..)"),
            KeyRef::Hsm { label, endpoint } => {
                write!(f, "KeyRef::Hsm {{ label: {label}, endpoint: {endpoint} }}")
            }
        }
    }
}

/// Resolves a configured key reference: `hsm:<label>:<endpoint>` or a filesystem path
/// to a PEM-encoded private key.
pub fn resolve_key_ref(configured: &str, password: Option<&str>) -> Result<KeyRef, HubError> {
    if let Some(rest) = configured.strip_prefix("hsm:") {
        let (label, endpoint) = rest
            .split_once(':')
            .ok_or_else(|| HubError::malformed("hsm key uri must be hsm:<label>:<endpoint>"))?;
        return Ok(KeyRef::Hsm {
            label: label.to_string(),
            endpoint: endpoint.to_string(),
        });
    }

    let pem = std::fs::read_to_string(configured)
        .map_err(|e| HubError::transport(format!("reading private key {configured}: {e}")))?;
    let key = pem_decode_private(&pem, password)?;
    Ok(KeyRef::Local(std::sync::Arc::new(key)))
}

/// Decodes a PEM private key, accepting PKCS#1 and PKCS#8, with optional password for
/// PKCS#8-encrypted material (spec §4.2).
pub fn pem_decode_private(pem: &str, password: Option<&str>) -> Result<RsaPrivateKey, HubError> {
    if let Some(pw) = password {
        let pw = Zeroizing::new(pw.to_string());
        return RsaPrivateKey::from_pkcs8_encrypted_pem(pem, pw.as_bytes())
            .map_err(|_| HubError::crypto("key decode"));
    }

    if let Ok(k) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(k);
    }
    RsaPrivateKey::from_pkcs1_pem(pem).map_err(|_| HubError::crypto("key decode"))
}

/// Parses a PEM-encoded X.509 certificate and extracts its RSA public key.
pub fn public_key_from_cert_pem(pem: &str) -> Result<RsaPublicKey, HubError> {
    let cert = Certificate::from_pem(pem.as_bytes()).map_err(|_| HubError::crypto("cert decode"))?;
    let spki = &cert.tbs_certificate.subject_public_key_info;
    let der = spki.to_der().map_err(|_| HubError::crypto("cert decode"))?;
    RsaPublicKey::try_from(
        rsa::pkcs8::SubjectPublicKeyInfoRef::try_from(der.as_slice())
            .map_err(|_| HubError::crypto("cert decode"))?,
    )
    .map_err(|_| HubError::crypto("cert decode"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsm_uri_is_parsed() {
        match resolve_key_ref("hsm:signing1:https://hsm.internal:4443", None).unwrap() {
            KeyRef::Hsm { label, endpoint } => {
                assert_eq!(label, "signing1");
                assert_eq!(endpoint, "https://hsm.internal:4443");
            }
            _ => panic!("expected hsm ref"),
        }
    }
}
