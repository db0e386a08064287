//! JWT bridge (spec §4.9, component C9): converts between a SAML assertion (as decoded
//! by the attribute pipeline) and a signed JSON token, for relying parties that speak
//! OIDC-style bearer tokens rather than SAML.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::attributes::AttributeSet;
use crate::common::algo::Alg;
use crate::common::error::HubError;
use crate::common::time::TIMING_SKEW_SECONDS;

#[derive(Debug, Serialize, Deserialize)]
pub struct SamlClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    /// `at_hash`: a truncated digest binding this token to the SAML NameID it was
    /// minted from, so a token cannot be replayed against a different assertion.
    pub at_hash: String,
    #[serde(flatten)]
    pub attributes: std::collections::BTreeMap<String, serde_json::Value>,
}

fn at_hash(alg: Alg, name_id: &str) -> String {
    let digest = match alg {
        Alg::Sha512 => Sha512::digest(name_id.as_bytes()).to_vec(),
        _ => Sha256::digest(name_id.as_bytes()).to_vec(),
    };
    let half = &digest[..digest.len() / 2];
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, half)
}

fn jwt_algorithm(alg: Alg) -> Result<Algorithm, HubError> {
    match alg {
        Alg::Sha256 => Ok(Algorithm::RS256),
        Alg::Sha512 => Ok(Algorithm::RS512),
        _ => Err(HubError::crypto("jwt algorithm")),
    }
}

/// Converts a decoded SAML assertion (NameID + released attribute set) into a signed
/// JWT (spec §4.9). `ttl_seconds` bounds `exp`; `iss`/`aud` are the hub and the
/// relying party's entityIDs respectively.
pub fn saml_to_jwt(
    issuer: &str,
    audience: &str,
    name_id: &str,
    attributes: &AttributeSet,
    ttl_seconds: i64,
    alg: Alg,
    signing_key_pem: &str,
) -> Result<String, HubError> {
    let now = chrono::Utc::now().timestamp();
    let claims = SamlClaims {
        iss: issuer.to_string(),
        sub: name_id.to_string(),
        aud: audience.to_string(),
        exp: now + ttl_seconds,
        iat: now,
        at_hash: at_hash(alg, name_id),
        attributes: attributes
            .iter()
            .map(|(k, v)| {
                let value = if v.len() == 1 {
                    serde_json::Value::String(v[0].clone())
                } else {
                    serde_json::Value::Array(v.iter().cloned().map(serde_json::Value::String).collect())
                };
                (k.clone(), value)
            })
            .collect(),
    };

    let algorithm = jwt_algorithm(alg)?;
    let key = EncodingKey::from_rsa_pem(signing_key_pem.as_bytes()).map_err(|_| HubError::crypto("jwt key"))?;
    jsonwebtoken::encode(&Header::new(algorithm), &claims, &key).map_err(|_| HubError::crypto("jwt sign"))
}

/// Verifies and decodes a JWT back into SAML-shaped claims (spec §4.9). `iat` is
/// allowed the same ±90s skew as any other SAML timestamp.
pub fn jwt_to_saml(token: &str, alg: Alg, expected_audience: &str, verifying_key_pem: &str) -> Result<SamlClaims, HubError> {
    let algorithm = jwt_algorithm(alg)?;
    let key = DecodingKey::from_rsa_pem(verifying_key_pem.as_bytes()).map_err(|_| HubError::crypto("jwt key"))?;

    let mut validation = Validation::new(algorithm);
    validation.set_audience(&[expected_audience]);
    validation.leeway = TIMING_SKEW_SECONDS as u64;

    let decoded = jsonwebtoken::decode::<SamlClaims>(token, &key, &validation)
        .map_err(|_| HubError::crypto("jwt verify"))?;
    Ok(decoded.claims)
}
