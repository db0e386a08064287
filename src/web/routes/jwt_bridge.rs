//! `/saml2jwt` and `/jwt2saml` (spec §6, §4.9, component C9): bridges the hub's SAML
//! session to relying parties that speak signed JSON tokens instead.
//!
//! There is no server-side session store, so `/saml2jwt` can only mint a token for a
//! session that `/acs` already established — it reads the `HUBSESSION` cookie `/acs`
//! set rather than reconstructing an assertion from request headers alone.

use axum::extract::{Form, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use chrono::Utc;
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::attributes::AttributeSet;
use crate::common::algo::Alg;
use crate::common::error::HubError;
use crate::crypto::keys::pem_decode_private;
use crate::jwt;
use crate::statemachine;
use crate::web::middleware;

use super::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HubSession {
    pub name_id: String,
    pub idp_entity_id: String,
    pub attributes: AttributeSet,
}

#[derive(Deserialize)]
pub struct Saml2JwtQuery {
    pub app: Option<String>,
}

#[derive(Deserialize)]
pub struct Jwt2SamlForm {
    pub token: String,
    pub acs: String,
    pub sp: String,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

fn jwt_signing_pem(state: &AppState) -> Result<String, HubError> {
    let pem = std::fs::read_to_string(&state.config.jwt.signing_key)
        .map_err(|e| HubError::transport(format!("reading jwt signing key: {e}")))?;
    let key = pem_decode_private(&pem, None)?;
    key.to_pkcs1_pem(Default::default())
        .map(|p| p.to_string())
        .map_err(|_| HubError::crypto("jwt key encode"))
}

fn jwt_verifying_pem(state: &AppState) -> Result<String, HubError> {
    let pem = std::fs::read_to_string(&state.config.jwt.signing_key)
        .map_err(|e| HubError::transport(format!("reading jwt signing key: {e}")))?;
    let key = pem_decode_private(&pem, None)?;
    key.to_public_key()
        .to_pkcs1_pem(Default::default())
        .map_err(|_| HubError::crypto("jwt key encode"))
}

fn jwt_alg(state: &AppState) -> Alg {
    match state.config.jwt.alg.as_str() {
        "RS512" => Alg::Sha512,
        _ => Alg::Sha256,
    }
}

/// Mints a JWT for the SP named by `?app=` from the session `/acs` left behind.
pub async fn saml2jwt(State(state): State<AppState>, Query(q): Query<Saml2JwtQuery>, headers: HeaderMap) -> Result<Response, HubError> {
    let app = q.app.ok_or_else(|| HubError::malformed("missing app"))?;
    let (sp, _set) = state.find_sp(&app)?;

    let cookies = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(middleware::parse_cookies)
        .unwrap_or_default();
    let session_cookie = cookies
        .get("HUBSESSION")
        .ok_or_else(|| HubError::policy("no hub session; initiate via /sso first"))?;

    let now = Utc::now();
    let payload = crate::cookie::opaque::decode(session_cookie, state.config.cookies.hmac_key.as_bytes(), state.config.jwt.ttl_seconds, now)?;
    let session: HubSession = serde_json::from_slice(&payload).map_err(|_| HubError::malformed("bad hub session"))?;

    let signing_pem = jwt_signing_pem(&state)?;
    let token = jwt::saml_to_jwt(
        &state.hub_entity_id,
        &sp.entity_id,
        &session.name_id,
        &session.attributes,
        state.config.jwt.ttl_seconds,
        jwt_alg(&state),
        &signing_pem,
    )?;

    Ok(([(header::AUTHORIZATION, format!("Bearer {token}"))], "").into_response())
}

/// Verifies a JWT and answers with a freshly minted SAML `Response`, so a relying
/// party that only speaks SAML can still ride the token bridge's session.
pub async fn jwt2saml(State(state): State<AppState>, Form(form): Form<Jwt2SamlForm>) -> Result<Response, HubError> {
    let (sp, _set) = state.find_sp(&form.sp)?;

    let verifying_pem = jwt_verifying_pem(&state)?;
    let claims = jwt::jwt_to_saml(&form.token, jwt_alg(&state), &sp.entity_id, &verifying_pem)?;

    let mut attributes = AttributeSet::new();
    for (key, value) in &claims.attributes {
        let values = match value {
            serde_json::Value::String(s) => vec![s.clone()],
            serde_json::Value::Array(items) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
            _ => continue,
        };
        attributes.insert(key.clone(), values);
    }

    let request_id = crate::saml::model::fresh_id();
    let sp_response = statemachine::acs::build_sp_response(
        &sp.entity_id,
        &form.acs,
        &request_id,
        &claims.sub,
        &attributes,
        &state.signer,
        state.alg,
    )
    .await?;

    let message_b64 = base64::engine::general_purpose::STANDARD.encode(sp_response.0.serialize());
    let body = middleware::html_post_form(&form.acs, "SAMLResponse", &message_b64, form.relay_state.as_deref());
    Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response())
}
