//! `/acs` (spec §6, §4.7): receives the IdP's `Response`, runs it through the attribute
//! pipeline, and POSTs the hub's own `Response` back to the SP that started the flow —
//! correlated via the `SamlRequest` cookie the matching `/sso` call set.

use axum::extract::{Form, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;

use crate::attributes::{self, arp};
use crate::common::error::HubError;
use crate::cookie::samlrequest::SamlRequest;
use crate::cookie::sloinfo::{SloInfo, SloInfoList};
use crate::saml::model::SamlDoc;
use crate::saml::receive;
use crate::statemachine;
use crate::web::middleware;

use super::jwt_bridge::HubSession;
use super::AppState;

#[derive(Deserialize)]
pub struct AcsForm {
    #[serde(rename = "SAMLResponse")]
    pub saml_response: String,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

pub async fn acs_post(State(state): State<AppState>, headers: HeaderMap, Form(form): Form<AcsForm>) -> Result<Response, HubError> {
    let xml = receive::decode_post(&form.saml_response)?;
    let received = receive::protocol_assert(&xml, Utc::now())?;
    let response = crate::saml::model::Response(SamlDoc { dom: received.dom, root: received.root });

    let in_response_to = response.0.in_response_to().ok_or_else(|| HubError::malformed("missing InResponseTo"))?;

    let cookies = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(middleware::parse_cookies)
        .unwrap_or_default();

    let now = Utc::now();
    let hmac_key = state.config.cookies.hmac_key.as_bytes();
    let ttl = state.config.cookies.samlrequest_ttl_seconds;

    let matched = cookies
        .iter()
        .filter(|(name, _)| name.starts_with("SSO2-"))
        .find_map(|(name, value)| {
            let req = SamlRequest::open(value, hmac_key, ttl, now).ok()?;
            (req.id == in_response_to).then_some((name.clone(), req))
        })
        .ok_or_else(|| HubError::transport("no matching SamlRequest cookie for this InResponseTo"))?;

    let (cookie_name, saml_request) = matched;
    let idp_hash = cookie_name.trim_start_matches("SSO2-");
    let (idp, _idp_set) = state.find_idp_by_hash(idp_hash)?;

    let expected_audience = statemachine::map_to_idp(&idp.entity_id);
    let (name_id, raw_attrs) = statemachine::acs::receive_idp_response(
        &response,
        &idp,
        &expected_audience,
        &saml_request.hub_acs_url,
        Some(&state.decrypt_signer),
    )
    .await?;

    let idp_scope = attributes::derive_idp_scope(&raw_attrs, &idp.entity_id);
    let home_organization = idp_scope.clone().unwrap_or_else(|| idp.entity_id.clone());
    let policy = arp::default_arp();
    let released = statemachine::acs::release_to_sp(raw_attrs, idp_scope.as_deref(), &home_organization, &policy)?;

    let sp_response = statemachine::acs::build_sp_response(
        &saml_request.sp_entity_id,
        &saml_request.acs_url,
        &saml_request.sp_request_id,
        &name_id,
        &released,
        &state.signer,
        state.alg,
    )
    .await?;

    let slo_list = cookies
        .get("SLO")
        .and_then(|c| SloInfoList::open(c, hmac_key, state.config.cookies.slo_ttl_seconds, now).ok())
        .unwrap_or_default();
    let slo_cookie = update_slo_participants(slo_list, &idp.entity_id, &saml_request.sp_entity_id, &name_id)
        .seal(hmac_key, now);

    let session = HubSession {
        name_id: name_id.clone(),
        idp_entity_id: idp.entity_id.clone(),
        attributes: released,
    };
    let session_payload = serde_json::to_vec(&session).map_err(|_| HubError::malformed("hub session encode"))?;
    let session_cookie = crate::cookie::opaque::encode(&session_payload, hmac_key, now);

    let user_agent = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok());
    let clear_samlrequest = middleware::clear_cookie_header(&cookie_name);
    let slo_set_cookie = middleware::set_cookie_header("SLO", &slo_cookie, state.config.cookies.slo_ttl_seconds, user_agent);
    let session_set_cookie = middleware::set_cookie_header("HUBSESSION", &session_cookie, state.config.jwt.ttl_seconds, user_agent);

    let message_b64 = base64::engine::general_purpose::STANDARD.encode(sp_response.0.serialize());
    let body = middleware::html_post_form(&saml_request.acs_url, "SAMLResponse", &message_b64, saml_request.relay_state.as_deref());

    let mut http_response = Response::builder()
        .status(axum::http::StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(axum::body::Body::from(body))
        .map_err(|_| HubError::malformed("response build"))?;

    let headers_mut = http_response.headers_mut();
    for set_cookie in [clear_samlrequest, slo_set_cookie, session_set_cookie] {
        headers_mut.append(header::SET_COOKIE, set_cookie.parse().map_err(|_| HubError::malformed("cookie header"))?);
    }

    Ok(http_response)
}

/// Folds the IdP and SP that just completed SSO into the session's `SLOInfoList`, so a
/// future logout at either party cascades to the other (spec §4.8).
fn update_slo_participants(mut list: SloInfoList, idp_entity_id: &str, sp_entity_id: &str, name_id: &str) -> SloInfoList {
    if !list.0.iter().any(|e| e.entity_id == idp_entity_id) {
        list.0.push(SloInfo {
            entity_id: idp_entity_id.to_string(),
            name_id: name_id.to_string(),
            session_index: None,
            is_idp: true,
        });
    }
    if !list.0.iter().any(|e| e.entity_id == sp_entity_id) {
        list.0.push(SloInfo {
            entity_id: sp_entity_id.to_string(),
            name_id: name_id.to_string(),
            session_index: None,
            is_idp: false,
        });
    }
    list
}
