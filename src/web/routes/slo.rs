//! `/slo/{idp,sp,birk,krib}` (spec §6, §4.8): cascades a `LogoutRequest` to every other
//! party sharing the session before answering the party that started the logout.
//!
//! The hub keeps no server-side session store, so the cascade's continuation state
//! (which participants remain, and who to finally answer) rides in the outgoing
//! `LogoutRequest`'s `RelayState` as an HMAC-sealed, opaque blob — the same trick the
//! `SamlRequest` cookie uses for the SSO round trip, just carried over the wire instead
//! of in a cookie since the next hop is a different party's browser redirect.

use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::common::error::{HubError, StatusReason};
use crate::cookie::sloinfo::{SloInfo, SloInfoList};
use crate::metadata::{Entity, SetName};
use crate::saml::model::{LogoutRequest, LogoutResponse, SamlDoc};
use crate::saml::receive::{self, Received};
use crate::saml::envelope;
use crate::statemachine;
use crate::web::middleware;

use super::AppState;

#[derive(Deserialize)]
pub struct SloQuery {
    #[serde(rename = "SAMLRequest")]
    pub saml_request: Option<String>,
    #[serde(rename = "SAMLResponse")]
    pub saml_response: Option<String>,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
    #[serde(rename = "SigAlg")]
    pub sig_alg: Option<String>,
    #[serde(rename = "Signature")]
    pub signature: Option<String>,
}

#[derive(Deserialize)]
pub struct SloForm {
    #[serde(rename = "SAMLRequest")]
    pub saml_request: Option<String>,
    #[serde(rename = "SAMLResponse")]
    pub saml_response: Option<String>,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct Continuation {
    initiator_entity_id: String,
    initiator_request_id: String,
    initiator_is_idp: bool,
    remaining: Vec<SloInfo>,
}

pub async fn slo_get(
    State(state): State<AppState>,
    Path(role): Path<String>,
    Query(q): Query<SloQuery>,
    headers: HeaderMap,
) -> Result<Response, HubError> {
    if let Some(msg) = &q.saml_request {
        let xml = receive::decode_redirect(msg)?;
        let (entity, _set) = resolve_role_entity(&state, &role, &peek_issuer(&xml)?)?;
        let params = receive::RedirectParams {
            saml_param_name: "SAMLRequest",
            saml_message: msg,
            relay_state: q.relay_state.as_deref(),
            sig_alg: q.sig_alg.as_deref(),
            signature: q.signature.as_deref(),
        };
        receive::verify_redirect_signature(&params, &entity.certs)?;
        let received = receive::protocol_assert(&xml, Utc::now())?;
        return handle_logout_request(&state, &role, received, &headers).await;
    }
    if let Some(msg) = &q.saml_response {
        let xml = receive::decode_redirect(msg)?;
        let (entity, _set) = resolve_role_entity(&state, &role, &peek_issuer(&xml)?)?;
        let params = receive::RedirectParams {
            saml_param_name: "SAMLResponse",
            saml_message: msg,
            relay_state: q.relay_state.as_deref(),
            sig_alg: q.sig_alg.as_deref(),
            signature: q.signature.as_deref(),
        };
        receive::verify_redirect_signature(&params, &entity.certs)?;
        let received = receive::protocol_assert(&xml, Utc::now())?;
        return handle_logout_response(&state, received, q.relay_state.as_deref()).await;
    }
    Err(HubError::malformed("missing SAMLRequest/SAMLResponse"))
}

pub async fn slo_post(
    State(state): State<AppState>,
    Path(role): Path<String>,
    headers: HeaderMap,
    Form(form): Form<SloForm>,
) -> Result<Response, HubError> {
    if let Some(msg) = &form.saml_request {
        let xml = receive::decode_post(msg)?;
        let received = receive::protocol_assert(&xml, Utc::now())?;
        let issuer = crate::xml::xpath::query_value(&received.dom, received.root, "saml:Issuer")
            .ok_or_else(|| HubError::malformed("missing Issuer"))?;
        let (entity, _set) = resolve_role_entity(&state, &role, &issuer)?;
        receive::verify_post_signature(&received, &entity.certs)?;
        return handle_logout_request(&state, &role, received, &headers).await;
    }
    if let Some(msg) = &form.saml_response {
        let xml = receive::decode_post(msg)?;
        let received = receive::protocol_assert(&xml, Utc::now())?;
        let issuer = crate::xml::xpath::query_value(&received.dom, received.root, "saml:Issuer")
            .ok_or_else(|| HubError::malformed("missing Issuer"))?;
        let (entity, _set) = resolve_role_entity(&state, &role, &issuer)?;
        receive::verify_post_signature(&received, &entity.certs)?;
        return handle_logout_response(&state, received, form.relay_state.as_deref()).await;
    }
    Err(HubError::malformed("missing SAMLRequest/SAMLResponse"))
}

fn peek_issuer(xml: &[u8]) -> Result<String, HubError> {
    let dom = crate::xml::parse(xml)?;
    let root = dom.root.ok_or_else(|| HubError::malformed("empty document"))?;
    crate::xml::xpath::query_value(&dom, root, "saml:Issuer").ok_or_else(|| HubError::malformed("missing Issuer"))
}

/// `role` names which side of the hub the message arrived on (spec §6): `idp`/`birk`
/// name an IdP-shaped participant, `sp`/`krib` an SP-shaped one.
fn resolve_role_entity(state: &AppState, role: &str, entity_id: &str) -> Result<(std::sync::Arc<Entity>, SetName), HubError> {
    match role {
        "idp" | "birk" => state.find_idp(entity_id),
        "sp" | "krib" => state.find_sp(entity_id),
        _ => Err(HubError::malformed("unknown slo role")),
    }
}

async fn handle_logout_request(state: &AppState, role: &str, received: Received, headers: &HeaderMap) -> Result<Response, HubError> {
    let request = LogoutRequest(SamlDoc { dom: received.dom, root: received.root });
    let issuer = request.0.issuer().ok_or_else(|| HubError::malformed("missing Issuer"))?;
    let request_id = request.0.id().ok_or_else(|| HubError::malformed("missing ID"))?;
    let initiator_is_idp = matches!(role, "idp" | "birk");

    let hmac_key = state.config.cookies.hmac_key.as_bytes();
    let ttl = state.config.cookies.slo_ttl_seconds;
    let now = Utc::now();

    let cookies = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(middleware::parse_cookies)
        .unwrap_or_default();
    let slo_list = cookies
        .get("SLO")
        .and_then(|c| SloInfoList::open(c, hmac_key, ttl, now).ok())
        .unwrap_or_default();

    let mut remaining = slo_list;
    remaining.remove(&issuer);

    dispatch_or_finish(
        state,
        Continuation {
            initiator_entity_id: issuer,
            initiator_request_id: request_id,
            initiator_is_idp,
            remaining: remaining.0,
        },
    )
    .await
}

async fn handle_logout_response(state: &AppState, received: Received, relay_state: Option<&str>) -> Result<Response, HubError> {
    let response = LogoutResponse(SamlDoc { dom: received.dom, root: received.root });
    if response.status_code().as_deref() != Some("urn:oasis:names:tc:SAML:2.0:status:Success") {
        return Err(HubError::UpstreamStatus(StatusReason::Responder));
    }

    let raw = relay_state.ok_or_else(|| HubError::transport("missing logout continuation"))?;
    let now = Utc::now();
    let payload = crate::cookie::opaque::decode(raw, state.config.cookies.hmac_key.as_bytes(), state.config.cookies.slo_ttl_seconds, now)?;
    let continuation: Continuation = serde_json::from_slice(&payload).map_err(|_| HubError::malformed("bad logout continuation"))?;

    dispatch_or_finish(state, continuation).await
}

async fn dispatch_or_finish(state: &AppState, continuation: Continuation) -> Result<Response, HubError> {
    let mut cascade = crate::slo::SloCascade::new(SloInfoList(continuation.remaining.clone()));

    let Some(next_info) = cascade.remaining.0.first().cloned() else {
        return finish_cascade(state, &continuation).await;
    };

    let hub_issuer = if next_info.is_idp {
        statemachine::map_to_idp(&next_info.entity_id)
    } else {
        statemachine::map_to_sp(&next_info.entity_id)
    };

    let next = cascade.next_request(&hub_issuer, |info| {
        if info.is_idp {
            state.find_idp(&info.entity_id).ok().and_then(|(e, _)| e.slo_endpoint.clone())
        } else {
            state.find_sp(&info.entity_id).ok().and_then(|(e, _)| e.slo_endpoint.clone())
        }
    });

    let Some((mut request, _pending)) = next else {
        return finish_cascade(state, &continuation).await;
    };

    envelope::sign_enveloped(&mut request.0.dom, request.0.root, state.alg, &state.signer).await?;

    let next_continuation = Continuation {
        remaining: cascade.remaining.0.clone(),
        ..continuation
    };
    let now = Utc::now();
    let relay = crate::cookie::opaque::encode(
        &serde_json::to_vec(&next_continuation).map_err(|_| HubError::malformed("continuation encode"))?,
        state.config.cookies.hmac_key.as_bytes(),
        now,
    );

    let destination = request
        .0
        .destination()
        .ok_or_else(|| HubError::metadata_not_found("participant has no SLO endpoint"))?;
    let message_b64 = base64::engine::general_purpose::STANDARD.encode(request.0.serialize());
    let body = middleware::html_post_form(&destination, "SAMLRequest", &message_b64, Some(&relay));
    Ok(html_response(body))
}

async fn finish_cascade(state: &AppState, continuation: &Continuation) -> Result<Response, HubError> {
    let (entity, _set) = if continuation.initiator_is_idp {
        state.find_idp(&continuation.initiator_entity_id)?
    } else {
        state.find_sp(&continuation.initiator_entity_id)?
    };
    let destination = entity
        .slo_endpoint
        .clone()
        .ok_or_else(|| HubError::metadata_not_found("initiator has no SLO endpoint"))?;
    let issuer = if continuation.initiator_is_idp {
        statemachine::map_to_idp(&continuation.initiator_entity_id)
    } else {
        statemachine::map_to_sp(&continuation.initiator_entity_id)
    };

    let mut response = LogoutResponse::new_success(&issuer, &destination, &continuation.initiator_request_id);
    envelope::sign_enveloped(&mut response.0.dom, response.0.root, state.alg, &state.signer).await?;

    let message_b64 = base64::engine::general_purpose::STANDARD.encode(response.0.serialize());
    let body = middleware::html_post_form(&destination, "SAMLResponse", &message_b64, None);
    Ok(html_response(body))
}

fn html_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()
}
