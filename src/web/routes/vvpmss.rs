//! `/vvpmss` (spec §6, §4.7): a tiny cross-origin endpoint an SP's login page can call
//! to remember the user's last-chosen IdP as a cookie, read back by `/sso`'s discovery
//! chain on the next visit (`vvpmss` = "very-very-persistent-my-selected-sso", the
//! hub's sticky-IdP cookie).

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::common::error::HubError;
use crate::web::middleware;

use super::AppState;

#[derive(Deserialize)]
pub struct VvpmssQuery {
    pub idplist: Option<String>,
}

pub async fn vvpmss(State(state): State<AppState>, Query(q): Query<VvpmssQuery>, headers: HeaderMap) -> Result<Response, HubError> {
    let idp = q.idplist.ok_or_else(|| HubError::malformed("missing idplist"))?;
    let user_agent = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok());
    let set_cookie = middleware::set_cookie_header("vvpmss", &idp, state.config.cookies.vvpmss_ttl_seconds, user_agent);

    Ok((
        [
            (header::SET_COOKIE, set_cookie),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
        ],
        "",
    )
        .into_response())
}
