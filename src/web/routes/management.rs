//! `/_update` (spec §6, §9): triggers an out-of-band metadata refresh, served only on
//! the management listener so it is never reachable from the public internet.

use axum::extract::State;
use axum::response::{IntoResponse, Response};

use crate::common::error::HubError;
use crate::metadata::refresh::FeedConfig;
use crate::metadata::SetName;

use super::AppState;

fn configured_feeds(state: &AppState) -> Vec<FeedConfig> {
    let m = &state.config.metadata;
    vec![
        FeedConfig {
            set: SetName::Hub,
            url: m.hub.feed_url.clone(),
            file: Some(m.hub.path.clone()),
        },
        FeedConfig {
            set: SetName::Internal,
            url: m.internal.feed_url.clone(),
            file: Some(m.internal.path.clone()),
        },
        FeedConfig {
            set: SetName::ExternalIdp,
            url: m.external_idp.feed_url.clone(),
            file: Some(m.external_idp.path.clone()),
        },
        FeedConfig {
            set: SetName::ExternalSp,
            url: m.external_sp.feed_url.clone(),
            file: Some(m.external_sp.path.clone()),
        },
    ]
}

pub async fn update(State(state): State<AppState>) -> Result<Response, HubError> {
    let feeds = configured_feeds(&state);
    state.refresher.refresh(&feeds).await?;
    Ok("ok".into_response())
}
