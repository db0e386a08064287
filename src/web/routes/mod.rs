//! HTTP routes (spec §6): the hub's external interface, wiring every component module
//! together behind axum handlers.

pub mod acs;
pub mod jwt_bridge;
pub mod management;
pub mod mdq;
pub mod slo;
pub mod sso;
pub mod vvpmss;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::common::algo::Alg;
use crate::common::config::HubConfig;
use crate::common::error::HubError;
use crate::crypto::Signer;
use crate::metadata::refresh::Refresher;
use crate::metadata::{Entity, MetadataStore, SetName};

/// Shared handler state: configuration, the four metadata sets, and the hub's own
/// signing/decryption key material.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HubConfig>,
    pub metadata: Arc<MetadataStore>,
    pub signer: Arc<Signer>,
    pub decrypt_signer: Arc<Signer>,
    pub hub_entity_id: String,
    /// The ACS URL the hub advertises to IdPs in its own outbound `AuthnRequest`s —
    /// checked against `SubjectConfirmationData/@Recipient` and `Response/@Destination`
    /// on the way back (spec §4.3 step 8).
    pub hub_acs_url: String,
    pub alg: Alg,
    pub refresher: Arc<Refresher>,
}

impl AppState {
    /// Finds an SP entity and the set it belongs to, trying `ExternalSp` then
    /// `Internal` — the two sets a hub-facing SP can live in (spec §4.4).
    pub fn find_sp(&self, entity_id: &str) -> Result<(Arc<Entity>, SetName), HubError> {
        if let Ok(e) = self.metadata.find_by_entity_id(SetName::ExternalSp, entity_id) {
            return Ok((e, SetName::ExternalSp));
        }
        self.metadata
            .find_by_entity_id(SetName::Internal, entity_id)
            .map(|e| (e, SetName::Internal))
    }

    /// Finds an IdP entity and the set it belongs to, trying `ExternalIdp` then
    /// `Internal`.
    pub fn find_idp(&self, entity_id: &str) -> Result<(Arc<Entity>, SetName), HubError> {
        if let Ok(e) = self.metadata.find_by_entity_id(SetName::ExternalIdp, entity_id) {
            return Ok((e, SetName::ExternalIdp));
        }
        self.metadata
            .find_by_entity_id(SetName::Internal, entity_id)
            .map(|e| (e, SetName::Internal))
    }

    /// Finds an IdP entity by its SHA-1 metadata hash (the `SSO2-<hash>` cookie name,
    /// spec §4.5), trying `ExternalIdp` then `Internal`.
    pub fn find_idp_by_hash(&self, hash: &str) -> Result<(Arc<Entity>, SetName), HubError> {
        if let Ok(e) = self.metadata.find_by_hash(SetName::ExternalIdp, hash) {
            return Ok((e, SetName::ExternalIdp));
        }
        self.metadata
            .find_by_hash(SetName::Internal, hash)
            .map(|e| (e, SetName::Internal))
    }
}

/// The routes served on the main listener (spec §6).
pub fn public_router(state: AppState) -> Router {
    Router::new()
        .route("/sso", get(sso::sso_get).post(sso::sso_post))
        .route("/acs", post(acs::acs_post))
        .route("/slo/{role}", get(slo::slo_get).post(slo::slo_post))
        .route("/saml2jwt", get(jwt_bridge::saml2jwt))
        .route("/jwt2saml", post(jwt_bridge::jwt2saml))
        .route("/mdq/{set}/{en1}/{en2}", get(mdq::mdq))
        .route("/vvpmss", get(vvpmss::vvpmss))
        .with_state(state)
}

/// The routes served on the management port (spec §6 — port 9000).
pub fn management_router(state: AppState) -> Router {
    Router::new()
        .route("/_update", post(management::update))
        .with_state(state)
}
