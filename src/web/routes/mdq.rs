//! `/mdq/{set}/{en1}/{en2}` (spec §6, §4.4): per-entity metadata query, gated by the
//! federation-intersection rule so a requester only ever learns about entities it is
//! actually authorized to reach through the hub.
//!
//! `set` names the set `en2` (the returned entity) lives in; `en1` is the requester,
//! resolved by its SHA-1 hash in `set`'s reverse partner. The response is withheld
//! unless `feds(en1) ∩ feds(en2) ≠ ∅` (spec §4.4, §8 invariant 7, scenario S4).

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::common::error::HubError;
use crate::metadata::{feds_intersect, render_entity_descriptor, SetName};

use super::AppState;

fn parse_set(name: &str) -> Result<SetName, HubError> {
    match name {
        "hub" => Ok(SetName::Hub),
        "internal" => Ok(SetName::Internal),
        "external-idp" => Ok(SetName::ExternalIdp),
        "external-sp" => Ok(SetName::ExternalSp),
        _ => Err(HubError::malformed("unknown metadata set")),
    }
}

pub async fn mdq(State(state): State<AppState>, Path((set, en1, en2)): Path<(String, String, String)>) -> Result<Response, HubError> {
    let target_set = parse_set(&set)?;
    let requester_set = target_set.reverse_partner();

    let target = state.metadata.find_by_hash(target_set, &en2)?;
    let requester = state.metadata.find_by_hash(requester_set, &en1)?;

    if !feds_intersect(&requester.feds, &target.feds) {
        return Err(HubError::policy("no common federations"));
    }

    let xml = render_entity_descriptor(&target);

    Ok(([(header::CONTENT_TYPE, "application/samlmetadata+xml")], xml).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::algo::Alg;
    use crate::common::config::HubConfig;
    use crate::crypto::hsm::HttpHsmClient;
    use crate::crypto::keys::KeyRef;
    use crate::crypto::Signer;
    use crate::metadata::refresh::Refresher;
    use crate::metadata::{MetadataSet, MetadataStore};
    use std::sync::Arc;

    fn config_toml() -> &'static str {
        r#"
[cookies]
hmac_key = "test-key"
[crypto]
signing_key = "unused"
signing_cert = "unused"
encryption_key = "unused"
encryption_cert = "unused"
[jwt]
signing_key = "unused"
"#
    }

    async fn state_with(idp_xml: &[u8], sp_xml: &[u8]) -> AppState {
        let metadata = Arc::new(MetadataStore::new());
        metadata.install(SetName::ExternalIdp, MetadataSet::parse(idp_xml).unwrap());
        metadata.install(SetName::ExternalSp, MetadataSet::parse(sp_xml).unwrap());

        let config: HubConfig = config::Config::builder()
            .add_source(config::File::from_str(config_toml(), config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let signer = Arc::new(Signer::new(KeyRef::Local(Arc::new(key.clone())), Arc::new(HttpHsmClient::new())));
        let decrypt_signer = Arc::new(Signer::new(KeyRef::Local(Arc::new(key)), Arc::new(HttpHsmClient::new())));

        AppState {
            config: Arc::new(config),
            metadata: metadata.clone(),
            signer,
            decrypt_signer,
            hub_entity_id: "https://wayf.example.org/md".to_string(),
            hub_acs_url: "https://wayf.example.org/acs".to_string(),
            alg: Alg::Sha256,
            refresher: Arc::new(Refresher::new(metadata)),
        }
    }

    fn idp_xml(feds: &str) -> Vec<u8> {
        format!(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://idp.example.org/md">
                <md:IDPSSODescriptor><md:SingleSignOnService Location="https://idp.example.org/sso"/></md:IDPSSODescriptor>
                <md:Extensions><wayf:feds>{feds}</wayf:feds></md:Extensions>
            </md:EntityDescriptor>"#
        )
        .into_bytes()
    }

    fn sp_xml(feds: &str) -> Vec<u8> {
        format!(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://sp.example.org/md">
                <md:SPSSODescriptor><md:AssertionConsumerService Location="https://sp.example.org/acs" index="0"/></md:SPSSODescriptor>
                <md:Extensions><wayf:feds>{feds}</wayf:feds></md:Extensions>
            </md:EntityDescriptor>"#
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn rejects_pair_with_no_common_federation() {
        let state = state_with(&idp_xml("A"), &sp_xml("B")).await;
        let idp = state.metadata.find_by_entity_id(SetName::ExternalIdp, "https://idp.example.org/md").unwrap();
        let sp = state.metadata.find_by_entity_id(SetName::ExternalSp, "https://sp.example.org/md").unwrap();

        let err = mdq(
            State(state),
            Path(("external-idp".to_string(), sp.sha1_hash.clone(), idp.sha1_hash.clone())),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HubError::PolicyDenied(_)));
    }

    #[tokio::test]
    async fn allows_pair_with_shared_federation() {
        let state = state_with(&idp_xml("wayf-dk"), &sp_xml("wayf-dk")).await;
        let idp = state.metadata.find_by_entity_id(SetName::ExternalIdp, "https://idp.example.org/md").unwrap();
        let sp = state.metadata.find_by_entity_id(SetName::ExternalSp, "https://sp.example.org/md").unwrap();

        let response = mdq(
            State(state),
            Path(("external-idp".to_string(), sp.sha1_hash.clone(), idp.sha1_hash.clone())),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
