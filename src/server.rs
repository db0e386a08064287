//! Process bootstrap (spec §9): loads configuration, loads metadata feeds, and serves
//! the public and management listeners side by side, mirroring the teacher's
//! `SynapseServer` boot sequence.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::common::algo;
use crate::common::config::{ConfigError, HubConfig};
use crate::crypto::hsm::HttpHsmClient;
use crate::crypto::keys::{self, KeyRef};
use crate::crypto::Signer;
use crate::metadata::refresh::{FeedConfig, Refresher};
use crate::metadata::{MetadataStore, SetName};
use crate::web::routes::{management_router, public_router, AppState};

pub struct HubServer {
    state: AppState,
}

fn configured_feeds(config: &HubConfig) -> Vec<FeedConfig> {
    let m = &config.metadata;
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

fn resolve_signer(key_ref: KeyRef) -> Signer {
    Signer::new(key_ref, Arc::new(HttpHsmClient::new()))
}

impl HubServer {
    pub async fn new(config: HubConfig) -> Result<Self, ConfigError> {
        let metadata = Arc::new(MetadataStore::new());
        let refresher = Arc::new(Refresher::new(metadata.clone()));
        let feeds = configured_feeds(&config);
        refresher
            .load_all(&feeds)
            .await
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;

        let signing_key = keys::resolve_key_ref(&config.crypto.signing_key, None)
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;
        let decrypt_key = keys::resolve_key_ref(&config.crypto.encryption_key, None)
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;

        let hub_entity_id = config.discovery.service_url.clone().unwrap_or_default();
        let hub_acs_url = config
            .discovery
            .acs_url
            .clone()
            .unwrap_or_else(|| format!("{}/acs", hub_entity_id.trim_end_matches('/')));

        let state = AppState {
            config: Arc::new(config),
            metadata,
            signer: Arc::new(resolve_signer(signing_key)),
            decrypt_signer: Arc::new(resolve_signer(decrypt_key)),
            hub_entity_id,
            hub_acs_url,
            alg: algo::DEFAULT_ALG,
            refresher,
        };

        Ok(Self { state })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let public = public_router(self.state.clone()).layer(TraceLayer::new_for_http());
        let management = management_router(self.state.clone()).layer(TraceLayer::new_for_http());

        let public_addr = format!("{}:{}", self.state.config.server.host, self.state.config.server.port);
        let management_addr = format!("{}:{}", self.state.config.server.host, self.state.config.server.management_port);

        let public_listener = TcpListener::bind(&public_addr).await?;
        let management_listener = TcpListener::bind(&management_addr).await?;

        info!(addr = %public_addr, "public listener bound");
        info!(addr = %management_addr, "management listener bound");

        let public_server = axum::serve(public_listener, public).with_graceful_shutdown(shutdown_signal());
        let management_server = axum::serve(management_listener, management).with_graceful_shutdown(shutdown_signal());

        let (public_result, management_result) = tokio::join!(public_server, management_server);
        public_result?;
        management_result?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
